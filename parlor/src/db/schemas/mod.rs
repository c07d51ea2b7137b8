//! Database schemas for Parlor
//!
//! Ids are stored as UUID strings alongside Mongo's own `_id`, so the
//! domain never sees an `ObjectId`.

mod conversation;
mod metadata;
mod report;
mod user;

pub use conversation::{ConversationDoc, CONVERSATION_COLLECTION};
pub use metadata::Metadata;
pub use report::{ReportDoc, REPORT_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};

pub(crate) use user::parse_id;
