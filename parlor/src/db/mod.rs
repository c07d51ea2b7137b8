//! Persistence for users, conversations and reports
//!
//! Two backends implement the same store traits: [`MemoryStore`] for dev
//! mode and tests, [`MongoStore`] for deployments.

mod memory;
pub mod mongo;
mod mongo_store;
pub mod schemas;
mod store;

#[cfg(test)]
pub(crate) mod fault;

pub use memory::MemoryStore;
pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use mongo_store::MongoStore;
pub use store::{ConversationStore, UserStore, DEFAULT_LIST_LIMIT};
