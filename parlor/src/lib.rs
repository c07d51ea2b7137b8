//! Parlor - conversation practice gateway
//!
//! Learners role-play fixed scenarios (restaurant, hotel, job interview, ...)
//! in Japanese or English with an LLM partner, then ask for a feedback
//! report on the transcript.
//!
//! ## Services
//!
//! - **Auth**: Email/password accounts, JWT access tokens, optional identity
//! - **Turns**: Buffered and SSE-streamed replies, saved for signed-in users
//! - **Reports**: Structured grammar/vocabulary feedback with a safe fallback
//! - **History**: Listing, lookup, deletion and import of guest conversations
//!
//! Guests get full conversations but nothing is stored for them. A failed
//! save never changes what the user sees.

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod prompts;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{dispatch, run, AppState};
pub use types::{ParlorError, Result};
