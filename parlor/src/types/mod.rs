//! Shared types for Parlor

mod error;

pub use error::{ErrorBody, ParlorError, Result};
