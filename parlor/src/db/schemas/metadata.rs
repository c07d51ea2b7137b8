//! Common metadata for all documents

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Creation and update timestamps
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Metadata stamped with an explicit creation time
    pub fn created(at: chrono::DateTime<chrono::Utc>) -> Self {
        let at = DateTime::from_chrono(at);
        Self {
            updated_at: Some(at),
            created_at: Some(at),
        }
    }

    /// Creation time, or the epoch for legacy documents without one
    pub fn created_at_utc(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
            .map(|dt| dt.to_chrono())
            .unwrap_or_default()
    }
}
