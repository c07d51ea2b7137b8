//! User document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::models::User;
use crate::types::{ParlorError, Result};

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,

    /// Exactly as supplied at registration
    pub email: String,

    /// Argon2 PHC string
    pub password_hash: String,
}

impl UserDoc {
    pub fn from_user(user: &User) -> Self {
        Self {
            _id: None,
            metadata: Metadata::created(user.created_at),
            user_id: user.id.to_string(),
            email: user.email.clone(),
            password_hash: user.password_digest.clone(),
        }
    }

    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.user_id)?,
            created_at: self.metadata.created_at_utc(),
            email: self.email,
            password_digest: self.password_hash,
        })
    }
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| ParlorError::Database(format!("Corrupt id '{}': {}", raw, e)))
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
