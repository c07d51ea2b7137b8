//! Conversation document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::user::parse_id;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::models::{ChatMessage, Conversation, Language, Scenario, StoredReport};
use crate::types::Result;

/// Collection name for conversations
pub const CONVERSATION_COLLECTION: &str = "conversations";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ConversationDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub conversation_id: String,

    /// Absent for guest-origin conversations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    pub session_id: String,

    pub language: Language,

    pub scenario: Scenario,

    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ConversationDoc {
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            _id: None,
            metadata: Metadata::created(conversation.created_at),
            conversation_id: conversation.id.to_string(),
            owner_id: conversation.owner_id.map(|id| id.to_string()),
            session_id: conversation.session_id.to_string(),
            language: conversation.language,
            scenario: conversation.scenario,
            messages: conversation.messages.clone(),
        }
    }

    pub fn into_conversation(self, report: Option<StoredReport>) -> Result<Conversation> {
        Ok(Conversation {
            id: parse_id(&self.conversation_id)?,
            owner_id: self.owner_id.as_deref().map(parse_id).transpose()?,
            session_id: parse_id(&self.session_id)?,
            language: self.language,
            scenario: self.scenario,
            created_at: self.metadata.created_at_utc(),
            messages: self.messages,
            report,
        })
    }
}

impl IntoIndexes for ConversationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "session_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("session_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "conversation_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("conversation_id_unique".to_string())
                        .build(),
                ),
            ),
            // Owner history listing
            (
                doc! { "owner_id": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("owner_recent_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ConversationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
