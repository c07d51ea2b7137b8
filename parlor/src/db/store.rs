//! Store traits
//!
//! The store is the final guard for the uniqueness invariants: one user per
//! email, one conversation per session id, one report per conversation.
//! Each operation is atomic on its own; nothing here spans operations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ChatMessage, Conversation, NewConversation, Report, StoredReport, User};
use crate::types::Result;

/// Default page size for `list_by_owner`
pub const DEFAULT_LIST_LIMIT: usize = 50;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateEmail` if the exact email is taken
    async fn insert_user(&self, email: &str, password_digest: &str) -> Result<User>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name reported by the health endpoint
    fn backend(&self) -> &'static str;

    /// Fails with `DuplicateSession` if the session id already exists
    async fn create(&self, new: NewConversation) -> Result<Conversation>;

    /// Lookup by client session id, with its report attached
    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<Conversation>>;

    /// Lookup by internal id, with its report attached
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Newest first, at most `limit`
    async fn list_by_owner(&self, owner_id: Uuid, limit: usize) -> Result<Vec<Conversation>>;

    /// Replace the whole message list. Fails with `NotFound` if the
    /// conversation is gone.
    async fn replace_messages(
        &self,
        conversation: &Conversation,
        messages: Vec<ChatMessage>,
    ) -> Result<Conversation>;

    /// Delete a conversation and its report. False if it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Fails with `DuplicateReport` if the conversation already has one
    async fn attach_report(&self, conversation_id: Uuid, data: Report) -> Result<StoredReport>;

    /// Overwrite the existing report in place. Fails with `NotFound` if
    /// there is none.
    async fn replace_report(&self, conversation_id: Uuid, data: Report) -> Result<StoredReport>;

    async fn find_report(&self, conversation_id: Uuid) -> Result<Option<StoredReport>>;
}
