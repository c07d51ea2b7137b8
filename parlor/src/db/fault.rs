//! Store wrapper that fails writes on demand, for persistence-failure tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::{ConversationStore, MemoryStore};
use crate::models::{ChatMessage, Conversation, NewConversation, Report, StoredReport};
use crate::types::{ParlorError, Result};

pub(crate) struct FailingWrites {
    pub inner: Arc<MemoryStore>,
    failing: AtomicBool,
}

impl FailingWrites {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ParlorError::Database("injected write failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConversationStore for FailingWrites {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn create(&self, new: NewConversation) -> Result<Conversation> {
        self.check()?;
        self.inner.create(new).await
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<Conversation>> {
        self.inner.find_by_session(session_id).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.inner.find_by_id(id).await
    }

    async fn list_by_owner(&self, owner_id: Uuid, limit: usize) -> Result<Vec<Conversation>> {
        self.inner.list_by_owner(owner_id, limit).await
    }

    async fn replace_messages(
        &self,
        conversation: &Conversation,
        messages: Vec<ChatMessage>,
    ) -> Result<Conversation> {
        self.check()?;
        self.inner.replace_messages(conversation, messages).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.check()?;
        self.inner.delete(id).await
    }

    async fn attach_report(&self, conversation_id: Uuid, data: Report) -> Result<StoredReport> {
        self.check()?;
        self.inner.attach_report(conversation_id, data).await
    }

    async fn replace_report(&self, conversation_id: Uuid, data: Report) -> Result<StoredReport> {
        self.check()?;
        self.inner.replace_report(conversation_id, data).await
    }

    async fn find_report(&self, conversation_id: Uuid) -> Result<Option<StoredReport>> {
        self.inner.find_report(conversation_id).await
    }
}
