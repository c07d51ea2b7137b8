//! In-memory store
//!
//! Concurrent maps with secondary indexes for email and session id. Unique
//! keys are claimed through the entry API so two racing inserts cannot both
//! win. Conversations carry an insertion sequence that breaks `created_at`
//! ties when listing.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::store::{ConversationStore, UserStore};
use crate::models::{ChatMessage, Conversation, NewConversation, Report, StoredReport, User};
use crate::types::{ParlorError, Result};

/// Stored conversation; the report lives in its own map
#[derive(Debug, Clone)]
struct ConversationRow {
    conversation: Conversation,
    seq: u64,
}

/// Store backed by `DashMap`s
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    /// email -> user id
    emails: DashMap<String, Uuid>,
    conversations: DashMap<Uuid, ConversationRow>,
    /// session id -> conversation id
    sessions: DashMap<Uuid, Uuid>,
    /// conversation id -> report
    reports: DashMap<Uuid, StoredReport>,
    seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            conversations: DashMap::new(),
            sessions: DashMap::new(),
            reports: DashMap::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// Number of stored conversations
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    fn with_report(&self, mut conversation: Conversation) -> Conversation {
        conversation.report = self
            .reports
            .get(&conversation.id)
            .map(|r| r.value().clone());
        conversation
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, email: &str, password_digest: &str) -> Result<User> {
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(_) => Err(ParlorError::DuplicateEmail(email.to_string())),
            Entry::Vacant(slot) => {
                let user = User {
                    id: Uuid::new_v4(),
                    email: email.to_string(),
                    password_digest: password_digest.to_string(),
                    created_at: Utc::now(),
                };
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(user)
            }
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(id) = self.emails.get(email).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|r| r.value().clone()))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, new: NewConversation) -> Result<Conversation> {
        match self.sessions.entry(new.session_id) {
            Entry::Occupied(_) => Err(ParlorError::DuplicateSession(new.session_id.to_string())),
            Entry::Vacant(slot) => {
                let conversation = Conversation {
                    id: Uuid::new_v4(),
                    owner_id: new.owner_id,
                    session_id: new.session_id,
                    language: new.language,
                    scenario: new.scenario,
                    messages: new.messages,
                    created_at: Utc::now(),
                    report: None,
                };
                let row = ConversationRow {
                    conversation: conversation.clone(),
                    seq: self.seq.fetch_add(1, Ordering::SeqCst),
                };
                self.conversations.insert(conversation.id, row);
                slot.insert(conversation.id);
                debug!(session_id = %conversation.session_id, "Created conversation");
                Ok(conversation)
            }
        }
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<Conversation>> {
        let Some(id) = self.sessions.get(&session_id).map(|r| *r.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversation = self
            .conversations
            .get(&id)
            .map(|r| r.value().conversation.clone());
        Ok(conversation.map(|c| self.with_report(c)))
    }

    async fn list_by_owner(&self, owner_id: Uuid, limit: usize) -> Result<Vec<Conversation>> {
        let mut rows: Vec<ConversationRow> = self
            .conversations
            .iter()
            .filter(|r| r.value().conversation.owner_id == Some(owner_id))
            .map(|r| r.value().clone())
            .collect();

        rows.sort_by(|a, b| {
            b.conversation
                .created_at
                .cmp(&a.conversation.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(rows
            .into_iter()
            .take(limit)
            .map(|row| self.with_report(row.conversation))
            .collect())
    }

    async fn replace_messages(
        &self,
        conversation: &Conversation,
        messages: Vec<ChatMessage>,
    ) -> Result<Conversation> {
        let updated = {
            let mut row = self
                .conversations
                .get_mut(&conversation.id)
                .ok_or_else(|| ParlorError::NotFound(format!("Conversation {}", conversation.id)))?;
            row.conversation.messages = messages;
            row.conversation.clone()
        };
        Ok(self.with_report(updated))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let Some((_, row)) = self.conversations.remove(&id) else {
            return Ok(false);
        };
        self.sessions.remove(&row.conversation.session_id);
        self.reports.remove(&id);
        debug!(conversation_id = %id, "Deleted conversation");
        Ok(true)
    }

    async fn attach_report(&self, conversation_id: Uuid, data: Report) -> Result<StoredReport> {
        // Holding the row keeps `delete` from removing it until the report is in,
        // so a report never outlives its conversation. Lock order is
        // conversations then reports, never the reverse.
        let Some(_row) = self.conversations.get(&conversation_id) else {
            return Err(ParlorError::NotFound(format!(
                "Conversation {}",
                conversation_id
            )));
        };

        match self.reports.entry(conversation_id) {
            Entry::Occupied(_) => Err(ParlorError::DuplicateReport(conversation_id.to_string())),
            Entry::Vacant(slot) => {
                let report = StoredReport {
                    id: Uuid::new_v4(),
                    conversation_id,
                    data,
                    created_at: Utc::now(),
                };
                slot.insert(report.clone());
                Ok(report)
            }
        }
    }

    async fn replace_report(&self, conversation_id: Uuid, data: Report) -> Result<StoredReport> {
        let mut existing = self
            .reports
            .get_mut(&conversation_id)
            .ok_or_else(|| ParlorError::NotFound(format!("Report for {}", conversation_id)))?;
        existing.data = data;
        existing.created_at = Utc::now();
        Ok(existing.clone())
    }

    async fn find_report(&self, conversation_id: Uuid) -> Result<Option<StoredReport>> {
        Ok(self
            .reports
            .get(&conversation_id)
            .map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, Scenario};

    fn new_conversation(owner: Uuid) -> NewConversation {
        NewConversation {
            session_id: Uuid::new_v4(),
            owner_id: Some(owner),
            language: Language::English,
            scenario: Scenario::Hotel,
            messages: vec![ChatMessage::user("Hello")],
        }
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = MemoryStore::new();
        store.insert_user("a@x.com", "digest").await.unwrap();

        let err = store.insert_user("a@x.com", "digest").await.unwrap_err();
        assert!(matches!(err, ParlorError::DuplicateEmail(_)));

        // Stored as supplied, so case variants are distinct
        assert!(store.insert_user("A@x.com", "digest").await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_session() {
        let store = MemoryStore::new();
        let new = new_conversation(Uuid::new_v4());

        store.create(new.clone()).await.unwrap();
        let err = store.create(new).await.unwrap_err();
        assert!(matches!(err, ParlorError::DuplicateSession(_)));
        assert_eq!(store.conversation_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_is_wholesale() {
        let store = MemoryStore::new();
        let conversation = store.create(new_conversation(Uuid::new_v4())).await.unwrap();

        let messages = vec![ChatMessage::user("a"), ChatMessage::assistant("b")];
        store
            .replace_messages(&conversation, messages.clone())
            .await
            .unwrap();

        let found = store
            .find_by_session(conversation.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.messages, messages);
    }

    #[tokio::test]
    async fn test_report_at_most_once() {
        let store = MemoryStore::new();
        let conversation = store.create(new_conversation(Uuid::new_v4())).await.unwrap();

        store
            .attach_report(conversation.id, Report::default())
            .await
            .unwrap();
        let err = store
            .attach_report(conversation.id, Report::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParlorError::DuplicateReport(_)));

        let mut updated = Report::default();
        updated.positive_feedback.push("Better".into());
        store
            .replace_report(conversation.id, updated.clone())
            .await
            .unwrap();

        let found = store
            .find_by_session(conversation.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.report.unwrap().data, updated);
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryStore::new();
        let conversation = store.create(new_conversation(Uuid::new_v4())).await.unwrap();
        store
            .attach_report(conversation.id, Report::default())
            .await
            .unwrap();

        assert!(store.delete(conversation.id).await.unwrap());
        assert!(!store.delete(conversation.id).await.unwrap());
        assert!(store
            .find_by_session(conversation.session_id)
            .await
            .unwrap()
            .is_none());
        assert!(store.find_report(conversation.id).await.unwrap().is_none());

        // The session id is free again
        let again = NewConversation {
            session_id: conversation.session_id,
            ..new_conversation(Uuid::new_v4())
        };
        assert!(store.create(again).await.is_ok());
    }

    #[tokio::test]
    async fn test_attach_after_delete_leaves_no_report() {
        let store = MemoryStore::new();
        let conversation = store.create(new_conversation(Uuid::new_v4())).await.unwrap();
        assert!(store.delete(conversation.id).await.unwrap());

        let err = store
            .attach_report(conversation.id, Report::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParlorError::NotFound(_)));
        assert!(store.find_report(conversation.id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_attach_racing_delete_never_orphans() {
        let store = std::sync::Arc::new(MemoryStore::new());

        for _ in 0..200 {
            let conversation = store.create(new_conversation(Uuid::new_v4())).await.unwrap();
            let id = conversation.id;

            let attach = {
                let store = store.clone();
                tokio::spawn(async move { store.attach_report(id, Report::default()).await })
            };
            let delete = {
                let store = store.clone();
                tokio::spawn(async move { store.delete(id).await })
            };
            let _ = attach.await.unwrap();
            assert!(delete.await.unwrap().unwrap());

            assert!(store.find_report(id).await.unwrap().is_none());
        }
        assert_eq!(store.conversation_count(), 0);
    }

    #[tokio::test]
    async fn test_list_newest_first_and_bounded() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut sessions = Vec::new();
        for _ in 0..3 {
            sessions.push(store.create(new_conversation(owner)).await.unwrap().session_id);
        }
        store.create(new_conversation(Uuid::new_v4())).await.unwrap();

        let listed = store.list_by_owner(owner, 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, sessions[2]);
        assert_eq!(listed[1].session_id, sessions[1]);
    }
}
