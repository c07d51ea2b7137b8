//! MongoDB-backed store
//!
//! Unique indexes carry the invariants; a duplicate-key rejection is mapped
//! to the matching `Duplicate*` error. Deleting a conversation removes its
//! report in a second statement.

use async_trait::async_trait;
use bson::doc;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::mongo::{MongoClient, MongoCollection};
use super::schemas::{
    parse_id, ConversationDoc, ReportDoc, UserDoc, CONVERSATION_COLLECTION, REPORT_COLLECTION,
    USER_COLLECTION,
};
use super::store::{ConversationStore, UserStore};
use crate::models::{ChatMessage, Conversation, NewConversation, Report, StoredReport, User};
use crate::types::{ParlorError, Result};

pub struct MongoStore {
    users: MongoCollection<UserDoc>,
    conversations: MongoCollection<ConversationDoc>,
    reports: MongoCollection<ReportDoc>,
}

impl MongoStore {
    /// Open all collections, creating indexes as needed
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = MongoClient::new(uri, db_name).await?;

        let store = Self {
            users: client.collection(USER_COLLECTION).await?,
            conversations: client.collection(CONVERSATION_COLLECTION).await?,
            reports: client.collection(REPORT_COLLECTION).await?,
        };

        info!("MongoDB collections ready");
        Ok(store)
    }

    async fn load(&self, doc: ConversationDoc) -> Result<Conversation> {
        let id = parse_id(&doc.conversation_id)?;
        let report = self.find_report(id).await?;
        doc.into_conversation(report)
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn insert_user(&self, email: &str, password_digest: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_digest: password_digest.to_string(),
            created_at: Utc::now(),
        };

        match self.users.try_insert_one(UserDoc::from_user(&user)).await? {
            Some(_) => Ok(user),
            None => Err(ParlorError::DuplicateEmail(email.to_string())),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.users
            .find_one(doc! { "email": email })
            .await?
            .map(UserDoc::into_user)
            .transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.users
            .find_one(doc! { "user_id": id.to_string() })
            .await?
            .map(UserDoc::into_user)
            .transpose()
    }
}

#[async_trait]
impl ConversationStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn create(&self, new: NewConversation) -> Result<Conversation> {
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

        match self
            .conversations
            .try_insert_one(ConversationDoc::from_conversation(&conversation))
            .await?
        {
            Some(_) => {
                debug!(session_id = %conversation.session_id, "Created conversation");
                Ok(conversation)
            }
            None => Err(ParlorError::DuplicateSession(
                conversation.session_id.to_string(),
            )),
        }
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<Conversation>> {
        match self
            .conversations
            .find_one(doc! { "session_id": session_id.to_string() })
            .await?
        {
            Some(doc) => self.load(doc).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        match self
            .conversations
            .find_one(doc! { "conversation_id": id.to_string() })
            .await?
        {
            Some(doc) => self.load(doc).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_by_owner(&self, owner_id: Uuid, limit: usize) -> Result<Vec<Conversation>> {
        let docs = self
            .conversations
            .find_many(
                doc! { "owner_id": owner_id.to_string() },
                Some(doc! { "metadata.created_at": -1, "_id": -1 }),
                Some(limit as i64),
            )
            .await?;

        let mut conversations = Vec::with_capacity(docs.len());
        for doc in docs {
            conversations.push(self.load(doc).await?);
        }
        Ok(conversations)
    }

    async fn replace_messages(
        &self,
        conversation: &Conversation,
        messages: Vec<ChatMessage>,
    ) -> Result<Conversation> {
        let encoded = bson::to_bson(&messages)
            .map_err(|e| ParlorError::Internal(format!("Failed to encode messages: {}", e)))?;

        let result = self
            .conversations
            .update_one(
                doc! { "conversation_id": conversation.id.to_string() },
                doc! { "messages": encoded },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(ParlorError::NotFound(format!(
                "Conversation {}",
                conversation.id
            )));
        }

        Ok(Conversation {
            messages,
            ..conversation.clone()
        })
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let deleted = self
            .conversations
            .delete_many(doc! { "conversation_id": id.to_string() })
            .await?;
        if deleted == 0 {
            return Ok(false);
        }

        self.reports
            .delete_many(doc! { "conversation_id": id.to_string() })
            .await?;
        debug!(conversation_id = %id, "Deleted conversation");
        Ok(true)
    }

    async fn attach_report(&self, conversation_id: Uuid, data: Report) -> Result<StoredReport> {
        if self.find_by_id(conversation_id).await?.is_none() {
            return Err(ParlorError::NotFound(format!(
                "Conversation {}",
                conversation_id
            )));
        }

        let report = StoredReport {
            id: Uuid::new_v4(),
            conversation_id,
            data,
            created_at: Utc::now(),
        };

        match self
            .reports
            .try_insert_one(ReportDoc::from_report(&report))
            .await?
        {
            Some(_) => Ok(report),
            None => Err(ParlorError::DuplicateReport(conversation_id.to_string())),
        }
    }

    async fn replace_report(&self, conversation_id: Uuid, data: Report) -> Result<StoredReport> {
        let encoded = bson::to_bson(&data)
            .map_err(|e| ParlorError::Internal(format!("Failed to encode report: {}", e)))?;
        let now = bson::DateTime::from_chrono(Utc::now());

        let result = self
            .reports
            .update_one(
                doc! { "conversation_id": conversation_id.to_string() },
                doc! { "report_data": encoded, "metadata.created_at": now },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(ParlorError::NotFound(format!(
                "Report for {}",
                conversation_id
            )));
        }

        self.find_report(conversation_id)
            .await?
            .ok_or_else(|| ParlorError::NotFound(format!("Report for {}", conversation_id)))
    }

    async fn find_report(&self, conversation_id: Uuid) -> Result<Option<StoredReport>> {
        self.reports
            .find_one(doc! { "conversation_id": conversation_id.to_string() })
            .await?
            .map(ReportDoc::into_report)
            .transpose()
    }
}
