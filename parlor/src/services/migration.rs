//! Import of conversations a guest kept client-side
//!
//! Runs once after a guest signs up or logs in. Items are independent: a bad
//! item is logged and skipped, a session that already exists is left alone,
//! and only fully imported items are counted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::failure::{FailureReporter, PersistOp, PersistenceFailure};
use crate::db::ConversationStore;
use crate::models::{ChatMessage, Language, NewConversation, Report, Scenario, User};
use crate::types::{ParlorError, Result};

/// Body of `POST /migrate`. Items stay untyped so one bad item cannot
/// reject the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct MigrateRequest {
    #[serde(default)]
    pub conversations: Vec<Value>,
}

/// One client-side conversation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationItem {
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub scenario: Option<Scenario>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub report: Option<Report>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub migrated_count: usize,
    #[serde(skip)]
    pub skipped: usize,
    #[serde(skip)]
    pub failed: usize,
}

impl MigrationSummary {
    pub fn message(&self) -> String {
        format!("Successfully migrated {} conversations", self.migrated_count)
    }
}

enum ItemOutcome {
    Migrated,
    AlreadyPresent,
}

#[derive(Clone)]
pub struct Migrator {
    store: Arc<dyn ConversationStore>,
    reporter: Arc<dyn FailureReporter>,
}

impl Migrator {
    pub fn new(store: Arc<dyn ConversationStore>, reporter: Arc<dyn FailureReporter>) -> Self {
        Self { store, reporter }
    }

    pub async fn migrate(&self, owner: &User, items: Vec<Value>) -> MigrationSummary {
        let mut summary = MigrationSummary::default();

        for raw in items {
            let label = raw
                .get("sessionId")
                .or_else(|| raw.get("session_id"))
                .and_then(Value::as_str)
                .unwrap_or("<new>")
                .to_string();

            match self.migrate_one(owner, raw).await {
                Ok(ItemOutcome::Migrated) => summary.migrated_count += 1,
                Ok(ItemOutcome::AlreadyPresent) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    self.reporter.report(&PersistenceFailure {
                        op: PersistOp::Migrate,
                        session_id: label,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            user_id = %owner.id,
            migrated = summary.migrated_count,
            skipped = summary.skipped,
            failed = summary.failed,
            "Migration finished"
        );
        summary
    }

    async fn migrate_one(&self, owner: &User, raw: Value) -> Result<ItemOutcome> {
        let item: MigrationItem = serde_json::from_value(raw)?;

        let session_id = match item.session_id.as_deref() {
            Some(raw) => Uuid::parse_str(raw)
                .map_err(|e| ParlorError::Validation(format!("Invalid session id '{}': {}", raw, e)))?,
            None => Uuid::new_v4(),
        };

        if self.store.find_by_session(session_id).await?.is_some() {
            debug!(session_id = %session_id, "Session already stored, skipping");
            return Ok(ItemOutcome::AlreadyPresent);
        }

        let conversation = self
            .store
            .create(NewConversation {
                session_id,
                owner_id: Some(owner.id),
                language: item.language.unwrap_or_default(),
                scenario: item.scenario.unwrap_or_default(),
                messages: item.messages.unwrap_or_default(),
            })
            .await?;

        if let Some(report) = item.report {
            self.store.attach_report(conversation.id, report).await?;
        }

        Ok(ItemOutcome::Migrated)
    }
}
