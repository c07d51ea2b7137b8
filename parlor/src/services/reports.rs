//! Report generation
//!
//! The analysis text is parsed as a [`Report`]; anything unparseable becomes
//! a fallback report computed from the transcript. Only a failed analysis
//! call is an error. For an owner, the report is attached to the stored
//! conversation, or replaces the one already there.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::failure::{FailureReporter, PersistOp, PersistOutcome, PersistenceFailure, SkipReason};
use super::tutor::Tutor;
use crate::auth::Identity;
use crate::db::ConversationStore;
use crate::models::{ChatMessage, Language, Report, ReportOverview, Scenario, User};
use crate::types::{ParlorError, Result};

/// Body of `POST /report/generate`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(alias = "session_id")]
    pub session_id: String,
    pub language: Language,
    pub scenario: Scenario,
    #[serde(default)]
    pub conversation: Vec<ChatMessage>,
}

/// Response body of `POST /report/generate`
#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub report: Report,
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub report: Report,
    /// True when the analysis could not be parsed
    pub fallback: bool,
    pub persistence: PersistOutcome,
}

#[derive(Clone)]
pub struct ReportOrchestrator {
    tutor: Tutor,
    store: Arc<dyn ConversationStore>,
    reporter: Arc<dyn FailureReporter>,
}

impl ReportOrchestrator {
    pub fn new(
        tutor: Tutor,
        store: Arc<dyn ConversationStore>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Self {
        Self {
            tutor,
            store,
            reporter,
        }
    }

    pub async fn generate(&self, request: ReportRequest, identity: &Identity) -> Result<ReportOutcome> {
        let raw = self
            .tutor
            .analyze(request.language, request.scenario, &request.conversation)
            .await
            .map_err(|e| {
                warn!(session_id = %request.session_id, error = %e, "Analysis failed");
                ParlorError::from(e)
            })?;

        let (report, fallback) = match parse_report(&raw) {
            Ok(report) => (report, false),
            Err(e) => {
                warn!(session_id = %request.session_id, error = %e, "Analysis was not a valid report, using fallback");
                (
                    fallback_report(request.language, request.scenario, &request.conversation),
                    true,
                )
            }
        };

        let persistence = self.persist_report(&request, identity, &report).await;

        Ok(ReportOutcome {
            report,
            fallback,
            persistence,
        })
    }

    async fn persist_report(
        &self,
        request: &ReportRequest,
        identity: &Identity,
        report: &Report,
    ) -> PersistOutcome {
        let Some(user) = identity.user() else {
            return PersistOutcome::Skipped(SkipReason::Anonymous);
        };
        let Ok(session_id) = Uuid::parse_str(&request.session_id) else {
            return PersistOutcome::Skipped(SkipReason::InvalidSession);
        };

        match self.attach(user, session_id, report).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.reporter.report(&PersistenceFailure {
                    op: PersistOp::AttachReport,
                    session_id: request.session_id.clone(),
                    error: e.to_string(),
                });
                PersistOutcome::Failed(e.to_string())
            }
        }
    }

    async fn attach(&self, user: &User, session_id: Uuid, report: &Report) -> Result<PersistOutcome> {
        let Some(conversation) = self.store.find_by_session(session_id).await? else {
            return Ok(PersistOutcome::Skipped(SkipReason::NoConversation));
        };
        if !conversation.is_owned_by(user.id) {
            return Ok(PersistOutcome::Skipped(SkipReason::NotOwner));
        }

        if conversation.report.is_some() {
            self.store
                .replace_report(conversation.id, report.clone())
                .await?;
            info!(conversation_id = %conversation.id, "Report regenerated");
            Ok(PersistOutcome::Updated)
        } else {
            self.store
                .attach_report(conversation.id, report.clone())
                .await?;
            info!(conversation_id = %conversation.id, "Report attached");
            Ok(PersistOutcome::Created)
        }
    }
}

/// Strip markdown fences the model may wrap around its JSON
fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    }
    if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse analysis output, tolerating code fences
pub fn parse_report(raw: &str) -> std::result::Result<Report, serde_json::Error> {
    serde_json::from_str(strip_code_fences(raw))
}

/// Report used when the analysis cannot be parsed.
///
/// `turns` counts user messages; `word_count` counts whitespace-separated
/// words in them.
pub fn fallback_report(language: Language, scenario: Scenario, conversation: &[ChatMessage]) -> Report {
    let user_messages = conversation.iter().filter(|m| m.is_user());
    let turns = user_messages.clone().count() as u32;
    let word_count = user_messages
        .map(|m| m.content.split_whitespace().count() as u32)
        .sum();

    let apology = match language {
        Language::Japanese => "レポートの生成中にエラーが発生しました。後ほど再試行してください。",
        Language::English => "An error occurred while generating the report. Please try again later.",
    };

    Report {
        overview: ReportOverview {
            language: language.as_str().to_string(),
            scenario: scenario.as_str().to_string(),
            turns,
            word_count,
        },
        positive_feedback: vec![apology.to_string()],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fault::FailingWrites;
    use crate::db::MemoryStore;
    use crate::models::NewConversation;
    use crate::services::RecordingReporter;
    use chrono::Utc;
    use parlor_agent::MockBackend;

    const VALID: &str = r#"{
        "overview": {"language": "english", "scenario": "hotel", "turns": 1, "word_count": 3},
        "grammar_errors": [],
        "vocabulary_issues": [],
        "naturalness": [],
        "positive_feedback": ["Clear request"]
    }"#;

    fn owner() -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            password_digest: "digest".into(),
            created_at: Utc::now(),
        }
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::assistant("Welcome! Are you checking in today?"),
            ChatMessage::user("Yes I checking in"),
            ChatMessage::assistant("May I have your name?"),
            ChatMessage::user("Tanaka"),
        ]
    }

    fn orchestrator(
        analysis: &str,
        store: Arc<dyn ConversationStore>,
    ) -> (ReportOrchestrator, RecordingReporter) {
        let reporter = RecordingReporter::new();
        let reports = ReportOrchestrator::new(
            Tutor::new(Arc::new(MockBackend::default().with_response(analysis)), 0.7),
            store,
            Arc::new(reporter.clone()),
        );
        (reports, reporter)
    }

    fn request(session_id: Uuid) -> ReportRequest {
        ReportRequest {
            session_id: session_id.to_string(),
            language: Language::English,
            scenario: Scenario::Hotel,
            conversation: conversation(),
        }
    }

    async fn seed(store: &MemoryStore, owner: &User) -> Uuid {
        store
            .create(NewConversation {
                session_id: Uuid::new_v4(),
                owner_id: Some(owner.id),
                language: Language::English,
                scenario: Scenario::Hotel,
                messages: conversation(),
            })
            .await
            .unwrap()
            .session_id
    }

    #[test]
    fn test_fenced_json_parses() {
        let fenced = format!("```json\n{}\n```", VALID);
        let report = parse_report(&fenced).unwrap();
        assert_eq!(report.positive_feedback, vec!["Clear request".to_string()]);

        let bare_fence = format!("```\n{}\n```", VALID);
        assert!(parse_report(&bare_fence).is_ok());
    }

    #[test]
    fn test_fallback_counts_user_side_only() {
        let report = fallback_report(Language::English, Scenario::Hotel, &conversation());
        assert_eq!(report.overview.turns, 2);
        assert_eq!(report.overview.word_count, 5);
        assert!(report.grammar_errors.is_empty());
        assert_eq!(report.positive_feedback.len(), 1);

        let jp = fallback_report(Language::Japanese, Scenario::Hotel, &[]);
        assert_eq!(jp.overview.turns, 0);
        assert!(jp.positive_feedback[0].starts_with("レポート"));
    }

    #[tokio::test]
    async fn test_malformed_analysis_falls_back() {
        let (reports, _) = orchestrator("Sorry, I can't do JSON today.", Arc::new(MemoryStore::new()));

        let outcome = reports
            .generate(request(Uuid::new_v4()), &Identity::Anonymous)
            .await
            .unwrap();

        assert!(outcome.fallback);
        assert_eq!(outcome.report.overview.turns, 2);
        assert_eq!(outcome.persistence, PersistOutcome::Skipped(SkipReason::Anonymous));
    }

    #[tokio::test]
    async fn test_owner_report_attached_then_replaced() {
        let store = Arc::new(MemoryStore::new());
        let owner = owner();
        let session = seed(&store, &owner).await;
        let (reports, _) = orchestrator(VALID, store.clone());
        let identity = Identity::Authenticated(owner);

        let first = reports.generate(request(session), &identity).await.unwrap();
        assert!(!first.fallback);
        assert_eq!(first.persistence, PersistOutcome::Created);

        let second = reports.generate(request(session), &identity).await.unwrap();
        assert_eq!(second.persistence, PersistOutcome::Updated);

        let stored = store.find_by_session(session).await.unwrap().unwrap();
        assert_eq!(stored.report.unwrap().data, second.report);
    }

    #[tokio::test]
    async fn test_non_owner_not_attached() {
        let store = Arc::new(MemoryStore::new());
        let session = seed(&store, &owner()).await;
        let (reports, _) = orchestrator(VALID, store.clone());

        let outcome = reports
            .generate(request(session), &Identity::Authenticated(owner()))
            .await
            .unwrap();

        assert_eq!(outcome.persistence, PersistOutcome::Skipped(SkipReason::NotOwner));
        let stored = store.find_by_session(session).await.unwrap().unwrap();
        assert!(stored.report.is_none());
    }

    #[tokio::test]
    async fn test_attach_failure_swallowed() {
        let inner = Arc::new(MemoryStore::new());
        let owner = owner();
        let session = seed(&inner, &owner).await;
        let (reports, reporter) = orchestrator(VALID, Arc::new(FailingWrites::new(inner.clone())));

        let outcome = reports
            .generate(request(session), &Identity::Authenticated(owner))
            .await
            .unwrap();

        assert!(!outcome.fallback);
        assert!(matches!(outcome.persistence, PersistOutcome::Failed(_)));
        assert_eq!(reporter.failures()[0].op, PersistOp::AttachReport);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_error() {
        let reports = ReportOrchestrator::new(
            Tutor::new(Arc::new(MockBackend::default().with_available(false)), 0.7),
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingReporter::new()),
        );

        let err = reports
            .generate(request(Uuid::new_v4()), &Identity::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, ParlorError::GenerationFailed(_)));
    }
}
