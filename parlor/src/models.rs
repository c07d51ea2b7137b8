//! Domain types shared by the stores, orchestrators and routes.
//!
//! Wire names are camelCase; the snake_case spellings used by older clients
//! and by the analysis prompt are accepted as aliases on input.

use chrono::{DateTime, Utc};
use parlor_agent::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Practice language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Japanese,
    #[default]
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Japanese => "japanese",
            Self::English => "english",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation setting the assistant role-plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    // Daily life
    Restaurant,
    Hotel,
    Supermarket,
    Transportation,
    // Social
    SelfIntro,
    #[default]
    CasualChat,
    PhoneAppointment,
    // Professional / academic
    JobInterview,
    BusinessEmail,
    Classroom,
}

impl Scenario {
    pub const ALL: [Scenario; 10] = [
        Self::Restaurant,
        Self::Hotel,
        Self::Supermarket,
        Self::Transportation,
        Self::SelfIntro,
        Self::CasualChat,
        Self::PhoneAppointment,
        Self::JobInterview,
        Self::BusinessEmail,
        Self::Classroom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restaurant => "restaurant",
            Self::Hotel => "hotel",
            Self::Supermarket => "supermarket",
            Self::Transportation => "transportation",
            Self::SelfIntro => "self_intro",
            Self::CasualChat => "casual_chat",
            Self::PhoneAppointment => "phone_appointment",
            Self::JobInterview => "job_interview",
            Self::BusinessEmail => "business_email",
            Self::Classroom => "classroom",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of a conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == ChatRole::User
    }
}

impl From<&ChatMessage> for Message {
    fn from(msg: &ChatMessage) -> Self {
        match msg.role {
            ChatRole::User => Message::user(msg.content.clone()),
            ChatRole::Assistant => Message::assistant(msg.content.clone()),
        }
    }
}

/// Registered account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Argon2 PHC string, never the plaintext
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted conversation, addressed by clients through `session_id`
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    /// `None` marks a guest-origin conversation
    pub owner_id: Option<Uuid>,
    pub session_id: Uuid,
    pub language: Language,
    pub scenario: Scenario,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub report: Option<StoredReport>,
}

impl Conversation {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == Some(user_id)
    }
}

/// Input for `ConversationStore::create`
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub session_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub language: Language,
    pub scenario: Scenario,
    pub messages: Vec<ChatMessage>,
}

/// A report attached to a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub data: Report,
    pub created_at: DateTime<Utc>,
}

/// Structured feedback on a transcript
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub overview: ReportOverview,
    #[serde(alias = "grammar_errors")]
    pub grammar_errors: Vec<GrammarError>,
    #[serde(alias = "vocabulary_issues")]
    pub vocabulary_issues: Vec<VocabularyIssue>,
    #[serde(alias = "naturalness_issues")]
    pub naturalness: Vec<NaturalnessIssue>,
    #[serde(alias = "positive_feedback")]
    pub positive_feedback: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOverview {
    pub language: String,
    pub scenario: String,
    pub turns: u32,
    #[serde(alias = "word_count")]
    pub word_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrammarError {
    pub error: String,
    pub correction: String,
    pub explanation: String,
    #[serde(default, alias = "error_type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyIssue {
    pub original: String,
    pub suggestion: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NaturalnessIssue {
    pub unnatural: String,
    pub natural: String,
    pub context: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_wire_names() {
        for scenario in Scenario::ALL {
            let json = serde_json::to_string(&scenario).unwrap();
            assert_eq!(json, format!("\"{}\"", scenario.as_str()));
        }
        assert!(serde_json::from_str::<Scenario>("\"karaoke\"").is_err());
    }

    #[test]
    fn test_report_accepts_prompt_spelling() {
        let raw = r#"{
            "overview": {"language": "english", "scenario": "hotel", "turns": 2, "word_count": 9},
            "grammar_errors": [{"error": "I has", "correction": "I have", "explanation": "agreement", "error_type": "verb"}],
            "vocabulary_issues": [],
            "naturalness": [],
            "positive_feedback": ["Nice greeting"]
        }"#;

        let report: Report = serde_json::from_str(raw).unwrap();
        assert_eq!(report.overview.word_count, 9);
        assert_eq!(report.grammar_errors[0].error_type.as_deref(), Some("verb"));

        let out = serde_json::to_value(&report).unwrap();
        assert_eq!(out["overview"]["wordCount"], 9);
        assert_eq!(out["grammarErrors"][0]["errorType"], "verb");
        assert_eq!(out["positiveFeedback"][0], "Nice greeting");
    }

    #[test]
    fn test_report_rejects_missing_sections() {
        let raw = r#"{"overview": {"language": "english", "scenario": "hotel", "turns": 1, "wordCount": 1}}"#;
        assert!(serde_json::from_str::<Report>(raw).is_err());
    }

    #[test]
    fn test_message_role_is_closed() {
        assert!(serde_json::from_str::<ChatMessage>(r#"{"role":"system","content":"x"}"#).is_err());
        let msg: ChatMessage = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert!(msg.is_user());
    }
}
