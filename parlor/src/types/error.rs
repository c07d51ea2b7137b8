//! Error types for Parlor
//!
//! One taxonomy for the whole service. Store-level conflicts
//! (`Duplicate*`) are distinct variants so callers can tell an invariant
//! violation from an unavailable database.

use hyper::StatusCode;
use parlor_agent::LlmError;
use serde::Serialize;

/// Main error type for Parlor operations
#[derive(Debug, thiserror::Error)]
pub enum ParlorError {
    /// Malformed or missing request fields, enum mismatch
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Session already exists: {0}")]
    DuplicateSession(String),

    #[error("Report already exists for conversation {0}")]
    DuplicateReport(String),

    /// LLM or analysis capability failure
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Store unavailable or a write failed
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Password hashing or token machinery failure
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParlorError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateEmail(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateSession(_) => StatusCode::CONFLICT,
            Self::DuplicateReport(_) => StatusCode::CONFLICT,
            Self::GenerationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::DuplicateEmail(_) => "DUPLICATE_EMAIL",
            Self::DuplicateSession(_) => "DUPLICATE_SESSION",
            Self::DuplicateReport(_) => "DUPLICATE_REPORT",
            Self::GenerationFailed(_) => "GENERATION_FAILED",
            Self::Database(_) => "PERSISTENCE_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// JSON body sent to clients
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            code: Some(self.code().to_string()),
        }
    }
}

/// Error payload returned over HTTP
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<std::io::Error> for ParlorError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ParlorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for ParlorError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for ParlorError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ParlorError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Auth(format!("JWT error: {}", err))
    }
}

impl From<LlmError> for ParlorError {
    fn from(err: LlmError) -> Self {
        Self::GenerationFailed(err.to_string())
    }
}

/// Result type alias for Parlor operations
pub type Result<T> = std::result::Result<T, ParlorError>;
