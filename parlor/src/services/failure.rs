//! Persistence outcome and failure side channel
//!
//! Chat and report flows never fail because a save failed. What happened to
//! the save is returned as a [`PersistOutcome`] and failures are handed to a
//! [`FailureReporter`], which logs them in production and records them in
//! tests.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Which write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOp {
    SaveTurn,
    AttachReport,
    Migrate,
}

impl fmt::Display for PersistOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SaveTurn => "save_turn",
            Self::AttachReport => "attach_report",
            Self::Migrate => "migrate",
        })
    }
}

/// A swallowed store error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceFailure {
    pub op: PersistOp,
    pub session_id: String,
    pub error: String,
}

/// Why nothing was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Guest request
    Anonymous,
    /// Session id is not a UUID
    InvalidSession,
    /// The session belongs to someone else
    NotOwner,
    /// Report requested for a session with no stored conversation
    NoConversation,
    /// Generation failed or the client went away before the reply was whole
    Incomplete,
}

/// What happened to a best-effort write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Created,
    Updated,
    Skipped(SkipReason),
    Failed(String),
}

impl PersistOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// Receives persistence failures that were not surfaced to the client
pub trait FailureReporter: Send + Sync {
    fn report(&self, failure: &PersistenceFailure);
}

/// Logs failures at `warn`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, failure: &PersistenceFailure) {
        warn!(
            op = %failure.op,
            session_id = %failure.session_id,
            error = %failure.error,
            "Persistence failed; response already delivered"
        );
    }
}

/// Keeps failures in memory so tests can assert on them
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    failures: Arc<Mutex<Vec<PersistenceFailure>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<PersistenceFailure> {
        self.failures
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, failure: &PersistenceFailure) {
        if let Ok(mut guard) = self.failures.lock() {
            guard.push(failure.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter_shares_state() {
        let reporter = RecordingReporter::new();
        let handle = reporter.clone();

        reporter.report(&PersistenceFailure {
            op: PersistOp::SaveTurn,
            session_id: "s".into(),
            error: "down".into(),
        });

        assert_eq!(handle.failures().len(), 1);
        assert_eq!(handle.failures()[0].op, PersistOp::SaveTurn);
    }

    #[test]
    fn test_outcome_written() {
        assert!(PersistOutcome::Created.is_written());
        assert!(!PersistOutcome::Skipped(SkipReason::Anonymous).is_written());
        assert!(!PersistOutcome::Failed("x".into()).is_written());
    }
}
