//! Services layer for Parlor
//!
//! ## Services
//!
//! - **Credentials**: registration and password login
//! - **Tutor**: the LLM capability, framed by the scenario prompts
//! - **TurnOrchestrator**: buffered and streamed chat turns with best-effort persistence
//! - **ReportOrchestrator**: transcript analysis with fallback and report attachment
//! - **Migrator**: imports conversations kept client-side by guests who later sign up
//! - **FailureReporter**: side channel for swallowed persistence errors

pub mod credentials;
pub mod failure;
pub mod migration;
pub mod reports;
pub mod turns;
pub mod tutor;

pub use credentials::{Credentials, MIN_PASSWORD_LEN};
pub use failure::{
    FailureReporter, PersistOp, PersistOutcome, PersistenceFailure, RecordingReporter, SkipReason,
    TracingReporter,
};
pub use migration::{MigrateRequest, MigrationItem, MigrationSummary, Migrator};
pub use reports::{
    fallback_report, parse_report, ReportOrchestrator, ReportOutcome, ReportRequest, ReportResponse,
};
pub use turns::{StreamedTurn, TurnEvent, TurnOrchestrator, TurnOutcome, TurnReply, TurnRequest};
pub use tutor::Tutor;
