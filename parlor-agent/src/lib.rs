//! Parlor Agent - LLM backends for conversation practice
//!
//! Provides the language-model side of Parlor:
//! - Trait-based LLM backends (any OpenAI-compatible endpoint)
//! - Incremental token streaming with mid-stream failure reporting
//! - A scripted mock backend for deterministic tests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        parlor::services::Tutor          │
//! │  (converse / converse_stream / analyze) │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌─────────────┐
//! │ OpenAi      │       │ Mock        │
//! │ Backend     │       │ Backend     │
//! └─────────────┘       └─────────────┘
//! ```

pub mod backend;
pub mod stream;

pub use backend::traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmBackend, LlmError, Message,
    MessageRole, Usage,
};
pub use backend::{MockBackend, OpenAiBackend};
pub use stream::{StreamChunk, TokenStream, TokenStreamSender};
