//! Chat turn orchestration
//!
//! A turn is one user message and one assistant reply. The caller supplies
//! the history it believes the conversation has; the stored message list is
//! replaced with `history ++ [user, assistant]` rather than appended to, so
//! repeating a turn never duplicates it.
//!
//! Buffered and streamed turns share [`TurnOrchestrator::persist_turn`].
//! Persistence happens only after the whole reply exists (after the `done`
//! event in streaming mode) and its failure is reported through the
//! [`FailureReporter`], never to the client.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::failure::{FailureReporter, PersistOp, PersistOutcome, PersistenceFailure, SkipReason};
use super::tutor::Tutor;
use crate::auth::Identity;
use crate::db::ConversationStore;
use crate::models::{ChatMessage, Language, NewConversation, Scenario, User};
use crate::types::{ParlorError, Result};

/// Events buffered between the generation task and the client
const STREAM_BUFFER: usize = 32;

/// Body of `POST /chat` and `POST /chat/stream`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(alias = "session_id")]
    pub session_id: String,
    pub language: Language,
    pub scenario: Scenario,
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Buffered reply sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    pub reply: String,
    pub session_id: String,
}

/// Buffered reply plus what happened to the save
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: TurnReply,
    pub persistence: PersistOutcome,
}

/// One server-sent event of a streamed turn.
///
/// Zero or more `Chunk`s, then exactly one of `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TurnEvent {
    Chunk {
        content: String,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Done {
        content: String,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Error {
        error: String,
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }
}

/// A streamed turn in progress
pub struct StreamedTurn {
    /// Ends right after the terminal event
    pub events: ReceiverStream<TurnEvent>,
    /// Resolves once the turn is saved, skipped or abandoned
    pub persistence: JoinHandle<PersistOutcome>,
}

#[derive(Clone)]
pub struct TurnOrchestrator {
    tutor: Tutor,
    store: Arc<dyn ConversationStore>,
    reporter: Arc<dyn FailureReporter>,
}

impl TurnOrchestrator {
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

    /// Generate the whole reply, then save. Only generation can fail.
    pub async fn chat(&self, request: TurnRequest, identity: &Identity) -> Result<TurnOutcome> {
        let reply = self
            .tutor
            .converse(
                request.language,
                request.scenario,
                &request.history,
                &request.message,
            )
            .await
            .map_err(|e| {
                warn!(session_id = %request.session_id, error = %e, "Conversation failed");
                ParlorError::from(e)
            })?;

        let persistence = self.persist_turn(&request, identity, &reply).await;

        Ok(TurnOutcome {
            reply: TurnReply {
                reply,
                session_id: request.session_id,
            },
            persistence,
        })
    }

    /// Start a streamed turn.
    ///
    /// Generation runs in a spawned task that feeds `events`. Dropping
    /// `events` stops generation and nothing is saved.
    pub fn chat_stream(&self, request: TurnRequest, identity: Identity) -> StreamedTurn {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let this = self.clone();

        let persistence = tokio::spawn(async move {
            let Some(reply) = this.stream_reply(&request, &tx).await else {
                return PersistOutcome::Skipped(SkipReason::Incomplete);
            };
            // Close the event stream before touching the store
            drop(tx);
            this.persist_turn(&request, &identity, &reply).await
        });

        StreamedTurn {
            events: ReceiverStream::new(rx),
            persistence,
        }
    }

    /// Relay chunks to `tx`. Returns the full reply only if `done` was
    /// delivered.
    async fn stream_reply(
        &self,
        request: &TurnRequest,
        tx: &mpsc::Sender<TurnEvent>,
    ) -> Option<String> {
        let session_id = request.session_id.clone();
        let fail = |error: String| TurnEvent::Error {
            error,
            session_id: session_id.clone(),
        };

        let mut stream = match self
            .tutor
            .converse_stream(
                request.language,
                request.scenario,
                &request.history,
                &request.message,
            )
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Conversation stream failed to start");
                let _ = tx.send(fail(e.to_string())).await;
                return None;
            }
        };

        let mut reply = String::new();
        loop {
            let item = tokio::select! {
                item = stream.next() => item,
                _ = tx.closed() => {
                    debug!(session_id = %session_id, "Client went away mid-stream");
                    return None;
                }
            };

            match item {
                Some(Ok(chunk)) => {
                    if chunk.content.is_empty() {
                        continue;
                    }
                    reply.push_str(&chunk.content);
                    let event = TurnEvent::Chunk {
                        content: chunk.content,
                        session_id: session_id.clone(),
                    };
                    if tx.send(event).await.is_err() {
                        debug!(session_id = %session_id, "Client went away mid-stream");
                        return None;
                    }
                }
                Some(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "Conversation stream interrupted");
                    let _ = tx.send(fail(e.to_string())).await;
                    return None;
                }
                None => break,
            }
        }

        let done = TurnEvent::Done {
            content: reply.clone(),
            session_id: session_id.clone(),
        };
        if tx.send(done).await.is_err() {
            debug!(session_id = %session_id, "Client went away before completion");
            return None;
        }
        Some(reply)
    }

    /// Save `history ++ [user, assistant]` for an authenticated caller.
    /// Store errors are reported and folded into the outcome.
    pub async fn persist_turn(
        &self,
        request: &TurnRequest,
        identity: &Identity,
        reply: &str,
    ) -> PersistOutcome {
        let Some(user) = identity.user() else {
            return PersistOutcome::Skipped(SkipReason::Anonymous);
        };
        let Ok(session_id) = Uuid::parse_str(&request.session_id) else {
            debug!(session_id = %request.session_id, "Session id is not a UUID, not saving");
            return PersistOutcome::Skipped(SkipReason::InvalidSession);
        };

        let messages = extend_history(&request.history, &request.message, reply);

        match self.save(user, session_id, request, messages).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.reporter.report(&PersistenceFailure {
                    op: PersistOp::SaveTurn,
                    session_id: request.session_id.clone(),
                    error: e.to_string(),
                });
                PersistOutcome::Failed(e.to_string())
            }
        }
    }

    async fn save(
        &self,
        user: &User,
        session_id: Uuid,
        request: &TurnRequest,
        messages: Vec<ChatMessage>,
    ) -> Result<PersistOutcome> {
        match self.store.find_by_session(session_id).await? {
            Some(existing) if !existing.is_owned_by(user.id) => {
                warn!(session_id = %session_id, user_id = %user.id, "Turn on a session owned by another user, not saving");
                Ok(PersistOutcome::Skipped(SkipReason::NotOwner))
            }
            Some(existing) => {
                self.store.replace_messages(&existing, messages).await?;
                Ok(PersistOutcome::Updated)
            }
            None => {
                let created = self
                    .store
                    .create(NewConversation {
                        session_id,
                        owner_id: Some(user.id),
                        language: request.language,
                        scenario: request.scenario,
                        messages,
                    })
                    .await?;
                info!(session_id = %session_id, conversation_id = %created.id, "Conversation saved");
                Ok(PersistOutcome::Created)
            }
        }
    }
}

/// The caller's snapshot plus this turn
pub fn extend_history(history: &[ChatMessage], message: &str, reply: &str) -> Vec<ChatMessage> {
    let mut extended = Vec::with_capacity(history.len() + 2);
    extended.extend_from_slice(history);
    extended.push(ChatMessage::user(message));
    extended.push(ChatMessage::assistant(reply));
    extended
}
