//! Conversation turns
//!
//! - POST /api/chat        - Whole reply as JSON
//! - POST /api/chat/stream - Reply as server-sent events
//!
//! A bearer token is optional. Without one the turn is answered but
//! nothing is stored.

use hyper::{Response, StatusCode};
use tracing::debug;

use super::{json_response, sse_response, ApiRequest, BoxBody};
use crate::server::AppState;
use crate::services::TurnRequest;
use crate::types::Result;

/// POST /api/chat
pub async fn handle_chat(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let request: TurnRequest = req.json()?;
    let identity = state.identity.resolve_optional(req.authorization()).await;

    let outcome = state.turns.chat(request, &identity).await?;
    debug!(
        session_id = %outcome.reply.session_id,
        persistence = ?outcome.persistence,
        "Turn answered"
    );

    Ok(json_response(StatusCode::OK, &outcome.reply))
}

/// POST /api/chat/stream
///
/// Generation failures arrive as an `error` event on a 200 stream; only a
/// malformed body is rejected up front.
pub async fn handle_chat_stream(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let request: TurnRequest = req.json()?;
    let identity = state.identity.resolve_optional(req.authorization()).await;

    // The save runs detached after the last event.
    let streamed = state.turns.chat_stream(request, identity);
    Ok(sse_response(streamed.events))
}
