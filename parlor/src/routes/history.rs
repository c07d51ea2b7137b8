//! Conversation history and guest data migration
//!
//! All routes require a bearer token.
//!
//! - POST   /api/migrate                    - Import client-side conversations
//! - GET    /api/conversations?limit=N      - Caller's conversations, newest first
//! - GET    /api/conversations/{sessionId}  - One conversation by session id
//! - DELETE /api/conversations/{id}         - Delete by internal id, cascades to the report

use chrono::{DateTime, Utc};
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{empty_response, json_response, ApiRequest, BoxBody};
use crate::auth::require_identity;
use crate::models::{ChatMessage, Conversation, Language, Report, Scenario, User};
use crate::server::AppState;
use crate::services::MigrateRequest;
use crate::types::{ParlorError, Result};

/// Upper bound for `limit`
const MAX_LIST_LIMIT: i64 = 100;

/// A stored conversation as returned to its owner
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub id: Uuid,
    pub session_id: Uuid,
    pub language: Language,
    pub scenario: Scenario,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub report: Option<Report>,
}

impl From<Conversation> for ConversationDetail {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            session_id: conversation.session_id,
            language: conversation.language,
            scenario: conversation.scenario,
            messages: conversation.messages,
            created_at: conversation.created_at,
            report: conversation.report.map(|r| r.data),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateResponse {
    pub message: String,
    pub migrated_count: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

async fn current_user(state: &AppState, req: &ApiRequest) -> Result<User> {
    let identity = state.identity.resolve_optional(req.authorization()).await;
    require_identity(identity)
}

fn parse_path_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ParlorError::Validation(format!("Invalid {}: {}", what, raw)))
}

/// POST /api/migrate
pub async fn handle_migrate(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let user = current_user(state, req).await?;
    let body: MigrateRequest = req.json()?;

    let summary = state.migrator.migrate(&user, body.conversations).await;

    Ok(json_response(
        StatusCode::OK,
        &MigrateResponse {
            message: summary.message(),
            migrated_count: summary.migrated_count,
        },
    ))
}

/// GET /api/conversations
pub async fn handle_list_conversations(
    state: &AppState,
    req: &ApiRequest,
) -> Result<Response<BoxBody>> {
    let user = current_user(state, req).await?;

    let query: ListQuery = match req.query.as_deref() {
        Some(raw) => serde_urlencoded::from_str(raw)
            .map_err(|e| ParlorError::Validation(format!("Invalid query: {}", e)))?,
        None => ListQuery::default(),
    };
    let limit = query
        .limit
        .unwrap_or(state.args.conversation_list_limit as i64)
        .clamp(1, MAX_LIST_LIMIT) as usize;

    let conversations = state.store.list_by_owner(user.id, limit).await?;
    let details: Vec<ConversationDetail> = conversations.into_iter().map(Into::into).collect();

    Ok(json_response(StatusCode::OK, &details))
}

/// GET /api/conversations/{sessionId}
pub async fn handle_get_conversation(
    state: &AppState,
    req: &ApiRequest,
    session_id: &str,
) -> Result<Response<BoxBody>> {
    let user = current_user(state, req).await?;
    let session_id = parse_path_id(session_id, "session id")?;

    let conversation = state
        .store
        .find_by_session(session_id)
        .await?
        .ok_or_else(|| ParlorError::NotFound("Conversation not found".into()))?;

    if !conversation.is_owned_by(user.id) {
        return Err(ParlorError::Forbidden(
            "Not authorized to access this conversation".into(),
        ));
    }

    Ok(json_response(
        StatusCode::OK,
        &ConversationDetail::from(conversation),
    ))
}

/// DELETE /api/conversations/{id}
pub async fn handle_delete_conversation(
    state: &AppState,
    req: &ApiRequest,
    conversation_id: &str,
) -> Result<Response<BoxBody>> {
    let user = current_user(state, req).await?;
    let conversation_id = parse_path_id(conversation_id, "conversation id")?;

    let conversation = state
        .store
        .find_by_id(conversation_id)
        .await?
        .ok_or_else(|| ParlorError::NotFound("Conversation not found".into()))?;

    if !conversation.is_owned_by(user.id) {
        return Err(ParlorError::Forbidden(
            "Not authorized to delete this conversation".into(),
        ));
    }

    if !state.store.delete(conversation_id).await? {
        return Err(ParlorError::NotFound("Conversation not found".into()));
    }

    info!(conversation_id = %conversation_id, user_id = %user.id, "Conversation deleted");
    Ok(empty_response(StatusCode::NO_CONTENT))
}
