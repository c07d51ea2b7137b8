//! HTTP Routes for Authentication
//!
//! - POST /api/auth/register - Create an account and get an access token
//! - POST /api/auth/login    - Exchange email and password for an access token
//! - GET  /api/auth/me       - Current user from the bearer token

use chrono::{DateTime, Utc};
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{json_response, ApiRequest, BoxBody};
use crate::auth::require_identity;
use crate::server::AppState;
use crate::types::{ParlorError, Result};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /api/auth/register
pub async fn handle_register(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let body: RegisterRequest = req.json()?;

    let user = state.credentials.register(&body.email, &body.password).await?;
    let token = state.tokens.issue(user.id)?;

    info!(user_id = %user.id, "User registered");
    Ok(json_response(StatusCode::CREATED, &TokenResponse::bearer(token)))
}

/// POST /api/auth/login
///
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn handle_login(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let body: LoginRequest = req.json()?;

    let Some(user) = state
        .credentials
        .authenticate(&body.email, &body.password)
        .await?
    else {
        warn!("Failed login attempt");
        return Err(ParlorError::Unauthenticated(
            "Incorrect email or password".into(),
        ));
    };

    let token = state.tokens.issue(user.id)?;
    info!(user_id = %user.id, "User logged in");
    Ok(json_response(StatusCode::OK, &TokenResponse::bearer(token)))
}

/// GET /api/auth/me
pub async fn handle_me(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let identity = state.identity.resolve_optional(req.authorization()).await;
    let user = require_identity(identity)?;

    Ok(json_response(
        StatusCode::OK,
        &MeResponse {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        },
    ))
}
