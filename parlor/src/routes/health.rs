//! Health and version endpoints
//!
//! - /health  - Liveness probe, also names the active store backend
//! - /version - Build information for deployment verification

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests
    pub status: &'static str,
    pub version: &'static str,
    /// "mongodb" or "memory"
    pub store: &'static str,
    /// "development" or "production"
    pub mode: &'static str,
    /// Seconds since startup
    pub uptime: u64,
    pub timestamp: String,
}

/// Handle health endpoint (/health)
pub fn health_check(state: &AppState) -> Response<BoxBody> {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.backend(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    json_response(StatusCode::OK, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "parlor",
    };

    json_response(StatusCode::OK, &response)
}
