//! POST /api/report/generate

use hyper::{Response, StatusCode};
use tracing::debug;

use super::{json_response, ApiRequest, BoxBody};
use crate::server::AppState;
use crate::services::{ReportRequest, ReportResponse};
use crate::types::Result;

pub async fn handle_generate_report(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let request: ReportRequest = req.json()?;
    let identity = state.identity.resolve_optional(req.authorization()).await;
    let session_id = request.session_id.clone();

    let outcome = state.reports.generate(request, &identity).await?;
    debug!(
        session_id = %session_id,
        fallback = outcome.fallback,
        persistence = ?outcome.persistence,
        "Report generated"
    );

    Ok(json_response(
        StatusCode::OK,
        &ReportResponse {
            report: outcome.report,
        },
    ))
}
