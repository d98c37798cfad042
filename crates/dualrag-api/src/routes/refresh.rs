use axum::{extract::State, http::StatusCode, response::Response};
use tracing::info;

use dualrag_core::types::RefreshOutcome;

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::state::AppState;

/// `POST /refresh-embeddings`. Rebuilds the local index now, or joins a
/// refresh already in progress, and reports the resulting job.
pub async fn refresh_embeddings(State(state): State<AppState>) -> ApiResult<Response> {
    let job = state.scheduler.refresh_now().await;
    info!(index = %job.index, outcome = ?job.outcome, indexed = job.indexed_count, "refresh requested over http");
    if job.outcome == RefreshOutcome::Failed {
        return Err(ApiError::RefreshFailed(job.error.unwrap_or_else(|| "unknown error".to_string())));
    }
    Ok(ApiResponse::success(job).into_response_with_status(StatusCode::OK))
}
