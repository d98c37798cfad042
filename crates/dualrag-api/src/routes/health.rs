use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

/// `GET /health`. Always 200; `status` is `degraded` when the remote bridge
/// is configured but unreachable or the local index is empty.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let local = state.retriever.local();
    let documents = local.len();
    let local_view = json!({
        "index": local.name(),
        "documents": documents,
        "last_refresh": state.scheduler.last_job(),
    });

    let (remote_view, remote_ok) = match state.retriever.remote() {
        None => (json!({ "configured": false }), true),
        Some(remote) => match remote.health(state.retriever.remote_timeout()).await {
            Ok(h) => (json!({ "configured": true, "reachable": true, "health": h }), true),
            Err(e) => (json!({ "configured": true, "reachable": false, "error": e.to_string() }), false),
        },
    };

    let status = if remote_ok && documents > 0 { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "service": "dualrag-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "local": local_view,
        "remote": remote_view,
    }))
}
