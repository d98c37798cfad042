use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use dualrag_core::filter::Filters;
use dualrag_core::types::{Metadata, Query, RetrievalResult, Scope, Source};
use dualrag_hybrid::{format_context, SourceStatus};

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub similarity_floor: Option<f32>,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub scope: Scope,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
    pub source: Source,
}

impl From<RetrievalResult> for SearchHit {
    fn from(r: RetrievalResult) -> Self {
        Self { id: r.document.id, text: r.document.text, metadata: r.document.metadata, score: r.score, source: r.source }
    }
}

#[derive(Debug, Serialize)]
pub struct Sources {
    pub local: SourceStatus,
    pub remote: SourceStatus,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    /// Rendered context block for the generation step.
    pub context: String,
    pub degraded: bool,
    pub sources: Sources,
}

/// `POST /search`. No results is a 200 with an empty list; 503 only when
/// neither corpus could be searched.
pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request_id = headers.get("X-Request-Id").and_then(|h| h.to_str().ok()).unwrap_or("-");
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".into()));
    }

    let defaults = &state.settings.retrieval;
    let query = Query::new(req.query.clone(), req.top_n.unwrap_or(defaults.top_n))
        .with_floor(req.similarity_floor.unwrap_or(defaults.similarity_floor))
        .with_filters(req.filters)
        .with_scope(req.scope);
    debug!(request_id = %request_id, query = %query.text, scope = ?query.scope, "search: start");

    let retrieval = state.retriever.retrieve(&query).await?;
    let context = format_context(&retrieval.results);
    let degraded = retrieval.is_degraded();
    debug!(request_id = %request_id, hits = retrieval.results.len(), degraded, "search: done");

    let body = SearchResponse {
        query: req.query,
        results: retrieval.results.into_iter().map(SearchHit::from).collect(),
        context,
        degraded,
        sources: Sources { local: retrieval.local, remote: retrieval.remote },
    };
    Ok(ApiResponse::success(body).into_response_with_status(StatusCode::OK))
}
