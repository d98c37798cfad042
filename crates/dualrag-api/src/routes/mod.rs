pub mod health;
pub mod refresh;
pub mod search;

use axum::http::StatusCode;
use axum::response::Response;

use crate::response::ApiResponse;

pub async fn not_found() -> Response {
    ApiResponse::error("NOT_FOUND", "no such route").into_response_with_status(StatusCode::NOT_FOUND)
}
