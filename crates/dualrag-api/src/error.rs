use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::response::ApiResponse;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RetrievalUnavailable(_) | ApiError::RefreshFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::RetrievalUnavailable(_) => "RETRIEVAL_UNAVAILABLE",
            ApiError::RefreshFailed(_) => "REFRESH_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<dualrag_core::Error> for ApiError {
    fn from(err: dualrag_core::Error) -> Self {
        use dualrag_core::Error as E;
        match err {
            E::InvalidQuery(msg) => ApiError::BadRequest(msg),
            e @ E::RetrievalUnavailable { .. } => ApiError::RetrievalUnavailable(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.error_code(), "{self}");
        }
        ApiResponse::error(self.error_code(), self.to_string()).into_response_with_status(status)
    }
}
