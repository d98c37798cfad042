//! HTTP surface of the assistant: search, on-demand refresh and health.

pub mod error;
pub mod response;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;
pub use server::{build_router, serve, shutdown_signal};
pub use state::AppState;
