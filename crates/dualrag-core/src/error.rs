use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dimension mismatch for document '{id}': expected {expected}, got {actual}")]
    DimensionMismatch { id: String, expected: usize, actual: usize },

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("remote call '{method}' timed out after {timeout_ms} ms")]
    RemoteTimeout { method: String, timeout_ms: u64 },

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("retrieval unavailable (local: {local}; remote: {remote})")]
    RetrievalUnavailable { local: String, remote: String },

    #[error("protocol error [{code}]: {message}")]
    Protocol { code: String, message: String },

    #[error("feed failed: {0}")]
    Feed(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn protocol(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Protocol { code: code.into(), message: message.into() }
    }

    /// Failures a caller may retry later without changing its input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingUnavailable(_)
                | Error::RemoteTimeout { .. }
                | Error::RemoteUnavailable(_)
                | Error::RetrievalUnavailable { .. }
                | Error::Feed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
