use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::filter::Filters;
use crate::types::{Document, RefreshJob, RetrievalResult, SourceRecord};

/// Turns text into fixed-dimension vectors.
///
/// Implementations must be deterministic for identical text and configuration,
/// and report an unreachable model or service as `Error::EmbeddingUnavailable`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider and model (e.g. `hash:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// One result per input, in input order. A failure affects only its own slot.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await);
        }
        out
    }
}

/// A source of truth for an index's documents.
#[async_trait]
pub trait DocumentFeed: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<Vec<SourceRecord>>;
}

/// Health of a remote corpus, as reported across the bridge.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct RemoteHealth {
    pub index: String,
    pub documents: usize,
    pub last_refresh: Option<RefreshJob>,
}

/// Read-only access to the remote corpus.
#[async_trait]
pub trait RemoteSearch: Send + Sync {
    async fn search(
        &self,
        text: &str,
        top_n: usize,
        filters: &Filters,
        similarity_floor: f32,
        timeout: Duration,
    ) -> Result<Vec<RetrievalResult>>;

    async fn list_all(&self, timeout: Duration) -> Result<Vec<Document>>;

    async fn health(&self, timeout: Duration) -> Result<RemoteHealth>;
}
