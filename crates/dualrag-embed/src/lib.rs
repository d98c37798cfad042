//! Embedding producers: a deterministic feature-hashing embedder and a client
//! for an HTTP embedding service, selected from configuration.

use std::sync::Arc;

use dualrag_core::config::{EmbeddingProvider, EmbeddingSettings};
use dualrag_core::traits::Embedder;
use dualrag_core::Result;

pub mod hashing;
pub mod http;
pub mod normalize;

pub use hashing::HashEmbedder;
pub use http::HttpEmbedder;
pub use normalize::{l2_norm, l2_normalize};

pub fn from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match settings.provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(settings.dimension)),
        EmbeddingProvider::Http => Arc::new(HttpEmbedder::from_settings(settings)?),
    };
    tracing::info!(embedder = embedder.embedder_id(), dim = embedder.dim(), "embedder ready");
    Ok(embedder)
}
