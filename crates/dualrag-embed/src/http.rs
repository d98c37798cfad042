use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use dualrag_core::config::EmbeddingSettings;
use dualrag_core::traits::Embedder;
use dualrag_core::{Error, Result};

use crate::normalize::l2_normalize;

/// Client for an Ollama-compatible embedding service
/// (`POST {endpoint}/api/embeddings` with `{model, prompt}`).
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    dim: usize,
    id: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(endpoint: &str, model: &str, dim: usize, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::EmbeddingUnavailable(format!("http client init: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/api/embeddings", endpoint.trim_end_matches('/')),
            model: model.to_string(),
            dim,
            id: format!("http:{model}:d{dim}"),
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        Self::new(
            &settings.endpoint,
            &settings.model,
            settings.dimension,
            Duration::from_millis(settings.timeout_ms),
        )
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest { model: &self.model, prompt: text })
            .send()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(format!("request to {}: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::EmbeddingUnavailable(format!("embedding service returned {status}: {body}")));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| Error::EmbeddingUnavailable(format!("malformed embedding response: {e}")))?;

        if parsed.embedding.len() != self.dim {
            return Err(Error::EmbeddingUnavailable(format!(
                "model '{}' returned {} dims, configured for {}",
                self.model,
                parsed.embedding.len(),
                self.dim
            )));
        }
        debug!(model = %self.model, chars = text.len(), "embedded text");
        let mut v = parsed.embedding;
        l2_normalize(&mut v);
        Ok(v)
    }
}
