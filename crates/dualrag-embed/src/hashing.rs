use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use dualrag_core::traits::Embedder;
use dualrag_core::Result;

use crate::normalize::l2_normalize;

/// Feature-hashing embedder. Every lowercased token is hashed into one of
/// `dim` buckets, so texts sharing words land close together. No model, no
/// network, fully deterministic: the default for tests and offline runs.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    id: String,
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { id: format!("hash:d{dim}"), dim }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in tokens(text).enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i as f32 % 3.0) * 0.01;
        }
        l2_normalize(&mut v);
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_ignores_case_and_punctuation() {
        let e = HashEmbedder::new(64);
        assert_eq!(e.embed_sync("Free Concert!"), e.embed_sync("free, concert"));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let e = HashEmbedder::new(16);
        assert!(e.embed_sync("   ").iter().all(|x| *x == 0.0));
    }
}
