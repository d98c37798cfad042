use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info};

use dualrag_core::filter::Filters;
use dualrag_core::types::{Document, RetrievalResult};
use dualrag_core::{Error, Result};

use crate::index::VectorIndex;

/// Owner of the generation currently served for one named index.
///
/// Lifecycle of a generation: `builder()` hands out an empty, private index
/// (build), `swap()` publishes it (swap), `snapshot()` readers query it
/// (serve), and the next `swap()` retires it (superseded). Readers holding an
/// old snapshot finish against it; the swap itself only replaces an `Arc`.
pub struct IndexManager {
    name: String,
    dimension: usize,
    active: RwLock<Arc<VectorIndex>>,
    next_generation: AtomicU64,
    // serializes writers so a copy-on-write edit cannot overwrite a concurrent swap
    writer: Mutex<()>,
}

impl IndexManager {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        let name = name.into();
        let initial = VectorIndex::with_generation(name.clone(), dimension, 0);
        Self {
            name,
            dimension,
            active: RwLock::new(Arc::new(initial)),
            next_generation: AtomicU64::new(1),
            writer: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn dimension(&self) -> usize { self.dimension }

    /// The generation currently served.
    pub fn snapshot(&self) -> Arc<VectorIndex> {
        self.active.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// A fresh, empty generation to populate off to the side.
    pub fn builder(&self) -> VectorIndex {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        VectorIndex::with_generation(self.name.clone(), self.dimension, generation)
    }

    /// Publish `next` as the served generation and return the one it replaced.
    pub fn swap(&self, next: VectorIndex) -> Result<Arc<VectorIndex>> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(next)
    }

    fn publish(&self, next: VectorIndex) -> Result<Arc<VectorIndex>> {
        if next.dimension() != self.dimension {
            return Err(Error::DimensionMismatch {
                id: format!("<generation {}>", next.generation()),
                expected: self.dimension,
                actual: next.dimension(),
            });
        }
        let generation = next.generation();
        let documents = next.len();
        let next = Arc::new(next);
        let previous = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, next)
        };
        info!(index = %self.name, generation, documents, superseded = previous.generation(), "swapped index generation");
        Ok(previous)
    }

    pub fn query(
        &self,
        vector: &[f32],
        top_n: usize,
        similarity_floor: f32,
        filters: &Filters,
    ) -> Result<Vec<RetrievalResult>> {
        self.snapshot().query(vector, top_n, similarity_floor, filters)
    }

    /// Copy-on-write upsert into the served generation. On error the served
    /// generation is unchanged.
    pub fn upsert(&self, documents: Vec<Document>) -> Result<()> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = (*self.snapshot()).clone();
        next.upsert(documents)?;
        next.set_generation(self.next_generation.fetch_add(1, Ordering::SeqCst));
        self.publish(next)?;
        Ok(())
    }

    /// Copy-on-write delete. Returns how many ids were present.
    pub fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = (*self.snapshot()).clone();
        let removed = next.delete(ids);
        if removed == 0 {
            debug!(index = %self.name, "delete matched no documents");
            return Ok(0);
        }
        next.set_generation(self.next_generation.fetch_add(1, Ordering::SeqCst));
        self.publish(next)?;
        Ok(removed)
    }

    pub fn len(&self) -> usize { self.snapshot().len() }

    pub fn is_empty(&self) -> bool { self.snapshot().is_empty() }

    pub fn list_all(&self) -> Vec<Document> {
        self.snapshot().list_all().into_iter().cloned().collect()
    }
}
