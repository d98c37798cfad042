use std::collections::HashMap;

use dualrag_core::filter::Filters;
use dualrag_core::types::{rank_order, Document, DocumentId, RetrievalResult, Source};
use dualrag_core::{Error, Result};

/// One generation of an in-memory similarity index.
///
/// Every stored vector has exactly `dimension` components. A generation is
/// built privately and then handed to [`crate::IndexManager::swap`]; once
/// served it is only read.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    name: String,
    dimension: usize,
    generation: u64,
    documents: HashMap<DocumentId, Document>,
}

impl VectorIndex {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self::with_generation(name, dimension, 0)
    }

    pub(crate) fn with_generation(name: impl Into<String>, dimension: usize, generation: u64) -> Self {
        Self { name: name.into(), dimension, generation, documents: HashMap::new() }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn dimension(&self) -> usize { self.dimension }
    pub fn generation(&self) -> u64 { self.generation }
    pub fn len(&self) -> usize { self.documents.len() }
    pub fn is_empty(&self) -> bool { self.documents.is_empty() }
    pub fn get(&self, id: &str) -> Option<&Document> { self.documents.get(id) }

    pub(crate) fn set_generation(&mut self, generation: u64) { self.generation = generation; }

    /// Insert or replace documents by id. The whole batch is validated first,
    /// so a single bad vector leaves the index untouched.
    pub fn upsert(&mut self, documents: Vec<Document>) -> Result<()> {
        if let Some(bad) = documents.iter().find(|d| d.vector.len() != self.dimension) {
            return Err(Error::DimensionMismatch {
                id: bad.id.clone(),
                expected: self.dimension,
                actual: bad.vector.len(),
            });
        }
        for doc in documents {
            self.documents.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    /// Remove documents by id, returning how many were present.
    pub fn delete<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        ids.iter().filter(|id| self.documents.remove(id.as_ref()).is_some()).count()
    }

    /// Exhaustive cosine search. Filters are applied before scoring, results
    /// below `similarity_floor` are dropped, and the rest come back ranked by
    /// score descending then id ascending.
    pub fn query(
        &self,
        vector: &[f32],
        top_n: usize,
        similarity_floor: f32,
        filters: &Filters,
    ) -> Result<Vec<RetrievalResult>> {
        if self.documents.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                id: "<query>".to_string(),
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let mut hits: Vec<RetrievalResult> = self
            .documents
            .values()
            .filter(|doc| filters.matches(&doc.metadata))
            .map(|doc| (doc, cosine_similarity(vector, &doc.vector)))
            .filter(|(_, score)| *score >= similarity_floor)
            .map(|(doc, score)| RetrievalResult { document: doc.clone(), score, source: Source::Local })
            .collect();
        hits.sort_by(rank_order);
        hits.truncate(top_n);
        Ok(hits)
    }

    /// All documents ordered by id.
    pub fn list_all(&self) -> Vec<&Document> {
        let mut docs: Vec<&Document> = self.documents.values().collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }
}

/// Cosine similarity clamped to [0, 1]. Zero-norm inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    (dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualrag_core::types::Metadata;

    fn doc(id: &str, vector: Vec<f32>) -> Document {
        Document::new(id, id, Metadata::new(), vector)
    }

    #[test]
    fn empty_index_returns_no_results() {
        let idx = VectorIndex::new("t", 3);
        assert!(idx.query(&[1.0, 0.0, 0.0], 5, 0.0, &Filters::new()).unwrap().is_empty());
    }

    #[test]
    fn upsert_rejects_whole_batch_on_dimension_mismatch() {
        let mut idx = VectorIndex::new("t", 2);
        idx.upsert(vec![doc("a", vec![1.0, 0.0])]).unwrap();
        let err = idx.upsert(vec![doc("b", vec![0.0, 1.0]), doc("c", vec![1.0])]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 1, .. }));
        assert_eq!(idx.len(), 1);
        assert!(idx.get("b").is_none());
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut idx = VectorIndex::new("t", 2);
        idx.upsert(vec![doc("a", vec![1.0, 0.0])]).unwrap();
        idx.upsert(vec![Document::new("a", "new text", Metadata::new(), vec![0.0, 1.0])]).unwrap();
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get("a").unwrap().text, "new text");
    }

    #[test]
    fn query_ranks_floors_and_truncates() {
        let mut idx = VectorIndex::new("t", 2);
        idx.upsert(vec![
            doc("x", vec![1.0, 0.0]),
            doc("y", vec![0.8, 0.6]),
            doc("z", vec![0.0, 1.0]),
            doc("w", vec![-1.0, 0.0]),
        ])
        .unwrap();
        let hits = idx.query(&[1.0, 0.0], 10, 0.5, &Filters::new()).unwrap();
        let ids: Vec<&str> = hits.iter().map(RetrievalResult::id).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert!((hits[1].score - 0.8).abs() < 1e-6);

        let top1 = idx.query(&[1.0, 0.0], 1, 0.0, &Filters::new()).unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[test]
    fn filters_apply_before_ranking() {
        let mut idx = VectorIndex::new("t", 2);
        let mut tagged = Metadata::new();
        tagged.insert("category".into(), "music".into());
        idx.upsert(vec![
            doc("best", vec![1.0, 0.0]),
            Document::new("music", "m", tagged, vec![0.6, 0.8]),
        ])
        .unwrap();
        let hits = idx.query(&[1.0, 0.0], 5, 0.0, &Filters::new().exact("category", "music")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), "music");
    }

    #[test]
    fn cosine_is_clamped_and_zero_safe() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn delete_and_list_all_by_id() {
        let mut idx = VectorIndex::new("t", 1);
        idx.upsert(vec![doc("b", vec![1.0]), doc("a", vec![1.0]), doc("c", vec![1.0])]).unwrap();
        assert_eq!(idx.delete(&["c", "missing"]), 1);
        let ids: Vec<&str> = idx.list_all().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
