use std::collections::HashMap;

use dualrag_core::types::{rank, RetrievalResult, Source};

/// Concatenate both sides, collapse ids present on both into the
/// higher-scoring copy (local on a tie), rank, and keep `top_n`.
pub fn merge_results(local: Vec<RetrievalResult>, remote: Vec<RetrievalResult>, top_n: usize) -> Vec<RetrievalResult> {
    let mut by_id: HashMap<String, RetrievalResult> = HashMap::with_capacity(local.len() + remote.len());
    for hit in local.into_iter().chain(remote) {
        match by_id.get_mut(hit.id()) {
            Some(existing) => {
                if beats(&hit, existing) {
                    *existing = hit;
                }
            }
            None => {
                by_id.insert(hit.document.id.clone(), hit);
            }
        }
    }
    let mut merged: Vec<RetrievalResult> = by_id.into_values().collect();
    rank(&mut merged);
    merged.truncate(top_n);
    merged
}

fn beats(candidate: &RetrievalResult, existing: &RetrievalResult) -> bool {
    candidate.score > existing.score
        || (candidate.score == existing.score && candidate.source == Source::Local && existing.source != Source::Local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualrag_core::types::{Document, Metadata};

    fn hit(id: &str, score: f32, source: Source) -> RetrievalResult {
        RetrievalResult { document: Document::new(id, format!("{source:?}"), Metadata::new(), vec![]), score, source }
    }

    #[test]
    fn higher_remote_score_ranks_first() {
        let merged = merge_results(vec![hit("a", 0.9, Source::Local)], vec![hit("b", 0.95, Source::Remote)], 5);
        let ids: Vec<&str> = merged.iter().map(RetrievalResult::id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn colliding_ids_keep_the_higher_score() {
        let merged = merge_results(
            vec![hit("x", 0.4, Source::Local), hit("y", 0.3, Source::Local)],
            vec![hit("x", 0.7, Source::Remote)],
            5,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id(), "x");
        assert_eq!(merged[0].source, Source::Remote);
        assert!((merged[0].score - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn equal_scores_prefer_local() {
        let merged = merge_results(vec![hit("x", 0.5, Source::Local)], vec![hit("x", 0.5, Source::Remote)], 5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, Source::Local);
        let merged = merge_results(vec![], vec![hit("x", 0.5, Source::Remote), hit("x", 0.5, Source::Remote)], 5);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn truncates_after_ranking() {
        let merged = merge_results(
            vec![hit("a", 0.1, Source::Local), hit("b", 0.8, Source::Local)],
            vec![hit("c", 0.5, Source::Remote)],
            2,
        );
        let ids: Vec<&str> = merged.iter().map(RetrievalResult::id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
