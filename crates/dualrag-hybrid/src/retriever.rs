use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use dualrag_core::filter::Filters;
use dualrag_core::traits::{Embedder, RemoteSearch};
use dualrag_core::types::{Query, RetrievalResult, Scope};
use dualrag_core::{Error, Result};
use dualrag_vector::IndexManager;

use crate::merge::merge_results;

/// What happened to one side of a retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Ok { hits: usize },
    /// Not consulted because of the query scope.
    Skipped,
    Failed { error: String },
}

impl SourceStatus {
    pub fn is_failed(&self) -> bool { matches!(self, SourceStatus::Failed { .. }) }
}

#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub results: Vec<RetrievalResult>,
    pub local: SourceStatus,
    pub remote: SourceStatus,
}

impl Retrieval {
    /// True when a consulted source failed and the answer is partial.
    pub fn is_degraded(&self) -> bool { self.local.is_failed() || self.remote.is_failed() }
}

/// Fans a query out to the local index and the remote bridge concurrently.
///
/// Filters describe domain items and are sent to the remote side, except on
/// guidance-only queries, where they apply to the local chunks instead.
pub struct DualRetriever {
    local: Arc<IndexManager>,
    embedder: Arc<dyn Embedder>,
    remote: Option<Arc<dyn RemoteSearch>>,
    remote_timeout: Duration,
}

impl DualRetriever {
    pub fn new(
        local: Arc<IndexManager>,
        embedder: Arc<dyn Embedder>,
        remote: Option<Arc<dyn RemoteSearch>>,
        remote_timeout: Duration,
    ) -> Self {
        Self { local, embedder, remote, remote_timeout }
    }

    pub fn local(&self) -> &Arc<IndexManager> { &self.local }

    pub fn remote(&self) -> Option<&Arc<dyn RemoteSearch>> { self.remote.as_ref() }

    pub fn remote_timeout(&self) -> Duration { self.remote_timeout }

    /// Merged, deduplicated, ranked results for `query`.
    ///
    /// A failing source is reported in the returned status and does not fail
    /// the call; only when every consulted source fails is
    /// `Error::RetrievalUnavailable` returned.
    pub async fn retrieve(&self, query: &Query) -> Result<Retrieval> {
        query.validate()?;
        let started = Instant::now();

        let local_fut = async {
            if query.scope.wants_local() { Some(self.search_local(query).await) } else { None }
        };
        let remote_fut = async {
            if query.scope.wants_remote() { Some(self.search_remote(query).await) } else { None }
        };
        let (local, remote) = tokio::join!(local_fut, remote_fut);

        // a query the remote rejected is the caller's error, not an outage
        for outcome in [&local, &remote] {
            if let Some(Err(Error::InvalidQuery(msg))) = outcome {
                return Err(Error::InvalidQuery(msg.clone()));
            }
        }

        let (local_hits, local_status) = settle("local", local);
        let (remote_hits, remote_status) = settle("remote", remote);

        let nothing_succeeded = !matches!(local_status, SourceStatus::Ok { .. })
            && !matches!(remote_status, SourceStatus::Ok { .. });
        if nothing_succeeded {
            let describe = |s: &SourceStatus| match s {
                SourceStatus::Failed { error } => error.clone(),
                SourceStatus::Skipped => "not consulted".to_string(),
                SourceStatus::Ok { .. } => "ok".to_string(),
            };
            return Err(Error::RetrievalUnavailable { local: describe(&local_status), remote: describe(&remote_status) });
        }

        let results = merge_results(local_hits, remote_hits, query.top_n);
        info!(
            scope = ?query.scope,
            local = ?local_status,
            remote = ?remote_status,
            returned = results.len(),
            took_ms = started.elapsed().as_millis() as u64,
            "retrieval finished"
        );
        Ok(Retrieval { results, local: local_status, remote: remote_status })
    }

    async fn search_local(&self, query: &Query) -> Result<Vec<RetrievalResult>> {
        let vector = self.embedder.embed(&query.text).await?;
        let filters = if query.scope == Scope::GuidanceOnly { query.filters.clone() } else { Filters::new() };
        let hits = self.local.query(&vector, query.top_n, query.similarity_floor, &filters)?;
        debug!(hits = hits.len(), "local search");
        Ok(hits)
    }

    async fn search_remote(&self, query: &Query) -> Result<Vec<RetrievalResult>> {
        let Some(remote) = &self.remote else {
            return Err(Error::RemoteUnavailable("no remote index configured".into()));
        };
        let hits = remote
            .search(&query.text, query.top_n, &query.filters, query.similarity_floor, self.remote_timeout)
            .await?;
        debug!(hits = hits.len(), "remote search");
        Ok(hits)
    }
}

fn settle(side: &str, outcome: Option<Result<Vec<RetrievalResult>>>) -> (Vec<RetrievalResult>, SourceStatus) {
    match outcome {
        None => (Vec::new(), SourceStatus::Skipped),
        Some(Ok(hits)) => {
            let status = SourceStatus::Ok { hits: hits.len() };
            (hits, status)
        }
        Some(Err(e)) => {
            warn!(side, "source failed, continuing without it: {e}");
            (Vec::new(), SourceStatus::Failed { error: e.to_string() })
        }
    }
}
