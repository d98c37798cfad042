//! Periodic and on-demand repopulation of an index.
//!
//! A refresh fetches from the primary feed (falling back to the bundled
//! dataset), embeds in batches, builds a brand-new generation and swaps it in.
//! At most one refresh runs per scheduler; a request that arrives while one is
//! running waits for that run and receives its job.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use dualrag_core::traits::{DocumentFeed, Embedder};
use dualrag_core::types::{Document, FeedSource, RefreshJob, RefreshOutcome, SourceRecord};
use dualrag_core::{Error, Result};

use crate::manager::IndexManager;

type InFlight = Shared<BoxFuture<'static, RefreshJob>>;

#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    manager: Arc<IndexManager>,
    embedder: Arc<dyn Embedder>,
    primary: Option<Arc<dyn DocumentFeed>>,
    fallback: Option<Arc<dyn DocumentFeed>>,
    batch_size: usize,
    concurrency: usize,
    in_flight: Mutex<Option<InFlight>>,
    last_job: RwLock<Option<RefreshJob>>,
}

pub struct RefreshSchedulerBuilder {
    manager: Arc<IndexManager>,
    embedder: Arc<dyn Embedder>,
    primary: Option<Arc<dyn DocumentFeed>>,
    fallback: Option<Arc<dyn DocumentFeed>>,
    batch_size: usize,
    concurrency: usize,
}

impl RefreshSchedulerBuilder {
    pub fn primary(mut self, feed: Arc<dyn DocumentFeed>) -> Self {
        self.primary = Some(feed);
        self
    }

    pub fn fallback(mut self, feed: Arc<dyn DocumentFeed>) -> Self {
        self.fallback = Some(feed);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn build(self) -> RefreshScheduler {
        RefreshScheduler {
            inner: Arc::new(Inner {
                manager: self.manager,
                embedder: self.embedder,
                primary: self.primary,
                fallback: self.fallback,
                batch_size: self.batch_size,
                concurrency: self.concurrency,
                in_flight: Mutex::new(None),
                last_job: RwLock::new(None),
            }),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RefreshScheduler {
    pub fn builder(manager: Arc<IndexManager>, embedder: Arc<dyn Embedder>) -> RefreshSchedulerBuilder {
        RefreshSchedulerBuilder { manager, embedder, primary: None, fallback: None, batch_size: 32, concurrency: 4 }
    }

    pub fn manager(&self) -> &Arc<IndexManager> { &self.inner.manager }

    /// The most recent completed refresh, if any.
    pub fn last_job(&self) -> Option<RefreshJob> {
        self.inner.last_job.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_refreshing(&self) -> bool { lock(&self.inner.in_flight).is_some() }

    /// Run a refresh, or join the one already in flight.
    ///
    /// The work runs on its own task, so dropping the returned future does not
    /// cancel the refresh for other waiters.
    pub async fn refresh_now(&self) -> RefreshJob {
        let fut = {
            let mut slot = lock(&self.inner.in_flight);
            match slot.as_ref() {
                Some(running) => {
                    debug!(index = %self.inner.manager.name(), "refresh already running, joining it");
                    running.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let index = inner.manager.name().to_string();
                    let handle = tokio::spawn(async move {
                        let job = inner.run().await;
                        *inner.last_job.write().unwrap_or_else(PoisonError::into_inner) = Some(job.clone());
                        *lock(&inner.in_flight) = None;
                        job
                    });
                    let shared = async move {
                        handle.await.unwrap_or_else(|e| {
                            error!(index = %index, "refresh task aborted: {e}");
                            let now = Utc::now();
                            RefreshJob {
                                index,
                                started_at: now,
                                finished_at: now,
                                source: None,
                                source_count: 0,
                                indexed_count: 0,
                                skipped: Vec::new(),
                                outcome: RefreshOutcome::Failed,
                                error: Some(format!("refresh task aborted: {e}")),
                            }
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };
        fut.await
    }

    /// Refresh every `interval` until the returned handle is aborted. The
    /// first run happens one interval from now; callers wanting an immediate
    /// refresh call [`Self::refresh_now`] first.
    pub fn spawn_periodic(&self, interval: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let job = scheduler.refresh_now().await;
                debug!(index = %job.index, outcome = ?job.outcome, "periodic refresh finished");
            }
        })
    }
}

impl Inner {
    async fn run(&self) -> RefreshJob {
        let index = self.manager.name().to_string();
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut job = RefreshJob {
            index: index.clone(),
            started_at,
            finished_at: started_at,
            source: None,
            source_count: 0,
            indexed_count: 0,
            skipped: Vec::new(),
            outcome: RefreshOutcome::Failed,
            error: None,
        };

        let (records, source) = match self.fetch().await {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(index = %index, "refresh fetch failed: {e}");
                job.error = Some(e.to_string());
                job.finished_at = Utc::now();
                return job;
            }
        };
        job.source = Some(source);
        job.source_count = records.len();

        let (documents, skipped) = self.embed_all(records).await;
        job.skipped = skipped;

        if documents.is_empty() {
            warn!(index = %index, skipped = job.skipped.len(), "no document could be embedded, keeping current generation");
            job.error = Some("no document could be embedded".to_string());
            job.finished_at = Utc::now();
            return job;
        }

        let mut next = self.manager.builder();
        let swapped = next.upsert(documents).and_then(|()| {
            let indexed = next.len();
            self.manager.swap(next).map(|_| indexed)
        });
        match swapped {
            Ok(indexed) => {
                job.indexed_count = indexed;
                job.outcome = if job.skipped.is_empty() { RefreshOutcome::Success } else { RefreshOutcome::Partial };
            }
            Err(e) => {
                error!(index = %index, "building generation failed: {e}");
                job.error = Some(e.to_string());
            }
        }
        job.finished_at = Utc::now();
        info!(
            index = %index,
            source = ?job.source,
            fetched = job.source_count,
            indexed = job.indexed_count,
            skipped = job.skipped.len(),
            outcome = ?job.outcome,
            took_ms = timer.elapsed().as_millis() as u64,
            "refresh finished"
        );
        job
    }

    /// Primary feed first; any failure or an empty result falls back to the
    /// bundled dataset.
    async fn fetch(&self) -> Result<(Vec<SourceRecord>, FeedSource)> {
        let mut primary_error = None;
        if let Some(primary) = &self.primary {
            match primary.fetch().await {
                Ok(records) if !records.is_empty() => return Ok((records, FeedSource::Primary)),
                Ok(_) => {
                    warn!(feed = primary.name(), "primary feed returned no records, using fallback");
                    primary_error = Some("primary feed returned no records".to_string());
                }
                Err(e) => {
                    warn!(feed = primary.name(), "primary feed failed, using fallback: {e}");
                    primary_error = Some(e.to_string());
                }
            }
        }
        let Some(fallback) = &self.fallback else {
            return Err(Error::Feed(primary_error.unwrap_or_else(|| "no feed configured".to_string())));
        };
        let records = fallback.fetch().await.map_err(|e| match &primary_error {
            Some(p) => Error::Feed(format!("{p}; fallback: {e}")),
            None => e,
        })?;
        if records.is_empty() {
            return Err(Error::Feed(format!("fallback feed {} returned no records", fallback.name())));
        }
        Ok((records, FeedSource::Fallback))
    }

    /// Embed in batches of `batch_size`, up to `concurrency` batches at a time.
    /// Returns the embedded documents and the ids that were skipped.
    async fn embed_all(&self, records: Vec<SourceRecord>) -> (Vec<Document>, Vec<String>) {
        let dim = self.embedder.dim();
        let batches: Vec<Vec<SourceRecord>> =
            records.chunks(self.batch_size).map(<[SourceRecord]>::to_vec).collect();

        let results: Vec<(Vec<SourceRecord>, Vec<Result<Vec<f32>>>)> = stream::iter(batches)
            .map(|batch| async move {
                let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
                let vectors = self.embedder.embed_batch(&texts).await;
                (batch, vectors)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut documents = Vec::new();
        let mut skipped = Vec::new();
        for (batch, vectors) in results {
            let mut vectors = vectors.into_iter();
            for record in batch {
                match vectors.next() {
                    Some(Ok(v)) if v.len() == dim => documents.push(record.into_document(v)),
                    Some(Ok(v)) => {
                        warn!(id = %record.id, expected = dim, actual = v.len(), "embedding has wrong dimension, skipping");
                        skipped.push(record.id);
                    }
                    Some(Err(e)) => {
                        warn!(id = %record.id, "embedding failed, skipping: {e}");
                        skipped.push(record.id);
                    }
                    None => {
                        warn!(id = %record.id, "embedder returned too few vectors, skipping");
                        skipped.push(record.id);
                    }
                }
            }
        }
        (documents, skipped)
    }
}
