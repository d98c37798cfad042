use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dualrag_core::traits::{DocumentFeed, Embedder};
use dualrag_core::types::{FeedSource, RefreshOutcome, SourceRecord};
use dualrag_core::{Error, Result};
use dualrag_embed::HashEmbedder;
use dualrag_vector::{IndexManager, JsonFileFeed, RefreshScheduler, StaticFeed};

/// Hashing embedder that refuses any text containing "FAIL".
struct FlakyEmbedder(HashEmbedder);

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn embedder_id(&self) -> &str { "flaky" }
    fn dim(&self) -> usize { self.0.dim() }
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("FAIL") {
            return Err(Error::EmbeddingUnavailable("model offline".into()));
        }
        self.0.embed(text).await
    }
}

struct FailingFeed;

#[async_trait]
impl DocumentFeed for FailingFeed {
    fn name(&self) -> &str { "failing" }
    async fn fetch(&self) -> Result<Vec<SourceRecord>> { Err(Error::Feed("connection refused".into())) }
}

/// Counts fetches and takes a while, so overlapping refreshes can be observed.
struct SlowFeed {
    fetches: AtomicUsize,
}

#[async_trait]
impl DocumentFeed for SlowFeed {
    fn name(&self) -> &str { "slow" }
    async fn fetch(&self) -> Result<Vec<SourceRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(records(3))
    }
}

fn records(n: usize) -> Vec<SourceRecord> {
    (0..n).map(|i| SourceRecord::new(format!("r{i}"), format!("record number {i}"))).collect()
}

fn setup(embedder: Arc<dyn Embedder>) -> Arc<IndexManager> {
    Arc::new(IndexManager::new("events", embedder.dim()))
}

#[tokio::test]
async fn two_failed_embeddings_make_a_partial_refresh() {
    let embedder: Arc<dyn Embedder> = Arc::new(FlakyEmbedder(HashEmbedder::new(64)));
    let manager = setup(embedder.clone());
    let mut recs = records(10);
    recs[3].text = "FAIL one".into();
    recs[7].text = "FAIL two".into();
    let scheduler = RefreshScheduler::builder(manager.clone(), embedder)
        .primary(Arc::new(StaticFeed::new("static", recs)))
        .batch_size(4)
        .build();

    let job = scheduler.refresh_now().await;
    assert_eq!(job.outcome, RefreshOutcome::Partial);
    assert_eq!(job.source_count, 10);
    assert_eq!(job.indexed_count, 8);
    assert_eq!(job.skipped, vec!["r3".to_string(), "r7".to_string()]);
    assert_eq!(manager.len(), 8);
    assert!(manager.snapshot().get("r3").is_none());
    assert_eq!(scheduler.last_job(), Some(job));
}

#[tokio::test]
async fn all_failed_embeddings_keep_current_generation() {
    let embedder: Arc<dyn Embedder> = Arc::new(FlakyEmbedder(HashEmbedder::new(64)));
    let manager = setup(embedder.clone());
    let ok = RefreshScheduler::builder(manager.clone(), embedder.clone())
        .primary(Arc::new(StaticFeed::new("ok", records(2))))
        .build();
    assert_eq!(ok.refresh_now().await.outcome, RefreshOutcome::Success);
    let generation = manager.snapshot().generation();

    let bad = vec![SourceRecord::new("x", "FAIL"), SourceRecord::new("y", "FAIL too")];
    let scheduler = RefreshScheduler::builder(manager.clone(), embedder)
        .primary(Arc::new(StaticFeed::new("bad", bad)))
        .build();
    let job = scheduler.refresh_now().await;
    assert_eq!(job.outcome, RefreshOutcome::Failed);
    assert_eq!(manager.snapshot().generation(), generation);
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn primary_failure_falls_back_to_bundled_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");
    std::fs::write(
        &path,
        r#"[{"id": "e1", "title": "Farmers market", "isFree": true, "category": "Food"},
            {"id": "e2", "title": "Synth workshop", "price": 20.0, "category": "Tech"}]"#,
    )
    .unwrap();

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
    let manager = setup(embedder.clone());
    let scheduler = RefreshScheduler::builder(manager.clone(), embedder)
        .primary(Arc::new(FailingFeed))
        .fallback(Arc::new(JsonFileFeed::new(&path)))
        .build();

    let job = scheduler.refresh_now().await;
    assert_eq!(job.outcome, RefreshOutcome::Success);
    assert_eq!(job.source, Some(FeedSource::Fallback));
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn no_usable_feed_fails_without_touching_the_index() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(8));
    let manager = setup(embedder.clone());
    let scheduler = RefreshScheduler::builder(manager.clone(), embedder).primary(Arc::new(FailingFeed)).build();
    let job = scheduler.refresh_now().await;
    assert_eq!(job.outcome, RefreshOutcome::Failed);
    assert!(job.error.as_deref().unwrap_or_default().contains("connection refused"));
    assert!(manager.is_empty());
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
    let manager = setup(embedder.clone());
    let feed = Arc::new(SlowFeed { fetches: AtomicUsize::new(0) });
    let scheduler = RefreshScheduler::builder(manager.clone(), embedder).primary(feed.clone()).build();

    let (a, b, c) = tokio::join!(scheduler.refresh_now(), scheduler.refresh_now(), scheduler.refresh_now());
    assert_eq!(feed.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert!(!scheduler.is_refreshing());

    scheduler.refresh_now().await;
    assert_eq!(feed.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn old_generation_serves_while_refresh_runs() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
    let manager = setup(embedder.clone());
    let seed = RefreshScheduler::builder(manager.clone(), embedder.clone())
        .primary(Arc::new(StaticFeed::new("seed", vec![SourceRecord::new("seed", "seed text")])))
        .build();
    seed.refresh_now().await;

    let scheduler = RefreshScheduler::builder(manager.clone(), embedder)
        .primary(Arc::new(SlowFeed { fetches: AtomicUsize::new(0) }))
        .build();
    let running = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.refresh_now().await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(manager.snapshot().get("seed").is_some());
    running.await.unwrap();
    assert!(manager.snapshot().get("seed").is_none());
    assert_eq!(manager.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_fires_on_interval() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
    let manager = setup(embedder.clone());
    let scheduler = RefreshScheduler::builder(manager.clone(), embedder)
        .primary(Arc::new(StaticFeed::new("static", records(2))))
        .build();
    let handle = scheduler.spawn_periodic(Duration::from_secs(1800));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(scheduler.last_job().is_none());

    tokio::time::sleep(Duration::from_secs(1800)).await;
    for _ in 0..10 {
        if scheduler.last_job().is_some() { break; }
        tokio::task::yield_now().await;
    }
    assert_eq!(scheduler.last_job().map(|j| j.outcome), Some(RefreshOutcome::Success));
    handle.abort();
}
