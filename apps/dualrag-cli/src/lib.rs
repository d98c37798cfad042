//! Wiring shared by the binaries: logging, embedder, refresh schedulers and
//! the remote bridge connection, all driven by [`Settings`].

use anyhow::Context;
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dualrag_bridge::BridgeClient;
use dualrag_core::config::{expand_path, BridgeSettings, LogSettings, Settings};
use dualrag_core::traits::{Embedder, RemoteSearch};
use dualrag_core::types::SourceRecord;
use dualrag_hybrid::DualRetriever;
use dualrag_vector::{HttpFeed, IndexManager, JsonFileFeed, RefreshScheduler, TextDirFeed};

pub const GUIDANCE_INDEX: &str = "guidance";
pub const EVENTS_INDEX: &str = "events";

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(log: &LogSettings, to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let _ = match (log.json, to_stderr) {
        (true, true) => builder.json().with_writer(std::io::stderr).try_init(),
        (true, false) => builder.json().try_init(),
        (false, true) => builder.with_writer(std::io::stderr).try_init(),
        (false, false) => builder.try_init(),
    };
}

/// Load `.env`, then settings from the working directory.
pub fn load_settings() -> anyhow::Result<Settings> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::anyhow!("failed to read .env: {e}"));
        }
    }
    Settings::load()
}

pub fn build_embedder(settings: &Settings) -> anyhow::Result<Arc<dyn Embedder>> {
    dualrag_embed::from_settings(&settings.embedding).context("embedder init")
}

/// Scheduler for the local guidance corpus: the text directory, falling back
/// to `refresh.guidance_fallback_path` when one is set. The events dataset is
/// never used here.
pub fn guidance_scheduler(settings: &Settings, embedder: Arc<dyn Embedder>) -> RefreshScheduler {
    let manager = Arc::new(IndexManager::new(GUIDANCE_INDEX, embedder.dim()));
    let mut builder = RefreshScheduler::builder(manager, embedder)
        .primary(Arc::new(TextDirFeed::new(expand_path(&settings.refresh.guidance_dir))))
        .batch_size(settings.embedding.batch_size);
    if let Some(path) = &settings.refresh.guidance_fallback_path {
        builder = builder.fallback(Arc::new(JsonFileFeed::new(expand_path(path))));
    }
    builder.build()
}

/// Scheduler for the events corpus owned by the bridge server: the events
/// API when configured, the bundled dataset otherwise or on failure.
pub fn events_scheduler(settings: &Settings, embedder: Arc<dyn Embedder>) -> anyhow::Result<RefreshScheduler> {
    let manager = Arc::new(IndexManager::new(EVENTS_INDEX, embedder.dim()));
    let mut builder = RefreshScheduler::builder(manager, embedder)
        .fallback(Arc::new(JsonFileFeed::new(expand_path(&settings.refresh.fallback_path))))
        .batch_size(settings.embedding.batch_size);
    if let Some(url) = &settings.refresh.feed_url {
        let timeout = std::time::Duration::from_millis(settings.refresh.feed_timeout_ms);
        builder = builder.primary(Arc::new(HttpFeed::new(url.as_str(), timeout)?));
    }
    Ok(builder.build())
}

/// Connect to the configured bridge. Returns `None`, after logging, when no
/// bridge is configured or it cannot be reached; retrieval then runs
/// local-only.
pub async fn connect_remote(bridge: &BridgeSettings) -> Option<Arc<dyn RemoteSearch>> {
    let client = if let Some(addr) = &bridge.address {
        BridgeClient::connect_tcp(addr).await
    } else if let Some(command) = &bridge.command {
        BridgeClient::spawn_process(command, &bridge.args)
    } else {
        info!("no bridge configured, events search disabled");
        return None;
    };
    match client {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("bridge unavailable, continuing local-only: {e}");
            None
        }
    }
}

/// Build the guidance index, connect the bridge and assemble the retriever.
pub async fn build_retriever(settings: &Settings) -> anyhow::Result<(DualRetriever, RefreshScheduler)> {
    let embedder = build_embedder(settings)?;
    let scheduler = guidance_scheduler(settings, embedder.clone());
    let job = scheduler.refresh_now().await;
    info!(index = %job.index, outcome = ?job.outcome, documents = job.indexed_count, "initial refresh done");

    let remote = connect_remote(&settings.bridge).await;
    let retriever = DualRetriever::new(
        scheduler.manager().clone(),
        embedder,
        remote,
        settings.retrieval.remote_timeout(),
    );
    Ok((retriever, scheduler))
}

/// Drop records with empty text and repeated ids (the first occurrence wins),
/// ticking `progress` once per input record.
pub fn prepare_bundle(records: Vec<SourceRecord>, progress: &ProgressBar) -> (Vec<SourceRecord>, usize) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());
    let mut dropped = 0;
    for record in records {
        progress.inc(1);
        if record.text.trim().is_empty() || !seen.insert(record.id.clone()) {
            dropped += 1;
            continue;
        }
        kept.push(record);
    }
    (kept, dropped)
}

pub fn write_bundle(path: &Path, records: &[SourceRecord]) -> anyhow::Result<()> {
    dualrag_vector::feed::write_dataset(path, records).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualrag_vector::feed::parse_dataset;

    #[test]
    fn bundle_drops_blank_and_duplicate_records() {
        let records = vec![
            SourceRecord::new("a", "first"),
            SourceRecord::new("b", "   "),
            SourceRecord::new("a", "second"),
            SourceRecord::new("c", "third"),
        ];
        let (kept, dropped) = prepare_bundle(records, &ProgressBar::hidden());
        assert_eq!(dropped, 2);
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(kept[0].text, "first");
    }

    #[test]
    fn written_bundle_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/events.json");
        write_bundle(&path, &[SourceRecord::new("e1", "Jazz night").with_meta("is_free", true)]).unwrap();
        let loaded = parse_dataset(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "e1");
    }

    #[tokio::test]
    async fn guidance_refresh_never_loads_the_events_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let events = dir.path().join("events.json");
        write_bundle(&events, &[SourceRecord::new("evt-1", "Jazz night downtown")]).unwrap();

        let mut settings = Settings::default();
        settings.refresh.guidance_dir = dir.path().join("missing").to_string_lossy().to_string();
        settings.refresh.fallback_path = events.to_string_lossy().to_string();
        let embedder: Arc<dyn Embedder> = Arc::new(dualrag_embed::HashEmbedder::new(16));

        let scheduler = guidance_scheduler(&settings, embedder);
        let job = scheduler.refresh_now().await;
        assert_eq!(job.outcome, dualrag_core::types::RefreshOutcome::Failed);
        assert!(scheduler.manager().is_empty());
    }

    #[tokio::test]
    async fn guidance_refresh_uses_its_own_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let events = dir.path().join("events.json");
        let guidance = dir.path().join("guidance.json");
        write_bundle(&events, &[SourceRecord::new("evt-1", "Jazz night downtown")]).unwrap();
        write_bundle(&guidance, &[SourceRecord::new("faq/refunds:0", "Refunds take five days")]).unwrap();

        let mut settings = Settings::default();
        settings.refresh.guidance_dir = dir.path().join("missing").to_string_lossy().to_string();
        settings.refresh.fallback_path = events.to_string_lossy().to_string();
        settings.refresh.guidance_fallback_path = Some(guidance.to_string_lossy().to_string());
        let embedder: Arc<dyn Embedder> = Arc::new(dualrag_embed::HashEmbedder::new(16));

        let scheduler = guidance_scheduler(&settings, embedder);
        scheduler.refresh_now().await;
        let ids: Vec<String> = scheduler.manager().list_all().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["faq/refunds:0".to_string()]);
    }

    #[test]
    fn events_scheduler_requires_a_valid_feed_client() {
        let mut settings = Settings::default();
        settings.refresh.feed_url = Some("http://127.0.0.1:9/events".into());
        let embedder: Arc<dyn Embedder> = Arc::new(dualrag_embed::HashEmbedder::new(16));
        let scheduler = events_scheduler(&settings, embedder).unwrap();
        assert_eq!(scheduler.manager().name(), EVENTS_INDEX);
        assert_eq!(scheduler.manager().dimension(), 16);
    }
}
