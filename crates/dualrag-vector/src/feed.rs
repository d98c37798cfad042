//! Sources of truth for index contents.
//!
//! Dataset files and the HTTP feed share one JSON shape: either an array of
//! entries or an object `{"events": [...]}`. An entry is a ready
//! [`SourceRecord`] (`{id, text, metadata}`) or a raw event record as served
//! by the events API, which is flattened into text plus filterable metadata.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use dualrag_core::data_processor::DataProcessor;
use dualrag_core::traits::DocumentFeed;
use dualrag_core::types::SourceRecord;
use dualrag_core::{Error, Result};

/// An event as published by the events API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_time: Option<String>,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl EventRecord {
    /// Upstream id when present; otherwise a content hash so the same event
    /// keeps its id across refreshes.
    pub fn record_id(&self) -> String {
        match &self.id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                let key = format!(
                    "{}|{}|{}",
                    self.title,
                    self.start_date_time.as_deref().unwrap_or_default(),
                    self.location.as_deref().unwrap_or_default()
                );
                let hex = blake3::hash(key.as_bytes()).to_hex();
                format!("evt-{}", &hex[..16])
            }
        }
    }

    pub fn into_source_record(self) -> SourceRecord {
        let id = self.record_id();
        let mut text = self.title.clone();
        if !self.description.is_empty() {
            text.push('\n');
            text.push_str(&self.description);
        }
        if let Some(location) = &self.location {
            text.push_str(&format!("\nLocation: {location}"));
        }
        if let Some(start) = &self.start_date_time {
            text.push_str(&format!("\nDate: {start}"));
        }
        if let Some(category) = &self.category {
            text.push_str(&format!("\nCategory: {category}"));
        }
        if !self.tags.is_empty() {
            text.push_str(&format!("\nTags: {}", self.tags.join(", ")));
        }

        let mut record = SourceRecord::new(id, text)
            .with_meta("title", self.title)
            .with_meta("is_free", self.is_free);
        if let Some(category) = self.category {
            record = record.with_meta("category", category.to_lowercase());
        }
        if let Some(price) = self.price {
            record = record.with_meta("price", price);
        } else if self.is_free {
            record = record.with_meta("price", 0.0);
        }
        if let Some(start) = self.start_date_time {
            record = record.with_meta("start_date", start);
        }
        if let Some(location) = self.location {
            record = record.with_meta("location", location);
        }
        if !self.tags.is_empty() {
            record = record.with_meta("tags", self.tags.join(", "));
        }
        record
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetEntry {
    Record(SourceRecord),
    Event(EventRecord),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Dataset {
    Wrapped { events: Vec<DatasetEntry> },
    Bare(Vec<DatasetEntry>),
}

/// Parse a dataset payload into source records.
pub fn parse_dataset(bytes: &[u8]) -> Result<Vec<SourceRecord>> {
    let dataset: Dataset =
        serde_json::from_slice(bytes).map_err(|e| Error::Feed(format!("invalid dataset json: {e}")))?;
    let entries = match dataset {
        Dataset::Wrapped { events } => events,
        Dataset::Bare(entries) => entries,
    };
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            DatasetEntry::Record(r) => r,
            DatasetEntry::Event(e) => e.into_source_record(),
        })
        .collect())
}

/// Write records as a pretty-printed dataset that [`JsonFileFeed`] can load.
pub fn write_dataset(path: &Path, records: &[SourceRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::Feed(format!("create {}: {e}", parent.display())))?;
    }
    let json = serde_json::to_vec_pretty(records).map_err(|e| Error::Feed(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| Error::Feed(format!("write {}: {e}", path.display())))
}

/// Fixed in-memory records.
#[derive(Debug, Clone)]
pub struct StaticFeed {
    name: String,
    records: Vec<SourceRecord>,
}

impl StaticFeed {
    pub fn new(name: impl Into<String>, records: Vec<SourceRecord>) -> Self {
        Self { name: name.into(), records }
    }
}

#[async_trait]
impl DocumentFeed for StaticFeed {
    fn name(&self) -> &str { &self.name }

    async fn fetch(&self) -> Result<Vec<SourceRecord>> { Ok(self.records.clone()) }
}

/// A bundled dataset file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileFeed {
    name: String,
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self { name: format!("file:{}", path.display()), path }
    }
}

#[async_trait]
impl DocumentFeed for JsonFileFeed {
    fn name(&self) -> &str { &self.name }

    async fn fetch(&self) -> Result<Vec<SourceRecord>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::Feed(format!("read {}: {e}", self.path.display())))?;
        let records = parse_dataset(&bytes)?;
        debug!(path = %self.path.display(), records = records.len(), "loaded dataset file");
        Ok(records)
    }
}

/// Events API reachable over HTTP.
#[derive(Clone)]
pub struct HttpFeed {
    name: String,
    url: String,
    client: Client,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Feed(format!("http client init: {e}")))?;
        Ok(Self { name: format!("http:{url}"), url, client })
    }
}

#[async_trait]
impl DocumentFeed for HttpFeed {
    fn name(&self) -> &str { &self.name }

    async fn fetch(&self) -> Result<Vec<SourceRecord>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Feed(format!("GET {}: {e}", self.url)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Feed(format!("GET {} returned {status}", self.url)));
        }
        let bytes = resp.bytes().await.map_err(|e| Error::Feed(format!("read body: {e}")))?;
        let records = parse_dataset(&bytes)?;
        info!(url = %self.url, records = records.len(), "fetched feed");
        Ok(records)
    }
}

/// Guidance `.txt` files under a directory, chunked by [`DataProcessor`].
pub struct TextDirFeed {
    name: String,
    dir: PathBuf,
    processor: std::sync::Arc<DataProcessor>,
}

impl TextDirFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_processor(dir, DataProcessor::new())
    }

    pub fn with_processor(dir: impl Into<PathBuf>, processor: DataProcessor) -> Self {
        let dir = dir.into();
        Self { name: format!("dir:{}", dir.display()), dir, processor: std::sync::Arc::new(processor) }
    }
}

#[async_trait]
impl DocumentFeed for TextDirFeed {
    fn name(&self) -> &str { &self.name }

    async fn fetch(&self) -> Result<Vec<SourceRecord>> {
        if !self.dir.is_dir() {
            return Err(Error::Feed(format!("guidance directory {} not found", self.dir.display())));
        }
        let dir = self.dir.clone();
        let processor = self.processor.clone();
        tokio::task::spawn_blocking(move || processor.process_directory(&dir))
            .await
            .map_err(|e| Error::Feed(format!("directory scan task failed: {e}")))?
            .map_err(|e| Error::Feed(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualrag_core::types::Scalar;

    #[test]
    fn event_is_flattened_into_text_and_metadata() {
        let json = r#"[{"id": 42, "title": "Jazz Night", "description": "Live trio",
            "location": "Riverside Hall", "startDateTime": "2026-11-02T19:00:00Z",
            "isFree": false, "price": 15.0, "category": "Music", "tags": ["jazz", "live"]}]"#;
        let records = parse_dataset(json.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, "42");
        assert!(r.text.starts_with("Jazz Night\nLive trio"));
        assert!(r.text.contains("Location: Riverside Hall"));
        assert_eq!(r.metadata["category"], Scalar::from("music"));
        assert_eq!(r.metadata["is_free"], Scalar::Bool(false));
        assert_eq!(r.metadata["price"], Scalar::Number(15.0));
        assert_eq!(r.metadata["start_date"], Scalar::from("2026-11-02T19:00:00Z"));
    }

    #[test]
    fn missing_event_id_hashes_stably() {
        let json = r#"{"events": [{"title": "Market", "isFree": true}]}"#;
        let a = parse_dataset(json.as_bytes()).unwrap();
        let b = parse_dataset(json.as_bytes()).unwrap();
        assert!(a[0].id.starts_with("evt-"));
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].metadata["price"], Scalar::Number(0.0));
    }

    #[test]
    fn source_records_pass_through() {
        let json = r#"[{"id": "faq:0", "text": "How to submit", "metadata": {"category": "faq"}}]"#;
        let records = parse_dataset(json.as_bytes()).unwrap();
        assert_eq!(records[0].id, "faq:0");
        assert_eq!(records[0].metadata["category"], Scalar::from("faq"));
    }

    #[test]
    fn garbage_is_a_feed_error() {
        assert!(matches!(parse_dataset(b"{not json"), Err(Error::Feed(_))));
    }
}
