//! Domain types shared by the index, the bridge and the retriever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::filter::{Filters, EVENT_FILTER_KEYS, GUIDANCE_FILTER_KEYS};

pub type DocumentId = String;
pub type Metadata = BTreeMap<String, Scalar>;

/// A scalar metadata value. Serialized untagged so metadata reads as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Ordering between two scalars of the same kind. Mixed kinds are unordered.
    pub fn partial_order(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self { Scalar::Text(s.to_string()) }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self { Scalar::Text(s) }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self { Scalar::Bool(b) }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self { Scalar::Number(n) }
}

/// An embedded document held by a vector index.
///
/// - `id`: unique within its index and stable across refresh cycles
/// - `text`: the payload that was embedded
/// - `metadata`: scalar attributes used by filters
/// - `vector`: embedding of `text`; empty when a document travels without it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: Metadata, vector: Vec<f32>) -> Self {
        Self { id: id.into(), text: text.into(), metadata, vector }
    }

    /// Copy of the document with the vector dropped, for wire and HTTP payloads.
    pub fn without_vector(&self) -> Self {
        Self { id: self.id.clone(), text: self.text.clone(), metadata: self.metadata.clone(), vector: Vec::new() }
    }
}

/// A raw record from a document feed, before embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: DocumentId,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Metadata::new() }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Scalar>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn into_document(self, vector: Vec<f32>) -> Document {
        Document { id: self.id, text: self.text, metadata: self.metadata, vector }
    }
}

/// Which corpus produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Local,
    Remote,
}

/// Which corpora a query should reach.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    All,
    GuidanceOnly,
    DomainOnly,
}

impl Scope {
    pub fn wants_local(self) -> bool { !matches!(self, Scope::DomainOnly) }
    pub fn wants_remote(self) -> bool { !matches!(self, Scope::GuidanceOnly) }
}

/// A natural-language query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub filters: Filters,
    pub top_n: usize,
    #[serde(default)]
    pub similarity_floor: f32,
    #[serde(default)]
    pub scope: Scope,
}

impl Query {
    pub fn new(text: impl Into<String>, top_n: usize) -> Self {
        Self { text: text.into(), filters: Filters::default(), top_n, similarity_floor: 0.0, scope: Scope::All }
    }

    pub fn with_floor(mut self, floor: f32) -> Self {
        self.similarity_floor = floor;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.top_n == 0 {
            return Err(crate::error::Error::InvalidQuery("top_n must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_floor) {
            return Err(crate::error::Error::InvalidQuery(format!(
                "similarity_floor must be within [0, 1], got {}",
                self.similarity_floor
            )));
        }
        // guidance-only queries filter the local chunks; otherwise filters
        // describe events and travel to the remote corpus
        let allowed = if self.scope == Scope::GuidanceOnly { GUIDANCE_FILTER_KEYS } else { EVENT_FILTER_KEYS };
        if let Some(key) = self.filters.unknown_key(allowed) {
            return Err(crate::error::Error::InvalidQuery(format!("unknown filter key '{key}'")));
        }
        Ok(())
    }
}

/// One ranked hit. `score` is in [0, 1], higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub document: Document,
    pub score: f32,
    pub source: Source,
}

impl RetrievalResult {
    pub fn id(&self) -> &str { &self.document.id }
}

/// Result order: score descending, then id ascending.
pub fn rank_order(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.document.id.cmp(&b.document.id))
}

pub fn rank(results: &mut [RetrievalResult]) {
    results.sort_by(rank_order);
}

/// Where a refresh took its documents from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefreshOutcome {
    Success,
    Partial,
    Failed,
}

/// Status of the most recent refresh of an index. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshJob {
    pub index: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: Option<FeedSource>,
    pub source_count: usize,
    pub indexed_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<DocumentId>,
    pub outcome: RefreshOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32) -> RetrievalResult {
        RetrievalResult { document: Document::new(id, id, Metadata::new(), vec![]), score, source: Source::Local }
    }

    #[test]
    fn rank_breaks_ties_by_id() {
        let mut hits = vec![hit("b", 0.5), hit("c", 0.9), hit("a", 0.5)];
        rank(&mut hits);
        let ids: Vec<&str> = hits.iter().map(RetrievalResult::id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn metadata_scalars_read_as_plain_json() {
        let rec = SourceRecord::new("e1", "concert")
            .with_meta("category", "music")
            .with_meta("is_free", true)
            .with_meta("price", 12.5);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["metadata"]["category"], "music");
        assert_eq!(json["metadata"]["is_free"], true);
        assert_eq!(json["metadata"]["price"], 12.5);
        let back: SourceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn vectorless_documents_omit_the_field() {
        let doc = Document::new("d", "text", Metadata::new(), vec![0.1, 0.2]);
        let json = serde_json::to_value(doc.without_vector()).unwrap();
        assert!(json.get("vector").is_none());
    }

    #[test]
    fn query_validation_rejects_zero_top_n_and_bad_floor() {
        assert!(Query::new("q", 0).validate().is_err());
        assert!(Query::new("q", 3).with_floor(1.5).validate().is_err());
        assert!(Query::new("q", 3).with_floor(0.4).validate().is_ok());
    }

    #[test]
    fn filter_keys_are_checked_against_the_scoped_corpus() {
        let venue = Filters::new().exact("venue", "hall");
        let err = Query::new("q", 3).with_filters(venue).validate().unwrap_err();
        assert!(matches!(err, crate::error::Error::InvalidQuery(ref m) if m.contains("venue")));

        let free = Filters::new().exact("is_free", true);
        assert!(Query::new("q", 3).with_filters(free.clone()).validate().is_ok());
        assert!(Query::new("q", 3).with_filters(free).with_scope(Scope::GuidanceOnly).validate().is_err());

        let faq = Filters::new().exact("category", "faq");
        assert!(Query::new("q", 3).with_filters(faq).with_scope(Scope::GuidanceOnly).validate().is_ok());
    }
}
