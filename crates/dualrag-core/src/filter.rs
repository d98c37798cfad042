//! Metadata filters applied before ranking.
//!
//! A filter is a map from metadata key to a condition. Conditions are either an
//! exact scalar match or an inclusive `{gte, lte}` range over ordered values
//! (numbers, ISO-8601 date strings). A document missing a filtered key never
//! matches. A date-only bound (`2026-11-02`) is compared against the date part
//! of a timestamp, so an inclusive `lte` keeps events later that same day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::{Metadata, Scalar};

/// Metadata keys carried by event documents.
pub const EVENT_FILTER_KEYS: &[&str] = &["category", "is_free", "price", "start_date", "location", "tags", "title"];

/// Metadata keys carried by guidance chunks.
pub const GUIDANCE_FILTER_KEYS: &[&str] = &["category", "source_path"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Exact(Scalar),
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<Scalar>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lte: Option<Scalar>,
    },
}

impl Condition {
    pub fn matches(&self, value: &Scalar) -> bool {
        match self {
            Condition::Exact(expected) => expected == value,
            Condition::Range { gte, lte } => {
                let lower_ok = gte.as_ref().map_or(true, |lo| {
                    matches!(compare_to_bound(value, lo), Some(Ordering::Greater | Ordering::Equal))
                });
                let upper_ok = lte.as_ref().map_or(true, |hi| {
                    matches!(compare_to_bound(value, hi), Some(Ordering::Less | Ordering::Equal))
                });
                lower_ok && upper_ok
            }
        }
    }
}

fn is_date_only(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn compare_to_bound(value: &Scalar, bound: &Scalar) -> Option<Ordering> {
    match (value, bound) {
        (Scalar::Text(v), Scalar::Text(b)) if is_date_only(b) => {
            let day = v.get(..b.len()).unwrap_or(v);
            Some(day.cmp(b.as_str()))
        }
        _ => value.partial_order(bound),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, Condition>);

impl Filters {
    pub fn new() -> Self { Self::default() }

    pub fn exact(mut self, key: &str, value: impl Into<Scalar>) -> Self {
        self.0.insert(key.to_string(), Condition::Exact(value.into()));
        self
    }

    pub fn range(mut self, key: &str, gte: Option<Scalar>, lte: Option<Scalar>) -> Self {
        self.0.insert(key.to_string(), Condition::Range { gte, lte });
        self
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

    /// First key not in `allowed`, if any.
    pub fn unknown_key(&self, allowed: &[&str]) -> Option<&str> {
        self.keys().find(|k| !allowed.contains(k))
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(key, cond)| metadata.get(key).is_some_and(|v| cond.matches(v)))
    }
}
