//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys in env vars are separated by `__`, e.g.
//! `APP_REFRESH__INTERVAL_SECS=60`. Every setting has a default so an empty
//! environment still yields a runnable configuration.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub embedding: EmbeddingSettings,
    pub refresh: RefreshSettings,
    pub retrieval: RetrievalSettings,
    pub bridge: BridgeSettings,
    pub server: ServerSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Hash,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
    /// Base URL of the embedding service when `provider = "http"`.
    pub endpoint: String,
    pub timeout_ms: u64,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            model: "nomic-embed-text".to_string(),
            dimension: 384,
            endpoint: "http://127.0.0.1:11434".to_string(),
            timeout_ms: 10_000,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub interval_secs: u64,
    /// Primary feed of domain items. No primary feed means fallback only.
    pub feed_url: Option<String>,
    pub feed_timeout_ms: u64,
    /// Bundled events dataset used when the primary feed fails.
    pub fallback_path: String,
    /// Directory of guidance `.txt` files for the local corpus.
    pub guidance_dir: String,
    /// Bundled guidance dataset used when `guidance_dir` cannot be read.
    /// Unset means the guidance index has no fallback.
    pub guidance_fallback_path: Option<String>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            feed_url: None,
            feed_timeout_ms: 15_000,
            fallback_path: "data/events_fallback.json".to_string(),
            guidance_dir: "data/guidance".to_string(),
            guidance_fallback_path: None,
        }
    }
}

impl RefreshSettings {
    pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_n: usize,
    pub similarity_floor: f32,
    pub remote_timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { top_n: 5, similarity_floor: 0.0, remote_timeout_ms: 3_000 } }
}

impl RetrievalSettings {
    pub fn remote_timeout(&self) -> Duration { Duration::from_millis(self.remote_timeout_ms) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// `host:port` of a bridge server reachable over TCP.
    pub address: Option<String>,
    /// Program to spawn as a stdio bridge server when no address is set.
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Listen address of the bridge server process when serving TCP.
    pub listen: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self { address: None, command: None, args: Vec::new(), listen: "127.0.0.1:7401".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:8080".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self { Self { level: "info".to_string(), json: false } }
}

impl Settings {
    /// Figment over the config files found in `dir` for the given environment.
    pub fn figment_in(dir: &Path, env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    /// Load from the working directory, selecting the environment via `RUST_ENV`.
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    pub fn load_from(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let settings: Settings = Self::figment_in(dir, env_name)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be greater than 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be greater than 0".into()));
        }
        if self.refresh.interval_secs == 0 {
            return Err(Error::InvalidConfig("refresh.interval_secs must be greater than 0".into()));
        }
        if self.retrieval.top_n == 0 {
            return Err(Error::InvalidConfig("retrieval.top_n must be greater than 0".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_floor) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.similarity_floor must be within [0, 1], got {}",
                self.retrieval.similarity_floor
            )));
        }
        Ok(())
    }
}

/// Expand a user-provided path string (`~`, `${VAR}`, `$VAR`) without
/// canonicalizing it.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let with_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&with_env);
    PathBuf::from(expanded.as_ref())
}

/// Expand `p` and join it onto `base` unless it is already absolute.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
