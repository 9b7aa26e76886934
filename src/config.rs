use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::aggregator::QuerySettings;
use crate::http::FetchConfig;
use crate::types::{AggregatorError, Result};

/// Static startup configuration, loaded once and handed to the wiring code.
///
/// String values support `${ENV_VAR}` indirection resolved against the
/// process environment at load time; an unresolved variable fails the load
/// rather than silently becoming empty.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api_key: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One configured account/feed entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    /// Platform key: "github", "instagram", "linkedin" or "threads".
    pub platform: String,
    pub account: String,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_fetch_timeout_seconds() -> u64 {
    30
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let resolved = resolve_placeholders(raw)?;
        let config: AppConfig = serde_json::from_str(&resolved)?;
        if config.api_key.trim().is_empty() {
            return Err(AggregatorError::Config(
                "api_key must not be empty".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings {
            fetch_timeout: std::time::Duration::from_secs(self.fetch_timeout_seconds),
            max_concurrent_fetches: self.max_concurrent_fetches,
        }
    }
}

/// Replaces every `${VAR}` in the raw config text with the environment value.
fn resolve_placeholders(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find('}').ok_or_else(|| {
            AggregatorError::Config("unclosed ${ placeholder in config".to_string())
        })?;
        let name = &after[..close];
        if name.is_empty() {
            return Err(AggregatorError::Config(
                "empty ${} placeholder in config".to_string(),
            ));
        }
        let value = std::env::var(name)
            .map_err(|_| AggregatorError::MissingEnvVar {
                name: name.to_string(),
            })?;
        out.push_str(&value);
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
