//! Engine configuration – tunables of the facade, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Tunables of [`MemoryFacade`](crate::facade::MemoryFacade).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum significance of memories gathered for an insight when no
    /// explicit list is supplied.
    #[serde(default = "default_insight_significance")]
    pub insight_significance_threshold: f32,

    /// Upper bound on memories gathered for one insight.
    #[serde(default = "default_insight_search_limit")]
    pub insight_search_limit: usize,

    /// Related memories attached by `enhance_*_with_memory`.
    #[serde(default = "default_related_memories")]
    pub related_memories_per_item: usize,

    /// Insights attached by `enhance_*_with_memory`.
    #[serde(default = "default_insights_per_item")]
    pub insights_per_item: usize,

    /// Numeric context factors strictly above this value trigger insight lookup.
    #[serde(default = "default_context_factor_threshold")]
    pub context_factor_threshold: f64,

    #[serde(default = "default_query_limit")]
    pub default_query_limit: usize,
}

fn default_insight_significance() -> f32 {
    0.3
}
fn default_insight_search_limit() -> usize {
    50
}
fn default_related_memories() -> usize {
    3
}
fn default_insights_per_item() -> usize {
    2
}
fn default_context_factor_threshold() -> f64 {
    0.7
}
fn default_query_limit() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            insight_significance_threshold: default_insight_significance(),
            insight_search_limit: default_insight_search_limit(),
            related_memories_per_item: default_related_memories(),
            insights_per_item: default_insights_per_item(),
            context_factor_threshold: default_context_factor_threshold(),
            default_query_limit: default_query_limit(),
        }
    }
}

impl EngineConfig {
    /// Load from `path` and apply env overrides.  `Ok(None)` when the file
    /// does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut cfg: EngineConfig = toml::from_str(&raw)?;
        cfg.apply_env_overrides();
        Ok(Some(cfg))
    }

    /// Write as pretty TOML, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw).map_err(io_err)
    }

    /// Apply `GROVE_*` environment overrides.  Unparseable values are ignored.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `GROVE_INSIGHT_SIGNIFICANCE` | `insight_significance_threshold` |
    /// | `GROVE_INSIGHT_SEARCH_LIMIT` | `insight_search_limit` |
    /// | `GROVE_RELATED_MEMORIES` | `related_memories_per_item` |
    /// | `GROVE_INSIGHTS_PER_ITEM` | `insights_per_item` |
    /// | `GROVE_CONTEXT_FACTOR_THRESHOLD` | `context_factor_threshold` |
    /// | `GROVE_QUERY_LIMIT` | `default_query_limit` |
    pub fn apply_env_overrides(&mut self) {
        override_from_env("GROVE_INSIGHT_SIGNIFICANCE", &mut self.insight_significance_threshold);
        override_from_env("GROVE_INSIGHT_SEARCH_LIMIT", &mut self.insight_search_limit);
        override_from_env("GROVE_RELATED_MEMORIES", &mut self.related_memories_per_item);
        override_from_env("GROVE_INSIGHTS_PER_ITEM", &mut self.insights_per_item);
        override_from_env("GROVE_CONTEXT_FACTOR_THRESHOLD", &mut self.context_factor_threshold);
        override_from_env("GROVE_QUERY_LIMIT", &mut self.default_query_limit);
    }
}

fn override_from_env<T: std::str::FromStr>(var: &str, slot: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(parsed) = v.trim().parse::<T>()
    {
        *slot = parsed;
    }
}
