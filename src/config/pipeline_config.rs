use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::config::errors::ConfigError;
use crate::types::TargetLag;
use crate::views::{RefreshMode, RefreshPolicy, ViewDefinition, ViewOptions};

const BUILTIN_PIPELINE: &str = include_str!("default_pipeline.toml");

fn default_raw_relation() -> String {
    "raw_transactions".to_string()
}

/// Declarative description of a pipeline: the raw relation, its derived views and
/// the knobs of the ingestion and refresh machinery.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_raw_relation")]
    pub raw_relation: String,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub views: Vec<ViewConfig>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Capacity of the channel between the CSV reader and the ingesting task.
    pub backpressure: usize,
    /// Rows handed to the raw store per append batch.
    pub batch_size: usize
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            backpressure: 256,
            batch_size: 512
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshConfig {
    pub tick_ms: u64,
    pub max_consecutive_failures: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub history_limit: usize
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            tick_ms: 250,
            max_consecutive_failures: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            history_limit: 32
        }
    }
}

impl RefreshConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            max_consecutive_failures: self.max_consecutive_failures.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
            history_limit: self.history_limit
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    pub name: String,
    #[serde(default)]
    pub target_lag: TargetLag,
    #[serde(default)]
    pub refresh_mode: RefreshMode,
    /// Defined and materialized, but left off the refresh schedule.
    #[serde(default)]
    pub suspended: bool,
    pub definition: ViewDefinition
}

impl ViewConfig {
    pub fn options(&self) -> ViewOptions {
        ViewOptions::default()
            .with_target_lag(self.target_lag)
            .with_refresh_mode(self.refresh_mode)
    }
}

impl PipelineConfig {
    /// The fraud detection pipeline shipped with the binary.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(BUILTIN_PIPELINE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source
        })?;

        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(contents)?;
        let mut names = HashSet::new();

        for view in &config.views {
            if !names.insert(view.name.as_str()) {
                return Err(ConfigError::DuplicateView(view.name.clone()));
            }
        }

        Ok(config)
    }
}
