use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for dhbuffer.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Aggregation buffer sizing.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Report ingestion configuration.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Aggregation buffer sizing.
///
/// Capacities are initial sizes only; the buffer grows without bound.
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Initial number of subjects the outer map is sized for. Default: 64.
    #[serde(default = "default_subject_capacity")]
    pub subject_capacity: usize,

    /// Initial number of buckets each subject's map is sized for. Default: 16.
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: usize,
}

/// Report ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Producer threads used to insert reports. Default: 1.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Skip reports whose timestamp is older than this. 0s disables the
    /// check. Default: 0s (a live log tail uses 5m).
    #[serde(default, with = "humantime_serde")]
    pub stale_after: Duration,

    /// Abort ingestion after this many invalid lines. 0 means unlimited.
    /// Default: 0.
    #[serde(default)]
    pub max_errors: usize,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_subject_capacity() -> usize {
    64
}

fn default_bucket_capacity() -> usize {
    16
}

fn default_workers() -> usize {
    1
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            buffer: BufferConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            subject_capacity: default_subject_capacity(),
            bucket_capacity: default_bucket_capacity(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            stale_after: Duration::ZERO,
            max_errors: 0,
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        Self::from_yaml(&data).with_context(|| format!("loading config file {}", path.display()))
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data).context("parsing config")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.log_level.is_empty() {
            bail!("log_level must not be empty");
        }

        if self.ingest.workers == 0 {
            bail!("ingest.workers must be at least 1");
        }

        Ok(())
    }
}
