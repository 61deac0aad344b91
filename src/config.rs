//! TOML configuration parsing, validation, and reloadable snapshots.
//!
//! A [`Config`] is immutable once loaded. Long-running processes hold a
//! [`ConfigHandle`], which hands out the current snapshot as an `Arc<Config>`
//! and can atomically swap in a freshly loaded one. Work that already took a
//! snapshot keeps using it; only operations started after the swap see the
//! new values.
//!
//! The bind address, database path, and analysis worker count are consumed
//! once at startup. Service URLs, timeouts, and history limits are read per
//! operation and therefore follow reloads.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    pub services: ServicesConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Location and time budgets of the external analysis service, which
/// provides metadata lookup, segmentation, and question answering.
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub base_url: String,
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,
    #[serde(default = "default_chat_timeout")]
    pub chat_timeout_secs: u64,
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,
}

fn default_metadata_timeout() -> u64 {
    30
}
fn default_chat_timeout() -> u64 {
    60
}
fn default_analysis_timeout() -> u64 {
    300
}

impl ServicesConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize {
    1
}
fn default_queue_capacity() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_limit")]
    pub default_limit: i64,
    #[serde(default = "default_history_max")]
    pub max_limit: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_history_limit(),
            max_limit: default_history_max(),
        }
    }
}

fn default_history_limit() -> i64 {
    50
}
fn default_history_max() -> i64 {
    200
}

impl HistoryConfig {
    /// Resolves a caller-supplied limit: absent → default, otherwise clamped
    /// to `[1, max_limit]`.
    pub fn resolve_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate services
    let base = url::Url::parse(&config.services.base_url).with_context(|| {
        format!(
            "services.base_url is not a valid URL: '{}'",
            config.services.base_url
        )
    })?;
    if !matches!(base.scheme(), "http" | "https") {
        bail!("services.base_url must use http or https");
    }
    if config.services.metadata_timeout_secs == 0
        || config.services.chat_timeout_secs == 0
        || config.services.analysis_timeout_secs == 0
    {
        bail!("services timeouts must be > 0");
    }

    // Validate analysis
    if config.analysis.workers == 0 {
        bail!("analysis.workers must be >= 1");
    }
    if config.analysis.queue_capacity == 0 {
        bail!("analysis.queue_capacity must be >= 1");
    }

    // Validate history
    if config.history.default_limit < 1 {
        bail!("history.default_limit must be >= 1");
    }
    if config.history.max_limit < config.history.default_limit {
        bail!("history.max_limit must be >= history.default_limit");
    }

    Ok(())
}

/// Shared, swappable handle to the current [`Config`] snapshot.
pub struct ConfigHandle {
    path: Option<PathBuf>,
    current: RwLock<Arc<Config>>,
}

impl ConfigHandle {
    /// Loads the file at `path` and remembers it for [`reload`](Self::reload).
    pub fn load(path: &Path) -> Result<Self> {
        let config = load_config(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Wraps an already-built config. Such a handle cannot reload.
    pub fn fixed(config: Config) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-reads and validates the config file, then swaps it in. On error
    /// the previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<Config>> {
        let Some(path) = &self.path else {
            bail!("configuration was not loaded from a file");
        };
        let fresh = Arc::new(load_config(path)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = fresh.clone();
        Ok(fresh)
    }
}
