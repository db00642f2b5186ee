use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./discovery.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Reconciliation tuning (optional - sensible defaults)
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Deliver change notifications to plugin callbacks
    #[serde(default = "default_notify")]
    pub notify: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig::default(),
            storage: None,
            notify: default_notify(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ReconcileConfig {
    /// Bound on every connection attempt, in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// How often to sweep unconnected targets, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl ReconcileConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_notify() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
