//! TOML configuration for sentrylog.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detect::engine::DetectionConfig;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "SENTRYLOG_CONFIG";

/// Config file picked up from the working directory.
pub const LOCAL_CONFIG: &str = "sentrylog.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentryConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SentryConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// The config file [`resolve`](Self::resolve) reads, in order:
    /// 1. An explicit path.
    /// 2. The path in `SENTRYLOG_CONFIG`.
    /// 3. `./sentrylog.toml` if present.
    ///
    /// `None` means compiled-in defaults.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(env_path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(env_path));
        }
        let local = Path::new(LOCAL_CONFIG);
        local.exists().then(|| local.to_path_buf())
    }

    /// Load the located config file, or the defaults when there is none. A
    /// located file that cannot be read or parsed is an error.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match Self::locate(explicit) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    pub pool_size: u32,
    /// How long to wait for a free pooled connection.
    pub connection_timeout_ms: u64,
    /// Upper bound for a single statement, including lock waits.
    pub query_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/sentrylog.db"),
            pool_size: 4,
            connection_timeout_ms: 5_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Cron expression (seconds field first) for background scans while
    /// serving. No background scans when unset.
    pub cron: Option<String>,
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}
