//! # Ledger Configuration
//!
//! Configuration for the store and the engine that drives it.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     TALLY_DATABASE_PATH=/var/lib/tally/ledger.db                        │
//! │     TALLY_MAX_CONNECTIONS=8                                             │
//! │     TALLY_BUSY_TIMEOUT_MS=5000                                          │
//! │     TALLY_DEADLINE_MS=2000                                              │
//! │     TALLY_NOTIFY_CAPACITY=1024                                          │
//! │                                                                         │
//! │  2. TOML Config File (path given by the caller or TALLY_CONFIG)         │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "./data/tally.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//! run_migrations = true
//!
//! [engine]
//! default_deadline_ms = 5000   # 0 disables the default deadline
//! notify_capacity = 256
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path. Created if missing.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on SQLite's lock before giving up (ms).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Apply embedded migrations on connect.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/tally.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Deadline applied to a request that carries none (ms). 0 disables it.
    #[serde(default = "default_deadline")]
    pub default_deadline_ms: u64,

    /// Buffered post-commit notifications per subscriber.
    #[serde(default = "default_notify_capacity")]
    pub notify_capacity: usize,
}

fn default_deadline() -> u64 {
    5_000
}

fn default_notify_capacity() -> usize {
    256
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            default_deadline_ms: default_deadline(),
            notify_capacity: default_notify_capacity(),
        }
    }
}

impl EngineSettings {
    /// The default deadline as a duration, `None` when disabled.
    pub fn default_deadline(&self) -> Option<Duration> {
        match self.default_deadline_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub engine: EngineSettings,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, else `TALLY_CONFIG`)
    /// 3. Environment variables
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("TALLY_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                config = Self::from_toml(&std::fs::read_to_string(&path)?)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections and keys take defaults.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Serializes to TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.engine.notify_capacity == 0 {
            return Err(ConfigError::Invalid(
                "engine.notify_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Unparseable values are logged
    /// and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TALLY_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(value) = lookup("TALLY_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %value, "Ignoring invalid TALLY_MAX_CONNECTIONS"),
            }
        }

        if let Some(value) = lookup("TALLY_BUSY_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.database.busy_timeout_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid TALLY_BUSY_TIMEOUT_MS"),
            }
        }

        if let Some(value) = lookup("TALLY_DEADLINE_MS") {
            match value.parse::<u64>() {
                Ok(ms) => self.engine.default_deadline_ms = ms,
                Err(_) => warn!(value = %value, "Ignoring invalid TALLY_DEADLINE_MS"),
            }
        }

        if let Some(value) = lookup("TALLY_NOTIFY_CAPACITY") {
            match value.parse::<usize>() {
                Ok(n) => self.engine.notify_capacity = n,
                Err(_) => warn!(value = %value, "Ignoring invalid TALLY_NOTIFY_CAPACITY"),
            }
        }
    }

    /// Pool configuration derived from the database settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .run_migrations(self.database.run_migrations)
    }
}
