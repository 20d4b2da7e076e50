//! Store configuration and bootstrap.
//!
//! # Responsibility
//! - Describe where the database lives and how core logs and caches.
//! - Load settings from JSON and apply `RECORDKEEP_*` environment overrides.
//!
//! # Invariants
//! - Every field has a default, so an empty JSON object is a valid config.
//! - Environment overrides win over file values.

use crate::db::{open_target, DbResult, DbTarget, DEFAULT_BUSY_TIMEOUT_MS};
use crate::logging::default_log_level;
use crate::repo::StoreContext;
use crate::service::DEFAULT_CACHE_CAPACITY;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_DB_PATH: &str = "RECORDKEEP_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "RECORDKEEP_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "RECORDKEEP_LOG_DIR";
pub const ENV_CACHE_CAPACITY: &str = "RECORDKEEP_CACHE_CAPACITY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value `{value}` for {key}: expected {expected}")]
    InvalidOverride {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files. Logging stays off when
    /// unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file path. `None` opens a private in-memory database.
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub reference_cache_capacity: usize,
    pub logging: LoggingConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            reference_cache_capacity: DEFAULT_CACHE_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Parses a JSON config file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `RECORDKEEP_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `RECORDKEEP_*` names.
    /// Empty values are ignored.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = read(ENV_DB_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = read(ENV_CACHE_CAPACITY) {
            self.reference_cache_capacity =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        key: ENV_CACHE_CAPACITY,
                        value: raw.clone(),
                        expected: "a non-negative integer",
                    })?;
        }
        Ok(self)
    }

    fn target(&self) -> DbTarget {
        match &self.database_path {
            Some(path) => DbTarget::File(path.clone()),
            None => DbTarget::Memory,
        }
    }
}

/// Opens and migrates the configured database and wraps it in a storage
/// context.
pub fn open_store(config: &StoreConfig) -> DbResult<StoreContext> {
    let conn = open_target(&config.target(), config.busy_timeout_ms)?;
    info!(
        "event=store_open module=core status=ok persistent={} cache_capacity={}",
        config.database_path.is_some(),
        config.reference_cache_capacity
    );
    Ok(StoreContext::new(conn))
}
