//! Application configuration.
//!
//! Process-wide defaults are fixed when the application is constructed and are
//! never mutated afterwards. Values come from the environment (`from_env`) or
//! are assembled programmatically with the `with_*` builders.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_DB_ENGINE: &str = "RESTKIT_DB_ENGINE";
pub const ENV_DATABASE: &str = "RESTKIT_DATABASE";
pub const ENV_DEBUG: &str = "RESTKIT_DEBUG";
pub const ENV_TRAP_HTTP_EXCEPTIONS: &str = "RESTKIT_TRAP_HTTP_EXCEPTIONS";
pub const ENV_TRAP_BAD_REQUEST_ERRORS: &str = "RESTKIT_TRAP_BAD_REQUEST_ERRORS";
pub const ENV_BIND_ADDR: &str = "RESTKIT_BIND_ADDR";

pub const DEFAULT_DATABASE_FILE: &str = "restkit.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("unknown storage engine: {0:?}")]
    UnknownEngine(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default storage engine selector, consumed by downstream persistence code.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl StorageEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageEngine::Sqlite => "sqlite",
            StorageEngine::Postgres => "postgres",
            StorageEngine::Mysql => "mysql",
        }
    }
}

impl FromStr for StorageEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StorageEngine::Sqlite),
            "postgres" | "postgresql" => Ok(StorageEngine::Postgres),
            "mysql" => Ok(StorageEngine::Mysql),
            _ => Err(ConfigError::UnknownEngine(s.to_string())),
        }
    }
}

impl core::fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default storage connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file name.
    pub database: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE_FILE),
        }
    }
}

/// Immutable application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_engine: StorageEngine,
    pub database: DatabaseConfig,
    /// Debug mode. Also the fallback for `trap_bad_request_errors`.
    pub debug: bool,
    /// Let every HTTP exception propagate instead of rendering an envelope.
    pub trap_http_exceptions: bool,
    /// Let 400 Bad Request exceptions propagate. `None` follows `debug`.
    pub trap_bad_request_errors: Option<bool>,
    pub bind_addr: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_engine: StorageEngine::default(),
            database: DatabaseConfig::default(),
            debug: false,
            trap_http_exceptions: false,
            trap_bad_request_errors: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl AppConfig {
    /// Load configuration from `RESTKIT_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Unset variables fall back to defaults; set but malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(engine) = lookup(ENV_DB_ENGINE) {
            config.db_engine = engine.parse()?;
        }
        if let Some(database) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            config.database.database = PathBuf::from(database);
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            config.debug = parse_flag(ENV_DEBUG, &debug)?;
        }
        if let Some(trap) = lookup(ENV_TRAP_HTTP_EXCEPTIONS) {
            config.trap_http_exceptions = parse_flag(ENV_TRAP_HTTP_EXCEPTIONS, &trap)?;
        }
        if let Some(trap) = lookup(ENV_TRAP_BAD_REQUEST_ERRORS) {
            config.trap_bad_request_errors = Some(parse_flag(ENV_TRAP_BAD_REQUEST_ERRORS, &trap)?);
        }
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            config.bind_addr = addr.parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_BIND_ADDR,
                value: addr.clone(),
            })?;
        }

        Ok(config)
    }

    pub fn with_db_engine(mut self, engine: StorageEngine) -> Self {
        self.db_engine = engine;
        self
    }

    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database.database = database.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_trap_http_exceptions(mut self, trap: bool) -> Self {
        self.trap_http_exceptions = trap;
        self
    }

    pub fn with_trap_bad_request_errors(mut self, trap: Option<bool>) -> Self {
        self.trap_bad_request_errors = trap;
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Whether 400 Bad Request exceptions propagate.
    pub fn traps_bad_request_errors(&self) -> bool {
        self.trap_bad_request_errors.unwrap_or(self.debug)
    }
}

fn parse_flag(name: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
