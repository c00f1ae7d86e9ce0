use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{DEFAULT_IGNORE_CAPACITY, DEFAULT_USER_AGENT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Filters and boards
    pub watch_file: PathBuf,

    // Polling
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub ignore_capacity: usize,

    // Database
    pub database_path: PathBuf,

    // HTTP
    pub user_agent: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Filters and boards
            watch_file: PathBuf::from(required_env("WATCH_FILE")?),

            // Polling
            poll_interval: Duration::from_secs(parse_env_u64("POLL_INTERVAL_SECS", 900)?),
            fetch_timeout: Duration::from_secs(parse_env_u64("FETCH_TIMEOUT_SECS", 30)?),
            ignore_capacity: parse_env_usize("IGNORE_SET_CAPACITY", DEFAULT_IGNORE_CAPACITY)?,

            // Database
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/filter-watch.sqlite",
            )),

            // HTTP
            user_agent: env_or_default("HTTP_USER_AGENT", DEFAULT_USER_AGENT),
        })
    }

    /// Configuration with defaults suitable for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            watch_file: PathBuf::from("watch.toml"),
            poll_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(5),
            ignore_capacity: DEFAULT_IGNORE_CAPACITY,
            database_path: PathBuf::from(":memory:"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "POLL_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "FETCH_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.ignore_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "IGNORE_SET_CAPACITY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.watch_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "WATCH_FILE".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
