use std::io;

use thiserror::Error;

/// Result type used across the ultragrep core crate.
pub type Result<T> = std::result::Result<T, UltragrepError>;

/// Canonical error representation shared by all crates.
#[derive(Debug, Error)]
pub enum UltragrepError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("invalid time specification: {0}")]
    InvalidTime(String),

    #[error("invalid key filter {0:?}, expected field=regex")]
    InvalidKeyFilter(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    MissingFile(String),

    #[error("no configuration found (looked in {0})")]
    NotConfigured(String),

    #[error("failed to read configuration from {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration from {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("unknown log type {0:?}")]
    UnknownType(String),
}

impl From<ConfigError> for UltragrepError {
    fn from(value: ConfigError) -> Self {
        UltragrepError::ConfigError(value.to_string())
    }
}
