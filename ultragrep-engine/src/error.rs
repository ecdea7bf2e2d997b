use std::io;
use std::path::PathBuf;

use thiserror::Error;
use ultragrep_core::{ConfigError, UltragrepError};
use ultragrep_index::IndexError;

/// Errors that may occur while querying logs.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Core(#[from] UltragrepError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid glob: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("invalid time range: start {start} is after end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("no log files matched for type {0:?}")]
    NoLogs(String),

    #[error("query of {path} failed: {reason}")]
    Worker { path: PathBuf, reason: String },
}

impl From<ConfigError> for QueryError {
    fn from(value: ConfigError) -> Self {
        QueryError::Core(value.into())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
