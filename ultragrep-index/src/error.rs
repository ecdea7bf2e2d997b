use std::io;
use std::path::PathBuf;

use thiserror::Error;
use ultragrep_core::UltragrepError;

/// Errors raised while building or reading indexes.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{path} is not a {expected} index")]
    BadMagic { path: PathBuf, expected: &'static str },

    #[error("{path} has unsupported index version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("decompression failed at compressed offset {offset}: {reason}")]
    Decompression { offset: u64, reason: String },

    #[error("compressed stream ends unexpectedly at offset {offset}")]
    TruncatedStream { offset: u64 },

    #[error("gzip size mismatch: trailer says {expected} bytes, produced {actual}")]
    SizeMismatch { expected: u32, actual: u32 },

    #[error("ring buffer capacity {0} must be a power of two of at least 32768 bytes")]
    InvalidCapacity(usize),

    #[error(transparent)]
    Core(#[from] UltragrepError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
