//! Where index artifacts live and whether they are usable.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use tracing::info;
use ultragrep_core::{IndexBackend, IndexSettings};

use crate::compression::Compression;
use crate::error::Result;
use crate::gzip::{self, AccessPointIndex, AccessPointWriter};
use crate::sqlite::SqliteIndexStore;
use crate::store::{FlatIndexReader, FlatIndexWriter, IndexReader, IndexWriter};
use crate::timestamp::{TimestampIndex, TimestampIndexWriter};

/// Kinds of index artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Timestamps,
    AccessPoints,
    Database,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Timestamps => "idx",
            ArtifactKind::AccessPoints => "gzidx",
            ArtifactKind::Database => "db",
        }
    }
}

/// Freshness of a log's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Missing,
    /// A build started but never finished.
    Unfinished,
    Fresh,
    /// The log changed since the index was built.
    Stale { indexed_mtime: u64, log_mtime: u64 },
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStatus::Missing => f.write_str("missing"),
            IndexStatus::Unfinished => f.write_str("unfinished"),
            IndexStatus::Fresh => f.write_str("fresh"),
            IndexStatus::Stale { .. } => f.write_str("stale"),
        }
    }
}

/// Modification time of `path` in whole seconds, never `0`.
pub fn log_mtime(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)?.modified()?;
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    Ok(secs.max(1))
}

/// Resolves artifact paths and opens readers and writers for them.
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    dir: Option<PathBuf>,
    backend: IndexBackend,
}

impl IndexCatalog {
    pub fn new(settings: &IndexSettings) -> Self {
        Self {
            dir: settings.dir.clone(),
            backend: settings.backend,
        }
    }

    pub fn backend(&self) -> IndexBackend {
        self.backend
    }

    /// `<dir>/.<basename>.<hash>.<ext>`, the hash taken over the absolute log
    /// path so equally named logs in different directories do not collide.
    pub fn artifact_path(&self, log: &Path, kind: ArtifactKind) -> Result<PathBuf> {
        let absolute = match fs::canonicalize(log) {
            Ok(path) => path,
            Err(_) if log.is_absolute() => log.to_path_buf(),
            Err(_) => env::current_dir()?.join(log),
        };

        let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
        let hash = hex::encode(&digest[..8]);
        let basename = absolute
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());

        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => absolute
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        Ok(dir.join(format!(".{basename}.{hash}.{}", kind.extension())))
    }

    fn primary_artifact(&self, log: &Path) -> Result<PathBuf> {
        match self.backend {
            IndexBackend::Flat => self.artifact_path(log, ArtifactKind::Timestamps),
            IndexBackend::Sqlite => self.artifact_path(log, ArtifactKind::Database),
        }
    }

    pub fn status(&self, log: &Path) -> Result<IndexStatus> {
        let Some(reader) = self.open_reader(log)? else {
            return Ok(IndexStatus::Missing);
        };
        let Some(indexed_mtime) = reader.log_mtime() else {
            return Ok(IndexStatus::Unfinished);
        };
        let current = log_mtime(log)?;
        if indexed_mtime == current {
            Ok(IndexStatus::Fresh)
        } else {
            Ok(IndexStatus::Stale {
                indexed_mtime,
                log_mtime: current,
            })
        }
    }

    /// Opens the index of `log` for lookups, `None` if nothing was built.
    pub fn open_reader(&self, log: &Path) -> Result<Option<Box<dyn IndexReader>>> {
        let primary = self.primary_artifact(log)?;
        if !primary.exists() {
            return Ok(None);
        }

        match self.backend {
            IndexBackend::Sqlite => Ok(Some(Box::new(SqliteIndexStore::open(&primary)?))),
            IndexBackend::Flat => {
                let timestamps = TimestampIndex::open(&primary)?;
                let access_points = if gzip::is_gzip(log)? {
                    let path = self.artifact_path(log, ArtifactKind::AccessPoints)?;
                    if !path.exists() {
                        return Ok(None);
                    }
                    Some(AccessPointIndex::open(&path)?)
                } else {
                    None
                };
                Ok(Some(Box::new(FlatIndexReader::new(timestamps, access_points))))
            }
        }
    }

    /// Opens a writer for a new build. `resume` keeps existing entries and
    /// continues after the last one; it is ignored for compressed logs.
    pub fn open_writer(&self, log: &Path, resume: bool) -> Result<Box<dyn IndexWriter>> {
        let compression = Compression::detect(log)?;
        let resume = resume && compression.is_resumable();
        let primary = self.primary_artifact(log)?;
        if let Some(parent) = primary.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(
            log = %log.display(),
            index = %primary.display(),
            resume,
            %compression,
            "building index"
        );

        match self.backend {
            IndexBackend::Sqlite => Ok(Box::new(SqliteIndexStore::begin_build(&primary, !resume)?)),
            IndexBackend::Flat => {
                let (timestamps, resumed_from) = if resume && primary.exists() {
                    TimestampIndexWriter::resume(&primary)?
                } else {
                    (TimestampIndexWriter::create(&primary)?, None)
                };
                let access_points = if compression == Compression::Gzip {
                    let path = self.artifact_path(log, ArtifactKind::AccessPoints)?;
                    Some(AccessPointWriter::create(&path)?)
                } else {
                    None
                };
                Ok(Box::new(FlatIndexWriter::new(
                    timestamps,
                    access_points,
                    resumed_from,
                )))
            }
        }
    }
}
