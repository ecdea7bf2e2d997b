//! Indexes that make large logs seekable by time.
//!
//! * [`timestamp`]: the flat time to offset index and its lookups.
//! * [`compression`]: plain, gzip or bzip2 input.
//! * [`gzip`]: access points that let decompression restart mid-stream.
//! * [`store`] and [`sqlite`]: the reader and writer seams over both backends.
//! * [`catalog`]: artifact naming and staleness checks.
//! * [`builder`]: runs a log through its matcher and records the indexes.

pub mod builder;
pub mod catalog;
pub mod compression;
pub mod error;
pub mod gzip;
mod header;
pub mod lines;
pub mod policy;
pub mod ring;
pub mod sqlite;
pub mod store;
pub mod timestamp;

pub use builder::{BuildReport, IndexBuilder};
pub use catalog::{log_mtime, ArtifactKind, IndexCatalog, IndexStatus};
pub use compression::{is_bzip2, open_bzip2_at, Bzip2Reader, Compression};
pub use error::{IndexError, Result};
pub use gzip::{
    is_gzip, AccessPoint, AccessPointSummary, GzipBlockIndexer, GzipRandomAccessReader,
    GzipSummary,
};
pub use lines::{LineReader, LineSplitter};
pub use policy::IndexingPolicy;
pub use ring::RingBuffer;
pub use sqlite::SqliteIndexStore;
pub use store::{IndexReader, IndexWriter};
pub use timestamp::{TimestampEntry, TimestampIndex};
