//! Random access into gzip compressed logs.
//!
//! While indexing, the deflate stream is decompressed one block at a time and
//! every `span` uncompressed bytes an [`AccessPoint`] is recorded at a block
//! boundary: the compressed position, the bits of the boundary byte that
//! belong to the next block, and the 32KB of history the next block may
//! reference. Reading later restarts a fresh decompressor from such a point.

mod access;
mod indexer;
mod inflate;
mod reader;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub use access::{
    AccessPoint, AccessPointIndex, AccessPointSummary, AccessPointWriter, ACCESS_POINT_MAGIC,
};
pub use indexer::{GzipBlockIndexer, GzipSummary};
pub use reader::GzipRandomAccessReader;

/// Whether the file at `path` starts with the gzip magic bytes.
pub fn is_gzip(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    let mut read = 0;
    while read < magic.len() {
        match file.read(&mut magic[read..])? {
            0 => return Ok(false),
            n => read += n,
        }
    }
    Ok(magic == [0x1f, 0x8b])
}
