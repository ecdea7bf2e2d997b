//! How a log is stored on disk.
//!
//! Gzip logs get access points and can be entered mid-stream. Bzip2 logs are
//! indexed by time like plain logs, but reaching an offset means
//! decompressing everything before it.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use serde::Serialize;

use crate::error::{IndexError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Plain,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Classifies a file by its leading bytes.
    pub fn from_magic(head: &[u8]) -> Self {
        if head.starts_with(&GZIP_MAGIC) {
            Compression::Gzip
        } else if head.len() >= 4
            && head.starts_with(&BZIP2_MAGIC)
            && (b'1'..=b'9').contains(&head[3])
        {
            Compression::Bzip2
        } else {
            Compression::Plain
        }
    }

    pub fn detect(path: &Path) -> io::Result<Self> {
        let mut head = [0u8; 4];
        let mut file = File::open(path)?;
        let mut read = 0;
        while read < head.len() {
            match file.read(&mut head[read..])? {
                0 => break,
                n => read += n,
            }
        }
        Ok(Self::from_magic(&head[..read]))
    }

    pub fn is_compressed(self) -> bool {
        self != Compression::Plain
    }

    /// Whether a build may continue at a byte offset instead of starting over.
    pub fn is_resumable(self) -> bool {
        self == Compression::Plain
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Plain => f.write_str("plain"),
            Compression::Gzip => f.write_str("gzip"),
            Compression::Bzip2 => f.write_str("bzip2"),
        }
    }
}

pub fn is_bzip2(path: &Path) -> io::Result<bool> {
    Ok(Compression::detect(path)? == Compression::Bzip2)
}

/// Decompressed bytes of a bzip2 file, concatenated streams included.
pub type Bzip2Reader = MultiBzDecoder<BufReader<File>>;

/// Opens a bzip2 log and throws away the first `offset` decompressed bytes.
pub fn open_bzip2_at(file: File, offset: u64) -> Result<Bzip2Reader> {
    let mut decoder = MultiBzDecoder::new(BufReader::new(file));
    let skipped = io::copy(&mut (&mut decoder).take(offset), &mut io::sink())?;
    if skipped < offset {
        return Err(IndexError::TruncatedStream { offset: skipped });
    }
    Ok(decoder)
}
