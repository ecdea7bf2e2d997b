use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::error::Result;
use crate::header::FlatHeader;
use crate::ring::WINDOW_SIZE;

pub const ACCESS_POINT_MAGIC: [u8; 4] = *b"UGGZ";

/// Fixed part of a record, before the dictionary.
const RECORD_HEAD: u64 = 17;

/// A decompression restart point.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub uncompressed_offset: u64,
    /// Absolute file offset of the byte holding the block start.
    pub compressed_offset: u64,
    /// Bits of the byte at `compressed_offset` that belong to the block.
    pub bits: u8,
    /// The 32KB of output preceding `uncompressed_offset`.
    pub dictionary: Vec<u8>,
}

impl std::fmt::Debug for AccessPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessPoint")
            .field("uncompressed_offset", &self.uncompressed_offset)
            .field("compressed_offset", &self.compressed_offset)
            .field("bits", &self.bits)
            .field("dictionary_len", &self.dictionary.len())
            .finish()
    }
}

impl AccessPoint {
    pub fn summary(&self) -> AccessPointSummary {
        AccessPointSummary {
            uncompressed_offset: self.uncompressed_offset,
            compressed_offset: self.compressed_offset,
            bits: self.bits,
        }
    }
}

/// An access point without its dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessPointSummary {
    pub uncompressed_offset: u64,
    pub compressed_offset: u64,
    pub bits: u8,
}

/// Writes the flat access point file.
pub struct AccessPointWriter {
    path: PathBuf,
    file: BufWriter<File>,
    written: u64,
}

impl AccessPointWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = BufWriter::new(File::create(path)?);
        FlatHeader::unfinished(ACCESS_POINT_MAGIC).write(&mut file)?;
        file.flush()?;
        file.get_ref().sync_data()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn append(&mut self, point: &AccessPoint) -> Result<()> {
        self.file.write_u64::<LittleEndian>(point.uncompressed_offset)?;
        self.file.write_u64::<LittleEndian>(point.compressed_offset)?;
        self.file.write_u8(point.bits)?;
        let mut dictionary = [0u8; WINDOW_SIZE];
        let len = point.dictionary.len().min(WINDOW_SIZE);
        let source = &point.dictionary[point.dictionary.len() - len..];
        dictionary[WINDOW_SIZE - len..].copy_from_slice(source);
        self.file.write_all(&dictionary)?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(self, log_mtime: u64) -> Result<()> {
        let mut file = self.file.into_inner().map_err(|err| err.into_error())?;
        FlatHeader::stamp(&mut file, log_mtime)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Sequential reader of the flat access point file.
pub struct AccessPointIndex {
    reader: BufReader<File>,
    log_mtime: u64,
}

impl AccessPointIndex {
    /// A file cut off inside the header opens as an unfinished index with no
    /// points.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let log_mtime = match FlatHeader::read_if_complete(&mut reader)? {
            Some(header) => {
                header.validate(path, ACCESS_POINT_MAGIC, "gzip access point")?;
                header.log_mtime
            }
            None => 0,
        };
        Ok(Self { reader, log_mtime })
    }

    pub fn log_mtime(&self) -> Option<u64> {
        (self.log_mtime != 0).then_some(self.log_mtime)
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(FlatHeader::SIZE))?;
        Ok(())
    }

    /// Reads the fixed part of the next record; `None` at the end or at a
    /// truncated record.
    fn next_head(&mut self) -> Result<Option<AccessPointSummary>> {
        let mut head = [0u8; RECORD_HEAD as usize];
        match self.reader.read_exact(&mut head) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let mut cursor = &head[..];
        Ok(Some(AccessPointSummary {
            uncompressed_offset: cursor.read_u64::<LittleEndian>()?,
            compressed_offset: cursor.read_u64::<LittleEndian>()?,
            bits: cursor.read_u8()?,
        }))
    }

    /// Every point, without dictionaries.
    pub fn summaries(&mut self) -> Result<Vec<AccessPointSummary>> {
        self.rewind()?;
        let mut out = Vec::new();
        while let Some(summary) = self.next_head()? {
            if !self.skip_dictionary()? {
                break;
            }
            out.push(summary);
        }
        Ok(out)
    }

    fn skip_dictionary(&mut self) -> Result<bool> {
        let mut dictionary = vec![0u8; WINDOW_SIZE];
        match self.reader.read_exact(&mut dictionary) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// The last point at or before `target`, scanning forward from the start.
    pub fn find(&mut self, target: u64) -> Result<Option<AccessPoint>> {
        self.rewind()?;
        let mut best = None;
        while let Some(summary) = self.next_head()? {
            if summary.uncompressed_offset > target {
                break;
            }
            let mut dictionary = vec![0u8; WINDOW_SIZE];
            match self.reader.read_exact(&mut dictionary) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
            best = Some(AccessPoint {
                uncompressed_offset: summary.uncompressed_offset,
                compressed_offset: summary.compressed_offset,
                bits: summary.bits,
                dictionary,
            });
        }
        Ok(best)
    }
}
