//! Flat timestamp index: a header followed by fixed-width
//! `(time, offset)` records in non-decreasing time order.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::error::Result;
use crate::header::FlatHeader;

pub const TIMESTAMP_MAGIC: [u8; 4] = *b"UGTI";
pub const RECORD_SIZE: u64 = 16;

/// Bucketed time and the offset of the first request seen in that bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimestampEntry {
    pub time: u64,
    pub offset: u64,
}

impl TimestampEntry {
    pub fn new(time: u64, offset: u64) -> Self {
        Self { time, offset }
    }
}

/// Append-only writer.
pub struct TimestampIndexWriter {
    path: PathBuf,
    file: BufWriter<File>,
    written: u64,
}

impl TimestampIndexWriter {
    /// Truncates `path` and starts an unfinished index.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let mut file = BufWriter::new(file);
        FlatHeader::unfinished(TIMESTAMP_MAGIC).write(&mut file)?;
        file.flush()?;
        file.get_ref().sync_data()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: 0,
        })
    }

    /// Reopens an existing index for appending. A trailing partial record is
    /// cut off and the header is marked unfinished again. A file too short to
    /// hold a header is started over.
    pub fn resume(path: &Path) -> Result<(Self, Option<TimestampEntry>)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let Some(header) = FlatHeader::read_if_complete(&mut file)? else {
            return Ok((Self::create(path)?, None));
        };
        header.validate(path, TIMESTAMP_MAGIC, "timestamp")?;

        let len = file.metadata()?.len();
        let records = len.saturating_sub(FlatHeader::SIZE) / RECORD_SIZE;
        file.set_len(FlatHeader::SIZE + records * RECORD_SIZE)?;

        let last = if records > 0 {
            file.seek(SeekFrom::Start(FlatHeader::SIZE + (records - 1) * RECORD_SIZE))?;
            Some(read_entry(&mut file)?)
        } else {
            None
        };
        FlatHeader::stamp(&mut file, 0)?;

        Ok((
            Self {
                path: path.to_path_buf(),
                file: BufWriter::new(file),
                written: records,
            },
            last,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records held by the file, including those from a resumed build.
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn append(&mut self, entry: TimestampEntry) -> Result<()> {
        self.file.write_u64::<LittleEndian>(entry.time)?;
        self.file.write_u64::<LittleEndian>(entry.offset)?;
        self.written += 1;
        Ok(())
    }

    /// Flushes and stamps the log modification time, marking the build done.
    pub fn finish(self, log_mtime: u64) -> Result<()> {
        let mut file = self.file.into_inner().map_err(|err| err.into_error())?;
        FlatHeader::stamp(&mut file, log_mtime)?;
        file.sync_all()?;
        Ok(())
    }
}

fn read_entry<R: Read>(mut r: R) -> std::io::Result<TimestampEntry> {
    let time = r.read_u64::<LittleEndian>()?;
    let offset = r.read_u64::<LittleEndian>()?;
    Ok(TimestampEntry { time, offset })
}

/// Read side of the flat timestamp index.
#[derive(Debug, Clone)]
pub struct TimestampIndex {
    log_mtime: u64,
    entries: Vec<TimestampEntry>,
}

impl TimestampIndex {
    /// Loads every complete record. A truncated final record is ignored and
    /// a truncated header reads as an unfinished, empty index.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let Some(header) = FlatHeader::read_if_complete(&mut reader)? else {
            return Ok(Self::from_entries(0, Vec::new()));
        };
        header.validate(path, TIMESTAMP_MAGIC, "timestamp")?;

        let mut entries = Vec::new();
        loop {
            match read_entry(&mut reader) {
                Ok(entry) => entries.push(entry),
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Self {
            log_mtime: header.log_mtime,
            entries,
        })
    }

    pub fn from_entries(log_mtime: u64, entries: Vec<TimestampEntry>) -> Self {
        Self { log_mtime, entries }
    }

    /// `None` while the index is still being built.
    pub fn log_mtime(&self) -> Option<u64> {
        (self.log_mtime != 0).then_some(self.log_mtime)
    }

    pub fn entries(&self) -> &[TimestampEntry] {
        &self.entries
    }

    /// Offset of the last entry whose time is at or before `target`.
    pub fn offset_for(&self, target: u64) -> Option<u64> {
        offset_for(self.entries.iter().copied(), target)
    }

    pub fn last_entry(&self) -> Option<TimestampEntry> {
        self.entries.last().copied()
    }
}

/// Forward scan shared by the storage backends.
pub fn offset_for<I>(entries: I, target: u64) -> Option<u64>
where
    I: IntoIterator<Item = TimestampEntry>,
{
    let mut found = None;
    for entry in entries {
        if entry.time > target {
            break;
        }
        found = Some(entry.offset);
    }
    found
}
