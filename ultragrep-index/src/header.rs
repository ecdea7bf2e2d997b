use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IndexError, Result};

pub(crate) const VERSION: u32 = 1;

/// Fixed 16-byte header of the flat index files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlatHeader {
    pub magic: [u8; 4],
    pub version: u32,
    /// Modification time of the indexed log, `0` while a build is running.
    pub log_mtime: u64,
}

impl FlatHeader {
    pub const SIZE: u64 = 16;
    const MTIME_POS: u64 = 8;

    pub fn unfinished(magic: [u8; 4]) -> Self {
        Self {
            magic,
            version: VERSION,
            log_mtime: 0,
        }
    }

    pub fn read<R: Read>(mut r: R) -> std::io::Result<Self> {
        let mut magic = [0; 4];
        r.read_exact(&mut magic)?;
        let version = r.read_u32::<LittleEndian>()?;
        let log_mtime = r.read_u64::<LittleEndian>()?;
        Ok(Self {
            magic,
            version,
            log_mtime,
        })
    }

    /// Like [`FlatHeader::read`], but `None` when the file ends before a
    /// whole header, as it does when a build died right after creating it.
    pub fn read_if_complete<R: Read>(r: R) -> std::io::Result<Option<Self>> {
        match Self::read(r) {
            Ok(header) => Ok(Some(header)),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn write<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        w.write_all(&self.magic)?;
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_u64::<LittleEndian>(self.log_mtime)?;
        Ok(())
    }

    pub fn validate(&self, path: &Path, magic: [u8; 4], expected: &'static str) -> Result<()> {
        if self.magic != magic {
            return Err(IndexError::BadMagic {
                path: path.to_path_buf(),
                expected,
            });
        }
        if self.version != VERSION {
            return Err(IndexError::UnsupportedVersion {
                path: path.to_path_buf(),
                version: self.version,
            });
        }
        Ok(())
    }

    /// Rewrites only the mtime field, leaving the cursor at the end.
    pub fn stamp<W: Write + Seek>(mut w: W, log_mtime: u64) -> std::io::Result<()> {
        w.seek(SeekFrom::Start(Self::MTIME_POS))?;
        w.write_u64::<LittleEndian>(log_mtime)?;
        w.seek(SeekFrom::End(0))?;
        Ok(())
    }
}
