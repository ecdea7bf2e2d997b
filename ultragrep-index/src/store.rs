//! Storage seams for index artifacts.
//!
//! A build writes through an [`IndexWriter`]; queries read through an
//! [`IndexReader`]. The flat file pair and the SQLite database both
//! implement the two.

use std::io;

use crate::error::{IndexError, Result};
use crate::gzip::{AccessPoint, AccessPointIndex, AccessPointSummary, AccessPointWriter};
use crate::timestamp::{self, TimestampEntry, TimestampIndex, TimestampIndexWriter};

pub trait TimestampSink {
    fn append_timestamp(&mut self, entry: TimestampEntry) -> Result<()>;
}

pub trait AccessPointSink {
    fn append_access_point(&mut self, point: &AccessPoint) -> Result<()>;
}

impl TimestampSink for Vec<TimestampEntry> {
    fn append_timestamp(&mut self, entry: TimestampEntry) -> Result<()> {
        self.push(entry);
        Ok(())
    }
}

impl AccessPointSink for Vec<AccessPoint> {
    fn append_access_point(&mut self, point: &AccessPoint) -> Result<()> {
        self.push(point.clone());
        Ok(())
    }
}

/// An index build in progress.
pub trait IndexWriter: TimestampSink + AccessPointSink {
    /// Entry a resumed build continues after.
    fn resumed_from(&self) -> Option<TimestampEntry>;

    /// Marks the build complete for a log with the given modification time.
    fn finish(self: Box<Self>, log_mtime: u64) -> Result<()>;
}

/// Lookups against a built index.
pub trait IndexReader {
    /// `None` while a build is unfinished.
    fn log_mtime(&self) -> Option<u64>;

    fn timestamp_entries(&mut self) -> Result<Vec<TimestampEntry>>;

    fn offset_for(&mut self, time: u64) -> Result<Option<u64>> {
        Ok(timestamp::offset_for(self.timestamp_entries()?, time))
    }

    fn last_entry(&mut self) -> Result<Option<TimestampEntry>> {
        Ok(self.timestamp_entries()?.last().copied())
    }

    /// Last access point at or before `offset`.
    fn access_point_for(&mut self, offset: u64) -> Result<Option<AccessPoint>>;

    fn access_points(&mut self) -> Result<Vec<AccessPointSummary>>;
}

/// Writer over the flat `.idx` / `.gzidx` pair.
pub struct FlatIndexWriter {
    timestamps: TimestampIndexWriter,
    access_points: Option<AccessPointWriter>,
    resumed_from: Option<TimestampEntry>,
}

impl FlatIndexWriter {
    pub fn new(
        timestamps: TimestampIndexWriter,
        access_points: Option<AccessPointWriter>,
        resumed_from: Option<TimestampEntry>,
    ) -> Self {
        Self {
            timestamps,
            access_points,
            resumed_from,
        }
    }
}

impl TimestampSink for FlatIndexWriter {
    fn append_timestamp(&mut self, entry: TimestampEntry) -> Result<()> {
        self.timestamps.append(entry)
    }
}

impl AccessPointSink for FlatIndexWriter {
    fn append_access_point(&mut self, point: &AccessPoint) -> Result<()> {
        match self.access_points.as_mut() {
            Some(writer) => writer.append(point),
            None => Err(IndexError::Io(io::Error::other(
                "access point written to an index opened for a plain log",
            ))),
        }
    }
}

impl IndexWriter for FlatIndexWriter {
    fn resumed_from(&self) -> Option<TimestampEntry> {
        self.resumed_from
    }

    fn finish(self: Box<Self>, log_mtime: u64) -> Result<()> {
        let this = *self;
        // Access points first: the timestamp header is what marks a build done.
        if let Some(access_points) = this.access_points {
            access_points.finish(log_mtime)?;
        }
        this.timestamps.finish(log_mtime)
    }
}

/// Reader over the flat `.idx` / `.gzidx` pair.
pub struct FlatIndexReader {
    timestamps: TimestampIndex,
    access_points: Option<AccessPointIndex>,
}

impl FlatIndexReader {
    pub fn new(timestamps: TimestampIndex, access_points: Option<AccessPointIndex>) -> Self {
        Self {
            timestamps,
            access_points,
        }
    }
}

impl IndexReader for FlatIndexReader {
    fn log_mtime(&self) -> Option<u64> {
        let mtime = self.timestamps.log_mtime()?;
        match &self.access_points {
            Some(points) if points.log_mtime() != Some(mtime) => None,
            _ => Some(mtime),
        }
    }

    fn timestamp_entries(&mut self) -> Result<Vec<TimestampEntry>> {
        Ok(self.timestamps.entries().to_vec())
    }

    fn offset_for(&mut self, time: u64) -> Result<Option<u64>> {
        Ok(self.timestamps.offset_for(time))
    }

    fn last_entry(&mut self) -> Result<Option<TimestampEntry>> {
        Ok(self.timestamps.last_entry())
    }

    fn access_point_for(&mut self, offset: u64) -> Result<Option<AccessPoint>> {
        match self.access_points.as_mut() {
            Some(points) => points.find(offset),
            None => Ok(None),
        }
    }

    fn access_points(&mut self) -> Result<Vec<AccessPointSummary>> {
        match self.access_points.as_mut() {
            Some(points) => points.summaries(),
            None => Ok(Vec::new()),
        }
    }
}
