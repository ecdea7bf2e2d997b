use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use ultragrep_core::time::format_time;
use ultragrep_index::{AccessPointSummary, IndexCatalog};

use crate::error::Result;

#[derive(Debug, Serialize)]
struct TimestampRow {
    time: u64,
    at: String,
    offset: u64,
}

/// Everything recorded about one log.
#[derive(Debug, Serialize)]
pub struct IndexDump {
    log: PathBuf,
    status: String,
    indexed_mtime: Option<u64>,
    timestamps: Vec<TimestampRow>,
    access_points: Vec<AccessPointSummary>,
}

impl IndexDump {
    pub fn load(catalog: &IndexCatalog, log: &Path) -> Result<Self> {
        let status = catalog.status(log)?.to_string();
        let mut dump = Self {
            log: log.to_path_buf(),
            status,
            indexed_mtime: None,
            timestamps: Vec::new(),
            access_points: Vec::new(),
        };
        let Some(mut reader) = catalog.open_reader(log)? else {
            return Ok(dump);
        };

        dump.indexed_mtime = reader.log_mtime();
        dump.timestamps = reader
            .timestamp_entries()?
            .into_iter()
            .map(|entry| TimestampRow {
                time: entry.time,
                at: format_time(entry.time),
                offset: entry.offset,
            })
            .collect();
        dump.access_points = reader.access_points()?;
        Ok(dump)
    }

    pub fn timestamp_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn access_point_count(&self) -> usize {
        self.access_points.len()
    }

    pub fn write_json<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)?;
        Ok(())
    }

    /// One `ts`/`gz` row per entry, tab separated.
    pub fn write_text<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "# {} ({})", self.log.display(), self.status)?;
        for row in &self.timestamps {
            writeln!(out, "ts\t{}\t{}\t{}", row.time, row.at, row.offset)?;
        }
        for point in &self.access_points {
            writeln!(
                out,
                "gz\t{}\t{}\t{}",
                point.uncompressed_offset, point.compressed_offset, point.bits
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use ultragrep_core::{FormatSpec, IndexSettings, SearchConfig};
    use ultragrep_index::IndexBuilder;

    #[test]
    fn dumps_missing_and_built_indexes() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join("app.log");
        fs::write(
            &log,
            "Started GET / at 2024-01-01 00:00:00\nCompleted 200\n\n\n\
             Started GET / at 2024-01-01 00:01:00\nCompleted 200\n\n\n",
        )
        .expect("write");

        let settings = IndexSettings::default();
        let catalog = IndexCatalog::new(&settings);
        let dump = IndexDump::load(&catalog, &log).expect("dump");
        assert_eq!(dump.status, "missing");
        assert_eq!(dump.timestamp_count(), 0);

        let format = FormatSpec::resolve("app", &SearchConfig::default()).expect("format");
        IndexBuilder::new(&catalog, &format, &settings)
            .build(&log, false)
            .expect("build");

        let dump = IndexDump::load(&catalog, &log).expect("dump");
        assert_eq!(dump.status, "fresh");
        assert_eq!(dump.timestamp_count(), 2);
        assert_eq!(dump.access_point_count(), 0);

        let mut text = Vec::new();
        dump.write_text(&mut text).expect("text");
        let text = String::from_utf8(text).expect("utf8");
        assert!(text.contains("ts\t1704067200\t2024-01-01 00:00:00\t0\n"));

        let mut json = Vec::new();
        dump.write_json(&mut json).expect("json");
        let value: serde_json::Value = serde_json::from_slice(&json).expect("parse");
        assert_eq!(value["timestamps"][1]["time"], 1_704_067_260);
    }
}
