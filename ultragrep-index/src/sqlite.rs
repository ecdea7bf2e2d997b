use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::Result;
use crate::gzip::{AccessPoint, AccessPointSummary};
use crate::store::{AccessPointSink, IndexReader, IndexWriter, TimestampSink};
use crate::timestamp::TimestampEntry;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS ts_indices (
    ts INTEGER PRIMARY KEY,
    offset INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS gz_indices (
    raw_offset INTEGER PRIMARY KEY,
    gz_offset INTEGER NOT NULL,
    bits INTEGER NOT NULL,
    dictionary BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

const INSERT_TS_SQL: &str = "INSERT OR IGNORE INTO ts_indices (ts, offset) VALUES (?1, ?2)";
const INSERT_GZ_SQL: &str = r"
INSERT OR REPLACE INTO gz_indices (raw_offset, gz_offset, bits, dictionary)
VALUES (?1, ?2, ?3, ?4)
";
const SET_MTIME_SQL: &str =
    "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('log_mtime', ?1)";

fn to_sql(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// Timestamp and access point tables in a single SQLite database.
pub struct SqliteIndexStore {
    conn: Connection,
    resumed_from: Option<TimestampEntry>,
}

impl SqliteIndexStore {
    /// Opens or creates the database and makes sure the tables exist.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn,
            resumed_from: None,
        })
    }

    /// Starts a build. `fresh` clears previous entries; otherwise the build
    /// continues after the last stored timestamp.
    pub fn begin_build(path: &Path, fresh: bool) -> Result<Self> {
        let mut store = Self::open(path)?;
        if fresh {
            store
                .conn
                .execute_batch("DELETE FROM ts_indices; DELETE FROM gz_indices;")?;
        } else {
            store.resumed_from = IndexReader::last_entry(&mut store)?;
        }
        store.conn.execute(SET_MTIME_SQL, params![0i64])?;
        store.conn.execute_batch("BEGIN")?;
        debug!(path = %path.display(), fresh, "sqlite index build started");
        Ok(store)
    }
}

impl TimestampSink for SqliteIndexStore {
    fn append_timestamp(&mut self, entry: TimestampEntry) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(INSERT_TS_SQL)?;
        stmt.execute(params![to_sql(entry.time), to_sql(entry.offset)])?;
        Ok(())
    }
}

impl AccessPointSink for SqliteIndexStore {
    fn append_access_point(&mut self, point: &AccessPoint) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(INSERT_GZ_SQL)?;
        stmt.execute(params![
            to_sql(point.uncompressed_offset),
            to_sql(point.compressed_offset),
            i64::from(point.bits),
            &point.dictionary,
        ])?;
        Ok(())
    }
}

impl IndexWriter for SqliteIndexStore {
    fn resumed_from(&self) -> Option<TimestampEntry> {
        self.resumed_from
    }

    fn finish(self: Box<Self>, log_mtime: u64) -> Result<()> {
        self.conn.execute(SET_MTIME_SQL, params![to_sql(log_mtime)])?;
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }
}

struct AccessPointRow {
    raw_offset: i64,
    gz_offset: i64,
    bits: i64,
    dictionary: Vec<u8>,
}

impl AccessPointRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            raw_offset: row.get(0)?,
            gz_offset: row.get(1)?,
            bits: row.get(2)?,
            dictionary: row.get(3)?,
        })
    }
}

impl From<AccessPointRow> for AccessPoint {
    fn from(row: AccessPointRow) -> Self {
        AccessPoint {
            uncompressed_offset: from_sql(row.raw_offset),
            compressed_offset: from_sql(row.gz_offset),
            bits: u8::try_from(row.bits).unwrap_or_default(),
            dictionary: row.dictionary,
        }
    }
}

impl IndexReader for SqliteIndexStore {
    fn log_mtime(&self) -> Option<u64> {
        self.conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'log_mtime'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .ok()
            .flatten()
            .map(from_sql)
            .filter(|mtime| *mtime != 0)
    }

    fn timestamp_entries(&mut self) -> Result<Vec<TimestampEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT ts, offset FROM ts_indices ORDER BY ts")?;
        let rows = stmt.query_map([], |row| {
            Ok(TimestampEntry::new(
                from_sql(row.get(0)?),
                from_sql(row.get(1)?),
            ))
        })?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    fn offset_for(&mut self, time: u64) -> Result<Option<u64>> {
        let offset = self
            .conn
            .query_row(
                "SELECT offset FROM ts_indices WHERE ts <= ?1 ORDER BY ts DESC LIMIT 1",
                params![to_sql(time)],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(offset.map(from_sql))
    }

    fn last_entry(&mut self) -> Result<Option<TimestampEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT ts, offset FROM ts_indices ORDER BY ts DESC LIMIT 1",
                [],
                |row| {
                    Ok(TimestampEntry::new(
                        from_sql(row.get(0)?),
                        from_sql(row.get(1)?),
                    ))
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn access_point_for(&mut self, offset: u64) -> Result<Option<AccessPoint>> {
        let row = self
            .conn
            .query_row(
                "SELECT raw_offset, gz_offset, bits, dictionary FROM gz_indices \
                 WHERE raw_offset <= ?1 ORDER BY raw_offset DESC LIMIT 1",
                params![to_sql(offset)],
                AccessPointRow::from_row,
            )
            .optional()?;
        Ok(row.map(Into::into))
    }

    fn access_points(&mut self) -> Result<Vec<AccessPointSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT raw_offset, gz_offset, bits FROM gz_indices ORDER BY raw_offset")?;
        let rows = stmt.query_map([], |row| {
            Ok(AccessPointSummary {
                uncompressed_offset: from_sql(row.get(0)?),
                compressed_offset: from_sql(row.get(1)?),
                bits: u8::try_from(row.get::<_, i64>(2)?).unwrap_or_default(),
            })
        })?;
        let mut summaries = Vec::new();
        for summary in rows {
            summaries.push(summary?);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::WINDOW_SIZE;
    use tempfile::tempdir;

    #[test]
    fn build_then_lookup() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("log.db");

        let mut store = Box::new(SqliteIndexStore::begin_build(&path, true).expect("begin"));
        for (time, offset) in [(100, 0), (110, 400), (130, 900)] {
            store
                .append_timestamp(TimestampEntry::new(time, offset))
                .expect("append");
        }
        store
            .append_access_point(&AccessPoint {
                uncompressed_offset: 500,
                compressed_offset: 120,
                bits: 3,
                dictionary: vec![7; WINDOW_SIZE],
            })
            .expect("point");
        store.finish(1_700_000_000).expect("finish");

        let mut reader = SqliteIndexStore::open(&path).expect("open");
        assert_eq!(reader.log_mtime(), Some(1_700_000_000));
        assert_eq!(reader.offset_for(99).expect("lookup"), None);
        assert_eq!(reader.offset_for(120).expect("lookup"), Some(400));
        assert_eq!(
            reader.last_entry().expect("last"),
            Some(TimestampEntry::new(130, 900))
        );
        assert_eq!(reader.access_point_for(499).expect("point"), None);
        let point = reader.access_point_for(10_000).expect("point").expect("some");
        assert_eq!(point.bits, 3);
        assert_eq!(point.dictionary.len(), WINDOW_SIZE);
        assert_eq!(reader.access_points().expect("summaries").len(), 1);
    }

    #[test]
    fn resumed_build_continues_after_last_entry() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("log.db");

        let mut store = Box::new(SqliteIndexStore::begin_build(&path, true).expect("begin"));
        store
            .append_timestamp(TimestampEntry::new(100, 0))
            .expect("append");
        store.finish(1).expect("finish");

        let store = SqliteIndexStore::begin_build(&path, false).expect("resume");
        assert_eq!(store.resumed_from(), Some(TimestampEntry::new(100, 0)));
        assert_eq!(store.log_mtime(), None);
    }
}
