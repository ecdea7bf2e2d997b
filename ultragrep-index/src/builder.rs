//! Drives a log through its matcher and records the timestamp index (and,
//! for gzip logs, the access points) as requests complete.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use ultragrep_core::{
    Flow, FormatSpec, IndexSettings, LineDiagnostics, LineInterpreter, MatcherKind, Request,
    RequestSink, Signal,
};

use crate::catalog::{self, IndexCatalog, IndexStatus};
use crate::compression::{open_bzip2_at, Compression};
use crate::error::{IndexError, Result};
use crate::gzip::GzipBlockIndexer;
use crate::lines::LineReader;
use crate::policy::IndexingPolicy;
use crate::store::TimestampSink;
use crate::timestamp::TimestampEntry;

/// What a build did.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub log: PathBuf,
    pub compression: Compression,
    /// Entry the build continued after, if it resumed.
    pub resumed_from: Option<u64>,
    pub requests: u64,
    pub timestamp_entries: u64,
    pub access_points: u64,
    pub diagnostics: LineDiagnostics,
}

/// Feeds request times through the indexing policy into a sink.
///
/// Session formats emit a request when it ends, out of file order, so their
/// entries are taken from the lines as they are read instead.
struct TimestampRecorder<'w, S: ?Sized> {
    policy: IndexingPolicy,
    sink: &'w mut S,
    by_line: Option<Arc<dyn LineInterpreter>>,
    requests: u64,
    entries: u64,
    error: Option<IndexError>,
}

impl<'w, S: TimestampSink + ?Sized> TimestampRecorder<'w, S> {
    fn new(policy: IndexingPolicy, format: &FormatSpec, sink: &'w mut S) -> Self {
        Self {
            policy,
            sink,
            by_line: (format.kind == MatcherKind::Session)
                .then(|| Arc::clone(&format.interpreter)),
            requests: 0,
            entries: 0,
            error: None,
        }
    }

    fn record(&mut self, entry: Option<TimestampEntry>) -> Flow {
        let Some(entry) = entry else {
            return Flow::Continue;
        };
        match self.sink.append_timestamp(entry) {
            Ok(()) => {
                self.entries += 1;
                Flow::Continue
            }
            Err(err) => {
                self.error = Some(err);
                Flow::Stop
            }
        }
    }

    /// Records the line's time when entries are taken per line.
    fn observe_line(&mut self, line: &str, offset: u64) -> Flow {
        let Some(interpreter) = &self.by_line else {
            return Flow::Continue;
        };
        let entry = match interpreter.extract_time(line) {
            Ok(Some(time)) => self.policy.observe_time(time, offset),
            _ => None,
        };
        self.record(entry)
    }

    fn into_result(self) -> Result<(u64, u64)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.requests, self.entries)),
        }
    }
}

impl<S: TimestampSink + ?Sized> RequestSink for TimestampRecorder<'_, S> {
    fn accept(&mut self, request: &Request) -> Flow {
        self.requests += 1;
        if self.by_line.is_some() {
            return Flow::Continue;
        }
        let entry = self.policy.observe(request);
        self.record(entry)
    }
}

/// Builds and refreshes indexes for one log format.
pub struct IndexBuilder<'a> {
    catalog: &'a IndexCatalog,
    format: &'a FormatSpec,
    granularity: u64,
    gzip_span: u64,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(catalog: &'a IndexCatalog, format: &'a FormatSpec, settings: &IndexSettings) -> Self {
        Self {
            catalog,
            format,
            granularity: settings.granularity_secs,
            gzip_span: settings.gzip_span_bytes,
        }
    }

    /// Builds the index unless it is already fresh. Returns `None` when
    /// nothing had to be done.
    pub fn ensure_fresh(&self, log: &Path) -> Result<Option<BuildReport>> {
        match self.catalog.status(log)? {
            IndexStatus::Fresh => Ok(None),
            IndexStatus::Missing => self.build(log, false).map(Some),
            IndexStatus::Unfinished => {
                info!(log = %log.display(), "continuing unfinished index");
                self.build(log, true).map(Some)
            }
            IndexStatus::Stale {
                indexed_mtime,
                log_mtime,
            } => {
                info!(
                    log = %log.display(),
                    indexed_mtime,
                    log_mtime,
                    "log changed since it was indexed, rebuilding"
                );
                self.build(log, false).map(Some)
            }
        }
    }

    /// Builds the index of `log`. `resume` continues after the last recorded
    /// entry; compressed logs are always rebuilt from the start.
    pub fn build(&self, log: &Path, resume: bool) -> Result<BuildReport> {
        // Taken up front so a log growing during the build reads as stale.
        let mtime = catalog::log_mtime(log)?;
        let compression = Compression::detect(log)?;
        let mut writer = self.catalog.open_writer(log, resume)?;
        let resumed_from = writer.resumed_from();

        let mut report = match compression {
            Compression::Gzip => self.build_gzip(log, writer.as_mut())?,
            Compression::Plain => {
                let start = resumed_from.map(|entry| entry.offset).unwrap_or(0);
                let mut file = File::open(log)?;
                file.seek(SeekFrom::Start(start))?;
                let policy = IndexingPolicy::resume_after(self.granularity, resumed_from);
                self.build_stream(log, BufReader::new(file), start, policy, writer.as_mut())?
            }
            Compression::Bzip2 => {
                let reader = BufReader::new(open_bzip2_at(File::open(log)?, 0)?);
                let policy = IndexingPolicy::new(self.granularity);
                self.build_stream(log, reader, 0, policy, writer.as_mut())?
            }
        };
        writer.finish(mtime)?;
        report.compression = compression;

        report.resumed_from = resumed_from.map(|entry| entry.offset);
        report.diagnostics.report(&log.display().to_string());
        info!(
            log = %log.display(),
            requests = report.requests,
            timestamp_entries = report.timestamp_entries,
            access_points = report.access_points,
            "index built"
        );
        Ok(report)
    }

    /// Indexes decompressed lines from `reader`, whose first byte is at
    /// `start`.
    fn build_stream<R: BufRead, S: TimestampSink + ?Sized>(
        &self,
        log: &Path,
        reader: R,
        start: u64,
        policy: IndexingPolicy,
        sink: &mut S,
    ) -> Result<BuildReport> {
        debug!(log = %log.display(), start, "indexing log stream");

        let mut lines = LineReader::new(reader, start);
        let mut matcher = self.format.build_matcher();
        let mut recorder = TimestampRecorder::new(policy, self.format, sink);

        let mut stopped = false;
        while let Some((line, offset)) = lines.next_line()? {
            if recorder.observe_line(line, offset) == Flow::Stop
                || matcher.process_line(line, offset, &mut recorder) == Signal::StopRequested
            {
                stopped = true;
                break;
            }
        }
        if !stopped {
            matcher.finish(&mut recorder);
        }

        let mut diagnostics = *lines.diagnostics();
        diagnostics.merge(matcher.diagnostics());
        let (requests, timestamp_entries) = recorder.into_result()?;
        Ok(BuildReport {
            log: log.to_path_buf(),
            compression: Compression::Plain,
            resumed_from: None,
            requests,
            timestamp_entries,
            access_points: 0,
            diagnostics,
        })
    }

    fn build_gzip<W: crate::store::IndexWriter + ?Sized>(
        &self,
        log: &Path,
        writer: &mut W,
    ) -> Result<BuildReport> {
        debug!(log = %log.display(), span = self.gzip_span, "indexing gzip log");
        let indexer = GzipBlockIndexer::new(File::open(log)?, self.gzip_span)?;
        let mut matcher = self.format.build_matcher();

        // Access points go straight to the writer; timestamps wait until the
        // pass is over so the two never borrow the writer at once.
        let mut entries: Vec<TimestampEntry> = Vec::new();
        let mut recorder = TimestampRecorder::new(
            IndexingPolicy::new(self.granularity),
            self.format,
            &mut entries,
        );

        let summary = indexer.run(writer, |line: &str, offset: u64| {
            if recorder.observe_line(line, offset) == Flow::Stop {
                return Flow::Stop;
            }
            match matcher.process_line(line, offset, &mut recorder) {
                Signal::StopRequested => Flow::Stop,
                _ => Flow::Continue,
            }
        })?;
        if summary.complete {
            matcher.finish(&mut recorder);
        }

        let mut diagnostics = summary.diagnostics;
        diagnostics.merge(matcher.diagnostics());
        let (requests, timestamp_entries) = recorder.into_result()?;
        for entry in entries {
            writer.append_timestamp(entry)?;
        }

        Ok(BuildReport {
            log: log.to_path_buf(),
            compression: Compression::Gzip,
            resumed_from: None,
            requests,
            timestamp_entries,
            access_points: summary.access_points,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IndexReader;
    use crate::test_support::{bzip2, gzip, sample_log, BASE_TIME};
    use std::fs;
    use tempfile::tempdir;
    use test_case::test_case;
    use ultragrep_core::{IndexBackend, SearchConfig};

    fn app_format() -> FormatSpec {
        FormatSpec::resolve("app", &SearchConfig::default()).expect("app format")
    }

    fn settings(backend: IndexBackend) -> IndexSettings {
        IndexSettings {
            backend,
            gzip_span_bytes: 64 * 1024,
            ..IndexSettings::default()
        }
    }

    #[test]
    fn session_entries_point_at_the_first_line_of_a_bucket() {
        use ultragrep_core::time::format_time;

        let dir = tempdir().expect("tempdir");
        let log = dir.path().join("work.log");
        let line = |secs: u64, session: &str, msg: &str| {
            format!(
                "{{\"time\":\"{}\",\"session\":\"{session}\",\"msg\":\"{msg}\"}}\n",
                format_time(BASE_TIME + secs)
            )
        };
        // The long job starts first but finishes last.
        let text = [
            line(0, "aaaaaa:000001", "import started"),
            line(1, "bbbbbb:000002", "mail started"),
            line(2, "bbbbbb:000002", "Finished this session"),
            line(25, "cccccc:000003", "cleanup started"),
            line(26, "cccccc:000003", "Finished this session"),
            line(27, "aaaaaa:000001", "Finished this session"),
        ];
        fs::write(&log, text.concat()).expect("write");

        let settings = settings(IndexBackend::Flat);
        let catalog = IndexCatalog::new(&settings);
        let format = FormatSpec::resolve("work", &SearchConfig::default()).expect("work");
        let report = IndexBuilder::new(&catalog, &format, &settings)
            .build(&log, false)
            .expect("build");
        assert_eq!(report.requests, 3);

        let mut reader = catalog.open_reader(&log).expect("open").expect("reader");
        let entries = reader.timestamp_entries().expect("entries");
        assert_eq!(entries[0].offset, 0);
        let third = text[..3].concat().len() as u64;
        assert_eq!(entries.last().map(|entry| entry.offset), Some(third));
    }

    #[test]
    fn plain_build_indexes_buckets_and_becomes_fresh() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join("app.log");
        fs::write(&log, sample_log(200)).expect("write");

        let settings = settings(IndexBackend::Flat);
        let catalog = IndexCatalog::new(&settings);
        let format = app_format();
        let builder = IndexBuilder::new(&catalog, &format, &settings);

        let report = builder.ensure_fresh(&log).expect("build").expect("report");
        assert_eq!(report.requests, 200);
        assert!(report.timestamp_entries > 1);
        assert!(report.diagnostics.is_clean());
        assert_eq!(catalog.status(&log).expect("status"), IndexStatus::Fresh);
        assert!(builder.ensure_fresh(&log).expect("noop").is_none());

        let mut reader = catalog.open_reader(&log).expect("open").expect("reader");
        let entries = reader.timestamp_entries().expect("entries");
        assert_eq!(entries[0].time, BASE_TIME - BASE_TIME % 10);
        assert_eq!(entries[0].offset, 0);
        assert!(entries.windows(2).all(|pair| pair[0].time < pair[1].time));
    }

    #[test]
    fn rebuilding_is_byte_identical() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join("app.log");
        fs::write(&log, sample_log(300)).expect("write");

        let settings = settings(IndexBackend::Flat);
        let catalog = IndexCatalog::new(&settings);
        let format = app_format();
        let builder = IndexBuilder::new(&catalog, &format, &settings);
        let artifact = catalog
            .artifact_path(&log, catalog::ArtifactKind::Timestamps)
            .expect("path");

        builder.build(&log, false).expect("first");
        let first = fs::read(&artifact).expect("read");
        builder.build(&log, false).expect("second");
        assert_eq!(first, fs::read(&artifact).expect("read"));
    }

    #[test]
    fn resumed_build_matches_full_build() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join("app.log");
        let data = sample_log(300);
        fs::write(&log, &data).expect("write");

        let settings = settings(IndexBackend::Flat);
        let catalog = IndexCatalog::new(&settings);
        let format = app_format();
        let builder = IndexBuilder::new(&catalog, &format, &settings);
        let artifact = catalog
            .artifact_path(&log, catalog::ArtifactKind::Timestamps)
            .expect("path");

        builder.build(&log, false).expect("full");
        let full = fs::read(&artifact).expect("read");

        // Simulate a crash: drop the tail of the index and clear the mtime.
        let header = 16;
        let keep = header + 16 * 3 + 5;
        let mut partial = full[..keep].to_vec();
        partial[8..16].copy_from_slice(&0u64.to_le_bytes());
        fs::write(&artifact, partial).expect("truncate");
        assert_eq!(catalog.status(&log).expect("status"), IndexStatus::Unfinished);

        let report = builder.ensure_fresh(&log).expect("resume").expect("report");
        assert!(report.resumed_from.is_some());
        assert_eq!(fs::read(&artifact).expect("read"), full);
    }

    #[test_case(IndexBackend::Flat, false ; "flat plain")]
    #[test_case(IndexBackend::Flat, true ; "flat gzip")]
    #[test_case(IndexBackend::Sqlite, false ; "sqlite plain")]
    fn empty_artifacts_left_by_a_crash_are_rebuilt(backend: IndexBackend, compressed: bool) {
        let dir = tempdir().expect("tempdir");
        let data = sample_log(400);
        let log = if compressed {
            let log = dir.path().join("app.log.gz");
            fs::write(&log, gzip(&data)).expect("write");
            log
        } else {
            let log = dir.path().join("app.log");
            fs::write(&log, &data).expect("write");
            log
        };

        let settings = settings(backend);
        let catalog = IndexCatalog::new(&settings);
        let kinds = match backend {
            IndexBackend::Flat => {
                vec![catalog::ArtifactKind::Timestamps, catalog::ArtifactKind::AccessPoints]
            }
            IndexBackend::Sqlite => vec![catalog::ArtifactKind::Database],
        };
        for kind in kinds {
            let path = catalog.artifact_path(&log, kind).expect("path");
            fs::write(&path, b"").expect("plant");
        }
        assert_ne!(catalog.status(&log).expect("status"), IndexStatus::Fresh);

        let format = app_format();
        let report = IndexBuilder::new(&catalog, &format, &settings)
            .ensure_fresh(&log)
            .expect("rebuild")
            .expect("report");
        assert!(report.resumed_from.is_none());
        assert_eq!(report.requests, 400);
        assert_eq!(catalog.status(&log).expect("status"), IndexStatus::Fresh);

        let mut reader = catalog.open_reader(&log).expect("open").expect("reader");
        assert_eq!(reader.offset_for(BASE_TIME).expect("lookup"), Some(0));
    }

    #[test]
    fn bzip2_build_indexes_decompressed_offsets() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join("app.log.bz2");
        let data = sample_log(600);
        fs::write(&log, bzip2(&data)).expect("write");

        let settings = settings(IndexBackend::Flat);
        let catalog = IndexCatalog::new(&settings);
        let format = app_format();
        let report = IndexBuilder::new(&catalog, &format, &settings)
            .build(&log, true)
            .expect("build");

        assert_eq!(report.compression, Compression::Bzip2);
        assert!(report.resumed_from.is_none());
        assert_eq!(report.requests, 600);
        assert_eq!(report.access_points, 0);
        assert_eq!(catalog.status(&log).expect("status"), IndexStatus::Fresh);

        let mut reader = catalog.open_reader(&log).expect("open").expect("reader");
        let entries = reader.timestamp_entries().expect("entries");
        assert!(entries.len() > 10);
        for entry in entries {
            assert!(data[entry.offset as usize..].starts_with(b"Started GET"));
        }
    }

    #[test]
    fn gzip_build_records_access_points_and_timestamps() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join("app.log.gz");
        let data = sample_log(5_000);
        fs::write(&log, gzip(&data)).expect("write");

        for backend in [IndexBackend::Flat, IndexBackend::Sqlite] {
            let settings = settings(backend);
            let catalog = IndexCatalog::new(&settings);
            let format = app_format();
            let report = IndexBuilder::new(&catalog, &format, &settings)
                .build(&log, true)
                .expect("build");

            assert_eq!(report.compression, Compression::Gzip);
            assert!(report.resumed_from.is_none());
            assert_eq!(report.requests, 5_000);
            assert!(report.access_points > 1);

            let mut reader = catalog.open_reader(&log).expect("open").expect("reader");
            assert_eq!(
                reader.access_points().expect("points").len() as u64,
                report.access_points
            );
            let last = reader.last_entry().expect("last").expect("entry");
            assert!((last.offset as usize) < data.len());
            assert_eq!(catalog.status(&log).expect("status"), IndexStatus::Fresh);
        }
    }
}
