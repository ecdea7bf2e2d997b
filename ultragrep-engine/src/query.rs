//! Single-file queries.
//!
//! A query looks up the start time in the index, enters the log near that
//! offset (a plain seek, a gzip access point, or decompressing a bzip2 log up
//! to it), and runs the remaining lines through the format's matcher until a
//! request past the end of the window shows up.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};
use ultragrep_core::{
    Flow, FormatSpec, IndexSettings, LineDiagnostics, Request, RequestSink, Signal,
};
use ultragrep_index::{
    log_mtime, open_bzip2_at, BuildReport, Compression, GzipRandomAccessReader, IndexBuilder,
    IndexCatalog, IndexReader, LineReader,
};

use crate::error::Result;
use crate::filter::RequestFilter;
use crate::printer::RequestPrinter;

/// A log opened at some uncompressed offset.
pub struct LogCursor {
    pub reader: Box<dyn BufRead + Send>,
    pub offset: u64,
}

/// Counters for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    pub start_offset: u64,
    pub requests: u64,
    pub matched: u64,
    /// The scan stopped at a request past the end of the window.
    pub reached_end: bool,
    pub diagnostics: LineDiagnostics,
}

/// Opens the index of `log` if it can be trusted for lookups.
fn usable_index(catalog: &IndexCatalog, log: &Path) -> Result<Option<Box<dyn IndexReader>>> {
    let Some(reader) = catalog.open_reader(log)? else {
        return Ok(None);
    };
    match reader.log_mtime() {
        Some(indexed) if indexed != log_mtime(log)? => {
            warn!(log = %log.display(), "index is stale, scanning from the start");
            Ok(None)
        }
        _ => Ok(Some(reader)),
    }
}

/// Opens `log` at the indexed offset closest to, and not after, `time`.
pub fn open_log_at(catalog: &IndexCatalog, log: &Path, time: u64) -> Result<LogCursor> {
    let compression = Compression::detect(log)?;
    let mut offset = 0;
    let mut point = None;
    if let Some(mut index) = usable_index(catalog, log)? {
        offset = index.offset_for(time)?.unwrap_or(0);
        if compression == Compression::Gzip {
            point = index.access_point_for(offset)?;
        }
    }
    debug!(
        log = %log.display(),
        time,
        offset,
        %compression,
        access_point = point.as_ref().map(|p| p.uncompressed_offset),
        "opening log"
    );

    let mut file = File::open(log)?;
    let reader: Box<dyn BufRead + Send> = match compression {
        Compression::Gzip => {
            let gzip = GzipRandomAccessReader::open_at(file, point.as_ref(), offset)?;
            Box::new(BufReader::new(gzip))
        }
        Compression::Bzip2 => Box::new(BufReader::new(open_bzip2_at(file, offset)?)),
        Compression::Plain => {
            file.seek(SeekFrom::Start(offset))?;
            Box::new(BufReader::new(file))
        }
    };
    Ok(LogCursor { reader, offset })
}

struct QuerySink<'a, W> {
    filter: &'a RequestFilter,
    printer: &'a mut RequestPrinter<W>,
    requests: u64,
    matched: u64,
    reached_end: bool,
    error: Option<io::Error>,
}

impl<W: Write> QuerySink<'_, W> {
    fn handle(&mut self, request: &Request) -> io::Result<Flow> {
        self.requests += 1;
        if self.filter.window().is_past(request.time) {
            self.reached_end = true;
            return Ok(Flow::Stop);
        }
        if self.filter.matches(request) {
            self.matched += 1;
            self.printer.print(request)?;
        } else {
            self.printer.observe(request.time)?;
        }
        Ok(Flow::Continue)
    }
}

impl<W: Write> RequestSink for QuerySink<'_, W> {
    fn accept(&mut self, request: &Request) -> Flow {
        match self.handle(request) {
            Ok(flow) => flow,
            Err(err) => {
                self.error = Some(err);
                Flow::Stop
            }
        }
    }
}

/// Runs queries of one log format with one filter.
pub struct QueryEngine {
    format: FormatSpec,
    settings: IndexSettings,
    catalog: IndexCatalog,
    filter: RequestFilter,
}

impl QueryEngine {
    pub fn new(format: FormatSpec, settings: &IndexSettings, filter: RequestFilter) -> Self {
        Self {
            format,
            settings: settings.clone(),
            catalog: IndexCatalog::new(settings),
            filter,
        }
    }

    pub fn format(&self) -> &FormatSpec {
        &self.format
    }

    pub fn filter(&self) -> &RequestFilter {
        &self.filter
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }

    /// Builds or refreshes the index of `log` when automatic builds are on.
    pub fn prepare(&self, log: &Path) -> Result<Option<BuildReport>> {
        if !self.settings.auto_build {
            return Ok(None);
        }
        let builder = IndexBuilder::new(&self.catalog, &self.format, &self.settings);
        Ok(builder.ensure_fresh(log)?)
    }

    /// Prints the requests of `log` that pass the filter.
    pub fn run<W: Write>(&self, log: &Path, printer: &mut RequestPrinter<W>) -> Result<QueryStats> {
        self.prepare(log)?;
        let cursor = open_log_at(&self.catalog, log, self.filter.window().start)?;
        let start_offset = cursor.offset;

        let mut lines = LineReader::new(cursor.reader, cursor.offset);
        let mut matcher = self.format.build_matcher();
        let mut sink = QuerySink {
            filter: &self.filter,
            printer,
            requests: 0,
            matched: 0,
            reached_end: false,
            error: None,
        };

        let mut stopped = false;
        while let Some((line, offset)) = lines.next_line()? {
            if matcher.process_line(line, offset, &mut sink) == Signal::StopRequested {
                stopped = true;
                break;
            }
        }
        if !stopped {
            matcher.finish(&mut sink);
        }
        if let Some(err) = sink.error.take() {
            return Err(err.into());
        }
        sink.printer.flush()?;

        let mut diagnostics = *lines.diagnostics();
        diagnostics.merge(matcher.diagnostics());
        diagnostics.report(&log.display().to_string());

        let stats = QueryStats {
            start_offset,
            requests: sink.requests,
            matched: sink.matched,
            reached_end: sink.reached_end,
            diagnostics,
        };
        debug!(log = %log.display(), ?stats, "query finished");
        Ok(stats)
    }

    /// Copies `log` to `out` from approximately `time` onwards.
    pub fn cat<W: Write>(&self, log: &Path, time: u64, out: &mut W) -> Result<u64> {
        self.prepare(log)?;
        let mut cursor = open_log_at(&self.catalog, log, time)?;
        let copied = io::copy(&mut cursor.reader, out)?;
        out.flush()?;
        Ok(copied)
    }
}
