//! Following live logs as they grow.
//!
//! Each followed log starts at its current end. Every poll reads whatever
//! was appended since the last one and runs it through the log's own
//! matcher; matched requests are printed as soon as the matcher completes
//! them, without time markers or merging. A log that shrinks is taken to be
//! truncated or rotated and is read again from its start.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};
use ultragrep_core::{Flow, Request, RequestMatcher, RequestSink, Signal};
use ultragrep_index::LineSplitter;

use crate::error::Result;
use crate::filter::RequestFilter;
use crate::printer::RequestPrinter;
use crate::query::QueryEngine;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailOptions {
    pub poll_interval: Duration,
    /// Give up after this long without new data. `None` follows until
    /// stopped.
    pub idle_limit: Option<Duration>,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            idle_limit: None,
        }
    }
}

/// Asks a running follower to finish after its current poll.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TailStats {
    pub polls: u64,
    pub bytes: u64,
    pub requests: u64,
    pub matched: u64,
    pub truncations: u64,
}

struct TailSink<'a, W> {
    filter: &'a RequestFilter,
    printer: &'a mut RequestPrinter<W>,
    stats: &'a mut TailStats,
    error: Option<io::Error>,
}

impl<W: Write> RequestSink for TailSink<'_, W> {
    fn accept(&mut self, request: &Request) -> Flow {
        self.stats.requests += 1;
        if !self.filter.matches(request) {
            return Flow::Continue;
        }
        self.stats.matched += 1;
        match self.printer.print(request) {
            Ok(()) => Flow::Continue,
            Err(err) => {
                self.error = Some(err);
                Flow::Stop
            }
        }
    }
}

struct FollowedLog {
    path: PathBuf,
    position: u64,
    splitter: LineSplitter,
    matcher: Box<dyn RequestMatcher>,
}

impl FollowedLog {
    /// Feeds `chunk` through the splitter and matcher.
    fn feed<W: Write>(&mut self, chunk: &[u8], sink: &mut TailSink<'_, W>) {
        let matcher = &mut self.matcher;
        self.splitter.push(chunk, &mut |line: &str, offset: u64| {
            match matcher.process_line(line, offset, &mut *sink) {
                Signal::StopRequested => Flow::Stop,
                _ => Flow::Continue,
            }
        });
    }

    /// Flushes a trailing unterminated line and every open request.
    fn drain<W: Write>(&mut self, sink: &mut TailSink<'_, W>) {
        let matcher = &mut self.matcher;
        self.splitter.finish(&mut |line: &str, offset: u64| {
            match matcher.process_line(line, offset, &mut *sink) {
                Signal::StopRequested => Flow::Stop,
                _ => Flow::Continue,
            }
        });
        self.matcher.finish(sink);
    }
}

/// Polls a set of growing logs and prints the requests that pass the
/// engine's filter.
pub struct LogFollower<'e> {
    engine: &'e QueryEngine,
    logs: Vec<FollowedLog>,
    options: TailOptions,
    stop: StopHandle,
    stats: TailStats,
}

impl<'e> LogFollower<'e> {
    /// Starts following `paths` from their current ends.
    pub fn new(engine: &'e QueryEngine, paths: &[PathBuf], options: TailOptions) -> Result<Self> {
        let mut logs = Vec::with_capacity(paths.len());
        for path in paths {
            let position = fs::metadata(path)?.len();
            debug!(path = %path.display(), position, "following log");
            logs.push(FollowedLog {
                path: path.clone(),
                position,
                splitter: LineSplitter::new(position),
                matcher: engine.format().build_matcher(),
            });
        }
        Ok(Self {
            engine,
            logs,
            options,
            stop: StopHandle::default(),
            stats: TailStats::default(),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stats(&self) -> TailStats {
        self.stats
    }

    /// Reads what every log gained since the last poll. Returns the number of
    /// new bytes.
    pub fn poll<W: Write>(&mut self, printer: &mut RequestPrinter<W>) -> Result<u64> {
        let mut sink = TailSink {
            filter: self.engine.filter(),
            printer,
            stats: &mut self.stats,
            error: None,
        };
        let mut total = 0;
        for log in &mut self.logs {
            total += read_appended(log, &mut sink)?;
            if let Some(err) = sink.error.take() {
                return Err(err.into());
            }
        }
        sink.stats.polls += 1;
        sink.stats.bytes += total;
        sink.printer.flush()?;
        Ok(total)
    }

    /// Polls until stopped or idle for longer than the idle limit, then
    /// flushes the requests still open.
    pub fn run<W: Write>(mut self, printer: &mut RequestPrinter<W>) -> Result<TailStats> {
        info!(logs = self.logs.len(), "following logs");
        let mut last_data = Instant::now();
        while !self.stop.is_stopped() {
            if self.poll(printer)? > 0 {
                last_data = Instant::now();
            } else if self
                .options
                .idle_limit
                .is_some_and(|limit| last_data.elapsed() >= limit)
            {
                debug!("no new data within the idle limit");
                break;
            }
            thread::sleep(self.options.poll_interval);
        }
        self.finish(printer)
    }

    /// Flushes the requests still open in every log.
    pub fn finish<W: Write>(mut self, printer: &mut RequestPrinter<W>) -> Result<TailStats> {
        let mut sink = TailSink {
            filter: self.engine.filter(),
            printer,
            stats: &mut self.stats,
            error: None,
        };
        for log in &mut self.logs {
            log.drain(&mut sink);
            if let Some(err) = sink.error.take() {
                return Err(err.into());
            }
        }
        sink.printer.flush()?;
        Ok(self.stats)
    }
}

fn read_appended<W: Write>(log: &mut FollowedLog, sink: &mut TailSink<'_, W>) -> Result<u64> {
    let len = match fs::metadata(&log.path) {
        Ok(metadata) => metadata.len(),
        // Between a rotation's rename and the new file showing up.
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    if len < log.position {
        info!(
            path = %log.path.display(),
            was = log.position,
            now = len,
            "log shrank, reading it again from the start"
        );
        log.drain(sink);
        log.position = 0;
        log.splitter = LineSplitter::new(0);
        sink.stats.truncations += 1;
    }
    if len == log.position {
        return Ok(0);
    }

    let mut file = open_at(&log.path, log.position)?;
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut read_total = 0;
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        log.feed(&chunk[..read], sink);
        log.position += read as u64;
        read_total += read as u64;
        if sink.error.is_some() {
            break;
        }
    }
    Ok(read_total)
}

fn open_at(path: &Path, position: u64) -> io::Result<File> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(position))?;
    Ok(file)
}
