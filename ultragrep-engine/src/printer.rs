//! Query output.
//!
//! Matched requests are written with a leading blank line and a closing row
//! of dashes. Whenever the highest request time seen so far advances, a
//! `@@<time>` marker line is written first; the merger uses these markers to
//! interleave the output of several files by time.

use std::io::{self, Write};

use regex::Regex;
use serde_json::Value;
use ultragrep_core::{CoreResult, Request, UltragrepError};

pub const MARKER_PREFIX: &str = "@@";
const MAX_SEPARATOR: usize = 80;
const MIN_SEPARATOR: usize = 3;

/// How request bodies are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Plain,
    /// Lines holding a JSON object are pretty-printed.
    Json,
    /// `<time>\t<action>\t<ms>` per request instead of the body.
    Perf,
}

pub fn marker_line(time: u64) -> String {
    format!("{MARKER_PREFIX}{time}\n")
}

/// Time carried by a `@@<time>` line, if it is one.
pub fn parse_marker(line: &str) -> Option<u64> {
    line.strip_prefix(MARKER_PREFIX)?.trim_end().parse().ok()
}

/// Whether `line` closes a printed request.
pub fn is_separator(line: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    line.len() >= MIN_SEPARATOR && line.bytes().all(|b| b == b'-')
}

fn separator_for(request: &Request) -> String {
    let width = request
        .last_line()
        .map(str::len)
        .unwrap_or_default()
        .clamp(MIN_SEPARATOR, MAX_SEPARATOR);
    "-".repeat(width)
}

/// Pulls the controller action and duration out of a Rails request.
#[derive(Debug, Clone)]
pub struct PerfExtractor {
    regex: Regex,
}

impl PerfExtractor {
    const PATTERN: &'static str =
        r"(?s)Processing (?:by )?(\S+) .*Completed (?:\d+ [^\n]*?)?in (\d+)(?:\.\d+)?ms";

    pub fn new() -> CoreResult<Self> {
        let regex = Regex::new(Self::PATTERN).map_err(|source| UltragrepError::InvalidPattern {
            pattern: Self::PATTERN.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }

    pub fn extract(&self, text: &str) -> Option<(String, u64)> {
        let caps = self.regex.captures(text)?;
        let action = caps.get(1)?.as_str().to_string();
        let millis = caps.get(2)?.as_str().parse().ok()?;
        Some((action, millis))
    }
}

/// Writes requests and progress markers to `out`.
pub struct RequestPrinter<W> {
    out: W,
    mode: OutputMode,
    watermark: u64,
    markers: bool,
    perf: Option<PerfExtractor>,
    printed: u64,
}

impl<W: Write> RequestPrinter<W> {
    pub fn new(out: W, mode: OutputMode) -> CoreResult<Self> {
        let perf = match mode {
            OutputMode::Perf => Some(PerfExtractor::new()?),
            _ => None,
        };
        Ok(Self {
            out,
            mode,
            watermark: 0,
            markers: true,
            perf,
            printed: 0,
        })
    }

    /// Turns the `@@<time>` lines off, for output nobody merges.
    pub fn with_markers(mut self, markers: bool) -> Self {
        self.markers = markers;
        self
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn printed(&self) -> u64 {
        self.printed
    }

    /// Records `time` as seen, writing a marker if it moves the watermark.
    pub fn observe(&mut self, time: u64) -> io::Result<()> {
        if time > self.watermark {
            self.watermark = time;
            if self.markers {
                self.out.write_all(marker_line(time).as_bytes())?;
            }
        }
        Ok(())
    }

    /// Writes a matched request, preceded by its marker if it has one.
    pub fn print(&mut self, request: &Request) -> io::Result<()> {
        self.observe(request.time)?;
        match self.mode {
            OutputMode::Plain => {
                self.out.write_all(b"\n")?;
                for line in &request.lines {
                    self.out.write_all(line.as_bytes())?;
                }
                self.write_separator(request)?;
            }
            OutputMode::Json => {
                self.out.write_all(b"\n")?;
                for line in &request.lines {
                    self.write_json_line(line)?;
                }
                self.write_separator(request)?;
            }
            OutputMode::Perf => {
                let extracted = self
                    .perf
                    .as_ref()
                    .and_then(|perf| perf.extract(&request.text()));
                let Some((action, millis)) = extracted else {
                    return Ok(());
                };
                writeln!(self.out, "{}\t{action}\t{millis}", request.time)?;
            }
        }
        self.printed += 1;
        Ok(())
    }

    fn write_json_line(&mut self, line: &str) -> io::Result<()> {
        match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => {
                serde_json::to_writer_pretty(&mut self.out, &value)?;
                self.out.write_all(b"\n")
            }
            _ => self.out.write_all(line.as_bytes()),
        }
    }

    fn write_separator(&mut self, request: &Request) -> io::Result<()> {
        let mut separator = separator_for(request);
        separator.push('\n');
        self.out.write_all(separator.as_bytes())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
