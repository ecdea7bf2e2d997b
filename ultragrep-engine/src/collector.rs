//! Finds the log files of a log type that may hold a time range.
//!
//! Rotated logs carry their day in the name (`app.log-20240101`,
//! `app.log-20240101.gz`). Files without a date are the live logs and are
//! always searched. The host is the name of the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use ultragrep_core::time::DAY_SECS;
use ultragrep_core::{CoreResult, Pattern, UltragrepError};
use ultragrep_index::Compression;

use crate::error::Result;
use crate::filter::TimeWindow;

/// A candidate log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogFile {
    pub path: PathBuf,
    pub host: Option<String>,
    /// Start of the day named in the file, if any.
    pub day: Option<u64>,
}

impl LogFile {
    pub fn end(&self) -> Option<u64> {
        self.day.map(|day| day + DAY_SECS - 1)
    }
}

/// Day encoded as a trailing `YYYYMMDD` in the file name.
pub fn day_from_name(path: &Path, date_suffix: &Regex) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let digits = date_suffix.captures(name)?.get(1)?.as_str();
    let date = NaiveDate::parse_from_str(digits, "%Y%m%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp();
    u64::try_from(midnight).ok()
}

pub fn host_of(path: &Path) -> Option<String> {
    path.parent()?
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Resolves globs into files grouped by day.
pub struct LogCollector {
    globs: Vec<String>,
    host: Option<Pattern>,
    date_suffix: Regex,
}

impl LogCollector {
    pub fn new(globs: &[String], host: Option<&str>) -> CoreResult<Self> {
        const DATE_SUFFIX: &str = r"(\d+)(\.\w+)?$";
        let date_suffix = Regex::new(DATE_SUFFIX).map_err(|source| {
            UltragrepError::InvalidPattern {
                pattern: DATE_SUFFIX.to_string(),
                source,
            }
        })?;
        Ok(Self {
            globs: globs.to_vec(),
            host: host.map(Pattern::compile).transpose()?,
            date_suffix,
        })
    }

    /// Files overlapping `window`, grouped by day in ascending order. Live
    /// logs without a date form the last group.
    pub fn collect(&self, window: TimeWindow) -> Result<Vec<Vec<LogFile>>> {
        let mut by_path = BTreeMap::new();
        for pattern in &self.globs {
            for entry in glob::glob(pattern)? {
                let path = entry.map_err(glob::GlobError::into_error)?;
                if !path.is_file() {
                    continue;
                }
                let file = LogFile {
                    day: day_from_name(&path, &self.date_suffix),
                    host: host_of(&path),
                    path: path.clone(),
                };
                if self.keep(&file, window) {
                    by_path.insert(path, file);
                } else {
                    debug!(path = %file.path.display(), "skipping log outside range");
                }
            }
        }

        let mut groups: BTreeMap<u64, Vec<LogFile>> = BTreeMap::new();
        for file in by_path.into_values() {
            groups
                .entry(file.day.unwrap_or(u64::MAX))
                .or_default()
                .push(file);
        }
        Ok(groups.into_values().collect())
    }

    /// Logs that can still grow on the day starting at `today`: plain files
    /// dated that day, and undated live logs.
    pub fn collect_live(&self, today: u64) -> Result<Vec<LogFile>> {
        let window = TimeWindow::new(today, today + DAY_SECS - 1)?;
        let mut live = Vec::new();
        for file in self.collect(window)?.into_iter().flatten() {
            if Compression::detect(&file.path)?.is_compressed() {
                debug!(path = %file.path.display(), "not following compressed log");
                continue;
            }
            live.push(file);
        }
        Ok(live)
    }

    fn keep(&self, file: &LogFile, window: TimeWindow) -> bool {
        if !self.host_matches(file) {
            return false;
        }
        match (file.day, file.end()) {
            (Some(start), Some(end)) => window.overlaps(start, end),
            _ => true,
        }
    }

    fn host_matches(&self, file: &LogFile) -> bool {
        match (&self.host, &file.host) {
            (None, _) => true,
            (Some(host), Some(name)) => host.test(name),
            (Some(_), None) => false,
        }
    }
}
