//! Which requests a query keeps.

use serde_json::Value;
use ultragrep_core::{CoreResult, Pattern, PatternSet, Request, UltragrepError};

use crate::error::{QueryError, Result};

/// Inclusive time range in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: u64,
    pub end: u64,
}

impl TimeWindow {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(QueryError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Requests without a time always pass.
    pub fn contains(&self, time: u64) -> bool {
        time == 0 || (self.start..=self.end).contains(&time)
    }

    pub fn is_past(&self, time: u64) -> bool {
        time > self.end
    }

    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        start <= self.end && end >= self.start
    }
}

/// `field=regex` condition on a top-level JSON field.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    field: String,
    pattern: Pattern,
}

impl KeyFilter {
    pub fn parse(spec: &str) -> CoreResult<Self> {
        let (field, pattern) = spec
            .split_once('=')
            .filter(|(field, _)| !field.trim().is_empty())
            .ok_or_else(|| UltragrepError::InvalidKeyFilter(spec.to_string()))?;
        Ok(Self {
            field: field.trim().to_string(),
            pattern: Pattern::compile(pattern)?,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn matches(&self, object: &serde_json::Map<String, Value>) -> bool {
        match object.get(&self.field) {
            Some(Value::String(text)) => self.pattern.test(text),
            Some(Value::Null) | None => false,
            Some(other) => self.pattern.test(&other.to_string()),
        }
    }
}

/// Time window, text patterns and key filters combined.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    window: TimeWindow,
    patterns: PatternSet,
    keys: Vec<KeyFilter>,
}

impl RequestFilter {
    pub fn new(window: TimeWindow, patterns: PatternSet, keys: Vec<KeyFilter>) -> Self {
        Self {
            window,
            patterns,
            keys,
        }
    }

    /// Compiles patterns and `field=regex` specs up front so bad input fails
    /// before any file is touched.
    pub fn compile<S: AsRef<str>>(window: TimeWindow, patterns: &[S], keys: &[S]) -> Result<Self> {
        let patterns = PatternSet::compile(patterns)?;
        let keys = keys
            .iter()
            .map(|spec| KeyFilter::parse(spec.as_ref()))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self::new(window, patterns, keys))
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn matches(&self, request: &Request) -> bool {
        self.window.contains(request.time)
            && self.patterns.matches_lines(&request.lines)
            && self.matches_keys(request)
    }

    fn matches_keys(&self, request: &Request) -> bool {
        if self.keys.is_empty() {
            return true;
        }
        request.lines.iter().any(|line| {
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(object)) => self.keys.iter().all(|key| key.matches(&object)),
                _ => false,
            }
        })
    }
}
