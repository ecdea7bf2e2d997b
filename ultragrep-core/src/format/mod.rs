//! Per-format line interpretation.
//!
//! A log format is a [`LineInterpreter`] (how to read a single line) plus a
//! [`MatcherKind`] (how lines group into requests). Built-in formats cover
//! Rails style application logs, session-tagged worker logs and JSON lines;
//! further formats can be declared in the configuration file.

mod app;
mod custom;
mod json;
mod work;

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

pub use app::AppFormat;
pub use custom::RegexFormat;
pub use json::JsonFormat;
pub use work::WorkFormat;

use crate::config::SearchConfig;
use crate::errors::{Result, UltragrepError};
use crate::matcher::{OneLineMatcher, RequestMatcher, SessionMatcher, SingleUnitMatcher};

/// Recoverable problems found while reading a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineIssue {
    /// The line carries a time field that could not be parsed.
    UnparsableTime,
    /// The line should hold a structured payload but does not.
    MalformedPayload,
}

/// Everything a format knows about one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineInterpretation {
    pub is_boundary: bool,
    pub ends_unit: bool,
    pub extracted_time: Option<u64>,
    pub extracted_key: Option<String>,
}

/// Format specific reading of raw log lines.
///
/// Matchers call the individual methods lazily; `interpret` bundles them.
pub trait LineInterpreter: Send + Sync {
    /// Whether the line opens a new request.
    fn is_boundary(&self, _line: &str) -> bool {
        false
    }

    /// `Ok(None)` when the line carries no time at all.
    fn extract_time(&self, line: &str) -> std::result::Result<Option<u64>, LineIssue>;

    /// Session correlation key carried by the line.
    fn extract_key(&self, _line: &str) -> Option<String> {
        None
    }

    /// Whether the line explicitly closes its session.
    fn ends_unit(&self, _line: &str) -> bool {
        false
    }

    fn interpret(&self, line: &str) -> LineInterpretation {
        LineInterpretation {
            is_boundary: self.is_boundary(line),
            ends_unit: self.ends_unit(line),
            extracted_time: self.extract_time(line).ok().flatten(),
            extracted_key: self.extract_key(line),
        }
    }
}

/// How lines are grouped into requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// One request open at a time, split on a start pattern or blank lines.
    #[default]
    Single,
    /// Several concurrently open requests keyed by a session id.
    Session,
    /// Every line is a request.
    OneLine,
}

/// A resolved log format, ready to produce matchers.
#[derive(Clone)]
pub struct FormatSpec {
    pub name: String,
    pub kind: MatcherKind,
    /// Consecutive blank lines that separate requests, `0` to disable.
    pub blank_lines: usize,
    /// Whether lines are JSON documents.
    pub structured: bool,
    pub interpreter: Arc<dyn LineInterpreter>,
}

impl fmt::Debug for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("blank_lines", &self.blank_lines)
            .field("structured", &self.structured)
            .finish()
    }
}

impl FormatSpec {
    /// Resolves a format name against the built-ins and the configured formats.
    pub fn resolve(name: &str, config: &SearchConfig) -> Result<Self> {
        match name {
            "app" | "rails" => Ok(Self {
                name: "app".into(),
                kind: MatcherKind::Single,
                blank_lines: 2,
                structured: false,
                interpreter: Arc::new(AppFormat::new()?),
            }),
            "work" => Ok(Self {
                name: "work".into(),
                kind: MatcherKind::Session,
                blank_lines: 0,
                structured: false,
                interpreter: Arc::new(WorkFormat::new()?),
            }),
            "json" => Ok(Self {
                name: "json".into(),
                kind: MatcherKind::OneLine,
                blank_lines: 0,
                structured: true,
                interpreter: Arc::new(JsonFormat::new()),
            }),
            other => {
                let custom = config
                    .custom_format(other)
                    .ok_or_else(|| UltragrepError::UnknownFormat(other.to_string()))?;
                Ok(Self {
                    name: custom.name.clone(),
                    kind: custom.kind,
                    blank_lines: custom.blank_lines,
                    structured: false,
                    interpreter: Arc::new(RegexFormat::from_config(custom)?),
                })
            }
        }
    }

    /// Builds a fresh matcher owning its own request state.
    pub fn build_matcher(&self) -> Box<dyn RequestMatcher> {
        let interpreter = Arc::clone(&self.interpreter);
        match self.kind {
            MatcherKind::Single => {
                Box::new(SingleUnitMatcher::new(interpreter, self.blank_lines))
            }
            MatcherKind::Session => Box::new(SessionMatcher::new(interpreter)),
            MatcherKind::OneLine => Box::new(OneLineMatcher::new(interpreter)),
        }
    }
}

/// Names of the built-in formats.
pub const BUILTIN_FORMATS: [&str; 3] = ["app", "work", "json"];
