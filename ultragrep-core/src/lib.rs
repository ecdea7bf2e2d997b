//! Core shared library for ultragrep.
//!
//! Holds the pieces every other crate builds on: the [`Request`] model, log
//! formats and the request matchers that group lines, the pattern capability,
//! time parsing, configuration loading, errors and logging setup.

pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod format;
pub mod logging;
pub mod matcher;
pub mod pattern;
pub mod request;
pub mod time;

pub use config::{IndexBackend, IndexSettings, SearchConfig};
pub use diagnostics::LineDiagnostics;
pub use errors::{ConfigError, Result as CoreResult, UltragrepError};
pub use format::{FormatSpec, LineInterpreter, MatcherKind};
pub use matcher::{Flow, RequestMatcher, RequestSink, Signal};
pub use pattern::{Pattern, PatternSet};
pub use request::Request;
