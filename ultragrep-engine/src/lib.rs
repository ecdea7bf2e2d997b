//! Ultragrep query engine: filters matched requests, prints them with time
//! markers, and merges the output of many log files by time. Live logs can
//! be followed instead with [`LogFollower`].

pub mod collector;
pub mod dump;
pub mod error;
pub mod filter;
pub mod merge;
pub mod pipe;
pub mod printer;
pub mod query;
pub mod search;
pub mod tail;

pub use collector::{LogCollector, LogFile};
pub use dump::IndexDump;
pub use error::{QueryError, Result};
pub use filter::{KeyFilter, RequestFilter, TimeWindow};
pub use merge::{merge_outputs, MergeSource};
pub use printer::{OutputMode, RequestPrinter};
pub use query::{open_log_at, LogCursor, QueryEngine, QueryStats};
pub use search::{search, SearchStats};
pub use tail::{LogFollower, StopHandle, TailOptions, TailStats};
