//! Ultragrep searches large request logs by time.
//!
//! A log format groups lines into requests. Each log gets a timestamp index,
//! plus gzip access points when it is compressed, so a query can enter the
//! log near the start of the wanted range instead of reading it from the top.
//!
//! - [`ultragrep_core`]: requests, formats, matchers and configuration
//! - [`ultragrep_index`]: index building and storage
//! - [`ultragrep_engine`]: single-file queries and merged multi-file search
//!
//! The `ultragrep` binary is built by the `ultragrep-cli` crate.

pub use ultragrep_core;
pub use ultragrep_engine;
pub use ultragrep_index;

pub use ultragrep_core::{FormatSpec, IndexBackend, IndexSettings, Request, SearchConfig};
pub use ultragrep_engine::{
    search, LogCollector, OutputMode, QueryEngine, QueryStats, RequestFilter, RequestPrinter,
    TimeWindow,
};
pub use ultragrep_index::{IndexBuilder, IndexCatalog, IndexStatus};
