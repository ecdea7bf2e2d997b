use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::errors::Result;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "ULTRAGREP_LOG";

/// Initializes the tracing subscriber used by the command line tools.
///
/// Diagnostics go to stderr; stdout carries matched requests and `@@` markers.
pub fn init_tracing(level: Option<&str>) -> Result<()> {
    let default_level = level.unwrap_or("warn");
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init()
        .map_err(|err| crate::errors::UltragrepError::ConfigError(err.to_string()))?;

    Ok(())
}
