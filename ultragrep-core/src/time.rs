//! Timestamp parsing. All times are UTC seconds since the Unix epoch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::errors::{Result, UltragrepError};

pub const DAY_SECS: u64 = 24 * 3600;

/// Default layout used by the built-in formats.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses `text` with a strftime layout, interpreting it as UTC.
///
/// Times before the epoch are rejected, since `0` means "unresolved".
pub fn parse_timestamp(text: &str, format: &str) -> Option<u64> {
    let parsed = NaiveDateTime::parse_from_str(text.trim(), format).ok()?;
    let secs = Utc.from_utc_datetime(&parsed).timestamp();
    u64::try_from(secs).ok().filter(|secs| *secs > 0)
}

/// Parses a user supplied time: epoch seconds, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS`, RFC 3339 or a bare `YYYY-MM-DD` date.
pub fn parse_time_spec(text: &str) -> Result<u64> {
    let text = text.trim();

    // Bare digits are epoch seconds unless they look like a YYYYMMDD date.
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        if text.len() == 8 && text.starts_with("20") {
            if let Ok(date) = NaiveDate::parse_from_str(text, "%Y%m%d") {
                return date_start(date).ok_or_else(|| invalid(text));
            }
        }
        return text.parse::<u64>().map_err(|_| invalid(text));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return u64::try_from(parsed.timestamp()).map_err(|_| invalid(text));
    }

    for format in [DEFAULT_TIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Some(secs) = parse_timestamp(text, format) {
            return Ok(secs);
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(date_start)
        .ok_or_else(|| invalid(text))
}

/// Start of the UTC day containing `time`.
pub fn day_floor(time: u64) -> u64 {
    time - time % DAY_SECS
}

/// Current time in epoch seconds.
pub fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// Formats epoch seconds for humans.
pub fn format_time(time: u64) -> String {
    i64::try_from(time)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|dt| dt.format(DEFAULT_TIME_FORMAT).to_string())
        .unwrap_or_else(|| time.to_string())
}

fn date_start(date: NaiveDate) -> Option<u64> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    u64::try_from(Utc.from_utc_datetime(&midnight).timestamp()).ok()
}

fn invalid(text: &str) -> UltragrepError {
    UltragrepError::InvalidTime(text.to_string())
}
