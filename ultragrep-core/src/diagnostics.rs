use serde::Serialize;
use tracing::warn;

use crate::format::LineIssue;

/// Counters for recoverable per-line problems, reported once per file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineDiagnostics {
    pub invalid_utf8: u64,
    pub unparsable_time: u64,
    pub malformed_payload: u64,
}

impl LineDiagnostics {
    pub fn record(&mut self, issue: LineIssue) {
        match issue {
            LineIssue::UnparsableTime => self.unparsable_time += 1,
            LineIssue::MalformedPayload => self.malformed_payload += 1,
        }
    }

    pub fn record_invalid_utf8(&mut self) {
        self.invalid_utf8 += 1;
    }

    pub fn merge(&mut self, other: &LineDiagnostics) {
        self.invalid_utf8 += other.invalid_utf8;
        self.unparsable_time += other.unparsable_time;
        self.malformed_payload += other.malformed_payload;
    }

    pub fn total(&self) -> u64 {
        self.invalid_utf8 + self.unparsable_time + self.malformed_payload
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    /// Emits a single summary line for `source` if anything was counted.
    pub fn report(&self, source: &str) {
        if self.is_clean() {
            return;
        }
        warn!(
            source,
            invalid_utf8 = self.invalid_utf8,
            unparsable_time = self.unparsable_time,
            malformed_payload = self.malformed_payload,
            "skipped or partially parsed log lines"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_merges() {
        let mut left = LineDiagnostics::default();
        left.record(LineIssue::UnparsableTime);
        left.record_invalid_utf8();

        let mut right = LineDiagnostics::default();
        right.record(LineIssue::MalformedPayload);
        right.record(LineIssue::MalformedPayload);

        left.merge(&right);
        assert_eq!(left.total(), 4);
        assert_eq!(left.malformed_payload, 2);
        assert!(!left.is_clean());
        assert!(LineDiagnostics::default().is_clean());
    }
}
