use crate::errors::Result;
use crate::format::{LineInterpreter, LineIssue};
use crate::pattern::Pattern;
use crate::time::{parse_timestamp, DEFAULT_TIME_FORMAT};

const HEADER_PATTERN: &str = r"^(?:Processing|Started) .*(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})";

/// Rails style application log: a request starts with a timestamped
/// `Processing ...` or `Started ...` header and requests are separated by
/// blank lines. Rails 3 `Processing by ...` lines carry no time and stay
/// inside the request opened by `Started`.
#[derive(Debug, Clone)]
pub struct AppFormat {
    header: Pattern,
}

impl AppFormat {
    pub fn new() -> Result<Self> {
        Ok(Self {
            header: Pattern::compile(HEADER_PATTERN)?,
        })
    }
}

impl LineInterpreter for AppFormat {
    fn is_boundary(&self, line: &str) -> bool {
        self.header.test(line)
    }

    fn extract_time(&self, line: &str) -> std::result::Result<Option<u64>, LineIssue> {
        match self.header.capture(line) {
            Some(text) => parse_timestamp(text, DEFAULT_TIME_FORMAT)
                .map(Some)
                .ok_or(LineIssue::UnparsableTime),
            None => Ok(None),
        }
    }
}
