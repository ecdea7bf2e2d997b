use crate::errors::Result;
use crate::format::{LineInterpreter, LineIssue};
use crate::pattern::Pattern;
use crate::time::{parse_timestamp, DEFAULT_TIME_FORMAT};

const SESSION_PATTERN: &str = r#""(\w{6}:\w{6})""#;
const TIME_PATTERN: &str = r#""(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})""#;
const END_PATTERN: &str = r#""Finished this session""#;

/// Background worker log: lines of concurrently running jobs interleave and
/// are told apart by a quoted `xxxxxx:yyyyyy` session id. A job ends with an
/// explicit `"Finished this session"` line.
#[derive(Debug, Clone)]
pub struct WorkFormat {
    session: Pattern,
    time: Pattern,
    end: Pattern,
}

impl WorkFormat {
    pub fn new() -> Result<Self> {
        Ok(Self {
            session: Pattern::compile(SESSION_PATTERN)?,
            time: Pattern::compile(TIME_PATTERN)?,
            end: Pattern::compile(END_PATTERN)?,
        })
    }
}

impl LineInterpreter for WorkFormat {
    fn extract_time(&self, line: &str) -> std::result::Result<Option<u64>, LineIssue> {
        match self.time.capture(line) {
            Some(text) => parse_timestamp(text, DEFAULT_TIME_FORMAT)
                .map(Some)
                .ok_or(LineIssue::UnparsableTime),
            None => Ok(None),
        }
    }

    fn extract_key(&self, line: &str) -> Option<String> {
        self.session.capture(line).map(str::to_string)
    }

    fn ends_unit(&self, line: &str) -> bool {
        self.end.test(line)
    }
}
