use serde::Serialize;

/// One logical unit of log output: an HTTP request, a background job session
/// or a single structured record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Request {
    /// Raw lines in the order they were read, terminators included.
    pub lines: Vec<String>,
    /// Uncompressed byte offset of the first line.
    pub offset: u64,
    /// Seconds since the epoch, `0` while unresolved.
    pub time: u64,
    /// Correlation key for session-tracked formats.
    pub session_key: Option<String>,
}

impl Request {
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn with_key(offset: u64, session_key: String) -> Self {
        Self {
            offset,
            session_key: Some(session_key),
            ..Self::default()
        }
    }

    /// Appends a line. The first line fixes the request offset.
    pub fn push_line(&mut self, line: &str, offset: u64) {
        if self.lines.is_empty() {
            self.offset = offset;
        }
        self.lines.push(line.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn has_time(&self) -> bool {
        self.time != 0
    }

    /// Sets the time unless one was already resolved.
    pub fn resolve_time(&mut self, time: u64) {
        if self.time == 0 {
            self.time = time;
        }
    }

    /// Concatenated request text.
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    /// Last line with its terminator stripped.
    pub fn last_line(&self) -> Option<&str> {
        self.lines
            .last()
            .map(|line| line.trim_end_matches(['\n', '\r']))
    }
}
