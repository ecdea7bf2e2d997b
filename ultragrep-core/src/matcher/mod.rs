//! Line grouping state machines.
//!
//! A matcher receives `(line, offset)` pairs in file order and hands every
//! completed [`Request`] to a [`RequestSink`]. The sink may ask the matcher to
//! stop; so may the driver through [`RequestMatcher::stop`]. A stop takes
//! effect on the next `process_line`, which flushes whatever is still open and
//! reports [`Signal::StopRequested`].

mod one_line;
mod session;
mod single;

pub use one_line::OneLineMatcher;
pub use session::SessionMatcher;
pub use single::SingleUnitMatcher;

use crate::diagnostics::LineDiagnostics;
use crate::format::LineInterpreter;
use crate::request::Request;

/// Outcome of feeding the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    EofReached,
    StopRequested,
}

/// Consumer verdict after receiving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receives completed requests. The request is only borrowed for the call.
pub trait RequestSink {
    fn accept(&mut self, request: &Request) -> Flow;
}

impl<F> RequestSink for F
where
    F: FnMut(&Request) -> Flow,
{
    fn accept(&mut self, request: &Request) -> Flow {
        self(request)
    }
}

/// Common interface of the grouping variants.
pub trait RequestMatcher {
    fn process_line(&mut self, line: &str, offset: u64, sink: &mut dyn RequestSink) -> Signal;

    /// Flushes every open request at end of input.
    fn finish(&mut self, sink: &mut dyn RequestSink) -> Signal;

    /// Asks the matcher to stop at the next `process_line`.
    fn stop(&mut self);

    fn diagnostics(&self) -> &LineDiagnostics;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StopState {
    #[default]
    Running,
    Pending,
    Stopped,
}

/// Stop bookkeeping shared by the variants.
#[derive(Debug, Default)]
pub(crate) struct StopControl {
    state: StopState,
}

impl StopControl {
    pub(crate) fn request(&mut self) {
        if self.state == StopState::Running {
            self.state = StopState::Pending;
        }
    }

    pub(crate) fn observe(&mut self, flow: Flow) {
        if flow == Flow::Stop {
            self.request();
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state == StopState::Pending
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state == StopState::Stopped
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.state = StopState::Stopped;
    }
}

pub(crate) fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Appends `line` and resolves the request time from it if still unknown.
pub(crate) fn absorb_line(
    interpreter: &dyn LineInterpreter,
    request: &mut Request,
    line: &str,
    offset: u64,
    diagnostics: &mut LineDiagnostics,
) {
    request.push_line(line, offset);
    if request.has_time() {
        return;
    }
    match interpreter.extract_time(line) {
        Ok(Some(time)) => request.resolve_time(time),
        Ok(None) => {}
        Err(issue) => {
            tracing::debug!(offset, ?issue, "line kept without a time");
            diagnostics.record(issue);
        }
    }
}
