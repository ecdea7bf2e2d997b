use std::sync::Arc;

use tracing::debug;

use crate::diagnostics::LineDiagnostics;
use crate::format::{LineInterpreter, LineIssue};
use crate::matcher::{is_blank, RequestMatcher, RequestSink, Signal, StopControl};
use crate::request::Request;

/// Every non-blank line is a complete request, emitted immediately.
/// Lines whose structured payload cannot be read are dropped.
pub struct OneLineMatcher {
    interpreter: Arc<dyn LineInterpreter>,
    control: StopControl,
    diagnostics: LineDiagnostics,
}

impl OneLineMatcher {
    pub fn new(interpreter: Arc<dyn LineInterpreter>) -> Self {
        Self {
            interpreter,
            control: StopControl::default(),
            diagnostics: LineDiagnostics::default(),
        }
    }
}

impl RequestMatcher for OneLineMatcher {
    fn process_line(&mut self, line: &str, offset: u64, sink: &mut dyn RequestSink) -> Signal {
        if self.control.is_stopped() {
            return Signal::StopRequested;
        }
        if self.control.is_pending() {
            self.control.mark_stopped();
            return Signal::StopRequested;
        }
        if is_blank(line) {
            return Signal::Continue;
        }

        let mut request = Request::new(offset);
        request.push_line(line, offset);
        match self.interpreter.extract_time(line) {
            Ok(Some(time)) => request.resolve_time(time),
            Ok(None) => {}
            Err(LineIssue::MalformedPayload) => {
                debug!(offset, "dropping malformed line");
                self.diagnostics.record(LineIssue::MalformedPayload);
                return Signal::Continue;
            }
            Err(issue) => self.diagnostics.record(issue),
        }

        let flow = sink.accept(&request);
        self.control.observe(flow);
        Signal::Continue
    }

    fn finish(&mut self, _sink: &mut dyn RequestSink) -> Signal {
        if self.control.is_stopped() {
            return Signal::StopRequested;
        }
        self.control.mark_stopped();
        Signal::EofReached
    }

    fn stop(&mut self) {
        self.control.request();
    }

    fn diagnostics(&self) -> &LineDiagnostics {
        &self.diagnostics
    }
}
