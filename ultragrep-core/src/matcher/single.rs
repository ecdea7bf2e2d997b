use std::mem;
use std::sync::Arc;

use crate::diagnostics::LineDiagnostics;
use crate::format::LineInterpreter;
use crate::matcher::{absorb_line, is_blank, RequestMatcher, RequestSink, Signal, StopControl};
use crate::request::Request;

/// One request open at a time. A request ends when the next one starts or
/// after `blank_lines` consecutive blank lines.
pub struct SingleUnitMatcher {
    interpreter: Arc<dyn LineInterpreter>,
    blank_lines: usize,
    blank_run: usize,
    current: Request,
    control: StopControl,
    diagnostics: LineDiagnostics,
}

impl SingleUnitMatcher {
    pub fn new(interpreter: Arc<dyn LineInterpreter>, blank_lines: usize) -> Self {
        Self {
            interpreter,
            blank_lines,
            blank_run: 0,
            current: Request::default(),
            control: StopControl::default(),
            diagnostics: LineDiagnostics::default(),
        }
    }

    fn emit(&mut self, sink: &mut dyn RequestSink) {
        if self.current.is_empty() {
            return;
        }
        let request = mem::take(&mut self.current);
        let flow = sink.accept(&request);
        self.control.observe(flow);
    }
}

impl RequestMatcher for SingleUnitMatcher {
    fn process_line(&mut self, line: &str, offset: u64, sink: &mut dyn RequestSink) -> Signal {
        if self.control.is_stopped() {
            return Signal::StopRequested;
        }
        if self.control.is_pending() {
            self.emit(sink);
            self.control.mark_stopped();
            return Signal::StopRequested;
        }

        if is_blank(line) {
            if self.blank_lines > 0 {
                self.blank_run += 1;
                if self.blank_run >= self.blank_lines {
                    self.blank_run = 0;
                    self.emit(sink);
                }
            }
            return Signal::Continue;
        }
        self.blank_run = 0;

        if self.interpreter.is_boundary(line) {
            self.emit(sink);
        }
        absorb_line(
            self.interpreter.as_ref(),
            &mut self.current,
            line,
            offset,
            &mut self.diagnostics,
        );
        Signal::Continue
    }

    fn finish(&mut self, sink: &mut dyn RequestSink) -> Signal {
        if self.control.is_stopped() {
            return Signal::StopRequested;
        }
        self.emit(sink);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::LineIssue;
    use crate::matcher::testing::{feed, Collector};

    struct StartFormat;

    impl LineInterpreter for StartFormat {
        fn is_boundary(&self, line: &str) -> bool {
            line.starts_with("Start")
        }

        fn extract_time(&self, line: &str) -> Result<Option<u64>, LineIssue> {
            match line.strip_prefix("t=") {
                Some(rest) => rest
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| LineIssue::UnparsableTime),
                None => Ok(None),
            }
        }
    }

    fn matcher(blank_lines: usize) -> SingleUnitMatcher {
        SingleUnitMatcher::new(Arc::new(StartFormat), blank_lines)
    }

    #[test]
    fn groups_on_start_lines() {
        let mut matcher = matcher(0);
        let mut sink = Collector::default();

        feed(
            &mut matcher,
            &["Start A\n", "l1\n", "l2\n", "Start B\n", "l3\n"],
            &mut sink,
        );
        assert_eq!(sink.lines(), vec![vec!["Start A\n", "l1\n", "l2\n"]]);

        assert_eq!(matcher.finish(&mut sink), Signal::EofReached);
        assert_eq!(sink.lines()[1], vec!["Start B\n", "l3\n"]);
        assert_eq!(sink.requests[1].offset, 14);
    }

    #[test]
    fn blank_lines_separate_requests_and_are_not_stored() {
        let mut matcher = matcher(2);
        let mut sink = Collector::default();

        feed(
            &mut matcher,
            &["a1\n", "\n", "a2\n", "\n", "\n", "b1\n"],
            &mut sink,
        );
        matcher.finish(&mut sink);

        assert_eq!(sink.lines(), vec![vec!["a1\n", "a2\n"], vec!["b1\n"]]);
    }

    #[test]
    fn first_parsable_time_wins() {
        let mut matcher = matcher(0);
        let mut sink = Collector::default();

        feed(
            &mut matcher,
            &["Start\n", "t=oops\n", "t=100\n", "t=200\n"],
            &mut sink,
        );
        matcher.finish(&mut sink);

        assert_eq!(sink.requests[0].time, 100);
        assert_eq!(matcher.diagnostics().unparsable_time, 1);
    }

    #[test]
    fn stop_flushes_once_on_next_line() {
        let mut matcher = matcher(0);
        let mut sink = Collector::default();

        feed(&mut matcher, &["Start A\n", "l1\n"], &mut sink);
        matcher.stop();

        assert_eq!(
            matcher.process_line("l2\n", 11, &mut sink),
            Signal::StopRequested
        );
        assert_eq!(sink.lines(), vec![vec!["Start A\n", "l1\n"]]);

        assert_eq!(
            matcher.process_line("Start B\n", 14, &mut sink),
            Signal::StopRequested
        );
        assert_eq!(matcher.finish(&mut sink), Signal::StopRequested);
        assert_eq!(sink.requests.len(), 1);
    }

    #[test]
    fn sink_can_request_stop() {
        let mut matcher = matcher(0);
        let mut sink = Collector {
            stop_after: Some(1),
            ..Collector::default()
        };

        let signals = feed(
            &mut matcher,
            &["Start A\n", "Start B\n", "l1\n", "Start C\n"],
            &mut sink,
        );

        assert_eq!(
            signals,
            vec![
                Signal::Continue,
                Signal::Continue,
                Signal::StopRequested,
                Signal::StopRequested
            ]
        );
        assert_eq!(sink.lines(), vec![vec!["Start A\n"], vec!["Start B\n"]]);
    }
}
