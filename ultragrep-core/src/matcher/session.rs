use std::collections::HashMap;
use std::sync::Arc;

use crate::diagnostics::LineDiagnostics;
use crate::format::LineInterpreter;
use crate::matcher::{absorb_line, is_blank, RequestMatcher, RequestSink, Signal, StopControl};
use crate::request::Request;

/// Tracks several concurrently open requests keyed by session id.
///
/// Lines without a key go to a single keyless request. A keyed line arriving
/// while the keyless request is the only one open displaces it.
pub struct SessionMatcher {
    interpreter: Arc<dyn LineInterpreter>,
    open: HashMap<String, Request>,
    keyless: Option<Request>,
    control: StopControl,
    diagnostics: LineDiagnostics,
}

impl SessionMatcher {
    pub fn new(interpreter: Arc<dyn LineInterpreter>) -> Self {
        Self {
            interpreter,
            open: HashMap::new(),
            keyless: None,
            control: StopControl::default(),
            diagnostics: LineDiagnostics::default(),
        }
    }

    /// Number of requests currently open, keyless included.
    pub fn open_count(&self) -> usize {
        self.open.len() + usize::from(self.keyless.is_some())
    }

    fn emit(&mut self, request: Request, sink: &mut dyn RequestSink) {
        if request.is_empty() {
            return;
        }
        let flow = sink.accept(&request);
        self.control.observe(flow);
    }

    fn flush_all(&mut self, sink: &mut dyn RequestSink) {
        let mut pending: Vec<Request> = self.open.drain().map(|(_, request)| request).collect();
        pending.extend(self.keyless.take());
        pending.sort_by_key(|request| request.offset);
        for request in pending {
            self.emit(request, sink);
        }
    }
}

impl RequestMatcher for SessionMatcher {
    fn process_line(&mut self, line: &str, offset: u64, sink: &mut dyn RequestSink) -> Signal {
        if self.control.is_stopped() {
            return Signal::StopRequested;
        }
        if self.control.is_pending() {
            self.flush_all(sink);
            self.control.mark_stopped();
            return Signal::StopRequested;
        }
        if is_blank(line) {
            return Signal::Continue;
        }

        let ends = self.interpreter.ends_unit(line);
        match self.interpreter.extract_key(line) {
            Some(key) => {
                if !self.open.contains_key(&key) && self.open.is_empty() {
                    if let Some(displaced) = self.keyless.take() {
                        self.emit(displaced, sink);
                    }
                }
                let request = self
                    .open
                    .entry(key.clone())
                    .or_insert_with(|| Request::with_key(offset, key.clone()));
                absorb_line(
                    self.interpreter.as_ref(),
                    request,
                    line,
                    offset,
                    &mut self.diagnostics,
                );
                if ends {
                    if let Some(finished) = self.open.remove(&key) {
                        self.emit(finished, sink);
                    }
                }
            }
            None => {
                let request = self.keyless.get_or_insert_with(|| Request::new(offset));
                absorb_line(
                    self.interpreter.as_ref(),
                    request,
                    line,
                    offset,
                    &mut self.diagnostics,
                );
                if ends {
                    if let Some(finished) = self.keyless.take() {
                        self.emit(finished, sink);
                    }
                }
            }
        }
        Signal::Continue
    }

    fn finish(&mut self, sink: &mut dyn RequestSink) -> Signal {
        if self.control.is_stopped() {
            return Signal::StopRequested;
        }
        self.flush_all(sink);
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
    use crate::format::WorkFormat;
    use crate::matcher::testing::{feed, Collector};

    fn matcher() -> SessionMatcher {
        SessionMatcher::new(Arc::new(WorkFormat::new().expect("work format")))
    }

    const S1: &str = "aaaaaa:111111";
    const S2: &str = "bbbbbb:222222";

    fn line(session: &str, time: &str, msg: &str) -> String {
        format!("{{\"session\":\"{session}\",\"time\":\"{time}\",\"msg\":\"{msg}\"}}\n")
    }

    #[test]
    fn interleaved_sessions_stay_separate() {
        let lines = [
            line(S1, "2023-11-14 22:13:20", "one"),
            line(S2, "2023-11-14 22:13:21", "two"),
            line(S1, "2023-11-14 22:13:22", "three"),
            line(S1, "2023-11-14 22:13:23", "Finished this session"),
            line(S2, "2023-11-14 22:13:24", "Finished this session"),
        ];
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();

        let mut matcher = matcher();
        let mut sink = Collector::default();
        feed(&mut matcher, &refs, &mut sink);

        assert_eq!(sink.requests.len(), 2);
        assert_eq!(sink.lines()[0], vec![refs[0], refs[2], refs[3]]);
        assert_eq!(sink.lines()[1], vec![refs[1], refs[4]]);
        assert_eq!(sink.requests[0].session_key.as_deref(), Some(S1));
        assert_eq!(sink.requests[0].time, 1_700_000_000);
        assert_eq!(sink.requests[1].time, 1_700_000_001);
        assert_eq!(matcher.open_count(), 0);
        assert_eq!(matcher.finish(&mut sink), Signal::EofReached);
        assert_eq!(sink.requests.len(), 2);
    }

    #[test]
    fn keyed_line_displaces_sole_keyless_request() {
        let keyed = line(S1, "2023-11-14 22:13:20", "start");
        let mut matcher = matcher();
        let mut sink = Collector::default();

        feed(
            &mut matcher,
            &["booting worker\n", "loading config\n", keyed.as_str()],
            &mut sink,
        );

        assert_eq!(sink.lines(), vec![vec!["booting worker\n", "loading config\n"]]);
        assert_eq!(sink.requests[0].session_key, None);
        assert_eq!(matcher.open_count(), 1);
    }

    #[test]
    fn eof_flushes_open_sessions_by_offset() {
        let first = line(S2, "2023-11-14 22:13:20", "first");
        let second = line(S1, "2023-11-14 22:13:21", "second");
        let mut matcher = matcher();
        let mut sink = Collector::default();

        feed(&mut matcher, &[first.as_str(), second.as_str(), "stray\n"], &mut sink);
        assert!(sink.requests.is_empty());

        assert_eq!(matcher.finish(&mut sink), Signal::EofReached);
        let keys: Vec<Option<&str>> = sink
            .requests
            .iter()
            .map(|request| request.session_key.as_deref())
            .collect();
        assert_eq!(keys, vec![Some(S2), Some(S1), None]);
    }

    #[test]
    fn stop_flushes_every_open_session() {
        let a = line(S1, "2023-11-14 22:13:20", "a");
        let b = line(S2, "2023-11-14 22:13:21", "b");
        let mut matcher = matcher();
        let mut sink = Collector::default();

        feed(&mut matcher, &[a.as_str(), b.as_str()], &mut sink);
        matcher.stop();
        assert_eq!(
            matcher.process_line(a.as_str(), 500, &mut sink),
            Signal::StopRequested
        );
        assert_eq!(sink.requests.len(), 2);
        assert_eq!(
            matcher.process_line(b.as_str(), 600, &mut sink),
            Signal::StopRequested
        );
        assert_eq!(sink.requests.len(), 2);
    }
}
