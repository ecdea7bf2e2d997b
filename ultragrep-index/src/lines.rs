//! Line extraction with uncompressed byte offsets.

use std::borrow::Cow;
use std::io::{self, BufRead};

use memchr::memchr_iter;
use ultragrep_core::{Flow, LineDiagnostics};

fn decode<'a>(bytes: &'a [u8], diagnostics: &mut LineDiagnostics) -> Cow<'a, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            diagnostics.record_invalid_utf8();
            String::from_utf8_lossy(bytes)
        }
    }
}

/// Pulls `(line, offset)` pairs from a buffered reader. Lines keep their
/// terminator; the last line of the input may lack one.
pub struct LineReader<R> {
    reader: R,
    offset: u64,
    raw: Vec<u8>,
    text: String,
    diagnostics: LineDiagnostics,
}

impl<R: BufRead> LineReader<R> {
    /// `offset` is the logical position of the reader's first byte.
    pub fn new(reader: R, offset: u64) -> Self {
        Self {
            reader,
            offset,
            raw: Vec::with_capacity(4096),
            text: String::new(),
            diagnostics: LineDiagnostics::default(),
        }
    }

    /// Offset of the next line to be returned.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn diagnostics(&self) -> &LineDiagnostics {
        &self.diagnostics
    }

    pub fn next_line(&mut self) -> io::Result<Option<(&str, u64)>> {
        self.raw.clear();
        let read = self.reader.read_until(b'\n', &mut self.raw)?;
        if read == 0 {
            return Ok(None);
        }

        let offset = self.offset;
        self.offset += read as u64;
        self.text.clear();
        self.text.push_str(&decode(&self.raw, &mut self.diagnostics));
        Ok(Some((&self.text, offset)))
    }

    /// Discards bytes up to and including the next newline.
    pub fn skip_partial_line(&mut self) -> io::Result<u64> {
        self.raw.clear();
        let read = self.reader.read_until(b'\n', &mut self.raw)?;
        self.offset += read as u64;
        Ok(read as u64)
    }
}

/// Splits a stream of arbitrary chunks into lines, carrying partial lines
/// across chunk boundaries.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
    /// Offset of the next line to hand out, i.e. of the first buffered byte.
    offset: u64,
    diagnostics: LineDiagnostics,
}

impl LineSplitter {
    pub fn new(offset: u64) -> Self {
        Self {
            partial: Vec::new(),
            offset,
            diagnostics: LineDiagnostics::default(),
        }
    }

    pub fn diagnostics(&self) -> &LineDiagnostics {
        &self.diagnostics
    }

    /// Bytes buffered while waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Hands every complete line in `chunk` to `emit`. Stops early, dropping
    /// the rest of the chunk, when `emit` returns [`Flow::Stop`].
    pub fn push<F>(&mut self, chunk: &[u8], emit: &mut F) -> Flow
    where
        F: FnMut(&str, u64) -> Flow,
    {
        let mut start = 0;
        for end in memchr_iter(b'\n', chunk) {
            let piece = &chunk[start..=end];
            start = end + 1;

            let line_start = self.offset;
            let flow = if self.partial.is_empty() {
                self.offset += piece.len() as u64;
                emit(&decode(piece, &mut self.diagnostics), line_start)
            } else {
                self.partial.extend_from_slice(piece);
                self.offset += self.partial.len() as u64;
                let flow = emit(&decode(&self.partial, &mut self.diagnostics), line_start);
                self.partial.clear();
                flow
            };
            if flow == Flow::Stop {
                return Flow::Stop;
            }
        }

        self.partial.extend_from_slice(&chunk[start..]);
        Flow::Continue
    }

    /// Emits a trailing line that never saw its terminator.
    pub fn finish<F>(&mut self, emit: &mut F) -> Flow
    where
        F: FnMut(&str, u64) -> Flow,
    {
        if self.partial.is_empty() {
            return Flow::Continue;
        }
        let line_start = self.offset;
        self.offset += self.partial.len() as u64;
        let flow = emit(&decode(&self.partial, &mut self.diagnostics), line_start);
        self.partial.clear();
        flow
    }
}
