//! Time-ordered merge of several query outputs.
//!
//! Each output is cut into chunks: a printed request up to its separator, or
//! whatever text sits between two markers. A chunk inherits the time of the
//! last `@@` marker before it. Markers only move forward within one output,
//! so always taking the source whose next chunk has the lowest time yields
//! a stream ordered by time.

use std::io::{self, BufRead, Write};

use crate::printer::{is_separator, parse_marker};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Chunk {
    time: u64,
    text: String,
}

/// One query output feeding the merge.
pub struct MergeSource<R> {
    label: String,
    reader: R,
    time: u64,
    next: Option<Chunk>,
}

impl<R: BufRead> MergeSource<R> {
    pub fn new(label: impl Into<String>, reader: R) -> Self {
        Self {
            label: label.into(),
            reader,
            time: 0,
            next: None,
        }
    }

    fn advance(&mut self) -> io::Result<()> {
        self.next = self.read_chunk()?;
        Ok(())
    }

    fn read_chunk(&mut self) -> io::Result<Option<Chunk>> {
        let mut text = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(self.chunk(text));
            }
            if let Some(time) = parse_marker(&line) {
                let pending = self.chunk(std::mem::take(&mut text));
                self.time = self.time.max(time);
                if pending.is_some() {
                    return Ok(pending);
                }
                continue;
            }
            text.push_str(&line);
            if is_separator(&line) {
                return Ok(self.chunk(text));
            }
        }
    }

    fn chunk(&self, text: String) -> Option<Chunk> {
        if text.trim().is_empty() {
            return None;
        }
        Some(Chunk {
            time: self.time,
            text,
        })
    }
}

/// Merges `sources` into `out` by time. With `headers`, every chunk is
/// preceded by a `# <label>` line naming its source. Returns the number of
/// chunks written.
pub fn merge_outputs<R, W>(mut sources: Vec<MergeSource<R>>, out: &mut W, headers: bool) -> io::Result<u64>
where
    R: BufRead,
    W: Write + ?Sized,
{
    for source in &mut sources {
        source.advance()?;
    }

    let mut written = 0;
    loop {
        let next = sources
            .iter()
            .enumerate()
            .filter_map(|(index, source)| source.next.as_ref().map(|chunk| (chunk.time, index)))
            .min();
        let Some((_, index)) = next else {
            break;
        };

        let source = &mut sources[index];
        if let Some(chunk) = source.next.take() {
            if headers {
                write!(out, "\n# {}", source.label)?;
            }
            out.write_all(chunk.text.as_bytes())?;
            written += 1;
        }
        source.advance()?;
    }
    out.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(label: &str, text: &'static str) -> MergeSource<Cursor<&'static [u8]>> {
        MergeSource::new(label, Cursor::new(text.as_bytes()))
    }

    #[test]
    fn interleaves_by_marker_time() {
        let a = source("a.log", "@@100\n\nreq a1\n------\n@@300\n\nreq a2\n------\n");
        let b = source("b.log", "@@200\n\nreq b1\n------\n@@400\n\nreq b2\n------\n");

        let mut out = Vec::new();
        let written = merge_outputs(vec![a, b], &mut out, false).expect("merge");
        assert_eq!(written, 4);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "\nreq a1\n------\n\nreq b1\n------\n\nreq a2\n------\n\nreq b2\n------\n"
        );
    }

    #[test]
    fn headers_name_the_source() {
        let a = source("web1/app.log", "@@100\n\nreq\n---\n");
        let mut out = Vec::new();
        merge_outputs(vec![a], &mut out, true).expect("merge");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "\n# web1/app.log\nreq\n---\n"
        );
    }

    #[test]
    fn untimed_requests_sort_with_the_previous_marker() {
        let a = source("a", "\nno time\n-------\n@@500\n\nlate\n----\n");
        let b = source("b", "@@200\n\nmiddle\n------\n");

        let mut out = Vec::new();
        merge_outputs(vec![a, b], &mut out, false).expect("merge");
        let text = String::from_utf8(out).expect("utf8");
        let order: Vec<&str> = text
            .lines()
            .filter(|line| !line.is_empty() && !is_separator(line))
            .collect();
        assert_eq!(order, vec!["no time", "middle", "late"]);
    }

    #[test]
    fn perf_lines_between_markers_stay_together() {
        let a = source("a", "@@100\n100\tA#x\t5\n@@300\n300\tA#y\t7\n");
        let b = source("b", "@@200\n200\tB#x\t9\n");

        let mut out = Vec::new();
        merge_outputs(vec![a, b], &mut out, false).expect("merge");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "100\tA#x\t5\n200\tB#x\t9\n300\tA#y\t7\n"
        );
    }
}
