//! In-process byte pipe between a query worker and the merger.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};

/// Chunks buffered before the writer blocks.
pub const DEFAULT_DEPTH: usize = 64;

pub fn pipe(depth: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::sync_channel(depth.max(1));
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
        },
    )
}

pub struct PipeWriter {
    tx: SyncSender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "merge side hung up"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads what the writer sent; end of input once the writer is dropped.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.current.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn carries_bytes_across_threads_until_writer_drops() {
        let (mut writer, mut reader) = pipe(2);
        let producer = thread::spawn(move || {
            for i in 0..100 {
                writeln!(writer, "line {i}").expect("write");
            }
        });

        let mut text = String::new();
        reader.read_to_string(&mut text).expect("read");
        producer.join().expect("join");
        assert_eq!(text.lines().count(), 100);
        assert!(text.ends_with("line 99\n"));
    }

    #[test]
    fn writer_fails_once_reader_is_gone() {
        let (mut writer, reader) = pipe(1);
        drop(reader);
        let err = writer.write_all(b"x").expect_err("broken pipe");
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }
}
