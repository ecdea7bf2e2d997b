//! Circular output window shared by the gzip indexer and reader.

use crate::error::{IndexError, Result};
use crate::lines::LineSplitter;
use ultragrep_core::Flow;

/// Deflate history window.
pub const WINDOW_SIZE: usize = 32 * 1024;

/// Default ring capacity: twice the window so a full window survives while
/// the decompressor writes the next chunk.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// A power-of-two sized ring of decompressed bytes.
///
/// `written` counts every byte ever produced; `consumed` counts the bytes
/// handed out. Positions inside the buffer are `counter & mask`.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<u8>,
    mask: usize,
    written: u64,
    consumed: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if !capacity.is_power_of_two() || capacity < WINDOW_SIZE {
            return Err(IndexError::InvalidCapacity(capacity));
        }
        Ok(Self {
            data: vec![0; capacity],
            mask: capacity - 1,
            written: 0,
            consumed: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Total bytes produced so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Bytes produced but not yet handed out.
    pub fn pending(&self) -> u64 {
        self.written - self.consumed
    }

    /// Where the next produced byte lands.
    pub fn write_pos(&self) -> usize {
        (self.written as usize) & self.mask
    }

    /// Whole backing buffer, for decompressors that write in place.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Records `produced` bytes written in place at `write_pos`.
    pub fn commit(&mut self, produced: usize) {
        self.written += produced as u64;
    }

    /// Copies `bytes` in as newly produced output.
    pub fn append(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(self.capacity()) {
            let pos = self.write_pos();
            let first = chunk.len().min(self.capacity() - pos);
            self.data[pos..pos + first].copy_from_slice(&chunk[..first]);
            self.data[..chunk.len() - first].copy_from_slice(&chunk[first..]);
            self.written += chunk.len() as u64;
        }
        if self.pending() > self.capacity() as u64 {
            self.consumed = self.written - self.capacity() as u64;
        }
    }

    /// Restarts the ring at logical position `at` with `window` as history.
    /// Nothing is pending afterwards.
    pub fn seed(&mut self, window: &[u8], at: u64) {
        let window = &window[window.len().saturating_sub(self.capacity())..];
        let start = (at as usize).wrapping_sub(window.len()) & self.mask;
        let first = window.len().min(self.capacity() - start);
        self.data[start..start + first].copy_from_slice(&window[..first]);
        self.data[..window.len() - first].copy_from_slice(&window[first..]);
        self.written = at;
        self.consumed = at;
    }

    /// The last `n` produced bytes in chronological order, left padded with
    /// zeros when fewer have been produced.
    pub fn tail(&self, n: usize) -> Vec<u8> {
        let n = n.min(self.capacity());
        let available = (self.written.min(n as u64)) as usize;
        let mut out = vec![0; n];
        let start = (self.written - available as u64) as usize & self.mask;
        let first = available.min(self.capacity() - start);
        let pad = n - available;
        out[pad..pad + first].copy_from_slice(&self.data[start..start + first]);
        out[pad + first..].copy_from_slice(&self.data[..available - first]);
        out
    }

    /// Pending bytes as at most two contiguous slices, oldest first.
    pub fn pending_slices(&self) -> (&[u8], &[u8]) {
        let pending = self.pending() as usize;
        let start = (self.consumed as usize) & self.mask;
        let first = pending.min(self.capacity() - start);
        (&self.data[start..start + first], &self.data[..pending - first])
    }

    /// Copies pending bytes into `buf`, returning how many were copied.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let (head, tail) = self.pending_slices();
        let from_head = head.len().min(buf.len());
        buf[..from_head].copy_from_slice(&head[..from_head]);
        let from_tail = tail.len().min(buf.len() - from_head);
        buf[from_head..from_head + from_tail].copy_from_slice(&tail[..from_tail]);
        let copied = from_head + from_tail;
        self.consumed += copied as u64;
        copied
    }

    /// Drops up to `n` pending bytes.
    pub fn skip(&mut self, n: u64) -> u64 {
        let skipped = n.min(self.pending());
        self.consumed += skipped;
        skipped
    }

    /// Feeds all pending bytes through `splitter`, consuming them.
    pub fn drain_complete_lines<F>(&mut self, splitter: &mut LineSplitter, emit: &mut F) -> Flow
    where
        F: FnMut(&str, u64) -> Flow,
    {
        let (head, tail) = self.pending_slices();
        let mut flow = splitter.push(head, emit);
        if flow == Flow::Continue {
            flow = splitter.push(tail, emit);
        }
        self.consumed = self.written;
        flow
    }
}
