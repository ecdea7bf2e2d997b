use std::io::Read;

use miniz_oxide::inflate::core::{decompress, inflate_flags, BlockBoundaryState, DecompressorOxide};
use miniz_oxide::inflate::TINFLStatus;

use crate::error::{IndexError, Result};
use crate::gzip::AccessPoint;
use crate::ring::{RingBuffer, DEFAULT_CAPACITY};

const INPUT_BUF_SIZE: usize = 32 * 1024;

/// Raw deflate decompression into a [`RingBuffer`], shared by the indexer
/// and the random access reader.
pub(crate) struct Inflater<R> {
    source: R,
    decomp: Box<DecompressorOxide>,
    input: Vec<u8>,
    input_offset: usize,
    input_size: usize,
    /// Absolute file offset of `input[input_offset]`.
    input_pos: u64,
    pub(crate) ring: RingBuffer,
    done: bool,
}

impl<R: Read> Inflater<R> {
    /// Starts at the beginning of a deflate stream located at `input_pos`.
    pub fn new(source: R, input_pos: u64, uncompressed_start: u64) -> Result<Self> {
        let mut ring = RingBuffer::new(DEFAULT_CAPACITY)?;
        ring.seed(&[], uncompressed_start);
        Ok(Self {
            source,
            decomp: Box::new(DecompressorOxide::new()),
            input: vec![0; INPUT_BUF_SIZE],
            input_offset: 0,
            input_size: 0,
            input_pos,
            ring,
            done: false,
        })
    }

    /// Resumes at an access point. `source` must be positioned at
    /// `point.compressed_offset`.
    pub fn resume(mut source: R, point: &AccessPoint) -> Result<Self> {
        let mut input_pos = point.compressed_offset;
        let bit_buf = if point.bits != 0 {
            let mut buf = [0];
            source.read_exact(&mut buf)?;
            input_pos += 1;
            buf[0] >> (8 - point.bits)
        } else {
            0
        };

        let state = BlockBoundaryState {
            num_bits: point.bits,
            bit_buf,
            ..Default::default()
        };

        let mut inflater = Self::new(source, input_pos, point.uncompressed_offset)?;
        *inflater.decomp = DecompressorOxide::from_block_boundary_state(&state);
        inflater.ring.seed(&point.dictionary, point.uncompressed_offset);
        Ok(inflater)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Absolute offset of the next unread input byte.
    pub fn input_pos(&self) -> u64 {
        self.input_pos
    }

    /// Decompresses one step. Pending ring output must have been consumed.
    pub fn make_progress(&mut self, flags: u32) -> Result<TINFLStatus> {
        debug_assert_eq!(self.ring.pending(), 0);

        if self.input_offset >= self.input_size {
            self.input_offset = 0;
            self.input_size = self.source.read(&mut self.input)?;
        }

        let flags = flags
            | if self.input_size > 0 {
                inflate_flags::TINFL_FLAG_HAS_MORE_INPUT
            } else {
                0
            };

        let out_pos = self.ring.write_pos();
        let (status, in_consumed, out_produced) = decompress(
            &mut self.decomp,
            &self.input[self.input_offset..self.input_size],
            self.ring.as_mut_slice(),
            out_pos,
            flags,
        );

        self.input_offset += in_consumed;
        self.input_pos += in_consumed as u64;
        self.ring.commit(out_produced);

        match status {
            TINFLStatus::Done => {
                self.done = true;
                Ok(status)
            }
            TINFLStatus::HasMoreOutput
            | TINFLStatus::NeedsMoreInput
            | TINFLStatus::BlockBoundary => Ok(status),
            TINFLStatus::FailedCannotMakeProgress => Err(IndexError::TruncatedStream {
                offset: self.input_pos,
            }),
            failed => Err(IndexError::Decompression {
                offset: self.input_pos,
                reason: format!("{failed:?}"),
            }),
        }
    }

    /// Byte offset and leftover bits of the block the decompressor is about
    /// to start, if it is stopped at a block boundary.
    pub fn block_position(&self) -> Option<(u64, u8)> {
        let state = self.decomp.block_boundary_state()?;
        let offset = if state.num_bits == 0 {
            self.input_pos
        } else {
            self.input_pos - 1
        };
        Some((offset, state.num_bits))
    }

    /// Reads the 8-byte gzip trailer following the deflate data.
    pub fn read_trailer(&mut self) -> Result<[u8; 8]> {
        let mut trailer = [0u8; 8];
        let buffered = (self.input_size - self.input_offset).min(trailer.len());
        trailer[..buffered]
            .copy_from_slice(&self.input[self.input_offset..self.input_offset + buffered]);
        self.input_offset += buffered;

        let mut filled = buffered;
        while filled < trailer.len() {
            match self.source.read(&mut trailer[filled..])? {
                0 => {
                    return Err(IndexError::TruncatedStream {
                        offset: self.input_pos + filled as u64,
                    })
                }
                n => filled += n,
            }
        }
        self.input_pos += trailer.len() as u64;
        Ok(trailer)
    }
}
