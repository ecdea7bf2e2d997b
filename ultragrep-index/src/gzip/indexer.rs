use std::io::{Read, Seek};

use miniz_oxide::inflate::core::inflate_flags;
use miniz_oxide::inflate::TINFLStatus;
use serde::Serialize;
use tracing::debug;
use ultragrep_core::{Flow, LineDiagnostics};

use crate::error::{IndexError, Result};
use crate::gzip::inflate::Inflater;
use crate::gzip::AccessPoint;
use crate::lines::LineSplitter;
use crate::ring::WINDOW_SIZE;
use crate::store::AccessPointSink;

/// Outcome of a full pass over a gzip file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GzipSummary {
    pub uncompressed_bytes: u64,
    pub access_points: u64,
    /// `false` when the line consumer stopped the pass early.
    pub complete: bool,
    pub diagnostics: LineDiagnostics,
}

/// Decompresses a gzip file block by block, handing out lines and recording
/// access points every `span` uncompressed bytes.
pub struct GzipBlockIndexer<R> {
    inflater: Inflater<R>,
    splitter: LineSplitter,
    span: u64,
    last_point: Option<u64>,
    points: u64,
}

impl<R: Read + Seek> GzipBlockIndexer<R> {
    /// Parses the gzip member header; `source` must be at the file start.
    pub fn new(mut source: R, span: u64) -> Result<Self> {
        gzip_header::read_gz_header(&mut source)?;
        let deflate_start = source.stream_position()?;
        Ok(Self {
            inflater: Inflater::new(source, deflate_start, 0)?,
            splitter: LineSplitter::new(0),
            span: span.max(1),
            last_point: None,
            points: 0,
        })
    }
}

impl<R: Read> GzipBlockIndexer<R> {
    /// Runs to the end of the first gzip member and checks its size trailer.
    pub fn run<S, F>(mut self, sink: &mut S, mut on_line: F) -> Result<GzipSummary>
    where
        S: AccessPointSink + ?Sized,
        F: FnMut(&str, u64) -> Flow,
    {
        loop {
            if self.inflater.ring.pending() > 0 {
                let flow = self
                    .inflater
                    .ring
                    .drain_complete_lines(&mut self.splitter, &mut on_line);
                if flow == Flow::Stop {
                    return Ok(self.summary(false));
                }
            }
            if self.inflater.is_done() {
                break;
            }

            let status = self
                .inflater
                .make_progress(inflate_flags::TINFL_FLAG_STOP_ON_BLOCK_BOUNDARY)?;
            if status == TINFLStatus::BlockBoundary {
                self.maybe_record(sink)?;
            }
        }

        if self.splitter.finish(&mut on_line) == Flow::Stop {
            return Ok(self.summary(false));
        }

        let trailer = self.inflater.read_trailer()?;
        let expected = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
        let actual = self.inflater.ring.written() as u32;
        if expected != actual {
            return Err(IndexError::SizeMismatch { expected, actual });
        }

        Ok(self.summary(true))
    }

    fn maybe_record<S: AccessPointSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        let produced = self.inflater.ring.written();
        let due = match self.last_point {
            None => true,
            Some(last) => produced - last >= self.span,
        };
        if !due {
            return Ok(());
        }
        let Some((compressed_offset, bits)) = self.inflater.block_position() else {
            return Ok(());
        };

        let point = AccessPoint {
            uncompressed_offset: produced,
            compressed_offset,
            bits,
            dictionary: self.inflater.ring.tail(WINDOW_SIZE),
        };
        debug!(
            uncompressed_offset = produced,
            compressed_offset, bits, "recording gzip access point"
        );
        sink.append_access_point(&point)?;
        self.last_point = Some(produced);
        self.points += 1;
        Ok(())
    }

    fn summary(&self, complete: bool) -> GzipSummary {
        GzipSummary {
            uncompressed_bytes: self.inflater.ring.written(),
            access_points: self.points,
            complete,
            diagnostics: *self.splitter.diagnostics(),
        }
    }
}
