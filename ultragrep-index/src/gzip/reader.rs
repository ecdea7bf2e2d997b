use std::io::{self, ErrorKind, Read, Seek, SeekFrom};

use tracing::debug;

use crate::error::{IndexError, Result};
use crate::gzip::inflate::Inflater;
use crate::gzip::AccessPoint;

/// Streams decompressed bytes of a gzip file starting near an arbitrary
/// uncompressed offset.
pub struct GzipRandomAccessReader<R> {
    inflater: Inflater<R>,
}

impl<R: Read + Seek> GzipRandomAccessReader<R> {
    /// Reads from the start of the first member.
    pub fn from_start(mut source: R) -> Result<Self> {
        source.seek(SeekFrom::Start(0))?;
        gzip_header::read_gz_header(&mut source)?;
        let deflate_start = source.stream_position()?;
        Ok(Self {
            inflater: Inflater::new(source, deflate_start, 0)?,
        })
    }

    /// Restarts decompression at `point`, priming the boundary bits and the
    /// history window.
    pub fn from_access_point(mut source: R, point: &AccessPoint) -> Result<Self> {
        source.seek(SeekFrom::Start(point.compressed_offset))?;
        Ok(Self {
            inflater: Inflater::resume(source, point)?,
        })
    }

    /// Opens at `point` (or the start) and discards output up to `target`.
    pub fn open_at(source: R, point: Option<&AccessPoint>, target: u64) -> Result<Self> {
        let mut reader = match point {
            Some(point) if point.uncompressed_offset <= target => {
                debug!(
                    target,
                    uncompressed_offset = point.uncompressed_offset,
                    compressed_offset = point.compressed_offset,
                    "resuming gzip stream at access point"
                );
                Self::from_access_point(source, point)?
            }
            _ => Self::from_start(source)?,
        };
        reader.skip_to(target)?;
        Ok(reader)
    }
}

impl<R: Read> GzipRandomAccessReader<R> {
    /// Uncompressed offset of the next byte `read` returns.
    pub fn position(&self) -> u64 {
        self.inflater.ring.written() - self.inflater.ring.pending()
    }

    fn fill(&mut self) -> Result<()> {
        while self.inflater.ring.pending() == 0 && !self.inflater.is_done() {
            self.inflater.make_progress(0)?;
        }
        Ok(())
    }

    /// Discards output until `target`. Fails if the stream ends first.
    pub fn skip_to(&mut self, target: u64) -> Result<()> {
        while self.position() < target {
            self.fill()?;
            let skipped = self.inflater.ring.skip(target - self.position());
            if skipped == 0 {
                return Err(IndexError::TruncatedStream {
                    offset: self.inflater.input_pos(),
                });
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for GzipRandomAccessReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill().map_err(into_io)?;
        Ok(self.inflater.ring.read_into(buf))
    }
}

fn into_io(err: IndexError) -> io::Error {
    match err {
        IndexError::Io(err) => err,
        err @ IndexError::TruncatedStream { .. } => {
            io::Error::new(ErrorKind::UnexpectedEof, err.to_string())
        }
        err => io::Error::new(ErrorKind::InvalidData, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gzip::GzipBlockIndexer;
    use crate::test_support::{gzip, sample_log};
    use std::io::Cursor;
    use ultragrep_core::Flow;

    fn index(compressed: &[u8], span: u64) -> (Vec<AccessPoint>, Vec<(String, u64)>) {
        let mut points = Vec::new();
        let mut lines = Vec::new();
        let indexer = GzipBlockIndexer::new(Cursor::new(compressed), span).expect("indexer");
        let summary = indexer
            .run(&mut points, |line: &str, offset: u64| {
                lines.push((line.to_string(), offset));
                Flow::Continue
            })
            .expect("index");
        assert!(summary.complete);
        assert_eq!(summary.access_points, points.len() as u64);
        (points, lines)
    }

    #[test]
    fn indexer_yields_every_line_with_offsets() {
        let data = sample_log(5_000);
        let compressed = gzip(&data);
        let (_, lines) = index(&compressed, 64 * 1024);

        let rebuilt: String = lines.iter().map(|(line, _)| line.as_str()).collect();
        assert_eq!(rebuilt.as_bytes(), &data[..]);
        for (line, offset) in &lines {
            let start = *offset as usize;
            assert_eq!(&data[start..start + line.len()], line.as_bytes());
        }
    }

    #[test]
    fn every_access_point_reproduces_the_tail() {
        let data = sample_log(20_000);
        let compressed = gzip(&data);
        let (points, _) = index(&compressed, 64 * 1024);
        assert!(points.len() > 2, "expected several access points, got {}", points.len());

        for point in &points {
            let mut reader =
                GzipRandomAccessReader::from_access_point(Cursor::new(&compressed[..]), point)
                    .expect("resume");
            let mut out = Vec::new();
            reader.read_to_end(&mut out).expect("read");
            assert_eq!(out, &data[point.uncompressed_offset as usize..]);
        }
    }

    #[test]
    fn open_at_skips_to_target() {
        let data = sample_log(20_000);
        let compressed = gzip(&data);
        let (points, _) = index(&compressed, 64 * 1024);

        let target = data.len() as u64 * 3 / 4;
        let point = points
            .iter()
            .filter(|point| point.uncompressed_offset <= target)
            .last();
        let mut reader =
            GzipRandomAccessReader::open_at(Cursor::new(&compressed[..]), point, target)
                .expect("open");
        assert_eq!(reader.position(), target);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(out, &data[target as usize..]);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let data = sample_log(5_000);
        let compressed = gzip(&data);
        let truncated = &compressed[..compressed.len() / 2];

        let mut reader =
            GzipRandomAccessReader::from_start(Cursor::new(truncated)).expect("open");
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        assert!(out.len() < data.len());
    }

    /// Sets both block type bits of the block starting at `point`, making it
    /// the reserved type 3.
    fn poison_block_type(compressed: &mut [u8], point: &AccessPoint) {
        let first_bit = if point.bits == 0 { 0 } else { 8 - u64::from(point.bits) };
        let start = point.compressed_offset * 8 + first_bit;
        for bit in [start + 1, start + 2] {
            compressed[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    #[test]
    fn corrupt_block_is_a_decompression_error() {
        let data = sample_log(20_000);
        let mut compressed = gzip(&data);
        let (points, _) = index(&compressed, 64 * 1024);
        let point = points[points.len() / 2].clone();
        poison_block_type(&mut compressed, &point);

        let indexer =
            GzipBlockIndexer::new(Cursor::new(&compressed[..]), 64 * 1024).expect("indexer");
        let mut sink: Vec<AccessPoint> = Vec::new();
        let mut seen = 0u64;
        let result = indexer.run(&mut sink, |line: &str, _offset: u64| {
            seen += line.len() as u64;
            Flow::Continue
        });
        assert!(
            matches!(result, Err(IndexError::Decompression { .. })),
            "unexpected result {result:?}"
        );
        assert!(seen <= point.uncompressed_offset);

        let mut reader =
            GzipRandomAccessReader::from_start(Cursor::new(&compressed[..])).expect("open");
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(out.len() as u64 <= point.uncompressed_offset);
        assert!(data.starts_with(&out));

        let mut reader =
            GzipRandomAccessReader::from_access_point(Cursor::new(&compressed[..]), &point)
                .expect("resume");
        let err = reader.read_to_end(&mut Vec::new()).expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn resumes_from_a_point_inside_a_byte() {
        let data = sample_log(20_000);
        let compressed = gzip(&data);
        let (points, _) = index(&compressed, 16 * 1024);
        let split: Vec<&AccessPoint> = points
            .iter()
            .filter(|point| point.bits != 0 && point.uncompressed_offset + 1_000 < data.len() as u64)
            .collect();
        assert!(
            split.len() > 1,
            "expected block boundaries inside a byte among {} points",
            points.len()
        );

        for point in split {
            let start = point.uncompressed_offset;
            let target = start + 1_000;
            let mut reader =
                GzipRandomAccessReader::open_at(Cursor::new(&compressed[..]), Some(point), target)
                    .expect("open");
            assert_eq!(reader.position(), target);
            let mut out = Vec::new();
            reader.read_to_end(&mut out).expect("read");
            assert_eq!(out, &data[target as usize..]);

            let mut reader =
                GzipRandomAccessReader::from_access_point(Cursor::new(&compressed[..]), point)
                    .expect("resume");
            let mut first = [0u8; 1];
            reader.read_exact(&mut first).expect("first byte");
            assert_eq!(first[0], data[start as usize]);
        }
    }

    #[test]
    fn size_mismatch_fails_the_build() {
        let data = sample_log(500);
        let mut compressed = gzip(&data);
        let len = compressed.len();
        compressed[len - 1] ^= 0xff;

        let indexer =
            GzipBlockIndexer::new(Cursor::new(&compressed[..]), 1 << 20).expect("indexer");
        let mut points: Vec<AccessPoint> = Vec::new();
        let result = indexer.run(&mut points, |_line: &str, _offset: u64| Flow::Continue);
        assert!(matches!(result, Err(IndexError::SizeMismatch { .. })));
    }
}
