//! Streaming DEFLATE codecs for MODE Z transfers.
//!
//! Thin wrappers over `flate2`'s stateful `Compress`/`Decompress` exposing a
//! slice-in/slice-out step: each call consumes some input, produces some
//! output, and reports whether the underlying zlib stream has ended. A fresh
//! codec is constructed for every transfer.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use thiserror::Error;

/// zlib error surfaced to the client as a `501` reply.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CodecError(String);

/// Outcome of one codec step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecStatus {
    Ok,
    StreamEnd,
}

/// Result of one step: bytes consumed, bytes produced, stream status.
pub type CodecStep = (usize, usize, CodecStatus);

/// Streaming compressor (RETR and listings under MODE Z).
#[derive(Debug)]
pub struct Deflater {
    z: Compress,
}

impl Deflater {
    pub fn new(level: u32) -> Self {
        Self {
            z: Compress::new(Compression::new(level), true),
        }
    }

    /// Compress as much of `input` into `output` as fits. With `finish` the
    /// stream is flushed; the final call reports `StreamEnd`.
    pub fn run(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> Result<CodecStep, CodecError> {
        let before_in = self.z.total_in();
        let before_out = self.z.total_out();

        let flush = if finish {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };

        let status = self
            .z
            .compress(input, output, flush)
            .map_err(|e| CodecError(e.to_string()))?;

        let consumed = (self.z.total_in() - before_in) as usize;
        let produced = (self.z.total_out() - before_out) as usize;

        let status = match status {
            Status::StreamEnd => CodecStatus::StreamEnd,
            Status::Ok => CodecStatus::Ok,
            // A stalled flush just means the output window is full; a stalled
            // compress step is a broken stream.
            Status::BufError if finish => CodecStatus::Ok,
            Status::BufError => return Err(CodecError("zlib error".into())),
        };

        Ok((consumed, produced, status))
    }
}

/// Streaming decompressor (STOR/APPE under MODE Z).
#[derive(Debug)]
pub struct Inflater {
    z: Decompress,
}

impl Inflater {
    pub fn new() -> Self {
        Self {
            z: Decompress::new(true),
        }
    }

    /// Decompress as much of `input` into `output` as fits. `StreamEnd` is
    /// reported once the peer's final flush has been consumed.
    pub fn run(&mut self, input: &[u8], output: &mut [u8]) -> Result<CodecStep, CodecError> {
        let before_in = self.z.total_in();
        let before_out = self.z.total_out();

        let status = self
            .z
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| CodecError(e.to_string()))?;

        let consumed = (self.z.total_in() - before_in) as usize;
        let produced = (self.z.total_out() - before_out) as usize;

        let status = match status {
            Status::StreamEnd => CodecStatus::StreamEnd,
            Status::Ok => CodecStatus::Ok,
            // No forward progress possible: the stream was truncated.
            Status::BufError => return Err(CodecError("zlib error".into())),
        };

        Ok((consumed, produced, status))
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-transfer codec instance: deflate for sends, inflate for receives.
#[derive(Debug)]
pub enum Codec {
    Deflate(Deflater),
    Inflate(Inflater),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deflate_all(deflater: &mut Deflater, input: &[u8]) -> Vec<u8> {
        let mut compressed = Vec::new();
        let mut chunk = [0u8; 256];
        let mut remaining = input;

        loop {
            let finish = remaining.is_empty();
            let (consumed, produced, status) =
                deflater.run(remaining, &mut chunk, finish).unwrap();
            compressed.extend_from_slice(&chunk[..produced]);
            remaining = &remaining[consumed..];

            if status == CodecStatus::StreamEnd {
                return compressed;
            }
        }
    }

    #[test]
    fn deflate_inflate_roundtrip() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();

        let mut deflater = Deflater::new(6);
        let compressed = deflate_all(&mut deflater, &payload);
        assert!(!compressed.is_empty());

        let mut inflater = Inflater::new();
        let mut decompressed = Vec::new();
        let mut chunk = [0u8; 256];
        let mut remaining = &compressed[..];

        loop {
            let (consumed, produced, status) = inflater.run(remaining, &mut chunk).unwrap();
            decompressed.extend_from_slice(&chunk[..produced]);
            remaining = &remaining[consumed..];

            if status == CodecStatus::StreamEnd {
                break;
            }
        }

        assert_eq!(decompressed, payload);
    }

    #[test]
    fn zeroes_compress_well() {
        let payload = vec![0u8; 1024 * 1024];
        let mut deflater = Deflater::new(6);
        let compressed = deflate_all(&mut deflater, &payload);
        assert!(compressed.len() < 10 * 1024);
    }

    #[test]
    fn finish_with_tiny_output_window_eventually_ends() {
        let payload = vec![0x55u8; 8192];
        let mut deflater = Deflater::new(9);

        let mut compressed = Vec::new();
        let mut chunk = [0u8; 16];
        let mut remaining = &payload[..];
        let mut steps = 0;

        loop {
            steps += 1;
            assert!(steps < 100_000, "deflate made no progress");

            let finish = remaining.is_empty();
            let (consumed, produced, status) =
                deflater.run(remaining, &mut chunk, finish).unwrap();
            compressed.extend_from_slice(&chunk[..produced]);
            remaining = &remaining[consumed..];

            if status == CodecStatus::StreamEnd {
                break;
            }
        }

        let mut inflater = Inflater::new();
        let mut out = vec![0u8; payload.len() + 16];
        let (_, produced, status) = inflater.run(&compressed, &mut out).unwrap();
        assert_eq!(status, CodecStatus::StreamEnd);
        assert_eq!(&out[..produced], &payload[..]);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let payload = b"some payload worth compressing, repeated a few times over";
        let mut deflater = Deflater::new(6);
        let compressed = deflate_all(&mut deflater, payload);

        let truncated = &compressed[..compressed.len() / 2];
        let mut inflater = Inflater::new();
        let mut out = vec![0u8; 1024];

        // Feed the truncated stream, then demonstrate no progress is possible.
        let (consumed, _, status) = inflater.run(truncated, &mut out).unwrap();
        assert_eq!(consumed, truncated.len());
        assert_eq!(status, CodecStatus::Ok);
        assert!(inflater.run(&[], &mut out).is_err());
    }
}
