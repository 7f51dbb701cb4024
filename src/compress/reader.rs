use std::io::{self, Read};

use log::trace;

use super::{
    CHECKSUM_SIZE, FRAME_HEADER_SIZE, HEADER_SIZE, MAX_FRAME_SIZE, Method, checksum,
};
use crate::error::{Error, Result};

/// Streams the decompressed payload of consecutive frames read from `R`.
///
/// Any integrity failure is fatal: the position in `R` is no longer
/// trustworthy once a frame fails to verify.
#[derive(Debug)]
pub struct Reader<R> {
    raw: R,
    frame: Vec<u8>,
    data: Vec<u8>,
    pos: usize,
}

impl<R: Read> Reader<R> {
    pub fn new(raw: R) -> Self {
        Self {
            raw,
            frame: Vec::new(),
            data: Vec::new(),
            pos: 0,
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.raw
    }

    /// Discards any buffered payload.
    pub fn reset(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    /// Loads the next frame; `false` means the source ended cleanly at a
    /// frame boundary.
    fn read_frame(&mut self) -> Result<bool> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let n = loop {
            match self.raw.read(&mut header) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Ok(false);
        }
        self.raw.read_exact(&mut header[n..])?;

        let expected = u128::from_le_bytes(
            header[..CHECKSUM_SIZE]
                .try_into()
                .map_err(|_| Error::InvalidData("checksum".into()))?,
        );
        let meta = &header[CHECKSUM_SIZE..];
        let method = Method::try_from(meta[0])?;
        let compressed = u32::from_le_bytes([meta[1], meta[2], meta[3], meta[4]]) as usize;
        let decompressed = u32::from_le_bytes([meta[5], meta[6], meta[7], meta[8]]) as usize;

        if compressed > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge(compressed));
        }
        if decompressed > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge(decompressed));
        }
        if compressed < HEADER_SIZE {
            return Err(Error::InvalidData(format!(
                "compressed size {compressed} smaller than header"
            )));
        }

        self.frame.clear();
        self.frame.extend_from_slice(meta);
        self.frame.resize(compressed, 0);
        self.raw.read_exact(&mut self.frame[HEADER_SIZE..])?;

        let got = checksum(&self.frame);
        if got != expected {
            return Err(Error::ChecksumMismatch { expected, got });
        }

        let payload = &self.frame[HEADER_SIZE..];
        self.data.clear();
        self.data.resize(decompressed, 0);
        self.pos = 0;

        let n = match method {
            Method::None => {
                if payload.len() != decompressed {
                    return Err(Error::SizeMismatch {
                        expected: decompressed,
                        got: payload.len(),
                    });
                }
                self.data.copy_from_slice(payload);
                payload.len()
            }
            Method::Lz4 => lz4_flex::block::decompress_into(payload, &mut self.data)
                .map_err(|e| Error::Decompress(format!("lz4: {e}")))?,
            Method::Zstd => zstd::bulk::decompress_to_buffer(payload, &mut self.data)
                .map_err(|e| Error::Decompress(format!("zstd: {e}")))?,
        };
        if n != decompressed {
            return Err(Error::SizeMismatch {
                expected: decompressed,
                got: n,
            });
        }

        trace!("read {method:?} frame: {compressed} -> {decompressed} bytes");
        Ok(true)
    }
}

impl<R: Read> Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.data.len() {
            match self.read_frame() {
                Ok(true) => {}
                Ok(false) => return Ok(0),
                Err(err) => {
                    self.reset();
                    return Err(err.into());
                }
            }
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{
        compress::Writer,
        proto::testutil::OneByteReader,
    };

    fn frames(method: Method, raw: &[u8]) -> Vec<u8> {
        let mut w = Writer::new(method);
        w.compress(raw).unwrap();
        w.data
    }

    #[test]
    fn reads_across_frames() {
        let mut raw = frames(Method::Lz4, b"hello ");
        raw.extend(frames(Method::Zstd, b"world"));

        let mut r = Reader::new(Cursor::new(raw));
        let mut out = String::new();
        r.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn no_short_read_from_fragmented_source() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let raw = frames(Method::Lz4, &payload);

        let mut r = Reader::new(OneByteReader::new(raw));
        let mut out = vec![0u8; payload.len()];
        r.read_exact(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn truncated_frame_is_unexpected_eof() {
        let raw = frames(Method::None, &[1u8; 100]);
        let mut r = Reader::new(Cursor::new(raw[..raw.len() - 1].to_vec()));

        let mut out = vec![0u8; 100];
        let err: Error = r.read_exact(&mut out).unwrap_err().into();
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn decompressed_size_mismatch() {
        let mut raw = frames(Method::None, &[1u8; 8]);
        // Declare one more decompressed byte than the payload holds.
        raw[21..25].copy_from_slice(&9u32.to_le_bytes());
        let sum = checksum(&raw[CHECKSUM_SIZE..]);
        raw[..CHECKSUM_SIZE].copy_from_slice(&sum.to_le_bytes());

        let mut r = Reader::new(Cursor::new(raw));
        let err: Error = r.read(&mut [0u8; 8]).unwrap_err().into();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 9,
                got: 8
            }
        ));
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut raw = frames(Method::None, &[1u8; 8]);
        raw[17..21].copy_from_slice(&(MAX_FRAME_SIZE as u32 + 1).to_le_bytes());

        let mut r = Reader::new(Cursor::new(raw));
        let err: Error = r.read(&mut [0u8; 8]).unwrap_err().into();
        assert!(matches!(err, Error::FrameTooLarge(_)));
    }
}
