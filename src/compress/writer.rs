use log::trace;

use super::{CHECKSUM_SIZE, FRAME_HEADER_SIZE, HEADER_SIZE, MAX_BLOCK_SIZE, Method, checksum};
use crate::error::{Error, Result};

/// Wraps payloads into compression frames.
///
/// [`Writer::data`] holds the frames produced by the last
/// [`Writer::compress`] call and is reused between calls.
#[derive(Debug)]
pub struct Writer {
    pub data: Vec<u8>,
    method: Method,
}

impl Writer {
    pub fn new(method: Method) -> Self {
        Self {
            data: Vec::new(),
            method,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Replaces [`Writer::data`] with the frames for `raw`.
    pub fn compress(&mut self, raw: &[u8]) -> Result<()> {
        self.data.clear();
        for chunk in raw.chunks(MAX_BLOCK_SIZE) {
            self.frame(chunk)?;
        }
        Ok(())
    }

    fn frame(&mut self, chunk: &[u8]) -> Result<()> {
        let start = self.data.len();
        self.data.resize(start + FRAME_HEADER_SIZE, 0);

        match self.method {
            Method::None => self.data.extend_from_slice(chunk),
            Method::Lz4 => self
                .data
                .extend_from_slice(&lz4_flex::block::compress(chunk)),
            Method::Zstd => {
                let compressed = zstd::bulk::compress(chunk, zstd::DEFAULT_COMPRESSION_LEVEL)
                    .map_err(|e| Error::Compress(format!("zstd: {e}")))?;
                self.data.extend_from_slice(&compressed);
            }
        }

        let payload = self.data.len() - start - FRAME_HEADER_SIZE;
        let compressed_size = (HEADER_SIZE + payload) as u32;
        let header = &mut self.data[start + CHECKSUM_SIZE..start + FRAME_HEADER_SIZE];
        header[0] = self.method.into();
        header[1..5].copy_from_slice(&compressed_size.to_le_bytes());
        header[5..9].copy_from_slice(&(chunk.len() as u32).to_le_bytes());

        let sum = checksum(&self.data[start + CHECKSUM_SIZE..]);
        self.data[start..start + CHECKSUM_SIZE].copy_from_slice(&sum.to_le_bytes());

        trace!(
            "framed {} bytes into {} with {:?}",
            chunk.len(),
            payload,
            self.method
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_frame_layout() {
        let mut w = Writer::new(Method::None);
        w.compress(b"abc").unwrap();

        assert_eq!(w.data.len(), FRAME_HEADER_SIZE + 3);
        assert_eq!(w.data[16], 0x02);
        assert_eq!(&w.data[17..21], &12u32.to_le_bytes());
        assert_eq!(&w.data[21..25], &3u32.to_le_bytes());
        assert_eq!(&w.data[25..], b"abc");
        assert_eq!(
            u128::from_le_bytes(w.data[..16].try_into().unwrap()),
            checksum(&w.data[16..])
        );
    }

    #[test]
    fn large_payload_splits_frames() {
        let raw = vec![7u8; MAX_BLOCK_SIZE + 10];
        let mut w = Writer::new(Method::None);
        w.compress(&raw).unwrap();

        assert_eq!(w.data.len(), raw.len() + 2 * FRAME_HEADER_SIZE);
    }

    #[test]
    fn compress_reuses_output() {
        let mut w = Writer::new(Method::Lz4);
        w.compress(&[1u8; 4096]).unwrap();
        let first = w.data.clone();

        w.compress(&[1u8; 4096]).unwrap();
        assert_eq!(w.data, first);
        assert!(w.data.len() < 4096);
    }
}
