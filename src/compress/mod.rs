//! Compression framing.
//!
//! A serialized block travels as one or more self-checksummed frames:
//!
//! ```text
//! [checksum: 16][method: 1][compressed size: u32][decompressed size: u32][payload]
//! ```
//!
//! The checksum is CityHash128 (v1.0.2) over everything after it, the
//! compressed size counts the 9 header bytes plus the payload, and all
//! integers are little-endian.
mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

use crate::error::{Error, Result};

pub(crate) const CHECKSUM_SIZE: usize = 16;
/// Method tag plus both size fields.
pub(crate) const HEADER_SIZE: usize = 1 + 4 + 4;
pub(crate) const FRAME_HEADER_SIZE: usize = CHECKSUM_SIZE + HEADER_SIZE;

/// Upper bound on either size field of a single frame.
pub const MAX_FRAME_SIZE: usize = 1 << 30;
/// Payloads larger than this are split across frames.
pub const MAX_BLOCK_SIZE: usize = 1 << 20;

/// Compression method selector stored in every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    #[default]
    None = 0x02,
    /// Fast.
    Lz4 = 0x82,
    /// High ratio.
    Zstd = 0x90,
}

impl TryFrom<u8> for Method {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x02 => Ok(Method::None),
            0x82 => Ok(Method::Lz4),
            0x90 => Ok(Method::Zstd),
            v => Err(Error::UnknownMethod(v)),
        }
    }
}

impl From<Method> for u8 {
    fn from(value: Method) -> Self {
        value as u8
    }
}

/// Frame checksum over `[method][sizes][payload]`.
pub(crate) fn checksum(data: &[u8]) -> u128 {
    cityhash_rs::cityhash_102_128(data).rotate_right(64)
}
