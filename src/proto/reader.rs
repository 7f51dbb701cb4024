//! Pull-based decoder mirroring [`Buffer`](super::Buffer).
//!
//! Every read either returns exactly the requested number of bytes or fails
//! with [`Error::UnexpectedEof`]. How the underlying source fragments its
//! delivery never changes the result.
use std::io::{BufRead, BufReader, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    compress,
    error::{Context, Error, Result},
};

type Source<'a> = BufReader<Box<dyn Read + Send + 'a>>;

/// Streaming reader with optional transparent decompression.
pub struct Reader<'a> {
    inner: compress::Reader<Source<'a>>,
    compressed: bool,
    scratch: Vec<u8>,
}

impl<'a> Reader<'a> {
    pub fn new<R>(raw: R) -> Self
    where
        R: Read + Send + 'a,
    {
        let source: Box<dyn Read + Send + 'a> = Box::new(raw);
        Self {
            inner: compress::Reader::new(BufReader::new(source)),
            compressed: false,
            scratch: Vec::new(),
        }
    }

    /// Subsequent reads consume compression frames and yield their payload.
    pub fn enable_compression(&mut self) {
        self.compressed = true;
    }

    pub fn disable_compression(&mut self) {
        self.compressed = false;
        self.inner.reset();
    }

    /// Reports whether the source is exhausted. Only meaningful at a packet
    /// boundary, where nothing is compressed.
    pub fn is_eof(&mut self) -> Result<bool> {
        let buf = self.inner.get_mut().fill_buf()?;
        Ok(buf.is_empty())
    }

    fn source(&mut self) -> &mut dyn Read {
        if self.compressed {
            &mut self.inner
        } else {
            self.inner.get_mut()
        }
    }

    /// Fills `buf` completely.
    pub fn read_full(&mut self, buf: &mut [u8]) -> Result<()> {
        self.source().read_exact(buf)?;
        Ok(())
    }

    /// Returns exactly `n` bytes, valid until the next call.
    pub fn read_raw(&mut self, n: usize) -> Result<&[u8]> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        // Take bounds the allocation by what the source actually delivers.
        let got = self.source().take(n as u64).read_to_end(&mut scratch);
        self.scratch = scratch;
        got?;
        if self.scratch.len() < n {
            return Err(Error::UnexpectedEof);
        }
        Ok(&self.scratch)
    }

    pub fn uvarint(&mut self) -> Result<u64> {
        let mut x: u64 = 0;
        let mut s = 0;
        for i in 0..10 {
            let b = self.u8()?;
            if b < 0x80 {
                if i == 9 && b > 1 {
                    return Err(Error::VarIntOverflow);
                }
                return Ok(x | (b as u64) << s);
            }
            x |= ((b & 0x7f) as u64) << s;
            s += 7;
        }
        Err(Error::VarIntOverflow)
    }

    /// Length or count encoded as uvarint.
    pub fn int(&mut self) -> Result<usize> {
        let n = self.uvarint()?;
        usize::try_from(n).map_err(|_| Error::InvalidData(format!("length {n} overflows usize")))
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>> {
        let n = self.int().context("length")?;
        Ok(self.read_raw(n).context("read")?.to_vec())
    }

    pub fn str(&mut self) -> Result<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("string: {e}")))
    }

    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(Error::InvalidData(format!("bool byte {v}"))),
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.source().read_u8()?)
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(self.source().read_u16::<LittleEndian>()?)
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(self.source().read_u32::<LittleEndian>()?)
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(self.source().read_u64::<LittleEndian>()?)
    }

    pub fn u128(&mut self) -> Result<u128> {
        Ok(self.source().read_u128::<LittleEndian>()?)
    }

    pub fn i8(&mut self) -> Result<i8> {
        Ok(self.source().read_i8()?)
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(self.source().read_i16::<LittleEndian>()?)
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(self.source().read_i32::<LittleEndian>()?)
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(self.source().read_i64::<LittleEndian>()?)
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(self.source().read_f32::<LittleEndian>()?)
    }

    pub fn f64(&mut self) -> Result<f64> {
        Ok(self.source().read_f64::<LittleEndian>()?)
    }
}
