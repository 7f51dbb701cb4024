use std::any::Any;

use super::{Column, ColumnOf, ColumnType};
use crate::{
    error::{Context, Result},
    proto::{Buffer, Reader},
};

/// Column of variable-length byte strings, each written as uvarint length
/// followed by the bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColStr {
    /// Concatenated row bytes.
    pub buf: Vec<u8>,
    /// End offset of each row in `buf`.
    pub ends: Vec<usize>,
}

impl ColStr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
        self.ends.push(self.buf.len());
    }

    pub fn row_bytes(&self, i: usize) -> &[u8] {
        let start = if i == 0 { 0 } else { self.ends[i - 1] };
        &self.buf[start..self.ends[i]]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.ends.len()).map(|i| self.row_bytes(i))
    }
}

impl<S: AsRef<str>> FromIterator<S> for ColStr {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut col = ColStr::new();
        for s in iter {
            col.append_bytes(s.as_ref().as_bytes());
        }
        col
    }
}

impl Column for ColStr {
    fn column_type(&self) -> ColumnType {
        ColumnType::STRING
    }

    fn rows(&self) -> usize {
        self.ends.len()
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.ends.clear();
    }

    fn encode_column(&self, b: &mut Buffer) {
        for v in self.iter() {
            b.put_bytes(v);
        }
    }

    fn decode_column(&mut self, r: &mut Reader<'_>, rows: usize) -> Result<()> {
        for i in 0..rows {
            let n = r.int().with_context(|| format!("row {i}: length"))?;
            let data = r.read_raw(n).with_context(|| format!("row {i}: read"))?;
            self.buf.extend_from_slice(data);
            self.ends.push(self.buf.len());
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Rows are converted lossily when they are not valid UTF-8; use
/// [`ColStr::row_bytes`] for the raw bytes.
impl ColumnOf for ColStr {
    type Value = String;

    fn append(&mut self, v: String) {
        self.append_bytes(v.as_bytes());
    }

    fn row(&self, i: usize) -> String {
        String::from_utf8_lossy(self.row_bytes(i)).into_owned()
    }
}

/// Column of byte strings of exactly `size` bytes, packed back to back.
///
/// There is no `Default`: a column without a width could not tell how many
/// rows it decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColFixedStr {
    pub buf: Vec<u8>,
    size: usize,
}

impl ColFixedStr {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "fixed string size must be positive");
        Self {
            buf: Vec::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Appends `v`, zero-padded or truncated to the column size.
    pub fn append_bytes(&mut self, v: &[u8]) {
        let n = v.len().min(self.size);
        self.buf.extend_from_slice(&v[..n]);
        self.buf.resize(self.buf.len() + self.size - n, 0);
    }

    pub fn row_bytes(&self, i: usize) -> &[u8] {
        &self.buf[i * self.size..(i + 1) * self.size]
    }
}

impl Column for ColFixedStr {
    fn column_type(&self) -> ColumnType {
        ColumnType::new(format!("{}({})", ColumnType::FIXED_STRING, self.size))
    }

    fn rows(&self) -> usize {
        self.buf.len() / self.size
    }

    fn reset(&mut self) {
        self.buf.clear();
    }

    fn encode_column(&self, b: &mut Buffer) {
        b.put_raw(&self.buf);
    }

    fn decode_column(&mut self, r: &mut Reader<'_>, rows: usize) -> Result<()> {
        let n = rows.checked_mul(self.size).ok_or_else(|| {
            crate::error::Error::InvalidData(format!("{rows} rows of {}", self.column_type()))
        })?;
        let data = r.read_raw(n).context("read")?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ColumnOf for ColFixedStr {
    type Value = Vec<u8>;

    fn append(&mut self, v: Vec<u8>) {
        self.append_bytes(&v);
    }

    fn row(&self, i: usize) -> Vec<u8> {
        self.row_bytes(i).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::proto::testutil::{OneByteReader, decode_fresh};

    #[test]
    fn string_roundtrip() {
        let data: ColStr = ["foo", "", "bar baz", "ユニコード"].into_iter().collect();
        let mut b = Buffer::new();
        data.encode_column(&mut b);
        assert_eq!(&b.buf[..4], &[3, b'f', b'o', b'o']);

        let dec = decode_fresh::<ColStr>(&b.buf, 4);
        assert_eq!(dec, data);
        assert_eq!(dec.row(3), "ユニコード");
        assert_eq!(dec.row_bytes(1), b"");
    }

    #[test]
    fn string_no_short_read() {
        let data: ColStr = (0..64).map(|i| "x".repeat(i)).collect();
        let mut b = Buffer::new();
        data.encode_column(&mut b);

        let mut r = Reader::new(OneByteReader::new(b.buf));
        let mut dec = ColStr::new();
        dec.decode_column(&mut r, 64).unwrap();
        assert_eq!(dec, data);
    }

    #[test]
    fn string_truncated() {
        let data: ColStr = ["hello", "world"].into_iter().collect();
        let mut b = Buffer::new();
        data.encode_column(&mut b);

        let mut r = Reader::new(Cursor::new(b.buf[..b.len() - 2].to_vec()));
        let err = ColStr::new().decode_column(&mut r, 2).unwrap_err();
        assert!(err.is_unexpected_eof());
        assert_eq!(err.to_string(), "row 1: read: unexpected end of stream");
    }

    #[test]
    fn string_reset_keeps_capacity() {
        let mut data: ColStr = ["a", "b"].into_iter().collect();
        let capacity = data.buf.capacity();
        data.reset();
        assert_eq!(data.rows(), 0);
        assert_eq!(data.buf.capacity(), capacity);
    }

    #[test]
    fn fixed_string_pads_and_roundtrips() {
        let mut data = ColFixedStr::new(4);
        data.append(b"ab".to_vec());
        data.append(b"abcdef".to_vec());
        assert_eq!(data.rows(), 2);
        assert_eq!(data.row(0), b"ab\0\0");
        assert_eq!(data.row(1), b"abcd");

        let mut b = Buffer::new();
        data.encode_column(&mut b);
        assert_eq!(b.len(), 8);

        let mut r = Reader::new(Cursor::new(b.buf));
        let mut dec = ColFixedStr::new(4);
        dec.decode_column(&mut r, 2).unwrap();
        assert_eq!(dec, data);
        assert_eq!(dec.column_type().as_str(), "FixedString(4)");
    }

    #[test]
    fn fixed_string_decode_counts_rows() {
        let mut r = Reader::new(OneByteReader::new(b"abcdefghi".to_vec()));
        let mut dec = ColFixedStr::new(3);
        dec.decode_column(&mut r, 3).unwrap();
        assert_eq!(dec.rows(), 3);
        assert_eq!(dec.row(2), b"ghi");
    }

    #[test]
    #[should_panic(expected = "fixed string size must be positive")]
    fn fixed_string_needs_width() {
        ColFixedStr::new(0);
    }
}
