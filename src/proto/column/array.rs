use std::any::Any;

use super::{ColUInt64, Column, ColumnOf, ColumnType};
use crate::{
    error::{Context, Error, Result},
    proto::{Buffer, Reader},
};

/// Column of variable-length arrays over an inner column.
///
/// `offsets[i]` is the cumulative inner row count after outer row `i`, so
/// `offsets.last() == data.rows()`. On the wire the offsets precede the inner
/// column and count from the start of the batch being decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColArr<C> {
    pub offsets: ColUInt64,
    pub data: C,
}

impl<C: Column> ColArr<C> {
    pub fn new(data: C) -> Self {
        Self {
            offsets: ColUInt64::new(),
            data,
        }
    }

    /// Inner row range of outer row `i`.
    pub fn range(&self, i: usize) -> std::ops::Range<usize> {
        let start = if i == 0 { 0 } else { self.offsets.0[i - 1] };
        start as usize..self.offsets.0[i] as usize
    }

    /// Closes the current outer row over every inner row appended since the
    /// previous one.
    pub fn commit(&mut self) {
        self.offsets.append(self.data.rows() as u64);
    }
}

impl<C: Column> Column for ColArr<C> {
    fn column_type(&self) -> ColumnType {
        self.data.column_type().array()
    }

    fn rows(&self) -> usize {
        self.offsets.rows()
    }

    fn reset(&mut self) {
        self.offsets.reset();
        self.data.reset();
    }

    fn encode_column(&self, b: &mut Buffer) {
        self.offsets.encode_column(b);
        self.data.encode_column(b);
    }

    fn decode_column(&mut self, r: &mut Reader<'_>, rows: usize) -> Result<()> {
        if rows == 0 {
            return Ok(());
        }
        let base = self.offsets.last().unwrap_or(0);
        let start = self.offsets.rows();
        self.offsets.decode_column(r, rows).context("read offsets")?;

        let mut prev = 0;
        for (i, &offset) in self.offsets.0[start..].iter().enumerate() {
            if offset < prev {
                return Err(Error::InvalidData(format!(
                    "array offset {offset} at row {i} is below {prev}"
                )));
            }
            prev = offset;
        }
        let inner = usize::try_from(prev)
            .map_err(|_| Error::InvalidData(format!("array offset {prev} overflows")))?;
        self.data.decode_column(r, inner).context("read data")?;

        if base > 0 {
            for offset in &mut self.offsets.0[start..] {
                *offset += base;
            }
        }
        Ok(())
    }

    fn encode_state(&self, b: &mut Buffer) {
        self.data.encode_state(b)
    }

    fn decode_state(&mut self, r: &mut Reader<'_>) -> Result<()> {
        self.data.decode_state(r)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<C: ColumnOf> ColumnOf for ColArr<C> {
    type Value = Vec<C::Value>;

    fn append(&mut self, v: Vec<C::Value>) {
        self.data.append_all(v);
        self.commit();
    }

    fn row(&self, i: usize) -> Vec<C::Value> {
        self.range(i).map(|j| self.data.row(j)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::proto::{
        column::{ColEnum16, ColStr, ColUInt32, Enum16},
        testutil::{OneByteReader, decode_fresh},
    };

    fn enum16_rows() -> ColArr<ColEnum16> {
        let mut arr = ColArr::new(ColEnum16::new());
        for i in 0..50i16 {
            arr.append(vec![Enum16(i), Enum16(i + 1), Enum16(i + 2)]);
        }
        arr
    }

    #[test]
    fn array_enum16() {
        let arr = enum16_rows();
        assert_eq!(arr.rows(), 50);
        assert_eq!(arr.data.rows(), 150);
        assert_eq!(
            arr.offsets.values(),
            (1..=50).map(|i| i * 3).collect::<Vec<u64>>().as_slice()
        );
        assert_eq!(arr.row(7), vec![Enum16(7), Enum16(8), Enum16(9)]);
        assert_eq!(arr.column_type().as_str(), "Array(Enum16)");

        let mut b = Buffer::new();
        arr.encode_column(&mut b);
        assert_eq!(b.len(), 50 * 8 + 150 * 2);
        assert_eq!(&b.buf[..8], &3u64.to_le_bytes());

        let mut r = Reader::new(Cursor::new(b.buf.clone()));
        let mut dec = ColArr::new(ColEnum16::new());
        dec.decode_column(&mut r, 50).unwrap();
        assert_eq!(dec, arr);
        assert!(r.is_eof().unwrap());
    }

    #[test]
    fn array_no_short_read() {
        let arr = enum16_rows();
        let mut b = Buffer::new();
        arr.encode_column(&mut b);

        let mut r = Reader::new(OneByteReader::new(b.buf));
        let mut dec = ColArr::new(ColEnum16::new());
        dec.decode_column(&mut r, 50).unwrap();
        assert_eq!(dec, arr);
    }

    #[test]
    fn array_batches_are_rebased() {
        let mut first = ColArr::new(ColStr::new());
        first.append(vec!["a".into(), "b".into()]);
        first.append(vec![]);
        let mut second = ColArr::new(ColStr::new());
        second.append(vec!["c".into()]);

        let mut b = Buffer::new();
        first.encode_column(&mut b);
        second.encode_column(&mut b);

        let mut r = Reader::new(Cursor::new(b.buf));
        let mut dec = ColArr::new(ColStr::new());
        dec.decode_column(&mut r, 2).unwrap();
        dec.decode_column(&mut r, 1).unwrap();

        assert_eq!(dec.offsets.values(), &[2, 2, 3]);
        assert_eq!(dec.row(1), Vec::<String>::new());
        assert_eq!(dec.row(2), vec!["c".to_string()]);
        assert_eq!(dec.offsets.last(), Some(dec.data.rows() as u64));
    }

    #[test]
    fn nested_arrays() {
        let mut arr = ColArr::new(ColArr::new(ColUInt32::new()));
        arr.append(vec![vec![1, 2], vec![3]]);
        arr.append(vec![vec![]]);
        assert_eq!(arr.column_type().as_str(), "Array(Array(UInt32))");

        let mut b = Buffer::new();
        arr.encode_column(&mut b);
        let dec = decode_fresh::<ColArr<ColArr<ColUInt32>>>(&b.buf, 2);
        assert_eq!(dec.row(0), vec![vec![1, 2], vec![3]]);
        assert_eq!(dec.row(1), vec![Vec::<u32>::new()]);
    }

    #[test]
    fn decreasing_offsets_rejected() {
        let mut b = Buffer::new();
        ColUInt64::from(vec![4, 2]).encode_column(&mut b);

        let mut r = Reader::new(Cursor::new(b.buf));
        let err = ColArr::new(ColUInt32::new())
            .decode_column(&mut r, 2)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn truncated_data() {
        let arr = enum16_rows();
        let mut b = Buffer::new();
        arr.encode_column(&mut b);

        let mut r = Reader::new(Cursor::new(b.buf[..b.len() - 1].to_vec()));
        let err = ColArr::new(ColEnum16::new())
            .decode_column(&mut r, 50)
            .unwrap_err();
        assert!(err.is_unexpected_eof());
        assert!(err.to_string().starts_with("read data"));
    }

    #[test]
    fn zero_rows_reads_nothing() {
        let mut r = Reader::new(Cursor::new(vec![0xff; 8]));
        let mut dec = ColArr::new(ColEnum16::new());
        dec.decode_column(&mut r, 0).unwrap();
        assert_eq!(dec.rows(), 0);
        assert_eq!(r.u8().unwrap(), 0xff);
    }
}
