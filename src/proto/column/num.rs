use std::{any::Any, fmt};

use byteorder::{ByteOrder, LittleEndian};

use super::{Column, ColumnOf, ColumnType};
use crate::{
    error::{Context, Error, Result},
    proto::{Buffer, Reader},
};

/// Fixed-width value packed little-endian in `SIZE` bytes.
pub trait Primitive: Copy + Default + PartialEq + fmt::Debug + Send + 'static {
    const SIZE: usize;
    const TYPE: ColumnType;

    /// Writes `self` into `dst`, which is exactly `SIZE` bytes.
    fn put(self, dst: &mut [u8]);

    /// Reads a value from `src`, which is exactly `SIZE` bytes.
    fn get(src: &[u8]) -> Self;

    /// Rejects encodings that `get` would not read back losslessly.
    fn check(_src: &[u8]) -> Result<()> {
        Ok(())
    }
}

macro_rules! primitive {
    ($t:ty, $size:literal, $tag:expr, $read:ident, $write:ident) => {
        impl Primitive for $t {
            const SIZE: usize = $size;
            const TYPE: ColumnType = $tag;

            fn put(self, dst: &mut [u8]) {
                LittleEndian::$write(dst, self)
            }

            fn get(src: &[u8]) -> Self {
                LittleEndian::$read(src)
            }
        }
    };
}

primitive!(u16, 2, ColumnType::UINT16, read_u16, write_u16);
primitive!(u32, 4, ColumnType::UINT32, read_u32, write_u32);
primitive!(u64, 8, ColumnType::UINT64, read_u64, write_u64);
primitive!(u128, 16, ColumnType::UINT128, read_u128, write_u128);
primitive!(i16, 2, ColumnType::INT16, read_i16, write_i16);
primitive!(i32, 4, ColumnType::INT32, read_i32, write_i32);
primitive!(i64, 8, ColumnType::INT64, read_i64, write_i64);
primitive!(i128, 16, ColumnType::INT128, read_i128, write_i128);
primitive!(f32, 4, ColumnType::FLOAT32, read_f32, write_f32);
primitive!(f64, 8, ColumnType::FLOAT64, read_f64, write_f64);

impl Primitive for u8 {
    const SIZE: usize = 1;
    const TYPE: ColumnType = ColumnType::UINT8;

    fn put(self, dst: &mut [u8]) {
        dst[0] = self;
    }

    fn get(src: &[u8]) -> Self {
        src[0]
    }
}

impl Primitive for i8 {
    const SIZE: usize = 1;
    const TYPE: ColumnType = ColumnType::INT8;

    fn put(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }

    fn get(src: &[u8]) -> Self {
        src[0] as i8
    }
}

impl Primitive for bool {
    const SIZE: usize = 1;
    const TYPE: ColumnType = ColumnType::BOOL;

    fn put(self, dst: &mut [u8]) {
        dst[0] = self as u8;
    }

    fn get(src: &[u8]) -> Self {
        src[0] != 0
    }

    fn check(src: &[u8]) -> Result<()> {
        match src[0] {
            0 | 1 => Ok(()),
            v => Err(Error::InvalidData(format!("bool byte {v}"))),
        }
    }
}

macro_rules! newtype_primitive {
    ($(#[$meta:meta])* $name:ident($inner:ty), $tag:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub $inner);

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                $name(value)
            }
        }

        impl From<$name> for $inner {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Primitive for $name {
            const SIZE: usize = <$inner as Primitive>::SIZE;
            const TYPE: ColumnType = $tag;

            fn put(self, dst: &mut [u8]) {
                self.0.put(dst)
            }

            fn get(src: &[u8]) -> Self {
                $name(<$inner>::get(src))
            }
        }
    };
}

newtype_primitive!(
    /// Enum8 ordinal. The symbolic names live in the declared type.
    Enum8(i8),
    ColumnType::ENUM8
);
newtype_primitive!(
    /// Enum16 ordinal. The symbolic names live in the declared type.
    Enum16(i16),
    ColumnType::ENUM16
);
newtype_primitive!(
    /// Days since 1970-01-01.
    Date(u16),
    ColumnType::DATE
);
newtype_primitive!(
    /// Seconds since the Unix epoch.
    DateTime(u32),
    ColumnType::DATETIME
);

/// Column of fixed-width values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColNum<T>(pub Vec<T>);

pub type ColUInt8 = ColNum<u8>;
pub type ColUInt16 = ColNum<u16>;
pub type ColUInt32 = ColNum<u32>;
pub type ColUInt64 = ColNum<u64>;
pub type ColUInt128 = ColNum<u128>;
pub type ColInt8 = ColNum<i8>;
pub type ColInt16 = ColNum<i16>;
pub type ColInt32 = ColNum<i32>;
pub type ColInt64 = ColNum<i64>;
pub type ColInt128 = ColNum<i128>;
pub type ColFloat32 = ColNum<f32>;
pub type ColFloat64 = ColNum<f64>;
pub type ColBool = ColNum<bool>;
pub type ColDate = ColNum<Date>;
pub type ColDateTime = ColNum<DateTime>;
pub type ColEnum8 = ColNum<Enum8>;
pub type ColEnum16 = ColNum<Enum16>;

impl<T: Primitive> ColNum<T> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn values(&self) -> &[T] {
        &self.0
    }

    pub fn last(&self) -> Option<T> {
        self.0.last().copied()
    }
}

impl<T> From<Vec<T>> for ColNum<T> {
    fn from(value: Vec<T>) -> Self {
        Self(value)
    }
}

impl<T: Primitive> Column for ColNum<T> {
    fn column_type(&self) -> ColumnType {
        T::TYPE
    }

    fn rows(&self) -> usize {
        self.0.len()
    }

    fn reset(&mut self) {
        self.0.clear();
    }

    fn encode_column(&self, b: &mut Buffer) {
        if self.0.is_empty() {
            return;
        }
        let offset = b.buf.len();
        b.buf.resize(offset + T::SIZE * self.0.len(), 0);
        for (dst, v) in b.buf[offset..].chunks_exact_mut(T::SIZE).zip(&self.0) {
            v.put(dst);
        }
    }

    fn decode_column(&mut self, r: &mut Reader<'_>, rows: usize) -> Result<()> {
        let size = rows
            .checked_mul(T::SIZE)
            .ok_or_else(|| Error::InvalidData(format!("{rows} rows of {}", T::TYPE)))?;
        let data = r.read_raw(size).context("read")?;
        for src in data.chunks_exact(T::SIZE) {
            T::check(src)?;
        }
        self.0.reserve(rows);
        self.0.extend(data.chunks_exact(T::SIZE).map(T::get));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Primitive> ColumnOf for ColNum<T> {
    type Value = T;

    fn append(&mut self, v: T) {
        self.0.push(v);
    }

    fn row(&self, i: usize) -> T {
        self.0[i]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::proto::testutil::{OneByteReader, decode_fresh};

    #[test]
    fn enum16_decode_column() {
        const ROWS: usize = 50;
        let mut data = ColEnum16::new();
        for i in 0..ROWS {
            let v = Enum16(i as i16);
            data.append(v);
            assert_eq!(data.row(i), v);
        }

        let mut b = Buffer::new();
        data.encode_column(&mut b);
        assert_eq!(b.len(), ROWS * 2);
        assert_eq!(&b.buf[..6], &[0, 0, 1, 0, 2, 0]);

        let mut r = Reader::new(Cursor::new(b.buf.clone()));
        let mut dec = ColEnum16::new();
        dec.decode_column(&mut r, ROWS).unwrap();
        assert_eq!(dec, data);
        assert_eq!(dec.rows(), ROWS);
        assert_eq!(
            dec.values().iter().map(|v| v.0).collect::<Vec<_>>(),
            (0..50).collect::<Vec<i16>>()
        );

        dec.reset();
        assert_eq!(dec.rows(), 0);
        assert_eq!(dec.column_type(), ColumnType::ENUM16);
    }

    #[test]
    fn bool_rejects_other_bytes() {
        let mut r = Reader::new(Cursor::new(vec![1, 0, 2]));
        let mut col = ColBool::new();
        let err = col.decode_column(&mut r, 3).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert_eq!(col.rows(), 0);

        let mut r = Reader::new(Cursor::new(vec![1, 0, 1]));
        col.decode_column(&mut r, 3).unwrap();
        assert_eq!(col.0, vec![true, false, true]);
    }

    #[test]
    fn zero_rows() {
        let mut r = Reader::new(Cursor::new(Vec::new()));
        let mut dec = ColEnum16::new();
        dec.decode_column(&mut r, 0).unwrap();
        assert_eq!(dec.rows(), 0);

        let mut b = Buffer::new();
        ColEnum16::new().encode_column(&mut b);
        assert!(b.is_empty());
    }

    #[test]
    fn unexpected_eof() {
        let mut r = Reader::new(Cursor::new(vec![1, 0, 2]));
        let mut dec = ColEnum16::new();
        assert!(dec.decode_column(&mut r, 50).unwrap_err().is_unexpected_eof());
    }

    #[test]
    fn no_short_read() {
        let data = ColInt64::from((0..100).map(|i| i * 1_000_003).collect::<Vec<i64>>());
        let mut b = Buffer::new();
        data.encode_column(&mut b);

        let mut r = Reader::new(OneByteReader::new(b.buf));
        let mut dec = ColInt64::new();
        dec.decode_column(&mut r, 100).unwrap();
        assert_eq!(dec, data);
    }

    #[test]
    fn reset_then_reuse_matches_fresh() {
        let data = ColFloat64::from(vec![0.5, -1.25, f64::MAX, 3.0]);
        let mut b = Buffer::new();
        data.encode_column(&mut b);

        let mut reused = ColFloat64::from(vec![9.0; 16]);
        reused.reset();
        let mut r = Reader::new(Cursor::new(b.buf.clone()));
        reused.decode_column(&mut r, 4).unwrap();

        assert_eq!(reused, decode_fresh::<ColFloat64>(&b.buf, 4));
        assert_eq!(reused, data);
    }

    #[test]
    fn scalar_roundtrips() {
        fn check<T: Primitive>(values: Vec<T>) {
            let data = ColNum::from(values);
            let mut b = Buffer::new();
            data.encode_column(&mut b);
            assert_eq!(b.len(), data.rows() * T::SIZE);
            assert_eq!(decode_fresh::<ColNum<T>>(&b.buf, data.rows()), data);
        }

        check(vec![0u8, 255]);
        check(vec![i8::MIN, -1, i8::MAX]);
        check(vec![u32::MAX, 0]);
        check(vec![i128::MIN, i128::MAX]);
        check(vec![u128::MAX]);
        check(vec![1.5f32, -0.0]);
        check(vec![true, false, true]);
        check(vec![Date(19000), Date(0)]);
        check(vec![DateTime(1_700_000_000)]);
        check(vec![Enum8(-3), Enum8(7)]);
    }
}
