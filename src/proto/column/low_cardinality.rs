use std::{any::Any, collections::HashMap, fmt, hash::Hash};

use byteorder::{ByteOrder, LittleEndian};

use super::{Column, ColumnOf, ColumnType};
use crate::{
    error::{Context, Error, Result},
    proto::{Buffer, Reader},
};

/// Key serialization version: shared dictionaries with additional keys.
const SHARED_DICTIONARIES_WITH_ADDITIONAL_KEYS: i64 = 1;

const KEY_UINT8: i64 = 0;
const KEY_UINT16: i64 = 1;
const KEY_UINT32: i64 = 2;
const KEY_UINT64: i64 = 3;

const KEY_MASK: i64 = 0xff;
const NEED_GLOBAL_DICTIONARY: i64 = 1 << 8;
const HAS_ADDITIONAL_KEYS: i64 = 1 << 9;
const NEED_UPDATE_DICTIONARY: i64 = 1 << 10;

/// Dictionary-encoded column: distinct values live in `index`, rows are
/// positions into it.
///
/// Every encoded block carries its own dictionary. Global dictionaries are
/// not supported.
pub struct ColLowCardinality<C: ColumnOf> {
    pub index: C,
    pub keys: Vec<usize>,
    lookup: HashMap<C::Value, usize>,
}

impl<C> ColLowCardinality<C>
where
    C: ColumnOf,
    C::Value: Eq + Hash + Clone,
{
    pub fn new(index: C) -> Self {
        let mut col = Self {
            index,
            keys: Vec::new(),
            lookup: HashMap::new(),
        };
        col.index_from(0);
        col
    }

    fn index_from(&mut self, start: usize) {
        for i in start..self.index.rows() {
            self.lookup.entry(self.index.row(i)).or_insert(i);
        }
    }

    fn key_width(&self) -> i64 {
        let n = self.index.rows() as u64;
        if n < u8::MAX as u64 {
            KEY_UINT8
        } else if n < u16::MAX as u64 {
            KEY_UINT16
        } else if n < u32::MAX as u64 {
            KEY_UINT32
        } else {
            KEY_UINT64
        }
    }
}

impl<C: ColumnOf> fmt::Debug for ColLowCardinality<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColLowCardinality")
            .field("index_type", &self.index.column_type())
            .field("index_rows", &self.index.rows())
            .field("keys", &self.keys)
            .finish()
    }
}

fn read_len(r: &mut Reader<'_>, what: &'static str) -> Result<usize> {
    let n = r.i64().context(what)?;
    usize::try_from(n).map_err(|_| Error::InvalidData(format!("negative {what} {n}")))
}

impl<C> Column for ColLowCardinality<C>
where
    C: ColumnOf,
    C::Value: Eq + Hash + Clone + Send + 'static,
{
    fn column_type(&self) -> ColumnType {
        self.index.column_type().low_cardinality()
    }

    fn rows(&self) -> usize {
        self.keys.len()
    }

    fn reset(&mut self) {
        self.index.reset();
        self.keys.clear();
        self.lookup.clear();
    }

    fn encode_state(&self, b: &mut Buffer) {
        b.put_i64(SHARED_DICTIONARIES_WITH_ADDITIONAL_KEYS);
    }

    fn decode_state(&mut self, r: &mut Reader<'_>) -> Result<()> {
        let version = r.i64().context("key serialization version")?;
        if version != SHARED_DICTIONARIES_WITH_ADDITIONAL_KEYS {
            return Err(Error::InvalidData(format!(
                "unknown key serialization version {version}"
            )));
        }
        Ok(())
    }

    fn encode_column(&self, b: &mut Buffer) {
        if self.keys.is_empty() {
            return;
        }
        let width = self.key_width();
        b.put_i64(width | HAS_ADDITIONAL_KEYS | NEED_UPDATE_DICTIONARY);
        b.put_i64(self.index.rows() as i64);
        self.index.encode_column(b);
        b.put_i64(self.keys.len() as i64);
        for &k in &self.keys {
            match width {
                KEY_UINT8 => b.put_u8(k as u8),
                KEY_UINT16 => b.put_u16(k as u16),
                KEY_UINT32 => b.put_u32(k as u32),
                _ => b.put_u64(k as u64),
            }
        }
    }

    fn decode_column(&mut self, r: &mut Reader<'_>, rows: usize) -> Result<()> {
        if rows == 0 {
            return Ok(());
        }
        let meta = r.i64().context("meta")?;
        if meta & NEED_GLOBAL_DICTIONARY != 0 {
            return Err(Error::NotImplemented(
                "low cardinality global dictionary".into(),
            ));
        }
        let width = meta & KEY_MASK;
        if width > KEY_UINT64 {
            return Err(Error::InvalidData(format!("unknown key type {width}")));
        }

        let base = self.index.rows();
        let dict = read_len(r, "dictionary size")?;
        self.index.decode_column(r, dict).context("read dictionary")?;

        let count = read_len(r, "key count")?;
        if count != rows {
            return Err(Error::InvalidData(format!(
                "{count} keys for {rows} rows"
            )));
        }
        let size = 1usize << width;
        let n = count
            .checked_mul(size)
            .ok_or_else(|| Error::InvalidData(format!("{count} keys")))?;
        let data = r.read_raw(n).context("read keys")?;
        self.keys.reserve(count);
        for chunk in data.chunks_exact(size) {
            let key = match width {
                KEY_UINT8 => chunk[0] as u64,
                KEY_UINT16 => LittleEndian::read_u16(chunk) as u64,
                KEY_UINT32 => LittleEndian::read_u32(chunk) as u64,
                _ => LittleEndian::read_u64(chunk),
            };
            if key >= dict as u64 {
                return Err(Error::InvalidData(format!(
                    "key {key} out of dictionary of {dict}"
                )));
            }
            self.keys.push(base + key as usize);
        }
        self.index_from(base);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<C> ColumnOf for ColLowCardinality<C>
where
    C: ColumnOf,
    C::Value: Eq + Hash + Clone + Send + 'static,
{
    type Value = C::Value;

    fn append(&mut self, v: C::Value) {
        let key = match self.lookup.get(&v) {
            Some(&key) => key,
            None => {
                let key = self.index.rows();
                self.index.append(v.clone());
                self.lookup.insert(v, key);
                key
            }
        };
        self.keys.push(key);
    }

    fn row(&self, i: usize) -> C::Value {
        self.index.row(self.keys[i])
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::proto::{
        column::{ColStr, ColUInt32},
        testutil::OneByteReader,
    };

    fn encode<C: Column>(col: &C) -> Vec<u8> {
        let mut b = Buffer::new();
        col.encode_state(&mut b);
        col.encode_column(&mut b);
        b.buf
    }

    fn decode<C>(index: C, data: Vec<u8>, rows: usize) -> Result<ColLowCardinality<C>>
    where
        C: ColumnOf,
        C::Value: Eq + Hash + Clone + Send + 'static,
    {
        let mut r = Reader::new(Cursor::new(data));
        let mut col = ColLowCardinality::new(index);
        col.decode_state(&mut r)?;
        col.decode_column(&mut r, rows)?;
        Ok(col)
    }

    #[test]
    fn low_cardinality_string() {
        let mut col = ColLowCardinality::new(ColStr::new());
        col.append_all(["up", "down", "up", "up", "down"].map(String::from));
        assert_eq!(col.rows(), 5);
        assert_eq!(col.index.rows(), 2);
        assert_eq!(col.keys, vec![0, 1, 0, 0, 1]);
        assert_eq!(col.column_type().as_str(), "LowCardinality(String)");

        let data = encode(&col);
        let mut want = Buffer::new();
        want.put_i64(1);
        want.put_i64(0x600);
        want.put_i64(2);
        want.put_string("up");
        want.put_string("down");
        want.put_i64(5);
        want.put_raw(&[0, 1, 0, 0, 1]);
        assert_eq!(data, want.buf);

        let dec = decode(ColStr::new(), data, 5).unwrap();
        assert_eq!(
            (0..5).map(|i| dec.row(i)).collect::<Vec<_>>(),
            vec!["up", "down", "up", "up", "down"]
        );
    }

    #[test]
    fn wide_keys() {
        let mut col = ColLowCardinality::new(ColUInt32::new());
        col.append_all((0..300).chain(0..300));
        assert_eq!(col.key_width(), KEY_UINT16);

        let data = encode(&col);
        let mut r = Reader::new(OneByteReader::new(data));
        let mut dec = ColLowCardinality::new(ColUInt32::new());
        dec.decode_state(&mut r).unwrap();
        dec.decode_column(&mut r, 600).unwrap();
        assert_eq!(dec.keys, col.keys);
        assert_eq!(dec.row(450), 150);
    }

    #[test]
    fn appended_batches_rebase_keys() {
        let mut first = ColLowCardinality::new(ColStr::new());
        first.append_all(["a", "b"].map(String::from));
        let mut second = ColLowCardinality::new(ColStr::new());
        second.append_all(["b", "c"].map(String::from));

        let mut r = Reader::new(Cursor::new(encode(&first)));
        let mut dec = ColLowCardinality::new(ColStr::new());
        dec.decode_state(&mut r).unwrap();
        dec.decode_column(&mut r, 2).unwrap();
        let mut r = Reader::new(Cursor::new(encode(&second)));
        dec.decode_state(&mut r).unwrap();
        dec.decode_column(&mut r, 2).unwrap();

        assert_eq!(dec.keys, vec![0, 1, 2, 3]);
        assert_eq!(dec.row(3), "c");

        dec.append("a".into());
        assert_eq!(dec.keys[4], 0);
    }

    #[test]
    fn empty_column_writes_only_state() {
        let col = ColLowCardinality::new(ColStr::new());
        assert_eq!(encode(&col), 1i64.to_le_bytes());
        let dec = decode(ColStr::new(), encode(&col), 0).unwrap();
        assert_eq!(dec.rows(), 0);
    }

    #[test]
    fn global_dictionary_rejected() {
        let mut b = Buffer::new();
        b.put_i64(1);
        b.put_i64(NEED_GLOBAL_DICTIONARY | HAS_ADDITIONAL_KEYS);
        let err = decode(ColStr::new(), b.buf, 1).unwrap_err();
        assert!(matches!(err, Error::NotImplemented(_)));
    }

    #[test]
    fn key_out_of_range() {
        let mut b = Buffer::new();
        b.put_i64(1);
        b.put_i64(HAS_ADDITIONAL_KEYS | NEED_UPDATE_DICTIONARY);
        b.put_i64(1);
        b.put_string("only");
        b.put_i64(1);
        b.put_u8(1);
        let err = decode(ColStr::new(), b.buf, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn debug_shows_dictionary() {
        let mut col = ColLowCardinality::new(ColStr::new());
        col.append_all(["x", "y", "x"].map(String::from));
        let out = format!("{col:?}");
        assert!(out.contains("index_rows: 2"), "{out}");
        assert!(out.contains("keys: [0, 1, 0]"), "{out}");
    }

    #[test]
    fn bad_version() {
        let err = decode(ColStr::new(), 2i64.to_le_bytes().to_vec(), 0).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }
}
