//! Column type system.
//!
//! Every column variant implements [`Column`]: it knows its wire type, its
//! row count, and how to pack its rows into a [`Buffer`] or append rows read
//! from a [`Reader`]. Row count and type travel in the enclosing
//! [`Block`](super::Block), never inside the column bytes.
//!
//! Fixed-width scalars share one generic implementation, [`ColNum`], over
//! the [`Primitive`] trait. [`ColArr`], [`ColNullable`] and
//! [`ColLowCardinality`] wrap any inner column. Boxed columns are built from a
//! type tag by [`new_column`].
mod array;
mod low_cardinality;
mod nullable;
mod num;
mod string;

use std::{any::Any, borrow::Cow, fmt};

pub use array::ColArr;
pub use low_cardinality::ColLowCardinality;
pub use nullable::ColNullable;
pub use num::*;
pub use string::{ColFixedStr, ColStr};

use super::{Buffer, Reader};
use crate::error::{Error, Result};

/// Wire type tag of a column, e.g. `Array(Nullable(String))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnType(Cow<'static, str>);

impl ColumnType {
    pub const UINT8: ColumnType = ColumnType::borrowed("UInt8");
    pub const UINT16: ColumnType = ColumnType::borrowed("UInt16");
    pub const UINT32: ColumnType = ColumnType::borrowed("UInt32");
    pub const UINT64: ColumnType = ColumnType::borrowed("UInt64");
    pub const UINT128: ColumnType = ColumnType::borrowed("UInt128");
    pub const INT8: ColumnType = ColumnType::borrowed("Int8");
    pub const INT16: ColumnType = ColumnType::borrowed("Int16");
    pub const INT32: ColumnType = ColumnType::borrowed("Int32");
    pub const INT64: ColumnType = ColumnType::borrowed("Int64");
    pub const INT128: ColumnType = ColumnType::borrowed("Int128");
    pub const FLOAT32: ColumnType = ColumnType::borrowed("Float32");
    pub const FLOAT64: ColumnType = ColumnType::borrowed("Float64");
    pub const BOOL: ColumnType = ColumnType::borrowed("Bool");
    pub const DATE: ColumnType = ColumnType::borrowed("Date");
    pub const DATETIME: ColumnType = ColumnType::borrowed("DateTime");
    pub const ENUM8: ColumnType = ColumnType::borrowed("Enum8");
    pub const ENUM16: ColumnType = ColumnType::borrowed("Enum16");
    pub const STRING: ColumnType = ColumnType::borrowed("String");
    pub const FIXED_STRING: ColumnType = ColumnType::borrowed("FixedString");
    pub const ARRAY: ColumnType = ColumnType::borrowed("Array");
    pub const NULLABLE: ColumnType = ColumnType::borrowed("Nullable");
    pub const LOW_CARDINALITY: ColumnType = ColumnType::borrowed("LowCardinality");

    const fn borrowed(s: &'static str) -> Self {
        ColumnType(Cow::Borrowed(s))
    }

    pub fn new(s: impl Into<Cow<'static, str>>) -> Self {
        ColumnType(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name before any parameters: `Array` for `Array(Int8)`.
    pub fn base(&self) -> &str {
        match self.0.find('(') {
            Some(i) => self.0[..i].trim(),
            None => self.0.trim(),
        }
    }

    /// Text between the outermost parentheses, if any.
    pub fn params(&self) -> Option<&str> {
        let start = self.0.find('(')?;
        let end = self.0.rfind(')')?;
        (end > start).then(|| self.0[start + 1..end].trim())
    }

    /// Element type of `Array`, `Nullable` and `LowCardinality`.
    pub fn elem(&self) -> Option<ColumnType> {
        match self.base() {
            "Array" | "Nullable" | "LowCardinality" => self
                .params()
                .map(|p| ColumnType::new(p.to_string())),
            _ => None,
        }
    }

    pub fn wrap(&self, wrapper: &ColumnType) -> ColumnType {
        ColumnType::new(format!("{}({})", wrapper.as_str(), self.0))
    }

    pub fn array(&self) -> ColumnType {
        self.wrap(&ColumnType::ARRAY)
    }

    pub fn nullable(&self) -> ColumnType {
        self.wrap(&ColumnType::NULLABLE)
    }

    pub fn low_cardinality(&self) -> ColumnType {
        self.wrap(&ColumnType::LOW_CARDINALITY)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ColumnType {
    fn from(value: &'static str) -> Self {
        ColumnType::new(value)
    }
}

impl From<String> for ColumnType {
    fn from(value: String) -> Self {
        ColumnType::new(value)
    }
}

/// Capability shared by every column variant.
pub trait Column: Send + 'static {
    fn column_type(&self) -> ColumnType;

    fn rows(&self) -> usize;

    /// Logically empties the column, keeping allocated capacity.
    fn reset(&mut self);

    /// Appends the rows, packed in row order. No-op for an empty column.
    fn encode_column(&self, b: &mut Buffer);

    /// Appends exactly `rows` values read from `r`. On failure the column
    /// may hold a partial batch and must be discarded or reset.
    fn decode_column(&mut self, r: &mut Reader<'_>, rows: usize) -> Result<()>;

    /// Writes the per-column state prefix that precedes the row data.
    fn encode_state(&self, _b: &mut Buffer) {}

    fn decode_state(&mut self, _r: &mut Reader<'_>) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Typed row access on top of [`Column`].
pub trait ColumnOf: Column {
    type Value;

    fn append(&mut self, v: Self::Value);

    /// Value at row `i`.
    ///
    /// # Panics
    /// If `i` is out of range.
    fn row(&self, i: usize) -> Self::Value;

    fn append_all<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = Self::Value>,
        Self: Sized,
    {
        for v in values {
            self.append(v);
        }
    }
}

impl Column for Box<dyn Column> {
    fn column_type(&self) -> ColumnType {
        (**self).column_type()
    }

    fn rows(&self) -> usize {
        (**self).rows()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn encode_column(&self, b: &mut Buffer) {
        (**self).encode_column(b)
    }

    fn decode_column(&mut self, r: &mut Reader<'_>, rows: usize) -> Result<()> {
        (**self).decode_column(r, rows)
    }

    fn encode_state(&self, b: &mut Buffer) {
        (**self).encode_state(b)
    }

    fn decode_state(&mut self, r: &mut Reader<'_>) -> Result<()> {
        (**self).decode_state(r)
    }

    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        (**self).as_any_mut()
    }
}

/// Builds an empty column for the type tag `t`.
pub fn new_column(t: &ColumnType) -> Result<Box<dyn Column>> {
    let unsupported = || Error::UnsupportedType(t.to_string());
    let elem = || t.elem().ok_or_else(unsupported);

    Ok(match t.base() {
        "Array" => Box::new(ColArr::new(new_column(&elem()?)?)),
        "Nullable" => Box::new(ColNullable::new(new_column(&elem()?)?)),
        "LowCardinality" => new_low_cardinality(&elem()?)?,
        "FixedString" => Box::new(ColFixedStr::new(fixed_size(t)?)),
        "String" => Box::new(ColStr::default()),
        base => match new_primitive(base) {
            Some(col) => col,
            None => return Err(unsupported()),
        },
    })
}

macro_rules! primitive_column {
    ($base:expr, $wrap:ident, { $($name:literal => $t:ty),+ $(,)? }) => {
        match $base {
            $($name => Some(Box::new($wrap::<$t>::default()) as Box<dyn Column>),)+
            _ => None,
        }
    };
}

fn new_primitive(base: &str) -> Option<Box<dyn Column>> {
    primitive_column!(base, ColNum, {
        "UInt8" => u8,
        "UInt16" => u16,
        "UInt32" => u32,
        "UInt64" => u64,
        "UInt128" => u128,
        "Int8" => i8,
        "Int16" => i16,
        "Int32" => i32,
        "Int64" => i64,
        "Int128" => i128,
        "Float32" => f32,
        "Float64" => f64,
        "Bool" => bool,
        "Date" => Date,
        "DateTime" => DateTime,
        "Enum8" => Enum8,
        "Enum16" => Enum16,
    })
}

fn new_low_cardinality(elem: &ColumnType) -> Result<Box<dyn Column>> {
    fn lc<C>(index: C) -> Box<dyn Column>
    where
        C: ColumnOf,
        C::Value: Eq + std::hash::Hash + Clone + Send + 'static,
    {
        Box::new(ColLowCardinality::new(index))
    }

    Ok(match elem.base() {
        "String" => lc(ColStr::default()),
        "FixedString" => lc(ColFixedStr::new(fixed_size(elem)?)),
        "UInt8" => lc(ColUInt8::default()),
        "UInt16" => lc(ColUInt16::default()),
        "UInt32" => lc(ColUInt32::default()),
        "UInt64" => lc(ColUInt64::default()),
        "Int8" => lc(ColInt8::default()),
        "Int16" => lc(ColInt16::default()),
        "Int32" => lc(ColInt32::default()),
        "Int64" => lc(ColInt64::default()),
        _ => return Err(Error::UnsupportedType(elem.low_cardinality().to_string())),
    })
}

fn fixed_size(t: &ColumnType) -> Result<usize> {
    t.params()
        .and_then(|p| p.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::UnsupportedType(t.to_string()))
}
