use std::any::Any;

use super::{ColUInt8, Column, ColumnOf, ColumnType};
use crate::{
    error::{Context, Result},
    proto::{Buffer, Reader},
};

/// Nullable wrapper: a byte mask (1 = null) followed by the inner column.
///
/// Null rows still occupy a slot in `values`, holding the default value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColNullable<C> {
    pub nulls: ColUInt8,
    pub values: C,
}

impl<C: Column> ColNullable<C> {
    pub fn new(values: C) -> Self {
        Self {
            nulls: ColUInt8::new(),
            values,
        }
    }

    pub fn is_null(&self, i: usize) -> bool {
        self.nulls.0[i] != 0
    }
}

impl<C: Column> Column for ColNullable<C> {
    fn column_type(&self) -> ColumnType {
        self.values.column_type().nullable()
    }

    fn rows(&self) -> usize {
        self.nulls.rows()
    }

    fn reset(&mut self) {
        self.nulls.reset();
        self.values.reset();
    }

    fn encode_column(&self, b: &mut Buffer) {
        self.nulls.encode_column(b);
        self.values.encode_column(b);
    }

    fn decode_column(&mut self, r: &mut Reader<'_>, rows: usize) -> Result<()> {
        self.nulls.decode_column(r, rows).context("read nulls")?;
        self.values.decode_column(r, rows).context("read values")?;
        Ok(())
    }

    fn encode_state(&self, b: &mut Buffer) {
        self.values.encode_state(b)
    }

    fn decode_state(&mut self, r: &mut Reader<'_>) -> Result<()> {
        self.values.decode_state(r)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<C> ColumnOf for ColNullable<C>
where
    C: ColumnOf,
    C::Value: Default,
{
    type Value = Option<C::Value>;

    fn append(&mut self, v: Option<C::Value>) {
        match v {
            Some(v) => {
                self.nulls.append(0);
                self.values.append(v);
            }
            None => {
                self.nulls.append(1);
                self.values.append(C::Value::default());
            }
        }
    }

    fn row(&self, i: usize) -> Option<C::Value> {
        if self.is_null(i) {
            return None;
        }
        Some(self.values.row(i))
    }
}
