//! Rectangular chunk of named, typed columns.
use super::{
    Buffer, Feature, Reader,
    column::{Column, ColumnType, new_column},
};
use crate::error::{Context, Error, Result};

/// Aggregation metadata written ahead of the columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub overflows: bool,
    pub bucket: i32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self {
            overflows: false,
            bucket: -1,
        }
    }
}

impl BlockInfo {
    pub fn encode(&self, b: &mut Buffer) {
        b.put_uvarint(1);
        b.put_bool(self.overflows);
        b.put_uvarint(2);
        b.put_i32(self.bucket);
        b.put_uvarint(0);
    }

    pub fn decode(&mut self, r: &mut Reader<'_>) -> Result<()> {
        loop {
            match r.uvarint().context("field")? {
                0 => return Ok(()),
                1 => self.overflows = r.bool().context("overflows")?,
                2 => self.bucket = r.i32().context("bucket")?,
                field => {
                    return Err(Error::InvalidData(format!("unknown block info field {field}")));
                }
            }
        }
    }
}

pub struct BlockColumn {
    pub name: String,
    /// Type tag as declared on the wire, which may carry parameters the
    /// column itself does not keep (enum mappings).
    pub column_type: ColumnType,
    pub data: Box<dyn Column>,
}

impl BlockColumn {
    /// Typed view of the column data.
    pub fn get<C: Column>(&self) -> Option<&C> {
        self.data.as_any().downcast_ref()
    }
}

impl std::fmt::Debug for BlockColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockColumn")
            .field("name", &self.name)
            .field("column_type", &self.column_type)
            .field("rows", &self.data.rows())
            .finish()
    }
}

/// Ordered columns sharing one row count.
#[derive(Debug, Default)]
pub struct Block {
    pub info: BlockInfo,
    columns: Vec<BlockColumn>,
    rows: usize,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[BlockColumn] {
        &self.columns
    }

    /// Mutable access to the columns. Row counts are checked again on encode.
    pub fn columns_mut(&mut self) -> &mut [BlockColumn] {
        &mut self.columns
    }

    pub fn column(&self, name: &str) -> Option<&BlockColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// A block without columns and rows terminates a data stream.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows == 0
    }

    pub fn add_column<C: Column>(&mut self, name: impl Into<String>, data: C) -> Result<()> {
        self.add_boxed(name, Box::new(data))
    }

    pub fn add_boxed(&mut self, name: impl Into<String>, data: Box<dyn Column>) -> Result<()> {
        let name = name.into();
        if self.columns.is_empty() {
            self.rows = data.rows();
        } else if data.rows() != self.rows {
            return Err(Error::RowCountMismatch {
                column: name,
                expected: self.rows,
                got: data.rows(),
            });
        }
        self.columns.push(BlockColumn {
            name,
            column_type: data.column_type(),
            data,
        });
        Ok(())
    }

    /// Empties every column, keeping names, types and capacity.
    pub fn reset(&mut self) {
        for col in &mut self.columns {
            col.data.reset();
        }
        self.rows = 0;
    }

    pub fn encode(&self, b: &mut Buffer, revision: u64) -> Result<()> {
        if Feature::BlockInfo.in_version(revision) {
            self.info.encode(b);
        }
        b.put_int(self.columns.len());
        b.put_int(self.rows);
        for col in &self.columns {
            if col.data.rows() != self.rows {
                return Err(Error::RowCountMismatch {
                    column: col.name.clone(),
                    expected: self.rows,
                    got: col.data.rows(),
                });
            }
            b.put_string(&col.name);
            b.put_string(col.column_type.as_str());
            if Feature::CustomSerialization.in_version(revision) {
                b.put_bool(false);
            }
            col.data.encode_state(b);
            col.data.encode_column(b);
        }
        Ok(())
    }

    /// Replaces the contents with a block read from `r`. Columns whose type
    /// matches the incoming one are reset and reused.
    pub fn decode(&mut self, r: &mut Reader<'_>, revision: u64) -> Result<()> {
        if Feature::BlockInfo.in_version(revision) {
            self.info.decode(r).context("block info")?;
        }
        let count = r.int().context("column count")?;
        let rows = r.int().context("row count")?;

        let mut prev = std::mem::take(&mut self.columns).into_iter();
        self.rows = rows;
        for i in 0..count {
            let name = r.str().with_context(|| format!("column {i}: name"))?;
            let column_type = ColumnType::new(
                r.str()
                    .with_context(|| format!("column {name:?}: type"))?,
            );
            if Feature::CustomSerialization.in_version(revision)
                && r.bool().with_context(|| format!("column {name:?}: serialization"))?
            {
                return Err(Error::NotImplemented(format!(
                    "custom serialization of column {name:?}"
                )));
            }

            let mut data = match prev.next() {
                Some(col) if col.column_type == column_type => {
                    let mut data = col.data;
                    data.reset();
                    data
                }
                _ => new_column(&column_type).with_context(|| format!("column {name:?}"))?,
            };
            data.decode_state(r)
                .with_context(|| format!("column {name:?}: state"))?;
            data.decode_column(r, rows)
                .with_context(|| format!("column {name:?}"))?;
            if data.rows() != rows {
                return Err(Error::RowCountMismatch {
                    column: name,
                    expected: rows,
                    got: data.rows(),
                });
            }
            self.columns.push(BlockColumn {
                name,
                column_type,
                data,
            });
        }
        Ok(())
    }
}
