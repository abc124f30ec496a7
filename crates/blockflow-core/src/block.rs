//! Row blocks: the unit of data exchanged between operators.
//!
//! A block is a set of equally long columns of `Value`. Blocks carry no
//! schema; the column count is whatever the last `resize` set.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::TypeTag;
use crate::types::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowBlock {
    columns: Vec<Column>,
    rows: usize,
}

impl RowBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A block of `columns` x `rows` undefined cells.
    pub fn with_shape(columns: usize, rows: usize) -> Self {
        let mut b = Self::new();
        b.resize(columns, rows);
        b
    }

    pub fn from_columns(columns: Vec<Vec<Value>>) -> Result<Self> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().position(|c| c.len() != rows) {
            return Err(Error::Invariant(format!(
                "column {} has {} rows, expected {}",
                bad,
                columns[bad].len(),
                rows
            )));
        }
        Ok(Self {
            columns: columns.into_iter().map(|values| Column { values }).collect(),
            rows,
        })
    }

    pub fn from_rows<I>(num_columns: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut b = Self::with_shape(num_columns, 0);
        for row in rows {
            b.push_row(row)?;
        }
        Ok(b)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Set both dimensions. Cells that come into existence are undefined.
    pub fn resize(&mut self, columns: usize, rows: usize) {
        self.columns.resize_with(columns, Column::default);
        for col in &mut self.columns {
            col.values.resize(rows, Value::Undefined);
        }
        self.rows = rows;
    }

    /// Shrink the row count; never grows.
    pub fn truncate(&mut self, rows: usize) {
        if rows >= self.rows {
            return;
        }
        for col in &mut self.columns {
            col.values.truncate(rows);
        }
        self.rows = rows;
    }

    /// Drop all rows but keep the columns and their allocations.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    pub fn value(&self, row: usize, column: usize) -> &Value {
        &self.columns[column].values[row]
    }

    pub fn set_value(&mut self, row: usize, column: usize, value: Value) {
        self.columns[column].values[row] = value;
    }

    pub fn column(&self, index: usize) -> &[Value] {
        &self.columns[index].values
    }

    pub fn column_mut(&mut self, index: usize) -> &mut Vec<Value> {
        &mut self.columns[index].values
    }

    pub fn row(&self, index: usize) -> RowRef<'_> {
        RowRef { block: self, index }
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> + '_ {
        (0..self.rows).map(move |index| RowRef { block: self, index })
    }

    /// Overwrite row `index` with `row`, which must have one value per column.
    pub fn set_row(&mut self, index: usize, row: &[Value]) -> Result<()> {
        if row.len() != self.num_columns() {
            return Err(Error::Invariant(format!(
                "row has {} values, block has {} columns",
                row.len(),
                self.num_columns()
            )));
        }
        if index >= self.rows {
            return Err(Error::Invariant(format!(
                "row {} out of range ({} rows)",
                index, self.rows
            )));
        }
        for (col, v) in self.columns.iter_mut().zip(row) {
            col.values[index] = v.clone();
        }
        Ok(())
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.num_columns() {
            return Err(Error::Invariant(format!(
                "row has {} values, block has {} columns",
                row.len(),
                self.num_columns()
            )));
        }
        for (col, v) in self.columns.iter_mut().zip(row) {
            col.values.push(v);
        }
        self.rows += 1;
        Ok(())
    }

    /// Copy one row of `src` into row `dst_row` of this block, column by column.
    pub fn copy_row_from(&mut self, dst_row: usize, src: &RowBlock, src_row: usize) {
        debug_assert_eq!(self.num_columns(), src.num_columns());
        for (dst, s) in self.columns.iter_mut().zip(&src.columns) {
            dst.values[dst_row] = s.values[src_row].clone();
        }
    }

    /// Copy `n` rows of every column of `src`, starting at `src_row`, into
    /// this block at `dst_row`, placing them from column `dst_col` onwards.
    pub fn copy_range_from(
        &mut self,
        dst_row: usize,
        dst_col: usize,
        src: &RowBlock,
        src_row: usize,
        n: usize,
    ) {
        for (offset, s) in src.columns.iter().enumerate() {
            let dst = &mut self.columns[dst_col + offset].values;
            dst[dst_row..dst_row + n].clone_from_slice(&s.values[src_row..src_row + n]);
        }
    }

    /// Per column, the tag of the first defined value (`Undefined` if none).
    pub fn column_types(&self) -> Vec<TypeTag> {
        self.columns
            .iter()
            .map(|c| {
                c.values
                    .iter()
                    .find(|v| !v.is_undefined())
                    .map(Value::type_tag)
                    .unwrap_or(TypeTag::Undefined)
            })
            .collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        self.rows().map(|r| r.to_vec()).collect()
    }
}

/// Borrowed view of one row.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    block: &'a RowBlock,
    index: usize,
}

impl<'a> RowRef<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.block.num_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, column: usize) -> &'a Value {
        self.block.value(self.index, column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Value> + 'a {
        let block = self.block;
        let index = self.index;
        block.columns.iter().map(move |c| &c.values[index])
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.iter().cloned().collect()
    }
}
