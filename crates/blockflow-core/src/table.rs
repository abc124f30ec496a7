//! In-memory typed table used as the backing store of `Source` nodes.

use crate::block::RowBlock;
use crate::error::{Error, Result};
use crate::schema::TypeTag;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    types: Vec<TypeTag>,
    data: RowBlock,
}

impl MemoryTable {
    /// Every defined cell must carry its column's declared tag.
    pub fn new(types: Vec<TypeTag>, data: RowBlock) -> Result<Self> {
        if types.len() != data.num_columns() {
            return Err(Error::TypeMismatch(format!(
                "table declares {} columns, data has {}",
                types.len(),
                data.num_columns()
            )));
        }
        for (c, tag) in types.iter().enumerate() {
            if *tag == TypeTag::Undefined {
                continue;
            }
            if let Some(row) = data
                .column(c)
                .iter()
                .position(|v| !v.is_undefined() && v.type_tag() != *tag)
            {
                return Err(Error::TypeMismatch(format!(
                    "column {} declared {} but row {} holds {}",
                    c,
                    tag,
                    row,
                    data.value(row, c).type_tag()
                )));
            }
        }
        Ok(Self { types, data })
    }

    /// Build a table whose types come from the data itself.
    pub fn infer(data: RowBlock) -> Self {
        Self {
            types: data.column_types(),
            data,
        }
    }

    pub fn types(&self) -> &[TypeTag] {
        &self.types
    }

    pub fn data(&self) -> &RowBlock {
        &self.data
    }

    pub fn num_rows(&self) -> usize {
        self.data.num_rows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn declared_types_checked() {
        let data = RowBlock::from_rows(1, vec![vec![Value::Integer(1)], vec![Value::Undefined]])
            .unwrap();
        assert!(MemoryTable::new(vec![TypeTag::Integer], data.clone()).is_ok());
        let err = MemoryTable::new(vec![TypeTag::String], data.clone()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
        assert!(MemoryTable::new(vec![], data).is_err());
    }
}
