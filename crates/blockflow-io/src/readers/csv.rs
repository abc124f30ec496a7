//! Typed CSV reader producing a `MemoryTable`.
//!
//! Column types are either declared or inferred: a column is `integer` if
//! every non-empty cell parses as i64, else `float` if every one parses as
//! f64, else `string`. Empty cells (or `na_values`) are undefined.

use std::io::Read;
use std::path::Path;

use ::csv::{ReaderBuilder, StringRecord};

use blockflow_core::block::RowBlock;
use blockflow_core::schema::TypeTag;
use blockflow_core::table::MemoryTable;
use blockflow_core::types::Value;

use crate::default_column_name;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CsvReadOptions {
    pub delimiter: u8,
    pub header: bool,
    pub types: Option<Vec<TypeTag>>,
    /// Cell contents read as undefined, besides the empty string.
    pub na_values: Vec<String>,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            header: true,
            types: None,
            na_values: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub names: Vec<String>,
    pub table: MemoryTable,
}

pub fn read_csv_table(path: impl AsRef<Path>, options: &CsvReadOptions) -> Result<LoadedTable> {
    let f = std::fs::File::open(path)?;
    read_csv(f, options)
}

pub fn read_csv<R: Read>(reader: R, options: &CsvReadOptions) -> Result<LoadedTable> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(options.header)
        .from_reader(reader);

    let mut records: Vec<StringRecord> = Vec::new();
    for r in rdr.records() {
        records.push(r?);
    }

    let width = match (&options.types, records.first()) {
        (Some(t), _) => t.len(),
        (None, Some(r)) => r.len(),
        (None, None) if options.header => rdr.headers()?.len(),
        (None, None) => 0,
    };

    let names: Vec<String> = if options.header {
        let h = rdr.headers()?;
        if h.len() != width {
            return Err(Error::Config(format!(
                "header has {} columns, expected {}",
                h.len(),
                width
            )));
        }
        h.iter().map(str::to_string).collect()
    } else {
        (0..width).map(default_column_name).collect()
    };

    let is_na = |s: &str| s.is_empty() || options.na_values.iter().any(|n| n == s);

    let types = match &options.types {
        Some(t) => t.clone(),
        None => (0..width)
            .map(|c| infer_column(records.iter().filter_map(|r| r.get(c)), &is_na))
            .collect(),
    };

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(records.len()); width];
    for (i, rec) in records.iter().enumerate() {
        let line = rec.position().map(|p| p.line()).unwrap_or(i as u64 + 1);
        if rec.len() != width {
            return Err(Error::Parse {
                line,
                column: rec.len(),
                message: format!("expected {} fields, got {}", width, rec.len()),
            });
        }
        for (c, (cell, tag)) in rec.iter().zip(&types).enumerate() {
            let v = if is_na(cell) {
                Value::Undefined
            } else {
                parse_cell(cell, *tag).map_err(|message| Error::Parse {
                    line,
                    column: c,
                    message,
                })?
            };
            columns[c].push(v);
        }
    }

    let block = RowBlock::from_columns(columns)?;
    Ok(LoadedTable {
        names,
        table: MemoryTable::new(types, block)?,
    })
}

fn infer_column<'a>(
    cells: impl Iterator<Item = &'a str>,
    is_na: &dyn Fn(&str) -> bool,
) -> TypeTag {
    let mut present = cells.filter(|s| !is_na(*s)).peekable();
    if present.peek().is_none() {
        return TypeTag::String;
    }
    let mut int = true;
    let mut float = true;
    for s in present {
        if int && s.trim().parse::<i64>().is_err() {
            int = false;
        }
        if !int && s.trim().parse::<f64>().is_err() {
            float = false;
            break;
        }
    }
    if int {
        TypeTag::Integer
    } else if float {
        TypeTag::Float
    } else {
        TypeTag::String
    }
}

fn parse_cell(cell: &str, tag: TypeTag) -> std::result::Result<Value, String> {
    match tag {
        TypeTag::Integer => cell
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| format!("{:?} is not an integer: {}", cell, e)),
        TypeTag::Float => cell
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("{:?} is not a float: {}", cell, e)),
        TypeTag::String | TypeTag::Undefined => Ok(Value::Str(cell.to_string())),
        other => Err(format!("cannot read {} columns from CSV", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn infers_types() {
        let data = "id,score,name\n1,2.5,ann\n2,,bob\n3,4,\n";
        let t = read_csv(data.as_bytes(), &CsvReadOptions::default()).unwrap();
        assert_eq!(t.names, vec!["id", "score", "name"]);
        assert_eq!(
            t.table.types(),
            &[TypeTag::Integer, TypeTag::Float, TypeTag::String]
        );
        let d = t.table.data();
        assert_eq!(d.num_rows(), 3);
        assert_eq!(d.value(1, 1), &Value::Undefined);
        assert_eq!(d.value(2, 1), &Value::Float(4.0));
        assert_eq!(d.value(2, 2), &Value::Undefined);
    }

    #[test]
    fn declared_types_are_enforced() {
        let opts = CsvReadOptions {
            header: false,
            types: Some(vec![TypeTag::Integer]),
            ..Default::default()
        };
        let err = read_csv("1\nx\n".as_bytes(), &opts).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, column: 0, .. }));
    }

    #[test]
    fn na_values_and_delimiter() {
        let opts = CsvReadOptions {
            delimiter: b';',
            na_values: vec!["NA".into()],
            ..Default::default()
        };
        let t = read_csv("a;b\n1;NA\nNA;x\n".as_bytes(), &opts).unwrap();
        assert_eq!(t.table.types(), &[TypeTag::Integer, TypeTag::String]);
        assert_eq!(t.table.data().value(0, 1), &Value::Undefined);
        assert_eq!(t.table.data().value(1, 0), &Value::Undefined);
    }

    #[test]
    fn ragged_rows_fail() {
        let err = read_csv("a,b\n1,2\n3\n".as_bytes(), &CsvReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Csv(_) | Error::Parse { .. }));
    }

    #[test]
    fn reads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "x").unwrap();
        writeln!(f, "7").unwrap();
        let t = read_csv_table(f.path(), &CsvReadOptions::default()).unwrap();
        assert_eq!(t.table.num_rows(), 1);
        assert_eq!(t.table.data().value(0, 0), &Value::Integer(7));
    }
}
