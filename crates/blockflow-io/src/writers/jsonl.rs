//! Streaming NDJSON writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value as Json};

use blockflow_core::block::RowBlock;
use blockflow_core::types::Value;

use crate::default_column_name;
use crate::error::Result;

pub struct JsonlWriter<W: Write> {
    writer: BufWriter<W>,
    // key order is fixed by the first block written
    columns: Vec<String>,
    rows: u64,
}

impl JsonlWriter<File> {
    pub fn to_path(path: impl AsRef<Path>, columns: Option<Vec<String>>) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self::to_writer(f, columns))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn to_writer(writer: W, columns: Option<Vec<String>>) -> Self {
        Self {
            writer: BufWriter::new(writer),
            columns: columns.unwrap_or_default(),
            rows: 0,
        }
    }

    /// Write a block as one JSON object per row.
    /// Without names, keys are `X1`, `X2`, ...
    pub fn write_block(&mut self, block: &RowBlock) -> Result<()> {
        if self.columns.len() < block.num_columns() {
            let start = self.columns.len();
            self.columns
                .extend((start..block.num_columns()).map(default_column_name));
        }
        for row in block.rows() {
            let mut obj = Map::new();
            for (name, v) in self.columns.iter().zip(row.iter()) {
                obj.insert(name.clone(), value_to_json(v));
            }
            serde_json::to_writer(&mut self.writer, &obj)?;
            self.writer.write_all(b"\n")?;
            self.rows += 1;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::Error::Io(e.into_error()))
    }
}

/// Plain JSON for a value. Non-finite floats become `null`; bytes become a
/// `0x` hex string; date-times and images use their display form.
pub fn value_to_json(v: &Value) -> Json {
    match v {
        Value::Undefined => Json::Null,
        Value::Integer(i) => Json::from(*i),
        Value::Float(f) => Json::from(*f),
        Value::Str(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Dict(m) => Json::Object(
            m.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        other @ (Value::Bytes(_) | Value::DateTime(_) | Value::Image(_)) => {
            Json::String(other.to_string())
        }
    }
}
