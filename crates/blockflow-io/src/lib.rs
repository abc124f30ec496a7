#![forbid(unsafe_code)]
//! blockflow-io: leaf consumers and producers for row blocks.
//!
//! - `writers::csv`: configurable CSV writer (quote level, null string, header).
//! - `writers::jsonl`: one JSON object per row.
//! - `readers::csv`: loads a CSV file into a typed `MemoryTable` for `Source`.

pub mod error;
pub mod readers;
pub mod writers;

pub use error::{Error, Result};
pub use readers::csv::{read_csv_table, CsvReadOptions, LoadedTable};
pub use writers::csv::{CsvWriter, CsvWriterOptions, QuoteLevel};
pub use writers::jsonl::JsonlWriter;

/// Default name of column `i` when none is given: `X1`, `X2`, ...
pub fn default_column_name(i: usize) -> String {
    format!("X{}", i + 1)
}
