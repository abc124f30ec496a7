//! CSV writer: the usual leaf consumer of a plan's output.
//!
//! Quoting follows the Python `csv` module's levels. `QuoteMinimal` is
//! treated as `QuoteNonNumeric`, which quotes by value type: integers,
//! floats and undefined cells (`na_value`) go out bare, everything else is
//! quoted. Lists and dicts print in their nested form (`[1,"a"]`, `{"k":2}`).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use ::csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};

use blockflow_core::block::RowBlock;
use blockflow_core::types::Value;

use crate::default_column_name;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteLevel {
    QuoteMinimal,
    QuoteAll,
    #[default]
    QuoteNonNumeric,
    QuoteNone,
}

impl QuoteLevel {
    fn style(self) -> QuoteStyle {
        match self {
            QuoteLevel::QuoteAll => QuoteStyle::Always,
            // Non-numeric fields are quoted by `CsvWriter` itself.
            QuoteLevel::QuoteMinimal | QuoteLevel::QuoteNonNumeric => QuoteStyle::Never,
            QuoteLevel::QuoteNone => QuoteStyle::Never,
        }
    }

    fn quotes_by_type(self) -> bool {
        matches!(self, QuoteLevel::QuoteMinimal | QuoteLevel::QuoteNonNumeric)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "minimal" | "quote_minimal" => Some(QuoteLevel::QuoteMinimal),
            "all" | "quote_all" => Some(QuoteLevel::QuoteAll),
            "nonnumeric" | "non_numeric" | "quote_nonnumeric" | "quote_non_numeric" => {
                Some(QuoteLevel::QuoteNonNumeric)
            }
            "none" | "quote_none" => Some(QuoteLevel::QuoteNone),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvWriterOptions {
    pub delimiter: String,
    pub quote_char: char,
    pub escape_char: char,
    /// Write an embedded quote as two quotes instead of escaping it.
    pub double_quote: bool,
    pub line_terminator: String,
    pub quote_level: QuoteLevel,
    pub na_value: String,
    pub header: bool,
}

impl Default for CsvWriterOptions {
    fn default() -> Self {
        Self {
            delimiter: ",".into(),
            quote_char: '"',
            escape_char: '\\',
            double_quote: true,
            line_terminator: "\n".into(),
            quote_level: QuoteLevel::QuoteNonNumeric,
            na_value: String::new(),
            header: true,
        }
    }
}

impl CsvWriterOptions {
    fn builder(&self) -> Result<WriterBuilder> {
        let delimiter = single_byte("delimiter", &self.delimiter)?;
        let quote = ascii("quote_char", self.quote_char)?;
        let escape = ascii("escape_char", self.escape_char)?;
        let terminator = match self.line_terminator.as_str() {
            "\r\n" => Terminator::CRLF,
            other => Terminator::Any(single_byte("line_terminator", other)?),
        };
        let mut b = WriterBuilder::new();
        b.delimiter(delimiter)
            .quote(quote)
            .escape(escape)
            .double_quote(self.double_quote)
            .terminator(terminator)
            .quote_style(self.quote_level.style())
            .has_headers(false)
            .flexible(false);
        Ok(b)
    }

    fn quoter(&self) -> Option<Quoter> {
        self.quote_level.quotes_by_type().then(|| Quoter {
            quote: self.quote_char,
            escape: self.escape_char,
            double_quote: self.double_quote,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Quoter {
    quote: char,
    escape: char,
    double_quote: bool,
}

impl Quoter {
    fn quote(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 2);
        out.push(self.quote);
        for c in text.chars() {
            if c == self.quote {
                out.push(if self.double_quote { self.quote } else { self.escape });
            }
            out.push(c);
        }
        out.push(self.quote);
        out
    }
}

fn single_byte(what: &str, s: &str) -> Result<u8> {
    match s.as_bytes() {
        [b] => Ok(*b),
        _ => Err(Error::Config(format!(
            "{} must be a single byte, got {:?}",
            what, s
        ))),
    }
}

fn ascii(what: &str, c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| Error::Config(format!("{} must be ASCII, got {:?}", what, c)))
}

pub struct CsvWriter<W: Write> {
    inner: ::csv::Writer<W>,
    quoter: Option<Quoter>,
    na_value: String,
    header: bool,
    names: Option<Vec<String>>,
    wrote_header: bool,
    rows: u64,
    fields: Vec<String>,
}

impl CsvWriter<File> {
    pub fn to_path(path: impl AsRef<Path>, options: &CsvWriterOptions) -> Result<Self> {
        let f = File::create(path)?;
        Self::to_writer(f, options)
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn to_writer(writer: W, options: &CsvWriterOptions) -> Result<Self> {
        Ok(Self {
            inner: options.builder()?.from_writer(writer),
            quoter: options.quoter(),
            na_value: options.na_value.clone(),
            header: options.header,
            names: None,
            wrote_header: false,
            rows: 0,
            fields: Vec::new(),
        })
    }

    /// Header names. Without them the header is `X1,X2,...`.
    pub fn with_column_names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn write_block(&mut self, block: &RowBlock) -> Result<()> {
        for row in block.rows() {
            self.write_values(row.iter(), row.len())?;
        }
        Ok(())
    }

    pub fn write_row(&mut self, row: &[Value]) -> Result<()> {
        self.write_values(row.iter(), row.len())
    }

    fn write_values<'a>(
        &mut self,
        values: impl Iterator<Item = &'a Value>,
        width: usize,
    ) -> Result<()> {
        self.ensure_header(width)?;
        self.fields.clear();
        for v in values {
            let field = match (v, &self.quoter) {
                (Value::Undefined, _) => self.na_value.clone(),
                (Value::Integer(_) | Value::Float(_), _) => v.to_string(),
                (other, Some(q)) => q.quote(&other.to_string()),
                (other, None) => other.to_string(),
            };
            self.fields.push(field);
        }
        self.inner.write_record(self.fields.iter().map(|f| f.as_bytes()))?;
        self.rows += 1;
        Ok(())
    }

    fn ensure_header(&mut self, width: usize) -> Result<()> {
        if self.wrote_header || !self.header {
            return Ok(());
        }
        self.wrote_header = true;
        let names: Vec<String> = match &self.names {
            Some(names) => names.clone(),
            None => (0..width).map(default_column_name).collect(),
        };
        match &self.quoter {
            Some(q) => self.inner.write_record(names.iter().map(|n| q.quote(n)))?,
            None => self.inner.write_record(&names)?,
        }
        Ok(())
    }

    /// Flush and hand back the underlying writer. A header is written even
    /// when no rows were, if names were given.
    pub fn finish(mut self) -> Result<W> {
        if let Some(n) = self.names.as_ref().map(Vec::len) {
            self.ensure_header(n)?;
        }
        self.inner.flush()?;
        self.inner
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn render(opts: &CsvWriterOptions, rows: Vec<Vec<Value>>) -> String {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let block = RowBlock::from_rows(width, rows).unwrap();
        let mut w = CsvWriter::to_writer(Vec::new(), opts).unwrap();
        w.write_block(&block).unwrap();
        String::from_utf8(w.finish().unwrap()).unwrap()
    }

    fn sample() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Integer(1), Value::from("a b"), Value::Float(2.5)],
            vec![Value::Integer(2), Value::from("say \"hi\""), Value::Undefined],
        ]
    }

    #[test]
    fn non_numeric_quotes_strings_only() {
        let out = render(&CsvWriterOptions::default(), sample());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "\"X1\",\"X2\",\"X3\"");
        assert_eq!(lines[1], "1,\"a b\",2.5");
        assert_eq!(lines[2], "2,\"say \"\"hi\"\"\",");
    }

    #[test]
    fn non_numeric_quotes_by_value_type() {
        let opts = CsvWriterOptions {
            header: false,
            ..Default::default()
        };
        let row = vec![
            Value::from("42"),
            Value::Integer(42),
            Value::Undefined,
            Value::from(""),
            Value::List(vec![Value::Integer(1)]),
        ];
        assert_eq!(render(&opts, vec![row]), "\"42\",42,,\"\",\"[1]\"\n");

        let escaped = CsvWriterOptions {
            header: false,
            double_quote: false,
            na_value: "NA".into(),
            ..Default::default()
        };
        let out = render(&escaped, vec![vec![Value::from("a\"b"), Value::Undefined]]);
        assert_eq!(out, "\"a\\\"b\",NA\n");
    }

    #[test]
    fn quote_all_and_header_off() {
        let opts = CsvWriterOptions {
            quote_level: QuoteLevel::QuoteAll,
            header: false,
            ..Default::default()
        };
        let out = render(&opts, vec![vec![Value::Integer(1), Value::from("x")]]);
        assert_eq!(out, "\"1\",\"x\"\n");
    }

    #[test]
    fn quote_none_with_null_string_and_delimiter() {
        let opts = CsvWriterOptions {
            quote_level: QuoteLevel::QuoteNone,
            na_value: "NA".into(),
            delimiter: "\t".into(),
            header: false,
            ..Default::default()
        };
        let out = render(&opts, sample());
        assert_eq!(out, "1\ta b\t2.5\n2\tsay \"hi\"\tNA\n");
    }

    #[test]
    fn nested_values() {
        let mut d = BTreeMap::new();
        d.insert("k".to_string(), Value::Integer(2));
        let opts = CsvWriterOptions {
            quote_level: QuoteLevel::QuoteNone,
            header: false,
            ..Default::default()
        };
        let out = render(
            &opts,
            vec![vec![
                Value::List(vec![Value::Integer(1), Value::from("a")]),
                Value::Dict(d),
            ]],
        );
        assert_eq!(out, "[1,\"a\"],{\"k\":2}\n");
    }

    #[test]
    fn crlf_terminator_and_names() {
        let opts = CsvWriterOptions {
            line_terminator: "\r\n".into(),
            quote_level: QuoteLevel::QuoteNone,
            ..Default::default()
        };
        let mut w = CsvWriter::to_writer(Vec::new(), &opts)
            .unwrap()
            .with_column_names(vec!["id".into()]);
        w.write_row(&[Value::Integer(5)]).unwrap();
        assert_eq!(w.rows_written(), 1);
        let out = String::from_utf8(w.finish().unwrap()).unwrap();
        assert_eq!(out, "id\r\n5\r\n");
    }

    #[test]
    fn header_only_when_empty() {
        let opts = CsvWriterOptions {
            quote_level: QuoteLevel::QuoteNone,
            ..Default::default()
        };
        let w = CsvWriter::to_writer(Vec::new(), &opts)
            .unwrap()
            .with_column_names(vec!["a".into(), "b".into()]);
        assert_eq!(String::from_utf8(w.finish().unwrap()).unwrap(), "a,b\n");
    }

    #[test]
    fn bad_delimiter_is_rejected() {
        for delim in ["", "::"] {
            let opts = CsvWriterOptions {
                delimiter: delim.into(),
                ..Default::default()
            };
            assert!(matches!(
                CsvWriter::to_writer(Vec::new(), &opts),
                Err(Error::Config(_))
            ));
        }
        let opts = CsvWriterOptions {
            line_terminator: "ab".into(),
            ..Default::default()
        };
        assert!(CsvWriter::to_writer(Vec::new(), &opts).is_err());
    }

    #[test]
    fn quote_level_names() {
        assert_eq!(QuoteLevel::parse("all"), Some(QuoteLevel::QuoteAll));
        assert_eq!(QuoteLevel::parse("QUOTE_NONE"), Some(QuoteLevel::QuoteNone));
        assert_eq!(QuoteLevel::parse("non-numeric"), Some(QuoteLevel::QuoteNonNumeric));
        assert_eq!(QuoteLevel::parse("sometimes"), None);
    }
}
