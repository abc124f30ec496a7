//! The tagged value model.
//!
//! `Value` is the single cell type carried by row blocks and planner
//! parameters. Equality and ordering are total across all tags so values can
//! be sorted and compared without caring what they hold:
//! undefined sorts first, different tags order by tag, NaN equals itself and
//! sorts after every other float.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::schema::TypeTag;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Undefined,
    Integer(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    DateTime(DateTime),
    Image(Image),
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Undefined => TypeTag::Undefined,
            Value::Integer(_) => TypeTag::Integer,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::String,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::List(_) => TypeTag::List,
            Value::Dict(_) => TypeTag::Dict,
            Value::DateTime(_) => TypeTag::DateTime,
            Value::Image(_) => TypeTag::Image,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Truthiness used by mask columns: zero, empty, and undefined are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(v) => !v.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::DateTime(_) => true,
            Value::Image(img) => !img.data.is_empty(),
        }
    }

    /// Convert into `tag` when the conversion is lossless; undefined converts
    /// to every tag.
    pub fn coerce_to(&self, tag: TypeTag) -> Option<Value> {
        if self.type_tag() == tag || self.is_undefined() {
            return Some(self.clone());
        }
        match (self, tag) {
            (Value::Integer(i), TypeTag::Float) => Some(Value::Float(*i as f64)),
            (Value::Float(f), TypeTag::Integer)
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 =>
            {
                Some(Value::Integer(*f as i64))
            }
            (Value::Integer(_) | Value::Float(_), TypeTag::String) => {
                Some(Value::Str(self.to_string()))
            }
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Integer(_) => 1,
            Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::Bytes(_) => 4,
            Value::List(_) => 5,
            Value::Dict(_) => 6,
            Value::DateTime(_) => 7,
            Value::Image(_) => 8,
        }
    }

    /// Format for use inside a container: strings are quoted and escaped.
    pub fn write_nested(&self, out: &mut String) {
        match self {
            Value::Str(s) => {
                out.push('"');
                for ch in s.chars() {
                    if ch == '"' || ch == '\\' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('"');
            }
            Value::List(items) => {
                out.push('[');
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    v.write_nested(out);
                }
                out.push(']');
            }
            Value::Dict(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    Value::Str(k.clone()).write_nested(out);
                    out.push(':');
                    v.write_nested(out);
                }
                out.push('}');
            }
            other => {
                let _ = write!(out, "{}", other);
            }
        }
    }
}

fn float_cmp(x: f64, y: f64) -> Ordering {
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Undefined, Undefined) => Ordering::Equal,
            (Integer(x), Integer(y)) => x.cmp(y),
            (Float(x), Float(y)) => float_cmp(*x, *y),
            (Str(x), Str(y)) => x.cmp(y),
            (Bytes(x), Bytes(y)) => x.cmp(y),
            (List(x), List(y)) => x.iter().cmp(y.iter()),
            (Dict(x), Dict(y)) => x.iter().cmp(y.iter()),
            (DateTime(x), DateTime(y)) => x.cmp(y),
            (Image(x), Image(y)) => x.cmp(y),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

fn fmt_float(f: f64, out: &mut fmt::Formatter<'_>) -> fmt::Result {
    if f.is_nan() {
        out.write_str("nan")
    } else if f.is_infinite() {
        out.write_str(if f > 0.0 { "inf" } else { "-inf" })
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        write!(out, "{:.1}", f)
    } else {
        write!(out, "{}", f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("null"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => fmt_float(*x, f),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::List(_) | Value::Dict(_) => {
                let mut s = String::new();
                self.write_nested(&mut s);
                f.write_str(&s)
            }
            Value::DateTime(dt) => write!(f, "{}", dt),
            Value::Image(img) => write!(f, "{}", img),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Self {
        Value::DateTime(v)
    }
}

/// Instant with microsecond precision and a display timezone
/// (offset in quarter hours from UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateTime {
    pub posix_seconds: i64,
    pub microsecond: u32,
    pub tz_quarter_hours: i8,
}

impl DateTime {
    pub fn new(posix_seconds: i64, microsecond: u32) -> Self {
        Self {
            posix_seconds,
            microsecond: microsecond.min(999_999),
            tz_quarter_hours: 0,
        }
    }

    pub fn with_tz(mut self, tz_quarter_hours: i8) -> Self {
        self.tz_quarter_hours = tz_quarter_hours;
        self
    }
}

/// Days since 1970-01-01 to (year, month, day) in the proleptic Gregorian calendar.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe as i64 + era * 400;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offset_secs = self.tz_quarter_hours as i64 * 15 * 60;
        let local = self.posix_seconds + offset_secs;
        let (y, m, d) = civil_from_days(local.div_euclid(86_400));
        let secs = local.rem_euclid(86_400);
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            y,
            m,
            d,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        )?;
        if self.microsecond > 0 {
            write!(f, ".{:06}", self.microsecond)?;
        }
        if self.tz_quarter_hours == 0 {
            f.write_str("Z")
        } else {
            let sign = if offset_secs < 0 { '-' } else { '+' };
            let abs = offset_secs.abs();
            write!(f, "{}{:02}:{:02}", sign, abs / 3600, (abs / 60) % 60)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImageFormat {
    Raw,
    Jpeg,
    Png,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Image {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Image({:?} {}x{}x{})",
            self.format, self.width, self.height, self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_across_tags() {
        let mut vals = vec![
            Value::Str("b".into()),
            Value::Float(f64::NAN),
            Value::Integer(3),
            Value::Undefined,
            Value::Float(-1.5),
            Value::List(vec![Value::Integer(1)]),
        ];
        vals.sort();
        assert_eq!(vals[0], Value::Undefined);
        assert_eq!(vals[1], Value::Integer(3));
        assert_eq!(vals[2], Value::Float(-1.5));
        assert!(matches!(vals[3], Value::Float(f) if f.is_nan()));
        assert_eq!(vals[4], Value::Str("b".into()));
        assert_eq!(vals[5].type_tag(), TypeTag::List);
    }

    #[test]
    fn nan_equals_itself() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn nested_display_quotes_strings() {
        let mut dict = BTreeMap::new();
        dict.insert("k".to_string(), Value::List(vec![1.into(), "x".into()]));
        assert_eq!(Value::Dict(dict).to_string(), r#"{"k":[1,"x"]}"#);
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
    }

    #[test]
    fn coercion_is_lossless_only() {
        assert_eq!(
            Value::Integer(2).coerce_to(TypeTag::Float),
            Some(Value::Float(2.0))
        );
        assert_eq!(
            Value::Float(2.0).coerce_to(TypeTag::Integer),
            Some(Value::Integer(2))
        );
        assert_eq!(Value::Float(2.5).coerce_to(TypeTag::Integer), None);
        assert_eq!(
            Value::Undefined.coerce_to(TypeTag::Image),
            Some(Value::Undefined)
        );
        assert_eq!(Value::Str("1".into()).coerce_to(TypeTag::Integer), None);
    }

    #[test]
    fn datetime_display() {
        assert_eq!(DateTime::new(0, 0).to_string(), "1970-01-01T00:00:00Z");
        assert_eq!(
            DateTime::new(951_782_400, 250).to_string(),
            "2000-02-29T00:00:00.000250Z"
        );
        assert_eq!(
            DateTime::new(0, 0).with_tz(-20).to_string(),
            "1969-12-31T19:00:00-05:00"
        );
    }

    #[test]
    fn serde_roundtrip_keeps_tag() {
        let v = Value::List(vec![Value::Integer(1), Value::Str("a".into())]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.type_tag(), TypeTag::List);
    }
}
