//! Result-set decoding into canonical records.
//!
//! Each column carries a declared scan kind (the storage category the driver
//! reports) and each row is coerced, column by column, into the closed value
//! set `{Text, Integer, Float}`. The coercion table is total over arbitrary
//! input: unknown shapes fall back to text and unparsable numerics to zero,
//! so generic tooling never has to handle a decode error per row. The single
//! exception is an unsigned 64-bit value above `i64::MAX`, which aborts the
//! whole decode instead of silently truncating.

use crate::error::DecodeError;
use sqlx::mysql::{MySqlColumn, MySqlRow};
use sqlx::{Column, Row, TypeInfo};

/// Storage category the driver reports for a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Opaque byte sequence: char/text/blob/enum/decimal columns.
    Bytes,
    /// Signed integer of any width.
    Int,
    /// Unsigned integer of any width.
    Uint,
    /// Floating point of any width.
    Float,
    /// Null-capable temporal column (date, time, datetime, timestamp).
    Temporal,
    /// Structured value that is not temporal; coerced as integer.
    Structured,
    /// None of the above; coerced through the text fallback.
    Other,
}

impl ScanKind {
    /// Total mapping from the driver-reported column type name.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "BINARY"
            | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "ENUM" | "SET"
            | "DECIMAL" | "BIT" => ScanKind::Bytes,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" | "BOOLEAN" => {
                ScanKind::Int
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => ScanKind::Uint,
            "FLOAT" | "DOUBLE" => ScanKind::Float,
            "DATE" | "TIME" | "DATETIME" | "TIMESTAMP" => ScanKind::Temporal,
            _ => ScanKind::Other,
        }
    }
}

/// Column name plus declared scan kind, as read off a result cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ScanKind,
}

/// Raw driver value for one column, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bytes(Vec<u8>),
    Int(i64),
    Uint(u64),
    Float(f64),
}

/// A coerced value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Ordered column-name to value mapping for one row.
///
/// Insertion order follows column order; inserting under an existing name
/// overwrites the earlier value in place (last write wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

/// Coerce one raw value by its column's declared scan kind. Pure and
/// deterministic; fails only on unsigned overflow.
pub fn coerce(kind: ScanKind, column: &str, raw: &RawValue) -> Result<Value, DecodeError> {
    match kind {
        ScanKind::Bytes | ScanKind::Temporal | ScanKind::Other => Ok(Value::Text(coerce_text(raw))),
        ScanKind::Int | ScanKind::Uint | ScanKind::Structured => {
            Ok(Value::Integer(coerce_int(column, raw)?))
        }
        ScanKind::Float => Ok(Value::Float(coerce_float(raw))),
    }
}

fn coerce_text(raw: &RawValue) -> String {
    match raw {
        RawValue::Null => String::new(),
        RawValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        RawValue::Int(i) => i.to_string(),
        RawValue::Uint(u) => u.to_string(),
        RawValue::Float(f) => f.to_string(),
    }
}

fn coerce_int(column: &str, raw: &RawValue) -> Result<i64, DecodeError> {
    match raw {
        RawValue::Null => Ok(0),
        RawValue::Int(i) => Ok(*i),
        RawValue::Uint(u) => {
            if *u > i64::MAX as u64 {
                Err(DecodeError::UnsignedOverflow {
                    column: column.to_string(),
                    value: *u,
                })
            } else {
                Ok(*u as i64)
            }
        }
        RawValue::Bytes(b) => Ok(parse_int_text(&String::from_utf8_lossy(b))),
        // A float arriving where an integer was declared coerces to zero
        // rather than rounding; legacy behavior kept as-is.
        RawValue::Float(_) => Ok(0),
    }
}

fn coerce_float(raw: &RawValue) -> f64 {
    match raw {
        // Byte input is routed through the integer parser, dropping the
        // fractional digits of values like "123.45". Compatibility quirk,
        // kept deliberately; see DESIGN.md before changing it.
        RawValue::Bytes(b) => parse_int_text(&String::from_utf8_lossy(b)) as f64,
        RawValue::Float(f) => *f,
        RawValue::Null | RawValue::Int(_) | RawValue::Uint(_) => 0.0,
    }
}

/// Integer parse over arbitrary text: truncate at the first decimal point,
/// treat empty and unparsable input as zero.
fn parse_int_text(text: &str) -> i64 {
    let head = match text.split_once('.') {
        Some((head, _)) => head,
        None => text,
    };
    if head.is_empty() {
        return 0;
    }
    head.parse().unwrap_or(0)
}

/// Coerce one row's worth of raw values into a canonical record.
pub fn decode_fields(columns: &[ColumnInfo], raws: &[RawValue]) -> Result<Record, DecodeError> {
    let mut record = Record::new();
    for (column, raw) in columns.iter().zip(raws) {
        let value = coerce(column.kind, &column.name, raw)?;
        record.insert(&column.name, value);
    }
    Ok(record)
}

// ============================================================================
// sqlx adapter: (name, scan kind, raw value) triples from driver rows
// ============================================================================

pub(crate) fn column_info(row: &MySqlRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            kind: ScanKind::from_type_name(col.type_info().name()),
        })
        .collect()
}

/// Decode one driver row. An extraction failure anywhere in the row is a soft
/// error: logged, and every field of the row defaults to its zero coercion.
pub(crate) fn decode_row(row: &MySqlRow) -> Result<Record, DecodeError> {
    let columns = column_info(row);
    let raws = match extract_row(row, &columns) {
        Ok(raws) => raws,
        Err(e) => {
            tracing::warn!("row scan failed, fields default to zero values: {}", e);
            vec![RawValue::Null; columns.len()]
        }
    };
    decode_fields(&columns, &raws)
}

fn extract_row(row: &MySqlRow, columns: &[ColumnInfo]) -> Result<Vec<RawValue>, sqlx::Error> {
    row.columns()
        .iter()
        .zip(columns)
        .map(|(col, info)| extract_raw(row, col, info.kind))
        .collect()
}

fn extract_raw(
    row: &MySqlRow,
    col: &MySqlColumn,
    kind: ScanKind,
) -> Result<RawValue, sqlx::Error> {
    let idx = col.ordinal();
    let raw = match kind {
        ScanKind::Bytes => match row.try_get::<Option<Vec<u8>>, _>(idx) {
            Ok(v) => v.map(RawValue::Bytes).unwrap_or(RawValue::Null),
            // DECIMAL and some collated text columns only decode as strings.
            Err(_) => row
                .try_get::<Option<String>, _>(idx)?
                .map(|s| RawValue::Bytes(s.into_bytes()))
                .unwrap_or(RawValue::Null),
        },
        ScanKind::Int => row
            .try_get::<Option<i64>, _>(idx)?
            .map(RawValue::Int)
            .unwrap_or(RawValue::Null),
        ScanKind::Uint => row
            .try_get::<Option<u64>, _>(idx)?
            .map(RawValue::Uint)
            .unwrap_or(RawValue::Null),
        ScanKind::Float => row
            .try_get::<Option<f64>, _>(idx)?
            .map(RawValue::Float)
            .unwrap_or(RawValue::Null),
        ScanKind::Temporal => extract_temporal(row, idx)?,
        ScanKind::Structured | ScanKind::Other => extract_fallback(row, idx)?,
    };
    Ok(raw)
}

/// Temporal columns are rendered the way the text protocol would print them,
/// so the downstream text coercion sees `2024-01-31 12:00:00` style bytes.
fn extract_temporal(row: &MySqlRow, idx: usize) -> Result<RawValue, sqlx::Error> {
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return Ok(v
            .map(|dt| text_bytes(dt.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or(RawValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return Ok(v
            .map(|dt| text_bytes(dt.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or(RawValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return Ok(v
            .map(|d| text_bytes(d.format("%Y-%m-%d")))
            .unwrap_or(RawValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return Ok(v
            .map(|t| text_bytes(t.format("%H:%M:%S")))
            .unwrap_or(RawValue::Null));
    }
    row.try_get::<Option<String>, _>(idx)
        .map(|v| v.map(|s| RawValue::Bytes(s.into_bytes())).unwrap_or(RawValue::Null))
}

fn text_bytes(formatted: impl std::fmt::Display) -> RawValue {
    RawValue::Bytes(formatted.to_string().into_bytes())
}

fn extract_fallback(row: &MySqlRow, idx: usize) -> Result<RawValue, sqlx::Error> {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return Ok(v.map(|s| RawValue::Bytes(s.into_bytes())).unwrap_or(RawValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return Ok(v.map(RawValue::Bytes).unwrap_or(RawValue::Null));
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return Ok(v.map(RawValue::Int).unwrap_or(RawValue::Null));
    }
    row.try_get::<Option<f64>, _>(idx)
        .map(|v| v.map(RawValue::Float).unwrap_or(RawValue::Null))
}
