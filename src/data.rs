//! Typed cells and in-memory tabular datasets.
//!
//! A [`Dataset`] is the unit every other module exchanges: the query gateway
//! returns one, the snapshot store persists one, and the diff engine compares
//! two. Columns are addressed by name; row order carries no meaning until the
//! aligner sorts it.

use std::{cmp::Ordering, collections::BTreeMap, fmt};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Literal used wherever a null cell has to be shown as text.
pub const NULL_MARKER: &str = "<null>";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
        }
    }

    /// Text form of the cell, `None` for null.
    pub fn as_display(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }

    /// Orders two cells of the same column for row sorting.
    ///
    /// Nulls sort after every other value. Integers and floats compare
    /// numerically; any other pair of different kinds is incomparable.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering, IncomparableValues> {
        let ordering = match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => float_cmp(*a, *b),
            (Value::Integer(a), Value::Float(b)) => float_cmp(*a as f64, *b),
            (Value::Float(a), Value::Integer(b)) => float_cmp(*a, *b as f64),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (left, right) => {
                return Err(IncomparableValues {
                    left: left.type_name(),
                    right: right.type_name(),
                });
            }
        };
        Ok(ordering)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_display() {
            Some(text) => f.write_str(&text),
            None => f.write_str(NULL_MARKER),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot order {left} against {right}")]
pub struct IncomparableValues {
    pub left: &'static str,
    pub right: &'static str,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("row {row} has {found} cell(s) but the dataset has {expected} column(s)")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("row {row} does not have the same columns as the first row")]
    ColumnSetMismatch { row: usize },
}

/// Ordered rows sharing one column list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a dataset without checking row widths. The diff engine reports
    /// ragged input as a comparison fault rather than rejecting it here.
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Builds a dataset from name-keyed rows. Columns come from the first
    /// row in lexical order; every other row must carry the same names.
    pub fn from_records<I>(records: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = BTreeMap<String, Value>>,
    {
        let mut iter = records.into_iter();
        let Some(first) = iter.next() else {
            return Ok(Self::default());
        };
        let columns = first.keys().cloned().collect::<Vec<_>>();
        let mut rows = vec![first.into_values().collect::<Vec<_>>()];
        for (offset, record) in iter.enumerate() {
            if record.len() != columns.len() || !columns.iter().all(|c| record.contains_key(c)) {
                return Err(DataError::ColumnSetMismatch { row: offset + 1 });
            }
            rows.push(record.into_values().collect());
        }
        Ok(Self { columns, rows })
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), DataError> {
        if row.len() != self.columns.len() {
            return Err(DataError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Vec<Value>> {
        &mut self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// A dataset is empty when it has no rows, whatever its columns.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// First cell of the first row, the shape returned by scalar lookups.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d-%H.%M.%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Types a raw cell read from a text source.
///
/// Empty cells are null. Digit strings with a leading zero stay text so that
/// business codes keep their padding. Anything unrecognised is kept verbatim,
/// including surrounding whitespace.
pub fn parse_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if looks_numeric(raw) {
        let unsigned = raw.trim_start_matches(['-', '+']);
        let padded_code = unsigned.len() > 1
            && unsigned.starts_with('0')
            && !unsigned.starts_with("0.");
        if !padded_code {
            if let Ok(parsed) = raw.parse::<i64>() {
                return Value::Integer(parsed);
            }
            if let Ok(parsed) = raw.parse::<f64>() {
                return Value::Float(parsed);
            }
        }
    }
    if let Ok(parsed) = parse_naive_datetime(raw) {
        return Value::DateTime(parsed);
    }
    if let Ok(parsed) = parse_naive_date(raw) {
        return Value::Date(parsed);
    }
    Value::Text(raw.to_string())
}

fn looks_numeric(raw: &str) -> bool {
    raw.chars().any(|c| c.is_ascii_digit())
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
}

/// Numeric order that agrees with `==`, so `-0.0` and `0.0` tie. NaN only
/// reaches here unnormalized and falls back to the total order.
fn float_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}
