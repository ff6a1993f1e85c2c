use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::OUTPUT_DATE_FORMAT;

/// A cell value. Everything starts as `Text`; other variants only appear after
/// an explicit cast.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    /// No value, e.g. a regex extraction that found nothing.
    Absent,
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Render the value for output, using `absent` for `Value::Absent`.
    pub fn render(&self, absent: &str) -> String {
        match self {
            Value::Absent => absent.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Date(d) => write!(f, "{}", d.format(OUTPUT_DATE_FORMAT)),
            Value::Absent => Ok(()),
        }
    }
}

/// Target type of a cast. In TOML: `"integer"`, `"float"` or `{ date = "%B. %d, %Y" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Integer,
    Float,
    Date(String),
}

impl CastType {
    /// Parse `raw` (trimmed) as this type. Returns `None` on mismatch; the caller
    /// owns the error context.
    pub fn parse(&self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            CastType::Integer => raw.parse::<i64>().ok().map(Value::Integer),
            CastType::Float => raw
                .parse::<f64>()
                .ok()
                .filter(|x| x.is_finite())
                .map(Value::Float),
            CastType::Date(format) => NaiveDate::parse_from_str(raw, format)
                .ok()
                .map(Value::Date),
        }
    }
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastType::Integer => f.write_str("integer"),
            CastType::Float => f.write_str("float"),
            CastType::Date(format) => write!(f, "date({})", format),
        }
    }
}

/// One output row: column names mapped to values, in insertion order.
///
/// Column names are unique within a record. Lookups are linear, which is fine
/// for the handful of columns a scraped table carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.position(column).map(|i| &self.fields[i].1)
    }

    /// Append a new column. Returns `false` (and leaves the record untouched)
    /// if the column already exists.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> bool {
        let column = column.into();
        if self.contains(&column) {
            return false;
        }
        self.fields.push((column, value));
        true
    }

    /// Replace the value of an existing column. Returns `false` if it does not exist.
    pub fn set(&mut self, column: &str, value: Value) -> bool {
        match self.position(column) {
            Some(i) => {
                self.fields[i].1 = value;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.position(column).map(|i| self.fields.remove(i).1)
    }

    /// Rename a column in place, keeping its position.
    pub fn rename(&mut self, from: &str, to: impl Into<String>) -> bool {
        match self.position(from) {
            Some(i) => {
                self.fields[i].0 = to.into();
                true
            }
            None => false,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.fields.iter().position(|(name, _)| name == column)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}
