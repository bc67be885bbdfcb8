use std::fmt::Display;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::storage::decimal;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    String,
    /// Exact decimal, stored through the decimal bridge
    Decimal,
}

impl DataType {
    /// SQLite column type used in CREATE TABLE
    pub fn sql_type(&self) -> &'static str {
        match self {
            DataType::Boolean | DataType::Integer => "INTEGER",
            DataType::Float => "REAL",
            DataType::String | DataType::Decimal => "TEXT",
        }
    }

    /// Type tag persisted in the column metadata table
    pub fn tag(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Decimal => "decimal",
        }
    }

    pub fn from_tag(tag: &str) -> Option<DataType> {
        Some(match tag {
            "boolean" => DataType::Boolean,
            "integer" => DataType::Integer,
            "float" => DataType::Float,
            "string" => DataType::String,
            "decimal" => DataType::Decimal,
            _ => return None,
        })
    }
}

/// Typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Decimal(Decimal),
}

impl Value {
    /// Decodes a raw SQLite value according to the declared column type.
    pub fn from_sql(raw: ValueRef<'_>, datatype: DataType) -> Self {
        match (raw, datatype) {
            (ValueRef::Null, _) => Value::Null,
            (ValueRef::Integer(i), DataType::Boolean) => Value::Boolean(i != 0),
            (ValueRef::Integer(i), DataType::Float) => Value::Float(i as f64),
            (raw, DataType::Decimal) => Value::Decimal(decimal::from_value_ref(raw)),
            (ValueRef::Integer(i), _) => Value::Integer(i),
            (ValueRef::Real(f), DataType::Integer) if f.fract() == 0.0 => Value::Integer(f as i64),
            (ValueRef::Real(f), _) => Value::Float(f),
            (ValueRef::Text(t) | ValueRef::Blob(t), _) => {
                Value::String(String::from_utf8_lossy(t).into_owned())
            }
        }
    }

    /// Converts a value captured in the undo log back into a bindable value.
    /// Text stays text so decimal encodings replay byte for byte.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            Value::Integer(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(*b as i64)),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Decimal(d) => ToSqlOutput::Owned(SqlValue::Text(decimal::to_storage(Some(d)))),
        })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) if *b => write!(f, "TRUE"),
            Value::Boolean(_) => write!(f, "FALSE"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
        }
    }
}

/// A row is a vector of values in schema column order
pub type Row = Vec<Value>;
