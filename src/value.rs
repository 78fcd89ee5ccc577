//! Cell values and their SQLite affinity mapping.
//!
//! Every non-reserved column holds either a scalar [`Value`] or an opaque
//! container blob. Reference columns hold the dynamic type tag as TEXT.

use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Primitive column kinds supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    /// Any Rust integer type, stored as INTEGER
    Int,
    /// f32/f64, stored as REAL
    Real,
    /// Stored as INTEGER 0/1
    Bool,
    /// Stored as TEXT
    Text,
    /// Stored as BLOB
    Bytes,
}

impl Primitive {
    /// SQLite affinity for this primitive kind
    pub fn affinity(&self) -> &'static str {
        match self {
            Primitive::Int | Primitive::Bool => "INTEGER",
            Primitive::Real => "REAL",
            Primitive::Text => "TEXT",
            Primitive::Bytes => "BLOB",
        }
    }
}

/// A single column cell value.
///
/// The engine never interprets `Blob` payloads itself - they are produced and
/// consumed by the registry's [`BlobCodec`](crate::codec::BlobCodec).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Bool(bool),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Human-readable kind name, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Real(_) => "real",
            Value::Bool(_) => "boolean",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    /// True for values comparable with `<`, `>`, `<=`, `>=`
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Real(_))
    }

    /// True for values usable with `LIKE` / `NOT LIKE`
    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    /// True for values usable with `=` / `!=` (null compiles to IS / IS NOT)
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Blob(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Read a cell out of a query result
    pub fn from_sql_ref(cell: ValueRef<'_>) -> Self {
        match cell {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Int(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Bool(b) => ToSqlOutput::from(*b as i64),
            Value::Text(t) => ToSqlOutput::from(t.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Real(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
