use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::fmt;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::core::error::{Error, ErrorKind, Result};

/// Position of a shard within its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(pub u32);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

/// Unique chunk identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub Uuid);

impl ChunkId {
    pub fn new() -> Self {
        ChunkId(Uuid::new_v4())
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commit sequence number assigned by a shard's write buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeqNo(pub u64);

impl SeqNo {
    pub fn next(self) -> SeqNo {
        SeqNo(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Int64,
    Utf8,
    Timestamp,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Utf8(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn utf8(s: impl Into<String>) -> Self {
        Value::Utf8(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `None` for `Null`, which fits any nullable column
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Int64(_) => Some(ColumnType::Int64),
            Value::Utf8(_) => Some(ColumnType::Utf8),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    /// Parse a textual literal (e.g. an alteration `DEFAULT_VALUE`) as `column_type`
    pub fn parse(column_type: ColumnType, literal: &str) -> Result<Value> {
        let parse_err = |what: &str| {
            Error::new(ErrorKind::Parse, format!("cannot parse '{}' as {}", literal, what))
        };
        match column_type {
            ColumnType::Utf8 => Ok(Value::Utf8(literal.to_string())),
            ColumnType::Int64 => literal
                .trim()
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|_| parse_err("Int64")),
            ColumnType::Bool => match literal.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(parse_err("Bool")),
            },
            ColumnType::Timestamp => DateTime::parse_from_rfc3339(literal.trim())
                .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| parse_err("Timestamp")),
        }
    }

    /// Canonical byte form used for primary-key hashing
    pub fn write_key_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(0),
            Value::Bool(b) => {
                out.push(1);
                out.push(*b as u8);
            }
            Value::Int64(v) => {
                out.push(2);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Value::Utf8(s) => {
                out.push(3);
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Value::Timestamp(ts) => {
                out.push(4);
                out.extend_from_slice(&ts.timestamp_micros().to_le_bytes());
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Utf8(s) => write!(f, "'{}'", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

/// One logical row keyed by column name; absent columns read as `Null`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Row {
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: Value) -> Self {
        self.values.insert(column.to_string(), value);
        self
    }

    pub fn set(&mut self, column: String, value: Value) {
        self.values.insert(column, value);
    }

    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }
}
