use std::fmt;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, Result};
use crate::core::types::{ColumnType, Value};

/// Physical encoding family of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessorKind {
    Plain,
    Sparsed,
}

impl AccessorKind {
    pub const PLAIN_CLASS_NAME: &'static str = "PLAIN";
    pub const SPARSED_CLASS_NAME: &'static str = "SPARSED";

    pub fn code(self) -> u8 {
        match self {
            AccessorKind::Plain => 1,
            AccessorKind::Sparsed => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(AccessorKind::Plain),
            2 => Some(AccessorKind::Sparsed),
            _ => None,
        }
    }

    pub fn from_class_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            Self::PLAIN_CLASS_NAME => Ok(AccessorKind::Plain),
            Self::SPARSED_CLASS_NAME => Ok(AccessorKind::Sparsed),
            other => Err(Error::config(format!("unknown accessor class '{}'", other))),
        }
    }
}

impl fmt::Display for AccessorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AccessorKind::Plain => write!(f, "{}", Self::PLAIN_CLASS_NAME),
            AccessorKind::Sparsed => write!(f, "{}", Self::SPARSED_CLASS_NAME),
        }
    }
}

/// Encoding a column's future chunks are built with.
///
/// Chunks carry a copy of the config they were encoded under; changing a
/// column's config never reinterprets chunks that already exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessorConfig {
    Plain,
    Sparsed { default: Value },
}

impl Default for AccessorConfig {
    fn default() -> Self {
        AccessorConfig::Plain
    }
}

impl AccessorConfig {
    pub fn sparsed(default: Value) -> Self {
        AccessorConfig::Sparsed { default }
    }

    pub fn kind(&self) -> AccessorKind {
        match self {
            AccessorConfig::Plain => AccessorKind::Plain,
            AccessorConfig::Sparsed { .. } => AccessorKind::Sparsed,
        }
    }

    /// Build from the class-name form used by alteration requests.
    /// A missing default for `SPARSED` is a configuration error.
    pub fn from_class_name(class_name: &str, default: Option<Value>) -> Result<Self> {
        match AccessorKind::from_class_name(class_name)? {
            AccessorKind::Plain => Ok(AccessorConfig::Plain),
            AccessorKind::Sparsed => match default {
                Some(value) if !value.is_null() => Ok(AccessorConfig::Sparsed { default: value }),
                _ => Err(Error::config("SPARSED accessor requires DEFAULT_VALUE")),
            },
        }
    }

    /// Check the config against the column it is about to be attached to
    pub fn validate(&self, column: &str, column_type: ColumnType) -> Result<()> {
        match self {
            AccessorConfig::Plain => Ok(()),
            AccessorConfig::Sparsed { default } => match default.column_type() {
                None => Err(Error::config(format!(
                    "sparsed accessor on column '{}' requires a non-null default",
                    column
                ))),
                Some(t) if t != column_type => Err(Error::config(format!(
                    "default {} does not match column '{}' of type {:?}",
                    default, column, column_type
                ))),
                Some(_) => Ok(()),
            },
        }
    }
}

impl fmt::Display for AccessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AccessorConfig::Plain => write!(f, "PLAIN"),
            AccessorConfig::Sparsed { default } => write!(f, "SPARSED(default={})", default),
        }
    }
}
