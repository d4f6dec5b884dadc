use std::collections::HashSet;
use serde::{Serialize, Deserialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ColumnType, Row, Value};

/// Column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

/// Columnar table: primary key plus typed columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        TableSchema {
            name: name.to_string(),
            primary_key: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn add_column(mut self, name: &str, column_type: ColumnType, nullable: bool) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            column_type,
            nullable,
        });
        self
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_argument("table name must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(Error::invalid_argument(format!("table '{}' has no columns", self.name)));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, self.name
                )));
            }
        }
        if self.primary_key.is_empty() {
            return Err(Error::invalid_argument(format!("table '{}' needs a primary key", self.name)));
        }
        for key in &self.primary_key {
            match self.column(key) {
                None => {
                    return Err(Error::invalid_argument(format!(
                        "primary key column '{}' is not defined",
                        key
                    )))
                }
                Some(c) if c.nullable => {
                    return Err(Error::invalid_argument(format!(
                        "primary key column '{}' must be NOT NULL",
                        key
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Type-check a row before it is accepted into a write buffer
    pub fn validate_row(&self, row: &Row) -> Result<()> {
        for name in row.values.keys() {
            if self.column(name).is_none() {
                return Err(Error::not_found(format!(
                    "column '{}' in table '{}'",
                    name, self.name
                )));
            }
        }
        for column in &self.columns {
            let value = row.get(&column.name);
            match value.column_type() {
                None if !column.nullable => {
                    return Err(Error::invalid_argument(format!(
                        "column '{}' is NOT NULL",
                        column.name
                    )))
                }
                Some(t) if t != column.column_type => {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch,
                        format!(
                            "column '{}' expects {:?}, got {}",
                            column.name, column.column_type, value
                        ),
                    ))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Canonical primary-key bytes of a row
    pub fn key_bytes(&self, row: &Row) -> Vec<u8> {
        let mut out = Vec::new();
        for key in &self.primary_key {
            row.get(key).write_key_bytes(&mut out);
        }
        out
    }

    pub fn key_of(&self, values: &[&Value]) -> Vec<u8> {
        let mut out = Vec::new();
        for value in values {
            value.write_key_bytes(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn olap_table() -> TableSchema {
        TableSchema::new("olapTable")
            .add_column("pk_int", ColumnType::Int64, false)
            .add_column("field", ColumnType::Utf8, true)
            .add_column("ts", ColumnType::Timestamp, true)
            .with_primary_key(&["pk_int"])
    }

    #[test]
    fn test_valid_schema() {
        olap_table().validate().unwrap();
    }

    #[test]
    fn test_primary_key_must_exist_and_be_not_null() {
        let missing = olap_table().with_primary_key(&["id"]);
        assert!(missing.validate().is_err());

        let nullable = olap_table().with_primary_key(&["field"]);
        assert!(nullable.validate().is_err());
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let schema = olap_table().add_column("field", ColumnType::Utf8, true);
        assert_eq!(schema.validate().unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_validate_row() {
        let schema = olap_table();
        let ok = Row::new().with("pk_int", Value::Int64(1)).with("field", Value::utf8("abcde"));
        schema.validate_row(&ok).unwrap();

        let no_key = Row::new().with("field", Value::utf8("abcde"));
        assert_eq!(schema.validate_row(&no_key).unwrap_err().kind, ErrorKind::InvalidArgument);

        let wrong_type = Row::new().with("pk_int", Value::Int64(1)).with("field", Value::Int64(3));
        assert_eq!(schema.validate_row(&wrong_type).unwrap_err().kind, ErrorKind::TypeMismatch);

        let unknown = Row::new().with("pk_int", Value::Int64(1)).with("nope", Value::Null);
        assert_eq!(schema.validate_row(&unknown).unwrap_err().kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_key_bytes_follow_key_columns_only() {
        let schema = olap_table();
        let a = Row::new().with("pk_int", Value::Int64(5)).with("field", Value::utf8("a"));
        let b = Row::new().with("pk_int", Value::Int64(5)).with("field", Value::utf8("b"));
        assert_eq!(schema.key_bytes(&a), schema.key_bytes(&b));
        assert_eq!(schema.key_bytes(&a), schema.key_of(&[&Value::Int64(5)]));
    }
}
