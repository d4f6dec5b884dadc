use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::Value;
use crate::query::ast::{Query, RowLookup};
use crate::reader::snapshot_reader::SnapshotReader;
use crate::schema::schema::TableSchema;
use crate::shard::table::Table;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryResult {
    Count(u64),
    Rows(Vec<Vec<Value>>),
}

impl QueryResult {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            QueryResult::Count(n) => Some(*n),
            QueryResult::Rows(_) => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Vec<Value>>> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::Count(_) => None,
        }
    }
}

/// One row of a decoded shard, addressed by position
struct ColumnRow<'a> {
    columns: &'a HashMap<&'a str, Vec<Value>>,
    index: usize,
}

impl RowLookup for ColumnRow<'_> {
    fn value(&self, column: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.columns.get(column).and_then(|v| v.get(self.index)).unwrap_or(&NULL)
    }
}

#[derive(Default)]
struct ShardScan {
    count: u64,
    rows: Vec<Vec<Value>>,
}

/// Evaluates queries against shard snapshots. Physical rows sharing a
/// primary key collapse to the most recently written one, so repeated
/// upserts of a key count once.
pub struct QueryExecutor;

impl QueryExecutor {
    pub fn execute(table: &Table, query: &Query) -> Result<QueryResult> {
        let started = Instant::now();
        let schema = &table.entry.schema;
        Self::validate(schema, query)?;

        let mut needed: BTreeSet<&str> = query.referenced_columns();
        needed.extend(schema.primary_key.iter().map(|c| c.as_str()));

        let readers = table.readers();
        let scans: Vec<ShardScan> = readers
            .par_iter()
            .map(|reader| Self::scan_shard(reader, schema, &needed, query))
            .collect::<Result<_>>()?;

        let result = match query {
            Query::Count { .. } => QueryResult::Count(scans.iter().map(|s| s.count).sum()),
            Query::Select { .. } => QueryResult::Rows(scans.into_iter().flat_map(|s| s.rows).collect()),
        };
        tracing::debug!(
            table = %schema.name,
            shards = readers.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "query executed"
        );
        Ok(result)
    }

    fn validate(schema: &TableSchema, query: &Query) -> Result<()> {
        for column in query.referenced_columns() {
            if schema.column(column).is_none() {
                return Err(Error::not_found(format!("column '{}' in table '{}'", column, schema.name)));
            }
        }
        if let Some(filter) = query.filter() {
            for (column, literal) in filter.literals() {
                let expected = schema.column(column).map(|c| c.column_type);
                match literal.column_type() {
                    Some(actual) if Some(actual) != expected => {
                        return Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("column '{}' compared with {}", column, literal),
                        ));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn scan_shard(
        reader: &SnapshotReader,
        schema: &TableSchema,
        needed: &BTreeSet<&str>,
        query: &Query,
    ) -> Result<ShardScan> {
        let row_count = reader.row_count();
        let mut columns: HashMap<&str, Vec<Value>> = HashMap::with_capacity(needed.len());
        for column in needed {
            let values = reader.column_values(column)?;
            if values.len() != row_count {
                return Err(Error::corrupted(format!(
                    "column '{}' of {} has {} rows, expected {}",
                    column, reader.shard, values.len(), row_count
                )));
            }
            columns.insert(*column, values);
        }

        // Later rows of a key supersede earlier ones
        let mut latest: HashMap<Vec<u8>, usize> = HashMap::with_capacity(row_count);
        for index in 0..row_count {
            let row = ColumnRow { columns: &columns, index };
            let key: Vec<&Value> = schema.primary_key.iter().map(|c| row.value(c)).collect();
            latest.insert(schema.key_of(&key), index);
        }
        let mut live: Vec<usize> = latest.into_values().collect();
        live.sort_unstable();

        let mut scan = ShardScan::default();
        for index in live {
            let row = ColumnRow { columns: &columns, index };
            if let Some(filter) = query.filter() {
                if !filter.evaluate(&row) {
                    continue;
                }
            }
            match query {
                Query::Count { .. } => scan.count += 1,
                Query::Select { columns: projection, .. } => {
                    scan.rows.push(projection.iter().map(|c| row.value(c).clone()).collect());
                }
            }
        }
        Ok(scan)
    }
}
