use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::core::types::Value;

/// Queries over the logical (deduplicated) rows of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Count {
        filter: Option<Predicate>,
    },
    Select {
        columns: Vec<String>,
        filter: Option<Predicate>,
    },
}

impl Query {
    pub fn count() -> Self {
        Query::Count { filter: None }
    }

    pub fn count_where(filter: Predicate) -> Self {
        Query::Count { filter: Some(filter) }
    }

    pub fn filter(&self) -> Option<&Predicate> {
        match self {
            Query::Count { filter } | Query::Select { filter, .. } => filter.as_ref(),
        }
    }

    /// Every column the query reads
    pub fn referenced_columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        if let Query::Select { columns, .. } = self {
            out.extend(columns.iter().map(|c| c.as_str()));
        }
        if let Some(filter) = self.filter() {
            filter.collect_columns(&mut out);
        }
        out
    }
}

/// Column access for predicate evaluation; absent columns read as NULL
pub trait RowLookup {
    fn value(&self, column: &str) -> &Value;
}

impl RowLookup for crate::core::types::Row {
    fn value(&self, column: &str) -> &Value {
        self.get(column)
    }
}

/// Row filter. Comparisons against NULL are false, as in SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Eq(String, Value),
    NotEq(String, Value),
    IsNull(String),
    IsNotNull(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn equals(column: &str, value: Value) -> Self {
        Predicate::Eq(column.to_string(), value)
    }

    pub fn not_equals(column: &str, value: Value) -> Self {
        Predicate::NotEq(column.to_string(), value)
    }

    pub fn evaluate<R: RowLookup + ?Sized>(&self, row: &R) -> bool {
        match self {
            Predicate::Eq(column, value) => {
                let actual = row.value(column);
                !actual.is_null() && actual == value
            }
            Predicate::NotEq(column, value) => {
                let actual = row.value(column);
                !actual.is_null() && !value.is_null() && actual != value
            }
            Predicate::IsNull(column) => row.value(column).is_null(),
            Predicate::IsNotNull(column) => !row.value(column).is_null(),
            Predicate::And(parts) => parts.iter().all(|p| p.evaluate(row)),
            Predicate::Or(parts) => parts.iter().any(|p| p.evaluate(row)),
            Predicate::Not(inner) => !inner.evaluate(row),
        }
    }

    pub fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Eq(column, _)
            | Predicate::NotEq(column, _)
            | Predicate::IsNull(column)
            | Predicate::IsNotNull(column) => {
                out.insert(column.as_str());
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_columns(out);
                }
            }
            Predicate::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Literals compared against each column, for type checking
    pub fn literals(&self) -> Vec<(&str, &Value)> {
        match self {
            Predicate::Eq(column, value) | Predicate::NotEq(column, value) => vec![(column.as_str(), value)],
            Predicate::IsNull(_) | Predicate::IsNotNull(_) => Vec::new(),
            Predicate::And(parts) | Predicate::Or(parts) => parts.iter().flat_map(|p| p.literals()).collect(),
            Predicate::Not(inner) => inner.literals(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Row;

    #[test]
    fn test_null_never_compares_equal_or_unequal() {
        let row = Row::new();
        assert!(!Predicate::equals("field", Value::utf8("abcde")).evaluate(&row));
        assert!(!Predicate::not_equals("field", Value::utf8("abcde")).evaluate(&row));
        assert!(Predicate::IsNull("field".into()).evaluate(&row));
    }

    #[test]
    fn test_boolean_combinators() {
        let row = Row::new().with("field", Value::utf8("abcde")).with("pk_int", Value::Int64(3));
        let both = Predicate::And(vec![
            Predicate::equals("field", Value::utf8("abcde")),
            Predicate::equals("pk_int", Value::Int64(3)),
        ]);
        assert!(both.evaluate(&row));
        assert!(!Predicate::Not(Box::new(both)).evaluate(&row));
        let either = Predicate::Or(vec![
            Predicate::equals("field", Value::utf8("x")),
            Predicate::IsNotNull("pk_int".into()),
        ]);
        assert!(either.evaluate(&row));
    }

    #[test]
    fn test_referenced_columns() {
        let query = Query::Select {
            columns: vec!["ts".into()],
            filter: Some(Predicate::Or(vec![
                Predicate::equals("field", Value::utf8("abcde")),
                Predicate::IsNull("pk_int".into()),
            ])),
        };
        let columns: Vec<&str> = query.referenced_columns().into_iter().collect();
        assert_eq!(columns, vec!["field", "pk_int", "ts"]);
        assert!(Query::count().referenced_columns().is_empty());
    }
}
