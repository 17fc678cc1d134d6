//! StorageBackend Trait - Relational Substrate Abstraction
//!
//! The graph engine never talks to a concrete SQL engine directly. Every
//! statement goes through the `StorageBackend` trait, which exposes the small
//! set of primitives the engine needs:
//!
//! - `query` / `run` for parameterized statements
//! - `begin_transaction` / `commit_transaction` / `rollback_transaction`
//! - `in_transaction` so the coordinator can detect an already-open transaction
//! - `flush`, `export` and `close` for persistence adapters
//!
//! Platform adapters (file databases, in-memory databases, anything that can
//! execute SQLite-dialect SQL) implement this trait with identical semantics.
//! The bundled implementation is [`LibsqlBackend`](crate::db::LibsqlBackend).
//!
//! Values cross the boundary as [`SqlValue`] and rows as [`Row`], so adapters
//! are free to use whatever driver types they like internally.

use crate::db::DatabaseError;
use async_trait::async_trait;

/// A single SQL value (parameter or column)
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// Build a `Vec<SqlValue>` from heterogeneous parameters
///
/// ```rust
/// # use relgraph_core::sql_params;
/// let params = sql_params!["node-1", Some("label"), true];
/// assert_eq!(params.len(), 3);
/// ```
#[macro_export]
macro_rules! sql_params {
    () => {
        Vec::<$crate::db::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::db::SqlValue::from($value)),+]
    };
}

/// A result row with positional column access
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, idx: usize) -> Result<&SqlValue, DatabaseError> {
        self.values
            .get(idx)
            .ok_or_else(|| DatabaseError::row_decode(format!("column {} out of range", idx)))
    }

    /// Non-null text column
    pub fn text(&self, idx: usize) -> Result<String, DatabaseError> {
        match self.value(idx)? {
            SqlValue::Text(s) => Ok(s.clone()),
            SqlValue::Integer(i) => Ok(i.to_string()),
            SqlValue::Real(f) => Ok(f.to_string()),
            other => Err(DatabaseError::row_decode(format!(
                "column {} expected text, found {:?}",
                idx, other
            ))),
        }
    }

    /// Nullable text column
    pub fn opt_text(&self, idx: usize) -> Result<Option<String>, DatabaseError> {
        match self.value(idx)? {
            SqlValue::Null => Ok(None),
            _ => self.text(idx).map(Some),
        }
    }

    pub fn integer(&self, idx: usize) -> Result<i64, DatabaseError> {
        match self.value(idx)? {
            SqlValue::Integer(i) => Ok(*i),
            SqlValue::Real(f) => Ok(*f as i64),
            SqlValue::Text(s) => s.parse::<i64>().map_err(|_| {
                DatabaseError::row_decode(format!("column {} is not an integer: {}", idx, s))
            }),
            other => Err(DatabaseError::row_decode(format!(
                "column {} expected integer, found {:?}",
                idx, other
            ))),
        }
    }

    pub fn boolean(&self, idx: usize) -> Result<bool, DatabaseError> {
        match self.value(idx)? {
            SqlValue::Null => Ok(false),
            _ => self.integer(idx).map(|i| i != 0),
        }
    }
}

/// Abstraction over the relational engine used by the graph core
///
/// Implementations must be `Send + Sync`: the coordinator shares one backend
/// between every caller and serializes access itself. Implementations must
/// NOT open nested transactions; `begin_transaction` is only ever called by
/// the coordinator when `in_transaction()` is false.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Run a statement that returns rows
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>, DatabaseError>;

    /// Run a statement that does not return rows, returning affected row count
    async fn run(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64, DatabaseError>;

    async fn begin_transaction(&self) -> Result<(), DatabaseError>;

    async fn commit_transaction(&self) -> Result<(), DatabaseError>;

    async fn rollback_transaction(&self) -> Result<(), DatabaseError>;

    /// Whether the underlying connection currently has an open transaction
    fn in_transaction(&self) -> bool;

    /// Flush engine state to durable storage (checkpoint for file databases)
    async fn flush(&self) -> Result<(), DatabaseError>;

    /// Serialize the whole database into a standalone SQLite image
    async fn export(&self) -> Result<Vec<u8>, DatabaseError>;

    /// Release the connection; later calls fail with `DatabaseError::Closed`
    async fn close(&self) -> Result<(), DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_params_conversions() {
        let missing: Option<String> = None;
        let params = crate::sql_params!["a", String::from("b"), missing, 7_i64, true];
        assert_eq!(
            params,
            vec![
                SqlValue::Text("a".into()),
                SqlValue::Text("b".into()),
                SqlValue::Null,
                SqlValue::Integer(7),
                SqlValue::Integer(1),
            ]
        );
    }

    #[test]
    fn test_row_accessors() {
        let row = Row::new(vec![
            SqlValue::Text("id-1".into()),
            SqlValue::Null,
            SqlValue::Integer(0),
            SqlValue::Text("42".into()),
        ]);

        assert_eq!(row.text(0).unwrap(), "id-1");
        assert_eq!(row.opt_text(1).unwrap(), None);
        assert!(!row.boolean(2).unwrap());
        assert_eq!(row.integer(3).unwrap(), 42);
        assert!(row.text(1).is_err());
        assert!(row.value(9).is_err());
    }
}
