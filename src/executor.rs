//! Storage capability contract
//!
//! The migration engine never talks to a database driver directly. It only needs
//! the narrow set of operations defined here:
//!
//! - [`Executor::execute`] for schema statements and tracking-table mutations
//! - [`Executor::query`] for listing the tracking table through a [`Rows`] cursor
//! - [`Connection::begin`] for pairing a schema statement with its log mutation
//!   inside one [`Transaction`]
//!
//! Backends (`postgres`, `sqlite`, `memory`) implement these traits; anything else
//! that can execute statements transactionally can as well.

use crate::migration::Dialect;
use sea_query::Value;
use std::fmt;

/// Storage error type
///
/// Every failure raised by a backend (execute, query, begin, commit, rollback) is
/// reported through this type and passed through the engine unchanged.
#[derive(Debug)]
pub enum StorageError {
    /// `PostgreSQL` error from `may_postgres`
    #[cfg(feature = "postgres")]
    Postgres(may_postgres::Error),
    /// `SQLite` error from `rusqlite`
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Error),
    /// Statement execution or query error
    Query(String),
    /// Transaction begin/commit/rollback error
    Transaction(String),
    /// Other storage errors
    Other(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            StorageError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            #[cfg(feature = "sqlite")]
            StorageError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StorageError::Query(s) => write!(f, "Query error: {s}"),
            StorageError::Transaction(s) => write!(f, "Transaction error: {s}"),
            StorageError::Other(s) => write!(f, "Storage error: {s}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "postgres")]
            StorageError::Postgres(e) => Some(e),
            #[cfg(feature = "sqlite")]
            StorageError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<may_postgres::Error> for StorageError {
    fn from(err: may_postgres::Error) -> Self {
        StorageError::Postgres(err)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Sqlite(err)
    }
}

/// Metadata returned by [`Executor::execute`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Number of rows affected (0 for DDL)
    pub rows_affected: u64,
    /// Identifier generated by the statement, when the backend reports one
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    #[must_use]
    pub fn new(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }
}

/// Forward-only, closable row cursor
///
/// A fresh cursor is positioned *before* the first row; call [`Rows::advance`]
/// before reading any column.
pub trait Rows {
    /// Move to the next row. Returns `Ok(false)` once the rows are exhausted.
    fn advance(&mut self) -> Result<bool, StorageError>;

    /// Read a text column of the current row
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if there is no current row, the column index is out
    /// of range, or the column is not text.
    fn get_string(&self, column: usize) -> Result<String, StorageError>;

    /// Release the cursor. Dropping the cursor releases it as well.
    fn close(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Trait for executing statements against a data store
///
/// Implemented by connections and by transactions, so that the same code can run
/// inside or outside a transaction.
pub trait Executor {
    /// Execute a statement and return affected-row / insert-id metadata
    ///
    /// # Arguments
    ///
    /// * `statement` - Statement text, passed verbatim to the backend
    /// * `params` - Parameters bound to the statement's placeholders
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if execution fails.
    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecResult, StorageError>;

    /// Run a query and return a cursor over its rows
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    fn query(&self, statement: &str, params: &[Value]) -> Result<Box<dyn Rows + '_>, StorageError>;

    /// SQL dialect understood by this data store
    ///
    /// Tracking-table statements are rendered for this dialect unless the caller
    /// pins one explicitly.
    fn dialect(&self) -> Dialect;
}

/// A connection that can open transactions
pub trait Connection: Executor {
    /// Begin a new transaction
    ///
    /// The transaction must be committed or rolled back before the connection is
    /// used for anything else.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the transaction cannot be started.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StorageError>;
}

/// A storage transaction
///
/// Statements executed through a transaction become visible atomically on
/// [`Transaction::commit`] or are discarded on [`Transaction::rollback`].
pub trait Transaction: Executor {
    /// Commit the transaction
    fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Roll back the transaction
    fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

/// Read a string parameter, as bound by the tracking-table statements
pub(crate) fn string_param(params: &[Value], index: usize) -> Result<String, StorageError> {
    match params.get(index) {
        Some(Value::String(Some(s))) => Ok(s.to_string()),
        Some(other) => Err(StorageError::Query(format!(
            "Expected text parameter at position {}, got {:?}",
            index + 1,
            other
        ))),
        None => Err(StorageError::Query(format!(
            "Missing parameter at position {}",
            index + 1
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Query("test error".to_string());
        assert!(err.to_string().contains("Query error"));

        let err = StorageError::Transaction("commit failed".to_string());
        assert_eq!(err.to_string(), "Transaction error: commit failed");

        let err = StorageError::Other("misc".to_string());
        assert!(err.to_string().contains("Storage error"));
    }

    #[test]
    fn test_exec_result_default() {
        let result = ExecResult::default();
        assert_eq!(result.rows_affected, 0);
        assert_eq!(result.last_insert_id, None);
        assert_eq!(ExecResult::new(1, Some(7)).last_insert_id, Some(7));
    }

    #[test]
    fn test_string_param() {
        let params = vec![Value::from("create_users")];
        assert_eq!(string_param(&params, 0).unwrap(), "create_users");
        assert!(string_param(&params, 1).is_err());

        let params = vec![Value::from(42i64)];
        assert!(string_param(&params, 0).is_err());
    }
}
