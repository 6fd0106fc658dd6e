//! SQLite backend over `rusqlite`
//!
//! Schema statements without parameters run through `execute_batch`, so a
//! migration file may hold several `;`-separated statements.

use crate::executor::{Connection, ExecResult, Executor, Rows, StorageError, Transaction};
use crate::migration::Dialect;
use rusqlite::types::Value as SqliteValue;
use sea_query::Value;
use std::path::Path;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// [`Connection`] over a `rusqlite::Connection`
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::connect_span().entered();

        let conn = rusqlite::Connection::open(path.as_ref())?;
        log::debug!("Opened SQLite database {}", path.as_ref().display());
        Ok(Self { conn })
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }

    /// Open a database from a URL: `sqlite://path`, `sqlite:path`, `:memory:` or a bare path
    pub fn open_url(url: &str) -> Result<Self, StorageError> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);

        if path.is_empty() || path == ":memory:" {
            Self::in_memory()
        } else {
            Self::open(path)
        }
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Executor for SqliteConnection {
    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecResult, StorageError> {
        execute_on(&self.conn, statement, params)
    }

    fn query(&self, statement: &str, params: &[Value]) -> Result<Box<dyn Rows + '_>, StorageError> {
        query_on(&self.conn, statement, params)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

impl Connection for SqliteConnection {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StorageError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        self.conn.execute_batch("BEGIN")?;
        Ok(Box::new(SqliteTransaction {
            conn: &self.conn,
            closed: false,
        }))
    }
}

/// An open transaction; dropping it while open rolls it back
struct SqliteTransaction<'c> {
    conn: &'c rusqlite::Connection,
    closed: bool,
}

impl SqliteTransaction<'_> {
    fn finish(&mut self, statement: &str) -> Result<(), StorageError> {
        if self.closed {
            return Err(StorageError::Transaction(
                "Transaction has already been committed or rolled back".to_string(),
            ));
        }
        self.closed = true;
        self.conn.execute_batch(statement)?;
        Ok(())
    }
}

impl Executor for SqliteTransaction<'_> {
    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecResult, StorageError> {
        execute_on(self.conn, statement, params)
    }

    fn query(&self, statement: &str, params: &[Value]) -> Result<Box<dyn Rows + '_>, StorageError> {
        query_on(self.conn, statement, params)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.finish("COMMIT")
    }

    fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::warn!("Failed to roll back abandoned transaction: {}", e);
            }
        }
    }
}

fn execute_on(conn: &rusqlite::Connection, statement: &str, params: &[Value]) -> Result<ExecResult, StorageError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_statement_span(statement).entered();

    if params.is_empty() {
        conn.execute_batch(statement)?;
        return Ok(ExecResult::default());
    }

    let values = convert_params(params)?;
    let affected = conn.execute(statement, rusqlite::params_from_iter(values))?;
    Ok(ExecResult::new(affected as u64, Some(conn.last_insert_rowid())))
}

fn query_on(
    conn: &rusqlite::Connection,
    statement: &str,
    params: &[Value],
) -> Result<Box<dyn Rows + 'static>, StorageError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_statement_span(statement).entered();

    let values = convert_params(params)?;
    let mut stmt = conn.prepare(statement)?;
    let columns = stmt.column_count();

    let mut records = Vec::new();
    let mut rows = stmt.query(rusqlite::params_from_iter(values))?;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(columns);
        for index in 0..columns {
            record.push(row.get::<_, SqliteValue>(index)?);
        }
        records.push(record);
    }

    Ok(Box::new(SqliteRows {
        records: records.into_iter(),
        current: None,
    }))
}

/// Convert sea-query values to owned `rusqlite` values
fn convert_params(params: &[Value]) -> Result<Vec<SqliteValue>, StorageError> {
    params
        .iter()
        .map(|value| match value {
            Value::Bool(Some(b)) => Ok(SqliteValue::Integer(i64::from(*b))),
            Value::TinyInt(Some(i)) => Ok(SqliteValue::Integer(i64::from(*i))),
            Value::SmallInt(Some(i)) => Ok(SqliteValue::Integer(i64::from(*i))),
            Value::Int(Some(i)) => Ok(SqliteValue::Integer(i64::from(*i))),
            Value::BigInt(Some(i)) => Ok(SqliteValue::Integer(*i)),
            Value::TinyUnsigned(Some(u)) => Ok(SqliteValue::Integer(i64::from(*u))),
            Value::SmallUnsigned(Some(u)) => Ok(SqliteValue::Integer(i64::from(*u))),
            Value::Unsigned(Some(u)) => Ok(SqliteValue::Integer(i64::from(*u))),
            Value::BigUnsigned(Some(u)) => i64::try_from(*u).map(SqliteValue::Integer).map_err(|_| {
                StorageError::Query(format!("BigUnsigned value {} exceeds i64::MAX", u))
            }),
            Value::Float(Some(f)) => Ok(SqliteValue::Real(f64::from(*f))),
            Value::Double(Some(d)) => Ok(SqliteValue::Real(*d)),
            Value::String(Some(s)) => Ok(SqliteValue::Text(s.clone())),
            Value::Bytes(Some(b)) => Ok(SqliteValue::Blob(b.clone())),
            Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Bytes(None) => Ok(SqliteValue::Null),
            other => Err(StorageError::Query(format!(
                "Unsupported value type in statement: {:?}",
                other
            ))),
        })
        .collect()
}

/// Cursor over a fetched result set
struct SqliteRows {
    records: std::vec::IntoIter<Vec<SqliteValue>>,
    current: Option<Vec<SqliteValue>>,
}

impl Rows for SqliteRows {
    fn advance(&mut self) -> Result<bool, StorageError> {
        self.current = self.records.next();
        Ok(self.current.is_some())
    }

    fn get_string(&self, column: usize) -> Result<String, StorageError> {
        let record = self
            .current
            .as_ref()
            .ok_or_else(|| StorageError::Query("No current row".to_string()))?;

        match record.get(column) {
            Some(SqliteValue::Text(s)) => Ok(s.clone()),
            Some(other) => Err(StorageError::Query(format!(
                "Column {} is not text: {:?}",
                column, other
            ))),
            None => Err(StorageError::Query(format!(
                "Column index {} out of range",
                column
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_batch_and_query() {
        let conn = SqliteConnection::in_memory().unwrap();
        conn.execute(
            "CREATE TABLE t (name TEXT NOT NULL); INSERT INTO t (name) VALUES ('a');",
            &[],
        )
        .unwrap();

        let result = conn
            .execute("INSERT INTO t (name) VALUES (?)", &[Value::from("b")])
            .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.last_insert_id, Some(2));

        let mut rows = conn.query("SELECT name FROM t ORDER BY rowid", &[]).unwrap();
        assert!(rows.advance().unwrap());
        assert_eq!(rows.get_string(0).unwrap(), "a");
        assert!(rows.advance().unwrap());
        assert_eq!(rows.get_string(0).unwrap(), "b");
        assert!(rows.get_string(1).is_err());
        assert!(!rows.advance().unwrap());
    }

    #[test]
    fn test_transaction_rollback_discards_changes() {
        let conn = SqliteConnection::in_memory().unwrap();
        conn.execute("CREATE TABLE t (name TEXT)", &[]).unwrap();

        let trx = conn.begin().unwrap();
        trx.execute("INSERT INTO t (name) VALUES ('a')", &[]).unwrap();
        trx.rollback().unwrap();

        let mut rows = conn.query("SELECT name FROM t", &[]).unwrap();
        assert!(!rows.advance().unwrap());
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let conn = SqliteConnection::in_memory().unwrap();
        conn.execute("CREATE TABLE t (name TEXT)", &[]).unwrap();

        {
            let trx = conn.begin().unwrap();
            trx.execute("INSERT INTO t (name) VALUES ('a')", &[]).unwrap();
        }

        let mut rows = conn.query("SELECT name FROM t", &[]).unwrap();
        assert!(!rows.advance().unwrap());
        assert!(conn.begin().is_ok());
    }

    #[test]
    fn test_non_text_column_is_an_error() {
        let conn = SqliteConnection::in_memory().unwrap();
        let mut rows = conn.query("SELECT 1", &[]).unwrap();
        assert!(rows.advance().unwrap());
        assert!(rows.get_string(0).is_err());
    }

    #[test]
    fn test_open_url() {
        assert!(SqliteConnection::open_url(":memory:").is_ok());
        assert!(SqliteConnection::open_url("sqlite::memory:").is_ok());

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.db");
        let url = format!("sqlite://{}", path.display());
        SqliteConnection::open_url(&url).unwrap();
        assert!(path.exists());
    }
}
