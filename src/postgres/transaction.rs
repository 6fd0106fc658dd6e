//! PostgreSQL transactions driven with explicit `BEGIN`/`COMMIT`/`ROLLBACK`

use super::executor::{execute_on, query_on};
use crate::executor::{ExecResult, Executor, Rows, StorageError, Transaction};
use crate::migration::Dialect;
use may_postgres::Client;
use sea_query::Value;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// An open transaction on a borrowed client
///
/// Dropping an open transaction rolls it back.
pub struct PostgresTransaction<'c> {
    client: &'c Client,
    closed: bool,
}

impl<'c> PostgresTransaction<'c> {
    pub(super) fn begin(client: &'c Client) -> Result<Self, StorageError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client.execute("BEGIN", &[]).map_err(StorageError::from)?;
        Ok(Self {
            client,
            closed: false,
        })
    }

    fn finish(&mut self, statement: &str) -> Result<(), StorageError> {
        if self.closed {
            return Err(StorageError::Transaction(
                "Transaction has already been committed or rolled back".to_string(),
            ));
        }
        self.closed = true;
        self.client.execute(statement, &[]).map_err(StorageError::from)?;
        Ok(())
    }

    fn check_open(&self) -> Result<(), StorageError> {
        if self.closed {
            return Err(StorageError::Transaction("Transaction is closed".to_string()));
        }
        Ok(())
    }
}

impl Executor for PostgresTransaction<'_> {
    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecResult, StorageError> {
        self.check_open()?;
        execute_on(self.client, statement, params)
    }

    fn query(&self, statement: &str, params: &[Value]) -> Result<Box<dyn Rows + '_>, StorageError> {
        self.check_open()?;
        query_on(self.client, statement, params)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

impl Transaction for PostgresTransaction<'_> {
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

impl Drop for PostgresTransaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::warn!("Failed to roll back abandoned transaction: {}", e);
            }
        }
    }
}
