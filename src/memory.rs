//! In-memory storage backend
//!
//! `MemoryConnection` keeps the tracking table and every executed schema
//! statement in process memory. It understands just enough of the
//! tracking-table statements rendered by
//! [`MigrationTable`](crate::migration::MigrationTable) to maintain the applied
//! log; any other statement is recorded verbatim as a schema statement.
//!
//! Failures can be injected at every storage call the engine makes (begin,
//! statement, commit, rollback, query), which makes this backend the workhorse of
//! the engine's tests.
//!
//! # Example
//!
//! ```
//! use stepwise::memory::MemoryConnection;
//! use stepwise::migration::{Migration, MigrationPlan, Migrator};
//!
//! let plan: MigrationPlan = [Migration::new("A", "create t", "drop t")].into_iter().collect();
//! let conn = MemoryConnection::new();
//! conn.fail_on("create t");
//!
//! assert!(Migrator::new(plan).up(&conn).is_err());
//! assert!(conn.log().is_empty());
//! assert_eq!(conn.rollbacks(), 1);
//! ```

use crate::executor::{string_param, Connection, ExecResult, Executor, Rows, StorageError, Transaction};
use crate::migration::{Dialect, DEFAULT_TABLE};
use sea_query::Value;
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Default)]
struct State {
    has_table: bool,
    log: Vec<(i64, String)>,
    schema: Vec<String>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct Faults {
    statements: Vec<String>,
    begin: bool,
    commit: bool,
    rollback: bool,
    query: bool,
}

/// What a statement does to the in-memory store
enum Op {
    CreateTable,
    Insert,
    Delete,
    Select,
    Schema,
}

/// In-memory [`Connection`] with failure injection
#[derive(Debug)]
pub struct MemoryConnection {
    table: String,
    state: RefCell<State>,
    faults: RefCell<Faults>,
    in_transaction: Cell<bool>,
    commits: Cell<usize>,
    rollbacks: Cell<usize>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::with_table(DEFAULT_TABLE)
    }
}

impl MemoryConnection {
    /// Empty store tracking migrations in the default `migrations` table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store tracking migrations in `table`
    #[must_use]
    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            state: RefCell::new(State {
                next_id: 1,
                ..State::default()
            }),
            faults: RefCell::new(Faults::default()),
            in_transaction: Cell::new(false),
            commits: Cell::new(0),
            rollbacks: Cell::new(0),
        }
    }

    /// Store whose tracking table already lists `names`, oldest first
    #[must_use]
    pub fn with_log<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let conn = Self::new();
        {
            let mut state = conn.state.borrow_mut();
            state.has_table = true;
            for name in names {
                let id = state.next_id;
                state.next_id += 1;
                state.log.push((id, name.into()));
            }
        }
        conn
    }

    /// Name of the tracking table this store recognises
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether the tracking table has been created
    pub fn has_table(&self) -> bool {
        self.state.borrow().has_table
    }

    /// Committed applied-migration names, oldest first
    pub fn log(&self) -> Vec<String> {
        self.state
            .borrow()
            .log
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Committed schema statements, in execution order
    pub fn schema_statements(&self) -> Vec<String> {
        self.state.borrow().schema.clone()
    }

    /// Number of committed transactions
    pub fn commits(&self) -> usize {
        self.commits.get()
    }

    /// Number of successful rollbacks
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.get()
    }

    /// Fail every statement containing `fragment`
    pub fn fail_on(&self, fragment: impl Into<String>) {
        self.faults.borrow_mut().statements.push(fragment.into());
    }

    /// Fail the next `begin` calls
    pub fn fail_begin(&self) {
        self.faults.borrow_mut().begin = true;
    }

    /// Fail every commit
    pub fn fail_commit(&self) {
        self.faults.borrow_mut().commit = true;
    }

    /// Fail every rollback
    pub fn fail_rollback(&self) {
        self.faults.borrow_mut().rollback = true;
    }

    /// Fail every query
    pub fn fail_query(&self) {
        self.faults.borrow_mut().query = true;
    }

    /// Remove every injected failure
    pub fn clear_faults(&self) {
        *self.faults.borrow_mut() = Faults::default();
    }

    /// Recognise the tracking-table statements by their leading clause
    ///
    /// Anything else, including user statements that merely mention the
    /// tracking table, is a schema statement.
    fn classify(&self, statement: &str) -> Op {
        let upper = statement.trim_start().to_ascii_uppercase();
        let table = self.table.to_ascii_uppercase();

        for quoted in [format!("\"{}\"", table), format!("`{}`", table)] {
            if upper.starts_with(&format!("CREATE TABLE IF NOT EXISTS {}", quoted))
                || upper.starts_with(&format!("CREATE TABLE {}", quoted))
            {
                return Op::CreateTable;
            }
            if upper.starts_with(&format!("INSERT INTO {}", quoted)) {
                return Op::Insert;
            }
            if upper.starts_with(&format!("DELETE FROM {}", quoted)) {
                return Op::Delete;
            }
            if upper.starts_with("SELECT ") && upper.contains(&format!(" FROM {}", quoted)) {
                return Op::Select;
            }
        }

        Op::Schema
    }

    fn check_statement(&self, statement: &str) -> Result<(), StorageError> {
        let faults = self.faults.borrow();
        if faults
            .statements
            .iter()
            .any(|fragment| statement.contains(fragment.as_str()))
        {
            return Err(StorageError::Query(format!(
                "Injected failure executing '{}'",
                statement
            )));
        }
        Ok(())
    }

    fn check_idle(&self) -> Result<(), StorageError> {
        if self.in_transaction.get() {
            return Err(StorageError::Transaction(
                "Connection is busy with an open transaction".to_string(),
            ));
        }
        Ok(())
    }

    fn run(&self, state: &mut State, statement: &str, params: &[Value]) -> Result<ExecResult, StorageError> {
        self.check_statement(statement)?;

        match self.classify(statement) {
            Op::CreateTable => {
                state.has_table = true;
                Ok(ExecResult::default())
            }
            Op::Insert => {
                let name = string_param(params, 0)?;
                self.require_table(state)?;
                if state.log.iter().any(|(_, applied)| *applied == name) {
                    return Err(StorageError::Query(format!(
                        "duplicate key value violates unique constraint on \"{}\": '{}'",
                        self.table, name
                    )));
                }
                let id = state.next_id;
                state.next_id += 1;
                state.log.push((id, name));
                Ok(ExecResult::new(1, Some(id)))
            }
            Op::Delete => {
                let name = string_param(params, 0)?;
                self.require_table(state)?;
                let before = state.log.len();
                state.log.retain(|(_, applied)| *applied != name);
                Ok(ExecResult::new((before - state.log.len()) as u64, None))
            }
            Op::Select => Err(StorageError::Query(format!(
                "SELECT on \"{}\" must go through query()",
                self.table
            ))),
            Op::Schema => {
                state.schema.push(statement.to_string());
                Ok(ExecResult::default())
            }
        }
    }

    fn select(&self, state: &State, statement: &str) -> Result<Box<dyn Rows + 'static>, StorageError> {
        if self.faults.borrow().query {
            return Err(StorageError::Query(format!(
                "Injected failure querying '{}'",
                statement
            )));
        }

        match self.classify(statement) {
            Op::Select => {
                self.require_table(state)?;
                let mut log = state.log.clone();
                log.sort_by_key(|(id, _)| *id);
                Ok(Box::new(MemoryRows::new(
                    log.into_iter().map(|(_, name)| name).collect(),
                )))
            }
            _ => Err(StorageError::Query(format!(
                "Unsupported query: {}",
                statement
            ))),
        }
    }

    fn require_table(&self, state: &State) -> Result<(), StorageError> {
        if state.has_table {
            Ok(())
        } else {
            Err(StorageError::Query(format!(
                "relation \"{}\" does not exist",
                self.table
            )))
        }
    }
}

impl Executor for MemoryConnection {
    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecResult, StorageError> {
        self.check_idle()?;
        let mut state = self.state.borrow_mut();
        self.run(&mut state, statement, params)
    }

    fn query(&self, statement: &str, _params: &[Value]) -> Result<Box<dyn Rows + '_>, StorageError> {
        self.check_idle()?;
        let state = self.state.borrow();
        self.select(&state, statement)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

impl Connection for MemoryConnection {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StorageError> {
        self.check_idle()?;
        if self.faults.borrow().begin {
            return Err(StorageError::Transaction(
                "Injected failure beginning transaction".to_string(),
            ));
        }

        self.in_transaction.set(true);
        Ok(Box::new(MemoryTransaction {
            conn: self,
            staged: RefCell::new(self.state.borrow().clone()),
        }))
    }
}

/// Transaction over a [`MemoryConnection`]
///
/// Works on a snapshot of the store; commit swaps the snapshot in.
struct MemoryTransaction<'c> {
    conn: &'c MemoryConnection,
    staged: RefCell<State>,
}

impl Executor for MemoryTransaction<'_> {
    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecResult, StorageError> {
        let mut staged = self.staged.borrow_mut();
        self.conn.run(&mut staged, statement, params)
    }

    fn query(&self, statement: &str, _params: &[Value]) -> Result<Box<dyn Rows + '_>, StorageError> {
        let staged = self.staged.borrow();
        self.conn.select(&staged, statement)
    }

    fn dialect(&self) -> Dialect {
        self.conn.dialect()
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn commit(self: Box<Self>) -> Result<(), StorageError> {
        if self.conn.faults.borrow().commit {
            return Err(StorageError::Transaction(
                "Injected commit failure".to_string(),
            ));
        }

        let staged = self.staged.replace(State::default());
        *self.conn.state.borrow_mut() = staged;
        self.conn.commits.set(self.conn.commits.get() + 1);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        if self.conn.faults.borrow().rollback {
            return Err(StorageError::Transaction(
                "Injected rollback failure".to_string(),
            ));
        }

        self.conn.rollbacks.set(self.conn.rollbacks.get() + 1);
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        self.conn.in_transaction.set(false);
    }
}

/// Cursor over a snapshot of applied names
#[derive(Debug)]
struct MemoryRows {
    names: Vec<String>,
    current: Option<usize>,
    next: usize,
    closed: bool,
}

impl MemoryRows {
    fn new(names: Vec<String>) -> Self {
        Self {
            names,
            current: None,
            next: 0,
            closed: false,
        }
    }
}

impl Rows for MemoryRows {
    fn advance(&mut self) -> Result<bool, StorageError> {
        if self.closed {
            return Err(StorageError::Query("Cursor is closed".to_string()));
        }
        if self.next < self.names.len() {
            self.current = Some(self.next);
            self.next += 1;
            Ok(true)
        } else {
            self.current = None;
            Ok(false)
        }
    }

    fn get_string(&self, column: usize) -> Result<String, StorageError> {
        if column != 0 {
            return Err(StorageError::Query(format!(
                "Column index {} out of range",
                column
            )));
        }
        self.current
            .and_then(|index| self.names.get(index))
            .cloned()
            .ok_or_else(|| StorageError::Query("No current row".to_string()))
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.closed = true;
        Ok(())
    }
}
