//! Migrator - Core migration execution engine
//!
//! The `Migrator` reconciles a [`MigrationPlan`] against the tracking table and
//! moves the data store forward or backward one migration at a time. Every call
//! recomputes the current position from the tracking table; nothing is cached
//! between calls.

use crate::executor::{Connection, Executor, Rows, StorageError, Transaction};
use crate::migration::{
    BatchError, Dialect, MigrationError, MigrationPlan, MigrationStatus, MigrationTable, PlanEntry,
    DEFAULT_TABLE,
};
#[cfg(feature = "tracing")]
use crate::tracing_helpers;
use std::fmt;

/// Direction of a single migration step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Core migration execution engine
///
/// # Example
///
/// ```
/// use stepwise::memory::MemoryConnection;
/// use stepwise::migration::{Migration, MigrationPlan, Migrator};
///
/// let mut plan = MigrationPlan::new();
/// plan.add(Migration::new("A", "create t", "drop t"))
///     .add(Migration::new("B", "alter t add c", "alter t drop c"));
///
/// let migrator = Migrator::new(plan);
/// let conn = MemoryConnection::new();
///
/// assert_eq!(migrator.latest(&conn)?, 2);
/// assert_eq!(conn.log(), ["A", "B"]);
/// assert_eq!(migrator.reset(&conn)?, 2);
/// assert!(conn.log().is_empty());
/// # Ok::<(), stepwise::migration::MigrationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Migrator {
    plan: MigrationPlan,
    table_name: String,
    /// `None` renders the tracking table in the dialect of each connection
    dialect: Option<Dialect>,
}

impl Migrator {
    /// Create a migrator tracking migrations in the `migrations` table
    ///
    /// Tracking-table statements are rendered in the dialect of the connection
    /// passed to each call.
    pub fn new(plan: MigrationPlan) -> Self {
        Self::with_table_name(plan, DEFAULT_TABLE)
    }

    /// Create a migrator tracking migrations in `table_name`, in the connection's dialect
    pub fn with_table_name(plan: MigrationPlan, table_name: impl Into<String>) -> Self {
        Self {
            plan,
            table_name: table_name.into(),
            dialect: None,
        }
    }

    /// Create a migrator with a specific tracking table, dialect included
    pub fn with_table(plan: MigrationPlan, table: MigrationTable) -> Self {
        Self {
            plan,
            table_name: table.name().to_string(),
            dialect: Some(table.dialect()),
        }
    }

    pub fn plan(&self) -> &MigrationPlan {
        &self.plan
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Tracking table as rendered for `executor`
    pub fn table_for<E: Executor + ?Sized>(&self, executor: &E) -> MigrationTable {
        let dialect = self.dialect.unwrap_or_else(|| executor.dialect());
        MigrationTable::new(self.table_name.clone(), dialect)
    }

    /// Determine where the data store stands relative to the plan
    ///
    /// Ensures the tracking table exists, then replays the applied names (oldest
    /// first) against the plan starting at its first migration. Every applied name
    /// must match the next declared migration.
    ///
    /// # Returns
    ///
    /// The last matched plan entry, or `None` if nothing has been applied.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::SequenceMismatch` if the applied names diverge from
    /// the plan, or `MigrationError::Storage` if the storage calls fail.
    pub fn current<E: Executor + ?Sized>(&self, executor: &E) -> Result<Option<PlanEntry<'_>>, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::reconcile_span(&self.table_name).entered();

        let table = self.table_for(executor);
        table.ensure(executor)?;

        let mut rows = table.applied(executor)?;
        let walked = self.replay(rows.as_mut());
        let closed = rows.close();

        let current = walked?;
        closed?;

        log::debug!(
            "Current migration: {}",
            current.map(|entry| entry.name()).unwrap_or("<none>")
        );
        Ok(current)
    }

    fn replay<R: Rows + ?Sized>(&self, rows: &mut R) -> Result<Option<PlanEntry<'_>>, MigrationError> {
        let mut current = None;
        let mut to_check = self.plan.first();

        while rows.advance()? {
            let applied = rows.get_string(0)?;

            let Some(expected) = to_check else {
                return Err(MigrationError::SequenceMismatch {
                    applied,
                    expected: None,
                });
            };

            if applied != expected.name() {
                return Err(MigrationError::SequenceMismatch {
                    applied,
                    expected: Some(expected.name().to_string()),
                });
            }

            current = Some(expected);
            to_check = expected.next();
        }

        Ok(current)
    }

    /// Apply the next pending migration
    ///
    /// # Returns
    ///
    /// `Ok(1)` if a migration was applied, `Ok(0)` if the plan is fully applied.
    ///
    /// # Errors
    ///
    /// Returns an error if reconciliation fails or the step fails. A failed step is
    /// rolled back; if the rollback fails too, `MigrationError::RollbackFailed` is
    /// returned.
    pub fn up(&self, conn: &dyn Connection) -> Result<usize, MigrationError> {
        let next = match self.current(conn)? {
            None => self.plan.first(),
            Some(current) => current.next(),
        };

        let Some(next) = next else {
            return Ok(0);
        };

        self.step(conn, next, Direction::Up)?;
        Ok(1)
    }

    /// Revert the most recently applied migration
    ///
    /// # Returns
    ///
    /// `Ok(1)` if a migration was reverted, `Ok(0)` if nothing is applied.
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::up`].
    pub fn down(&self, conn: &dyn Connection) -> Result<usize, MigrationError> {
        let Some(current) = self.current(conn)? else {
            return Ok(0);
        };

        self.step(conn, current, Direction::Down)?;
        Ok(1)
    }

    /// Apply every pending migration
    ///
    /// Each step commits on its own; if a step fails, the steps before it stay
    /// applied.
    ///
    /// # Returns
    ///
    /// The number of migrations applied.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchError`] holding the failing step's error unchanged and
    /// the number of steps this call completed before it.
    pub fn latest(&self, conn: &dyn Connection) -> Result<usize, BatchError> {
        self.drive(conn, Direction::Up, None)
    }

    /// Revert every applied migration, newest first
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::latest`].
    pub fn reset(&self, conn: &dyn Connection) -> Result<usize, BatchError> {
        self.drive(conn, Direction::Down, None)
    }

    /// Apply at most `steps` pending migrations
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::latest`].
    pub fn up_by(&self, conn: &dyn Connection, steps: usize) -> Result<usize, BatchError> {
        self.drive(conn, Direction::Up, Some(steps))
    }

    /// Revert at most `steps` applied migrations
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::latest`].
    pub fn down_by(&self, conn: &dyn Connection, steps: usize) -> Result<usize, BatchError> {
        self.drive(conn, Direction::Down, Some(steps))
    }

    /// Get migration status (applied vs pending)
    ///
    /// # Errors
    ///
    /// Fails exactly when [`Migrator::current`] fails.
    pub fn status<E: Executor + ?Sized>(&self, executor: &E) -> Result<MigrationStatus, MigrationError> {
        let current = self.current(executor)?;
        let applied_count = current.map_or(0, |entry| entry.position() + 1);

        let mut applied = Vec::new();
        let mut pending = Vec::new();
        for (index, entry) in self.plan.iter().enumerate() {
            if index < applied_count {
                applied.push(entry.name().to_string());
            } else {
                pending.push(entry.name().to_string());
            }
        }

        Ok(MigrationStatus::new(applied, pending))
    }

    fn drive(
        &self,
        conn: &dyn Connection,
        direction: Direction,
        limit: Option<usize>,
    ) -> Result<usize, BatchError> {
        let mut performed = 0;

        while limit.map_or(true, |limit| performed < limit) {
            let result = match direction {
                Direction::Up => self.up(conn),
                Direction::Down => self.down(conn),
            };

            match result {
                Ok(0) => break,
                Ok(count) => performed += count,
                Err(error) => {
                    if performed > 0 {
                        log::warn!(
                            "Migrating {} stopped after {} step(s): {}",
                            direction,
                            performed,
                            error
                        );
                    }
                    return Err(BatchError {
                        completed: performed,
                        error,
                    });
                }
            }
        }

        Ok(performed)
    }

    /// Run one migration statement and its log mutation in one transaction
    fn step(&self, conn: &dyn Connection, entry: PlanEntry<'_>, direction: Direction) -> Result<(), MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::step_span(direction, entry.name()).entered();

        let migration = entry.migration();
        let table = self.table_for(conn);
        let (statement, (log_sql, log_values)) = match direction {
            Direction::Up => (migration.up(), table.insert_statement(migration.name())?),
            Direction::Down => (migration.down(), table.delete_statement(migration.name())),
        };

        let trx = conn.begin()?;

        let outcome = trx
            .execute(statement, &[])
            .and_then(|_| trx.execute(&log_sql, &log_values));

        if let Err(original) = outcome {
            return Err(rollback(trx, original));
        }

        trx.commit()?;

        match direction {
            Direction::Up => log::info!("Applied migration '{}'", migration.name()),
            Direction::Down => log::info!("Reverted migration '{}'", migration.name()),
        }
        Ok(())
    }
}

/// Roll back after `original` failed; a rollback failure takes precedence
fn rollback(trx: Box<dyn Transaction + '_>, original: StorageError) -> MigrationError {
    log::warn!("Migration step failed, rolling back: {}", original);

    match trx.rollback() {
        Ok(()) => MigrationError::Storage(original),
        Err(rollback) => {
            log::error!("Rollback failed: {}", rollback);
            MigrationError::RollbackFailed { rollback, original }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;
    use crate::migration::Migration;

    fn scenario_plan() -> MigrationPlan {
        let mut plan = MigrationPlan::new();
        plan.add(Migration::new("A", "create t", "drop t"))
            .add(Migration::new("B", "alter t add c", "alter t drop c"));
        plan
    }

    #[test]
    fn test_current_is_none_on_empty_log() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::new();
        assert!(migrator.current(&conn).unwrap().is_none());
        assert!(conn.has_table());
    }

    #[test]
    fn test_current_points_at_last_applied() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["A"]);
        let current = migrator.current(&conn).unwrap().unwrap();
        assert_eq!(current.name(), "A");
        assert_eq!(current.position(), 0);
    }

    #[test]
    fn test_current_rejects_unknown_trailing_name() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["A", "B", "C"]);
        match migrator.current(&conn) {
            Err(MigrationError::SequenceMismatch { applied, expected }) => {
                assert_eq!(applied, "C");
                assert_eq!(expected, None);
            }
            other => panic!("Expected SequenceMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_current_rejects_out_of_order_name() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["A", "X"]);
        match migrator.current(&conn) {
            Err(MigrationError::SequenceMismatch { applied, expected }) => {
                assert_eq!(applied, "X");
                assert_eq!(expected.as_deref(), Some("B"));
            }
            other => panic!("Expected SequenceMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_up_and_down_single_steps() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::new();

        assert_eq!(migrator.up(&conn).unwrap(), 1);
        assert_eq!(conn.log(), ["A"]);
        assert_eq!(migrator.up(&conn).unwrap(), 1);
        assert_eq!(conn.log(), ["A", "B"]);
        assert_eq!(migrator.up(&conn).unwrap(), 0);
        assert_eq!(conn.log(), ["A", "B"]);

        assert_eq!(migrator.down(&conn).unwrap(), 1);
        assert_eq!(conn.log(), ["A"]);
        assert_eq!(migrator.down(&conn).unwrap(), 1);
        assert_eq!(migrator.down(&conn).unwrap(), 0);
        assert!(conn.log().is_empty());

        assert_eq!(
            conn.schema_statements(),
            ["create t", "alter t add c", "alter t drop c", "drop t"]
        );
    }

    #[test]
    fn test_empty_plan_has_no_work() {
        let migrator = Migrator::new(MigrationPlan::new());
        let conn = MemoryConnection::new();
        assert_eq!(migrator.up(&conn).unwrap(), 0);
        assert_eq!(migrator.down(&conn).unwrap(), 0);
        assert_eq!(migrator.latest(&conn).unwrap(), 0);
    }

    #[test]
    fn test_table_follows_connection_dialect_unless_pinned() {
        let conn = MemoryConnection::new();

        let migrator = Migrator::with_table_name(scenario_plan(), "history");
        let table = migrator.table_for(&conn);
        assert_eq!(table.name(), "history");
        assert_eq!(table.dialect(), conn.dialect());

        let pinned = Migrator::with_table(scenario_plan(), MigrationTable::new("history", Dialect::Sqlite));
        assert_eq!(pinned.table_for(&conn).dialect(), Dialect::Sqlite);
        assert_eq!(pinned.table_name(), "history");
    }

    #[test]
    fn test_failed_statement_rolls_back() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::new();
        conn.fail_on("alter t add c");

        assert_eq!(migrator.up(&conn).unwrap(), 1);
        let err = migrator.up(&conn).unwrap_err();
        assert!(matches!(err, MigrationError::Storage(_)));
        assert_eq!(conn.log(), ["A"]);
        assert_eq!(conn.rollbacks(), 1);
        assert_eq!(conn.schema_statements(), ["create t"]);
    }

    #[test]
    fn test_rollback_failure_takes_precedence() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::new();
        conn.fail_on("create t");
        conn.fail_rollback();

        match migrator.up(&conn) {
            Err(MigrationError::RollbackFailed { rollback, original }) => {
                assert!(rollback.to_string().contains("rollback"));
                assert!(original.to_string().contains("create t"));
            }
            other => panic!("Expected RollbackFailed, got {:?}", other),
        }
        assert!(conn.log().is_empty());
    }

    #[test]
    fn test_failed_log_insert_rolls_back_statement() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["A"]);
        conn.fail_on("INSERT INTO");

        let err = migrator.up(&conn).unwrap_err();
        assert!(matches!(err, MigrationError::Storage(_)));
        assert_eq!(conn.log(), ["A"]);
        assert!(conn.schema_statements().is_empty());
        assert_eq!(conn.rollbacks(), 1);
        assert_eq!(conn.commits(), 0);
    }

    #[test]
    fn test_failed_log_insert_with_failed_rollback() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["A"]);
        conn.fail_on("INSERT INTO");
        conn.fail_rollback();

        match migrator.up(&conn) {
            Err(MigrationError::RollbackFailed { rollback, original }) => {
                assert!(rollback.to_string().contains("rollback"));
                assert!(original.to_string().contains("INSERT INTO"));
            }
            other => panic!("Expected RollbackFailed, got {:?}", other),
        }
        assert_eq!(conn.log(), ["A"]);
        assert!(conn.schema_statements().is_empty());
        assert_eq!(conn.commits(), 0);
    }

    #[test]
    fn test_failed_log_delete_rolls_back_statement() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["A", "B"]);
        conn.fail_on("DELETE FROM");

        let err = migrator.down(&conn).unwrap_err();
        assert!(matches!(err, MigrationError::Storage(_)));
        assert_eq!(conn.log(), ["A", "B"]);
        assert!(conn.schema_statements().is_empty());
        assert_eq!(conn.rollbacks(), 1);
        assert_eq!(conn.commits(), 0);
    }

    #[test]
    fn test_failed_log_delete_with_failed_rollback() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["A", "B"]);
        conn.fail_on("DELETE FROM");
        conn.fail_rollback();

        match migrator.down(&conn) {
            Err(MigrationError::RollbackFailed { rollback, original }) => {
                assert!(rollback.to_string().contains("rollback"));
                assert!(original.to_string().contains("DELETE FROM"));
            }
            other => panic!("Expected RollbackFailed, got {:?}", other),
        }
        assert_eq!(conn.log(), ["A", "B"]);
        assert!(conn.schema_statements().is_empty());
        assert_eq!(conn.commits(), 0);
    }

    #[test]
    fn test_commit_failure_is_storage_error() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::new();
        conn.fail_commit();

        let err = migrator.up(&conn).unwrap_err();
        assert!(matches!(err, MigrationError::Storage(StorageError::Transaction(_))));
        assert!(conn.log().is_empty());
        assert_eq!(conn.rollbacks(), 0);
    }

    #[test]
    fn test_latest_failure_keeps_completed_steps() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::new();
        conn.fail_on("alter t add c");

        let batch = migrator.latest(&conn).unwrap_err();
        assert_eq!(batch.completed, 1);
        assert!(matches!(batch.error, MigrationError::Storage(_)));
        assert_eq!(conn.log(), ["A"]);
    }

    #[test]
    fn test_batch_passes_step_error_through_unchanged() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["X"]);

        let batch = migrator.reset(&conn).unwrap_err();
        assert_eq!(batch.completed, 0);
        match batch.into_error() {
            MigrationError::SequenceMismatch { applied, expected } => {
                assert_eq!(applied, "X");
                assert_eq!(expected.as_deref(), Some("A"));
            }
            other => panic!("Expected SequenceMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_up_by_and_down_by_respect_limits() {
        let plan: MigrationPlan = (1..=4)
            .map(|n| Migration::new(format!("m{}", n), format!("up {}", n), format!("down {}", n)))
            .collect();
        let migrator = Migrator::new(plan);
        let conn = MemoryConnection::new();

        assert_eq!(migrator.up_by(&conn, 3).unwrap(), 3);
        assert_eq!(conn.log(), ["m1", "m2", "m3"]);
        assert_eq!(migrator.up_by(&conn, 3).unwrap(), 1);
        assert_eq!(migrator.down_by(&conn, 2).unwrap(), 2);
        assert_eq!(conn.log(), ["m1", "m2"]);
        assert_eq!(migrator.down_by(&conn, 0).unwrap(), 0);
    }

    #[test]
    fn test_status_splits_applied_and_pending() {
        let migrator = Migrator::new(scenario_plan());
        let conn = MemoryConnection::with_log(["A"]);
        let status = migrator.status(&conn).unwrap();
        assert_eq!(status.applied, ["A"]);
        assert_eq!(status.pending, ["B"]);
        assert!(!status.is_up_to_date());
        assert_eq!(status.current(), Some("A"));
        assert_eq!(status.next_pending(), Some("B"));
    }

    #[test]
    fn test_custom_table_name() {
        let table = MigrationTable::new("schema_history", Dialect::Sqlite);
        let migrator = Migrator::with_table(scenario_plan(), table);
        let conn = MemoryConnection::with_table("schema_history");

        assert_eq!(migrator.latest(&conn).unwrap(), 2);
        assert_eq!(conn.log(), ["A", "B"]);
    }
}
