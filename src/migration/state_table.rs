//! Migration tracking table management
//!
//! The tracking table records the name of every applied migration in
//! application order:
//!
//! - `id` - auto-increment primary key, gives the insertion order
//! - `name` - migration name, unique
//!
//! Statements are rendered with sea-query for the target [`Dialect`].

use crate::executor::{Executor, Rows, StorageError};
use crate::migration::MigrationError;
use sea_query::{
    Alias, ColumnDef, Expr, ExprTrait, MysqlQueryBuilder, Order, PostgresQueryBuilder, Query,
    SqliteQueryBuilder, Table, Value,
};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Default tracking table name
pub const DEFAULT_TABLE: &str = "migrations";

const ID_COLUMN: &str = "id";
const NAME_COLUMN: &str = "name";

/// SQL dialect used to render tracking table statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
    Sqlite,
}

impl Dialect {
    /// Infer the dialect from a connection URL scheme
    ///
    /// `postgres://`/`postgresql://` and key-value strings (`host=...`) map to
    /// Postgres, `mysql://`/`mariadb://` to MySQL, and `sqlite:` URLs, `:memory:`
    /// and `.db`/`.sqlite` paths to SQLite.
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Dialect::Postgres)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Dialect::MySql)
        } else if lower.starts_with("sqlite:")
            || lower == ":memory:"
            || lower.ends_with(".db")
            || lower.ends_with(".sqlite")
            || lower.ends_with(".sqlite3")
        {
            Some(Dialect::Sqlite)
        } else if lower.contains("host=") {
            Some(Dialect::Postgres)
        } else {
            None
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::MySql => write!(f, "mysql"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for Dialect {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(MigrationError::Config(format!("Unknown SQL dialect '{}'", other))),
        }
    }
}

macro_rules! build_for {
    ($dialect:expr, $statement:expr) => {
        match $dialect {
            Dialect::Postgres => $statement.build(PostgresQueryBuilder),
            Dialect::MySql => $statement.build(MysqlQueryBuilder),
            Dialect::Sqlite => $statement.build(SqliteQueryBuilder),
        }
    };
}

/// The tracking table of applied migrations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTable {
    name: String,
    dialect: Dialect,
}

impl Default for MigrationTable {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE, Dialect::default())
    }
}

impl MigrationTable {
    pub fn new(name: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            dialect,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for the tracking table
    pub fn create_statement(&self) -> String {
        build_for!(
            self.dialect,
            Table::create()
                .table(Alias::new(self.name.clone()))
                .if_not_exists()
                .col(
                    ColumnDef::new(Alias::new(ID_COLUMN))
                        .integer()
                        .not_null()
                        .auto_increment()
                        .primary_key()
                )
                .col(
                    ColumnDef::new(Alias::new(NAME_COLUMN))
                        .string()
                        .string_len(255)
                        .not_null()
                        .unique_key()
                )
        )
    }

    /// Select applied migration names in application order
    pub fn list_statement(&self) -> (String, Vec<Value>) {
        let (sql, values) = build_for!(
            self.dialect,
            Query::select()
                .column(Alias::new(NAME_COLUMN))
                .from(Alias::new(self.name.clone()))
                .order_by(Alias::new(ID_COLUMN), Order::Asc)
        );
        (sql, values.0)
    }

    /// Record `migration_name` as applied
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidStatement` if the statement cannot be built.
    pub fn insert_statement(&self, migration_name: &str) -> Result<(String, Vec<Value>), MigrationError> {
        let mut insert = Query::insert();
        insert
            .into_table(Alias::new(self.name.clone()))
            .columns([Alias::new(NAME_COLUMN)])
            .values([migration_name.into()])
            .map_err(|e| MigrationError::InvalidStatement(e.to_string()))?;

        let (sql, values) = build_for!(self.dialect, insert);
        Ok((sql, values.0))
    }

    /// Remove `migration_name` from the applied set
    pub fn delete_statement(&self, migration_name: &str) -> (String, Vec<Value>) {
        let (sql, values) = build_for!(
            self.dialect,
            Query::delete()
                .from_table(Alias::new(self.name.clone()))
                .and_where(Expr::col(Alias::new(NAME_COLUMN)).eq(migration_name))
        );
        (sql, values.0)
    }

    /// Create the tracking table if it does not exist
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the statement fails.
    pub fn ensure<E: Executor + ?Sized>(&self, executor: &E) -> Result<(), StorageError> {
        executor.execute(&self.create_statement(), &[])?;
        Ok(())
    }

    /// Open a cursor over applied migration names, oldest first
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    pub fn applied<'e, E: Executor + ?Sized>(&self, executor: &'e E) -> Result<Box<dyn Rows + 'e>, StorageError> {
        let (sql, values) = self.list_statement();
        executor.query(&sql, &values)
    }

    /// Read every applied migration name, oldest first
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query or a row read fails.
    pub fn applied_names<E: Executor + ?Sized>(&self, executor: &E) -> Result<Vec<String>, StorageError> {
        let mut rows = self.applied(executor)?;
        let mut names = Vec::new();
        while rows.advance()? {
            names.push(rows.get_string(0)?);
        }
        rows.close()?;
        Ok(names)
    }
}
