//! # Stepwise
//!
//! Linear, reversible schema migrations for SQL data stores.
//!
//! - [`migration`] - plans, the migration engine, file discovery and startup helpers
//! - [`executor`] - the storage contract every backend implements
//! - [`postgres`], [`sqlite`], [`memory`] - backends
//! - [`config`] - `config/stepwise.toml` and `STEPWISE_*` settings

pub mod config;
pub mod executor;
pub mod memory;
pub mod migration;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "tracing")]
mod tracing_helpers;

pub use crate::config::StepwiseConfig;
pub use executor::{Connection, ExecResult, Executor, Rows, StorageError, Transaction};
pub use migration::{BatchError, Migration, MigrationError, MigrationPlan, Migrator};
