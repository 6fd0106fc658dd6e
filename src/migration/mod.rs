//! Migration system for Stepwise
//!
//! A [`MigrationPlan`] declares an ordered chain of named, reversible
//! migrations. The [`Migrator`] reconciles that chain against the tracking table
//! of applied names and moves the data store forward or backward one migration
//! at a time, each step in its own transaction.
//!
//! # Example
//!
//! ```rust
//! use stepwise::memory::MemoryConnection;
//! use stepwise::migration::{Migration, MigrationPlan, Migrator};
//!
//! let mut plan = MigrationPlan::new();
//! plan.add(Migration::new(
//!     "create_users",
//!     "CREATE TABLE users (id INT)",
//!     "DROP TABLE users",
//! ));
//!
//! let migrator = Migrator::new(plan);
//! let conn = MemoryConnection::new();
//! migrator.latest(&conn)?;
//!
//! let status = migrator.status(&conn)?;
//! assert!(status.is_up_to_date());
//! assert_eq!(status.current(), Some("create_users"));
//! # Ok::<(), stepwise::migration::MigrationError>(())
//! ```

pub mod error;
pub mod file;
pub mod migration;
pub mod migrator;
pub mod plan;
pub mod startup;
pub mod state_table;
pub mod status;

pub use error::{BatchError, MigrationError};
pub use file::{discover_migrations, load_plan, MigrationFile};
pub use migration::Migration;
pub use migrator::{Direction, Migrator};
pub use plan::{Iter, MigrationPlan, PlanEntry};
pub use startup::{startup_migrations, startup_migrations_from_config, startup_migrations_with_table};
pub use state_table::{Dialect, MigrationTable, DEFAULT_TABLE};
pub use status::MigrationStatus;
