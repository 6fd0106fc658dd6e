//! PostgreSQL backend over `may_postgres`
//!
//! Statements run on the calling coroutine or thread; there is no pooling.

mod connection;
mod executor;
mod transaction;
mod value_conversion;

pub use connection::{connect, validate_connection_string, ConnectionError};
pub use executor::{MayPostgresExecutor, PostgresRows};
pub use transaction::PostgresTransaction;
pub use value_conversion::with_converted_params;
