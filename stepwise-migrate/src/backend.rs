//! Opening a storage connection from a database URL

use anyhow::{bail, Context, Result};
use stepwise::executor::Connection;
use stepwise::migration::Dialect;
use stepwise::postgres::{connect, MayPostgresExecutor};
use stepwise::sqlite::SqliteConnection;

/// Open the backend matching the URL scheme
///
/// - `postgres://`, `postgresql://` or `host=...` → may_postgres
/// - `sqlite:`, `:memory:`, `*.db`, `*.sqlite` → rusqlite
pub fn open_connection(database_url: &str) -> Result<Box<dyn Connection>> {
    match Dialect::from_url(database_url) {
        Some(Dialect::Postgres) => {
            let client = connect(database_url).context("Error connecting to database")?;
            Ok(Box::new(MayPostgresExecutor::new(client)))
        }
        Some(Dialect::Sqlite) => {
            let conn = SqliteConnection::open_url(database_url)
                .context("Error opening SQLite database")?;
            Ok(Box::new(conn))
        }
        Some(Dialect::MySql) => bail!("MySQL URLs are not supported by stepwise-migrate yet"),
        None => bail!(
            "Unrecognised database URL '{}'. Expected postgres://..., sqlite:... or a .db file",
            redact(database_url)
        ),
    }
}

/// Hide the password part of a URL for error messages
pub fn redact(database_url: &str) -> String {
    let Some((scheme, rest)) = database_url.split_once("://") else {
        return database_url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return database_url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{}://{}:***@{}", scheme, user, host),
        None => database_url.to_string(),
    }
}
