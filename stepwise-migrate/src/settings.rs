//! Resolution of CLI flags, environment and `config/stepwise.toml`

use std::path::PathBuf;
use stepwise::config::StepwiseConfig;
use stepwise::migration::{Dialect, MigrationTable};

/// Environment variables consulted for the database URL, in order
pub const DATABASE_URL_VARS: [&str; 2] = ["STEPWISE_DATABASE_URL", "DATABASE_URL"];

/// Effective settings for one CLI invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub migrations_dir: PathBuf,
    pub table: MigrationTable,
}

impl Settings {
    /// Combine flags, environment and configuration
    ///
    /// Database URL precedence: flag, `STEPWISE_DATABASE_URL`, `DATABASE_URL`,
    /// then `database.url` from the configuration.
    pub fn resolve<F>(
        database_url: Option<String>,
        migrations_dir: Option<PathBuf>,
        table: Option<String>,
        env: F,
        config: &StepwiseConfig,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = database_url
            .or_else(|| DATABASE_URL_VARS.iter().find_map(|var| env(var)))
            .or_else(|| Some(config.database.url.clone()))
            .filter(|url| !url.is_empty());

        let dialect = config
            .migrations
            .dialect
            .or_else(|| database_url.as_deref().and_then(Dialect::from_url))
            .unwrap_or_default();

        Self {
            database_url,
            migrations_dir: migrations_dir.unwrap_or_else(|| config.migrations.directory.clone()),
            table: MigrationTable::new(
                table.unwrap_or_else(|| config.migrations.table.clone()),
                dialect,
            ),
        }
    }
}
