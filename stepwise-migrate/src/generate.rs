//! Generation of new migration file pairs

use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use stepwise::migration::MigrationError;

/// Paths of a generated migration pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMigration {
    pub name: String,
    pub up_path: PathBuf,
    pub down_path: PathBuf,
}

/// Create `{timestamp}_{name}.up.sql` and `{timestamp}_{name}.down.sql` in `migrations_dir`
///
/// The directory is created if needed. Existing files are never overwritten.
pub fn generate_migration(
    migrations_dir: &Path,
    name: &str,
    now: DateTime<Utc>,
) -> Result<GeneratedMigration, MigrationError> {
    let re = Regex::new(r"^[A-Za-z0-9_]+$")
        .map_err(|e| MigrationError::InvalidFormat(format!("Invalid regex: {}", e)))?;
    if !re.is_match(name) {
        return Err(MigrationError::InvalidFormat(format!(
            "Migration name '{}' may only contain letters, digits and underscores",
            name
        )));
    }

    fs::create_dir_all(migrations_dir).map_err(|e| {
        MigrationError::FileNotFound(format!("Failed to create migrations directory: {}", e))
    })?;

    let timestamp = now.format("%Y%m%d%H%M%S").to_string();
    let full_name = format!("{}_{}", timestamp, name);
    let up_path = migrations_dir.join(format!("{}.up.sql", full_name));
    let down_path = migrations_dir.join(format!("{}.down.sql", full_name));

    if up_path.exists() || down_path.exists() {
        return Err(MigrationError::InvalidFormat(format!(
            "Migration '{}' already exists",
            full_name
        )));
    }

    let generated = now.format("%Y-%m-%d %H:%M:%S UTC");
    write_file(
        &up_path,
        &format!(
            "-- Migration: {}\n-- Generated: {}\n-- Forward statements\n",
            full_name, generated
        ),
    )?;
    write_file(
        &down_path,
        &format!(
            "-- Migration: {}\n-- Generated: {}\n-- Statements reverting {}.up.sql\n",
            full_name, generated, full_name
        ),
    )?;

    Ok(GeneratedMigration {
        name: full_name,
        up_path,
        down_path,
    })
}

fn write_file(path: &Path, content: &str) -> Result<(), MigrationError> {
    fs::write(path, content).map_err(|e| {
        MigrationError::FileNotFound(format!(
            "Failed to write migration file {}: {}",
            path.display(),
            e
        ))
    })
}
