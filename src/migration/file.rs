//! Migration file discovery and parsing
//!
//! A migrations directory holds one pair of SQL files per migration:
//!
//! ```text
//! migrations/
//!   20240120120000_create_users.up.sql
//!   20240120120000_create_users.down.sql
//!   20240121093000_add_email_index.up.sql
//!   20240121093000_add_email_index.down.sql
//! ```
//!
//! Pairs are ordered by their numeric version, and no two pairs may share a
//! version. The migration name recorded in the tracking table is the file stem
//! without the direction suffix, exactly as written (`20240120120000_create_users`,
//! `001_init`).

use crate::migration::{Migration, MigrationError, MigrationPlan};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const FILE_PATTERN: &str = r"^(\d+)_([A-Za-z0-9_]+)\.(up|down)\.sql$";

/// A discovered pair of migration files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Migration version (leading digits of the file name)
    pub version: u64,

    /// File stem without the direction suffix, as written on disk
    pub stem: String,

    /// Human-readable part of the name
    pub name: String,

    /// Path to the `.up.sql` file
    pub up_path: PathBuf,

    /// Path to the `.down.sql` file
    pub down_path: PathBuf,
}

impl MigrationFile {
    /// Name recorded in the tracking table: the file stem, leading zeros included
    #[must_use]
    pub fn migration_name(&self) -> String {
        self.stem.clone()
    }

    /// Read both files into a [`Migration`]
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidFormat` if either file cannot be read.
    pub fn load(&self) -> Result<Migration, MigrationError> {
        let up = read_statement(&self.up_path)?;
        let down = read_statement(&self.down_path)?;
        Ok(Migration::new(self.migration_name(), up, down))
    }
}

/// Direction suffix and file parts parsed from a migration file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    pub version: u64,
    /// `{version}_{name}` exactly as written
    pub stem: String,
    pub name: String,
    pub is_up: bool,
}

/// Parse a migration file name
///
/// Expected format: `{version}_{name}.up.sql` or `{version}_{name}.down.sql`
///
/// # Example
/// - `20240120120000_create_users.up.sql` → version: 20240120120000, name: "create_users", up
/// - `001_init.down.sql` → version: 1, stem: "001_init", down
///
/// # Errors
///
/// Returns `MigrationError::InvalidFormat` if the name does not match.
pub fn parse_filename(filename: &str) -> Result<ParsedFileName, MigrationError> {
    let re = Regex::new(FILE_PATTERN)
        .map_err(|e| MigrationError::InvalidFormat(format!("Invalid regex: {}", e)))?;

    let invalid = || {
        MigrationError::InvalidFormat(format!(
            "Migration file name '{}' does not match expected pattern: {{version}}_{{name}}.up.sql or {{version}}_{{name}}.down.sql",
            filename
        ))
    };

    let caps = re.captures(filename).ok_or_else(invalid)?;
    let (Some(version), Some(name), Some(direction)) = (caps.get(1), caps.get(2), caps.get(3)) else {
        return Err(invalid());
    };

    let version_text = version.as_str();
    let version = version_text.parse::<u64>().map_err(|e| {
        MigrationError::InvalidFormat(format!("Invalid version in '{}': {}", filename, e))
    })?;

    Ok(ParsedFileName {
        version,
        stem: format!("{}_{}", version_text, name.as_str()),
        name: name.as_str().to_string(),
        is_up: direction.as_str() == "up",
    })
}

/// Discover all migration file pairs in a directory
///
/// Files that do not end in `.sql` are ignored.
///
/// # Returns
///
/// Returns the pairs sorted by version (oldest first).
///
/// # Errors
///
/// Returns errors if:
/// - The directory doesn't exist or can't be read
/// - A `.sql` file has an invalid name
/// - A migration has only one of its two files
/// - Two migrations share a version (`1_a` and `01_a`, or `2_a` and `2_b`)
pub fn discover_migrations(migrations_dir: &Path) -> Result<Vec<MigrationFile>, MigrationError> {
    if !migrations_dir.exists() {
        return Err(MigrationError::FileNotFound(
            migrations_dir.to_string_lossy().to_string(),
        ));
    }

    if !migrations_dir.is_dir() {
        return Err(MigrationError::InvalidFormat(format!(
            "Path is not a directory: {}",
            migrations_dir.display()
        )));
    }

    let entries = fs::read_dir(migrations_dir).map_err(|e| {
        MigrationError::FileNotFound(format!(
            "Failed to read migrations directory {}: {}",
            migrations_dir.display(),
            e
        ))
    })?;

    let mut pairs: BTreeMap<String, Pair> = BTreeMap::new();

    for entry in entries {
        let entry = entry.map_err(|e| {
            MigrationError::FileNotFound(format!("Failed to read directory entry: {}", e))
        })?;

        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }

        let filename = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            MigrationError::InvalidFormat(format!("Invalid filename: {}", path.display()))
        })?;

        let parsed = parse_filename(filename)?;
        let slot = pairs.entry(parsed.stem).or_insert_with(|| Pair {
            version: parsed.version,
            name: parsed.name,
            up: None,
            down: None,
        });
        if parsed.is_up {
            slot.up = Some(path);
        } else {
            slot.down = Some(path);
        }
    }

    let mut migrations = Vec::with_capacity(pairs.len());
    for (stem, pair) in pairs {
        let up_path = pair.up.ok_or_else(|| MigrationError::MissingFile {
            name: stem.clone(),
            direction: "up".to_string(),
        })?;
        let down_path = pair.down.ok_or_else(|| MigrationError::MissingFile {
            name: stem.clone(),
            direction: "down".to_string(),
        })?;

        migrations.push(MigrationFile {
            version: pair.version,
            stem,
            name: pair.name,
            up_path,
            down_path,
        });
    }

    migrations.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.stem.cmp(&b.stem)));
    if let Some(clash) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(MigrationError::InvalidFormat(format!(
            "Migrations '{}' and '{}' share version {}. Each migration needs a unique version.",
            clash[0].stem, clash[1].stem, clash[0].version
        )));
    }

    log::debug!(
        "Discovered {} migration(s) in {}",
        migrations.len(),
        migrations_dir.display()
    );
    Ok(migrations)
}

/// Up and down files collected for one stem
struct Pair {
    version: u64,
    name: String,
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

/// Build a [`MigrationPlan`] from the files of a migrations directory
///
/// # Errors
///
/// Same as [`discover_migrations`], plus `InvalidFormat` if a file cannot be read.
pub fn load_plan(migrations_dir: &Path) -> Result<MigrationPlan, MigrationError> {
    discover_migrations(migrations_dir)?
        .iter()
        .map(MigrationFile::load)
        .collect()
}

fn read_statement(path: &Path) -> Result<String, MigrationError> {
    fs::read_to_string(path).map_err(|e| {
        MigrationError::InvalidFormat(format!("Failed to read {}: {}", path.display(), e))
    })
}
