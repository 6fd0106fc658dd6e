//! Migration-specific error types

use crate::executor::StorageError;

/// Migration-specific errors
#[derive(Debug)]
pub enum MigrationError {
    /// The persisted log diverges from the declared plan
    ///
    /// `expected` is `None` when the log is longer than the plan.
    SequenceMismatch {
        applied: String,
        expected: Option<String>,
    },
    /// Storage error (execute, query, begin, commit or rollback)
    Storage(StorageError),
    /// Rolling back a failed step failed as well
    ///
    /// The rollback failure is the primary error; `original` is the failure that
    /// triggered the rollback.
    RollbackFailed {
        rollback: StorageError,
        original: StorageError,
    },
    /// Two migrations in one plan share a name
    DuplicateName(String),
    /// A tracking-table statement could not be built
    InvalidStatement(String),
    /// Migrations directory not found
    FileNotFound(String),
    /// Invalid migration file name or layout
    InvalidFormat(String),
    /// One half of a migration file pair is missing
    MissingFile { name: String, direction: String },
    /// Configuration could not be loaded
    Config(String),
}

impl MigrationError {
    #[must_use]
    pub fn is_sequence_mismatch(&self) -> bool {
        matches!(self, MigrationError::SequenceMismatch { .. })
    }
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::SequenceMismatch {
                applied,
                expected: None,
            } => write!(
                f,
                "Mismatch between migration plan and applied migrations: '{}' is not in migration plan.",
                applied
            ),
            MigrationError::SequenceMismatch {
                applied,
                expected: Some(expected),
            } => write!(
                f,
                "Mismatch between migration plan and applied migrations: '{}' != '{}'.",
                applied, expected
            ),
            MigrationError::Storage(e) => write!(f, "{}", e),
            MigrationError::RollbackFailed { rollback, original } => write!(
                f,
                "Rollback failed: {}\n\
                 The rollback was triggered by: {}",
                rollback, original
            ),
            MigrationError::DuplicateName(name) => {
                write!(f, "Migration name '{}' appears more than once in the plan", name)
            }
            MigrationError::InvalidStatement(msg) => {
                write!(f, "Invalid tracking table statement: {}", msg)
            }
            MigrationError::FileNotFound(path) => write!(f, "Migrations directory not found: {}", path),
            MigrationError::InvalidFormat(msg) => write!(f, "Invalid migration format: {}", msg),
            MigrationError::MissingFile { name, direction } => write!(
                f,
                "Migration '{}' has no {} file\n\
                 Suggestion: every migration needs both {}.up.sql and {}.down.sql",
                name, direction, name, name
            ),
            MigrationError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Storage(e) => Some(e),
            MigrationError::RollbackFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }
}

impl From<StorageError> for MigrationError {
    fn from(error: StorageError) -> Self {
        MigrationError::Storage(error)
    }
}

/// A batch (`latest`, `reset`, `up_by`, `down_by`) stopped on a failing step
///
/// `error` is the step's error exactly as the step reported it. The `completed`
/// steps before it stay committed.
#[derive(Debug)]
pub struct BatchError {
    pub completed: usize,
    pub error: MigrationError,
}

impl BatchError {
    #[must_use]
    pub fn into_error(self) -> MigrationError {
        self.error
    }
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Migration batch stopped after {} completed step(s)",
            self.completed
        )
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<BatchError> for MigrationError {
    fn from(batch: BatchError) -> Self {
        batch.error
    }
}
