//! Migration status tracking

/// Where the data store stands relative to a migration plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Applied migrations, in plan order
    pub applied: Vec<String>,

    /// Pending migrations, in plan order
    pub pending: Vec<String>,

    /// Total number of migrations in the plan
    pub total: usize,

    /// Number of applied migrations
    pub applied_count: usize,

    /// Number of pending migrations
    pub pending_count: usize,
}

impl MigrationStatus {
    /// Create a new `MigrationStatus`
    #[must_use]
    pub fn new(applied: Vec<String>, pending: Vec<String>) -> Self {
        let applied_count = applied.len();
        let pending_count = pending.len();
        let total = applied_count + pending_count;

        Self {
            applied,
            pending,
            total,
            applied_count,
            pending_count,
        }
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    /// The most recently applied migration
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.applied.last().map(String::as_str)
    }

    /// The migration the next `up` would apply
    #[must_use]
    pub fn next_pending(&self) -> Option<&str> {
        self.pending.first().map(String::as_str)
    }
}
