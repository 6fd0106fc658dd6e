//! Migration record definition

/// One named, reversible schema change
///
/// `up` and `down` are opaque statements: they are never parsed or validated here,
/// only handed to the storage backend verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Migration {
    name: String,
    up: String,
    down: String,
}

impl Migration {
    /// Create a new migration
    ///
    /// # Example
    ///
    /// ```
    /// use stepwise::migration::Migration;
    ///
    /// let migration = Migration::new(
    ///     "create_users",
    ///     "CREATE TABLE users (id INT)",
    ///     "DROP TABLE users",
    /// );
    /// assert_eq!(migration.name(), "create_users");
    /// ```
    pub fn new(name: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down: down.into(),
        }
    }

    /// Durable identity of the migration in the tracking table
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forward statement
    pub fn up(&self) -> &str {
        &self.up
    }

    /// Reverse statement
    pub fn down(&self) -> &str {
        &self.down
    }
}
