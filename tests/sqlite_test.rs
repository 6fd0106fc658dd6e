//! Migration engine against a real SQLite database
#![cfg(feature = "sqlite")]

use stepwise::executor::Executor;
use stepwise::migration::{
    load_plan, startup_migrations, startup_migrations_from_config, Dialect, Migration,
    MigrationError, MigrationPlan, MigrationTable, Migrator,
};
use stepwise::StepwiseConfig;
use stepwise::sqlite::SqliteConnection;
use tempfile::TempDir;

fn sqlite_migrator(plan: MigrationPlan) -> Migrator {
    Migrator::with_table(plan, MigrationTable::new("migrations", Dialect::Sqlite))
}

fn users_plan() -> MigrationPlan {
    let mut plan = MigrationPlan::new();
    plan.add(Migration::new(
        "create_users",
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "DROP TABLE users",
    ))
    .add(Migration::new(
        "index_users_name",
        "CREATE INDEX idx_users_name ON users (name)",
        "DROP INDEX idx_users_name",
    ));
    plan
}

fn table_exists(conn: &SqliteConnection, name: &str) -> bool {
    conn.connection()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
        .unwrap_or(false)
}

#[test]
fn test_latest_and_reset() {
    let conn = SqliteConnection::in_memory().unwrap();
    let migrator = sqlite_migrator(users_plan());

    assert_eq!(migrator.latest(&conn).unwrap(), 2);
    assert!(table_exists(&conn, "users"));
    assert!(table_exists(&conn, "idx_users_name"));

    let table = migrator.table_for(&conn);
    assert_eq!(table.dialect(), Dialect::Sqlite);
    assert_eq!(table.applied_names(&conn).unwrap(), ["create_users", "index_users_name"]);
    assert_eq!(migrator.latest(&conn).unwrap(), 0);

    assert_eq!(migrator.reset(&conn).unwrap(), 2);
    assert!(!table_exists(&conn, "users"));
    assert!(table.applied_names(&conn).unwrap().is_empty());
}

#[test]
fn test_failed_statement_leaves_no_trace() {
    let conn = SqliteConnection::in_memory().unwrap();
    let mut plan = users_plan();
    plan.add(Migration::new(
        "broken",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY); INSERT INTO missing_table VALUES (1);",
        "DROP TABLE orders",
    ));
    let migrator = sqlite_migrator(plan);

    let batch = migrator.latest(&conn).unwrap_err();
    assert_eq!(batch.completed, 2);
    assert!(matches!(batch.error, MigrationError::Storage(_)));

    assert!(!table_exists(&conn, "orders"));
    let status = migrator.status(&conn).unwrap();
    assert_eq!(status.applied, ["create_users", "index_users_name"]);
    assert_eq!(status.pending, ["broken"]);
}

#[test]
fn test_divergence_detected_from_persisted_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");

    {
        let conn = SqliteConnection::open(&path).unwrap();
        sqlite_migrator(users_plan()).latest(&conn).unwrap();
    }

    let mut renamed = MigrationPlan::new();
    renamed
        .add(Migration::new("create_users", "", ""))
        .add(Migration::new("index_users_email", "", ""));

    let conn = SqliteConnection::open(&path).unwrap();
    match sqlite_migrator(renamed).up(&conn) {
        Err(MigrationError::SequenceMismatch { applied, expected }) => {
            assert_eq!(applied, "index_users_name");
            assert_eq!(expected.as_deref(), Some("index_users_email"));
        }
        other => panic!("Expected SequenceMismatch, got {:?}", other),
    }
}

#[test]
fn test_plan_from_migration_files() {
    let dir = TempDir::new().unwrap();
    let files = [
        ("20240101000000_create_posts.up.sql", "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT)"),
        ("20240101000000_create_posts.down.sql", "DROP TABLE posts"),
        (
            "20240102000000_add_body.up.sql",
            "ALTER TABLE posts ADD COLUMN body TEXT;\nCREATE INDEX idx_posts_title ON posts (title);",
        ),
        (
            "20240102000000_add_body.down.sql",
            "DROP INDEX idx_posts_title;\nALTER TABLE posts DROP COLUMN body;",
        ),
    ];
    for (name, sql) in files {
        std::fs::write(dir.path().join(name), sql).unwrap();
    }

    let conn = SqliteConnection::in_memory().unwrap();
    let migrator = sqlite_migrator(load_plan(dir.path()).unwrap());

    assert_eq!(migrator.latest(&conn).unwrap(), 2);
    conn.execute("INSERT INTO posts (title, body) VALUES ('t', 'b')", &[])
        .unwrap();

    assert_eq!(migrator.down(&conn).unwrap(), 1);
    assert!(conn
        .execute("INSERT INTO posts (title, body) VALUES ('t', 'b')", &[])
        .is_err());
    assert_eq!(
        migrator.status(&conn).unwrap().current(),
        Some("20240101000000_create_posts")
    );
}

#[test]
fn test_default_migrator_uses_sqlite_dialect() {
    let conn = SqliteConnection::in_memory().unwrap();
    let migrator = Migrator::new(users_plan());

    assert_eq!(migrator.latest(&conn).unwrap(), 2);
    assert!(table_exists(&conn, "migrations"));
    assert_eq!(migrator.status(&conn).unwrap().applied_count, 2);
}

#[test]
fn test_startup_migrations_on_sqlite() {
    let conn = SqliteConnection::in_memory().unwrap();

    assert_eq!(startup_migrations(&conn, users_plan()).unwrap(), 2);
    assert_eq!(startup_migrations(&conn, users_plan()).unwrap(), 0);
    assert!(table_exists(&conn, "users"));

    let table = MigrationTable::new("migrations", Dialect::Sqlite);
    assert_eq!(
        table.applied_names(&conn).unwrap(),
        ["create_users", "index_users_name"]
    );
}

#[test]
fn test_startup_from_config_without_url_on_sqlite() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("001_create_tags.up.sql"),
        "CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT);\nCREATE INDEX idx_tags_label ON tags (label);",
    )
    .unwrap();
    std::fs::write(dir.path().join("001_create_tags.down.sql"), "DROP TABLE tags").unwrap();

    let mut config = StepwiseConfig::default();
    config.migrations.directory = dir.path().to_path_buf();
    config.migrations.table = "schema_history".to_string();

    let conn = SqliteConnection::in_memory().unwrap();
    assert_eq!(startup_migrations_from_config(&conn, &config).unwrap(), 1);
    assert!(table_exists(&conn, "tags"));
    assert!(table_exists(&conn, "idx_tags_label"));

    let table = MigrationTable::new("schema_history", Dialect::Sqlite);
    assert_eq!(table.applied_names(&conn).unwrap(), ["001_create_tags"]);
}
