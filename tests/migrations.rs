//! Migration runner tests against SQLite and on-disk migration directories

#![cfg(feature = "sqlite")]

use async_trait::async_trait;
use rowbound::core::MigrationDirection;
use rowbound::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

async fn memory_db() -> Result<SqliteDatabase> {
    SqliteDatabase::open(&ConnectionConfig::sqlite_memory()).await
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write migration file");
}

fn table_sql(table: &str) -> String {
    format!(
        "-- migrate:up\nCREATE TABLE {table} (id INTEGER PRIMARY KEY);\n-- migrate:down\nDROP TABLE {table};\n"
    )
}

async fn table_exists(db: &SqliteDatabase, table: &str) -> Result<bool> {
    let rows = db
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[table.into()],
        )
        .await?;
    Ok(!rows.is_empty())
}

fn migrations_dir() -> TempDir {
    tempfile::tempdir().expect("tempdir")
}

#[tokio::test]
async fn test_applies_in_lexical_order() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "20240103_comments.sql", &table_sql("comments"));
    write(dir.path(), "20240101_users.sql", &table_sql("users"));
    write(dir.path(), "20240102_posts.sql", &table_sql("posts"));

    let db = memory_db().await?;
    let runner = MigrationRunner::new(&db);

    let applied = runner.migrate(dir.path()).await?;
    assert_eq!(
        applied,
        vec!["20240101_users", "20240102_posts", "20240103_comments"]
    );
    assert_eq!(runner.applied_versions().await?, applied);

    // Nothing left to do on a second run
    assert!(runner.migrate(dir.path()).await?.is_empty());
    assert!(runner.pending(dir.path()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_halts_at_first_failure() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "001_a.sql", &table_sql("a"));
    write(dir.path(), "002_b.sql", "CREATE TABL broken (id INTEGER);");
    write(dir.path(), "003_c.sql", &table_sql("c"));

    let db = memory_db().await?;
    let runner = MigrationRunner::new(&db);

    let err = runner.migrate(dir.path()).await.unwrap_err();
    assert_eq!(err.migration_version(), Some("002_b"));
    assert!(matches!(
        err,
        DatabaseError::MigrationFailed {
            direction: MigrationDirection::Up,
            ..
        }
    ));

    assert_eq!(runner.applied_versions().await?, vec!["001_a"]);
    assert!(table_exists(&db, "a").await?);
    assert!(!table_exists(&db, "c").await?);
    assert_eq!(runner.pending(dir.path()).await?, vec!["002_b", "003_c"]);
    Ok(())
}

#[tokio::test]
async fn test_double_rollback_empties_ledger() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "001_users.sql", &table_sql("users"));
    write(dir.path(), "002_posts.sql", &table_sql("posts"));

    let db = memory_db().await?;
    let runner = MigrationRunner::new(&db);
    runner.migrate(dir.path()).await?;

    // Both versions share a timestamp second; version breaks the tie
    assert_eq!(
        runner.rollback(dir.path()).await?,
        RollbackOutcome::RolledBack {
            version: "002_posts".into()
        }
    );
    assert!(!table_exists(&db, "posts").await?);

    assert_eq!(
        runner.rollback(dir.path()).await?,
        RollbackOutcome::RolledBack {
            version: "001_users".into()
        }
    );
    assert!(runner.applied_versions().await?.is_empty());
    assert_eq!(
        runner.rollback(dir.path()).await?,
        RollbackOutcome::NothingToRollBack
    );
    Ok(())
}

#[tokio::test]
async fn test_rollback_targets_latest_applied_at() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "001_users.sql", &table_sql("users"));
    write(dir.path(), "002_posts.sql", &table_sql("posts"));

    let db = memory_db().await?;
    let runner = MigrationRunner::new(&db);
    runner.migrate(dir.path()).await?;

    // 001 was re-applied later than 002
    db.execute(
        "UPDATE schema_migrations SET applied_at = ? WHERE version = ?",
        &["2999-01-01 00:00:00".into(), "001_users".into()],
    )
    .await?;

    let outcome = runner.rollback(dir.path()).await?;
    assert_eq!(outcome.version(), Some("001_users"));
    assert!(table_exists(&db, "posts").await?);
    Ok(())
}

#[tokio::test]
async fn test_rollback_with_missing_file_forgets_version() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "001_users.sql", &table_sql("users"));
    write(dir.path(), "002_posts.sql", &table_sql("posts"));

    let db = memory_db().await?;
    let runner = MigrationRunner::new(&db);
    runner.migrate(dir.path()).await?;
    fs::remove_file(dir.path().join("002_posts.sql"))?;

    assert_eq!(
        runner.rollback(dir.path()).await?,
        RollbackOutcome::Forgotten {
            version: "002_posts".into()
        }
    );
    // down never ran
    assert!(table_exists(&db, "posts").await?);
    assert_eq!(runner.applied_versions().await?, vec!["001_users"]);
    Ok(())
}

#[tokio::test]
async fn test_failed_down_keeps_ledger_entry() -> Result<()> {
    let dir = migrations_dir();
    write(
        dir.path(),
        "001_users.sql",
        "-- migrate:up\nCREATE TABLE users (id INTEGER);\n-- migrate:down\nDROP TABLE no_such_table;\n",
    );

    let db = memory_db().await?;
    let runner = MigrationRunner::new(&db);
    runner.migrate(dir.path()).await?;

    let err = runner.rollback(dir.path()).await.unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::MigrationFailed {
            direction: MigrationDirection::Down,
            ..
        }
    ));
    assert_eq!(runner.applied_versions().await?, vec!["001_users"]);
    Ok(())
}

#[tokio::test]
async fn test_ledger_bootstrap_is_idempotent() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "001_users.sql", &table_sql("users"));

    let db = memory_db().await?;
    db.execute_batch(
        "CREATE TABLE schema_migrations (version TEXT PRIMARY KEY, applied_at DATETIME NOT NULL)",
    )
    .await?;

    let runner = MigrationRunner::new(&db);
    assert!(runner.applied_versions().await?.is_empty());
    assert_eq!(runner.migrate(dir.path()).await?, vec!["001_users"]);
    Ok(())
}

#[tokio::test]
async fn test_skips_hidden_and_unregistered_files() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "001_users.sql", &table_sql("users"));
    write(dir.path(), ".002_draft.sql", &table_sql("drafts"));
    write(dir.path(), "README.md", "# migrations");

    let db = memory_db().await?;
    let runner = MigrationRunner::new(&db);
    assert_eq!(runner.migrate(dir.path()).await?, vec!["001_users"]);
    assert!(!table_exists(&db, "drafts").await?);
    Ok(())
}

struct SeedRoles;

#[async_trait]
impl MigrationUnit for SeedRoles {
    async fn up(&self, db: &dyn Database) -> Result<()> {
        db.execute_batch("CREATE TABLE roles (id INTEGER PRIMARY KEY, name TEXT)")
            .await?;
        db.table("roles").insert([("name", "admin")]).await?;
        Ok(())
    }

    async fn down(&self, db: &dyn Database) -> Result<()> {
        db.execute_batch("DROP TABLE roles").await
    }
}

#[tokio::test]
async fn test_registered_rust_migration() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "001_users.sql", &table_sql("users"));
    write(dir.path(), "002_roles.rs", "");

    let mut registry = MigrationRegistry::new();
    registry.register("002_roles", || SeedRoles);

    let db = memory_db().await?;
    let runner = MigrationRunner::with_registry(&db, registry);

    assert_eq!(
        runner.migrate(dir.path()).await?,
        vec!["001_users", "002_roles"]
    );
    assert_eq!(db.table("roles").count().await?, 1);

    assert_eq!(
        runner.reset(dir.path()).await?,
        vec!["002_roles", "001_users"]
    );
    assert!(!table_exists(&db, "roles").await?);
    Ok(())
}

#[tokio::test]
async fn test_status_and_custom_table() -> Result<()> {
    let dir = migrations_dir();
    write(dir.path(), "001_users.sql", &table_sql("users"));
    write(dir.path(), "002_posts.sql", &table_sql("posts"));

    let db = memory_db().await?;
    let runner = MigrationRunner::new(&db).with_table_name("app_versions");
    assert_eq!(runner.table_name(), "app_versions");

    write(dir.path(), "000_legacy.sql", &table_sql("legacy"));
    runner.migrate(dir.path()).await?;
    fs::remove_file(dir.path().join("000_legacy.sql"))?;
    fs::remove_file(dir.path().join("002_posts.sql"))?;
    write(dir.path(), "003_tags.sql", &table_sql("tags"));
    db.execute(
        "DELETE FROM app_versions WHERE version = ?",
        &["001_users".into()],
    )
    .await?;

    let status = runner.status(dir.path()).await?;
    let summary: Vec<(&str, &str)> = status
        .iter()
        .map(|(version, state)| {
            let label = match state {
                MigrationStatus::Applied { .. } => "applied",
                MigrationStatus::Pending => "pending",
                MigrationStatus::Missing { .. } => "missing",
            };
            (version.as_str(), label)
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("000_legacy", "missing"),
            ("001_users", "pending"),
            ("002_posts", "missing"),
            ("003_tags", "pending"),
        ]
    );
    assert!(!table_exists(&db, "schema_migrations").await?);
    Ok(())
}
