//! Seeder runner tests

#![cfg(feature = "sqlite")]

use async_trait::async_trait;
use rowbound::prelude::*;
use std::fs;

async fn db_with_users() -> Result<SqliteDatabase> {
    let db = SqliteDatabase::open(&ConnectionConfig::sqlite_memory()).await?;
    db.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .await?;
    Ok(db)
}

struct Admins;

#[async_trait]
impl Seeder for Admins {
    async fn run(&self, db: &dyn Database) -> Result<()> {
        db.table("users").insert([("name", "root")]).await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_seeds_in_file_name_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("20_second.sql"),
        "INSERT INTO users (name) VALUES ('second');",
    )?;
    fs::write(
        dir.path().join("10_first.sql"),
        "INSERT INTO users (name) VALUES ('first');",
    )?;

    let db = db_with_users().await?;
    let executed = SeederRunner::new(&db).seed(dir.path()).await?;
    assert_eq!(executed, vec!["10_first.sql", "20_second.sql"]);

    let rows = db.table("users").order_by_asc("id").fetch_all().await?;
    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    Ok(())
}

#[tokio::test]
async fn test_rerun_executes_everything_again() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("users.sql"),
        "INSERT INTO users (name) VALUES ('again');",
    )?;

    let db = db_with_users().await?;
    let runner = SeederRunner::new(&db);
    runner.seed(dir.path()).await?;
    runner.seed(dir.path()).await?;
    assert_eq!(db.table("users").count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_registered_seeders() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("01_admins.rs"), "")?;
    fs::write(dir.path().join("02_guests.rs"), "")?;

    let mut registry = SeederRegistry::new();
    registry.register("01_admins", Admins);
    registry.register_fn("02_guests", |db| {
        Box::pin(async move {
            db.table("users").insert([("name", "guest")]).await?;
            Ok::<(), DatabaseError>(())
        })
    });

    let db = db_with_users().await?;
    let executed = SeederRunner::with_registry(&db, registry)
        .seed(dir.path())
        .await?;
    assert_eq!(executed, vec!["01_admins.rs", "02_guests.rs"]);
    assert_eq!(db.table("users").count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_unresolvable_file_aborts_before_writing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("01_users.sql"),
        "INSERT INTO users (name) VALUES ('never');",
    )?;
    fs::write(dir.path().join("02_notes.txt"), "not a seeder")?;

    let db = db_with_users().await?;
    let result = SeederRunner::new(&db).seed(dir.path()).await;
    assert!(matches!(result, Err(DatabaseError::Configuration(_))));
    assert_eq!(db.table("users").count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_failing_seeder_propagates() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("01_bad.sql"),
        "INSERT INTO users (missing_column) VALUES (1);",
    )?;

    let db = db_with_users().await?;
    let result = SeederRunner::new(&db).seed(dir.path()).await;
    assert!(matches!(result, Err(DatabaseError::QueryFailed { .. })));
    Ok(())
}
