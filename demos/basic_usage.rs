//! Basic usage example
//!
//! This example demonstrates:
//! - Opening a database from a configuration
//! - Inserting rows through the query builder
//! - Filtering, grouping and paging
//! - Updates, deletes and a rolled-back transaction
//!
//! Run with: cargo run --example basic_usage
//! Set `RUST_LOG=rowbound=debug` to see the compiled statements.

use rowbound::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Rowbound - Basic Usage Example ===\n");

    let config = ConnectionBuilder::new(DatabaseType::Sqlite)
        .database(":memory:")
        .build();

    println!("1. Connecting to {}...", config.connection_string());
    let db = SqliteDatabase::open(&config).await?;
    println!("   ✓ Connected\n");

    println!("2. Creating table...");
    db.execute_batch(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            age INTEGER,
            balance REAL
        )",
    )
    .await?;
    println!("   ✓ Table created\n");

    println!("3. Inserting data...");
    let users = vec![
        ("alice", "alice@example.com", 30, 1500.50),
        ("bob", "bob@example.com", 25, 2300.75),
        ("charlie", "charlie@example.com", 35, 980.25),
        ("diana", "diana@example.com", 28, 3200.00),
    ];

    for (username, email, age, balance) in users {
        let id = db
            .table("users")
            .insert([
                ("username", DatabaseValue::from(username)),
                ("email", email.into()),
                ("age", age.into()),
                ("balance", balance.into()),
            ])
            .await?;
        println!("   ✓ Inserted {} with id {}", username, id);
    }
    println!();

    println!("4. Users older than 26, richest first...");
    let query = db
        .table("users")
        .select(&["username", "balance"])
        .where_gt("age", 26)
        .order_by_desc("balance");
    let compiled = query.to_sql();
    println!("   SQL: {}", compiled.sql);
    println!("   Bindings: {:?}", compiled.bindings);
    for user in query.fetch_all().await? {
        println!("   - {} ({})", user["username"], user["balance"]);
    }
    println!();

    println!("5. Grouped conditions...");
    let matches = db
        .table("users")
        .where_group(|g| g.where_eq("username", "bob").or_where_eq("username", "diana"))
        .where_lt("age", 30)
        .count()
        .await?;
    println!("   ✓ {} user(s) named bob or diana under 30\n", matches);

    println!("6. Paging...");
    let page = db
        .table("users")
        .order_by_asc("id")
        .for_page(2, 3)
        .fetch_all()
        .await?;
    println!("   ✓ Page 2 holds {} row(s)\n", page.len());

    println!("7. Updating and deleting...");
    let updated = db
        .table("users")
        .where_eq("username", "charlie")
        .update([("balance", 1000.0)])
        .await?;
    let deleted = db.table("users").where_in("age", [25, 28]).delete().await?;
    println!("   ✓ Updated {} row(s), deleted {} row(s)\n", updated, deleted);

    println!("8. Rolling back a transaction...");
    db.begin_transaction().await?;
    db.table("users").delete().await?;
    db.rollback().await?;
    println!("   ✓ {} user(s) survived\n", db.table("users").count().await?);

    println!("9. Constraint violations keep the engine message...");
    match db.table("users").insert([("username", "alice"), ("email", "dup@example.com")]).await {
        Err(e) => println!("   ✓ {}\n", e),
        Ok(id) => println!("   unexpected insert {}\n", id),
    }

    db.disconnect().await?;
    println!("=== Done ===");
    Ok(())
}
