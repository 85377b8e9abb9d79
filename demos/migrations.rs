//! Migrations, seeders and eager loading
//!
//! Writes a small migration and seed directory to a temporary location,
//! applies it, loads relations without N+1 queries and rolls everything back.
//!
//! Run with: cargo run --example migrations

use async_trait::async_trait;
use rowbound::prelude::*;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

struct Author;

impl HasRelations for Author {
    fn table() -> &'static str {
        "authors"
    }

    fn relations() -> RelationMap {
        RelationMap::new(Self::table())
            .has_many("books", "books", "id", "author_id")
            .has_one("bio", "bios", "id", "author_id")
    }
}

/// Rust-defined migration registered under the `003_genres` version
struct CreateGenres;

#[async_trait]
impl MigrationUnit for CreateGenres {
    async fn up(&self, db: &dyn Database) -> Result<()> {
        db.execute_batch("CREATE TABLE genres (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .await?;
        for name in ["fiction", "history"] {
            db.table("genres").insert([("name", name)]).await?;
        }
        Ok(())
    }

    async fn down(&self, db: &dyn Database) -> Result<()> {
        db.execute_batch("DROP TABLE genres").await
    }
}

fn write_fixtures(root: &Path) -> Result<()> {
    let migrations = root.join("migrations");
    let seeds = root.join("seeds");
    fs::create_dir_all(&migrations)?;
    fs::create_dir_all(&seeds)?;

    fs::write(
        migrations.join("001_authors.sql"),
        "-- migrate:up
CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE bios (id INTEGER PRIMARY KEY, author_id INTEGER REFERENCES authors(id), text TEXT);
-- migrate:down
DROP TABLE bios;
DROP TABLE authors;
",
    )?;
    fs::write(
        migrations.join("002_books.sql"),
        "-- migrate:up
CREATE TABLE books (id INTEGER PRIMARY KEY, author_id INTEGER REFERENCES authors(id), title TEXT);
-- migrate:down
DROP TABLE books;
",
    )?;
    fs::write(migrations.join("003_genres.rs"), "")?;

    fs::write(
        seeds.join("01_authors.sql"),
        "INSERT INTO authors (id, name) VALUES (1, 'Le Guin'), (2, 'Pratchett'), (3, 'Mantel');
INSERT INTO bios (author_id, text) VALUES (1, 'Earthsea'), (3, 'Wolf Hall');",
    )?;
    fs::write(seeds.join("02_books.rs"), "")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Rowbound - Migrations Example ===\n");

    let root = std::env::temp_dir().join(format!("rowbound-demo-{}", std::process::id()));
    write_fixtures(&root)?;
    let migrations = root.join("migrations");

    let db = SqliteDatabase::open(&ConnectionConfig::sqlite_memory()).await?;

    let mut registry = MigrationRegistry::new();
    registry.register("003_genres", || CreateGenres);
    let runner = MigrationRunner::with_registry(&db, registry);

    println!("1. Pending migrations: {:?}", runner.pending(&migrations).await?);
    let applied = runner.migrate(&migrations).await?;
    println!("   ✓ Applied {:?}\n", applied);

    println!("2. Seeding...");
    let mut seeders = SeederRegistry::new();
    seeders.register_fn("02_books", |db| {
        Box::pin(async move {
            for (author, title) in [(1, "A Wizard of Earthsea"), (1, "The Dispossessed"), (2, "Mort")] {
                db.table("books")
                    .insert([("author_id", DatabaseValue::from(author)), ("title", title.into())])
                    .await?;
            }
            Ok::<(), DatabaseError>(())
        })
    });
    let seeded = SeederRunner::with_registry(&db, seeders)
        .seed(root.join("seeds"))
        .await?;
    println!("   ✓ Ran {:?}\n", seeded);

    println!("3. Eager loading books and bios...");
    let relations = Author::relations();
    let authors = db.table(Author::table()).order_by_asc("id").fetch_all().await?;
    let loaded = EagerLoader::new(&db, &relations)
        .load(authors, &["books", "bio"])
        .await?;
    for author in &loaded {
        let bio = author
            .one("bio")
            .and_then(|b| b.get("text"))
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   - {}: {} book(s), bio: {}",
            author.row["name"],
            author.many("books").len(),
            bio
        );
    }
    println!();

    println!("4. Status...");
    for (version, status) in runner.status(&migrations).await? {
        println!("   {} {:?}", version, status);
    }
    println!();

    println!("5. Rolling back...");
    println!("   ✓ {:?}", runner.rollback(&migrations).await?);
    println!("   ✓ Reset {:?}\n", runner.reset(&migrations).await?);

    fs::remove_dir_all(&root)?;
    println!("=== Done ===");
    Ok(())
}
