//! # Rowbound
//!
//! The persistence core of a web framework: a connection facade with
//! parametrized execution, a fluent query builder compiled through
//! dialect-specific grammars, a versioned migration runner, a seed-data
//! runner and an eager-loading relation engine that resolves relations
//! with one query per relation instead of one per row.
//!
//! ## Features
//!
//! - **Parametrized only**: values travel as positional bindings, never as SQL text
//! - **Deterministic compilation**: the same builder state yields the same SQL and binding order
//! - **Versioned migrations**: a ledger table, ordered application, halt on first failure
//! - **Eager loading**: belongs-to, has-many and has-one without N+1 queries
//! - **Async**: every operation is an `async fn` on Tokio
//!
//! ## Supported Databases
//!
//! | Database | Cargo feature | Placeholders |
//! |----------|---------------|--------------|
//! | SQLite | `sqlite` (default) | `?` |
//! | PostgreSQL | `postgres` | `$1..$n` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rowbound::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let db = SqliteDatabase::open(&ConnectionConfig::sqlite_memory()).await?;
//!
//!     db.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
//!         .await?;
//!
//!     let id = db
//!         .table("users")
//!         .insert([("name", DatabaseValue::from("Alice")), ("age", 30.into())])
//!         .await?;
//!
//!     let adults = db
//!         .table("users")
//!         .where_ge("age", 18)
//!         .order_by_asc("name")
//!         .fetch_all()
//!         .await?;
//!     println!("user {} of {}", id, adults.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Working with Transactions
//!
//! Transactions are explicit and do not nest:
//!
//! ```rust,no_run
//! use rowbound::prelude::*;
//!
//! # async fn transfer(db: &SqliteDatabase) -> Result<()> {
//! db.begin_transaction().await?;
//! match db.table("accounts").where_eq("id", 1).update([("balance", 100.0)]).await {
//!     Ok(_) => db.commit().await?,
//!     Err(e) => {
//!         db.rollback().await?;
//!         return Err(e);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/
//! │   ├── config.rs          # ConnectionConfig, TOML + env loading
//! │   ├── database.rs        # Database facade trait, table() entry point
//! │   ├── database_types.rs  # Driver enum
//! │   ├── error.rs           # Error taxonomy
//! │   ├── grammar.rs         # SQL compilation per dialect
//! │   ├── migration.rs       # Migration runner and ledger
//! │   ├── query_builder.rs   # Fluent query builder
//! │   ├── relation.rs        # Eager loading
//! │   ├── seeder.rs          # Seed runner
//! │   └── value.rs           # Row and value primitives
//! └── backends/
//!     ├── sqlite.rs
//!     └── postgres.rs
//! ```

/// Core persistence types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rowbound::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let db = SqliteDatabase::open(&ConnectionConfig::sqlite_memory()).await?;
///     assert!(db.is_connected());
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::core::{
        row, ConnectionBuilder, ConnectionConfig, Database, DatabaseError, DatabaseExt,
        DatabaseResult, DatabaseType, DatabaseValue, EagerLoader, HasRelations, LoadedRow,
        MigrationRegistry, MigrationRunner, MigrationStatus, MigrationUnit, OrderDirection,
        QueryBuilder, Related, RelationMap, Result, RollbackOutcome, Row, Seeder, SeederRegistry,
        SeederRunner, UnknownRelationPolicy,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDatabase;

    #[cfg(feature = "postgres")]
    pub use crate::backends::PostgresDatabase;
}

// Re-export at root level for convenience
pub use core::{
    ConnectionBuilder, ConnectionConfig, Database, DatabaseError, DatabaseExt, DatabaseResult,
    DatabaseType, DatabaseValue, Result, Row,
};

#[cfg(feature = "sqlite")]
pub use backends::SqliteDatabase;

#[cfg(feature = "postgres")]
pub use backends::PostgresDatabase;
