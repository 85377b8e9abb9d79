//! Database backend implementations
//!
//! This module contains concrete implementations of the [`Database`](crate::core::Database)
//! facade. Each backend is behind a cargo feature.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "postgres")]
pub use postgres::PostgresDatabase;
