//! Connection facade
//!
//! This module defines the [`Database`] trait every backend implements. A
//! facade owns exactly one connection; it exposes parametrized execution,
//! explicit transaction control and fresh table-scoped query builders.
//!
//! # Concurrency
//!
//! Each call runs to completion before returning. Backends serialise access
//! to their single connection internally, but builders and the raw execute
//! path share that handle, so callers must not interleave logical units of
//! work (for example a transaction) from several tasks on one facade.
//! No timeouts, retries or cancellation are applied at this layer.

use super::database_types::DatabaseType;
use super::config::ConnectionConfig;
use super::error::Result;
use super::grammar::Grammar;
use super::query_builder::QueryBuilder;
use super::value::{DatabaseResult, DatabaseValue};
use async_trait::async_trait;

/// Core facade trait that all database backends implement
///
/// All statement methods take `?`-style positional placeholders and an
/// ordered binding list; values are never interpolated into SQL text.
#[async_trait]
pub trait Database: Send + Sync {
    /// Get the database driver
    fn database_type(&self) -> DatabaseType;

    /// Grammar used to compile builder state for this connection
    fn grammar(&self) -> &'static dyn Grammar {
        self.database_type().grammar()
    }

    /// Open the connection described by `config`
    ///
    /// Fails with [`DatabaseError::ConnectionFailed`](super::error::DatabaseError::ConnectionFailed)
    /// on an invalid DSN, unreachable host or bad credentials.
    async fn connect(&self, config: &ConnectionConfig) -> Result<()>;

    /// Check if connected to the database
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;

    /// Execute a statement that returns rows
    async fn query(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<DatabaseResult>;

    /// Execute a statement that returns no rows; yields the affected-row count
    async fn execute(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<u64>;

    /// Execute a script of one or more statements without bindings
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Execute an INSERT and return the generated primary key
    async fn insert_and_return_id(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<i64>;

    /// Begin a transaction. Transactions do not nest.
    async fn begin_transaction(&self) -> Result<()>;

    /// Commit the current transaction
    async fn commit(&self) -> Result<()>;

    /// Rollback the current transaction
    async fn rollback(&self) -> Result<()>;

    /// Check if currently in a transaction
    fn in_transaction(&self) -> bool;
}

/// Query builder entry point for every facade
///
/// Implemented for each concrete backend and for `dyn Database`, so
/// `db.table(..)` resolves to a single method on either receiver.
pub trait DatabaseExt {
    /// Fresh, empty query builder scoped to `table`
    fn table(&self, table: &str) -> QueryBuilder<'_>;
}

impl<D: Database> DatabaseExt for D {
    fn table(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder::new(self, table)
    }
}

impl<'d> DatabaseExt for dyn Database + 'd {
    fn table(&self, table: &str) -> QueryBuilder<'_> {
        QueryBuilder::new(self, table)
    }
}
