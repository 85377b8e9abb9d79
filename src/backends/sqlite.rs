//! SQLite database backend implementation
//!
//! This module provides a SQLite implementation of the [`Database`] facade
//! on top of `rusqlite`. The single connection lives behind a mutex and
//! every call runs on tokio's blocking pool. Transaction state is read from
//! the engine's autocommit flag, so a `COMMIT` inside a script or an
//! automatic rollback is always reflected.

use crate::core::{
    config::ConnectionConfig, database::Database, database_types::DatabaseType,
    error::DatabaseError, error::Result, value::DatabaseResult, value::DatabaseValue,
    value::Row,
};
use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;

/// SQLite database implementation
pub struct SqliteDatabase {
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SqliteDatabase {
    /// Create a new, unconnected SQLite database instance
    pub fn new() -> Self {
        Self {
            connection: Arc::new(Mutex::new(None)),
        }
    }

    /// Create an instance and connect it in one step
    pub async fn open(config: &ConnectionConfig) -> Result<Self> {
        let db = Self::new();
        db.connect(config).await?;
        Ok(db)
    }

    /// Convert a rusqlite row to a [`Row`], keeping column order
    fn convert_row(row: &rusqlite::Row) -> rusqlite::Result<Row> {
        let statement = row.as_ref();
        let mut out = Row::with_capacity(statement.column_count());

        for i in 0..statement.column_count() {
            let column_name = statement.column_name(i)?.to_string();
            let value = match row.get_ref(i)? {
                ValueRef::Null => DatabaseValue::Null,
                ValueRef::Integer(v) => DatabaseValue::Integer(v),
                ValueRef::Real(v) => DatabaseValue::Real(v),
                ValueRef::Text(v) => DatabaseValue::Text(String::from_utf8_lossy(v).to_string()),
                ValueRef::Blob(v) => DatabaseValue::Blob(v.to_vec()),
            };
            out.insert(column_name, value);
        }

        Ok(out)
    }

    /// Convert a binding to an owned rusqlite value
    fn to_sql_value(value: &DatabaseValue) -> Value {
        match value {
            DatabaseValue::Null => Value::Null,
            DatabaseValue::Bool(v) => Value::Integer(*v as i64),
            DatabaseValue::Integer(v) => Value::Integer(*v),
            DatabaseValue::Real(v) => Value::Real(*v),
            DatabaseValue::Text(v) => Value::Text(v.clone()),
            DatabaseValue::Blob(v) => Value::Blob(v.clone()),
        }
    }

    /// Prepare `sql` and check its placeholder count against `bindings`
    fn prepare<'c>(
        conn: &'c Connection,
        sql: &str,
        bindings: &[DatabaseValue],
    ) -> Result<rusqlite::Statement<'c>> {
        let stmt = conn
            .prepare(sql)
            .map_err(|e| DatabaseError::query_failed(sql, e))?;
        if stmt.parameter_count() != bindings.len() {
            return Err(DatabaseError::binding_mismatch(
                stmt.parameter_count(),
                bindings.len(),
            ));
        }
        Ok(stmt)
    }

    /// Run `f` against the open connection on the blocking pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let connection_arc = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let connection = connection_arc.blocking_lock();
            let conn = connection.as_ref().ok_or(DatabaseError::NotConnected)?;
            f(conn)
        })
        .await
        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
    }

    /// Run a transaction-control statement after checking the engine state
    async fn transaction_statement(&self, statement: &'static str, entering: bool) -> Result<()> {
        self.with_connection(move |conn| {
            let in_transaction = !conn.is_autocommit();
            if entering && in_transaction {
                return Err(DatabaseError::transaction("Already in a transaction"));
            }
            if !entering && !in_transaction {
                return Err(DatabaseError::transaction("Not in a transaction"));
            }

            conn.execute_batch(statement)
                .map_err(|e| DatabaseError::transaction(e.to_string()))
        })
        .await
    }
}

impl Default for SqliteDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        if config.driver != DatabaseType::Sqlite {
            return Err(DatabaseError::configuration(format!(
                "SqliteDatabase cannot open a {} connection",
                config.driver
            )));
        }

        let path = config.connection_string();
        let connection_arc = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = Connection::open(&path).map_err(|e| {
                DatabaseError::connection_failed_with_source(
                    path.clone(),
                    0,
                    "unable to open SQLite database",
                    Box::new(e),
                )
            })?;
            conn.execute_batch("PRAGMA foreign_keys = ON")
                .map_err(|e| DatabaseError::connection_failed(path.clone(), 0, e.to_string()))?;

            *connection_arc.blocking_lock() = Some(conn);
            tracing::debug!(path = %path, "sqlite connection opened");
            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
    }

    fn is_connected(&self) -> bool {
        self.connection
            .try_lock()
            .map(|conn| conn.is_some())
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        *self.connection.lock().await = None;
        Ok(())
    }

    async fn query(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<DatabaseResult> {
        tracing::debug!(sql, bindings = bindings.len(), "query");
        let sql = sql.to_string();
        let bindings = bindings.to_vec();

        self.with_connection(move |conn| {
            let mut stmt = Self::prepare(conn, &sql, &bindings)?;
            let rows = stmt
                .query_map(
                    params_from_iter(bindings.iter().map(Self::to_sql_value)),
                    Self::convert_row,
                )
                .map_err(|e| DatabaseError::query_failed(&sql, e))?;

            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| DatabaseError::query_failed(&sql, e))
        })
        .await
    }

    async fn execute(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<u64> {
        tracing::debug!(sql, bindings = bindings.len(), "execute");
        let sql = sql.to_string();
        let bindings = bindings.to_vec();

        self.with_connection(move |conn| {
            let mut stmt = Self::prepare(conn, &sql, &bindings)?;
            let affected = stmt
                .execute(params_from_iter(bindings.iter().map(Self::to_sql_value)))
                .map_err(|e| DatabaseError::query_failed(&sql, e))?;
            Ok(affected as u64)
        })
        .await
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql, "execute batch");
        let sql = sql.to_string();

        self.with_connection(move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| DatabaseError::query_failed(&sql, e))
        })
        .await
    }

    async fn insert_and_return_id(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<i64> {
        tracing::debug!(sql, bindings = bindings.len(), "insert");
        let sql = sql.to_string();
        let bindings = bindings.to_vec();

        // Same lock for the insert and the rowid read
        self.with_connection(move |conn| {
            let mut stmt = Self::prepare(conn, &sql, &bindings)?;
            stmt.execute(params_from_iter(bindings.iter().map(Self::to_sql_value)))
                .map_err(|e| DatabaseError::query_failed(&sql, e))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.transaction_statement("BEGIN TRANSACTION", true).await
    }

    async fn commit(&self) -> Result<()> {
        self.transaction_statement("COMMIT", false).await
    }

    async fn rollback(&self) -> Result<()> {
        self.transaction_statement("ROLLBACK", false).await
    }

    fn in_transaction(&self) -> bool {
        self.connection
            .try_lock()
            .map(|conn| conn.as_ref().map(|c| !c.is_autocommit()).unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        // Best effort: Drop cannot await, so only roll back if the lock is free
        if let Ok(connection) = self.connection.try_lock() {
            if let Some(conn) = connection.as_ref() {
                if !conn.is_autocommit() {
                    let _ = conn.execute_batch("ROLLBACK");
                }
            }
        }
    }
}
