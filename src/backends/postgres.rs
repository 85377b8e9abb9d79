//! PostgreSQL database backend implementation
//!
//! This module provides a PostgreSQL implementation of the [`Database`]
//! facade using tokio-postgres. Statements are written with `?`
//! placeholders like every other backend and rewritten to `$n` here.
//! Bindings are converted using the parameter types Postgres reports for
//! the prepared statement, so an integer binding fits an `int4` column.

use crate::core::{
    config::ConnectionConfig, database::Database, database_types::DatabaseType,
    error::DatabaseError, error::Result, grammar::numbered_placeholders,
    value::DatabaseResult, value::DatabaseValue, value::Row,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

type Param = Box<dyn ToSql + Sync + Send>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Parse `YYYY-MM-DD HH:MM:SS[.f]`, with a space or `T` separator
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// RFC 3339, or a naive timestamp taken as UTC
fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(s).map(|naive| naive.and_utc()))
}

/// PostgreSQL database implementation
pub struct PostgresDatabase {
    client: Arc<Mutex<Option<Client>>>,
    in_transaction: Arc<Mutex<bool>>,
}

impl PostgresDatabase {
    /// Create a new, unconnected PostgreSQL database instance
    pub fn new() -> Self {
        Self {
            client: Arc::new(Mutex::new(None)),
            in_transaction: Arc::new(Mutex::new(false)),
        }
    }

    /// Create an instance and connect it in one step
    pub async fn open(config: &ConnectionConfig) -> Result<Self> {
        let db = Self::new();
        db.connect(config).await?;
        Ok(db)
    }

    /// Read column `idx`, reporting a value that cannot be decoded
    fn column<'r, T: FromSql<'r>>(row: &'r tokio_postgres::Row, idx: usize) -> Result<Option<T>> {
        row.try_get::<_, Option<T>>(idx).map_err(|e| {
            let column = &row.columns()[idx];
            DatabaseError::type_mismatch(
                &format!("{} column {}", column.type_().name(), column.name()),
                &e.to_string(),
            )
        })
    }

    /// Convert a tokio_postgres row to a [`Row`]
    ///
    /// Temporal, numeric, uuid and json columns are returned as text.
    fn convert_row(row: &tokio_postgres::Row) -> Result<Row> {
        let mut out = Row::with_capacity(row.columns().len());

        for (idx, column) in row.columns().iter().enumerate() {
            let text = DatabaseValue::Text;
            let value = match column.type_().name() {
                "bool" => Self::column::<bool>(row, idx)?.map(DatabaseValue::Bool),
                "int2" => Self::column::<i16>(row, idx)?.map(|v| DatabaseValue::Integer(v as i64)),
                "int4" => Self::column::<i32>(row, idx)?.map(|v| DatabaseValue::Integer(v as i64)),
                "int8" => Self::column::<i64>(row, idx)?.map(DatabaseValue::Integer),
                "oid" => Self::column::<u32>(row, idx)?.map(|v| DatabaseValue::Integer(v as i64)),
                "float4" => Self::column::<f32>(row, idx)?.map(|v| DatabaseValue::Real(v as f64)),
                "float8" => Self::column::<f64>(row, idx)?.map(DatabaseValue::Real),
                "numeric" => Self::column::<Decimal>(row, idx)?.map(|v| text(v.to_string())),
                "bytea" => Self::column::<Vec<u8>>(row, idx)?.map(DatabaseValue::Blob),
                "timestamp" => Self::column::<NaiveDateTime>(row, idx)?
                    .map(|v| text(v.format(TIMESTAMP_FORMAT).to_string())),
                "timestamptz" => {
                    Self::column::<DateTime<Utc>>(row, idx)?.map(|v| text(v.to_rfc3339()))
                }
                "date" => Self::column::<NaiveDate>(row, idx)?
                    .map(|v| text(v.format(DATE_FORMAT).to_string())),
                "time" => Self::column::<NaiveTime>(row, idx)?
                    .map(|v| text(v.format(TIME_FORMAT).to_string())),
                "uuid" => Self::column::<Uuid>(row, idx)?.map(|v| text(v.to_string())),
                "json" | "jsonb" => {
                    Self::column::<serde_json::Value>(row, idx)?.map(|v| text(v.to_string()))
                }
                _ => Self::column::<String>(row, idx)?.map(text),
            };
            out.insert(
                column.name().to_string(),
                value.unwrap_or(DatabaseValue::Null),
            );
        }

        Ok(out)
    }

    /// Convert a binding for a parameter of type `ty`
    fn to_param(value: &DatabaseValue, ty: &Type) -> Result<Param> {
        let mismatch = || DatabaseError::type_mismatch(ty.name(), value.type_name());

        let param: Param = match ty.name() {
            "bool" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(v.as_bool().ok_or_else(mismatch)?),
            }),
            "int2" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(
                    v.as_i64()
                        .and_then(|v| i16::try_from(v).ok())
                        .ok_or_else(mismatch)?,
                ),
            }),
            "int4" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(
                    v.as_i64()
                        .and_then(|v| i32::try_from(v).ok())
                        .ok_or_else(mismatch)?,
                ),
            }),
            "int8" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(v.as_i64().ok_or_else(mismatch)?),
            }),
            "float4" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(v.as_f64().ok_or_else(mismatch)? as f32),
            }),
            "float8" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(v.as_f64().ok_or_else(mismatch)?),
            }),
            "numeric" => Box::new(match value {
                DatabaseValue::Null => None,
                DatabaseValue::Integer(v) => Some(Decimal::from(*v)),
                DatabaseValue::Real(v) => Some(Decimal::try_from(*v).map_err(|_| mismatch())?),
                DatabaseValue::Text(v) => Some(Decimal::from_str(v.trim()).map_err(|_| mismatch())?),
                _ => return Err(mismatch()),
            }),
            "bytea" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(v.as_bytes().ok_or_else(mismatch)?.to_vec()),
            }),
            "timestamp" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(v.as_str().and_then(parse_timestamp).ok_or_else(mismatch)?),
            }),
            "timestamptz" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(v.as_str().and_then(parse_timestamptz).ok_or_else(mismatch)?),
            }),
            "date" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(
                    v.as_str()
                        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
                        .ok_or_else(mismatch)?,
                ),
            }),
            "time" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(
                    v.as_str()
                        .and_then(|s| NaiveTime::parse_from_str(s, TIME_FORMAT).ok())
                        .ok_or_else(mismatch)?,
                ),
            }),
            "uuid" => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(
                    v.as_str()
                        .and_then(|s| Uuid::parse_str(s).ok())
                        .ok_or_else(mismatch)?,
                ),
            }),
            "json" | "jsonb" => Box::new(match value {
                DatabaseValue::Null => None,
                DatabaseValue::Text(s) => {
                    Some(serde_json::from_str::<serde_json::Value>(s).map_err(|_| mismatch())?)
                }
                v => Some(v.to_json()),
            }),
            // Text-like types
            _ => Box::new(match value {
                DatabaseValue::Null => None,
                v => Some(v.to_string()),
            }),
        };
        Ok(param)
    }

    /// Prepare `sql` and convert `bindings` to its parameter types
    async fn prepare(
        client: &Client,
        sql: &str,
        bindings: &[DatabaseValue],
    ) -> Result<(tokio_postgres::Statement, Vec<Param>)> {
        let numbered = numbered_placeholders(sql);
        let statement = client
            .prepare(&numbered)
            .await
            .map_err(|e| DatabaseError::query_failed(sql, e))?;

        let types = statement.params();
        if types.len() != bindings.len() {
            return Err(DatabaseError::binding_mismatch(types.len(), bindings.len()));
        }

        let params = bindings
            .iter()
            .zip(types)
            .map(|(value, ty)| Self::to_param(value, ty))
            .collect::<Result<Vec<_>>>()?;
        Ok((statement, params))
    }

    fn as_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
        params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }

    /// Ask the server whether an explicit transaction block is open.
    ///
    /// Inside a block the transaction started before the current statement;
    /// an aborted block rejects every statement with `25P02`.
    async fn engine_in_transaction(client: &Client) -> Result<bool> {
        const SQL: &str = "SELECT transaction_timestamp() <> statement_timestamp()";
        match client.query_one(SQL, &[]).await {
            Ok(row) => row
                .try_get::<_, bool>(0)
                .map_err(|e| DatabaseError::query_failed(SQL, e)),
            Err(e) if e.code() == Some(&SqlState::IN_FAILED_SQL_TRANSACTION) => Ok(true),
            Err(e) => Err(DatabaseError::query_failed(SQL, e)),
        }
    }

    /// Re-read the transaction state after a statement that may have ended it
    async fn resync_transaction(&self, client: &Client) {
        let mut in_transaction = self.in_transaction.lock().await;
        if *in_transaction {
            *in_transaction = Self::engine_in_transaction(client).await.unwrap_or(false);
        }
    }

    async fn transaction_statement(&self, statement: &str, entering: bool) -> Result<()> {
        let client = self.client.lock().await;
        let client = client.as_ref().ok_or(DatabaseError::NotConnected)?;
        let mut in_transaction = self.in_transaction.lock().await;

        let open = Self::engine_in_transaction(client).await?;
        *in_transaction = open;
        if entering && open {
            return Err(DatabaseError::transaction("Already in a transaction"));
        }
        if !entering && !open {
            return Err(DatabaseError::transaction("Not in a transaction"));
        }

        match client.batch_execute(statement).await {
            Ok(()) => {
                *in_transaction = entering;
                Ok(())
            }
            Err(e) => {
                *in_transaction = Self::engine_in_transaction(client).await.unwrap_or(false);
                Err(DatabaseError::transaction(e.to_string()))
            }
        }
    }
}

impl Default for PostgresDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        if config.driver != DatabaseType::Postgres {
            return Err(DatabaseError::configuration(format!(
                "PostgresDatabase cannot open a {} connection",
                config.driver
            )));
        }

        *self.client.lock().await = None;
        *self.in_transaction.lock().await = false;

        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| {
                DatabaseError::connection_failed_with_source(
                    config.host.clone(),
                    config.port(),
                    "unable to connect to PostgreSQL",
                    Box::new(e),
                )
            })?;

        // The connection object drives the socket until the client is dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection closed with error");
            }
        });

        *self.client.lock().await = Some(client);
        tracing::debug!(host = %config.host, port = config.port(), "postgres connection opened");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client
            .try_lock()
            .map(|client| client.as_ref().map(|c| !c.is_closed()).unwrap_or(false))
            .unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        *self.in_transaction.lock().await = false;
        *self.client.lock().await = None;
        Ok(())
    }

    async fn query(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<DatabaseResult> {
        tracing::debug!(sql, bindings = bindings.len(), "query");
        let client = self.client.lock().await;
        let client = client.as_ref().ok_or(DatabaseError::NotConnected)?;

        let rows = match Self::prepare(client, sql, bindings).await {
            Ok((statement, params)) => client.query(&statement, &Self::as_refs(&params)).await,
            Err(e) => {
                self.resync_transaction(client).await;
                return Err(e);
            }
        };
        match rows {
            Ok(rows) => rows.iter().map(Self::convert_row).collect(),
            Err(e) => {
                self.resync_transaction(client).await;
                Err(DatabaseError::query_failed(sql, e))
            }
        }
    }

    async fn execute(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<u64> {
        tracing::debug!(sql, bindings = bindings.len(), "execute");
        let client = self.client.lock().await;
        let client = client.as_ref().ok_or(DatabaseError::NotConnected)?;

        let affected = match Self::prepare(client, sql, bindings).await {
            Ok((statement, params)) => client
                .execute(&statement, &Self::as_refs(&params))
                .await
                .map_err(|e| DatabaseError::query_failed(sql, e)),
            Err(e) => Err(e),
        };
        if affected.is_err() {
            self.resync_transaction(client).await;
        }
        affected
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql, "execute batch");
        let client = self.client.lock().await;
        let client = client.as_ref().ok_or(DatabaseError::NotConnected)?;

        let result = client
            .batch_execute(sql)
            .await
            .map_err(|e| DatabaseError::query_failed(sql, e));
        // Scripts may COMMIT or ROLLBACK on their own
        self.resync_transaction(client).await;
        result
    }

    /// Expects an INSERT ending in `RETURNING id`, as the grammar compiles it
    async fn insert_and_return_id(&self, sql: &str, bindings: &[DatabaseValue]) -> Result<i64> {
        let rows = self.query(sql, bindings).await?;
        rows.first()
            .and_then(|row| row.get("id"))
            .and_then(DatabaseValue::as_i64)
            .ok_or_else(|| DatabaseError::type_mismatch("returned integer id", "no id column"))
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.transaction_statement("BEGIN", true).await
    }

    async fn commit(&self) -> Result<()> {
        self.transaction_statement("COMMIT", false).await
    }

    async fn rollback(&self) -> Result<()> {
        self.transaction_statement("ROLLBACK", false).await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
            .try_lock()
            .map(|guard| *guard)
            .unwrap_or(false)
    }
}
