//! Error types for the persistence layer
//!
//! This module defines all error types that can occur while connecting,
//! compiling and executing queries, running migrations and seeders, and
//! eager-loading relations.

use std::fmt;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Direction of a migration step, reported with migration failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Applying a migration (`up`)
    Up,
    /// Reverting a migration (`down`)
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => f.write_str("up"),
            MigrationDirection::Down => f.write_str("down"),
        }
    }
}

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Connection could not be established
    #[error("Connection failed to {host}:{port} - {message}")]
    ConnectionFailed {
        host: String,
        port: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation attempted without an open connection
    #[error("Not connected to database")]
    NotConnected,

    /// A compiled statement failed at execution, with the engine's message
    #[error("Query failed: {message} (sql: {sql})")]
    QueryFailed { sql: String, message: String },

    /// Placeholder count does not match the number of bindings supplied
    #[error("Binding mismatch: statement expects {expected} bindings, got {actual}")]
    BindingMismatch { expected: usize, actual: usize },

    /// A migration's `up` or `down` raised
    #[error("Migration {version} failed during {direction}: {source}")]
    MigrationFailed {
        version: String,
        direction: MigrationDirection,
        #[source]
        source: Box<DatabaseError>,
    },

    /// A migration or seed file did not yield a runnable unit
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unknown comparison operator passed to the query builder
    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    /// Relation name not registered for the owning model (strict mode only)
    #[error("Unknown relation: {name}")]
    UnknownRelation { name: String },

    /// Type conversion error
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a connection failed error with host/port details
    pub fn connection_failed(
        host: impl Into<String>,
        port: u16,
        message: impl Into<String>,
    ) -> Self {
        DatabaseError::ConnectionFailed {
            host: host.into(),
            port,
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source error
    pub fn connection_failed_with_source(
        host: impl Into<String>,
        port: u16,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        DatabaseError::ConnectionFailed {
            host: host.into(),
            port,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a query failure carrying the engine message verbatim
    pub fn query_failed(sql: impl Into<String>, message: impl fmt::Display) -> Self {
        DatabaseError::QueryFailed {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Create a binding mismatch error
    pub fn binding_mismatch(expected: usize, actual: usize) -> Self {
        DatabaseError::BindingMismatch { expected, actual }
    }

    /// Wrap an error raised by a migration step
    pub fn migration(
        version: impl Into<String>,
        direction: MigrationDirection,
        source: DatabaseError,
    ) -> Self {
        DatabaseError::MigrationFailed {
            version: version.into(),
            direction,
            source: Box::new(source),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Configuration(msg.into())
    }

    /// Create an invalid operator error
    pub fn invalid_operator<S: Into<String>>(op: S) -> Self {
        DatabaseError::InvalidOperator(op.into())
    }

    /// Create a new type mismatch error
    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        DatabaseError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// Whether this is the engine's "table already exists" condition
    pub fn is_already_exists(&self) -> bool {
        match self {
            DatabaseError::QueryFailed { message, .. } => {
                message.to_ascii_lowercase().contains("already exists")
            }
            _ => false,
        }
    }

    /// Version named by a migration failure, if any
    pub fn migration_version(&self) -> Option<&str> {
        match self {
            DatabaseError::MigrationFailed { version, .. } => Some(version),
            _ => None,
        }
    }
}
