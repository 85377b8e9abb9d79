//! Connection configuration
//!
//! A [`ConnectionConfig`] is built fluently with [`ConnectionBuilder`] or
//! loaded from the `[database]` table of a TOML file, with environment
//! variable overrides applied on top.

use super::database_types::DatabaseType;
use super::error::{DatabaseError, Result};
use serde::Deserialize;
use std::path::Path;

/// Settings used to open a connection. Backends clone it on connect and
/// never mutate it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    /// Database driver
    #[serde(default)]
    pub driver: DatabaseType,

    /// Server host (ignored by SQLite)
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port; `None` uses the driver default
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name, or file path for SQLite
    #[serde(default = "default_database")]
    pub database: String,

    /// Username
    #[serde(default)]
    pub username: Option<String>,

    /// Password
    #[serde(default)]
    pub password: Option<String>,

    /// Client character set
    #[serde(default = "default_charset")]
    pub charset: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_database() -> String {
    ":memory:".to_string()
}

fn default_charset() -> String {
    "utf8".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseType::default(),
            host: default_host(),
            port: None,
            database: default_database(),
            username: None,
            password: None,
            charset: default_charset(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    database: ConnectionConfig,
}

impl ConnectionConfig {
    /// In-memory SQLite configuration
    pub fn sqlite_memory() -> Self {
        Self::default()
    }

    /// SQLite configuration for a database file
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            database: path.into(),
            ..Self::default()
        }
    }

    /// Effective port (explicit or the driver default)
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.driver.default_port())
    }

    /// Parse the `[database]` table of a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)?;
        Ok(file.database)
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist, then apply `ROWBOUND_DB_*` overrides.
    ///
    /// Environment variable overrides:
    /// - `ROWBOUND_DB_DRIVER` overrides `database.driver`
    /// - `ROWBOUND_DB_HOST` overrides `database.host`
    /// - `ROWBOUND_DB_PORT` overrides `database.port`
    /// - `ROWBOUND_DB_NAME` overrides `database.database`
    /// - `ROWBOUND_DB_USER` overrides `database.username`
    /// - `ROWBOUND_DB_PASSWORD` overrides `database.password`
    /// - `ROWBOUND_DB_CHARSET` overrides `database.charset`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in [`load`](Self::load))
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(driver) = lookup("ROWBOUND_DB_DRIVER") {
            self.driver = driver.parse().map_err(DatabaseError::configuration)?;
        }
        if let Some(host) = lookup("ROWBOUND_DB_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("ROWBOUND_DB_PORT") {
            let port = port.parse().map_err(|_| {
                DatabaseError::configuration(format!("invalid ROWBOUND_DB_PORT: {port}"))
            })?;
            self.port = Some(port);
        }
        if let Some(database) = lookup("ROWBOUND_DB_NAME") {
            self.database = database;
        }
        if let Some(username) = lookup("ROWBOUND_DB_USER") {
            self.username = Some(username);
        }
        if let Some(password) = lookup("ROWBOUND_DB_PASSWORD") {
            self.password = Some(password);
        }
        if let Some(charset) = lookup("ROWBOUND_DB_CHARSET") {
            self.charset = charset;
        }
        Ok(())
    }

    /// Render the driver-specific connection string
    pub fn connection_string(&self) -> String {
        match self.driver {
            DatabaseType::Sqlite => self.database.clone(),
            DatabaseType::Postgres => {
                let mut parts = vec![
                    format!("host={}", self.host),
                    format!("port={}", self.port()),
                    format!("dbname={}", self.database),
                ];
                if let Some(username) = &self.username {
                    parts.push(format!("user={}", username));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", password));
                }
                parts.push(format!("options='-c client_encoding={}'", self.charset));
                parts.join(" ")
            }
        }
    }
}

/// Fluent builder for [`ConnectionConfig`]
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Create a new connection builder for the specified driver
    pub fn new(driver: DatabaseType) -> Self {
        Self {
            config: ConnectionConfig {
                driver,
                ..ConnectionConfig::default()
            },
        }
    }

    /// Set the database host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the database port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Set the database name
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.config.database = database.into();
        self
    }

    /// Set the username
    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Set the password
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the client character set
    pub fn charset<S: Into<String>>(mut self, charset: S) -> Self {
        self.config.charset = charset.into();
        self
    }

    /// Finish building
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}
