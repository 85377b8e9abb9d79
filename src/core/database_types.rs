//! Database driver selection
//!
//! Each driver maps to the SQL grammar used to compile builder state.

use super::grammar::{Grammar, PostgresGrammar, SqliteGrammar};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

static SQLITE_GRAMMAR: SqliteGrammar = SqliteGrammar;
static POSTGRES_GRAMMAR: PostgresGrammar = PostgresGrammar;

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// SQLite database
    #[default]
    Sqlite,
    /// PostgreSQL database
    Postgres,
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Postgres => "postgres",
        }
    }

    /// Grammar used to compile queries for this driver
    pub fn grammar(&self) -> &'static dyn Grammar {
        match self {
            DatabaseType::Sqlite => &SQLITE_GRAMMAR,
            DatabaseType::Postgres => &POSTGRES_GRAMMAR,
        }
    }

    /// Port used when the configuration does not name one
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::Sqlite => 0,
            DatabaseType::Postgres => 5432,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(DatabaseType::Postgres),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            _ => Err(format!("Invalid database type: '{}'", s)),
        }
    }
}
