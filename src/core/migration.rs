//! Versioned schema migrations
//!
//! Migrations live in a directory, one file per version. The file stem is
//! the version identifier and files are applied in ascending lexical order,
//! so timestamp prefixes give chronological order.
//!
//! A file becomes a runnable [`MigrationUnit`] through a [`MigrationRegistry`]:
//!
//! - `*.sql` files are parsed into a [`SqlMigration`], split on
//!   `-- migrate:up` / `-- migrate:down` marker lines
//! - any other file whose stem was registered resolves to the registered unit
//!
//! Applied versions are recorded in a ledger table
//! (`schema_migrations(version TEXT PRIMARY KEY, applied_at DATETIME NOT NULL)`).
//!
//! Migrations are **not** wrapped in a transaction. Schema statements
//! auto-commit on common engines, so a multi-statement `up` that fails
//! halfway leaves the schema partially applied and needs manual repair.
//!
//! # Example
//!
//! ```rust,no_run
//! use rowbound::prelude::*;
//!
//! # async fn example() -> rowbound::Result<()> {
//! let db = SqliteDatabase::open(&ConnectionConfig::sqlite("app.db")).await?;
//! let runner = MigrationRunner::new(&db);
//!
//! let applied = runner.migrate("migrations").await?;
//! println!("applied {:?}", applied);
//!
//! match runner.rollback("migrations").await? {
//!     RollbackOutcome::NothingToRollBack => println!("ledger is empty"),
//!     outcome => println!("rolled back {:?}", outcome.version()),
//! }
//! # Ok(())
//! # }
//! ```

use super::database::Database;
use super::database_types::DatabaseType;
use super::error::{DatabaseError, MigrationDirection, Result};
use super::value::DatabaseValue;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

/// A unit of schema change with an apply and a revert step
#[async_trait]
pub trait MigrationUnit: Send + Sync {
    /// Apply the change
    async fn up(&self, db: &dyn Database) -> Result<()>;

    /// Revert the change
    async fn down(&self, db: &dyn Database) -> Result<()>;
}

/// Migration backed by plain SQL scripts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlMigration {
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    /// Create a migration from explicit up and down scripts
    pub fn new(up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
        }
    }

    /// Split a migration file on its marker lines.
    ///
    /// Text before any marker belongs to `up`. Markers are matched on whole
    /// trimmed lines, case-insensitively.
    pub fn parse(contents: &str) -> Self {
        let mut up = Vec::new();
        let mut down = Vec::new();
        let mut in_down = false;

        for line in contents.lines() {
            let marker = line.trim().to_ascii_lowercase();
            if marker == UP_MARKER {
                in_down = false;
            } else if marker == DOWN_MARKER {
                in_down = true;
            } else if in_down {
                down.push(line);
            } else {
                up.push(line);
            }
        }

        Self::new(up.join("\n").trim(), down.join("\n").trim())
    }

    /// Get the up SQL
    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    /// Get the down SQL
    pub fn down_sql(&self) -> &str {
        &self.down_sql
    }
}

#[async_trait]
impl MigrationUnit for SqlMigration {
    async fn up(&self, db: &dyn Database) -> Result<()> {
        if self.up_sql.is_empty() {
            return Ok(());
        }
        db.execute_batch(&self.up_sql).await
    }

    async fn down(&self, db: &dyn Database) -> Result<()> {
        if self.down_sql.is_empty() {
            return Ok(());
        }
        db.execute_batch(&self.down_sql).await
    }
}

type MigrationFactory = Box<dyn Fn() -> Box<dyn MigrationUnit> + Send + Sync>;

/// Maps migration file stems to Rust-defined units
#[derive(Default)]
pub struct MigrationRegistry {
    factories: HashMap<String, MigrationFactory>,
}

impl MigrationRegistry {
    /// Create an empty registry (SQL files still resolve)
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for the migration whose file stem is `version`.
    ///
    /// A fresh unit is built for every run.
    pub fn register<F, U>(&mut self, version: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> U + Send + Sync + 'static,
        U: MigrationUnit + 'static,
    {
        self.factories.insert(
            version.into(),
            Box::new(move || Box::new(factory()) as Box<dyn MigrationUnit>),
        );
        self
    }

    /// Whether a Rust unit is registered for `version`
    pub fn contains(&self, version: &str) -> bool {
        self.factories.contains_key(version)
    }

    fn is_migration_file(&self, file: &MigrationFile) -> bool {
        file.is_sql() || self.contains(&file.version)
    }

    fn resolve(&self, file: &MigrationFile) -> Result<Box<dyn MigrationUnit>> {
        if let Some(factory) = self.factories.get(&file.version) {
            return Ok(factory());
        }
        if file.is_sql() {
            let contents = std::fs::read_to_string(&file.path)?;
            return Ok(Box::new(SqlMigration::parse(&contents)));
        }
        Err(DatabaseError::configuration(format!(
            "migration file {} does not yield a migration unit",
            file.path.display()
        )))
    }
}

/// A migration file discovered on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Version identifier (the file stem)
    pub version: String,
    /// Full path to the file
    pub path: PathBuf,
}

impl MigrationFile {
    fn is_sql(&self) -> bool {
        self.path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("sql"))
            .unwrap_or(false)
    }
}

/// List the non-hidden regular files of `dir`, sorted by file name
pub(crate) fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        files.push((name, entry.path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// State of a version relative to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Recorded in the ledger
    Applied { applied_at: String },
    /// File exists but is not recorded
    Pending,
    /// Recorded in the ledger but its file is gone
    Missing { applied_at: String },
}

/// Result of a single rollback step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The ledger was empty
    NothingToRollBack,
    /// `down` ran and the ledger entry was removed
    RolledBack { version: String },
    /// The file was missing: the ledger entry was removed without running `down`
    Forgotten { version: String },
}

impl RollbackOutcome {
    /// Version removed from the ledger, if any
    pub fn version(&self) -> Option<&str> {
        match self {
            RollbackOutcome::NothingToRollBack => None,
            RollbackOutcome::RolledBack { version } | RollbackOutcome::Forgotten { version } => {
                Some(version)
            }
        }
    }
}

/// Applies and reverts migrations against one connection
pub struct MigrationRunner<'a> {
    db: &'a dyn Database,
    registry: MigrationRegistry,
    table_name: String,
}

impl<'a> MigrationRunner<'a> {
    /// Default name for the migrations ledger table
    pub const DEFAULT_TABLE_NAME: &'static str = "schema_migrations";

    /// Create a runner that only resolves SQL migration files
    pub fn new(db: &'a dyn Database) -> Self {
        Self::with_registry(db, MigrationRegistry::new())
    }

    /// Create a runner that also resolves registered Rust units
    pub fn with_registry(db: &'a dyn Database, registry: MigrationRegistry) -> Self {
        Self {
            db,
            registry,
            table_name: Self::DEFAULT_TABLE_NAME.to_string(),
        }
    }

    /// Use a custom ledger table name
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Ledger table name in use
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn timestamp_type(&self) -> &'static str {
        match self.db.database_type() {
            DatabaseType::Sqlite => "DATETIME",
            DatabaseType::Postgres => "TIMESTAMP",
        }
    }

    // Postgres will not bind text to a TIMESTAMP column without a cast
    fn timestamp_placeholder(&self) -> &'static str {
        match self.db.database_type() {
            DatabaseType::Sqlite => "?",
            DatabaseType::Postgres => "CAST(? AS TIMESTAMP)",
        }
    }

    /// Create the ledger table, tolerating an existing one
    async fn ensure_ledger(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE {} (version TEXT PRIMARY KEY, applied_at {} NOT NULL)",
            self.table_name,
            self.timestamp_type()
        );
        match self.db.execute(&sql, &[]).await {
            Ok(_) => {
                tracing::debug!(table = %self.table_name, "migration ledger created");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Ledger rows as `(version, applied_at)`, oldest first
    async fn ledger(&self) -> Result<Vec<(String, String)>> {
        self.ensure_ledger().await?;
        let sql = format!(
            "SELECT version, CAST(applied_at AS TEXT) AS applied_at FROM {} \
             ORDER BY applied_at ASC, version ASC",
            self.table_name
        );
        let rows = self.db.query(&sql, &[]).await?;

        rows.iter()
            .map(|row| {
                let field = |name: &str| {
                    row.get(name)
                        .map(|v| v.to_string())
                        .ok_or_else(|| DatabaseError::type_mismatch(name, "missing column"))
                };
                Ok((field("version")?, field("applied_at")?))
            })
            .collect()
    }

    /// Discover the migration files of `dir`, in application order
    pub fn discover(&self, dir: impl AsRef<Path>) -> Result<Vec<MigrationFile>> {
        let mut migrations = Vec::new();
        for (_, path) in list_files(dir.as_ref())? {
            let version = match path.file_stem() {
                Some(stem) => stem.to_string_lossy().into_owned(),
                None => continue,
            };
            let file = MigrationFile { version, path };
            if self.registry.is_migration_file(&file) {
                migrations.push(file);
            }
        }
        Ok(migrations)
    }

    /// Versions recorded in the ledger, ordered by `(applied_at, version)`
    pub async fn applied_versions(&self) -> Result<Vec<String>> {
        Ok(self
            .ledger()
            .await?
            .into_iter()
            .map(|(version, _)| version)
            .collect())
    }

    /// Versions present in `dir` but not yet applied
    pub async fn pending(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let applied: HashSet<String> = self.applied_versions().await?.into_iter().collect();
        Ok(self
            .discover(dir)?
            .into_iter()
            .filter(|file| !applied.contains(&file.version))
            .map(|file| file.version)
            .collect())
    }

    /// Status of every discovered and every recorded version, sorted by version
    pub async fn status(&self, dir: impl AsRef<Path>) -> Result<Vec<(String, MigrationStatus)>> {
        let mut ledger: HashMap<String, String> = self.ledger().await?.into_iter().collect();
        let mut status = Vec::new();

        for file in self.discover(dir)? {
            let state = match ledger.remove(&file.version) {
                Some(applied_at) => MigrationStatus::Applied { applied_at },
                None => MigrationStatus::Pending,
            };
            status.push((file.version, state));
        }
        for (version, applied_at) in ledger {
            status.push((version, MigrationStatus::Missing { applied_at }));
        }

        status.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(status)
    }

    /// Apply every pending migration in `dir`, stopping at the first failure.
    ///
    /// Returns the versions applied by this call, in application order. A
    /// failing version is not recorded and later versions are not attempted.
    pub async fn migrate(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let applied: HashSet<String> = self.applied_versions().await?.into_iter().collect();
        let insert_sql = format!(
            "INSERT INTO {} (version, applied_at) VALUES (?, {})",
            self.table_name,
            self.timestamp_placeholder()
        );
        let mut migrated = Vec::new();

        for file in self.discover(dir)? {
            if applied.contains(&file.version) {
                continue;
            }

            let unit = self.registry.resolve(&file)?;
            unit.up(self.db).await.map_err(|e| {
                tracing::warn!(version = %file.version, error = %e, "migration failed");
                DatabaseError::migration(file.version.clone(), MigrationDirection::Up, e)
            })?;

            self.db
                .execute(
                    &insert_sql,
                    &[
                        DatabaseValue::Text(file.version.clone()),
                        DatabaseValue::Text(timestamp()),
                    ],
                )
                .await?;

            tracing::info!(version = %file.version, "migration applied");
            migrated.push(file.version);
        }

        Ok(migrated)
    }

    /// Revert the most recently applied migration.
    ///
    /// The target is the latest ledger entry by `(applied_at desc, version desc)`.
    /// If its file no longer exists the entry is removed without running
    /// `down`, so later rollbacks are not blocked.
    pub async fn rollback(&self, dir: impl AsRef<Path>) -> Result<RollbackOutcome> {
        let version = match self.ledger().await?.pop() {
            Some((version, _)) => version,
            None => return Ok(RollbackOutcome::NothingToRollBack),
        };

        let file = self
            .discover(dir)?
            .into_iter()
            .find(|file| file.version == version);

        let outcome = match file {
            Some(file) => {
                let unit = self.registry.resolve(&file)?;
                unit.down(self.db).await.map_err(|e| {
                    tracing::warn!(version = %version, error = %e, "rollback failed");
                    DatabaseError::migration(version.clone(), MigrationDirection::Down, e)
                })?;
                tracing::info!(version = %version, "migration rolled back");
                RollbackOutcome::RolledBack {
                    version: version.clone(),
                }
            }
            None => {
                tracing::warn!(
                    version = %version,
                    "migration file missing, removing ledger entry without running down"
                );
                RollbackOutcome::Forgotten {
                    version: version.clone(),
                }
            }
        };

        let delete_sql = format!("DELETE FROM {} WHERE version = ?", self.table_name);
        self.db
            .execute(&delete_sql, &[DatabaseValue::Text(version)])
            .await?;

        Ok(outcome)
    }

    /// Roll back until the ledger is empty; returns the versions removed, newest first
    pub async fn reset(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = dir.as_ref();
        let mut removed = Vec::new();
        loop {
            match self.rollback(dir).await? {
                RollbackOutcome::NothingToRollBack => return Ok(removed),
                RollbackOutcome::RolledBack { version } | RollbackOutcome::Forgotten { version } => {
                    removed.push(version)
                }
            }
        }
    }
}

/// Ledger timestamp, UTC with second resolution
fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
