//! Seed-data runner
//!
//! Seeders are executed in ascending file-name order. There is no ledger:
//! every run executes every file again, so seeders must be written to be
//! safe to repeat if callers re-run them.

use super::database::Database;
use super::error::{DatabaseError, Result};
use super::migration::list_files;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by closure seeders
pub type SeedFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A single-shot procedure that writes data through the connection
#[async_trait]
pub trait Seeder: Send + Sync {
    async fn run(&self, db: &dyn Database) -> Result<()>;
}

/// Seeder backed by a SQL script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSeeder {
    sql: String,
}

impl SqlSeeder {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }
}

#[async_trait]
impl Seeder for SqlSeeder {
    async fn run(&self, db: &dyn Database) -> Result<()> {
        if self.sql.trim().is_empty() {
            return Ok(());
        }
        db.execute_batch(&self.sql).await
    }
}

struct FnSeeder<F>(F);

#[async_trait]
impl<F> Seeder for FnSeeder<F>
where
    F: for<'a> Fn(&'a dyn Database) -> SeedFuture<'a> + Send + Sync,
{
    async fn run(&self, db: &dyn Database) -> Result<()> {
        (self.0)(db).await
    }
}

/// Maps seed file stems to Rust-defined seeders
#[derive(Default, Clone)]
pub struct SeederRegistry {
    seeders: HashMap<String, Arc<dyn Seeder>>,
}

impl SeederRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a seeder for the file whose stem is `name`
    pub fn register<S>(&mut self, name: impl Into<String>, seeder: S) -> &mut Self
    where
        S: Seeder + 'static,
    {
        self.seeders.insert(name.into(), Arc::new(seeder));
        self
    }

    /// Register a closure seeder for the file whose stem is `name`
    ///
    /// ```rust,no_run
    /// use rowbound::prelude::*;
    ///
    /// let mut registry = SeederRegistry::new();
    /// registry.register_fn("010_roles", |db| {
    ///     Box::pin(async move {
    ///         db.table("roles").insert([("name", "admin")]).await?;
    ///         Ok::<(), DatabaseError>(())
    ///     })
    /// });
    /// ```
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a dyn Database) -> SeedFuture<'a> + Send + Sync + 'static,
    {
        self.register(name, FnSeeder(f))
    }

    fn resolve(&self, name: &str, path: &Path) -> Result<Arc<dyn Seeder>> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(seeder) = self.seeders.get(&stem) {
            return Ok(Arc::clone(seeder));
        }
        let is_sql = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("sql"))
            .unwrap_or(false);
        if is_sql {
            let contents = std::fs::read_to_string(path)?;
            return Ok(Arc::new(SqlSeeder::new(contents)));
        }
        Err(DatabaseError::configuration(format!(
            "seed file {} does not yield a seeder",
            name
        )))
    }
}

/// Runs every seeder of a directory against one connection
pub struct SeederRunner<'a> {
    db: &'a dyn Database,
    registry: SeederRegistry,
}

impl<'a> SeederRunner<'a> {
    /// Create a runner that only resolves SQL seed files
    pub fn new(db: &'a dyn Database) -> Self {
        Self::with_registry(db, SeederRegistry::new())
    }

    pub fn with_registry(db: &'a dyn Database, registry: SeederRegistry) -> Self {
        Self { db, registry }
    }

    /// Execute every seed file in `dir` in file-name order.
    ///
    /// All files are resolved before the first one runs, so a file that
    /// yields no seeder aborts the run before any data is written. Returns
    /// the executed file names.
    pub async fn seed(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let resolved: Vec<(String, Arc<dyn Seeder>)> = list_files(dir.as_ref())?
            .into_iter()
            .map(|(name, path): (String, PathBuf)| {
                let seeder = self.registry.resolve(&name, &path)?;
                Ok((name, seeder))
            })
            .collect::<Result<_>>()?;

        let mut executed = Vec::with_capacity(resolved.len());
        for (name, seeder) in resolved {
            seeder.run(self.db).await?;
            tracing::info!(file = %name, "seeder executed");
            executed.push(name);
        }
        Ok(executed)
    }
}
