//! Core persistence types and traits
//!
//! This module provides the building blocks shared by every backend: the
//! error taxonomy, row and value primitives, connection configuration, the
//! [`Database`] facade, query compilation, migrations, seeders and eager
//! loading.

pub mod config;
pub mod database;
pub mod database_types;
pub mod error;
pub mod grammar;
pub mod migration;
pub mod query_builder;
pub mod relation;
pub mod seeder;
pub mod value;

// Re-export commonly used types
pub use config::{ConnectionBuilder, ConnectionConfig};
pub use database::{Database, DatabaseExt};
pub use database_types::DatabaseType;
pub use error::{DatabaseError, MigrationDirection, Result};
pub use grammar::{CompiledQuery, Grammar, PostgresGrammar, SqliteGrammar};
pub use migration::{
    MigrationFile, MigrationRegistry, MigrationRunner, MigrationStatus, MigrationUnit,
    RollbackOutcome, SqlMigration,
};
pub use query_builder::{
    Clause, Connective, JoinType, Operator, OrderDirection, Predicate, QueryBuilder,
    QueryDescriptor,
};
pub use relation::{
    EagerLoader, HasRelations, LoadedRow, Related, RelationDescriptor, RelationKey, RelationKind,
    RelationMap, UnknownRelationPolicy,
};
pub use seeder::{SeedFuture, Seeder, SeederRegistry, SeederRunner, SqlSeeder};
pub use value::{row, DatabaseResult, DatabaseValue, Row};
