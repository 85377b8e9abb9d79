//! Eager loading of relations
//!
//! Given a batch of parent rows and a list of relation names, the
//! [`EagerLoader`] issues exactly one query per relation, regardless of the
//! batch size, and returns new [`LoadedRow`]s with the related data attached.
//!
//! Relations are declared per model in a [`RelationMap`]:
//!
//! - **belongs-to**: `parent[local_key]` points at `related[foreign_key]`,
//!   at most one related row
//! - **has-many**: `related[foreign_key]` points back at `parent[local_key]`
//! - **has-one**: like has-many, but only the first related row is kept
//!
//! Keys are always compared by equality.
//!
//! # Example
//!
//! ```rust,no_run
//! use rowbound::prelude::*;
//!
//! # async fn example(db: &SqliteDatabase) -> rowbound::Result<()> {
//! let relations = RelationMap::new("posts")
//!     .belongs_to("author", "users", "user_id", "id")
//!     .has_many("comments", "comments", "id", "post_id");
//!
//! let posts = db.table("posts").fetch_all().await?;
//! let loaded = EagerLoader::new(db, &relations)
//!     .load(posts, &["author", "comments"])
//!     .await?;
//!
//! for post in &loaded {
//!     println!("{} comments", post.many("comments").len());
//! }
//! # Ok(())
//! # }
//! ```

use super::database::{Database, DatabaseExt};
use super::error::{DatabaseError, Result};
use super::value::{row_to_json, DatabaseValue, Row};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashMap;

/// Kind of relation between a parent table and a related table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    BelongsTo,
    HasMany,
    HasOne,
}

/// Everything needed to resolve one named relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: String,
    pub parent_table: String,
    pub related_table: String,
    /// Column read from each parent row
    pub local_key: String,
    /// Column on the related table matched against the local key
    pub foreign_key: String,
    pub kind: RelationKind,
}

/// Registry of the relations a model understands, keyed by name
#[derive(Debug, Clone, Default)]
pub struct RelationMap {
    parent_table: String,
    relations: IndexMap<String, RelationDescriptor>,
}

impl RelationMap {
    /// Create an empty map for models stored in `parent_table`
    pub fn new(parent_table: impl Into<String>) -> Self {
        Self {
            parent_table: parent_table.into(),
            relations: IndexMap::new(),
        }
    }

    /// Declare a belongs-to relation
    pub fn belongs_to(
        self,
        name: &str,
        related_table: &str,
        local_key: &str,
        foreign_key: &str,
    ) -> Self {
        self.with(RelationKind::BelongsTo, name, related_table, local_key, foreign_key)
    }

    /// Declare a has-many relation
    pub fn has_many(
        self,
        name: &str,
        related_table: &str,
        local_key: &str,
        foreign_key: &str,
    ) -> Self {
        self.with(RelationKind::HasMany, name, related_table, local_key, foreign_key)
    }

    /// Declare a has-one relation
    pub fn has_one(
        self,
        name: &str,
        related_table: &str,
        local_key: &str,
        foreign_key: &str,
    ) -> Self {
        self.with(RelationKind::HasOne, name, related_table, local_key, foreign_key)
    }

    fn with(
        mut self,
        kind: RelationKind,
        name: &str,
        related_table: &str,
        local_key: &str,
        foreign_key: &str,
    ) -> Self {
        let descriptor = RelationDescriptor {
            name: name.to_string(),
            parent_table: self.parent_table.clone(),
            related_table: related_table.to_string(),
            local_key: local_key.to_string(),
            foreign_key: foreign_key.to_string(),
            kind,
        };
        self.relations.insert(name.to_string(), descriptor);
        self
    }

    pub fn parent_table(&self) -> &str {
        &self.parent_table
    }

    /// Look up a relation by name
    pub fn get(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    /// Declared relations, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &RelationDescriptor> {
        self.relations.values()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Implemented by model types to expose their table and relations
pub trait HasRelations {
    fn table() -> &'static str;
    fn relations() -> RelationMap;
}

/// What to do with relation names the map does not know
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownRelationPolicy {
    /// Ignore the name and attach nothing for it
    #[default]
    Skip,
    /// Fail with [`DatabaseError::UnknownRelation`] before any query runs
    Fail,
}

/// Normalised key used to match parents with related rows.
///
/// Integer-like values of any width compare equal, including text holding
/// a canonical integer such as `"42"`; nulls never become keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationKey {
    Int(i64),
    Text(String),
}

impl RelationKey {
    pub fn from_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Null => None,
            DatabaseValue::Bool(v) => Some(RelationKey::Int(*v as i64)),
            DatabaseValue::Integer(v) => Some(RelationKey::Int(*v)),
            DatabaseValue::Real(v) if v.fract() == 0.0 && v.is_finite() => {
                Some(RelationKey::Int(*v as i64))
            }
            DatabaseValue::Text(v) => Some(match v.parse::<i64>() {
                Ok(n) if n.to_string() == *v => RelationKey::Int(n),
                _ => RelationKey::Text(v.clone()),
            }),
            other => Some(RelationKey::Text(other.to_string())),
        }
    }

    pub fn to_value(&self) -> DatabaseValue {
        match self {
            RelationKey::Int(v) => DatabaseValue::Integer(*v),
            RelationKey::Text(v) => DatabaseValue::Text(v.clone()),
        }
    }
}

/// Related data attached under one relation name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    /// belongs-to / has-one
    One(Option<Row>),
    /// has-many
    Many(Vec<Row>),
}

impl Related {
    fn empty(kind: RelationKind) -> Self {
        match kind {
            RelationKind::HasMany => Related::Many(Vec::new()),
            RelationKind::BelongsTo | RelationKind::HasOne => Related::One(None),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(Some(row)) => row_to_json(row),
            Related::One(None) => serde_json::Value::Null,
            Related::Many(rows) => rows.iter().map(row_to_json).collect(),
        }
    }
}

/// A parent row together with its eager-loaded relations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedRow {
    pub row: Row,
    pub relations: IndexMap<String, Related>,
}

impl LoadedRow {
    pub fn new(row: Row) -> Self {
        Self {
            row,
            relations: IndexMap::new(),
        }
    }

    /// Column of the parent row
    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.row.get(column)
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    /// Rows of a has-many relation; empty if absent or not has-many
    pub fn many(&self, name: &str) -> &[Row] {
        match self.relations.get(name) {
            Some(Related::Many(rows)) => rows,
            _ => &[],
        }
    }

    /// Row of a belongs-to or has-one relation
    pub fn one(&self, name: &str) -> Option<&Row> {
        match self.relations.get(name) {
            Some(Related::One(row)) => row.as_ref(),
            _ => None,
        }
    }

    /// Parent columns followed by one key per relation
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = match row_to_json(&self.row) {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        for (name, related) in &self.relations {
            object.insert(name.clone(), related.to_json());
        }
        serde_json::Value::Object(object)
    }
}

/// Collect the distinct non-null values of `column`, in first-seen order
pub fn collect_keys(rows: &[Row], column: &str) -> Vec<RelationKey> {
    distinct_keys(rows, column)
}

fn distinct_keys<'r>(rows: impl IntoIterator<Item = &'r Row>, column: &str) -> Vec<RelationKey> {
    rows.into_iter()
        .filter_map(|row| row.get(column).and_then(RelationKey::from_value))
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Group related rows by their foreign key, honouring the relation kind
fn index_related(
    kind: RelationKind,
    rows: Vec<Row>,
    foreign_key: &str,
) -> HashMap<RelationKey, Related> {
    let mut index: HashMap<RelationKey, Related> = HashMap::new();
    for row in rows {
        let key = match row.get(foreign_key).and_then(RelationKey::from_value) {
            Some(key) => key,
            None => continue,
        };
        match kind {
            RelationKind::HasMany => {
                if let Related::Many(list) =
                    index.entry(key).or_insert_with(|| Related::Many(Vec::new()))
                {
                    list.push(row);
                }
            }
            // First row per key wins
            RelationKind::BelongsTo | RelationKind::HasOne => {
                index.entry(key).or_insert(Related::One(Some(row)));
            }
        }
    }
    index
}

/// Loads relations for batches of parent rows
pub struct EagerLoader<'a> {
    db: &'a dyn Database,
    relations: &'a RelationMap,
    policy: UnknownRelationPolicy,
}

impl<'a> EagerLoader<'a> {
    pub fn new(db: &'a dyn Database, relations: &'a RelationMap) -> Self {
        Self {
            db,
            relations,
            policy: UnknownRelationPolicy::default(),
        }
    }

    /// Choose how unknown relation names are handled
    pub fn with_policy(mut self, policy: UnknownRelationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attach every named relation to every parent.
    ///
    /// Issues one query per relation with a non-empty key set and none when
    /// no parent carries a key. Every parent gets a value for every resolved
    /// relation: an empty list for has-many, `None` otherwise.
    pub async fn load(&self, parents: Vec<Row>, names: &[&str]) -> Result<Vec<LoadedRow>> {
        let descriptors = self.resolve(names)?;
        let mut loaded: Vec<LoadedRow> = parents.into_iter().map(LoadedRow::new).collect();

        for descriptor in descriptors {
            self.load_relation(descriptor, &mut loaded).await?;
        }
        Ok(loaded)
    }

    fn resolve(&self, names: &[&str]) -> Result<Vec<&'a RelationDescriptor>> {
        let mut descriptors: IndexMap<&str, &'a RelationDescriptor> = IndexMap::new();
        for name in names {
            match self.relations.get(name) {
                // Repeated names load once
                Some(descriptor) => {
                    descriptors.entry(*name).or_insert(descriptor);
                }
                None => match self.policy {
                    UnknownRelationPolicy::Skip => {
                        tracing::warn!(
                            relation = %name,
                            table = %self.relations.parent_table(),
                            "skipping unknown relation"
                        );
                    }
                    UnknownRelationPolicy::Fail => {
                        return Err(DatabaseError::UnknownRelation {
                            name: name.to_string(),
                        });
                    }
                },
            }
        }
        Ok(descriptors.into_values().collect())
    }

    async fn load_relation(
        &self,
        descriptor: &RelationDescriptor,
        parents: &mut [LoadedRow],
    ) -> Result<()> {
        let keys = distinct_keys(parents.iter().map(|p| &p.row), &descriptor.local_key);

        let index = if keys.is_empty() {
            HashMap::new()
        } else {
            let rows = self
                .db
                .table(&descriptor.related_table)
                .where_in(&descriptor.foreign_key, keys.iter().map(RelationKey::to_value))
                .fetch_all()
                .await?;
            tracing::debug!(
                relation = %descriptor.name,
                keys = keys.len(),
                rows = rows.len(),
                "relation loaded"
            );
            index_related(descriptor.kind, rows, &descriptor.foreign_key)
        };

        for parent in parents.iter_mut() {
            let key = parent
                .get(&descriptor.local_key)
                .and_then(RelationKey::from_value);
            // Cloned: several parents may share a key
            let related = key
                .and_then(|key| index.get(&key).cloned())
                .unwrap_or_else(|| Related::empty(descriptor.kind));
            parent.relations.insert(descriptor.name.clone(), related);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::row;

    #[test]
    fn test_relation_key_normalisation() {
        assert_eq!(
            RelationKey::from_value(&DatabaseValue::Integer(3)),
            RelationKey::from_value(&DatabaseValue::Real(3.0))
        );
        assert_eq!(RelationKey::from_value(&DatabaseValue::Null), None);
        assert_eq!(
            RelationKey::from_value(&DatabaseValue::Text("a".into())),
            Some(RelationKey::Text("a".into()))
        );
    }

    #[test]
    fn test_integer_text_keys_match_integers() {
        assert_eq!(
            RelationKey::from_value(&DatabaseValue::from("42")),
            Some(RelationKey::Int(42))
        );
        assert_eq!(
            RelationKey::from_value(&DatabaseValue::from("-7")),
            RelationKey::from_value(&DatabaseValue::Integer(-7))
        );
        // Non-canonical spellings stay text
        for text in ["007", "+1", " 1", "1.0", "abc"] {
            assert_eq!(
                RelationKey::from_value(&DatabaseValue::from(text)),
                Some(RelationKey::Text(text.to_string()))
            );
        }
    }

    #[test]
    fn test_collect_keys_dedupes_in_order() {
        let rows = vec![
            row([("user_id", 3)]),
            row([("user_id", 1)]),
            row([("user_id", 3)]),
            row([("user_id", DatabaseValue::Null)]),
        ];
        assert_eq!(
            collect_keys(&rows, "user_id"),
            vec![RelationKey::Int(3), RelationKey::Int(1)]
        );
    }

    #[test]
    fn test_index_has_one_first_wins() {
        let rows = vec![
            row([("user_id", DatabaseValue::Integer(1)), ("v", "first".into())]),
            row([("user_id", DatabaseValue::Integer(1)), ("v", "second".into())]),
        ];
        let index = index_related(RelationKind::HasOne, rows, "user_id");
        match index.get(&RelationKey::Int(1)) {
            Some(Related::One(Some(r))) => {
                assert_eq!(r["v"], DatabaseValue::Text("first".into()))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_relation_map_declaration_order() {
        let map = RelationMap::new("posts")
            .has_many("comments", "comments", "id", "post_id")
            .belongs_to("author", "users", "user_id", "id");
        let names: Vec<&str> = map.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["comments", "author"]);
        assert_eq!(map.get("author").map(|d| d.kind), Some(RelationKind::BelongsTo));
        assert_eq!(map.get("author").map(|d| d.parent_table.as_str()), Some("posts"));
    }

    #[test]
    fn test_loaded_row_json() {
        let mut loaded = LoadedRow::new(row([("id", 1)]));
        loaded
            .relations
            .insert("comments".into(), Related::Many(vec![row([("body", "hi")])]));
        loaded.relations.insert("author".into(), Related::One(None));
        assert_eq!(
            loaded.to_json(),
            serde_json::json!({"id": 1, "comments": [{"body": "hi"}], "author": null})
        );
    }
}
