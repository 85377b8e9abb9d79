//! Fluent query builder
//!
//! [`QueryDescriptor`] accumulates a query description (predicates, joins,
//! ordering, page window, projection) without touching a connection.
//! [`QueryBuilder`] pairs a descriptor with a [`Database`] and adds the
//! terminal operations that compile through the connection's grammar and
//! execute.
//!
//! # Example
//!
//! ```rust,no_run
//! use rowbound::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let db = SqliteDatabase::open(&ConnectionConfig::sqlite_memory()).await?;
//! let adults = db
//!     .table("users")
//!     .select(&["id", "name"])
//!     .where_ge("age", 18)
//!     .filter("name", "like", "A%")?
//!     .order_by_asc("name")
//!     .fetch_all()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::database::Database;
use super::error::{DatabaseError, Result};
use super::grammar::CompiledQuery;
use super::value::{DatabaseResult, DatabaseValue, Row};
use std::str::FromStr;

/// SQL comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal to (=)
    Eq,
    /// Not equal to (!= or <>)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// LIKE pattern matching
    Like,
    /// NOT LIKE pattern matching
    NotLike,
    /// IN set membership
    In,
    /// NOT IN set membership
    NotIn,
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    IsNotNull,
}

impl Operator {
    /// SQL text for binary comparison operators
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

impl FromStr for Operator {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "LIKE" => Ok(Operator::Like),
            "NOT LIKE" => Ok(Operator::NotLike),
            "IN" => Ok(Operator::In),
            "NOT IN" => Ok(Operator::NotIn),
            "IS NULL" => Ok(Operator::IsNull),
            "IS NOT NULL" => Ok(Operator::IsNotNull),
            _ => Err(DatabaseError::invalid_operator(s)),
        }
    }
}

/// Logical connective joining a predicate group to the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    /// AND
    And,
    /// OR
    Or,
}

/// A single predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column <op> ?`
    Compare {
        column: String,
        operator: Operator,
        value: DatabaseValue,
    },
    /// `column [NOT] IN (?, ...)`
    In {
        column: String,
        values: Vec<DatabaseValue>,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
    /// Nested, parenthesised list of clauses
    Group(Vec<Clause>),
}

impl Predicate {
    /// Operator this predicate compiles to, if it has a single one
    pub fn operator(&self) -> Option<Operator> {
        match self {
            Predicate::Compare { operator, .. } => Some(*operator),
            Predicate::In { negated: false, .. } => Some(Operator::In),
            Predicate::In { negated: true, .. } => Some(Operator::NotIn),
            Predicate::Null { negated: false, .. } => Some(Operator::IsNull),
            Predicate::Null { negated: true, .. } => Some(Operator::IsNotNull),
            Predicate::Group(_) => None,
        }
    }
}

/// A predicate and its connective
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub connective: Connective,
    pub predicate: Predicate,
}

/// JOIN types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN
    Inner,
    /// LEFT JOIN
    Left,
    /// RIGHT JOIN
    Right,
}

impl JoinType {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// JOIN clause
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinType,
    pub table: String,
    pub on: String,
}

/// ORDER BY direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order
    Asc,
    /// Descending order
    Desc,
}

impl OrderDirection {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Accumulated, connection-free description of a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub table: String,
    /// Explicit projection; empty means `*`
    pub columns: Vec<String>,
    pub joins: Vec<Join>,
    pub wheres: Vec<Clause>,
    pub orders: Vec<(String, OrderDirection)>,
    pub group_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryDescriptor {
    /// Create an empty descriptor scoped to `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            orders: Vec::new(),
            group_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    fn push(mut self, connective: Connective, predicate: Predicate) -> Self {
        self.wheres.push(Clause {
            connective,
            predicate,
        });
        self
    }

    fn predicate(column: &str, operator: Operator, value: DatabaseValue) -> Predicate {
        match operator {
            Operator::IsNull | Operator::IsNotNull => Predicate::Null {
                column: column.to_string(),
                negated: operator == Operator::IsNotNull,
            },
            Operator::In | Operator::NotIn => Predicate::In {
                column: column.to_string(),
                values: vec![value],
                negated: operator == Operator::NotIn,
            },
            _ => Predicate::Compare {
                column: column.to_string(),
                operator,
                value,
            },
        }
    }

    /// Select specific columns
    #[must_use]
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add an AND predicate from an operator string.
    ///
    /// Fails immediately with [`DatabaseError::InvalidOperator`] when the
    /// operator is not recognised. `IS NULL` / `IS NOT NULL` ignore `value`;
    /// `IN` / `NOT IN` treat it as a one-element list.
    pub fn filter(
        self,
        column: &str,
        operator: &str,
        value: impl Into<DatabaseValue>,
    ) -> Result<Self> {
        let operator: Operator = operator.parse()?;
        Ok(self.push(
            Connective::And,
            Self::predicate(column, operator, value.into()),
        ))
    }

    /// Add an OR predicate from an operator string
    pub fn or_filter(
        self,
        column: &str,
        operator: &str,
        value: impl Into<DatabaseValue>,
    ) -> Result<Self> {
        let operator: Operator = operator.parse()?;
        Ok(self.push(Connective::Or, Self::predicate(column, operator, value.into())))
    }

    /// Add a WHERE column = value condition
    #[must_use]
    pub fn where_eq(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.push(
            Connective::And,
            Self::predicate(column, Operator::Eq, value.into()),
        )
    }

    /// Add an OR column = value condition
    #[must_use]
    pub fn or_where_eq(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.push(
            Connective::Or,
            Self::predicate(column, Operator::Eq, value.into()),
        )
    }

    /// Add a WHERE column != value condition
    #[must_use]
    pub fn where_ne(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.push(
            Connective::And,
            Self::predicate(column, Operator::Ne, value.into()),
        )
    }

    /// Add a WHERE column > value condition
    #[must_use]
    pub fn where_gt(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.push(
            Connective::And,
            Self::predicate(column, Operator::Gt, value.into()),
        )
    }

    /// Add a WHERE column >= value condition
    #[must_use]
    pub fn where_ge(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.push(
            Connective::And,
            Self::predicate(column, Operator::Ge, value.into()),
        )
    }

    /// Add a WHERE column < value condition
    #[must_use]
    pub fn where_lt(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.push(
            Connective::And,
            Self::predicate(column, Operator::Lt, value.into()),
        )
    }

    /// Add a WHERE column <= value condition
    #[must_use]
    pub fn where_le(self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.push(
            Connective::And,
            Self::predicate(column, Operator::Le, value.into()),
        )
    }

    /// Add a WHERE column LIKE pattern condition
    #[must_use]
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.push(
            Connective::And,
            Self::predicate(column, Operator::Like, pattern.into()),
        )
    }

    /// Add a WHERE column IN (...) condition; an empty list matches no rows
    #[must_use]
    pub fn where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        self.push(
            Connective::And,
            Predicate::In {
                column: column.to_string(),
                values: values.into_iter().map(Into::into).collect(),
                negated: false,
            },
        )
    }

    /// Add an OR column IN (...) condition
    #[must_use]
    pub fn or_where_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        self.push(
            Connective::Or,
            Predicate::In {
                column: column.to_string(),
                values: values.into_iter().map(Into::into).collect(),
                negated: false,
            },
        )
    }

    /// Add a WHERE column NOT IN (...) condition; an empty list matches every row
    #[must_use]
    pub fn where_not_in<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        self.push(
            Connective::And,
            Predicate::In {
                column: column.to_string(),
                values: values.into_iter().map(Into::into).collect(),
                negated: true,
            },
        )
    }

    /// Add a WHERE column IS NULL condition
    #[must_use]
    pub fn where_null(self, column: &str) -> Self {
        self.push(
            Connective::And,
            Predicate::Null {
                column: column.to_string(),
                negated: false,
            },
        )
    }

    /// Add a WHERE column IS NOT NULL condition
    #[must_use]
    pub fn where_not_null(self, column: &str) -> Self {
        self.push(
            Connective::And,
            Predicate::Null {
                column: column.to_string(),
                negated: true,
            },
        )
    }

    /// Add a nested AND group built by `f`; an empty group is dropped
    #[must_use]
    pub fn where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryDescriptor) -> QueryDescriptor,
    {
        self.group(Connective::And, f)
    }

    /// Add a nested OR group built by `f`; an empty group is dropped
    #[must_use]
    pub fn or_where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryDescriptor) -> QueryDescriptor,
    {
        self.group(Connective::Or, f)
    }

    fn group<F>(self, connective: Connective, f: F) -> Self
    where
        F: FnOnce(QueryDescriptor) -> QueryDescriptor,
    {
        let inner = f(QueryDescriptor::new(self.table.clone())).wheres;
        if inner.is_empty() {
            return self;
        }
        self.push(connective, Predicate::Group(inner))
    }

    /// Add an INNER JOIN
    #[must_use]
    pub fn join(mut self, table: &str, on: &str) -> Self {
        self.joins.push(Join {
            kind: JoinType::Inner,
            table: table.to_string(),
            on: on.to_string(),
        });
        self
    }

    /// Add a LEFT JOIN
    #[must_use]
    pub fn left_join(mut self, table: &str, on: &str) -> Self {
        self.joins.push(Join {
            kind: JoinType::Left,
            table: table.to_string(),
            on: on.to_string(),
        });
        self
    }

    /// Add a RIGHT JOIN
    #[must_use]
    pub fn right_join(mut self, table: &str, on: &str) -> Self {
        self.joins.push(Join {
            kind: JoinType::Right,
            table: table.to_string(),
            on: on.to_string(),
        });
        self
    }

    /// Add ORDER BY clause
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.orders.push((column.to_string(), direction));
        self
    }

    /// Add ORDER BY ASC
    #[must_use]
    pub fn order_by_asc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Asc)
    }

    /// Add ORDER BY DESC
    #[must_use]
    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Desc)
    }

    /// Add GROUP BY clause
    #[must_use]
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.group_by = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add LIMIT clause
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add OFFSET clause
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Restrict to the 1-based `page` of size `per_page`
    #[must_use]
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit(per_page).offset((page - 1).saturating_mul(per_page))
    }
}

macro_rules! forward_fluent {
    ($( $(#[$meta:meta])* fn $name:ident(self $(, $arg:ident : $ty:ty)*); )*) => {
        $(
            $(#[$meta])*
            #[must_use]
            pub fn $name(mut self $(, $arg: $ty)*) -> Self {
                self.query = self.query.$name($($arg),*);
                self
            }
        )*
    };
}

/// Table-scoped builder bound to a connection
///
/// Nothing is executed until a terminal operation (`fetch_all`, `fetch_one`,
/// `insert`, `update`, `delete`, `count`) is awaited.
pub struct QueryBuilder<'a> {
    db: &'a dyn Database,
    query: QueryDescriptor,
}

impl<'a> QueryBuilder<'a> {
    /// Create a fresh, empty builder for `table`
    pub fn new(db: &'a dyn Database, table: impl Into<String>) -> Self {
        Self {
            db,
            query: QueryDescriptor::new(table),
        }
    }

    /// The accumulated descriptor
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.query
    }

    forward_fluent! {
        /// Select specific columns
        fn select(self, columns: &[&str]);
        /// Add a WHERE column = value condition
        fn where_eq(self, column: &str, value: impl Into<DatabaseValue>);
        /// Add an OR column = value condition
        fn or_where_eq(self, column: &str, value: impl Into<DatabaseValue>);
        /// Add a WHERE column != value condition
        fn where_ne(self, column: &str, value: impl Into<DatabaseValue>);
        /// Add a WHERE column > value condition
        fn where_gt(self, column: &str, value: impl Into<DatabaseValue>);
        /// Add a WHERE column >= value condition
        fn where_ge(self, column: &str, value: impl Into<DatabaseValue>);
        /// Add a WHERE column < value condition
        fn where_lt(self, column: &str, value: impl Into<DatabaseValue>);
        /// Add a WHERE column <= value condition
        fn where_le(self, column: &str, value: impl Into<DatabaseValue>);
        /// Add a WHERE column LIKE pattern condition
        fn where_like(self, column: &str, pattern: &str);
        /// Add a WHERE column IS NULL condition
        fn where_null(self, column: &str);
        /// Add a WHERE column IS NOT NULL condition
        fn where_not_null(self, column: &str);
        /// Add an INNER JOIN
        fn join(self, table: &str, on: &str);
        /// Add a LEFT JOIN
        fn left_join(self, table: &str, on: &str);
        /// Add a RIGHT JOIN
        fn right_join(self, table: &str, on: &str);
        /// Add ORDER BY clause
        fn order_by(self, column: &str, direction: OrderDirection);
        /// Add ORDER BY ASC
        fn order_by_asc(self, column: &str);
        /// Add ORDER BY DESC
        fn order_by_desc(self, column: &str);
        /// Add GROUP BY clause
        fn group_by(self, columns: &[&str]);
        /// Add LIMIT clause
        fn limit(self, limit: u64);
        /// Add OFFSET clause
        fn offset(self, offset: u64);
        /// Restrict to the 1-based `page` of size `per_page`
        fn for_page(self, page: u64, per_page: u64);
    }

    /// Add an AND predicate from an operator string, failing on unknown operators
    pub fn filter(
        mut self,
        column: &str,
        operator: &str,
        value: impl Into<DatabaseValue>,
    ) -> Result<Self> {
        self.query = self.query.filter(column, operator, value)?;
        Ok(self)
    }

    /// Add an OR predicate from an operator string, failing on unknown operators
    pub fn or_filter(
        mut self,
        column: &str,
        operator: &str,
        value: impl Into<DatabaseValue>,
    ) -> Result<Self> {
        self.query = self.query.or_filter(column, operator, value)?;
        Ok(self)
    }

    /// Add a WHERE column IN (...) condition
    #[must_use]
    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        self.query = self.query.where_in(column, values);
        self
    }

    /// Add an OR column IN (...) condition
    #[must_use]
    pub fn or_where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        self.query = self.query.or_where_in(column, values);
        self
    }

    /// Add a WHERE column NOT IN (...) condition
    #[must_use]
    pub fn where_not_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DatabaseValue>,
    {
        self.query = self.query.where_not_in(column, values);
        self
    }

    /// Add a nested AND group
    #[must_use]
    pub fn where_group<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryDescriptor) -> QueryDescriptor,
    {
        self.query = self.query.where_group(f);
        self
    }

    /// Add a nested OR group
    #[must_use]
    pub fn or_where_group<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryDescriptor) -> QueryDescriptor,
    {
        self.query = self.query.or_where_group(f);
        self
    }

    /// Compile the SELECT without executing it
    pub fn to_sql(&self) -> CompiledQuery {
        self.db.grammar().compile_select(&self.query)
    }

    /// Execute the SELECT and return every row
    pub async fn fetch_all(&self) -> Result<DatabaseResult> {
        let compiled = self.to_sql();
        self.db.query(&compiled.sql, &compiled.bindings).await
    }

    /// Execute the SELECT with `LIMIT 1` and return the first row, if any
    pub async fn fetch_one(&self) -> Result<Option<Row>> {
        let query = self.query.clone().limit(1);
        let compiled = self.db.grammar().compile_select(&query);
        let rows = self.db.query(&compiled.sql, &compiled.bindings).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row and return the generated primary key
    pub async fn insert<I, K, V>(&self, values: I) -> Result<i64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        let values = collect_values(values);
        if values.is_empty() {
            return Err(DatabaseError::other(format!(
                "insert into {} requires at least one column",
                self.query.table
            )));
        }
        let compiled = self.db.grammar().compile_insert(&self.query.table, &values);
        self.db
            .insert_and_return_id(&compiled.sql, &compiled.bindings)
            .await
    }

    /// Update matching rows and return the affected count
    pub async fn update<I, K, V>(&self, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<DatabaseValue>,
    {
        let values = collect_values(values);
        if values.is_empty() {
            return Ok(0);
        }
        let compiled = self.db.grammar().compile_update(&self.query, &values);
        self.db.execute(&compiled.sql, &compiled.bindings).await
    }

    /// Delete matching rows and return the affected count
    pub async fn delete(&self) -> Result<u64> {
        let compiled = self.db.grammar().compile_delete(&self.query);
        self.db.execute(&compiled.sql, &compiled.bindings).await
    }

    /// Count matching rows
    pub async fn count(&self) -> Result<i64> {
        let compiled = self.db.grammar().compile_count(&self.query);
        let rows = self.db.query(&compiled.sql, &compiled.bindings).await?;
        rows.first()
            .and_then(|row| row.get("aggregate"))
            .and_then(DatabaseValue::as_i64)
            .ok_or_else(|| DatabaseError::type_mismatch("integer aggregate", "no rows"))
    }
}

fn collect_values<I, K, V>(values: I) -> Vec<(String, DatabaseValue)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<DatabaseValue>,
{
    values
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
