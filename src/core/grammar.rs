//! SQL grammars
//!
//! A [`Grammar`] turns a [`QueryDescriptor`] into one SQL string plus the
//! ordered binding list. Bindings are pushed in the textual order of their
//! placeholders, so the list can always be passed positionally. Compilation
//! is a pure function of the descriptor: compiling twice yields identical
//! output.

use super::query_builder::{Clause, Connective, Predicate, QueryDescriptor};
use super::value::DatabaseValue;

/// A compiled statement and its positional bindings
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Statement text with placeholders
    pub sql: String,
    /// Values in placeholder order
    pub bindings: Vec<DatabaseValue>,
}

/// Dialect-specific SQL compilation
pub trait Grammar: Send + Sync {
    /// Placeholder text for the `index`-th binding (1-based)
    fn placeholder(&self, index: usize) -> String;

    /// Clause appended to an INSERT so the statement yields the new key
    fn insert_returning(&self) -> Option<&'static str> {
        None
    }

    /// LIMIT value meaning "no limit", for dialects that reject a bare OFFSET
    fn unbounded_limit(&self) -> Option<&'static str> {
        None
    }

    /// Compile a SELECT
    fn compile_select(&self, query: &QueryDescriptor) -> CompiledQuery {
        let mut bindings = Vec::new();
        let columns = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query.columns.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, query.table);

        for join in &query.joins {
            sql.push_str(&format!(
                " {} {} ON {}",
                join.kind.as_sql(),
                join.table,
                join.on
            ));
        }

        self.push_wheres(&mut sql, &query.wheres, &mut bindings);

        if !query.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", query.group_by.join(", ")));
        }

        if !query.orders.is_empty() {
            let order_clauses: Vec<String> = query
                .orders
                .iter()
                .map(|(col, dir)| format!("{} {}", col, dir.as_sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order_clauses.join(", ")));
        }

        match (query.limit, query.offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(_)) => {
                if let Some(unbounded) = self.unbounded_limit() {
                    sql.push_str(&format!(" LIMIT {}", unbounded));
                }
            }
            (None, None) => {}
        }

        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        CompiledQuery { sql, bindings }
    }

    /// Compile `SELECT COUNT(*)`; ordering and the page window are ignored
    fn compile_count(&self, query: &QueryDescriptor) -> CompiledQuery {
        let mut bindings = Vec::new();
        let mut sql = format!("SELECT COUNT(*) AS aggregate FROM {}", query.table);
        for join in &query.joins {
            sql.push_str(&format!(
                " {} {} ON {}",
                join.kind.as_sql(),
                join.table,
                join.on
            ));
        }
        self.push_wheres(&mut sql, &query.wheres, &mut bindings);
        CompiledQuery { sql, bindings }
    }

    /// Compile an INSERT of one row
    fn compile_insert(&self, table: &str, values: &[(String, DatabaseValue)]) -> CompiledQuery {
        let mut bindings = Vec::with_capacity(values.len());
        let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders: Vec<String> = values
            .iter()
            .map(|(_, v)| self.bind(&mut bindings, v.clone()))
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );
        if let Some(returning) = self.insert_returning() {
            sql.push(' ');
            sql.push_str(returning);
        }
        CompiledQuery { sql, bindings }
    }

    /// Compile an UPDATE; SET bindings precede WHERE bindings
    fn compile_update(
        &self,
        query: &QueryDescriptor,
        values: &[(String, DatabaseValue)],
    ) -> CompiledQuery {
        let mut bindings = Vec::new();
        let set_clauses: Vec<String> = values
            .iter()
            .map(|(col, v)| format!("{} = {}", col, self.bind(&mut bindings, v.clone())))
            .collect();

        let mut sql = format!("UPDATE {} SET {}", query.table, set_clauses.join(", "));
        self.push_wheres(&mut sql, &query.wheres, &mut bindings);
        CompiledQuery { sql, bindings }
    }

    /// Compile a DELETE
    fn compile_delete(&self, query: &QueryDescriptor) -> CompiledQuery {
        let mut bindings = Vec::new();
        let mut sql = format!("DELETE FROM {}", query.table);
        self.push_wheres(&mut sql, &query.wheres, &mut bindings);
        CompiledQuery { sql, bindings }
    }

    /// Record a binding and return its placeholder
    fn bind(&self, bindings: &mut Vec<DatabaseValue>, value: DatabaseValue) -> String {
        bindings.push(value);
        self.placeholder(bindings.len())
    }

    /// Append ` WHERE ...` when any predicate groups exist
    fn push_wheres(&self, sql: &mut String, wheres: &[Clause], bindings: &mut Vec<DatabaseValue>) {
        if wheres.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        sql.push_str(&self.compile_clauses(wheres, bindings));
    }

    /// Join clauses by their connectives in declaration order, each parenthesised
    fn compile_clauses(&self, clauses: &[Clause], bindings: &mut Vec<DatabaseValue>) -> String {
        let mut out = String::new();
        for (i, clause) in clauses.iter().enumerate() {
            if i > 0 {
                out.push_str(match clause.connective {
                    Connective::And => " AND ",
                    Connective::Or => " OR ",
                });
            }
            out.push('(');
            out.push_str(&self.compile_predicate(&clause.predicate, bindings));
            out.push(')');
        }
        out
    }

    /// Compile a single predicate without the surrounding parentheses
    fn compile_predicate(&self, predicate: &Predicate, bindings: &mut Vec<DatabaseValue>) -> String {
        match predicate {
            Predicate::Compare {
                column,
                operator,
                value,
            } => format!(
                "{} {} {}",
                column,
                operator.as_sql(),
                self.bind(bindings, value.clone())
            ),
            // An empty list matches nothing (IN) or everything (NOT IN)
            Predicate::In {
                values, negated, ..
            } if values.is_empty() => {
                if *negated {
                    "1 = 1".to_string()
                } else {
                    "0 = 1".to_string()
                }
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| self.bind(bindings, v.clone()))
                    .collect();
                format!(
                    "{} {} ({})",
                    column,
                    if *negated { "NOT IN" } else { "IN" },
                    placeholders.join(", ")
                )
            }
            Predicate::Null { column, negated } => {
                if *negated {
                    format!("{} IS NOT NULL", column)
                } else {
                    format!("{} IS NULL", column)
                }
            }
            Predicate::Group(clauses) => self.compile_clauses(clauses, bindings),
        }
    }
}

/// SQLite grammar: `?` placeholders, key read back via `last_insert_rowid`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

impl Grammar for SqliteGrammar {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    // SQLite only accepts OFFSET after a LIMIT
    fn unbounded_limit(&self) -> Option<&'static str> {
        Some("-1")
    }
}

/// PostgreSQL grammar: numbered `$n` placeholders, `RETURNING id` on insert
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl Grammar for PostgresGrammar {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn insert_returning(&self) -> Option<&'static str> {
        Some("RETURNING id")
    }
}

/// Count `?` placeholders outside quoted literals and identifiers
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '?' => count += 1,
                _ => {}
            },
        }
    }
    count
}

/// Rewrite `?` placeholders to PostgreSQL `$n`, skipping quoted text
pub fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                out.push(c);
            }
            Some(_) => out.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    index += 1;
                    out.push_str(&format!("${}", index));
                }
                _ => out.push(c),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query_builder::{Operator, QueryDescriptor};

    #[test]
    fn test_select_basic() {
        let compiled = SqliteGrammar.compile_select(&QueryDescriptor::new("users"));
        assert_eq!(compiled.sql, "SELECT * FROM users");
        assert!(compiled.bindings.is_empty());
    }

    #[test]
    fn test_groups_are_parenthesised_in_declaration_order() {
        let query = QueryDescriptor::new("users")
            .where_eq("status", "active")
            .or_where_eq("role", "admin")
            .where_gt("age", 18);

        let compiled = SqliteGrammar.compile_select(&query);
        assert_eq!(
            compiled.sql,
            "SELECT * FROM users WHERE (status = ?) OR (role = ?) AND (age > ?)"
        );
        assert_eq!(
            compiled.bindings,
            vec!["active".into(), "admin".into(), DatabaseValue::Integer(18)]
        );
    }

    #[test]
    fn test_nested_group() {
        let query = QueryDescriptor::new("posts")
            .where_eq("published", true)
            .where_group(|g| g.where_eq("author_id", 1).or_where_eq("author_id", 2));

        let compiled = SqliteGrammar.compile_select(&query);
        assert_eq!(
            compiled.sql,
            "SELECT * FROM posts WHERE (published = ?) AND ((author_id = ?) OR (author_id = ?))"
        );
        assert_eq!(compiled.bindings.len(), 3);
    }

    #[test]
    fn test_in_expands_one_placeholder_per_element() {
        let query = QueryDescriptor::new("users").where_in("id", vec![3, 1, 2]);
        let compiled = SqliteGrammar.compile_select(&query);
        assert_eq!(compiled.sql, "SELECT * FROM users WHERE (id IN (?, ?, ?))");
        assert_eq!(
            compiled.bindings,
            vec![
                DatabaseValue::Integer(3),
                DatabaseValue::Integer(1),
                DatabaseValue::Integer(2)
            ]
        );
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let query = QueryDescriptor::new("users").where_in("id", Vec::<i64>::new());
        let compiled = SqliteGrammar.compile_select(&query);
        assert_eq!(compiled.sql, "SELECT * FROM users WHERE (0 = 1)");
        assert!(compiled.bindings.is_empty());

        let query = QueryDescriptor::new("users").where_not_in("id", Vec::<i64>::new());
        let compiled = SqliteGrammar.compile_select(&query);
        assert_eq!(compiled.sql, "SELECT * FROM users WHERE (1 = 1)");
    }

    #[test]
    fn test_postgres_numbers_placeholders_in_text_order() {
        let query = QueryDescriptor::new("users")
            .where_in("id", vec![1, 2])
            .where_eq("name", "x");
        let compiled = PostgresGrammar.compile_update(&query, &[("active".into(), false.into())]);
        assert_eq!(
            compiled.sql,
            "UPDATE users SET active = $1 WHERE (id IN ($2, $3)) AND (name = $4)"
        );
        assert_eq!(compiled.bindings[0], DatabaseValue::Bool(false));
        assert_eq!(compiled.bindings[3], DatabaseValue::Text("x".into()));
    }

    #[test]
    fn test_insert() {
        let values = vec![
            ("name".to_string(), DatabaseValue::from("Alice")),
            ("age".to_string(), DatabaseValue::from(30)),
        ];
        let compiled = SqliteGrammar.compile_insert("users", &values);
        assert_eq!(compiled.sql, "INSERT INTO users (name, age) VALUES (?, ?)");

        let compiled = PostgresGrammar.compile_insert("users", &values);
        assert_eq!(
            compiled.sql,
            "INSERT INTO users (name, age) VALUES ($1, $2) RETURNING id"
        );
    }

    #[test]
    fn test_delete_and_count() {
        let query = QueryDescriptor::new("sessions")
            .where_lt("expires_at", 100)
            .order_by_desc("id")
            .limit(5);
        assert_eq!(
            SqliteGrammar.compile_delete(&query).sql,
            "DELETE FROM sessions WHERE (expires_at < ?)"
        );
        assert_eq!(
            SqliteGrammar.compile_count(&query).sql,
            "SELECT COUNT(*) AS aggregate FROM sessions WHERE (expires_at < ?)"
        );
    }

    #[test]
    fn test_select_complex() {
        let query = QueryDescriptor::new("users")
            .select(&["users.id", "users.name", "orders.total"])
            .left_join("orders", "users.id = orders.user_id")
            .where_not_null("users.email")
            .order_by_asc("users.name")
            .limit(100)
            .offset(20);

        assert_eq!(
            SqliteGrammar.compile_select(&query).sql,
            "SELECT users.id, users.name, orders.total FROM users \
             LEFT JOIN orders ON users.id = orders.user_id \
             WHERE (users.email IS NOT NULL) ORDER BY users.name ASC LIMIT 100 OFFSET 20"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let query = QueryDescriptor::new("users").order_by_asc("id").offset(10);

        assert_eq!(
            SqliteGrammar.compile_select(&query).sql,
            "SELECT * FROM users ORDER BY id ASC LIMIT -1 OFFSET 10"
        );
        assert_eq!(
            PostgresGrammar.compile_select(&query).sql,
            "SELECT * FROM users ORDER BY id ASC OFFSET 10"
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let query = QueryDescriptor::new("users")
            .filter("age", ">=", 21)
            .and_then(|q| q.filter("name", "like", "A%"))
            .expect("operators are valid")
            .where_in("id", vec![5, 6]);
        assert_eq!(query.wheres[1].predicate.operator(), Some(Operator::Like));

        let first = SqliteGrammar.compile_select(&query);
        let second = SqliteGrammar.compile_select(&query);
        assert_eq!(first, second);
    }

    #[test]
    fn test_placeholder_helpers() {
        assert_eq!(count_placeholders("SELECT * FROM t WHERE a = ? AND b = '?'"), 1);
        assert_eq!(
            numbered_placeholders("UPDATE t SET a = ?, b = 'x?' WHERE c = ?"),
            "UPDATE t SET a = $1, b = 'x?' WHERE c = $2"
        );
    }
}
