//! Property-based tests for query compilation and value handling using proptest

use proptest::prelude::*;
use rowbound::core::grammar::{count_placeholders, numbered_placeholders};
use rowbound::core::{Grammar, PostgresGrammar, QueryDescriptor, RelationKey, SqliteGrammar};
use rowbound::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Eq(String, i64),
    OrGt(String, i64),
    In(String, Vec<i64>),
    NotIn(String, Vec<i64>),
    Null(String),
    Group(String, i64, String, String),
}

fn column() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,7}"
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (column(), any::<i64>()).prop_map(|(c, v)| Step::Eq(c, v)),
        (column(), any::<i64>()).prop_map(|(c, v)| Step::OrGt(c, v)),
        (column(), prop::collection::vec(any::<i64>(), 0..6)).prop_map(|(c, v)| Step::In(c, v)),
        (column(), prop::collection::vec(any::<i64>(), 0..6))
            .prop_map(|(c, v)| Step::NotIn(c, v)),
        column().prop_map(Step::Null),
        (column(), any::<i64>(), column(), "[a-z]{0,5}")
            .prop_map(|(a, v, b, s)| Step::Group(a, v, b, s)),
    ]
}

fn apply(query: QueryDescriptor, step: &Step) -> QueryDescriptor {
    match step {
        Step::Eq(c, v) => query.where_eq(c, *v),
        Step::OrGt(c, v) => query.or_filter(c, ">", *v).expect("known operator"),
        Step::In(c, v) => query.where_in(c, v.clone()),
        Step::NotIn(c, v) => query.where_not_in(c, v.clone()),
        Step::Null(c) => query.where_null(c),
        Step::Group(a, v, b, s) => {
            query.or_where_group(|g| g.where_le(a, *v).or_where_eq(b, s.as_str()))
        }
    }
}

fn descriptor() -> impl Strategy<Value = QueryDescriptor> {
    (
        prop::collection::vec(step(), 0..8),
        prop::option::of(1u64..100),
        prop::option::of(0u64..1000),
        any::<bool>(),
    )
        .prop_map(|(steps, limit, offset, ordered)| {
            let mut query = QueryDescriptor::new("items");
            for step in &steps {
                query = apply(query, step);
            }
            if ordered {
                query = query.order_by_desc("id");
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            if let Some(offset) = offset {
                query = query.offset(offset);
            }
            query
        })
}

// ============================================================================
// Grammar Properties
// ============================================================================

proptest! {
    /// Compiling the same descriptor twice yields identical SQL and bindings
    #[test]
    fn test_compilation_is_deterministic(query in descriptor()) {
        prop_assert_eq!(SqliteGrammar.compile_select(&query), SqliteGrammar.compile_select(&query));
        prop_assert_eq!(PostgresGrammar.compile_select(&query), PostgresGrammar.compile_select(&query));
        prop_assert_eq!(SqliteGrammar.compile_delete(&query), SqliteGrammar.compile_delete(&query));
    }

    /// Every binding has exactly one placeholder
    #[test]
    fn test_placeholder_count_matches_bindings(query in descriptor()) {
        let select = SqliteGrammar.compile_select(&query);
        prop_assert_eq!(count_placeholders(&select.sql), select.bindings.len());

        let count = SqliteGrammar.compile_count(&query);
        prop_assert_eq!(count_placeholders(&count.sql), count.bindings.len());
        prop_assert_eq!(count.bindings, select.bindings);
    }

    /// The Postgres grammar numbers exactly the positions SQLite marks with `?`
    #[test]
    fn test_dialects_agree_on_binding_order(query in descriptor()) {
        let sqlite = SqliteGrammar.compile_select(&query);
        let postgres = PostgresGrammar.compile_select(&query);
        // SQLite alone spells an offset-only window as LIMIT -1 OFFSET n
        let sqlite_sql = numbered_placeholders(&sqlite.sql).replace(" LIMIT -1 OFFSET", " OFFSET");
        prop_assert_eq!(sqlite_sql, postgres.sql);
        prop_assert_eq!(sqlite.bindings, postgres.bindings);
    }

    /// UPDATE bindings are the SET values followed by the WHERE values
    #[test]
    fn test_update_binding_order(query in descriptor(), name in ".*", age in any::<i64>()) {
        let values = vec![
            ("name".to_string(), DatabaseValue::from(name.clone())),
            ("age".to_string(), DatabaseValue::from(age)),
        ];
        let update = SqliteGrammar.compile_update(&query, &values);
        let select = SqliteGrammar.compile_select(&query);

        prop_assert_eq!(&update.bindings[..2], &[DatabaseValue::from(name), DatabaseValue::from(age)][..]);
        prop_assert_eq!(&update.bindings[2..], &select.bindings[..]);
    }

    /// IN expands to one placeholder per element; an empty list matches nothing
    #[test]
    fn test_in_expansion(values in prop::collection::vec(any::<i64>(), 0..20)) {
        let query = QueryDescriptor::new("items").where_in("id", values.clone());
        let compiled = SqliteGrammar.compile_select(&query);

        if values.is_empty() {
            prop_assert_eq!(compiled.sql, "SELECT * FROM items WHERE (0 = 1)");
        } else {
            prop_assert_eq!(count_placeholders(&compiled.sql), values.len());
        }
        let expected: Vec<DatabaseValue> = values.into_iter().map(DatabaseValue::from).collect();
        prop_assert_eq!(compiled.bindings, expected);
    }

    /// Pages are 1-based windows of `per_page` rows
    #[test]
    fn test_for_page_window(page in 1u64..10_000, per_page in 1u64..500) {
        let query = QueryDescriptor::new("items").for_page(page, per_page);
        prop_assert_eq!(query.limit, Some(per_page));
        prop_assert_eq!(query.offset, Some((page - 1) * per_page));
    }

    /// Page windows never overflow; they saturate at the largest offset
    #[test]
    fn test_for_page_saturates(page in any::<u64>(), per_page in any::<u64>()) {
        let query = QueryDescriptor::new("items").for_page(page, per_page);
        let expected = page.max(1).checked_sub(1).and_then(|p| p.checked_mul(per_page));
        prop_assert_eq!(query.offset, Some(expected.unwrap_or(u64::MAX)));
    }
}

// ============================================================================
// Value Properties
// ============================================================================

proptest! {
    /// Integer values roundtrip
    #[test]
    fn test_integer_roundtrip(value in any::<i64>()) {
        let db_val = DatabaseValue::from(value);
        prop_assert_eq!(db_val.as_i64(), Some(value));
        prop_assert!(!db_val.is_null());
        prop_assert_eq!(db_val.type_name(), "integer");
    }

    /// Text values roundtrip
    #[test]
    fn test_text_roundtrip(value in ".*") {
        let db_val = DatabaseValue::from(value.clone());
        prop_assert_eq!(db_val.as_str(), Some(value.as_str()));
        prop_assert_eq!(db_val.type_name(), "text");
    }

    /// Relation keys treat integral reals and integers as the same key
    #[test]
    fn test_relation_key_widths(value in -1_000_000i64..1_000_000) {
        prop_assert_eq!(
            RelationKey::from_value(&DatabaseValue::Integer(value)),
            RelationKey::from_value(&DatabaseValue::Real(value as f64))
        );
        let key = RelationKey::from_value(&DatabaseValue::from(value));
        prop_assert_eq!(key.map(|k| k.to_value()), Some(DatabaseValue::Integer(value)));
    }

    /// A text key spelling an integer matches the integer key
    #[test]
    fn test_relation_key_integer_text(value in any::<i64>()) {
        prop_assert_eq!(
            RelationKey::from_value(&DatabaseValue::from(value.to_string())),
            RelationKey::from_value(&DatabaseValue::Integer(value))
        );
    }

    /// Operator parsing ignores case and spacing
    #[test]
    fn test_operator_parse_case_insensitive(upper in any::<bool>(), spaces in 1usize..4) {
        let op = format!("not{}like", " ".repeat(spaces));
        let op = if upper { op.to_uppercase() } else { op };
        prop_assert!(QueryDescriptor::new("t").filter("name", &op, "%a%").is_ok());
    }
}

// ============================================================================
// Execution Properties
// ============================================================================

#[cfg(feature = "sqlite")]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Arbitrary IN lists (empty included) execute and return exactly the matching rows
    #[test]
    fn test_in_list_executes(ids in prop::collection::vec(0i64..20, 0..10)) {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let found = runtime.block_on(async {
            let db = SqliteDatabase::open(&ConnectionConfig::sqlite_memory()).await?;
            db.execute_batch(
                "CREATE TABLE items (id INTEGER PRIMARY KEY);
                 INSERT INTO items (id) VALUES (1), (3), (5), (7), (9);",
            )
            .await?;
            db.table("items").where_in("id", ids.clone()).count().await
        });

        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        let expected = unique.iter().filter(|id| *id % 2 == 1 && **id < 10).count() as i64;
        prop_assert_eq!(found.expect("query"), expected);
    }
}
