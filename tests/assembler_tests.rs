// tests/assembler_tests.rs

use std::collections::BTreeMap;

use formula_sql::intent::{CompilationContext, ExpressionIntent, IntentKind};
use formula_sql::{
    AssembledQuery, AssemblyError, CompilationResult, DataType, RelationshipInfo, SchemaContext,
    assemble, compile,
};
use indexmap::IndexMap;

fn schema() -> SchemaContext {
    SchemaContext::new("transactions")
        .with_column("revenue", DataType::Number)
        .with_column("cost", DataType::Number)
        .with_column("status", DataType::String)
        .with_column("created_date", DataType::Date)
        .with_column("due_date", DataType::Date)
        .with_column("is_refund", DataType::Boolean)
        .with_relationship(
            RelationshipInfo::new("merchant", "merchant", "merchant_id")
                .with_column("name", DataType::String)
                .with_relationship(
                    RelationshipInfo::new("country", "country", "country_id")
                        .with_column("code", DataType::String),
                ),
        )
        .with_relationship(
            RelationshipInfo::new("parent_merchant", "merchant", "parent_merchant_id")
                .with_column("name", DataType::String),
        )
        .with_inverse_relationship(
            RelationshipInfo::new("refunds", "refunds", "transaction_id")
                .with_column("amount", DataType::Number)
                .with_column("reason", DataType::String)
                .with_column("approved", DataType::Boolean)
                .with_relationship(
                    RelationshipInfo::new("reviewer", "users", "reviewer_id")
                        .with_column("name", DataType::String),
                )
                .with_inverse_relationship(
                    RelationshipInfo::new("notes", "refund_notes", "refund_id")
                        .with_column("body", DataType::String),
                ),
        )
}

fn build(fields: &[(&str, &str)]) -> AssembledQuery {
    let schema = schema();
    let mut results = IndexMap::new();
    for (name, formula) in fields {
        let result = compile(formula, &schema)
            .unwrap_or_else(|e| panic!("{:?} failed to compile: {}", formula, e));
        results.insert(name.to_string(), result);
    }
    assemble(&results, "transactions").unwrap()
}

fn select_of(fields: &[(&str, &str)]) -> String {
    build(fields).select_expressions.remove(0)
}

// ============================================================================
// Query shape
// ============================================================================

#[test]
fn test_single_column_query() {
    let query = build(&[("revenue", "revenue")]);
    assert_eq!(
        query.query,
        "SELECT\n  \"s\".\"revenue\" AS \"revenue\"\nFROM transactions \"s\""
    );
    assert_eq!(query.from_clause, "FROM transactions \"s\"");
    assert_eq!(query.field_aliases["revenue"], "\"revenue\"");
}

#[test]
fn test_fields_keep_input_order() {
    let query = build(&[("b", "cost"), ("a", "revenue"), ("c", "status")]);
    let names: Vec<&String> = query.field_aliases.keys().collect();
    assert_eq!(names, vec!["b", "a", "c"]);
    assert!(query.select_expressions[0].ends_with("AS \"b\""));
    assert!(query.select_expressions[2].ends_with("AS \"c\""));
}

#[test]
fn test_field_names_are_quoted() {
    let query = build(&[("Net \"Margin\"", "revenue - cost")]);
    assert_eq!(
        query.select_expressions[0],
        "(\"s\".\"revenue\" - \"s\".\"cost\") AS \"Net \"\"Margin\"\"\""
    );
}

#[test]
fn test_empty_batch() {
    assert_eq!(
        assemble(&IndexMap::new(), "transactions"),
        Err(AssemblyError::NoFields)
    );
}

// ============================================================================
// Literals and operators
// ============================================================================

#[test]
fn test_parenthesized_arithmetic() {
    assert_eq!(select_of(&[("t", "10 + 5")]), "(10 + 5) AS \"t\"");
    assert_eq!(select_of(&[("t", "2.5 * (-revenue)")]), "(2.5 * (-\"s\".\"revenue\")) AS \"t\"");
}

#[test]
fn test_literals() {
    assert_eq!(select_of(&[("t", r#""it's""#)]), "'it''s' AS \"t\"");
    assert_eq!(select_of(&[("t", "TRUE")]), "TRUE AS \"t\"");
    assert_eq!(select_of(&[("t", "NULL")]), "NULL AS \"t\"");
    assert_eq!(
        select_of(&[("t", r#"DATE("2024-03-01")"#)]),
        "DATE '2024-03-01' AS \"t\""
    );
}

#[test]
fn test_division_guards_zero() {
    assert_eq!(
        select_of(&[("t", "revenue / cost")]),
        "(\"s\".\"revenue\" / NULLIF(\"s\".\"cost\", 0)) AS \"t\""
    );
}

#[test]
fn test_concat() {
    assert_eq!(
        select_of(&[("t", r#"status & "!""#)]),
        "(\"s\".\"status\" || '!') AS \"t\""
    );
}

#[test]
fn test_comparisons() {
    assert_eq!(
        select_of(&[("t", "revenue <> cost")]),
        "(\"s\".\"revenue\" <> \"s\".\"cost\") AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "status = NULL")]),
        "(\"s\".\"status\" IS NULL) AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "NULL != status")]),
        "(\"s\".\"status\" IS NOT NULL) AS \"t\""
    );
}

#[test]
fn test_date_arithmetic() {
    assert_eq!(
        select_of(&[("t", "created_date + 30")]),
        "(\"s\".\"created_date\" + 30 * INTERVAL '1 day')::date AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "created_date + 30 - 7")]),
        "((\"s\".\"created_date\" + 30 * INTERVAL '1 day')::date - 7 * INTERVAL '1 day')::date AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "due_date - created_date")]),
        "(\"s\".\"due_date\"::date - \"s\".\"created_date\"::date) AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "NULL + created_date")]),
        "(\"s\".\"created_date\" + NULL * INTERVAL '1 day')::date AS \"t\""
    );
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_if_renders_case() {
    assert_eq!(
        select_of(&[("t", r#"IF(revenue > 100, "big", "small")"#)]),
        "CASE WHEN (\"s\".\"revenue\" > 100) THEN 'big' ELSE 'small' END AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "IF(is_refund, revenue)")]),
        "CASE WHEN \"s\".\"is_refund\" THEN \"s\".\"revenue\" ELSE NULL END AS \"t\""
    );
}

#[test]
fn test_logical_functions() {
    assert_eq!(
        select_of(&[("t", "AND(is_refund, revenue > 0, NOT(status = NULL))")]),
        "(\"s\".\"is_refund\" AND (\"s\".\"revenue\" > 0) AND (NOT (\"s\".\"status\" IS NULL))) AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "OR(is_refund, ISNULL(cost))")]),
        "(\"s\".\"is_refund\" OR (\"s\".\"cost\" IS NULL)) AS \"t\""
    );
}

#[test]
fn test_math_and_text_functions() {
    assert_eq!(
        select_of(&[("t", "ROUND(revenue, 2)")]),
        "ROUND((\"s\".\"revenue\")::numeric, 2) AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "ROUND(revenue)")]),
        "ROUND((\"s\".\"revenue\")::numeric, 0) AS \"t\""
    );
    assert_eq!(select_of(&[("t", "CEILING(cost)")]), "CEIL(\"s\".\"cost\") AS \"t\"");
    assert_eq!(select_of(&[("t", "POWER(cost, 2)")]), "POWER(\"s\".\"cost\", 2) AS \"t\"");
    assert_eq!(select_of(&[("t", "LEN(status)")]), "LENGTH(\"s\".\"status\") AS \"t\"");
    assert_eq!(
        select_of(&[("t", r#"CONTAINS(status, "paid")"#)]),
        "(STRPOS(\"s\".\"status\", 'paid') > 0) AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "STRING(revenue)")]),
        "CAST(\"s\".\"revenue\" AS TEXT) AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", "NULLVALUE(status, \"n/a\")")]),
        "COALESCE(\"s\".\"status\", 'n/a') AS \"t\""
    );
}

#[test]
fn test_date_functions() {
    assert_eq!(select_of(&[("t", "TODAY()")]), "CURRENT_DATE AS \"t\"");
    assert_eq!(
        select_of(&[("t", "YEAR(created_date)")]),
        "EXTRACT(YEAR FROM \"s\".\"created_date\") AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", r#"DATEDIF(created_date, due_date, "days")"#)]),
        "(\"s\".\"due_date\"::date - \"s\".\"created_date\"::date) AS \"t\""
    );
    assert_eq!(
        select_of(&[("t", r#"DATEDIF(created_date, due_date, "years")"#)]),
        "EXTRACT(YEAR FROM AGE(\"s\".\"due_date\", \"s\".\"created_date\")) AS \"t\""
    );
    let months = select_of(&[("t", r#"DATEDIF(created_date, due_date, "MONTHS")"#)]);
    assert!(months.contains("* 12 + EXTRACT(MONTH FROM AGE("));
}

#[test]
fn test_unknown_function_fails_assembly() {
    let expression = ExpressionIntent {
        kind: IntentKind::Function {
            name: "VLOOKUP".to_string(),
            args: vec![],
        },
        semantic_id: "function:VLOOKUP@main".to_string(),
        join_deps: vec![],
        return_type: DataType::Number,
        context: CompilationContext::Main,
    };
    let mut results = IndexMap::new();
    results.insert(
        "t".to_string(),
        CompilationResult {
            expression,
            joins: BTreeMap::new(),
            aggregates: BTreeMap::new(),
            return_type: DataType::Number,
        },
    );
    assert_eq!(
        assemble(&results, "transactions"),
        Err(AssemblyError::UnknownFunction("VLOOKUP".to_string()))
    );
}

// ============================================================================
// Joins
// ============================================================================

#[test]
fn test_relationship_join() {
    let query = build(&[("merchant", "merchant_rel.name")]);
    assert_eq!(query.select_expressions[0], "\"merchant\".\"name\" AS \"merchant\"");
    assert_eq!(
        query.from_clause,
        "FROM transactions \"s\"\nLEFT JOIN merchant \"merchant\" ON \"s\".\"merchant_id\" = \"merchant\".\"id\""
    );
}

#[test]
fn test_join_shared_between_fields() {
    let query = build(&[
        ("name", "merchant_rel.name"),
        ("shout", "UPPER(merchant_rel.name)"),
    ]);
    assert_eq!(query.query.matches("LEFT JOIN merchant").count(), 1);
}

#[test]
fn test_chained_joins() {
    let query = build(&[("country", "merchant_rel.country_rel.code")]);
    assert_eq!(
        query.select_expressions[0],
        "\"merchant_country\".\"code\" AS \"country\""
    );
    let lines: Vec<&str> = query.from_clause.lines().collect();
    assert_eq!(
        lines,
        vec![
            "FROM transactions \"s\"",
            "LEFT JOIN merchant \"merchant\" ON \"s\".\"merchant_id\" = \"merchant\".\"id\"",
            "LEFT JOIN country \"merchant_country\" ON \"merchant\".\"country_id\" = \"merchant_country\".\"id\"",
        ]
    );
}

#[test]
fn test_same_table_twice_gets_distinct_aliases() {
    let query = build(&[
        ("merchant", "merchant_rel.name"),
        ("parent", "parent_merchant_rel.name"),
    ]);
    assert_eq!(query.select_expressions[0], "\"merchant\".\"name\" AS \"merchant\"");
    assert_eq!(query.select_expressions[1], "\"merchant_2\".\"name\" AS \"parent\"");
    assert!(query.from_clause.contains(
        "LEFT JOIN merchant \"merchant_2\" ON \"s\".\"parent_merchant_id\" = \"merchant_2\".\"id\""
    ));
}

#[test]
fn test_base_table_mismatch() {
    let schema = schema();
    let mut results = IndexMap::new();
    results.insert("m".to_string(), compile("merchant_rel.name", &schema).unwrap());
    assert_eq!(
        assemble(&results, "orders"),
        Err(AssemblyError::BaseTableMismatch {
            expected: "orders".to_string(),
            found: "transactions".to_string(),
        })
    );
}

// ============================================================================
// Aggregates
// ============================================================================

#[test]
fn test_aggregates_share_subquery() {
    let query = build(&[
        ("refund_total", "SUM_AGG(refunds, amount)"),
        ("refund_count", "COUNT_AGG(refunds, reason)"),
    ]);

    assert_eq!(query.query.matches("LEFT JOIN (").count(), 1);
    assert_eq!(
        query.select_expressions,
        vec![
            "COALESCE(\"agg_1\".\"sum_agg_2\", 0) AS \"refund_total\"",
            "COALESCE(\"agg_1\".\"count_agg_1\", 0) AS \"refund_count\"",
        ]
    );
    assert_eq!(
        query.from_clause,
        [
            "FROM transactions \"s\"",
            "LEFT JOIN (",
            "    SELECT \"t1\".\"transaction_id\" AS \"key\", COUNT(\"t1\".\"reason\") AS \"count_agg_1\", SUM(\"t1\".\"amount\") AS \"sum_agg_2\"",
            "    FROM refunds \"t1\"",
            "    GROUP BY \"t1\".\"transaction_id\"",
            ") \"agg_1\" ON \"agg_1\".\"key\" = \"s\".\"id\"",
        ]
        .join("\n")
    );
}

#[test]
fn test_empty_aggregate_defaults() {
    let query = build(&[
        ("reasons", r#"STRING_AGG(refunds, reason, ", ")"#),
        ("all_ok", "AND_AGG(refunds, approved)"),
        ("any_ok", "OR_AGG(refunds, approved)"),
        ("avg", "AVG_AGG(refunds, amount)"),
    ]);
    assert!(query.select_expressions[0].starts_with("COALESCE(\"agg_1\".\"string_agg_"));
    assert!(query.select_expressions[0].contains(", '')"));
    assert!(query.select_expressions[1].ends_with(", TRUE) AS \"all_ok\""));
    assert!(query.select_expressions[2].ends_with(", FALSE) AS \"any_ok\""));
    assert!(query.select_expressions[3].starts_with("\"agg_1\".\"avg_agg_"));
    assert!(query.from_clause.contains("STRING_AGG(\"t1\".\"reason\", ', ')"));
    assert!(query.from_clause.contains("BOOL_AND(\"t1\".\"approved\")"));
    assert!(query.from_clause.contains("BOOL_OR(\"t1\".\"approved\")"));
}

#[test]
fn test_aggregate_with_inner_join() {
    let query = build(&[("reviewers", r#"STRING_AGG(refunds, reviewer_rel.name, ", ")"#)]);
    assert!(query.from_clause.contains(
        "    LEFT JOIN users \"users\" ON \"t1\".\"reviewer_id\" = \"users\".\"id\""
    ));
    assert!(query.from_clause.contains("STRING_AGG(\"users\".\"name\", ', ')"));
    // Inner joins never leak into the outer query
    assert!(!query.from_clause.contains("\nLEFT JOIN users"));
}

#[test]
fn test_multi_level_aggregate() {
    let query = build(&[("notes", r#"STRING_AGG_DISTINCT(refunds.notes, body, "; ")"#)]);
    assert!(query.from_clause.contains("    FROM refunds \"t1\""));
    assert!(query.from_clause.contains(
        "    JOIN refund_notes \"t2\" ON \"t2\".\"refund_id\" = \"t1\".\"id\""
    ));
    assert!(query.from_clause.contains("STRING_AGG(DISTINCT \"t2\".\"body\", '; ')"));
    assert!(query.from_clause.contains("GROUP BY \"t1\".\"transaction_id\""));
}

#[test]
fn test_aggregates_over_different_paths() {
    let query = build(&[
        ("notes", r#"STRING_AGG(refunds.notes, body, ",")"#),
        ("total", "SUM_AGG(refunds, amount)"),
    ]);
    assert_eq!(query.query.matches("LEFT JOIN (").count(), 2);
    // Groups are numbered by relationship path
    assert_eq!(
        query.select_expressions[1],
        "COALESCE(\"agg_1\".\"sum_agg_1\", 0) AS \"total\""
    );
    assert!(query.select_expressions[0].contains("\"agg_2\""));
}

#[test]
fn test_aggregate_in_expression_with_join() {
    let query = build(&[(
        "label",
        r#"merchant_rel.name & ": " & STRING(SUM_AGG(refunds, amount))"#,
    )]);
    assert!(query.from_clause.contains("LEFT JOIN merchant \"merchant\""));
    assert!(query.from_clause.contains(") \"agg_1\" ON"));
    assert_eq!(
        query.select_expressions[0],
        "((\"merchant\".\"name\" || ': ') || CAST(COALESCE(\"agg_1\".\"sum_agg_1\", 0) AS TEXT)) AS \"label\""
    );
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_assembly_is_deterministic() {
    let fields = [
        ("a", "merchant_rel.country_rel.code"),
        ("b", "SUM_AGG(refunds, amount) + COUNT_AGG(refunds, reason)"),
        ("c", "parent_merchant_rel.name"),
    ];
    assert_eq!(build(&fields), build(&fields));
}
