// tests/compiler_tests.rs

use formula_sql::error::{CompileError, SemanticErrorKind};
use formula_sql::intent::{AggregateFunction, CompilationContext, IntentKind, JoinDirection};
use formula_sql::{
    CompilationResult, CompilerOptions, DataType, RelationshipInfo, SchemaContext, compile,
    compile_with_options,
};

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
                .with_column("category", DataType::String)
                .with_relationship(
                    RelationshipInfo::new("country", "country", "country_id")
                        .with_column("code", DataType::String),
                ),
        )
        .with_inverse_relationship(
            RelationshipInfo::new("refunds", "refunds", "transaction_id")
                .with_column("amount", DataType::Number)
                .with_column("reason", DataType::String)
                .with_column("approved", DataType::Boolean)
                .with_column("refund_date", DataType::Date)
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

fn ok(formula: &str) -> CompilationResult {
    compile(formula, &schema()).unwrap_or_else(|e| panic!("{:?} failed: {}", formula, e))
}

fn semantic_error(formula: &str) -> SemanticErrorKind {
    match compile(formula, &schema()) {
        Err(CompileError::Semantic(e)) => e.kind,
        other => panic!("Expected semantic error for {:?}, got {:?}", formula, other),
    }
}

fn type_error(formula: &str) -> String {
    match semantic_error(formula) {
        SemanticErrorKind::TypeError(message) => message,
        other => panic!("Expected type error for {:?}, got {:?}", formula, other),
    }
}

// ============================================================================
// Literals and columns
// ============================================================================

#[test]
fn test_literal_types() {
    assert_eq!(ok("42").return_type, DataType::Number);
    assert_eq!(ok(r#""abc""#).return_type, DataType::String);
    assert_eq!(ok("TRUE").return_type, DataType::Boolean);
    assert_eq!(ok("NULL").return_type, DataType::Null);
    assert_eq!(ok(r#"DATE("2024-01-31")"#).return_type, DataType::Date);
}

#[test]
fn test_column_uses_schema_spelling() {
    let result = ok("REVENUE");
    assert_eq!(result.expression.kind, IntentKind::Column("revenue".to_string()));
    assert_eq!(result.expression.semantic_id, "column:revenue@main");
    assert_eq!(result.return_type, DataType::Number);
    assert!(result.joins.is_empty());
}

#[test]
fn test_binary_semantic_id() {
    let result = ok("10 + 5");
    assert_eq!(
        result.expression.semantic_id,
        "binary:+[number:10@main,number:5@main]@main"
    );
}

#[test]
fn test_unknown_column_lists_available() {
    let err = compile("profit * 2", &schema()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Unknown column 'profit'"));
    assert!(message.contains("Available columns:"));
    assert!(message.contains("revenue"));
    assert_eq!(err.position().offset, 0);
}

// ============================================================================
// Operator typing
// ============================================================================

#[test]
fn test_arithmetic_types() {
    assert_eq!(ok("revenue - cost").return_type, DataType::Number);
    assert_eq!(ok("revenue / 2").return_type, DataType::Number);
    assert_eq!(ok("-revenue").return_type, DataType::Number);
    assert_eq!(ok("revenue + NULL").return_type, DataType::Number);
}

#[test]
fn test_date_arithmetic() {
    assert_eq!(ok("created_date + 30").return_type, DataType::Date);
    assert_eq!(ok("created_date - 7").return_type, DataType::Date);
    assert_eq!(ok("due_date - created_date").return_type, DataType::Number);
    // Chained offsets stay dates
    assert_eq!(ok("created_date + 30 - 7").return_type, DataType::Date);
    assert_eq!(ok("NULL + created_date").return_type, DataType::Date);
}

#[test]
fn test_invalid_date_arithmetic() {
    assert!(type_error("created_date + due_date").contains("subtract"));
    type_error("30 + created_date");
    type_error("created_date * 2");
    type_error("-created_date");
}

#[test]
fn test_concat_requires_strings() {
    assert_eq!(ok(r#"status & "!""#).return_type, DataType::String);
    assert!(type_error(r#"status & revenue"#).contains("STRING()"));
    assert_eq!(ok("status & STRING(revenue)").return_type, DataType::String);
}

#[test]
fn test_comparisons() {
    assert_eq!(ok("revenue > cost").return_type, DataType::Boolean);
    assert_eq!(ok("created_date <= due_date").return_type, DataType::Boolean);
    assert_eq!(ok("status = NULL").return_type, DataType::Boolean);
    type_error(r#"revenue = "100""#);
}

#[test]
fn test_string_arithmetic_rejected() {
    type_error("status + 1");
    type_error("is_refund * 2");
}

// ============================================================================
// Relationships
// ============================================================================

#[test]
fn test_relationship_column() {
    let result = ok("merchant_rel.name");
    assert_eq!(result.return_type, DataType::String);
    assert_eq!(result.expression.semantic_id, "relationship:merchant.name@main");
    assert_eq!(result.joins.len(), 1);

    let join = result.joins.values().next().unwrap();
    assert_eq!(join.direction, JoinDirection::Direct);
    assert_eq!(join.source_table, "transactions");
    assert_eq!(join.target_table, "merchant");
    assert_eq!(join.join_column, "merchant_id");
    assert_eq!(join.chain, vec!["merchant".to_string()]);
    assert_eq!(
        join.semantic_id,
        "join:direct:merchant:transactions->merchant[merchant_id]@main"
    );
    assert_eq!(result.expression.join_deps, vec![join.semantic_id.clone()]);
}

#[test]
fn test_repeated_relationship_shares_join() {
    let result = ok("merchant_rel.name & \" / \" & MERCHANT_REL.category");
    assert_eq!(result.joins.len(), 1);
    assert_eq!(result.expression.join_deps.len(), 1);
}

#[test]
fn test_relationship_chain() {
    let result = ok("merchant_rel.country_rel.code");
    assert_eq!(result.joins.len(), 2);

    let chains: Vec<Vec<String>> = result.joins.values().map(|j| j.chain.clone()).collect();
    assert!(chains.contains(&vec!["merchant".to_string()]));
    assert!(chains.contains(&vec!["merchant".to_string(), "country".to_string()]));

    let nested = result
        .joins
        .values()
        .find(|j| j.chain.len() == 2)
        .unwrap();
    assert_eq!(nested.source_table, "merchant");
    assert_eq!(nested.target_table, "country");
    assert_eq!(nested.parent_chain(), Some(&["merchant".to_string()][..]));
}

#[test]
fn test_unknown_relationship() {
    match semantic_error("vendor_rel.name") {
        SemanticErrorKind::UnknownRelationship { name, available, .. } => {
            assert_eq!(name, "vendor_rel");
            assert_eq!(available, vec!["merchant_rel".to_string()]);
        }
        other => panic!("Expected unknown relationship, got {:?}", other),
    }
}

#[test]
fn test_unknown_field() {
    match semantic_error("merchant_rel.revenue") {
        SemanticErrorKind::UnknownField {
            field,
            relationship,
            table,
            available,
        } => {
            assert_eq!(field, "revenue");
            assert_eq!(relationship, "merchant");
            assert_eq!(table, "merchant");
            assert!(available.contains(&"name".to_string()));
        }
        other => panic!("Expected unknown field, got {:?}", other),
    }
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_standard_functions() {
    assert_eq!(ok("ROUND(revenue / 3, 2)").return_type, DataType::Number);
    assert_eq!(ok("ROUND(revenue)").return_type, DataType::Number);
    assert_eq!(ok("upper(status)").return_type, DataType::String);
    assert_eq!(ok("LEN(status)").return_type, DataType::Number);
    assert_eq!(ok(r#"CONTAINS(status, "paid")"#).return_type, DataType::Boolean);
    assert_eq!(ok("TODAY()").return_type, DataType::Date);
    assert_eq!(ok("YEAR(created_date)").return_type, DataType::Number);
    assert_eq!(ok("ISNULL(merchant_rel.name)").return_type, DataType::Boolean);
}

#[test]
fn test_function_semantic_id() {
    assert_eq!(
        ok("ABS(revenue)").expression.semantic_id,
        "function:ABS[column:revenue@main]@main"
    );
}

#[test]
fn test_arity_errors() {
    match semantic_error("ROUND()") {
        SemanticErrorKind::ArityError {
            function,
            expected,
            found,
        } => {
            assert_eq!(function, "ROUND");
            assert_eq!(expected, "1 to 2");
            assert_eq!(found, 0);
        }
        other => panic!("Expected arity error, got {:?}", other),
    }
    assert!(matches!(
        semantic_error("AND(is_refund)"),
        SemanticErrorKind::ArityError { .. }
    ));
    assert!(matches!(
        semantic_error("TODAY(1)"),
        SemanticErrorKind::ArityError { .. }
    ));
}

#[test]
fn test_argument_type_errors() {
    assert!(type_error("UPPER(revenue)").contains("UPPER"));
    type_error("YEAR(status)");
    type_error("NOT(revenue)");
    type_error("AND(is_refund, revenue)");
}

#[test]
fn test_unknown_function() {
    match semantic_error("SUMM(revenue)") {
        SemanticErrorKind::UnknownFunction { name, suggestions } => {
            assert_eq!(name, "SUMM");
            assert!(suggestions.contains(&"SUM_AGG".to_string()));
        }
        other => panic!("Expected unknown function, got {:?}", other),
    }
}

#[test]
fn test_if() {
    assert_eq!(
        ok(r#"IF(revenue > 100, "big", "small")"#).return_type,
        DataType::String
    );
    assert_eq!(ok("IF(is_refund, revenue)").return_type, DataType::Number);
    assert_eq!(ok("IF(is_refund, NULL, revenue)").return_type, DataType::Number);
    type_error(r#"IF(is_refund, revenue, "none")"#);
    type_error("IF(revenue, 1, 2)");
}

#[test]
fn test_and_or_variadic() {
    assert_eq!(
        ok("AND(is_refund, revenue > 0, status = \"paid\")").return_type,
        DataType::Boolean
    );
    assert_eq!(ok("OR(is_refund, revenue > 0)").return_type, DataType::Boolean);
}

#[test]
fn test_nullvalue() {
    assert_eq!(ok("NULLVALUE(merchant_rel.name, status)").return_type, DataType::String);
    assert_eq!(ok("NULLVALUE(revenue, 0)").return_type, DataType::Number);
    type_error("NULLVALUE(revenue, status)");
}

#[test]
fn test_datedif() {
    assert_eq!(
        ok(r#"DATEDIF(created_date, due_date, "Days")"#).return_type,
        DataType::Number
    );
    assert!(type_error(r#"DATEDIF(created_date, due_date, "weeks")"#).contains("weeks"));
    type_error("DATEDIF(created_date, due_date, status)");
    type_error(r#"DATEDIF(revenue, due_date, "days")"#);
}

// ============================================================================
// Aggregates
// ============================================================================

#[test]
fn test_sum_aggregate() {
    let result = ok("SUM_AGG(refunds, amount)");
    assert_eq!(result.return_type, DataType::Number);
    assert!(result.joins.is_empty());
    assert_eq!(result.aggregates.len(), 1);

    let aggregate = result.aggregates.values().next().unwrap();
    assert_eq!(aggregate.function, AggregateFunction::Sum);
    assert_eq!(aggregate.relation, "refunds");
    assert_eq!(aggregate.source_table, "transactions");
    assert_eq!(aggregate.links.len(), 1);
    assert_eq!(aggregate.links[0].table_name, "refunds");
    assert_eq!(aggregate.links[0].join_column, "transaction_id");
    assert_eq!(
        aggregate.inner_context,
        CompilationContext::Aggregate {
            source: "transactions".to_string(),
            target: "refunds".to_string(),
            join_column: "transaction_id".to_string(),
        }
    );
    assert_eq!(
        aggregate.semantic_id,
        "aggregate:SUM_AGG:refunds[column:amount@agg:transactions→refunds[transaction_id]]@main"
    );
    assert_eq!(
        result.expression.kind,
        IntentKind::Aggregate(aggregate.semantic_id.clone())
    );
}

#[test]
fn test_aggregate_inner_joins_stay_inside() {
    let result = ok(r#"STRING_AGG(refunds, reviewer_rel.name, ", ")"#);
    assert!(result.joins.is_empty());

    let aggregate = result.aggregates.values().next().unwrap();
    assert_eq!(aggregate.joins.len(), 1);
    let join = aggregate.joins.values().next().unwrap();
    assert_eq!(join.source_table, "refunds");
    assert_eq!(join.target_table, "users");
    assert_eq!(join.context, aggregate.inner_context);
    assert!(aggregate.delimiter.is_some());
}

#[test]
fn test_multi_level_aggregate() {
    let result = ok(r#"STRING_AGG_DISTINCT(refunds.notes, body, "; ")"#);
    let aggregate = result.aggregates.values().next().unwrap();
    assert_eq!(aggregate.relation, "refunds.notes");
    assert_eq!(aggregate.links.len(), 2);
    assert_eq!(aggregate.links[1].table_name, "refund_notes");
    assert_eq!(aggregate.links[1].join_column, "refund_id");
}

#[test]
fn test_repeated_aggregate_is_shared() {
    let result = ok("SUM_AGG(refunds, amount) / NULLVALUE(SUM_AGG(refunds, amount), 1)");
    assert_eq!(result.aggregates.len(), 1);

    let result = ok("SUM_AGG(refunds, amount) + COUNT_AGG(refunds, amount)");
    assert_eq!(result.aggregates.len(), 2);
}

#[test]
fn test_aggregate_return_types() {
    assert_eq!(ok("COUNT_AGG(refunds, reason)").return_type, DataType::Number);
    assert_eq!(ok("AVG_AGG(refunds, amount)").return_type, DataType::Number);
    assert_eq!(ok("MIN_AGG(refunds, refund_date)").return_type, DataType::Date);
    assert_eq!(ok("MAX_AGG(refunds, reason)").return_type, DataType::String);
    assert_eq!(ok("AND_AGG(refunds, approved)").return_type, DataType::Boolean);
    assert_eq!(ok("OR_AGG(refunds, amount > 10)").return_type, DataType::Boolean);
}

#[test]
fn test_aggregate_input_types() {
    type_error("SUM_AGG(refunds, reason)");
    type_error("AND_AGG(refunds, amount)");
    type_error(r#"STRING_AGG(refunds, amount, ",")"#);
    type_error("MIN_AGG(refunds, approved)");
    assert!(type_error("MAX_AGG(refunds, approved)").contains("MAX_AGG"));
}

#[test]
fn test_string_agg_needs_delimiter() {
    assert!(matches!(
        semantic_error("STRING_AGG(refunds, reason)"),
        SemanticErrorKind::ArityError { .. }
    ));
    assert!(type_error("STRING_AGG(refunds, reason, status)").contains("constant"));
    type_error("STRING_AGG(refunds, reason, 1)");
}

#[test]
fn test_nested_aggregate_rejected() {
    assert!(type_error("SUM_AGG(refunds, COUNT_AGG(notes, body))").contains("inside"));
}

#[test]
fn test_aggregate_columns_resolve_on_related_table() {
    // revenue lives on transactions, not refunds
    match semantic_error("SUM_AGG(refunds, revenue)") {
        SemanticErrorKind::UnknownColumn { table, .. } => assert_eq!(table, "refunds"),
        other => panic!("Expected unknown column, got {:?}", other),
    }
}

#[test]
fn test_aggregate_unknown_relationship() {
    match semantic_error("SUM_AGG(payments, amount)") {
        SemanticErrorKind::UnknownRelationship { name, available, .. } => {
            assert_eq!(name, "payments");
            assert_eq!(available, vec!["refunds".to_string()]);
        }
        other => panic!("Expected unknown relationship, got {:?}", other),
    }
}

#[test]
fn test_aggregate_first_argument_must_be_path() {
    type_error("SUM_AGG(1, amount)");
    type_error(r#"SUM_AGG("refunds", amount)"#);
}

#[test]
fn test_chain_depth_limit() {
    let options = CompilerOptions { max_chain_depth: 1 };
    match compile_with_options(r#"STRING_AGG(refunds.notes, body, ",")"#, &schema(), &options) {
        Err(CompileError::Semantic(e)) => assert_eq!(
            e.kind,
            SemanticErrorKind::ChainTooDeep {
                path: "refunds.notes".to_string(),
                depth: 2,
                max: 1,
            }
        ),
        other => panic!("Expected chain depth error, got {:?}", other),
    }
}

// ============================================================================
// Determinism and error stages
// ============================================================================

#[test]
fn test_compile_is_deterministic() {
    let formula = r#"IF(merchant_rel.country_rel.code = "US", SUM_AGG(refunds, amount), revenue)"#;
    assert_eq!(ok(formula), ok(formula));
}

#[test]
fn test_error_stages() {
    assert!(matches!(
        compile("\"open", &schema()),
        Err(CompileError::Lex(_))
    ));
    assert!(matches!(
        compile("1 +", &schema()),
        Err(CompileError::Parse(_))
    ));
    assert!(matches!(
        compile("nope", &schema()),
        Err(CompileError::Semantic(_))
    ));
}
