//! Renders expression intents as PostgreSQL expressions.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use super::AssemblyError;
use crate::{
    ast::{BinOp, UnaryOp},
    intent::{AggregateFunction, ExpressionIntent, IntentKind},
    types::DataType,
};

static PLAIN_TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("table name pattern is valid")
});

/// Where an aggregate's value can be read in the outer query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AggregateColumn {
    pub group_alias: String,
    pub column: String,
    pub function: AggregateFunction,
}

/// Prints intents of one query level.
pub(crate) struct SqlPrinter<'a> {
    /// Alias of the table unqualified columns belong to
    pub column_alias: &'a str,
    /// Join semantic id -> table alias
    pub joins: &'a BTreeMap<String, String>,
    /// Aggregate semantic id -> output column
    pub aggregates: &'a BTreeMap<String, AggregateColumn>,
}

impl SqlPrinter<'_> {
    pub fn print(&self, intent: &ExpressionIntent) -> Result<String, AssemblyError> {
        match &intent.kind {
            IntentKind::Number(n) => Ok(number_literal(*n)),
            IntentKind::String(s) => Ok(string_literal(s)),
            IntentKind::Boolean(true) => Ok("TRUE".to_string()),
            IntentKind::Boolean(false) => Ok("FALSE".to_string()),
            IntentKind::Null => Ok("NULL".to_string()),
            IntentKind::Date(d) => Ok(format!("DATE {}", string_literal(d))),
            IntentKind::Column(column) => Ok(qualified(self.column_alias, column)),
            IntentKind::RelationshipColumn { join, column } => {
                let alias = self
                    .joins
                    .get(join)
                    .ok_or_else(|| AssemblyError::MissingJoinAlias(join.clone()))?;
                Ok(qualified(alias, column))
            }
            IntentKind::Unary {
                op: UnaryOp::Negate,
                operand,
            } => Ok(format!("(-{})", self.print(operand)?)),
            IntentKind::Binary { op, left, right } => self.print_binary(*op, left, right),
            IntentKind::Function { name, args } => self.print_function(name, args),
            IntentKind::Aggregate(id) => {
                let column = self
                    .aggregates
                    .get(id)
                    .ok_or_else(|| AssemblyError::MissingAggregate(id.clone()))?;
                let value = qualified(&column.group_alias, &column.column);
                Ok(match empty_value(column.function) {
                    Some(fallback) => format!("COALESCE({}, {})", value, fallback),
                    None => value,
                })
            }
        }
    }

    fn print_binary(
        &self,
        op: BinOp,
        left: &ExpressionIntent,
        right: &ExpressionIntent,
    ) -> Result<String, AssemblyError> {
        let l = self.print(left)?;
        let r = self.print(right)?;

        match op {
            BinOp::Add | BinOp::Subtract if left.return_type == DataType::Date => {
                if right.return_type == DataType::Date {
                    Ok(format!("({}::date - {}::date)", l, r))
                } else {
                    Ok(format!("({} {} {} * INTERVAL '1 day')::date", l, op, r))
                }
            }
            BinOp::Add if right.return_type == DataType::Date => {
                Ok(format!("({} + {} * INTERVAL '1 day')::date", r, l))
            }
            BinOp::Divide => Ok(format!("({} / NULLIF({}, 0))", l, r)),
            BinOp::Concat => Ok(format!("({} || {})", l, r)),
            BinOp::Equal | BinOp::NotEqual if is_null_literal(left) || is_null_literal(right) => {
                let operand = if is_null_literal(right) { l } else { r };
                let test = if op == BinOp::Equal { "IS NULL" } else { "IS NOT NULL" };
                Ok(format!("({} {})", operand, test))
            }
            BinOp::NotEqual => Ok(format!("({} <> {})", l, r)),
            _ => Ok(format!("({} {} {})", l, op.symbol(), r)),
        }
    }

    fn print_function(
        &self,
        name: &str,
        args: &[ExpressionIntent],
    ) -> Result<String, AssemblyError> {
        let printed = args
            .iter()
            .map(|arg| self.print(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let arg = |i: usize| printed.get(i).map(String::as_str).unwrap_or("NULL");

        let sql = match name {
            "IF" => format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                arg(0),
                arg(1),
                arg(2)
            ),
            "AND" => format!("({})", printed.join(" AND ")),
            "OR" => format!("({})", printed.join(" OR ")),
            "NOT" => format!("(NOT {})", arg(0)),
            "ISNULL" => format!("({} IS NULL)", arg(0)),
            "NULLVALUE" => format!("COALESCE({}, {})", arg(0), arg(1)),
            "ABS" | "FLOOR" | "SQRT" | "POWER" | "UPPER" | "LOWER" | "TRIM" | "LEFT"
            | "RIGHT" => format!("{}({})", name, printed.join(", ")),
            "CEILING" => format!("CEIL({})", arg(0)),
            "ROUND" => format!(
                "ROUND(({})::numeric, {})",
                arg(0),
                printed.get(1).map(String::as_str).unwrap_or("0")
            ),
            "LEN" => format!("LENGTH({})", arg(0)),
            "CONTAINS" => format!("(STRPOS({}, {}) > 0)", arg(0), arg(1)),
            "STRING" => format!("CAST({} AS TEXT)", arg(0)),
            "TODAY" => "CURRENT_DATE".to_string(),
            "YEAR" | "MONTH" | "DAY" => format!("EXTRACT({} FROM {})", name, arg(0)),
            "DATEDIF" => {
                let unit = match args.get(2).map(|a| &a.kind) {
                    Some(IntentKind::String(unit)) => unit.as_str(),
                    _ => "days",
                };
                let (start, end) = (arg(0), arg(1));
                match unit {
                    "months" => format!(
                        "(EXTRACT(YEAR FROM AGE({end}, {start})) * 12 + EXTRACT(MONTH FROM AGE({end}, {start})))"
                    ),
                    "years" => format!("EXTRACT(YEAR FROM AGE({end}, {start}))"),
                    _ => format!("({end}::date - {start}::date)"),
                }
            }
            _ => return Err(AssemblyError::UnknownFunction(name.to_string())),
        };
        Ok(sql)
    }
}

/// SQL aggregate call evaluated inside the subquery.
pub(crate) fn aggregate_call(
    function: AggregateFunction,
    value: &str,
    delimiter: Option<&str>,
) -> String {
    let delimiter = delimiter.unwrap_or("','");
    match function {
        AggregateFunction::StringAgg => format!("STRING_AGG({}, {})", value, delimiter),
        AggregateFunction::StringAggDistinct => {
            format!("STRING_AGG(DISTINCT {}, {})", value, delimiter)
        }
        AggregateFunction::Sum => format!("SUM({})", value),
        AggregateFunction::Count => format!("COUNT({})", value),
        AggregateFunction::Avg => format!("AVG({})", value),
        AggregateFunction::Min => format!("MIN({})", value),
        AggregateFunction::Max => format!("MAX({})", value),
        AggregateFunction::And => format!("BOOL_AND({})", value),
        AggregateFunction::Or => format!("BOOL_OR({})", value),
    }
}

/// Value an aggregate takes for a row with no related rows, if not NULL.
fn empty_value(function: AggregateFunction) -> Option<&'static str> {
    match function {
        AggregateFunction::Sum | AggregateFunction::Count => Some("0"),
        AggregateFunction::StringAgg | AggregateFunction::StringAggDistinct => Some("''"),
        AggregateFunction::And => Some("TRUE"),
        AggregateFunction::Or => Some("FALSE"),
        AggregateFunction::Avg | AggregateFunction::Min | AggregateFunction::Max => None,
    }
}

fn is_null_literal(intent: &ExpressionIntent) -> bool {
    matches!(intent.kind, IntentKind::Null)
}

/// Shortest decimal spelling of a numeric literal.
pub(crate) fn number_literal(n: f64) -> String {
    match Decimal::from_f64(n) {
        Some(d) => d.normalize().to_string(),
        None => n.to_string(),
    }
}

pub(crate) fn string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(column))
}

/// Table names that are plain identifiers (optionally schema qualified) are
/// emitted bare; anything else is quoted.
pub(crate) fn table_name(name: &str) -> String {
    if PLAIN_TABLE_NAME.is_match(name) {
        name.to_string()
    } else {
        quote_ident(name)
    }
}
