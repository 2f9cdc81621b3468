//! SQL-agnostic intermediate representation produced by the compiler.
//!
//! Every node carries a semantic identifier: a deterministic string built
//! from the node kind, its salient value, its children's identifiers and the
//! compilation context. Two structurally identical subexpressions compiled in
//! the same context always get the same identifier, which is what lets the
//! assembler share joins and aggregate subqueries between formulas.

use std::{collections::BTreeMap, fmt};

use crate::{
    ast::{BinOp, UnaryOp},
    types::DataType,
};

/// Scope in which an expression was compiled.
///
/// Formulas start in `Main`. The expression argument of an aggregate is
/// compiled in an `Aggregate` scope rooted at the related table, because the
/// same relationship name can mean something different there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompilationContext {
    Main,
    Aggregate {
        source: String,
        target: String,
        join_column: String,
    },
}

impl CompilationContext {
    pub fn is_main(&self) -> bool {
        matches!(self, CompilationContext::Main)
    }
}

impl fmt::Display for CompilationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilationContext::Main => f.write_str("main"),
            CompilationContext::Aggregate {
                source,
                target,
                join_column,
            } => write!(f, "agg:{}→{}[{}]", source, target, join_column),
        }
    }
}

/// Build a semantic identifier: `{kind}:{details}[{child,...}]@{context}`.
///
/// Empty details and an empty child list are omitted.
pub fn semantic_id(
    kind: &str,
    details: &str,
    children: &[&str],
    context: &CompilationContext,
) -> String {
    let mut id = String::from(kind);
    if !details.is_empty() {
        id.push(':');
        id.push_str(details);
    }
    if !children.is_empty() {
        id.push('[');
        id.push_str(&children.join(","));
        id.push(']');
    }
    id.push('@');
    id.push_str(&context.to_string());
    id
}

/// A compiled expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionIntent {
    pub kind: IntentKind,
    pub semantic_id: String,
    /// Semantic ids of the joins this subtree reads from, sorted
    pub join_deps: Vec<String>,
    pub return_type: DataType,
    pub context: CompilationContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntentKind {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    /// ISO `YYYY-MM-DD`
    Date(String),

    /// Column of the table the scope is rooted at, schema spelling
    Column(String),

    /// Column of a related table, read through the join `join`
    RelationshipColumn { join: String, column: String },

    Unary {
        op: UnaryOp,
        operand: Box<ExpressionIntent>,
    },

    Binary {
        op: BinOp,
        left: Box<ExpressionIntent>,
        right: Box<ExpressionIntent>,
    },

    /// Call of a non-aggregate function
    Function {
        name: String,
        args: Vec<ExpressionIntent>,
    },

    /// Reference to the aggregate intent with this semantic id
    Aggregate(String),
}

impl ExpressionIntent {
    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&ExpressionIntent> {
        match &self.kind {
            IntentKind::Unary { operand, .. } => vec![operand.as_ref()],
            IntentKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            IntentKind::Function { args, .. } => args.iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JoinDirection {
    /// Many-to-one: `source.join_column = target.id`
    Direct,
    /// One-to-many: `target.join_column = source.id`
    Inverse,
}

impl fmt::Display for JoinDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinDirection::Direct => f.write_str("direct"),
            JoinDirection::Inverse => f.write_str("inverse"),
        }
    }
}

/// One link of a relationship chain that needs a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinIntent {
    pub direction: JoinDirection,
    pub source_table: String,
    pub target_table: String,
    pub join_column: String,
    /// Relationship names from the scope root up to and including this link
    pub chain: Vec<String>,
    pub semantic_id: String,
    pub context: CompilationContext,
}

impl JoinIntent {
    /// The chain of the link this one hangs off, if any.
    pub fn parent_chain(&self) -> Option<&[String]> {
        match self.chain.len() {
            0 | 1 => None,
            n => Some(&self.chain[..n - 1]),
        }
    }
}

/// The aggregate family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AggregateFunction {
    StringAgg,
    StringAggDistinct,
    Sum,
    Count,
    Avg,
    Min,
    Max,
    And,
    Or,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<AggregateFunction> {
        match name.to_ascii_uppercase().as_str() {
            "STRING_AGG" => Some(AggregateFunction::StringAgg),
            "STRING_AGG_DISTINCT" => Some(AggregateFunction::StringAggDistinct),
            "SUM_AGG" => Some(AggregateFunction::Sum),
            "COUNT_AGG" => Some(AggregateFunction::Count),
            "AVG_AGG" => Some(AggregateFunction::Avg),
            "MIN_AGG" => Some(AggregateFunction::Min),
            "MAX_AGG" => Some(AggregateFunction::Max),
            "AND_AGG" => Some(AggregateFunction::And),
            "OR_AGG" => Some(AggregateFunction::Or),
            _ => None,
        }
    }

    /// Formula spelling.
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::StringAgg => "STRING_AGG",
            AggregateFunction::StringAggDistinct => "STRING_AGG_DISTINCT",
            AggregateFunction::Sum => "SUM_AGG",
            AggregateFunction::Count => "COUNT_AGG",
            AggregateFunction::Avg => "AVG_AGG",
            AggregateFunction::Min => "MIN_AGG",
            AggregateFunction::Max => "MAX_AGG",
            AggregateFunction::And => "AND_AGG",
            AggregateFunction::Or => "OR_AGG",
        }
    }

    pub fn takes_delimiter(self) -> bool {
        matches!(
            self,
            AggregateFunction::StringAgg | AggregateFunction::StringAggDistinct
        )
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One inverse relationship hop of an aggregate's source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateLink {
    pub relationship: String,
    pub table_name: String,
    /// Column on `table_name` pointing back at the previous table's `id`
    pub join_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateIntent {
    pub semantic_id: String,
    pub function: AggregateFunction,
    /// Dotted relationship path, e.g. `orders.line_items`
    pub relation: String,
    /// Table the aggregate is evaluated for
    pub source_table: String,
    pub links: Vec<AggregateLink>,
    /// Expression folded over the related rows
    pub expression: ExpressionIntent,
    pub delimiter: Option<ExpressionIntent>,
    /// Joins the expression needs inside the aggregate subquery
    pub joins: BTreeMap<String, JoinIntent>,
    /// Context the aggregate call appears in
    pub context: CompilationContext,
    /// Context the expression was compiled in
    pub inner_context: CompilationContext,
    pub return_type: DataType,
}

/// Output of compiling one formula.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationResult {
    pub expression: ExpressionIntent,
    pub joins: BTreeMap<String, JoinIntent>,
    pub aggregates: BTreeMap<String, AggregateIntent>,
    pub return_type: DataType,
}
