//! Semantic compiler: AST + schema context -> intents.
//!
//! A `Scope` walks one AST against one table. The formula itself is
//! compiled in a root scope over the schema's base table; the expression
//! argument of every aggregate is compiled in a fresh scope rooted at the
//! related table, whose joins travel with the aggregate intent instead of
//! being merged into the outer formula.

mod calls;

use std::collections::BTreeMap;

use crate::{
    ast::{BinOp, Expr, ExprKind, UnaryOp},
    error::{CompileError, MAX_SUGGESTIONS, SemanticError, SemanticErrorKind, truncate_suggestions},
    intent::{
        AggregateIntent, CompilationContext, CompilationResult, ExpressionIntent, IntentKind,
        JoinDirection, JoinIntent, semantic_id,
    },
    lexer::Position,
    parser::{RELATIONSHIP_SUFFIX, parse_formula},
    schema::{ColumnMap, RelationshipInfo, RelationshipMap, SchemaContext},
    types::DataType,
};

/// Default maximum number of inverse relationship hops in an aggregate path.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 3;

/// Tunables for the semantic compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Longest accepted aggregate relationship path, e.g. `orders.line_items` is 2
    pub max_chain_depth: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }
}

/// Compiles a formula against a schema with default options.
///
/// # Examples
///
/// ```
/// use formula_sql::{compile, DataType, SchemaContext};
///
/// let schema = SchemaContext::new("transactions").with_column("revenue", DataType::Number);
/// let result = compile("revenue * 2", &schema).unwrap();
/// assert_eq!(result.return_type, DataType::Number);
/// ```
pub fn compile(formula: &str, schema: &SchemaContext) -> Result<CompilationResult, CompileError> {
    compile_with_options(formula, schema, &CompilerOptions::default())
}

pub fn compile_with_options(
    formula: &str,
    schema: &SchemaContext,
    options: &CompilerOptions,
) -> Result<CompilationResult, CompileError> {
    tracing::debug!(table = %schema.table_name, formula, "compiling formula");
    let expr = parse_formula(formula)?;
    let result = compile_expr(&expr, schema, options)?;
    tracing::trace!(
        id = %result.expression.semantic_id,
        joins = result.joins.len(),
        aggregates = result.aggregates.len(),
        return_type = %result.return_type,
        "compiled formula"
    );
    Ok(result)
}

/// Compiles an already parsed formula.
pub fn compile_expr(
    expr: &Expr,
    schema: &SchemaContext,
    options: &CompilerOptions,
) -> Result<CompilationResult, SemanticError> {
    let mut scope = Scope::new(
        &schema.table_name,
        &schema.columns,
        &schema.relationships,
        &schema.inverse_relationships,
        CompilationContext::Main,
        options,
    );
    let expression = scope.compile(expr)?;
    let (joins, aggregates) = scope.finish();

    Ok(CompilationResult {
        return_type: expression.return_type,
        expression,
        joins,
        aggregates,
    })
}

/// Compilation state for one table in one context.
pub(crate) struct Scope<'a> {
    table: &'a str,
    columns: &'a ColumnMap,
    relationships: &'a RelationshipMap,
    inverse_relationships: &'a RelationshipMap,
    context: CompilationContext,
    options: &'a CompilerOptions,
    joins: BTreeMap<String, JoinIntent>,
    aggregates: BTreeMap<String, AggregateIntent>,
}

impl<'a> Scope<'a> {
    fn new(
        table: &'a str,
        columns: &'a ColumnMap,
        relationships: &'a RelationshipMap,
        inverse_relationships: &'a RelationshipMap,
        context: CompilationContext,
        options: &'a CompilerOptions,
    ) -> Self {
        Scope {
            table,
            columns,
            relationships,
            inverse_relationships,
            context,
            options,
            joins: BTreeMap::new(),
            aggregates: BTreeMap::new(),
        }
    }

    /// A fresh scope rooted at the target table of `relationship`.
    fn nested(
        relationship: &'a RelationshipInfo,
        context: CompilationContext,
        options: &'a CompilerOptions,
    ) -> Self {
        Scope::new(
            &relationship.table_name,
            &relationship.columns,
            &relationship.relationships,
            &relationship.inverse_relationships,
            context,
            options,
        )
    }

    fn finish(
        self,
    ) -> (
        BTreeMap<String, JoinIntent>,
        BTreeMap<String, AggregateIntent>,
    ) {
        (self.joins, self.aggregates)
    }

    /// Wraps `kind` into an intent, deriving its semantic id and join
    /// dependencies from its children.
    fn node(
        &self,
        kind: IntentKind,
        label: &str,
        details: &str,
        return_type: DataType,
        extra_deps: &[String],
    ) -> ExpressionIntent {
        let mut intent = ExpressionIntent {
            kind,
            semantic_id: String::new(),
            join_deps: extra_deps.to_vec(),
            return_type,
            context: self.context.clone(),
        };

        let children = intent.children();
        let child_ids: Vec<&str> = children.iter().map(|c| c.semantic_id.as_str()).collect();
        let id = semantic_id(label, details, &child_ids, &self.context);
        let child_deps: Vec<String> = children
            .iter()
            .flat_map(|c| c.join_deps.iter().cloned())
            .collect();

        intent.semantic_id = id;
        intent.join_deps.extend(child_deps);
        intent.join_deps.sort();
        intent.join_deps.dedup();
        intent
    }

    pub(crate) fn compile(&mut self, expr: &Expr) -> Result<ExpressionIntent, SemanticError> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(self.node(
                IntentKind::Number(*n),
                "number",
                &n.to_string(),
                DataType::Number,
                &[],
            )),
            ExprKind::String(s) => Ok(self.node(
                IntentKind::String(s.clone()),
                "string",
                &format!("{:?}", s),
                DataType::String,
                &[],
            )),
            ExprKind::Boolean(b) => Ok(self.node(
                IntentKind::Boolean(*b),
                "boolean",
                if *b { "TRUE" } else { "FALSE" },
                DataType::Boolean,
                &[],
            )),
            ExprKind::Null => Ok(self.node(IntentKind::Null, "null", "NULL", DataType::Null, &[])),
            ExprKind::Date(d) => Ok(self.node(
                IntentKind::Date(d.clone()),
                "date",
                d,
                DataType::Date,
                &[],
            )),
            ExprKind::Identifier(name) => self.column(name, expr.position),
            ExprKind::RelationshipRef { chain, field } => {
                self.relationship_ref(chain, field.as_deref(), expr.position)
            }
            ExprKind::Path(segments) => Err(SemanticError::type_error(
                format!(
                    "Relationship path '{}' can only be the first argument of an aggregate function",
                    segments.join(".").to_ascii_lowercase()
                ),
                expr.position,
            )),
            ExprKind::UnaryOp { op, operand } => self.unary(*op, operand, expr.position),
            ExprKind::BinaryOp { op, left, right } => self.binary(*op, left, right, expr.position),
            ExprKind::FunctionCall { name, args } => self.call(name, args, expr.position),
        }
    }

    fn column(&self, name: &str, position: Position) -> Result<ExpressionIntent, SemanticError> {
        let column = self.columns.get(name).ok_or_else(|| {
            SemanticError::new(
                SemanticErrorKind::UnknownColumn {
                    column: name.to_ascii_lowercase(),
                    table: self.table.to_string(),
                    available: truncate_suggestions(self.columns.names()),
                },
                position,
            )
        })?;

        Ok(self.node(
            IntentKind::Column(column.name.clone()),
            "column",
            &column.name,
            column.data_type,
            &[],
        ))
    }

    fn unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        position: Position,
    ) -> Result<ExpressionIntent, SemanticError> {
        let operand = self.compile(operand)?;
        if !matches!(operand.return_type, DataType::Number | DataType::Null) {
            return Err(SemanticError::type_error(
                format!("Cannot negate a {} value", operand.return_type),
                position,
            ));
        }

        Ok(self.node(
            IntentKind::Unary {
                op,
                operand: Box::new(operand),
            },
            "unary",
            &op.to_string(),
            DataType::Number,
            &[],
        ))
    }

    fn binary(
        &mut self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        position: Position,
    ) -> Result<ExpressionIntent, SemanticError> {
        let left = self.compile(left)?;
        let right = self.compile(right)?;
        let return_type = binary_type(op, left.return_type, right.return_type)
            .map_err(|message| SemanticError::type_error(message, position))?;

        Ok(self.node(
            IntentKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            "binary",
            op.symbol(),
            return_type,
            &[],
        ))
    }

    fn relationship_ref(
        &mut self,
        chain: &[String],
        field: Option<&str>,
        position: Position,
    ) -> Result<ExpressionIntent, SemanticError> {
        let mut relationships = self.relationships;
        let mut source_table = self.table;
        let mut names: Vec<String> = Vec::new();
        let mut deps = Vec::new();
        let mut target: Option<&'a RelationshipInfo> = None;

        for link in chain {
            let info = find_relationship(relationships, link).ok_or_else(|| {
                SemanticError::new(
                    SemanticErrorKind::UnknownRelationship {
                        name: link.to_ascii_lowercase(),
                        table: source_table.to_string(),
                        available: relationships
                            .names()
                            .take(MAX_SUGGESTIONS)
                            .map(|n| format!("{}_rel", n.to_ascii_lowercase()))
                            .collect(),
                    },
                    position,
                )
            })?;
            names.push(info.name.clone());

            let id = semantic_id(
                "join",
                &format!(
                    "{}:{}:{}->{}[{}]",
                    JoinDirection::Direct,
                    names.join("."),
                    source_table,
                    info.table_name,
                    info.join_column
                ),
                &[],
                &self.context,
            );
            self.joins.entry(id.clone()).or_insert_with(|| JoinIntent {
                direction: JoinDirection::Direct,
                source_table: source_table.to_string(),
                target_table: info.table_name.clone(),
                join_column: info.join_column.clone(),
                chain: names.clone(),
                semantic_id: id.clone(),
                context: self.context.clone(),
            });
            deps.push(id);

            relationships = &info.relationships;
            source_table = &info.table_name;
            target = Some(info);
        }

        let (Some(target), Some(join)) = (target, deps.last().cloned()) else {
            return Err(SemanticError::type_error(
                "Relationship reference needs at least one relationship",
                position,
            ));
        };
        let path = names.join(".");

        let field = field.ok_or_else(|| {
            SemanticError::new(
                SemanticErrorKind::UnknownField {
                    field: String::new(),
                    relationship: path.clone(),
                    table: target.table_name.clone(),
                    available: truncate_suggestions(target.columns.names()),
                },
                position,
            )
        })?;
        let column = target.columns.get(field).ok_or_else(|| {
            SemanticError::new(
                SemanticErrorKind::UnknownField {
                    field: field.to_ascii_lowercase(),
                    relationship: path.clone(),
                    table: target.table_name.clone(),
                    available: truncate_suggestions(target.columns.names()),
                },
                position,
            )
        })?;

        Ok(self.node(
            IntentKind::RelationshipColumn {
                join,
                column: column.name.clone(),
            },
            "relationship",
            &format!("{}.{}", path, column.name),
            column.data_type,
            &deps,
        ))
    }
}

/// Resolves `name` (with or without the `_rel` suffix) case-insensitively.
fn find_relationship<'m>(map: &'m RelationshipMap, name: &str) -> Option<&'m RelationshipInfo> {
    let upper = name.to_ascii_uppercase();
    upper
        .strip_suffix(RELATIONSHIP_SUFFIX)
        .and_then(|stripped| map.get(stripped))
        .or_else(|| map.get(&upper))
}

/// Result type of a binary operator, or a message explaining the mismatch.
pub fn binary_type(op: BinOp, left: DataType, right: DataType) -> Result<DataType, String> {
    use DataType::{Date, Null, Number, String as Text};

    match op {
        BinOp::Concat => match (left, right) {
            (Text | Null, Text | Null) => Ok(Text),
            _ => Err(format!(
                "Operator '&' joins text only, got {} and {}; convert other values with STRING() first",
                left, right
            )),
        },
        BinOp::Add | BinOp::Subtract => match (left, right) {
            (Null, Null) => Ok(Null),
            (Number | Null, Number | Null) => Ok(Number),
            (Date, Number | Null) => Ok(Date),
            (Null, Date) if op == BinOp::Add => Ok(Date),
            (Date, Date) if op == BinOp::Subtract => Ok(Number),
            (Date, Date) => Err(
                "Cannot add two dates; subtract them to get the number of days between".to_string(),
            ),
            _ => Err(format!(
                "Operator '{}' cannot be applied to {} and {}",
                op, left, right
            )),
        },
        BinOp::Multiply | BinOp::Divide => match (left, right) {
            (Null, Null) => Ok(Null),
            (Number | Null, Number | Null) => Ok(Number),
            _ => Err(format!(
                "Operator '{}' requires numbers, got {} and {}",
                op, left, right
            )),
        },
        BinOp::Equal
        | BinOp::NotEqual
        | BinOp::LessThan
        | BinOp::GreaterThan
        | BinOp::LessEqual
        | BinOp::GreaterEqual => {
            if left.is_compatible(right) {
                Ok(DataType::Boolean)
            } else {
                Err(format!("Cannot compare {} with {} using '{}'", left, right, op))
            }
        }
    }
}
