//! Function calls: generic signature checking, the special forms and the
//! aggregate family.

use super::{Scope, find_relationship};
use crate::{
    ast::{Expr, ExprKind},
    error::{MAX_SUGGESTIONS, SemanticError, SemanticErrorKind},
    functions::{self, FunctionSpec, Returns},
    intent::{
        AggregateFunction, AggregateIntent, AggregateLink, CompilationContext, ExpressionIntent,
        IntentKind, semantic_id,
    },
    lexer::Position,
    types::DataType,
};

const DATEDIF_UNITS: [&str; 3] = ["days", "months", "years"];

impl<'a> Scope<'a> {
    pub(super) fn call(
        &mut self,
        name: &str,
        args: &[Expr],
        position: Position,
    ) -> Result<ExpressionIntent, SemanticError> {
        let spec = functions::lookup(name).ok_or_else(|| {
            SemanticError::new(
                SemanticErrorKind::UnknownFunction {
                    name: name.to_ascii_uppercase(),
                    suggestions: functions::suggestions(name)
                        .into_iter()
                        .take(MAX_SUGGESTIONS)
                        .map(str::to_string)
                        .collect(),
                },
                position,
            )
        })?;
        check_arity(spec, args.len(), position)?;

        if let Some(function) = AggregateFunction::from_name(spec.name) {
            return self.aggregate(function, args, position);
        }

        match spec.name {
            "IF" => self.if_call(spec, args),
            "NULLVALUE" => self.null_value(spec, args, position),
            "DATEDIF" => self.date_dif(spec, args),
            _ => self.standard(spec, args),
        }
    }

    fn function_node(
        &self,
        spec: &FunctionSpec,
        args: Vec<ExpressionIntent>,
        return_type: DataType,
    ) -> ExpressionIntent {
        self.node(
            IntentKind::Function {
                name: spec.name.to_string(),
                args,
            },
            "function",
            spec.name,
            return_type,
            &[],
        )
    }

    /// Compile an argument and check it against the declared argument type.
    fn typed_arg(
        &mut self,
        spec: &FunctionSpec,
        index: usize,
        arg: &Expr,
    ) -> Result<ExpressionIntent, SemanticError> {
        let compiled = self.compile(arg)?;
        if let Some(arg_spec) = spec.arg(index)
            && !arg_spec.ty.accepts(compiled.return_type)
        {
            return Err(SemanticError::type_error(
                format!(
                    "Argument {} ('{}') of {} must be {}, got {}",
                    index + 1,
                    arg_spec.name,
                    spec.name,
                    arg_spec.ty,
                    compiled.return_type
                ),
                arg.position,
            ));
        }
        Ok(compiled)
    }

    fn standard(
        &mut self,
        spec: &FunctionSpec,
        args: &[Expr],
    ) -> Result<ExpressionIntent, SemanticError> {
        let compiled = args
            .iter()
            .enumerate()
            .map(|(i, arg)| self.typed_arg(spec, i, arg))
            .collect::<Result<Vec<_>, _>>()?;

        let return_type = match spec.returns {
            Returns::Fixed(ty) => ty,
            Returns::Inferred => compiled
                .first()
                .map_or(DataType::Null, |arg| arg.return_type),
        };
        Ok(self.function_node(spec, compiled, return_type))
    }

    fn if_call(
        &mut self,
        spec: &FunctionSpec,
        args: &[Expr],
    ) -> Result<ExpressionIntent, SemanticError> {
        let condition = self.typed_arg(spec, 0, &args[0])?;
        let then = self.compile(&args[1])?;
        let mut return_type = then.return_type;
        let mut compiled = vec![condition, then];

        if let Some(otherwise) = args.get(2) {
            let otherwise_intent = self.compile(otherwise)?;
            if !return_type.is_compatible(otherwise_intent.return_type) {
                return Err(SemanticError::type_error(
                    format!(
                        "IF branches must have the same type, got {} and {}",
                        return_type, otherwise_intent.return_type
                    ),
                    otherwise.position,
                ));
            }
            return_type = return_type.unify(otherwise_intent.return_type);
            compiled.push(otherwise_intent);
        }

        Ok(self.function_node(spec, compiled, return_type))
    }

    fn null_value(
        &mut self,
        spec: &FunctionSpec,
        args: &[Expr],
        position: Position,
    ) -> Result<ExpressionIntent, SemanticError> {
        let value = self.compile(&args[0])?;
        let default = self.compile(&args[1])?;
        if !value.return_type.is_compatible(default.return_type) {
            return Err(SemanticError::type_error(
                format!(
                    "NULLVALUE default must match the value type {}, got {}",
                    value.return_type, default.return_type
                ),
                position,
            ));
        }

        let return_type = value.return_type.unify(default.return_type);
        Ok(self.function_node(spec, vec![value, default], return_type))
    }

    fn date_dif(
        &mut self,
        spec: &FunctionSpec,
        args: &[Expr],
    ) -> Result<ExpressionIntent, SemanticError> {
        let start = self.typed_arg(spec, 0, &args[0])?;
        let end = self.typed_arg(spec, 1, &args[1])?;

        let unit_arg = &args[2];
        let unit = match &unit_arg.kind {
            ExprKind::String(unit) => unit.to_ascii_lowercase(),
            _ => {
                return Err(SemanticError::type_error(
                    "DATEDIF unit must be a text literal: \"days\", \"months\" or \"years\"",
                    unit_arg.position,
                ));
            }
        };
        if !DATEDIF_UNITS.contains(&unit.as_str()) {
            return Err(SemanticError::type_error(
                format!(
                    "Unknown DATEDIF unit \"{}\"; use \"days\", \"months\" or \"years\"",
                    unit
                ),
                unit_arg.position,
            ));
        }
        let unit = self.node(
            IntentKind::String(unit.clone()),
            "string",
            &format!("{:?}", unit),
            DataType::String,
            &[],
        );

        Ok(self.function_node(spec, vec![start, end, unit], DataType::Number))
    }

    fn aggregate(
        &mut self,
        function: AggregateFunction,
        args: &[Expr],
        position: Position,
    ) -> Result<ExpressionIntent, SemanticError> {
        if !self.context.is_main() {
            return Err(SemanticError::type_error(
                format!("{} cannot be used inside another aggregate", function),
                position,
            ));
        }

        let path_arg = &args[0];
        let ExprKind::Path(segments) = &path_arg.kind else {
            return Err(SemanticError::type_error(
                format!(
                    "The first argument of {} must be a relationship name",
                    function
                ),
                path_arg.position,
            ));
        };
        if segments.len() > self.options.max_chain_depth {
            return Err(SemanticError::new(
                SemanticErrorKind::ChainTooDeep {
                    path: segments.join(".").to_ascii_lowercase(),
                    depth: segments.len(),
                    max: self.options.max_chain_depth,
                },
                path_arg.position,
            ));
        }

        let mut relationships = self.inverse_relationships;
        let mut source_table = self.table;
        let mut links = Vec::with_capacity(segments.len());
        let mut target = None;

        for segment in segments {
            let info = find_relationship(relationships, segment).ok_or_else(|| {
                SemanticError::new(
                    SemanticErrorKind::UnknownRelationship {
                        name: segment.to_ascii_lowercase(),
                        table: source_table.to_string(),
                        available: relationships
                            .names()
                            .take(MAX_SUGGESTIONS)
                            .map(str::to_string)
                            .collect(),
                    },
                    path_arg.position,
                )
            })?;
            links.push(AggregateLink {
                relationship: info.name.clone(),
                table_name: info.table_name.clone(),
                join_column: info.join_column.clone(),
            });
            relationships = &info.inverse_relationships;
            source_table = &info.table_name;
            target = Some(info);
        }

        let Some(target) = target else {
            return Err(SemanticError::type_error(
                format!("{} needs a relationship to aggregate over", function),
                path_arg.position,
            ));
        };
        let relation = links
            .iter()
            .map(|link| link.relationship.as_str())
            .collect::<Vec<_>>()
            .join(".");
        let inner_context = CompilationContext::Aggregate {
            source: self.table.to_string(),
            target: target.table_name.clone(),
            join_column: links
                .iter()
                .map(|link| link.join_column.as_str())
                .collect::<Vec<_>>()
                .join("."),
        };

        let mut inner = Scope::nested(target, inner_context.clone(), self.options);
        let expression = inner.compile(&args[1])?;
        let (joins, _) = inner.finish();
        check_aggregate_input(function, &expression, args[1].position)?;

        let delimiter = if function.takes_delimiter() {
            let arg = &args[2];
            if !is_constant(arg) {
                return Err(SemanticError::type_error(
                    format!("The delimiter of {} must be a constant", function),
                    arg.position,
                ));
            }
            let delimiter = self.compile(arg)?;
            if !matches!(delimiter.return_type, DataType::String) {
                return Err(SemanticError::type_error(
                    format!(
                        "The delimiter of {} must be text, got {}",
                        function, delimiter.return_type
                    ),
                    arg.position,
                ));
            }
            Some(delimiter)
        } else {
            None
        };

        let return_type = match function {
            AggregateFunction::StringAgg | AggregateFunction::StringAggDistinct => {
                DataType::String
            }
            AggregateFunction::Sum | AggregateFunction::Count | AggregateFunction::Avg => {
                DataType::Number
            }
            AggregateFunction::And | AggregateFunction::Or => DataType::Boolean,
            AggregateFunction::Min | AggregateFunction::Max => expression.return_type,
        };

        let mut children = vec![expression.semantic_id.as_str()];
        if let Some(delimiter) = &delimiter {
            children.push(delimiter.semantic_id.as_str());
        }
        let id = semantic_id(
            "aggregate",
            &format!("{}:{}", function, relation),
            &children,
            &self.context,
        );

        tracing::debug!(id = %id, relation = %relation, inner_joins = joins.len(), "aggregate");
        let intent = AggregateIntent {
            semantic_id: id.clone(),
            function,
            relation,
            source_table: self.table.to_string(),
            links,
            expression,
            delimiter,
            joins,
            context: self.context.clone(),
            inner_context,
            return_type,
        };
        self.aggregates.entry(id.clone()).or_insert(intent);

        Ok(ExpressionIntent {
            kind: IntentKind::Aggregate(id.clone()),
            semantic_id: id,
            join_deps: Vec::new(),
            return_type,
            context: self.context.clone(),
        })
    }
}

fn check_arity(spec: &FunctionSpec, found: usize, position: Position) -> Result<(), SemanticError> {
    let min = spec.min_arity();
    let max = spec.max_arity();
    if found >= min && max.is_none_or(|max| found <= max) {
        return Ok(());
    }

    let expected = match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{} to {}", min, max),
        None => format!("at least {}", min),
    };
    Err(SemanticError::new(
        SemanticErrorKind::ArityError {
            function: spec.name.to_string(),
            expected,
            found,
        },
        position,
    ))
}

fn check_aggregate_input(
    function: AggregateFunction,
    expression: &ExpressionIntent,
    position: Position,
) -> Result<(), SemanticError> {
    let ty = expression.return_type;
    let expected = match function {
        AggregateFunction::Sum | AggregateFunction::Avg => DataType::Number,
        AggregateFunction::And | AggregateFunction::Or => DataType::Boolean,
        AggregateFunction::StringAgg | AggregateFunction::StringAggDistinct => DataType::String,
        AggregateFunction::Count => return Ok(()),
        AggregateFunction::Min | AggregateFunction::Max => {
            if ty == DataType::Boolean {
                return Err(SemanticError::type_error(
                    format!(
                        "{} expects a number, date or string expression, got {}",
                        function, ty
                    ),
                    position,
                ));
            }
            return Ok(());
        }
    };

    if ty.is_compatible(expected) {
        Ok(())
    } else {
        Err(SemanticError::type_error(
            format!("{} expects a {} expression, got {}", function, expected, ty),
            position,
        ))
    }
}

/// True when `expr` reads no columns and calls no aggregates.
fn is_constant(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Number(_)
        | ExprKind::String(_)
        | ExprKind::Boolean(_)
        | ExprKind::Null
        | ExprKind::Date(_) => true,
        ExprKind::Identifier(_) | ExprKind::RelationshipRef { .. } | ExprKind::Path(_) => false,
        ExprKind::UnaryOp { operand, .. } => is_constant(operand),
        ExprKind::BinaryOp { left, right, .. } => is_constant(left) && is_constant(right),
        ExprKind::FunctionCall { name, args } => {
            !functions::is_aggregate(name) && args.iter().all(is_constant)
        }
    }
}
