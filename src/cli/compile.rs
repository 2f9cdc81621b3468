//! Compile a batch of named formulas into one query

use indexmap::IndexMap;
use serde_json::json;

use super::CliError;
use crate::{AssembledQuery, CompilerOptions, SchemaContext, assemble, compile_with_options};

/// Options for the compile command
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Schema JSON text
    pub schema: String,
    /// `(field name, formula)` pairs in output order
    pub fields: Vec<(String, String)>,
    pub compiler: CompilerOptions,
}

#[derive(Debug)]
pub struct CompileOutput {
    pub assembled: AssembledQuery,
}

impl CompileOutput {
    /// Machine readable form for `--json`.
    pub fn to_json(&self) -> serde_json::Value {
        let aliases: serde_json::Map<String, serde_json::Value> = self
            .assembled
            .field_aliases
            .iter()
            .map(|(field, alias)| (field.clone(), json!(alias)))
            .collect();
        json!({
            "query": self.assembled.query,
            "fieldAliases": aliases,
            "selectExpressions": self.assembled.select_expressions,
            "fromClause": self.assembled.from_clause,
        })
    }
}

/// Split a `name=formula` argument.
pub fn parse_field(arg: &str) -> Result<(String, String), CliError> {
    match arg.split_once('=') {
        Some((name, formula)) if !name.trim().is_empty() && !formula.trim().is_empty() => {
            Ok((name.trim().to_string(), formula.to_string()))
        }
        _ => Err(CliError::InvalidField(arg.to_string())),
    }
}

/// Execute a compile operation
pub fn execute_compile(options: &CompileOptions) -> Result<CompileOutput, CliError> {
    let schema = SchemaContext::from_json_str(&options.schema)?;

    let mut results = IndexMap::new();
    for (field, formula) in &options.fields {
        let result = compile_with_options(formula, &schema, &options.compiler).map_err(|error| {
            CliError::Compile {
                field: field.clone(),
                error,
            }
        })?;
        results.insert(field.clone(), result);
    }

    let assembled = assemble(&results, &schema.table_name)?;
    Ok(CompileOutput { assembled })
}
