//! Type-check a single formula against a schema

use super::CliError;
use crate::{CompilerOptions, DataType, SchemaContext, compile_with_options};

/// Options for the check command
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Schema JSON text
    pub schema: String,
    pub formula: String,
    pub compiler: CompilerOptions,
}

/// What a successful check found out about the formula
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub return_type: DataType,
    pub semantic_id: String,
    pub joins: usize,
    pub aggregates: usize,
}

/// Execute a check operation
pub fn execute_check(options: &CheckOptions) -> Result<CheckReport, CliError> {
    let schema = SchemaContext::from_json_str(&options.schema)?;
    let result =
        compile_with_options(&options.formula, &schema, &options.compiler).map_err(|error| {
            CliError::Compile {
                field: options.formula.clone(),
                error,
            }
        })?;

    Ok(CheckReport {
        return_type: result.return_type,
        semantic_id: result.expression.semantic_id,
        joins: result.joins.len(),
        aggregates: result.aggregates.len(),
    })
}
