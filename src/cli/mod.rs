//! CLI support for formula-sql
//!
//! The binary is a thin wrapper over these functions so other tools can run
//! the same commands in-process.

mod check;
mod compile;
mod docs;

pub use check::{CheckOptions, CheckReport, execute_check};
pub use compile::{CompileOptions, CompileOutput, execute_compile, parse_field};
pub use docs::{function_reference, functions_overview};

use std::io;

use crate::{AssemblyError, CompileError, SchemaError};

/// Errors that can occur during CLI operations
#[derive(Debug)]
pub enum CliError {
    /// Schema could not be loaded
    Schema(SchemaError),
    /// A formula failed to compile
    Compile { field: String, error: CompileError },
    /// Compiled formulas could not be assembled
    Assembly(AssemblyError),
    /// JSON output error
    Json(serde_json::Error),
    /// IO error
    Io(io::Error),
    /// No schema given and nothing piped to stdin
    NoSchema,
    /// A field argument is not `name=formula`
    InvalidField(String),
    /// Unknown function for `formula-sql function`
    UnknownFunction(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Schema(e) => write!(f, "Schema error: {}", e),
            CliError::Compile { field, error } => write!(f, "Field '{}': {}", field, error),
            CliError::Assembly(e) => write!(f, "Assembly error: {}", e),
            CliError::Json(e) => write!(f, "JSON error: {}", e),
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::NoSchema => {
                write!(f, "No schema provided. Use --schema or pipe schema JSON to stdin.")
            }
            CliError::InvalidField(arg) => {
                write!(f, "Invalid field '{}': expected name=formula", arg)
            }
            CliError::UnknownFunction(name) => write!(
                f,
                "Unknown function: '{}'\nRun 'formula-sql functions' to see available functions.",
                name
            ),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Schema(e) => Some(e),
            CliError::Compile { error, .. } => Some(error),
            CliError::Assembly(e) => Some(e),
            CliError::Json(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        CliError::Schema(e)
    }
}

impl From<AssemblyError> for CliError {
    fn from(e: AssemblyError) -> Self {
        CliError::Assembly(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}
