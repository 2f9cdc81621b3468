//! Function reference for the formula-sql CLI

use std::fmt::Write;

use super::CliError;
use crate::functions::{self, FunctionCategory};

const CATEGORIES: [FunctionCategory; 5] = [
    FunctionCategory::Math,
    FunctionCategory::Text,
    FunctionCategory::Logical,
    FunctionCategory::Date,
    FunctionCategory::Aggregate,
];

/// Every function grouped by category, one signature per line.
pub fn functions_overview() -> String {
    let mut out = String::from("FORMULA FUNCTIONS\n");
    for category in CATEGORIES {
        let _ = writeln!(out, "\n{}", category.to_string().to_uppercase());
        for spec in functions::all().iter().filter(|f| f.category == category) {
            let _ = writeln!(out, "  {:<60} {}", spec.signature(), spec.description);
        }
    }
    out.push_str(
        "\nRelated columns are read with name_rel.column; aggregates take a\n\
         relationship path such as orders or orders.line_items.\n",
    );
    out
}

/// Detail page for one function.
pub fn function_reference(name: &str) -> Result<String, CliError> {
    let spec = functions::lookup(name).ok_or_else(|| CliError::UnknownFunction(name.to_string()))?;

    let mut out = String::new();
    let _ = writeln!(out, "{}", spec.signature());
    let _ = writeln!(out, "\n  {}", spec.description);
    let _ = writeln!(out, "\n  category: {}", spec.category);
    let max = spec
        .max_arity()
        .map_or_else(|| "any".to_string(), |m| m.to_string());
    let _ = writeln!(out, "  arguments: {} to {}", spec.min_arity(), max);
    Ok(out)
}
