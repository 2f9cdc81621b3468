//! Function metadata.
//!
//! One static table describes every function the formula language knows:
//! argument names and types, arity, return type, and whether the semantic
//! compiler applies bespoke rules instead of generic checking. Editor
//! tooling reads the same table for completions and hover text.

use std::fmt;

use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCategory {
    Math,
    Text,
    Logical,
    Date,
    Aggregate,
}

impl fmt::Display for FunctionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCategory::Math => "math",
            FunctionCategory::Text => "text",
            FunctionCategory::Logical => "logical",
            FunctionCategory::Date => "date",
            FunctionCategory::Aggregate => "aggregate",
        };
        f.write_str(name)
    }
}

/// Expected type of a single argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Number,
    String,
    Boolean,
    Date,
    /// Any type, including `Null`
    Any,
    /// The name (or dotted path) of an inverse relationship
    Relationship,
}

impl ArgType {
    /// Whether a compiled argument of type `ty` is acceptable.
    pub fn accepts(self, ty: DataType) -> bool {
        match self {
            ArgType::Any => true,
            ArgType::Relationship => false,
            _ if ty == DataType::Null => true,
            ArgType::Number => ty == DataType::Number,
            ArgType::String => ty == DataType::String,
            ArgType::Boolean => ty == DataType::Boolean,
            ArgType::Date => ty == DataType::Date,
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::Number => "number",
            ArgType::String => "string",
            ArgType::Boolean => "boolean",
            ArgType::Date => "date",
            ArgType::Any => "any",
            ArgType::Relationship => "relationship",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
    pub optional: bool,
    pub variadic: bool,
}

/// How the return type of a call is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    /// Always this type
    Fixed(DataType),
    /// Computed by the function's special handling from its arguments
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub category: FunctionCategory,
    pub description: &'static str,
    pub args: &'static [ArgSpec],
    pub returns: Returns,
    pub min_args: Option<usize>,
    pub max_args: Option<usize>,
    pub special: bool,
}

impl FunctionSpec {
    /// Fewest arguments accepted.
    pub fn min_arity(&self) -> usize {
        self.min_args
            .unwrap_or_else(|| self.args.iter().filter(|a| !a.optional).count())
    }

    /// Most arguments accepted; `None` for variadic functions.
    pub fn max_arity(&self) -> Option<usize> {
        if self.max_args.is_some() {
            return self.max_args;
        }
        if self.args.iter().any(|a| a.variadic) {
            None
        } else {
            Some(self.args.len())
        }
    }

    /// Spec of the argument at `index`, repeating the last one for variadics.
    pub fn arg(&self, index: usize) -> Option<&ArgSpec> {
        self.args.get(index).or_else(|| {
            self.args.last().filter(|last| last.variadic)
        })
    }

    /// Human readable signature, e.g. `ROUND(value: number, digits?: number)`.
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                let marker = if a.variadic {
                    "..."
                } else if a.optional {
                    "?"
                } else {
                    ""
                };
                format!("{}{}: {}", a.name, marker, a.ty)
            })
            .collect();
        format!("{}({})", self.name, args.join(", "))
    }
}

const fn arg(name: &'static str, ty: ArgType) -> ArgSpec {
    ArgSpec {
        name,
        ty,
        optional: false,
        variadic: false,
    }
}

const fn optional(name: &'static str, ty: ArgType) -> ArgSpec {
    ArgSpec {
        name,
        ty,
        optional: true,
        variadic: false,
    }
}

const fn variadic(name: &'static str, ty: ArgType) -> ArgSpec {
    ArgSpec {
        name,
        ty,
        optional: false,
        variadic: true,
    }
}

const fn standard(
    name: &'static str,
    category: FunctionCategory,
    description: &'static str,
    args: &'static [ArgSpec],
    returns: DataType,
) -> FunctionSpec {
    FunctionSpec {
        name,
        category,
        description,
        args,
        returns: Returns::Fixed(returns),
        min_args: None,
        max_args: None,
        special: false,
    }
}

const fn special(
    name: &'static str,
    category: FunctionCategory,
    description: &'static str,
    args: &'static [ArgSpec],
    returns: Returns,
    min_args: Option<usize>,
) -> FunctionSpec {
    FunctionSpec {
        name,
        category,
        description,
        args,
        returns,
        min_args,
        max_args: None,
        special: true,
    }
}

use ArgType as A;
use DataType as T;
use FunctionCategory as C;

static FUNCTIONS: &[FunctionSpec] = &[
    // Math
    standard("ABS", C::Math, "Absolute value of a number.", &[arg("value", A::Number)], T::Number),
    standard(
        "ROUND",
        C::Math,
        "Rounds a number to the given number of decimal places (default 0).",
        &[arg("value", A::Number), optional("digits", A::Number)],
        T::Number,
    ),
    standard(
        "CEILING",
        C::Math,
        "Smallest integer not less than the value.",
        &[arg("value", A::Number)],
        T::Number,
    ),
    standard(
        "FLOOR",
        C::Math,
        "Largest integer not greater than the value.",
        &[arg("value", A::Number)],
        T::Number,
    ),
    standard(
        "POWER",
        C::Math,
        "Raises a number to a power.",
        &[arg("base", A::Number), arg("exponent", A::Number)],
        T::Number,
    ),
    standard("SQRT", C::Math, "Square root of a number.", &[arg("value", A::Number)], T::Number),
    // Text
    standard(
        "UPPER",
        C::Text,
        "Converts text to upper case.",
        &[arg("text", A::String)],
        T::String,
    ),
    standard(
        "LOWER",
        C::Text,
        "Converts text to lower case.",
        &[arg("text", A::String)],
        T::String,
    ),
    standard(
        "TRIM",
        C::Text,
        "Removes leading and trailing spaces.",
        &[arg("text", A::String)],
        T::String,
    ),
    standard(
        "LEN",
        C::Text,
        "Number of characters in the text.",
        &[arg("text", A::String)],
        T::Number,
    ),
    standard(
        "LEFT",
        C::Text,
        "First characters of the text.",
        &[arg("text", A::String), arg("count", A::Number)],
        T::String,
    ),
    standard(
        "RIGHT",
        C::Text,
        "Last characters of the text.",
        &[arg("text", A::String), arg("count", A::Number)],
        T::String,
    ),
    standard(
        "CONTAINS",
        C::Text,
        "True if the text contains the search string.",
        &[arg("text", A::String), arg("search", A::String)],
        T::Boolean,
    ),
    standard("STRING", C::Text, "Converts any value to text.", &[arg("value", A::Any)], T::String),
    // Logical
    special(
        "IF",
        C::Logical,
        "Returns the second argument when the condition holds, otherwise the third (or NULL).",
        &[arg("condition", A::Boolean), arg("then", A::Any), optional("else", A::Any)],
        Returns::Inferred,
        None,
    ),
    special(
        "AND",
        C::Logical,
        "True when every argument is true.",
        &[variadic("conditions", A::Boolean)],
        Returns::Fixed(T::Boolean),
        Some(2),
    ),
    special(
        "OR",
        C::Logical,
        "True when any argument is true.",
        &[variadic("conditions", A::Boolean)],
        Returns::Fixed(T::Boolean),
        Some(2),
    ),
    standard("NOT", C::Logical, "Negates a boolean.", &[arg("value", A::Boolean)], T::Boolean),
    standard(
        "ISNULL",
        C::Logical,
        "True when the value is NULL.",
        &[arg("value", A::Any)],
        T::Boolean,
    ),
    special(
        "NULLVALUE",
        C::Logical,
        "Returns the value, or the default when the value is NULL.",
        &[arg("value", A::Any), arg("default", A::Any)],
        Returns::Inferred,
        None,
    ),
    // Date
    standard("TODAY", C::Date, "The current date.", &[], T::Date),
    standard("YEAR", C::Date, "Year of a date.", &[arg("date", A::Date)], T::Number),
    standard("MONTH", C::Date, "Month of a date (1-12).", &[arg("date", A::Date)], T::Number),
    standard("DAY", C::Date, "Day of the month of a date.", &[arg("date", A::Date)], T::Number),
    special(
        "DATEDIF",
        C::Date,
        "Difference between two dates in \"days\", \"months\" or \"years\".",
        &[arg("start", A::Date), arg("end", A::Date), arg("unit", A::String)],
        Returns::Fixed(T::Number),
        None,
    ),
    // Aggregates
    special(
        "STRING_AGG",
        C::Aggregate,
        "Joins the text values of related rows with a delimiter.",
        &[
            arg("relationship", A::Relationship),
            arg("expression", A::String),
            arg("delimiter", A::String),
        ],
        Returns::Fixed(T::String),
        None,
    ),
    special(
        "STRING_AGG_DISTINCT",
        C::Aggregate,
        "Joins the distinct text values of related rows with a delimiter.",
        &[
            arg("relationship", A::Relationship),
            arg("expression", A::String),
            arg("delimiter", A::String),
        ],
        Returns::Fixed(T::String),
        None,
    ),
    special(
        "SUM_AGG",
        C::Aggregate,
        "Sum of an expression over related rows (0 when there are none).",
        &[arg("relationship", A::Relationship), arg("expression", A::Number)],
        Returns::Fixed(T::Number),
        None,
    ),
    special(
        "COUNT_AGG",
        C::Aggregate,
        "Number of related rows where the expression is not NULL.",
        &[arg("relationship", A::Relationship), arg("expression", A::Any)],
        Returns::Fixed(T::Number),
        None,
    ),
    special(
        "AVG_AGG",
        C::Aggregate,
        "Average of an expression over related rows.",
        &[arg("relationship", A::Relationship), arg("expression", A::Number)],
        Returns::Fixed(T::Number),
        None,
    ),
    special(
        "MIN_AGG",
        C::Aggregate,
        "Smallest value of an expression over related rows.",
        &[arg("relationship", A::Relationship), arg("expression", A::Any)],
        Returns::Inferred,
        None,
    ),
    special(
        "MAX_AGG",
        C::Aggregate,
        "Largest value of an expression over related rows.",
        &[arg("relationship", A::Relationship), arg("expression", A::Any)],
        Returns::Inferred,
        None,
    ),
    special(
        "AND_AGG",
        C::Aggregate,
        "True when the condition holds for every related row.",
        &[arg("relationship", A::Relationship), arg("condition", A::Boolean)],
        Returns::Fixed(T::Boolean),
        None,
    ),
    special(
        "OR_AGG",
        C::Aggregate,
        "True when the condition holds for any related row.",
        &[arg("relationship", A::Relationship), arg("condition", A::Boolean)],
        Returns::Fixed(T::Boolean),
        None,
    ),
];

/// Every known function, in table order.
pub fn all() -> &'static [FunctionSpec] {
    FUNCTIONS
}

/// Look up a function by name (case-insensitive).
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

/// True for the `*_AGG` family.
pub fn is_aggregate(name: &str) -> bool {
    lookup(name).is_some_and(|f| f.category == FunctionCategory::Aggregate)
}

/// Edit distance at which a known name still counts as a suggestion.
const SUGGESTION_DISTANCE: usize = 3;

/// Known function names close to `name`, nearest first. Aggregates are also
/// matched on their stem, so `SUMM` finds `SUM_AGG`.
pub fn suggestions(name: &str) -> Vec<&'static str> {
    let upper = name.to_ascii_uppercase();
    let mut ranked: Vec<(usize, &'static str)> = FUNCTIONS
        .iter()
        .map(|f| {
            let stem = f.name.strip_suffix("_AGG").unwrap_or(f.name);
            let distance =
                strsim::levenshtein(&upper, f.name).min(strsim::levenshtein(&upper, stem));
            (distance, f.name)
        })
        .filter(|(distance, _)| *distance <= SUGGESTION_DISTANCE)
        .collect();
    ranked.sort_by_key(|(distance, _)| *distance);
    ranked.into_iter().map(|(_, name)| name).collect()
}
