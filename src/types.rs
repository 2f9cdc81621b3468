use std::fmt;

/// The type of a column or a compiled expression.
///
/// # Type Rules
///
/// - `Number op Number` is `Number` for `+ - * /`
/// - `Date ± Number` is `Date`, `Date - Date` is `Number` (days)
/// - `String & String` is `String`; other operands must be cast with `STRING()`
/// - Comparisons need equal types (or a `Null` side) and yield `Boolean`
///
/// # Examples
///
/// ```
/// use formula_sql::DataType;
///
/// assert_eq!(DataType::parse("text"), Some(DataType::String));
/// assert_eq!(DataType::parse("TIMESTAMP"), Some(DataType::Date));
/// assert_eq!(DataType::Number.to_string(), "number");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Number,
    String,
    Boolean,
    Date,
    /// The type of the `NULL` literal; compatible with every other type
    Null,
}

impl DataType {
    /// Parse a schema type name. Accepts the common SQL spellings.
    pub fn parse(name: &str) -> Option<DataType> {
        match name.trim().to_ascii_lowercase().as_str() {
            "number" | "numeric" | "integer" | "int" | "bigint" | "decimal" | "float"
            | "double" => Some(DataType::Number),
            "string" | "text" | "varchar" | "char" | "uuid" => Some(DataType::String),
            "boolean" | "bool" => Some(DataType::Boolean),
            "date" | "timestamp" | "datetime" | "timestamptz" => Some(DataType::Date),
            "null" => Some(DataType::Null),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Number => "number",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Null => "null",
        }
    }

    /// Two types are compatible if they are equal or either is `Null`.
    pub fn is_compatible(self, other: DataType) -> bool {
        self == other || self == DataType::Null || other == DataType::Null
    }

    /// The non-null type of a compatible pair.
    pub fn unify(self, other: DataType) -> DataType {
        if self == DataType::Null { other } else { self }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
