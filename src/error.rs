//! Errors for the compile pipeline.

use std::fmt;

use crate::{
    lexer::{LexError, Position},
    parser::ParseError,
};

/// Most alternatives listed in a semantic error.
pub const MAX_SUGGESTIONS: usize = 10;

/// A formula that parses but does not make sense against the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SemanticErrorKind {
    UnknownColumn {
        column: String,
        table: String,
        available: Vec<String>,
    },
    UnknownRelationship {
        name: String,
        table: String,
        available: Vec<String>,
    },
    UnknownField {
        field: String,
        relationship: String,
        table: String,
        available: Vec<String>,
    },
    ArityError {
        function: String,
        expected: String,
        found: usize,
    },
    TypeError(String),
    UnknownFunction {
        name: String,
        suggestions: Vec<String>,
    },
    /// Aggregate relationship path longer than the configured maximum
    ChainTooDeep {
        path: String,
        depth: usize,
        max: usize,
    },
}

impl SemanticError {
    pub fn new(kind: SemanticErrorKind, position: Position) -> Self {
        SemanticError { kind, position }
    }

    pub fn type_error(message: impl Into<String>, position: Position) -> Self {
        SemanticError::new(SemanticErrorKind::TypeError(message.into()), position)
    }
}

/// Keep at most [`MAX_SUGGESTIONS`] names.
pub fn truncate_suggestions<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    names.take(MAX_SUGGESTIONS).map(str::to_string).collect()
}

fn list(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SemanticErrorKind::UnknownColumn {
                column,
                table,
                available,
            } => write!(
                f,
                "Unknown column '{}' in table '{}' at {}. Available columns: {}",
                column,
                table,
                self.position,
                list(available)
            ),
            SemanticErrorKind::UnknownRelationship {
                name,
                table,
                available,
            } => write!(
                f,
                "Unknown relationship '{}' on table '{}' at {}. Available relationships: {}",
                name,
                table,
                self.position,
                list(available)
            ),
            SemanticErrorKind::UnknownField {
                field,
                relationship,
                table,
                available,
            } => write!(
                f,
                "Unknown field '{}' on '{}' (table '{}') at {}. Available columns: {}",
                field,
                relationship,
                table,
                self.position,
                list(available)
            ),
            SemanticErrorKind::ArityError {
                function,
                expected,
                found,
            } => write!(
                f,
                "{} expects {} argument(s), got {} at {}",
                function, expected, found, self.position
            ),
            SemanticErrorKind::TypeError(message) => {
                write!(f, "Type error at {}: {}", self.position, message)
            }
            SemanticErrorKind::UnknownFunction { name, suggestions } => {
                write!(f, "Unknown function '{}' at {}", name, self.position)?;
                if !suggestions.is_empty() {
                    write!(f, ". Did you mean: {}", suggestions.join(", "))?;
                }
                Ok(())
            }
            SemanticErrorKind::ChainTooDeep { path, depth, max } => write!(
                f,
                "Relationship path '{}' is {} levels deep at {}; at most {} levels are allowed",
                path, depth, self.position, max
            ),
        }
    }
}

impl std::error::Error for SemanticError {}

/// Any failure while compiling a single formula.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Semantic(SemanticError),
}

impl CompileError {
    pub fn position(&self) -> Position {
        match self {
            CompileError::Lex(e) => e.position,
            CompileError::Parse(e) => e.position(),
            CompileError::Semantic(e) => e.position,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "Syntax error: {}", e),
            CompileError::Parse(e) => write!(f, "Parse error: {}", e),
            CompileError::Semantic(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Lex(e) => Some(e),
            CompileError::Parse(e) => Some(e),
            CompileError::Semantic(e) => Some(e),
        }
    }
}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Lex(e) => CompileError::Lex(e),
            e => CompileError::Parse(e),
        }
    }
}

impl From<SemanticError> for CompileError {
    fn from(e: SemanticError) -> Self {
        CompileError::Semantic(e)
    }
}
