//! Compiles spreadsheet-style formulas into PostgreSQL.
//!
//! The pipeline is lexer -> parser -> semantic compiler -> assembler. A
//! formula is compiled against a [`SchemaContext`] into SQL-agnostic intents
//! ([`CompilationResult`]); any number of compiled formulas over the same
//! base table are then assembled into one `SELECT` with shared joins and
//! aggregate subqueries.
//!
//! ```
//! use formula_sql::{assemble, compile, DataType, SchemaContext};
//! use indexmap::IndexMap;
//!
//! let schema = SchemaContext::new("transactions")
//!     .with_column("revenue", DataType::Number)
//!     .with_column("cost", DataType::Number);
//!
//! let mut fields = IndexMap::new();
//! fields.insert("margin".to_string(), compile("revenue - cost", &schema).unwrap());
//!
//! let query = assemble(&fields, "transactions").unwrap();
//! assert!(query.query.contains(r#"("s"."revenue" - "s"."cost") AS "margin""#));
//! ```

pub mod assembler;
pub mod ast;
pub mod compiler;
pub mod error;
pub mod functions;
pub mod intent;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use assembler::{AssembledQuery, AssemblyError, assemble};
pub use ast::{BinOp, Expr, ExprKind, Token, TokenKind, UnaryOp};
pub use compiler::{CompilerOptions, compile, compile_expr, compile_with_options};
pub use error::{CompileError, SemanticError, SemanticErrorKind};
pub use intent::{
    AggregateFunction, AggregateIntent, CompilationContext, CompilationResult, ExpressionIntent,
    IntentKind, JoinIntent,
};
pub use lexer::{LexError, Lexer, Position};
pub use parser::{ParseError, Parser, parse_formula};
pub use schema::{RelationshipInfo, SchemaContext, SchemaError};
pub use types::DataType;
