//! # Formula Language - Abstract Syntax Tree
//!
//! This module defines the Abstract Syntax Tree (AST) for the formula
//! language: an Excel-like expression language evaluated per row of a base
//! table, with access to related tables and aggregates over child rows.
//!
//! ## Architecture Overview
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, references, operations, calls)
//! - **[operators]** - Unary and binary operators
//!
//! ## Quick Start
//!
//! ```text
//! IF(amount > 100, merchant_rel.name & " (large)", merchant_rel.name)
//! ```
//!
//! ## Core Concepts
//!
//! ### Columns
//!
//! A bare identifier names a column of the current table. Lookup is
//! case-insensitive: `Revenue`, `REVENUE` and `revenue` are the same column.
//!
//! ### Relationship References
//!
//! Identifiers ending in `_rel` followed by `.` walk a many-to-one
//! relationship. Chains can be several links deep:
//!
//! ```text
//! merchant_rel.name
//! merchant_rel.country_rel.code
//! ```
//!
//! ### Aggregates
//!
//! Functions in the `*_AGG` family fold an expression over the rows of an
//! inverse (one-to-many) relationship. Their first argument is a plain path:
//!
//! ```text
//! SUM_AGG(orders, amount)
//! STRING_AGG(orders.line_items, product_rel.name, ", ")
//! ```
//!
//! ### Precedence
//!
//! From loosest to tightest: comparisons, `+ - &`, `* /`, unary `-`.
//! Two operators in a row are rejected; write `1 - (-2)` instead of `1 - -2`.
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{Expr, ExprKind};
pub use operators::{BinOp, UnaryOp};
pub use tokens::{Token, TokenKind};
