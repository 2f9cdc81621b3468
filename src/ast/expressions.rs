use crate::{
    ast::{BinOp, UnaryOp},
    lexer::Position,
};

/// A parsed formula node together with the position of its first token.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub position: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, position: Position) -> Self {
        Expr { kind, position }
    }
}

/// Abstract Syntax Tree node kinds.
///
/// The AST is built once per formula by the parser and handed to the
/// semantic compiler, which never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    /// Numeric literal
    ///
    /// # Example
    /// ```text
    /// 42.5
    /// ```
    Number(f64),

    /// String literal
    ///
    /// # Example
    /// ```text
    /// "hello"
    /// ```
    String(String),

    /// Boolean literal (`TRUE` / `FALSE`)
    Boolean(bool),

    /// Null literal (`NULL`)
    Null,

    /// Date literal in ISO form, produced from `DATE("2024-01-31")`
    Date(String),

    // References
    /// Column of the current table
    ///
    /// Names are upper-cased; lookup against the schema is case-insensitive.
    Identifier(String),

    /// Column reached through one or more direct relationships
    ///
    /// # Examples
    /// ```text
    /// merchant_rel.name               // chain: [MERCHANT_REL], field: NAME
    /// merchant_rel.country_rel.code   // chain: [MERCHANT_REL, COUNTRY_REL], field: CODE
    /// ```
    RelationshipRef {
        chain: Vec<String>,
        field: Option<String>,
    },

    /// Dot-separated inverse relationship path, only valid as the first
    /// argument of an aggregate function
    ///
    /// # Examples
    /// ```text
    /// SUM_AGG(orders, amount)              // Path([ORDERS])
    /// SUM_AGG(orders.line_items, quantity) // Path([ORDERS, LINE_ITEMS])
    /// ```
    Path(Vec<String>),

    // Operations
    /// Prefix operation
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// Binary operation (arithmetic, concatenation, comparison)
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Function call
    ///
    /// # Examples
    /// ```text
    /// ROUND(amount, 2)
    /// IF(amount > 100, "big", "small")
    /// ```
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
}
