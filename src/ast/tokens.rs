use crate::lexer::Position;

/// A lexical token paired with the position where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, position: Position) -> Self {
        Token { kind, position }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Numeric literal, always parsed as floating point
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3.14
    /// ```
    Number(f64),

    /// String literal enclosed in double quotes
    ///
    /// No escape sequences are processed.
    ///
    /// # Examples
    /// ```text
    /// "hello"
    /// ", "
    /// ```
    String(String),

    // Identifiers
    /// Column, function, or relationship name
    ///
    /// Upper-cased by the lexer. `TRUE`, `FALSE` and `NULL` also arrive as
    /// identifiers and are reinterpreted by the parser.
    ///
    /// # Examples
    /// ```text
    /// revenue          // Identifier("REVENUE")
    /// merchant_rel     // Identifier("MERCHANT_REL")
    /// SUM_AGG          // Identifier("SUM_AGG")
    /// ```
    Identifier(String),

    // Comparison
    /// Equality operator (`=`)
    Eq,

    /// Inequality operator (`!=`)
    NotEq,

    /// Inequality operator (`<>`)
    LtGt,

    /// Less than
    Lt,

    /// Greater than
    Gt,

    /// Less than or equal
    LtEq,

    /// Greater than or equal
    GtEq,

    // Arithmetic
    /// Addition
    Plus,

    /// Subtraction or unary negation
    Minus,

    /// Multiplication
    Star,

    /// Division
    Slash,

    /// String concatenation
    ///
    /// # Examples
    /// ```text
    /// first_name & " " & last_name
    /// ```
    Ampersand,

    // Delimiters
    /// Left parenthesis for grouping or function calls
    LParen,

    /// Right parenthesis
    RParen,

    /// Comma separating function arguments
    Comma,

    /// Dot separating relationship links and fields
    ///
    /// # Examples
    /// ```text
    /// merchant_rel.name
    /// SUM_AGG(orders.line_items, quantity)
    /// ```
    Dot,

    /// End of input
    Eof,
}

impl TokenKind {
    /// True for tokens that can only appear between two operands.
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::NotEq
                | TokenKind::LtGt
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::LtEq
                | TokenKind::GtEq
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Ampersand
        )
    }

    /// Short human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::String(s) => format!("string \"{}\"", s),
            TokenKind::Identifier(name) => format!("identifier '{}'", name),
            TokenKind::Eq => "'='".to_string(),
            TokenKind::NotEq => "'!='".to_string(),
            TokenKind::LtGt => "'<>'".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::LtEq => "'<='".to_string(),
            TokenKind::GtEq => "'>='".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Ampersand => "'&'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}
