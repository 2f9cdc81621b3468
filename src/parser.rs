use std::{fmt, mem, sync::LazyLock};

use chrono::NaiveDate;
use regex::Regex;

use crate::{
    ast::{BinOp, Expr, ExprKind, Token, TokenKind, UnaryOp},
    functions,
    lexer::{LexError, Lexer, Position},
};

/// Suffix marking an identifier as a many-to-one relationship.
pub const RELATIONSHIP_SUFFIX: &str = "_REL";

static DATE_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern"));

/// Errors raised while building the AST.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The lexer failed before the parser could continue
    Lex(LexError),

    /// A token that does not fit the grammar at this point
    UnexpectedToken {
        expected: String,
        found: String,
        position: Position,
    },

    /// Two operators in a row, e.g. `1 + * 2` or `- -x`
    ConsecutiveOperators {
        first: String,
        second: String,
        position: Position,
    },

    /// `+x` is not supported
    UnsupportedUnaryPlus { position: Position },

    /// `(` without a matching `)`
    UnclosedParenthesis { position: Position },

    /// Tokens left over after a complete formula
    TrailingInput { found: String, position: Position },

    /// `DATE("...")` with a value that is not a real `YYYY-MM-DD` date
    InvalidDateLiteral { value: String, position: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lex(e) => e.position,
            ParseError::UnexpectedToken { position, .. }
            | ParseError::ConsecutiveOperators { position, .. }
            | ParseError::UnsupportedUnaryPlus { position }
            | ParseError::UnclosedParenthesis { position }
            | ParseError::TrailingInput { position, .. }
            | ParseError::InvalidDateLiteral { position, .. } => *position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(e) => write!(f, "{}", e),
            ParseError::UnexpectedToken {
                expected,
                found,
                position,
            } => write!(f, "Expected {}, got {} at {}", expected, found, position),
            ParseError::ConsecutiveOperators {
                first,
                second,
                position,
            } => write!(
                f,
                "Consecutive operators {} and {} at {}; use parentheses to make the intent explicit",
                first, second, position
            ),
            ParseError::UnsupportedUnaryPlus { position } => {
                write!(f, "Unary '+' is not supported (at {})", position)
            }
            ParseError::UnclosedParenthesis { position } => {
                write!(f, "Unclosed parenthesis opened at {}", position)
            }
            ParseError::TrailingInput { found, position } => write!(
                f,
                "Unexpected {} after end of formula at {}",
                found, position
            ),
            ParseError::InvalidDateLiteral { value, position } => write!(
                f,
                "Invalid date literal \"{}\" at {}; expected YYYY-MM-DD",
                value, position
            ),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Lex(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError::Lex(e)
    }
}

pub struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    pub fn new(mut lexer: Lexer) -> Result<Self, ParseError> {
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token()?;
        Ok(mem::replace(&mut self.current_token, next))
    }

    fn check(&self, kind: &TokenKind) -> bool {
        mem::discriminant(&self.current_token.kind) == mem::discriminant(kind)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current_token.kind.describe(),
            position: self.current_token.position,
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if !self.check(&kind) {
            return Err(self.unexpected(expected));
        }
        self.advance()
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<String, ParseError> {
        match &self.current_token.kind {
            TokenKind::Identifier(_) => match self.advance()?.kind {
                TokenKind::Identifier(name) => Ok(name),
                _ => unreachable!(),
            },
            _ => Err(self.unexpected(expected)),
        }
    }

    /// Rejects an operator that directly follows another one.
    fn reject_consecutive(&self, previous: &TokenKind) -> Result<(), ParseError> {
        if self.current_token.kind.is_operator() {
            return Err(ParseError::ConsecutiveOperators {
                first: previous.describe(),
                second: self.current_token.kind.describe(),
                position: self.current_token.position,
            });
        }
        Ok(())
    }

    /// Parse a complete formula; the whole input must be consumed.
    pub fn parse(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_comparison()?;
        if !self.check(&TokenKind::Eof) {
            return Err(ParseError::TrailingInput {
                found: self.current_token.kind.describe(),
                position: self.current_token.position,
            });
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match &self.current_token.kind {
                TokenKind::Eq => BinOp::Equal,
                TokenKind::NotEq | TokenKind::LtGt => BinOp::NotEqual,
                TokenKind::Lt => BinOp::LessThan,
                TokenKind::Gt => BinOp::GreaterThan,
                TokenKind::LtEq => BinOp::LessEqual,
                TokenKind::GtEq => BinOp::GreaterEqual,
                _ => break,
            };

            let operator = self.advance()?;
            self.reject_consecutive(&operator.kind)?;
            let right = self.parse_additive()?;

            let position = left.position;
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            );
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current_token.kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Subtract,
                TokenKind::Ampersand => BinOp::Concat,
                _ => break,
            };

            let operator = self.advance()?;
            self.reject_consecutive(&operator.kind)?;
            let right = self.parse_multiplicative()?;

            let position = left.position;
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            );
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;

        loop {
            let op = match &self.current_token.kind {
                TokenKind::Star => BinOp::Multiply,
                TokenKind::Slash => BinOp::Divide,
                _ => break,
            };

            let operator = self.advance()?;
            self.reject_consecutive(&operator.kind)?;
            let right = self.parse_factor()?;

            let position = left.position;
            left = Expr::new(
                ExprKind::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            );
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let position = self.current_token.position;

        match &self.current_token.kind {
            TokenKind::Minus => {
                let operator = self.advance()?;
                self.reject_consecutive(&operator.kind)?;
                let operand = self.parse_factor()?;
                Ok(Expr::new(
                    ExprKind::UnaryOp {
                        op: UnaryOp::Negate,
                        operand: Box::new(operand),
                    },
                    position,
                ))
            }
            TokenKind::Plus => Err(ParseError::UnsupportedUnaryPlus { position }),
            TokenKind::Number(n) => {
                let n = *n;
                self.advance()?;
                Ok(Expr::new(ExprKind::Number(n), position))
            }
            TokenKind::String(_) => match self.advance()?.kind {
                TokenKind::String(s) => Ok(Expr::new(ExprKind::String(s), position)),
                _ => unreachable!(),
            },
            TokenKind::Identifier(_) => {
                let name = self.expect_identifier("identifier")?;
                self.parse_identifier(name, position)
            }
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_comparison()?;
                if !self.check(&TokenKind::RParen) {
                    if self.check(&TokenKind::Eof) {
                        return Err(ParseError::UnclosedParenthesis { position });
                    }
                    return Err(self.unexpected("')'"));
                }
                self.advance()?;
                Ok(expr)
            }
            _ => Err(self.unexpected("a number, string, identifier or '('")),
        }
    }

    /// Continues after an identifier: function call, relationship chain,
    /// literal keyword, or plain column.
    fn parse_identifier(&mut self, name: String, position: Position) -> Result<Expr, ParseError> {
        if self.check(&TokenKind::LParen) {
            return self.parse_call(name, position);
        }

        if name.ends_with(RELATIONSHIP_SUFFIX) && self.check(&TokenKind::Dot) {
            return self.parse_relationship_ref(name, position);
        }

        let kind = match name.as_str() {
            "TRUE" => ExprKind::Boolean(true),
            "FALSE" => ExprKind::Boolean(false),
            "NULL" => ExprKind::Null,
            _ => ExprKind::Identifier(name),
        };
        Ok(Expr::new(kind, position))
    }

    fn parse_relationship_ref(
        &mut self,
        first: String,
        position: Position,
    ) -> Result<Expr, ParseError> {
        let mut chain = vec![first];

        loop {
            self.expect(TokenKind::Dot, "'.'")?;
            let name = self.expect_identifier("relationship or field name after '.'")?;

            if name.ends_with(RELATIONSHIP_SUFFIX) && self.check(&TokenKind::Dot) {
                chain.push(name);
            } else {
                return Ok(Expr::new(
                    ExprKind::RelationshipRef {
                        chain,
                        field: Some(name),
                    },
                    position,
                ));
            }
        }
    }

    fn parse_call(&mut self, name: String, position: Position) -> Result<Expr, ParseError> {
        let open = self.advance()?; // Consume '('
        let mut args = Vec::new();

        if !self.check(&TokenKind::RParen) {
            if functions::is_aggregate(&name) && self.is_path_argument() {
                args.push(self.parse_path()?);
            } else {
                args.push(self.parse_comparison()?);
            }

            while self.check(&TokenKind::Comma) {
                self.advance()?;
                args.push(self.parse_comparison()?);
            }
        }

        if !self.check(&TokenKind::RParen) {
            if self.check(&TokenKind::Eof) {
                return Err(ParseError::UnclosedParenthesis {
                    position: open.position,
                });
            }
            return Err(self.unexpected("',' or ')'"));
        }
        self.advance()?;

        if name == "DATE"
            && let [arg] = args.as_slice()
            && let ExprKind::String(value) = &arg.kind
        {
            let value = validate_date(value, arg.position)?;
            return Ok(Expr::new(ExprKind::Date(value), position));
        }

        Ok(Expr::new(ExprKind::FunctionCall { name, args }, position))
    }

    /// An aggregate's first argument is a path when it starts with a plain
    /// identifier; anything else is parsed as an expression and rejected
    /// later by the compiler.
    fn is_path_argument(&self) -> bool {
        matches!(&self.current_token.kind, TokenKind::Identifier(_))
    }

    fn parse_path(&mut self) -> Result<Expr, ParseError> {
        let position = self.current_token.position;
        let mut segments = vec![self.expect_identifier("relationship name")?];

        while self.check(&TokenKind::Dot) {
            self.advance()?;
            segments.push(self.expect_identifier("relationship name after '.'")?);
        }

        Ok(Expr::new(ExprKind::Path(segments), position))
    }
}

fn validate_date(value: &str, position: Position) -> Result<String, ParseError> {
    let invalid = || ParseError::InvalidDateLiteral {
        value: value.to_string(),
        position,
    };

    // chrono accepts unpadded fields, the literal form does not
    if !DATE_LITERAL.is_match(value) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())?;
    Ok(value.to_string())
}

/// Tokenize and parse a formula in one step.
pub fn parse_formula(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(Lexer::new(input))?;
    parser.parse()
}
