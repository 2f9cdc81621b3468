use std::fmt;

use crate::ast::{Token, TokenKind};

/// Location of a character in the formula source.
///
/// `offset` counts characters from the start of the input (0-based);
/// `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Position {
            offset,
            line,
            column,
        }
    }

    /// Position of the first character of the input.
    pub fn start() -> Self {
        Position::new(0, 1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Errors raised while splitting a formula into tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexErrorKind {
    /// Character that cannot start any token
    UnexpectedCharacter(char),

    /// String literal without a closing quote
    UnterminatedString,

    /// `/*` without a matching `*/`
    UnterminatedComment,

    /// Digits that do not form a valid number
    InvalidNumber(String),
}

impl LexError {
    pub fn new(kind: LexErrorKind, position: Position) -> Self {
        LexError { kind, position }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LexErrorKind::UnexpectedCharacter(ch) => {
                write!(f, "Unexpected character '{}' at {}", ch, self.position)
            }
            LexErrorKind::UnterminatedString => write!(
                f,
                "Unterminated string: missing closing quote (at {})",
                self.position
            ),
            LexErrorKind::UnterminatedComment => write!(
                f,
                "Unterminated block comment: missing closing '*/' (at {})",
                self.position
            ),
            LexErrorKind::InvalidNumber(text) => {
                write!(f, "Invalid number '{}' at {}", text, self.position)
            }
        }
    }
}

impl std::error::Error for LexError {}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn here(&self) -> Position {
        Position::new(self.position, self.line, self.column)
    }

    /// Skips whitespace, `//` line comments and `/* */` block comments.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.current_char(), self.peek_char(1)) {
                (Some(ch), _) if ch.is_whitespace() => self.advance(),
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.current_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    self.advance();
                    self.advance();
                    loop {
                        match (self.current_char(), self.peek_char(1)) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => self.advance(),
                            (None, _) => {
                                return Err(LexError::new(
                                    LexErrorKind::UnterminatedComment,
                                    self.here(),
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                result.push(ch.to_ascii_uppercase());
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_string(&mut self) -> Result<String, LexError> {
        let start = self.here();
        let mut result = String::new();
        self.advance(); // Consume opening quote

        while let Some(ch) = self.current_char() {
            self.advance();
            if ch == '"' {
                return Ok(result);
            }
            result.push(ch);
        }

        Err(LexError::new(LexErrorKind::UnterminatedString, start))
    }

    fn read_number(&mut self) -> Result<TokenKind, LexError> {
        let start = self.here();
        let mut number = String::new();

        while let Some(ch) = self.current_char().filter(|c| c.is_ascii_digit()) {
            number.push(ch);
            self.advance();
        }

        // A fraction needs at least one digit after the dot
        if self.current_char() == Some('.')
            && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
        {
            number.push('.');
            self.advance();
            while let Some(ch) = self.current_char().filter(|c| c.is_ascii_digit()) {
                number.push(ch);
                self.advance();
            }
        }

        number
            .parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| LexError::new(LexErrorKind::InvalidNumber(number.clone()), start))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        self.advance();
        kind
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let start = self.here();

        let kind = match self.current_char() {
            None => TokenKind::Eof,
            Some('+') => self.single(TokenKind::Plus),
            Some('-') => self.single(TokenKind::Minus),
            Some('*') => self.single(TokenKind::Star),
            Some('/') => self.single(TokenKind::Slash),
            Some('&') => self.single(TokenKind::Ampersand),
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some(',') => self.single(TokenKind::Comma),
            Some('.') => self.single(TokenKind::Dot),
            Some('=') => self.single(TokenKind::Eq),
            Some('>') => {
                if self.peek_char(1) == Some('=') {
                    self.double(TokenKind::GtEq)
                } else {
                    self.single(TokenKind::Gt)
                }
            }
            Some('<') => match self.peek_char(1) {
                Some('=') => self.double(TokenKind::LtEq),
                Some('>') => self.double(TokenKind::LtGt),
                _ => self.single(TokenKind::Lt),
            },
            Some('!') => {
                if self.peek_char(1) == Some('=') {
                    self.double(TokenKind::NotEq)
                } else {
                    return Err(LexError::new(
                        LexErrorKind::UnexpectedCharacter('!'),
                        start,
                    ));
                }
            }
            Some('"') => TokenKind::String(self.read_string()?),
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {
                TokenKind::Identifier(self.read_identifier())
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number()?,
            Some(ch) => {
                return Err(LexError::new(
                    LexErrorKind::UnexpectedCharacter(ch),
                    start,
                ));
            }
        };

        Ok(Token::new(kind, start))
    }

    /// Collects every token up to and including `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}
