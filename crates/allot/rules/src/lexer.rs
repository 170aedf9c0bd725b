//! Lexer: tokenizes rule source text
//!
//! Produces a stream of tokens that the parser consumes. Handles
//! keywords, identifiers, string literals, integers, operators and
//! structural tokens. `#` and `//` start line comments.

use crate::errors::{RuleError, RuleResult};

/// A token produced by the lexer
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The raw text of the token (unescaped for string literals)
    pub text: String,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            col,
        }
    }
}

/// Token types
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Language,
    Fn,
    If,
    Else,
    Require,
    Error,
    Warn,
    Fail,
    CreatePool,
    Quantity,
    Record,
    Select,
    Where,
    Order,
    By,
    Asc,
    Desc,
    Return,
    True,
    False,
    None,
    Now,

    // Identifiers and literals
    Identifier,
    StringLiteral,
    NumberLiteral,

    // Structural
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Dot,
    Comma,
    Assign,

    // Operators
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Plus,
    Minus,

    // End of input
    Eof,
}

impl TokenKind {
    /// Keywords and identifiers; anything usable as a field name.
    pub fn is_word(&self) -> bool {
        !matches!(
            self,
            Self::StringLiteral
                | Self::NumberLiteral
                | Self::OpenBrace
                | Self::CloseBrace
                | Self::OpenParen
                | Self::CloseParen
                | Self::OpenBracket
                | Self::CloseBracket
                | Self::Dot
                | Self::Comma
                | Self::Assign
                | Self::Eq
                | Self::NotEq
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::And
                | Self::Or
                | Self::Not
                | Self::Plus
                | Self::Minus
                | Self::Eof
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Language => write!(f, "language"),
            Self::Fn => write!(f, "fn"),
            Self::If => write!(f, "if"),
            Self::Else => write!(f, "else"),
            Self::Require => write!(f, "require"),
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Fail => write!(f, "fail"),
            Self::CreatePool => write!(f, "create_pool"),
            Self::Quantity => write!(f, "quantity"),
            Self::Record => write!(f, "record"),
            Self::Select => write!(f, "select"),
            Self::Where => write!(f, "where"),
            Self::Order => write!(f, "order"),
            Self::By => write!(f, "by"),
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
            Self::Return => write!(f, "return"),
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::None => write!(f, "none"),
            Self::Now => write!(f, "now"),
            Self::Identifier => write!(f, "identifier"),
            Self::StringLiteral => write!(f, "string literal"),
            Self::NumberLiteral => write!(f, "number"),
            Self::OpenBrace => write!(f, "{{"),
            Self::CloseBrace => write!(f, "}}"),
            Self::OpenParen => write!(f, "("),
            Self::CloseParen => write!(f, ")"),
            Self::OpenBracket => write!(f, "["),
            Self::CloseBracket => write!(f, "]"),
            Self::Dot => write!(f, "."),
            Self::Comma => write!(f, ","),
            Self::Assign => write!(f, "="),
            Self::Eq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Not => write!(f, "!"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

/// Lexer for rule source
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    /// Create a new lexer from input text
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> RuleResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.input.len() {
                tokens.push(Token::new(TokenKind::Eof, "", self.line, self.col));
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> RuleResult<Token> {
        let ch = self.input[self.pos];
        let line = self.line;
        let col = self.col;

        match ch {
            '{' => self.single(TokenKind::OpenBrace, "{", line, col),
            '}' => self.single(TokenKind::CloseBrace, "}", line, col),
            '(' => self.single(TokenKind::OpenParen, "(", line, col),
            ')' => self.single(TokenKind::CloseParen, ")", line, col),
            '[' => self.single(TokenKind::OpenBracket, "[", line, col),
            ']' => self.single(TokenKind::CloseBracket, "]", line, col),
            '.' => self.single(TokenKind::Dot, ".", line, col),
            ',' => self.single(TokenKind::Comma, ",", line, col),
            '+' => self.single(TokenKind::Plus, "+", line, col),
            '-' => self.single(TokenKind::Minus, "-", line, col),
            '=' if self.peek_at(1) == Some('=') => self.double(TokenKind::Eq, "==", line, col),
            '=' => self.single(TokenKind::Assign, "=", line, col),
            '!' if self.peek_at(1) == Some('=') => self.double(TokenKind::NotEq, "!=", line, col),
            '!' => self.single(TokenKind::Not, "!", line, col),
            '<' if self.peek_at(1) == Some('=') => self.double(TokenKind::Le, "<=", line, col),
            '<' => self.single(TokenKind::Lt, "<", line, col),
            '>' if self.peek_at(1) == Some('=') => self.double(TokenKind::Ge, ">=", line, col),
            '>' => self.single(TokenKind::Gt, ">", line, col),
            '&' if self.peek_at(1) == Some('&') => self.double(TokenKind::And, "&&", line, col),
            '|' if self.peek_at(1) == Some('|') => self.double(TokenKind::Or, "||", line, col),
            '"' => self.read_string_literal(),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier_or_keyword(),
            _ => Err(RuleError::ParseError {
                line,
                col,
                message: format!("Unexpected character: '{}'", ch),
            }),
        }
    }

    fn single(&mut self, kind: TokenKind, text: &str, line: usize, col: usize) -> RuleResult<Token> {
        self.advance();
        Ok(Token::new(kind, text, line, col))
    }

    fn double(&mut self, kind: TokenKind, text: &str, line: usize, col: usize) -> RuleResult<Token> {
        self.advance();
        self.advance();
        Ok(Token::new(kind, text, line, col))
    }

    fn read_string_literal(&mut self) -> RuleResult<Token> {
        let line = self.line;
        let col = self.col;
        self.advance(); // skip opening quote

        let mut text = String::new();
        while self.pos < self.input.len() && self.input[self.pos] != '"' {
            if self.input[self.pos] == '\\' {
                match self.peek_at(1) {
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some('n') => text.push('\n'),
                    other => {
                        return Err(RuleError::ParseError {
                            line: self.line,
                            col: self.col,
                            message: format!("Invalid escape sequence: '\\{}'", other.unwrap_or(' ')),
                        })
                    }
                }
                self.advance();
            } else {
                text.push(self.input[self.pos]);
            }
            self.advance();
        }

        if self.pos >= self.input.len() {
            return Err(RuleError::ParseError {
                line,
                col,
                message: "Unterminated string literal".into(),
            });
        }

        self.advance(); // skip closing quote
        Ok(Token::new(TokenKind::StringLiteral, text, line, col))
    }

    fn read_number(&mut self) -> RuleResult<Token> {
        let line = self.line;
        let col = self.col;
        let mut text = String::new();

        while self.pos < self.input.len() && self.input[self.pos].is_ascii_digit() {
            text.push(self.input[self.pos]);
            self.advance();
        }

        Ok(Token::new(TokenKind::NumberLiteral, text, line, col))
    }

    fn read_identifier_or_keyword(&mut self) -> RuleResult<Token> {
        let line = self.line;
        let col = self.col;
        let mut text = String::new();

        while self.pos < self.input.len()
            && (self.input[self.pos].is_ascii_alphanumeric() || self.input[self.pos] == '_')
        {
            text.push(self.input[self.pos]);
            self.advance();
        }

        let kind = match text.as_str() {
            "language" => TokenKind::Language,
            "fn" => TokenKind::Fn,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "require" => TokenKind::Require,
            "error" => TokenKind::Error,
            "warn" => TokenKind::Warn,
            "fail" => TokenKind::Fail,
            "create_pool" => TokenKind::CreatePool,
            "quantity" => TokenKind::Quantity,
            "record" => TokenKind::Record,
            "select" => TokenKind::Select,
            "where" => TokenKind::Where,
            "order" => TokenKind::Order,
            "by" => TokenKind::By,
            "asc" => TokenKind::Asc,
            "desc" => TokenKind::Desc,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "none" => TokenKind::None,
            "now" => TokenKind::Now,
            _ => TokenKind::Identifier,
        };

        Ok(Token::new(kind, text, line, col))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.input.len() {
            let ch = self.input[self.pos];
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '#' || (ch == '/' && self.peek_at(1) == Some('/')) {
                // Line comment
                while self.pos < self.input.len() && self.input[self.pos] != '\n' {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            if self.input[self.pos] == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.pos += 1;
        }
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }
}
