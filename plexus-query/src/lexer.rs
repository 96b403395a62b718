//! Cypher tokenizer.
//!
//! Keywords are case-insensitive, identifiers are case-sensitive, backticks
//! quote arbitrary identifier text. Every token carries its source position
//! for `SyntaxError` reporting.

use std::iter::Peekable;
use std::str::Chars;

use plexus_core::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Keywords
    Match,
    Optional,
    Where,
    With,
    Unwind,
    Return,
    Order,
    By,
    Asc,
    Desc,
    Skip,
    Limit,
    Distinct,
    Create,
    Merge,
    On,
    Set,
    Remove,
    Delete,
    Detach,
    Foreach,
    Call,
    Yield,
    And,
    Or,
    Not,
    Xor,
    In,
    Starts,
    Ends,
    Contains,
    Is,
    Case,
    When,
    Then,
    Else,
    End,
    As,
    Index,
    Constraint,
    For,
    Require,
    Unique,
    Exists,
    Fulltext,
    Reduce,
    All,
    Any,
    None,
    Single,
    Null,

    // Symbols
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Colon,
    Semicolon,
    Comma,
    Dot,
    RangeDots,
    Pipe,
    LeftArrow,
    RightArrow,
    Dash,
    Plus,
    PlusEquals,
    Asterisk,
    Slash,
    Percent,
    Caret,
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    RegexMatch,

    // Literals
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),

    Identifier(String),
    Parameter(String),

    Eof,
}

impl TokenType {
    /// Human-readable shape for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenType::String(s) => format!("string '{s}'"),
            TokenType::Integer(i) => format!("integer {i}"),
            TokenType::Float(f) => format!("float {f}"),
            TokenType::Boolean(b) => format!("{b}"),
            TokenType::Identifier(name) => format!("identifier '{name}'"),
            TokenType::Parameter(name) => format!("parameter ${name}"),
            TokenType::Eof => "end of input".to_string(),
            other => format!("{other:?}").to_uppercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        tokens.push(Token {
            token_type: TokenType::Eof,
            line: self.line,
            column: self.column,
        });
        Ok(tokens)
    }

    fn error(&self, line: usize, column: usize, expected: &str, found: impl Into<String>) -> Error {
        Error::SyntaxError {
            line,
            col: column,
            expected: expected.to_string(),
            found: found.into(),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace_and_comments()?;

        let (line, column) = (self.line, self.column);
        let Some(ch) = self.advance() else {
            return Ok(None);
        };

        if ch == '\'' || ch == '"' {
            return Ok(Some(self.read_string(ch, line, column)?));
        }
        if ch == '`' {
            return Ok(Some(self.read_backtick_identifier(line, column)?));
        }
        if ch.is_ascii_digit() {
            return Ok(Some(self.read_number(ch, line, column)?));
        }
        if ch == '$' {
            return Ok(Some(self.read_parameter(line, column)?));
        }
        if ch.is_alphabetic() || ch == '_' {
            return Ok(Some(self.read_word(ch, line, column)));
        }

        let token_type = match ch {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '[' => TokenType::LeftBracket,
            ']' => TokenType::RightBracket,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            ':' => TokenType::Colon,
            ';' => TokenType::Semicolon,
            ',' => TokenType::Comma,
            '|' => TokenType::Pipe,
            '*' => TokenType::Asterisk,
            '/' => TokenType::Slash,
            '%' => TokenType::Percent,
            '^' => TokenType::Caret,
            '.' => {
                if self.peek_is('.') {
                    self.advance();
                    TokenType::RangeDots
                } else {
                    TokenType::Dot
                }
            }
            '+' => {
                if self.peek_is('=') {
                    self.advance();
                    TokenType::PlusEquals
                } else {
                    TokenType::Plus
                }
            }
            '-' => {
                if self.peek_is('>') {
                    self.advance();
                    TokenType::RightArrow
                } else {
                    TokenType::Dash
                }
            }
            '<' => {
                if self.peek_is('-') {
                    self.advance();
                    TokenType::LeftArrow
                } else if self.peek_is('=') {
                    self.advance();
                    TokenType::LessEqual
                } else if self.peek_is('>') {
                    self.advance();
                    TokenType::NotEquals
                } else {
                    TokenType::LessThan
                }
            }
            '>' => {
                if self.peek_is('=') {
                    self.advance();
                    TokenType::GreaterEqual
                } else {
                    TokenType::GreaterThan
                }
            }
            '=' => {
                if self.peek_is('~') {
                    self.advance();
                    TokenType::RegexMatch
                } else {
                    TokenType::Equals
                }
            }
            '!' => {
                if self.peek_is('=') {
                    self.advance();
                    TokenType::NotEquals
                } else {
                    return Err(self.error(line, column, "a token", "'!'"));
                }
            }
            other => {
                return Err(self.error(line, column, "a token", format!("'{other}'")));
            }
        };

        Ok(Some(Token {
            token_type,
            line,
            column,
        }))
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next();
        if let Some(c) = ch {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn peek_is(&mut self, expected: char) -> bool {
        self.chars.peek() == Some(&expected)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while let Some(&c) = self.chars.peek() {
                if c.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }
            // Line comments: //...  Block comments: /* ... */
            let mut lookahead = self.chars.clone();
            if lookahead.next() == Some('/') {
                match lookahead.next() {
                    Some('/') => {
                        while let Some(&c) = self.chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                        continue;
                    }
                    Some('*') => {
                        let (line, column) = (self.line, self.column);
                        self.advance();
                        self.advance();
                        let mut closed = false;
                        while let Some(c) = self.advance() {
                            if c == '*' && self.peek_is('/') {
                                self.advance();
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(self.error(line, column, "'*/'", "end of input"));
                        }
                        continue;
                    }
                    _ => {}
                }
            }
            return Ok(());
        }
    }

    fn read_string(&mut self, quote: char, line: usize, column: usize) -> Result<Token> {
        let mut value = String::new();
        loop {
            let Some(ch) = self.advance() else {
                return Err(self.error(line, column, "closing string quote", "end of input"));
            };
            if ch == quote {
                break;
            }
            if ch == '\\' {
                let Some(escaped) = self.advance() else {
                    return Err(self.error(line, column, "escape sequence", "end of input"));
                };
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    'u' => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            match self.advance() {
                                Some(c) if c.is_ascii_hexdigit() => code.push(c),
                                _ => {
                                    return Err(self.error(
                                        self.line,
                                        self.column,
                                        "four hex digits after \\u",
                                        code,
                                    ));
                                }
                            }
                        }
                        let point = u32::from_str_radix(&code, 16).expect("hex digits");
                        match char::from_u32(point) {
                            Some(c) => value.push(c),
                            None => {
                                return Err(self.error(
                                    self.line,
                                    self.column,
                                    "a valid unicode escape",
                                    format!("\\u{code}"),
                                ));
                            }
                        }
                    }
                    other => {
                        return Err(self.error(
                            self.line,
                            self.column,
                            "a valid escape sequence",
                            format!("\\{other}"),
                        ));
                    }
                }
                continue;
            }
            value.push(ch);
        }
        Ok(Token {
            token_type: TokenType::String(value),
            line,
            column,
        })
    }

    fn read_backtick_identifier(&mut self, line: usize, column: usize) -> Result<Token> {
        let mut value = String::new();
        loop {
            let Some(ch) = self.advance() else {
                return Err(self.error(line, column, "closing '`'", "end of input"));
            };
            if ch == '`' {
                break;
            }
            value.push(ch);
        }
        Ok(Token {
            token_type: TokenType::Identifier(value),
            line,
            column,
        })
    }

    fn read_number(&mut self, first: char, line: usize, column: usize) -> Result<Token> {
        let mut text = String::from(first);
        let mut is_float = false;
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                // A second dot means a range operator, not a fraction.
                let mut lookahead = self.chars.clone();
                lookahead.next();
                if lookahead.peek() == Some(&'.') {
                    break;
                }
                match lookahead.peek() {
                    Some(c) if c.is_ascii_digit() => {
                        is_float = true;
                        text.push(ch);
                        self.advance();
                    }
                    _ => break,
                }
            } else if ch == 'e' || ch == 'E' {
                let mut lookahead = self.chars.clone();
                lookahead.next();
                let next = lookahead.peek().copied();
                let exponent_follows = match next {
                    Some(c) if c.is_ascii_digit() => true,
                    Some('+') | Some('-') => {
                        lookahead.next();
                        matches!(lookahead.peek(), Some(c) if c.is_ascii_digit())
                    }
                    _ => false,
                };
                if !exponent_follows {
                    break;
                }
                is_float = true;
                text.push(ch);
                self.advance();
                if self.peek_is('+') || self.peek_is('-') {
                    text.push(self.advance().expect("sign"));
                }
            } else {
                break;
            }
        }

        let token_type = if is_float {
            TokenType::Float(
                text.parse::<f64>()
                    .map_err(|_| self.error(line, column, "a number", text.clone()))?,
            )
        } else {
            TokenType::Integer(
                text.parse::<i64>()
                    .map_err(|_| self.error(line, column, "an integer", text.clone()))?,
            )
        };
        Ok(Token {
            token_type,
            line,
            column,
        })
    }

    fn read_parameter(&mut self, line: usize, column: usize) -> Result<Token> {
        let mut name = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error(line, column, "parameter name after '$'", "nothing"));
        }
        Ok(Token {
            token_type: TokenType::Parameter(name),
            line,
            column,
        })
    }

    fn read_word(&mut self, first: char, line: usize, column: usize) -> Token {
        let mut value = String::from(first);
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        let token_type = match value.to_uppercase().as_str() {
            "MATCH" => TokenType::Match,
            "OPTIONAL" => TokenType::Optional,
            "WHERE" => TokenType::Where,
            "WITH" => TokenType::With,
            "UNWIND" => TokenType::Unwind,
            "RETURN" => TokenType::Return,
            "ORDER" => TokenType::Order,
            "BY" => TokenType::By,
            "ASC" | "ASCENDING" => TokenType::Asc,
            "DESC" | "DESCENDING" => TokenType::Desc,
            "SKIP" => TokenType::Skip,
            "LIMIT" => TokenType::Limit,
            "DISTINCT" => TokenType::Distinct,
            "CREATE" => TokenType::Create,
            "MERGE" => TokenType::Merge,
            "ON" => TokenType::On,
            "SET" => TokenType::Set,
            "REMOVE" => TokenType::Remove,
            "DELETE" => TokenType::Delete,
            "DETACH" => TokenType::Detach,
            "FOREACH" => TokenType::Foreach,
            "CALL" => TokenType::Call,
            "YIELD" => TokenType::Yield,
            "AND" => TokenType::And,
            "OR" => TokenType::Or,
            "NOT" => TokenType::Not,
            "XOR" => TokenType::Xor,
            "IN" => TokenType::In,
            "STARTS" => TokenType::Starts,
            "ENDS" => TokenType::Ends,
            "CONTAINS" => TokenType::Contains,
            "IS" => TokenType::Is,
            "CASE" => TokenType::Case,
            "WHEN" => TokenType::When,
            "THEN" => TokenType::Then,
            "ELSE" => TokenType::Else,
            "END" => TokenType::End,
            "AS" => TokenType::As,
            "INDEX" => TokenType::Index,
            "CONSTRAINT" => TokenType::Constraint,
            "FOR" => TokenType::For,
            "REQUIRE" => TokenType::Require,
            "UNIQUE" => TokenType::Unique,
            "EXISTS" => TokenType::Exists,
            "FULLTEXT" => TokenType::Fulltext,
            "REDUCE" => TokenType::Reduce,
            "ALL" => TokenType::All,
            "ANY" => TokenType::Any,
            "NONE" => TokenType::None,
            "SINGLE" => TokenType::Single,
            "NULL" => TokenType::Null,
            "TRUE" => TokenType::Boolean(true),
            "FALSE" => TokenType::Boolean(false),
            _ => TokenType::Identifier(value),
        };

        Token {
            token_type,
            line,
            column,
        }
    }
}
