//! Hand-written cursor lexer with one token of lookahead.
//!
//! # Invariants
//!
//! 1. The cursor only moves forward; `peek` fills a single-token buffer and
//!    never looks further ahead.
//! 2. Positions are byte offsets into the source text and always point at
//!    the first byte of the offending/returned token.
//! 3. Escape sequences and numeric suffixes are decoded here; the parser
//!    never re-examines raw text.

use std::sync::Arc;

use thiserror::Error;

use crate::token::{Token, TokenKind};

/// Lexical or syntactic failure, with the byte position and a description
/// of what was expected there.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("syntax error at offset {position}: expected {expected}")]
pub struct SyntaxError {
    pub position: usize,
    pub expected: String,
}

impl SyntaxError {
    #[must_use]
    pub fn new(position: usize, expected: impl Into<String>) -> Self {
        Self {
            position,
            expected: expected.into(),
        }
    }
}

/// Tokenizer over a binding-expression string.
///
/// `Clone` is cheap and used by the parser for bounded speculative parses
/// (lambda parameter lists).
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            peeked: None,
        }
    }

    /// Next token, advancing the cursor. Returns `TokenKind::End` at EOF.
    pub fn next_token(&mut self) -> Result<Token, SyntaxError> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }
        self.lex()
    }

    /// Look at the next token without consuming it.
    pub fn peek(&mut self) -> Result<Token, SyntaxError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lex()?);
        }
        Ok(self.peeked.clone().expect("peek buffer filled above"))
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn lex(&mut self) -> Result<Token, SyntaxError> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(c) = self.peek_char() else {
            return Ok(Token::new(TokenKind::End, start));
        };

        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c == '_' || c.is_alphabetic() {
            return Ok(self.lex_ident(start));
        }
        if c == '"' {
            return self.lex_string(start);
        }
        if c == '\'' {
            return self.lex_char(start);
        }

        self.bump();
        let kind = match c {
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            '[' => TokenKind::OpenBracket,
            ']' => TokenKind::CloseBracket,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '~' => TokenKind::Tilde,
            '^' => TokenKind::Caret,
            '?' => match self.peek_char() {
                Some('?') => {
                    self.bump();
                    TokenKind::QuestionQuestion
                }
                Some('.') => {
                    self.bump();
                    TokenKind::QuestionDot
                }
                _ => TokenKind::Question,
            },
            '=' => match self.peek_char() {
                Some('=') => {
                    self.bump();
                    TokenKind::EqEq
                }
                Some('>') => {
                    self.bump();
                    TokenKind::Arrow
                }
                _ => TokenKind::Assign,
            },
            '!' => match self.peek_char() {
                Some('=') => {
                    self.bump();
                    TokenKind::NotEq
                }
                _ => TokenKind::Bang,
            },
            '<' => match self.peek_char() {
                Some('=') => {
                    self.bump();
                    TokenKind::Le
                }
                Some('<') => {
                    self.bump();
                    TokenKind::Shl
                }
                _ => TokenKind::Lt,
            },
            '>' => match self.peek_char() {
                Some('=') => {
                    self.bump();
                    TokenKind::Ge
                }
                Some('>') => {
                    self.bump();
                    TokenKind::Shr
                }
                _ => TokenKind::Gt,
            },
            '&' => match self.peek_char() {
                Some('&') => {
                    self.bump();
                    TokenKind::AmpAmp
                }
                _ => TokenKind::Amp,
            },
            '|' => match self.peek_char() {
                Some('|') => {
                    self.bump();
                    TokenKind::PipePipe
                }
                _ => TokenKind::Pipe,
            },
            other => {
                return Err(SyntaxError::new(
                    start,
                    format!("a valid token (found {other:?})"),
                ));
            }
        };
        Ok(Token::new(kind, start))
    }

    fn lex_ident(&mut self, start: usize) -> Token {
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_alphanumeric() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        let kind = match text {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            _ => TokenKind::Ident(Arc::from(text)),
        };
        Token::new(kind, start)
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, SyntaxError> {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let mut is_float = false;
        // A '.' is part of the number only when a digit follows; `1.Foo`
        // keeps the dot for member access.
        if self.peek_char() == Some('.') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.bump();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek_char(), Some('e' | 'E'))
            && self
                .peek_char_at(1)
                .is_some_and(|c| c.is_ascii_digit() || c == '+' || c == '-')
        {
            is_float = true;
            self.bump();
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.bump();
            }
            if !self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                return Err(SyntaxError::new(self.pos, "exponent digits"));
            }
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        let digits_end = self.pos;
        // Type suffix: long/unsigned keep the integer form, float/double
        // force the float form.
        let mut force_float = false;
        match self.peek_char() {
            Some('l' | 'L' | 'u' | 'U') => {
                if is_float {
                    return Err(SyntaxError::new(
                        self.pos,
                        "a float suffix ('f' or 'd') on a fractional literal",
                    ));
                }
                self.bump();
            }
            Some('f' | 'F' | 'd' | 'D') => {
                force_float = true;
                self.bump();
            }
            _ => {}
        }
        let text = &self.src[start..digits_end];
        if is_float || force_float {
            let value: f64 = text
                .parse()
                .map_err(|_| SyntaxError::new(start, "a valid float literal"))?;
            Ok(Token::new(TokenKind::Float(value), start))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| SyntaxError::new(start, "an integer literal in range"))?;
            Ok(Token::new(TokenKind::Int(value), start))
        }
    }

    fn lex_string(&mut self, start: usize) -> Result<Token, SyntaxError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(SyntaxError::new(start, "a closing '\"'")),
                Some('"') => break,
                Some('\\') => text.push(self.lex_escape()?),
                Some(c) => text.push(c),
            }
        }
        Ok(Token::new(TokenKind::Str(Arc::from(text.as_str())), start))
    }

    fn lex_char(&mut self, start: usize) -> Result<Token, SyntaxError> {
        self.bump(); // opening quote
        let c = match self.bump() {
            None => return Err(SyntaxError::new(start, "a char literal")),
            Some('\\') => self.lex_escape()?,
            Some('\'') => return Err(SyntaxError::new(start, "a character between quotes")),
            Some(c) => c,
        };
        if self.bump() != Some('\'') {
            return Err(SyntaxError::new(start, "a closing '\\''"));
        }
        Ok(Token::new(TokenKind::Char(c), start))
    }

    fn lex_escape(&mut self) -> Result<char, SyntaxError> {
        let pos = self.pos;
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('t') => Ok('\t'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('u') => {
                let mut code: u32 = 0;
                for _ in 0..4 {
                    let digit = self
                        .bump()
                        .and_then(|c| c.to_digit(16))
                        .ok_or_else(|| SyntaxError::new(pos, "four hex digits after '\\u'"))?;
                    code = code * 16 + digit;
                }
                char::from_u32(code)
                    .ok_or_else(|| SyntaxError::new(pos, "a valid unicode scalar after '\\u'"))
            }
            _ => Err(SyntaxError::new(pos, "a valid escape sequence")),
        }
    }
}
