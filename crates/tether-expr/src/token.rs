//! Lexical tokens for binding expressions.

use std::sync::Arc;

/// A lexical token. Produced once by the lexer, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character in the source text.
    pub position: usize,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, position: usize) -> Self {
        Self { kind, position }
    }
}

/// Token kinds. Literal payloads are already decoded (escapes resolved,
/// numeric suffixes folded into the variant).
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(Arc<str>),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Char(char),
    True,
    False,
    Null,

    Dot,
    QuestionDot,
    Question,
    Colon,
    Comma,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    NotEq,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Shl,
    Shr,
    QuestionQuestion,
    Assign,
    Arrow,

    /// End of input.
    End,
}

impl TokenKind {
    /// Short human-readable name used in error messages.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Ident(_) => "identifier",
            Self::Int(_) => "integer literal",
            Self::Float(_) => "float literal",
            Self::Str(_) => "string literal",
            Self::Char(_) => "char literal",
            Self::True => "'true'",
            Self::False => "'false'",
            Self::Null => "'null'",
            Self::Dot => "'.'",
            Self::QuestionDot => "'?.'",
            Self::Question => "'?'",
            Self::Colon => "':'",
            Self::Comma => "','",
            Self::OpenParen => "'('",
            Self::CloseParen => "')'",
            Self::OpenBracket => "'['",
            Self::CloseBracket => "']'",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Percent => "'%'",
            Self::Bang => "'!'",
            Self::Tilde => "'~'",
            Self::Lt => "'<'",
            Self::Gt => "'>'",
            Self::Le => "'<='",
            Self::Ge => "'>='",
            Self::EqEq => "'=='",
            Self::NotEq => "'!='",
            Self::Amp => "'&'",
            Self::AmpAmp => "'&&'",
            Self::Pipe => "'|'",
            Self::PipePipe => "'||'",
            Self::Caret => "'^'",
            Self::Shl => "'<<'",
            Self::Shr => "'>>'",
            Self::QuestionQuestion => "'??'",
            Self::Assign => "'='",
            Self::Arrow => "'=>'",
            Self::End => "end of input",
        }
    }
}
