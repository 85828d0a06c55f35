//! Immutable expression trees.
//!
//! # Invariants
//!
//! 1. Nodes are immutable after construction; children are shared via `Arc`.
//! 2. Equality and hashing are structural (float constants by bit pattern),
//!    so two parses of the same text are interchangeable cache keys and can
//!    share one compiled evaluator.
//! 3. Once a `?.` appears in a postfix chain, every later access in that
//!    chain carries `optional: true`; evaluating any optional access on a
//!    null receiver short-circuits the whole chain to null.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Constant literal payloads.
#[derive(Debug, Clone)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Str(s) => s.hash(state),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x` (numeric identity; still type-checked)
    Plus,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
}

impl UnaryOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Plus => "+",
            Self::Not => "!",
            Self::BitNot => "~",
        }
    }
}

/// Binary operators, ordered by the fixed precedence ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
    Coalesce,
    Assign,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            Self::Assign => 1,
            Self::Coalesce => 2,
            Self::Or => 3,
            Self::And => 4,
            Self::BitOr => 5,
            Self::BitXor => 6,
            Self::BitAnd => 7,
            Self::Eq | Self::Ne => 8,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 9,
            Self::Shl | Self::Shr => 10,
            Self::Add | Self::Sub => 11,
            Self::Mul | Self::Div | Self::Rem => 12,
        }
    }

    /// Assignment and null-coalescing group to the right.
    #[must_use]
    pub fn is_right_associative(self) -> bool {
        matches!(self, Self::Assign | Self::Coalesce)
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::And => "&&",
            Self::Or => "||",
            Self::Coalesce => "??",
            Self::Assign => "=",
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Constant(Literal),
    /// A free identifier: a lambda parameter, a resolvable resource, or (in
    /// binding context) an implicit member of the source root. The compiler
    /// decides which.
    Parameter { name: Arc<str> },
    Member {
        target: Arc<Expr>,
        name: Arc<str>,
        optional: bool,
    },
    Index {
        target: Arc<Expr>,
        args: Vec<Arc<Expr>>,
        optional: bool,
    },
    MethodCall {
        /// `None` for a bare call (`Foo(x)`): the receiver is the implicit
        /// root, resolved by the compiler.
        target: Option<Arc<Expr>>,
        name: Arc<str>,
        args: Vec<Arc<Expr>>,
        optional: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Arc<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    Conditional {
        condition: Arc<Expr>,
        when_true: Arc<Expr>,
        when_false: Arc<Expr>,
    },
    Lambda {
        params: Vec<Arc<str>>,
        body: Arc<Expr>,
    },
    /// Marks the receiver of a `?.`/`?[` access site.
    NullConditional { target: Arc<Expr> },
}

impl Expr {
    /// Node-kind name for diagnostics and compiler errors.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Constant(_) => "constant",
            Self::Parameter { .. } => "parameter",
            Self::Member { .. } => "member",
            Self::Index { .. } => "index",
            Self::MethodCall { .. } => "method call",
            Self::Unary { .. } => "unary",
            Self::Binary { .. } => "binary",
            Self::Conditional { .. } => "conditional",
            Self::Lambda { .. } => "lambda",
            Self::NullConditional { .. } => "null-conditional",
        }
    }
}
