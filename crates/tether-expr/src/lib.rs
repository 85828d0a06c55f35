#![forbid(unsafe_code)]

//! Binding-expression front end: tokenizer, parser, canonical printer, and
//! the pluggable tree-to-evaluator compiler with its concurrent cache.
//!
//! A binding request flows `text → Lexer → Parser → Arc<Expr> →` either
//! [`Compiler::compile`] (an invocable [`CompiledExpression`]) or
//! [`source_paths`] (the member chains the expression observes).
//!
//! # Grammar summary
//!
//! `.`/`?.`/`[]` member and index access, `()` calls, `? :` conditional,
//! `??` null-coalescing, `param => body` lambdas, and the binary operator
//! ladder multiplicative > additive > shift > relational > equality >
//! `&` > `^` > `|` > `&&` > `||` > `??` > `=`. Assignment and `??` are
//! right-associative; everything else is left-associative; `? :` binds
//! looser than `??`.

pub mod ast;
pub mod compile;
pub mod lexer;
pub mod parser;
pub mod paths;
pub mod printer;
pub mod token;

pub use ast::{BinaryOp, Expr, Literal, UnaryOp};
pub use compile::{
    CompileError, CompileMetadata, CompiledExpression, Compiler, EvaluationError, Evaluator,
    NodeCompiler, TypeResourceResolver,
};
pub use lexer::{Lexer, SyntaxError};
pub use parser::parse;
pub use paths::source_paths;
pub use printer::unparse;
pub use token::{Token, TokenKind};
