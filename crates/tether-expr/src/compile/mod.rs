//! Expression compilation.
//!
//! [`Compiler::compile`] turns a parsed tree into an [`Arc<CompiledExpression>`]:
//! a closure tree that evaluates against positional parameter values. Builders
//! implement [`NodeCompiler`] and are consulted in descending priority, so
//! callers can override or extend the node semantics without touching the
//! core set.
//!
//! Compiled expressions are cached by `(structural tree identity, parameter
//! shapes)`. The cache never invalidates on its own; [`Compiler::clear_cache`]
//! is the only eviction.
//!
//! # Invariants
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | Same tree + same shapes compiles once | `DashMap` insert-if-absent |
//! | Disposed expressions never evaluate | `ArcSwapOption` slot check |
//! | Lambdas only at the root | root special case + call-site rejection |

mod builders;
mod context;

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use thiserror::Error;
use tracing::trace;

use tether_core::{AccessError, EngineContext, Value, ValueKind};

use crate::ast::Expr;

pub use context::{BuildCtx, EvalArgs, Evaluator, EvaluatorFn};

/// Failure while turning a tree into an evaluator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("no builder accepts {kind} nodes")]
    UnsupportedNode { kind: &'static str },
    #[error("unresolved identifier '{name}'")]
    UnresolvedIdentifier { name: Arc<str> },
    #[error("lambda expressions are only supported at the root")]
    LambdaPosition,
    #[error("cannot assign to {kind}")]
    InvalidAssignTarget { kind: &'static str },
}

/// Failure while evaluating a compiled expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("expression has been disposed")]
    Disposed,
    #[error("cannot access '{member}' on null")]
    NullReceiver { member: Arc<str> },
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: ValueKind,
    },
    #[error("division by zero")]
    DivideByZero,
    #[error("expected {expected} parameters, found {found}")]
    ParameterCount { expected: usize, found: usize },
}

/// Resolves free identifiers that are not declared parameters, typically to
/// static resources or named constants.
pub trait TypeResourceResolver: Send + Sync {
    fn try_resolve(&self, name: &str) -> Option<Value>;
}

/// Declared positional parameter: a name visible to the expression and the
/// value shape it will carry at invoke time.
#[derive(Debug, Clone)]
pub struct ParameterShape {
    pub name: Arc<str>,
    pub kind: ValueKind,
}

/// Compilation inputs beyond the tree itself.
#[derive(Clone, Default)]
pub struct CompileMetadata {
    pub parameters: Vec<ParameterShape>,
    pub resolver: Option<Arc<dyn TypeResourceResolver>>,
}

impl CompileMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<Arc<str>>, kind: ValueKind) -> Self {
        self.parameters.push(ParameterShape {
            name: name.into(),
            kind,
        });
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TypeResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Shape vector used as the cache key component.
    #[must_use]
    pub fn shapes(&self) -> Vec<ValueKind> {
        self.parameters.iter().map(|p| p.kind).collect()
    }
}

impl fmt::Debug for CompileMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileMetadata")
            .field("parameters", &self.parameters)
            .field("resolver", &self.resolver.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Per-node compilation strategy.
///
/// `try_compile` returns `None` when this builder does not handle the node
/// kind; the compiler then falls through to the next builder by priority.
pub trait NodeCompiler: Send + Sync {
    /// Higher priority builders are consulted first. The core set runs at 0.
    fn priority(&self) -> i32 {
        0
    }

    fn try_compile(
        &self,
        node: &Arc<Expr>,
        ctx: &BuildCtx<'_>,
    ) -> Option<Result<Evaluator, CompileError>>;
}

type CacheKey = (Arc<Expr>, Vec<ValueKind>);

/// Expression compiler with a pluggable builder registry and a structural
/// compilation cache.
pub struct Compiler {
    context: Arc<EngineContext>,
    builders: ArcSwap<Vec<Arc<dyn NodeCompiler>>>,
    cache: DashMap<CacheKey, Arc<CompiledExpression>, ahash::RandomState>,
}

impl Compiler {
    #[must_use]
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            context,
            builders: ArcSwap::from_pointee(builders::default_set()),
            cache: DashMap::default(),
        }
    }

    /// Engine collaborators captured by compiled closures.
    #[must_use]
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Register an additional builder. Existing cached expressions are not
    /// recompiled; call [`clear_cache`](Self::clear_cache) when the new
    /// builder must apply to already-seen trees.
    pub fn register(&self, builder: Arc<dyn NodeCompiler>) {
        self.builders.rcu(|current| {
            let mut next: Vec<Arc<dyn NodeCompiler>> = current.to_vec();
            next.push(Arc::clone(&builder));
            next.sort_by_key(|b| std::cmp::Reverse(b.priority()));
            next
        });
    }

    /// Compile `expr` against the declared parameters, reusing a cached
    /// instance when the same tree was compiled with the same shapes.
    pub fn compile(
        &self,
        expr: &Arc<Expr>,
        metadata: &CompileMetadata,
    ) -> Result<Arc<CompiledExpression>, CompileError> {
        let key: CacheKey = (Arc::clone(expr), metadata.shapes());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(&hit));
        }
        trace!(kind = expr.kind_name(), "compiling expression");

        let mut ctx = BuildCtx::new(metadata, self);
        // A root lambda extends the positional scope; anywhere else a lambda
        // is rejected by the builders.
        let body = if let Expr::Lambda { params, body } = &**expr {
            ctx.bind(params);
            body
        } else {
            expr
        };
        let evaluator = self.compile_node(body, &ctx)?;
        let compiled = Arc::new(CompiledExpression {
            source: Arc::clone(expr),
            arity: ctx.arity(),
            evaluator: ArcSwapOption::from_pointee(Slot(evaluator)),
        });
        // Insert-if-absent: a concurrent compile of the same key may have won.
        let entry = self
            .cache
            .entry(key)
            .or_insert_with(|| Arc::clone(&compiled));
        Ok(Arc::clone(&entry))
    }

    /// Drop all cached expressions, forcing recompilation.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub(crate) fn compile_node(
        &self,
        node: &Arc<Expr>,
        ctx: &BuildCtx<'_>,
    ) -> Result<Evaluator, CompileError> {
        for builder in self.builders.load().iter() {
            if let Some(result) = builder.try_compile(node, ctx) {
                return result;
            }
        }
        Err(CompileError::UnsupportedNode {
            kind: node.kind_name(),
        })
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("builders", &self.builders.load().len())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Sized wrapper so the evaluator slot can live in an `ArcSwapOption`.
struct Slot(Evaluator);

/// A compiled, invokable expression.
pub struct CompiledExpression {
    source: Arc<Expr>,
    arity: usize,
    evaluator: ArcSwapOption<Slot>,
}

impl CompiledExpression {
    /// Evaluate with positional parameter values.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, EvaluationError> {
        let Some(slot) = self.evaluator.load_full() else {
            return Err(EvaluationError::Disposed);
        };
        if args.len() != self.arity {
            return Err(EvaluationError::ParameterCount {
                expected: self.arity,
                found: args.len(),
            });
        }
        (slot.0)(&EvalArgs { parameters: args })
    }

    /// Release the evaluator. Subsequent invokes fail with
    /// [`EvaluationError::Disposed`]; the source tree stays readable.
    pub fn dispose(&self) {
        self.evaluator.store(None);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.evaluator.load().is_none()
    }

    #[must_use]
    pub fn source(&self) -> &Arc<Expr> {
        &self.source
    }

    /// Observable member chains of the source tree.
    #[must_use]
    pub fn source_paths(&self) -> Vec<String> {
        crate::paths::source_paths(&self.source)
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("source", &crate::printer::unparse(&self.source))
            .field("arity", &self.arity)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
