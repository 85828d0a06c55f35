//! Compile-time and run-time contexts for evaluators.

use std::sync::Arc;

use tether_core::{MemberProvider, Value};

use crate::ast::Expr;
use crate::compile::{CompileError, CompileMetadata, Compiler, EvaluationError};

/// Unsized evaluator function; [`Evaluator`] is the shared handle.
pub type EvaluatorFn = dyn Fn(&EvalArgs<'_>) -> Result<Value, EvaluationError> + Send + Sync;

/// A compiled node: a closure tree mirroring the expression tree.
pub type Evaluator = Arc<EvaluatorFn>;

/// Run-time arguments for one evaluation pass.
///
/// Parameters are positional: declared metadata parameters first, then the
/// parameters of a root lambda, in declaration order.
pub struct EvalArgs<'a> {
    pub parameters: &'a [Value],
}

impl EvalArgs<'_> {
    pub fn parameter(&self, index: usize) -> Result<Value, EvaluationError> {
        self.parameters
            .get(index)
            .cloned()
            .ok_or(EvaluationError::ParameterCount {
                expected: index + 1,
                found: self.parameters.len(),
            })
    }
}

/// Compile-time scope handed to every [`NodeCompiler`](crate::compile::NodeCompiler).
pub struct BuildCtx<'a> {
    pub metadata: &'a CompileMetadata,
    compiler: &'a Compiler,
    scope: Vec<Arc<str>>,
}

impl<'a> BuildCtx<'a> {
    pub(crate) fn new(metadata: &'a CompileMetadata, compiler: &'a Compiler) -> Self {
        let scope = metadata
            .parameters
            .iter()
            .map(|p| Arc::clone(&p.name))
            .collect();
        Self {
            metadata,
            compiler,
            scope,
        }
    }

    /// Append root-lambda parameters to the positional scope.
    pub(crate) fn bind(&mut self, params: &[Arc<str>]) {
        self.scope.extend(params.iter().cloned());
    }

    /// Positional slot of a scoped name, if any.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.scope.iter().position(|p| &**p == name)
    }

    /// Number of positional parameters the evaluator expects at invoke time.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.scope.len()
    }

    /// Member provider the compiled closures capture for dynamic access.
    #[must_use]
    pub fn provider(&self) -> Arc<dyn MemberProvider> {
        Arc::clone(&self.compiler.context().members)
    }

    /// Compile a child node through the builder registry.
    pub fn compile(&self, node: &Arc<Expr>) -> Result<Evaluator, CompileError> {
        self.compiler.compile_node(node, self)
    }
}
