//! Construction and live-flow failures.
//!
//! The split matters: [`BindingError`] is synchronous and fatal to
//! `build()`, while [`FlowError`] is reported to binding-error listeners and
//! moves the binding to `Invalid` without tearing it down.

use thiserror::Error;

use tether_expr::{CompileError, EvaluationError, SyntaxError};
use tether_observe::{ObservationError, PathError};

use crate::mode::BindingMode;

/// Aggregate construction failure, preserving the original cause.
#[derive(Debug, Clone, Error)]
pub enum BindingError {
    #[error("invalid binding expression: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("failed to compile binding expression: {0}")]
    Compile(#[from] CompileError),
    #[error("invalid member path: {0}")]
    Path(#[from] PathError),
    #[error("failed to resolve binding endpoint: {0}")]
    Observation(#[from] ObservationError),
    #[error("no converter named '{name}' is registered")]
    UnknownConverter { name: String },
    #[error("{mode:?} mode writes to the source, but the source endpoint is not writable")]
    UnwritableSource { mode: BindingMode },
    #[error("binding has no source endpoint")]
    MissingSource,
    #[error("binding has no target endpoint")]
    MissingTarget,
}

/// A failure during a live value flow.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error(transparent)]
    Observation(#[from] ObservationError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("the scheduler rejected a delayed write")]
    Schedule,
    #[error("endpoint is not writable")]
    NotWritable,
}
