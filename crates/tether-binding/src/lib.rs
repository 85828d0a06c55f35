//! Binding synchronization.
//!
//! A [`Binding`] connects two endpoints (member paths, constants, or
//! compiled expressions over a source root) and keeps them synchronized
//! according to a [`BindingMode`]. Values flow through an interceptor
//! pipeline (conversion, validation, delay), reciprocal notifications are
//! suppressed by last-flowed-value comparison, and endpoint failures move
//! the binding to `Invalid` without tearing it down.
//!
//! [`BindingBuilder`] is the front door: endpoints, mode, trigger, and the
//! pipeline are declared fluently and materialized by `build()`, which fails
//! synchronously on parse/compile/initial-resolve errors.

#![forbid(unsafe_code)]

pub mod binding;
pub mod builder;
pub mod error;
pub mod interceptor;
pub mod mode;
mod source;

pub use binding::{Binding, BindingErrorListener};
pub use builder::BindingBuilder;
pub use error::{BindingError, FlowError};
pub use interceptor::{
    ConvertInterceptor, ConverterResolver, DelayInterceptor, FlowToken, InterceptResult,
    ValidateInterceptor, Validator, ValueConverter, ValueInterceptor,
};
pub use mode::{BindingMode, BindingState, FlowDirection, UpdateTrigger};
