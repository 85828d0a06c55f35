//! Fluent binding construction.
//!
//! `build()` is scoped: the target endpoint is materialized first, then the
//! source; if the source fails, the already-live target is disposed before
//! the error returns, so a failed `build()` never leaks a subscription.
//! Interceptors are resolved before any endpoint goes live for the same
//! reason.
//!
//! Pipeline order is fixed: conversion, then validation, then delay. The
//! converted value is what gets validated, and only a valid value is worth
//! debouncing.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::debug;

use tether_core::{DynObject, EngineContext, Value};
use tether_expr::Compiler;
use tether_observe::{ObserverFlags, PathObserverListener};

use crate::binding::{Binding, BindingErrorListener, SideListener};
use crate::error::BindingError;
use crate::interceptor::{
    ConvertInterceptor, ConverterResolver, DelayInterceptor, ValidateInterceptor, Validator,
    ValueConverter, ValueInterceptor,
};
use crate::mode::{BindingMode, FlowDirection, UpdateTrigger};
use crate::source::Endpoint;

enum EndpointSpec {
    Path { root: Arc<dyn DynObject>, path: String },
    Expression { root: Arc<dyn DynObject>, text: String },
    Constant(Value),
}

/// Declarative front door for [`Binding`] construction.
pub struct BindingBuilder {
    context: Arc<EngineContext>,
    compiler: Option<Arc<Compiler>>,
    mode: BindingMode,
    trigger: UpdateTrigger,
    source: Option<EndpointSpec>,
    target: Option<EndpointSpec>,
    converter: Option<Arc<dyn ValueConverter>>,
    converter_name: Option<String>,
    converter_resolver: Option<Arc<dyn ConverterResolver>>,
    validator: Option<Validator>,
    delay: Option<Duration>,
    observer_flags: ObserverFlags,
    error_listeners: Vec<BindingErrorListener>,
}

impl BindingBuilder {
    #[must_use]
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            context,
            compiler: None,
            mode: BindingMode::default(),
            trigger: UpdateTrigger::default(),
            source: None,
            target: None,
            converter: None,
            converter_name: None,
            converter_resolver: None,
            validator: None,
            delay: None,
            observer_flags: ObserverFlags::empty(),
            error_listeners: Vec::new(),
        }
    }

    /// Share a compiler across bindings so expression endpoints hit one
    /// compilation cache. Without this each `build()` compiles cold.
    #[must_use]
    pub fn with_compiler(mut self, compiler: Arc<Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: BindingMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: UpdateTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Bind the source side to a member path on `root`.
    #[must_use]
    pub fn source_path(mut self, root: Arc<dyn DynObject>, path: impl Into<String>) -> Self {
        self.source = Some(EndpointSpec::Path {
            root,
            path: path.into(),
        });
        self
    }

    /// Bind the source side to an expression evaluated over `root`.
    #[must_use]
    pub fn source_expression(mut self, root: Arc<dyn DynObject>, text: impl Into<String>) -> Self {
        self.source = Some(EndpointSpec::Expression {
            root,
            text: text.into(),
        });
        self
    }

    /// Bind the source side to a fixed value.
    #[must_use]
    pub fn source_constant(mut self, value: Value) -> Self {
        self.source = Some(EndpointSpec::Constant(value));
        self
    }

    /// Bind the target side to a member path on `root`.
    #[must_use]
    pub fn target_path(mut self, root: Arc<dyn DynObject>, path: impl Into<String>) -> Self {
        self.target = Some(EndpointSpec::Path {
            root,
            path: path.into(),
        });
        self
    }

    #[must_use]
    pub fn converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Look the converter up by name at `build()` time through the
    /// registered resolver.
    #[must_use]
    pub fn converter_named(mut self, name: impl Into<String>) -> Self {
        self.converter_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn converter_resolver(mut self, resolver: Arc<dyn ConverterResolver>) -> Self {
        self.converter_resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Debounce flows by `delay`, keeping only the latest value of a burst.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Tolerate null intermediates: an unreachable tail yields `Null`
    /// instead of an error.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.observer_flags |= ObserverFlags::OPTIONAL;
        self
    }

    /// Promise that intermediate segments never repoint, skipping their
    /// subscriptions.
    #[must_use]
    pub fn stable_path(mut self) -> Self {
        self.observer_flags |= ObserverFlags::STABLE_PATH;
        self
    }

    #[must_use]
    pub fn on_error(mut self, listener: BindingErrorListener) -> Self {
        self.error_listeners.push(listener);
        self
    }

    /// Materialize the binding and run its initial flow.
    ///
    /// Modes that write back to the source (`TwoWay`, `OneWayToSource`)
    /// require a path source; constants and expressions are not writable
    /// and are rejected here rather than at the first reverse flow.
    pub fn build(self) -> Result<Arc<Binding>, BindingError> {
        let source_spec = self.source.ok_or(BindingError::MissingSource)?;
        let target_spec = self.target.ok_or(BindingError::MissingTarget)?;
        let writes_source = matches!(
            self.mode,
            BindingMode::TwoWay | BindingMode::OneWayToSource
        );
        if writes_source && !matches!(source_spec, EndpointSpec::Path { .. }) {
            return Err(BindingError::UnwritableSource { mode: self.mode });
        }

        // Resolve the pipeline before any endpoint goes live.
        let mut interceptors: Vec<Arc<dyn ValueInterceptor>> = Vec::new();
        let converter = match (self.converter, self.converter_name) {
            (Some(converter), _) => Some(converter),
            (None, Some(name)) => {
                let resolved = self
                    .converter_resolver
                    .as_ref()
                    .and_then(|resolver| resolver.try_resolve(&name));
                match resolved {
                    Some(converter) => Some(converter),
                    None => return Err(BindingError::UnknownConverter { name }),
                }
            }
            (None, None) => None,
        };
        if let Some(converter) = converter {
            interceptors.push(Arc::new(ConvertInterceptor::new(converter)));
        }
        if let Some(validator) = self.validator {
            interceptors.push(Arc::new(ValidateInterceptor::new(validator)));
        }
        if let Some(delay) = self.delay {
            interceptors.push(Arc::new(DelayInterceptor::new(
                delay,
                Arc::clone(&self.context.scheduler),
            )));
        }

        let source_listener = SideListener::new(FlowDirection::ToTarget);
        let target_listener = SideListener::new(FlowDirection::ToSource);
        let compiler = self
            .compiler
            .unwrap_or_else(|| Arc::new(Compiler::new(Arc::clone(&self.context))));

        let target = build_endpoint(
            target_spec,
            self.observer_flags,
            &self.context,
            &compiler,
            &target_listener,
        )?;
        let source = match build_endpoint(
            source_spec,
            self.observer_flags,
            &self.context,
            &compiler,
            &source_listener,
        ) {
            Ok(endpoint) => endpoint,
            Err(error) => {
                target.dispose();
                return Err(error);
            }
        };

        let binding = Binding::assemble(
            self.mode,
            self.trigger,
            source,
            target,
            interceptors,
            self.error_listeners,
            vec![source_listener, target_listener],
        );
        debug!(mode = ?self.mode, trigger = ?self.trigger, "binding built");

        match self.mode {
            BindingMode::OneWayToSource => binding.flow(FlowDirection::ToSource),
            _ => binding.flow(FlowDirection::ToTarget),
        }
        if self.mode == BindingMode::OneTime {
            binding.release_observers();
        }
        Ok(binding)
    }
}

fn build_endpoint(
    spec: EndpointSpec,
    flags: ObserverFlags,
    context: &Arc<EngineContext>,
    compiler: &Compiler,
    listener: &Arc<SideListener>,
) -> Result<Endpoint, BindingError> {
    let weak: Weak<dyn PathObserverListener> = {
        let coerced: Arc<dyn PathObserverListener> = Arc::clone(listener) as _;
        Arc::downgrade(&coerced)
    };
    match spec {
        EndpointSpec::Path { root, path } => {
            Endpoint::path(&root, &path, flags, Arc::clone(context), weak)
        }
        EndpointSpec::Expression { root, text } => {
            Endpoint::expression(&root, &text, flags, Arc::clone(context), compiler, &weak)
        }
        EndpointSpec::Constant(value) => Ok(Endpoint::constant(value)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tether_core::{DynObject, ManualScheduler, Scheduler, ViewModel};

    use super::*;
    use crate::error::FlowError;
    use crate::mode::BindingState;

    fn context() -> Arc<EngineContext> {
        Arc::new(EngineContext::default())
    }

    fn manual_context() -> (Arc<EngineContext>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::new());
        let context = Arc::new(
            EngineContext::default().with_scheduler(Arc::clone(&scheduler) as Arc<dyn Scheduler>),
        );
        (context, scheduler)
    }

    fn member(vm: &Arc<ViewModel>, name: &str) -> Value {
        vm.get_member(name).unwrap_or(Value::Null)
    }

    struct CountingConverter {
        forward: AtomicUsize,
        backward: AtomicUsize,
    }

    impl CountingConverter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                forward: AtomicUsize::new(0),
                backward: AtomicUsize::new(0),
            })
        }
    }

    impl ValueConverter for CountingConverter {
        fn convert(&self, value: Value) -> Result<Value, FlowError> {
            self.forward.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }

        fn convert_back(&self, value: Value) -> Result<Value, FlowError> {
            self.backward.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    #[test]
    fn one_way_flows_initial_and_subsequent_values() {
        let source = ViewModel::new("Model");
        source.seed("Name", "ada");
        let target = ViewModel::new("View");
        target.seed("Text", "");

        let binding = BindingBuilder::new(context())
            .source_path(source.clone(), "Name")
            .target_path(target.clone(), "Text")
            .build()
            .unwrap();

        assert_eq!(member(&target, "Text"), Value::from("ada"));
        source.set_member("Name", Value::from("grace"));
        assert_eq!(member(&target, "Text"), Value::from("grace"));
        assert_eq!(binding.state(), BindingState::Valid);
    }

    #[test]
    fn two_way_suppresses_reciprocal_echo() {
        let source = ViewModel::new("Model");
        source.seed("A", 1i64);
        let target = ViewModel::new("View");
        target.seed("B", 0i64);
        let converter = CountingConverter::new();

        let _binding = BindingBuilder::new(context())
            .mode(BindingMode::TwoWay)
            .source_path(source.clone(), "A")
            .target_path(target.clone(), "B")
            .converter(converter.clone())
            .build()
            .unwrap();

        // Initial flow converted once; its echo never re-entered the
        // pipeline.
        assert_eq!(converter.forward.load(Ordering::SeqCst), 1);
        assert_eq!(converter.backward.load(Ordering::SeqCst), 0);

        target.set_member("B", Value::Int(5));
        assert_eq!(member(&source, "A"), Value::Int(5));
        assert_eq!(converter.forward.load(Ordering::SeqCst), 1);
        assert_eq!(converter.backward.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn two_way_nan_write_settles() {
        let source = ViewModel::new("Model");
        source.seed("A", 1.0f64);
        let target = ViewModel::new("View");
        target.seed("B", 0.0f64);
        let converter = CountingConverter::new();

        let _binding = BindingBuilder::new(context())
            .mode(BindingMode::TwoWay)
            .source_path(source.clone(), "A")
            .target_path(target.clone(), "B")
            .converter(converter.clone())
            .build()
            .unwrap();

        // A NaN edit must flow back exactly once; under IEEE equality the
        // echo would never match and the sides would re-notify forever.
        target.set_member("B", Value::Float(f64::NAN));
        assert!(matches!(member(&source, "A"), Value::Float(f) if f.is_nan()));
        assert_eq!(converter.backward.load(Ordering::SeqCst), 1);
        assert_eq!(converter.forward.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_time_flows_once_and_releases_observers() {
        let source = ViewModel::new("Model");
        source.seed("Name", "first");
        let target = ViewModel::new("View");
        target.seed("Text", "");

        let binding = BindingBuilder::new(context())
            .mode(BindingMode::OneTime)
            .source_path(source.clone(), "Name")
            .target_path(target.clone(), "Text")
            .build()
            .unwrap();

        assert_eq!(member(&target, "Text"), Value::from("first"));
        assert_eq!(source.listener_count(), 0);

        source.set_member("Name", Value::from("second"));
        assert_eq!(member(&target, "Text"), Value::from("first"));
        assert_eq!(binding.state(), BindingState::Valid);
    }

    #[test]
    fn one_way_to_source_flows_from_target() {
        let source = ViewModel::new("Model");
        source.seed("A", 0i64);
        let target = ViewModel::new("View");
        target.seed("B", 7i64);

        let _binding = BindingBuilder::new(context())
            .mode(BindingMode::OneWayToSource)
            .source_path(source.clone(), "A")
            .target_path(target.clone(), "B")
            .build()
            .unwrap();

        assert_eq!(member(&source, "A"), Value::Int(7));
        target.set_member("B", Value::Int(8));
        assert_eq!(member(&source, "A"), Value::Int(8));
    }

    #[test]
    fn explicit_trigger_waits_for_update_calls() {
        let source = ViewModel::new("Model");
        source.seed("Name", "a");
        let target = ViewModel::new("View");
        target.seed("Text", "");

        let binding = BindingBuilder::new(context())
            .trigger(UpdateTrigger::Explicit)
            .source_path(source.clone(), "Name")
            .target_path(target.clone(), "Text")
            .build()
            .unwrap();

        // The initial flow is itself explicit.
        assert_eq!(member(&target, "Text"), Value::from("a"));

        source.set_member("Name", Value::from("b"));
        assert_eq!(member(&target, "Text"), Value::from("a"));

        binding.update_target();
        assert_eq!(member(&target, "Text"), Value::from("b"));
    }

    #[test]
    fn validation_failure_goes_invalid_and_recovers() {
        let source = ViewModel::new("Model");
        source.seed("A", 1i64);
        let target = ViewModel::new("View");
        target.seed("B", 0i64);
        let errors: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&errors);

        let binding = BindingBuilder::new(context())
            .source_path(source.clone(), "A")
            .target_path(target.clone(), "B")
            .validate(Arc::new(|value| match value {
                Value::Int(n) if *n < 0 => Err("negative".into()),
                _ => Ok(()),
            }))
            .on_error(Arc::new(move |error| {
                sink.lock().unwrap().push(error.to_string());
            }))
            .build()
            .unwrap();

        assert_eq!(member(&target, "B"), Value::Int(1));

        source.set_member("A", Value::Int(-1));
        assert_eq!(member(&target, "B"), Value::Int(1));
        assert_eq!(binding.state(), BindingState::Invalid);
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert!(errors.lock().unwrap()[0].contains("negative"));

        source.set_member("A", Value::Int(3));
        assert_eq!(member(&target, "B"), Value::Int(3));
        assert_eq!(binding.state(), BindingState::Valid);
    }

    #[test]
    fn constant_source_writes_through() {
        let target = ViewModel::new("View");
        target.seed("Text", "");

        let _binding = BindingBuilder::new(context())
            .source_constant(Value::Int(42))
            .target_path(target.clone(), "Text")
            .build()
            .unwrap();

        assert_eq!(member(&target, "Text"), Value::Int(42));
    }

    #[test]
    fn expression_source_reevaluates_on_operand_change() {
        let source = ViewModel::new("Model");
        source.seed("A", 2i64);
        source.seed("B", 3i64);
        let target = ViewModel::new("View");
        target.seed("Sum", 0i64);

        let _binding = BindingBuilder::new(context())
            .source_expression(source.clone(), "A + B")
            .target_path(target.clone(), "Sum")
            .build()
            .unwrap();

        assert_eq!(member(&target, "Sum"), Value::Int(5));
        source.set_member("A", Value::Int(5));
        assert_eq!(member(&target, "Sum"), Value::Int(8));
    }

    #[test]
    fn delayed_flow_coalesces_a_burst() {
        let (context, scheduler) = manual_context();
        let source = ViewModel::new("Model");
        source.seed("A", 0i64);
        let target = ViewModel::new("View");
        target.seed("B", 99i64);

        let _binding = BindingBuilder::new(context)
            .source_path(source.clone(), "A")
            .target_path(target.clone(), "B")
            .delay(std::time::Duration::from_millis(5))
            .build()
            .unwrap();

        // Even the initial flow is debounced.
        assert_eq!(member(&target, "B"), Value::Int(99));
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(member(&target, "B"), Value::Int(0));

        source.set_member("A", Value::Int(1));
        source.set_member("A", Value::Int(2));
        source.set_member("A", Value::Int(3));
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(member(&target, "B"), Value::Int(0));

        scheduler.run_pending();
        assert_eq!(member(&target, "B"), Value::Int(3));
    }

    #[test]
    fn dispose_releases_everything() {
        let source = ViewModel::new("Model");
        source.seed("Name", "a");
        let target = ViewModel::new("View");
        target.seed("Text", "");

        let binding = BindingBuilder::new(context())
            .source_path(source.clone(), "Name")
            .target_path(target.clone(), "Text")
            .build()
            .unwrap();
        assert!(source.listener_count() > 0);

        binding.dispose();
        assert_eq!(binding.state(), BindingState::Disposed);
        assert_eq!(source.listener_count(), 0);
        assert_eq!(target.listener_count(), 0);

        source.set_member("Name", Value::from("b"));
        assert_eq!(member(&target, "Text"), Value::from("a"));

        binding.update_target();
        assert_eq!(member(&target, "Text"), Value::from("a"));
        binding.dispose();
    }

    #[test]
    fn missing_endpoints_fail_build() {
        let target = ViewModel::new("View");
        target.seed("Text", "");

        let err = BindingBuilder::new(context())
            .target_path(target.clone(), "Text")
            .build()
            .unwrap_err();
        assert!(matches!(err, BindingError::MissingSource));

        let err = BindingBuilder::new(context())
            .source_constant(Value::Null)
            .build()
            .unwrap_err();
        assert!(matches!(err, BindingError::MissingTarget));
    }

    #[test]
    fn unknown_named_converter_fails_build() {
        let source = ViewModel::new("Model");
        source.seed("A", 1i64);
        let target = ViewModel::new("View");
        target.seed("B", 0i64);

        let err = BindingBuilder::new(context())
            .source_path(source.clone(), "A")
            .target_path(target.clone(), "B")
            .converter_named("upper")
            .build()
            .unwrap_err();
        assert!(matches!(err, BindingError::UnknownConverter { name } if name == "upper"));
    }

    #[test]
    fn source_writing_modes_require_a_path_source() {
        let model = ViewModel::new("Model");
        model.seed("A", 1i64);
        let target = ViewModel::new("View");
        target.seed("B", 0i64);

        let err = BindingBuilder::new(context())
            .mode(BindingMode::TwoWay)
            .source_constant(Value::Int(1))
            .target_path(target.clone(), "B")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BindingError::UnwritableSource {
                mode: BindingMode::TwoWay
            }
        ));

        let err = BindingBuilder::new(context())
            .mode(BindingMode::OneWayToSource)
            .source_expression(model.clone(), "A + 1")
            .target_path(target.clone(), "B")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BindingError::UnwritableSource {
                mode: BindingMode::OneWayToSource
            }
        ));
        assert_eq!(target.listener_count(), 0);
    }

    #[test]
    fn failed_source_endpoint_disposes_the_target() {
        let source = ViewModel::new("Model");
        let target = ViewModel::new("View");
        target.seed("Text", "");

        let err = BindingBuilder::new(context())
            .source_path(source.clone(), "Missing")
            .target_path(target.clone(), "Text")
            .build()
            .unwrap_err();
        assert!(matches!(err, BindingError::Observation(_)));
        assert_eq!(target.listener_count(), 0);
    }

    #[test]
    fn optional_path_tolerates_a_null_intermediate() {
        let source = ViewModel::new("Model");
        source.seed("A", Value::Null);
        let target = ViewModel::new("View");
        target.seed("Text", 0i64);

        let _binding = BindingBuilder::new(context())
            .source_path(source.clone(), "A?.B")
            .target_path(target.clone(), "Text")
            .optional()
            .build()
            .unwrap();

        assert_eq!(member(&target, "Text"), Value::Null);

        let child = ViewModel::new("Child");
        child.seed("B", 9i64);
        source.set_member("A", child.as_value());
        assert_eq!(member(&target, "Text"), Value::Int(9));
    }
}
