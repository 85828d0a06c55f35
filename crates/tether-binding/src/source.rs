//! Binding endpoints.
//!
//! Either side of a binding is an [`Endpoint`]: a live path observer, an
//! immutable constant, or a compiled expression over a source root. The
//! expression form owns one path observer per member chain the expression
//! references; any chain change re-evaluates the whole expression.

use std::sync::{Arc, Weak};

use tracing::trace;

use tether_core::{DynObject, EngineContext, MemberFlags, Value, ValueKind};
use tether_expr::compile::{CompileMetadata, CompiledExpression, Compiler};
use tether_expr::{parse, source_paths};
use tether_observe::{
    MemberPath, ObservationError, ObserverFlags, PathObserver, PathObserverListener,
};

use crate::error::{BindingError, FlowError};

pub(crate) enum Endpoint {
    Observer(Arc<PathObserver>),
    Constant(Value),
    Expression(ExpressionEndpoint),
}

pub(crate) struct ExpressionEndpoint {
    compiled: Arc<CompiledExpression>,
    root: Weak<dyn DynObject>,
    /// Free chain-root identifiers, in compiled parameter order.
    roots: Vec<Arc<str>>,
    observers: Vec<Arc<PathObserver>>,
    context: Arc<EngineContext>,
}

impl Endpoint {
    /// Build a path endpoint. A resolution failure during the initial chain
    /// build is a construction failure.
    pub(crate) fn path(
        root: &Arc<dyn DynObject>,
        path_text: &str,
        flags: ObserverFlags,
        context: Arc<EngineContext>,
        listener: Weak<dyn PathObserverListener>,
    ) -> Result<Self, BindingError> {
        let path = MemberPath::resolve(path_text)?;
        let observer = PathObserver::observe(root, path, flags, context, listener);
        if let Some(error) = observer.last_error() {
            observer.dispose();
            return Err(BindingError::Observation(error));
        }
        Ok(Self::Observer(observer))
    }

    /// Build an expression endpoint over `root`: parse, compile with one
    /// positional parameter per free chain root, and observe every chain.
    pub(crate) fn expression(
        root: &Arc<dyn DynObject>,
        text: &str,
        flags: ObserverFlags,
        context: Arc<EngineContext>,
        compiler: &Compiler,
        listener: &Weak<dyn PathObserverListener>,
    ) -> Result<Self, BindingError> {
        let expr = parse(text)?;
        let paths = source_paths(&expr);
        let roots = chain_roots(&paths);
        trace!(text, chains = paths.len(), "building expression endpoint");

        let root_value = Value::Object(Arc::clone(root));
        let mut metadata = CompileMetadata::new();
        for name in &roots {
            // Shapes feed the compilation cache key; a currently missing
            // member simply compiles against the null shape.
            let kind = read_root_member(&context, &root_value, name)
                .map_or(ValueKind::Null, |value| value.kind());
            metadata = metadata.with_parameter(Arc::clone(name), kind);
        }
        let compiled = compiler.compile(&expr, &metadata)?;

        let mut observers: Vec<Arc<PathObserver>> = Vec::with_capacity(paths.len());
        for path_text in &paths {
            let path = MemberPath::resolve(path_text)?;
            let observer = PathObserver::observe(
                root,
                path,
                flags,
                Arc::clone(&context),
                listener.clone(),
            );
            if let Some(error) = observer.last_error() {
                observer.dispose();
                for built in &observers {
                    built.dispose();
                }
                return Err(BindingError::Observation(error));
            }
            observers.push(observer);
        }
        Ok(Self::Expression(ExpressionEndpoint {
            compiled,
            root: Arc::downgrade(root),
            roots,
            observers,
            context,
        }))
    }

    pub(crate) fn constant(value: Value) -> Self {
        Self::Constant(value)
    }

    /// Current value of this endpoint.
    pub(crate) fn read(&self) -> Result<Value, FlowError> {
        match self {
            Self::Observer(observer) => match observer.last_error() {
                Some(error) => Err(FlowError::Observation(error)),
                None => Ok(observer.value()),
            },
            Self::Constant(value) => Ok(value.clone()),
            Self::Expression(endpoint) => endpoint.evaluate(),
        }
    }

    /// Write a value through this endpoint. Constants and expressions are
    /// not writable.
    pub(crate) fn write(&self, value: Value) -> Result<(), FlowError> {
        match self {
            Self::Observer(observer) => observer.set_value(value).map_err(FlowError::from),
            Self::Constant(_) | Self::Expression(_) => Err(FlowError::NotWritable),
        }
    }

    /// Release every observer subscription. Compiled expressions stay in
    /// the shared cache untouched.
    pub(crate) fn dispose(&self) {
        match self {
            Self::Observer(observer) => observer.dispose(),
            Self::Constant(_) => {}
            Self::Expression(endpoint) => {
                for observer in &endpoint.observers {
                    observer.dispose();
                }
            }
        }
    }
}

impl ExpressionEndpoint {
    fn evaluate(&self) -> Result<Value, FlowError> {
        // A collected root makes the endpoint dormant rather than failed.
        let Some(root) = self.root.upgrade() else {
            return Ok(Value::Null);
        };
        let root_value = Value::Object(root);
        let args: Vec<Value> = self
            .roots
            .iter()
            .map(|name| read_root_member(&self.context, &root_value, name))
            .collect::<Result<_, _>>()?;
        self.compiled.invoke(&args).map_err(FlowError::from)
    }
}

/// Distinct leading identifiers of the extracted chains, in first-seen
/// order. `"A.B[0].C"` contributes `A`; `"Count"` contributes itself.
fn chain_roots(paths: &[String]) -> Vec<Arc<str>> {
    let mut roots: Vec<Arc<str>> = Vec::new();
    for path in paths {
        let end = path
            .find(['.', '?', '['])
            .unwrap_or(path.len());
        let name = &path[..end];
        if !roots.iter().any(|r| &**r == name) {
            roots.push(Arc::from(name));
        }
    }
    roots
}

fn read_root_member(
    context: &EngineContext,
    root: &Value,
    name: &Arc<str>,
) -> Result<Value, FlowError> {
    let type_name = root.type_name();
    let descriptor = context
        .members
        .try_get_member(&type_name, name, MemberFlags::instance_read())
        .ok_or_else(|| {
            FlowError::Observation(ObservationError::MemberResolution {
                type_name,
                member: Arc::clone(name),
            })
        })?;
    descriptor
        .get(root, &[])
        .map_err(|error| FlowError::Observation(ObservationError::Access(error)))
}
