//! Value interceptor pipeline.
//!
//! Interceptors sit between reading one endpoint and writing the other.
//! Each stage may pass the value on (possibly transformed), fail the flow,
//! or take ownership and resume later through its [`FlowToken`]. The token
//! carries a weak binding handle plus the pipeline position after this
//! stage, so a deferred stage re-enters exactly where it left off and a
//! disposed binding silently swallows the resume.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::debug;

use tether_core::{Scheduler, Value};

use crate::binding::Binding;
use crate::error::FlowError;
use crate::mode::FlowDirection;

/// Outcome of one interceptor stage.
pub enum InterceptResult {
    /// Pass this value to the next stage.
    Continue(Value),
    /// The stage took ownership and will resume via its token.
    Deferred,
    /// Abort the flow and report the failure.
    Failed(FlowError),
}

/// Resume handle for a deferred flow.
#[derive(Clone)]
pub struct FlowToken {
    pub(crate) binding: Weak<Binding>,
    pub(crate) next: usize,
    pub(crate) direction: FlowDirection,
}

impl FlowToken {
    /// Re-enter the pipeline after the deferring stage. A collected or
    /// disposed binding ignores the resume.
    pub fn resume(&self, value: Value) {
        if let Some(binding) = self.binding.upgrade() {
            binding.resume_flow(value, self.direction, self.next);
        }
    }
}

/// One stage of the pipeline.
pub trait ValueInterceptor: Send + Sync {
    fn intercept(&self, value: Value, direction: FlowDirection, token: FlowToken)
    -> InterceptResult;
}

/// Bidirectional value conversion. `convert` runs source-to-target,
/// `convert_back` target-to-source; the default back-conversion is identity.
pub trait ValueConverter: Send + Sync {
    fn convert(&self, value: Value) -> Result<Value, FlowError>;

    fn convert_back(&self, value: Value) -> Result<Value, FlowError> {
        Ok(value)
    }
}

/// Looks converters up by registered name.
pub trait ConverterResolver: Send + Sync {
    fn try_resolve(&self, name: &str) -> Option<Arc<dyn ValueConverter>>;
}

/// Pipeline stage applying a [`ValueConverter`] in the flow direction.
pub struct ConvertInterceptor {
    converter: Arc<dyn ValueConverter>,
}

impl ConvertInterceptor {
    #[must_use]
    pub fn new(converter: Arc<dyn ValueConverter>) -> Self {
        Self { converter }
    }
}

impl ValueInterceptor for ConvertInterceptor {
    fn intercept(
        &self,
        value: Value,
        direction: FlowDirection,
        _token: FlowToken,
    ) -> InterceptResult {
        let converted = match direction {
            FlowDirection::ToTarget => self.converter.convert(value),
            FlowDirection::ToSource => self.converter.convert_back(value),
        };
        match converted {
            Ok(value) => InterceptResult::Continue(value),
            Err(error) => InterceptResult::Failed(error),
        }
    }
}

/// Check applied to every flowing value.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Pipeline stage rejecting values that fail a predicate. Failures surface
/// through the binding-error listener channel.
pub struct ValidateInterceptor {
    check: Validator,
}

impl ValidateInterceptor {
    #[must_use]
    pub fn new(check: Validator) -> Self {
        Self { check }
    }
}

impl ValueInterceptor for ValidateInterceptor {
    fn intercept(
        &self,
        value: Value,
        _direction: FlowDirection,
        _token: FlowToken,
    ) -> InterceptResult {
        match (self.check)(&value) {
            Ok(()) => InterceptResult::Continue(value),
            Err(reason) => InterceptResult::Failed(FlowError::Validation(reason)),
        }
    }
}

/// Trailing-edge debounce.
///
/// Rapid changes coalesce into one scheduled write carrying the latest
/// value: the first change in a burst schedules the flush, later changes
/// only replace the pending value. The flush resumes the pipeline through
/// the token, which re-checks binding validity because dispose may race
/// with the scheduler.
pub struct DelayInterceptor {
    delay: Duration,
    scheduler: Arc<dyn Scheduler>,
    slots: Arc<PendingSlots>,
}

/// Latest value awaiting flush, one slot per direction. `Some` doubles as
/// "a flush is scheduled".
#[derive(Default)]
struct PendingSlots {
    values: [Mutex<Option<Value>>; 2],
}

impl PendingSlots {
    fn slot(&self, direction: FlowDirection) -> &Mutex<Option<Value>> {
        &self.values[match direction {
            FlowDirection::ToTarget => 0,
            FlowDirection::ToSource => 1,
        }]
    }
}

impl DelayInterceptor {
    #[must_use]
    pub fn new(delay: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            delay,
            scheduler,
            slots: Arc::new(PendingSlots::default()),
        }
    }
}

impl ValueInterceptor for DelayInterceptor {
    fn intercept(
        &self,
        value: Value,
        direction: FlowDirection,
        token: FlowToken,
    ) -> InterceptResult {
        let already_scheduled = {
            let mut pending = self
                .slots
                .slot(direction)
                .lock()
                .expect("delay slot poisoned");
            let scheduled = pending.is_some();
            *pending = Some(value);
            scheduled
        };
        if already_scheduled {
            debug!(?direction, "coalescing into pending delayed write");
            return InterceptResult::Deferred;
        }
        let slots = Arc::clone(&self.slots);
        let scheduled = self.scheduler.execute_after(
            self.delay,
            Box::new(move || {
                // Always flush the latest value, whatever this task was
                // scheduled for.
                let value = slots
                    .slot(direction)
                    .lock()
                    .expect("delay slot poisoned")
                    .take();
                if let Some(value) = value {
                    token.resume(value);
                }
            }),
        );
        if scheduled {
            InterceptResult::Deferred
        } else {
            self.slots
                .slot(direction)
                .lock()
                .expect("delay slot poisoned")
                .take();
            InterceptResult::Failed(FlowError::Schedule)
        }
    }
}
