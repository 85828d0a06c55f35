//! The binding state machine.
//!
//! A [`Binding`] owns two endpoints and an interceptor pipeline. Endpoint
//! change notifications arrive through [`SideListener`] adapters, get gated
//! by mode and trigger, and then flow: read the originating endpoint, run
//! the pipeline, write the opposite endpoint. A single last-flowed slot
//! suppresses the reciprocal notification a write raises on the side it
//! just wrote.
//!
//! Invariants
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | no notification ping-pong      | `flow` compares against `last_flowed` |
//! | flow errors never tear down    | `report` moves `Valid` to `Invalid` only |
//! | `Disposed` is terminal         | every entry point checks state first |
//! | listeners run outside locks    | `report` snapshots before calling |

use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use tether_core::Value;
use tether_observe::{ObservationError, PathObserver, PathObserverListener};

use crate::error::FlowError;
use crate::interceptor::{FlowToken, InterceptResult, ValueInterceptor};
use crate::mode::{BindingMode, BindingState, FlowDirection, UpdateTrigger};
use crate::source::Endpoint;

/// Callback invoked when a live flow fails.
pub type BindingErrorListener = Arc<dyn Fn(&FlowError) + Send + Sync>;

/// A live connection between a source and a target endpoint.
pub struct Binding {
    mode: BindingMode,
    trigger: UpdateTrigger,
    state: Mutex<BindingState>,
    source: Endpoint,
    target: Endpoint,
    interceptors: Vec<Arc<dyn ValueInterceptor>>,
    /// Value most recently written through either endpoint; an incoming
    /// read equal to it is the echo of that write and is dropped.
    last_flowed: Mutex<Option<Value>>,
    error_listeners: Mutex<Vec<BindingErrorListener>>,
    weak_self: Weak<Self>,
    /// Keeps the observer listeners alive for the binding's lifetime.
    _side_listeners: Vec<Arc<SideListener>>,
}

impl Binding {
    pub(crate) fn assemble(
        mode: BindingMode,
        trigger: UpdateTrigger,
        source: Endpoint,
        target: Endpoint,
        interceptors: Vec<Arc<dyn ValueInterceptor>>,
        error_listeners: Vec<BindingErrorListener>,
        side_listeners: Vec<Arc<SideListener>>,
    ) -> Arc<Self> {
        let binding = Arc::new_cyclic(|weak| Self {
            mode,
            trigger,
            state: Mutex::new(BindingState::Valid),
            source,
            target,
            interceptors,
            last_flowed: Mutex::new(None),
            error_listeners: Mutex::new(error_listeners),
            weak_self: weak.clone(),
            _side_listeners: side_listeners,
        });
        for listener in &binding._side_listeners {
            listener.attach(&binding);
        }
        binding
    }

    #[must_use]
    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    #[must_use]
    pub fn trigger(&self) -> UpdateTrigger {
        self.trigger
    }

    #[must_use]
    pub fn state(&self) -> BindingState {
        *self.state.lock().expect("binding state poisoned")
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state() == BindingState::Disposed
    }

    pub fn add_error_listener(&self, listener: BindingErrorListener) {
        if self.is_disposed() {
            return;
        }
        self.error_listeners
            .lock()
            .expect("binding listeners poisoned")
            .push(listener);
    }

    /// Explicitly flow source to target. No-op once disposed, and for
    /// `OneTime` bindings, whose observers are already released.
    pub fn update_target(&self) {
        if self.mode == BindingMode::OneTime {
            return;
        }
        self.flow(FlowDirection::ToTarget);
    }

    /// Explicitly flow target to source.
    pub fn update_source(&self) {
        if self.mode == BindingMode::OneTime {
            return;
        }
        self.flow(FlowDirection::ToSource);
    }

    /// Release both endpoints and all listeners. Idempotent; a disposed
    /// binding ignores every later flow, resume, and notification.
    pub fn dispose(&self) {
        {
            let mut state = self.state.lock().expect("binding state poisoned");
            if *state == BindingState::Disposed {
                return;
            }
            *state = BindingState::Disposed;
        }
        debug!("disposing binding");
        self.source.dispose();
        self.target.dispose();
        self.error_listeners
            .lock()
            .expect("binding listeners poisoned")
            .clear();
    }

    /// Observed-change entry point, gated by trigger and mode.
    fn on_endpoint_changed(&self, direction: FlowDirection) {
        if self.trigger == UpdateTrigger::Explicit {
            return;
        }
        let allowed = match direction {
            FlowDirection::ToTarget => {
                matches!(self.mode, BindingMode::OneWay | BindingMode::TwoWay)
            }
            FlowDirection::ToSource => {
                matches!(self.mode, BindingMode::TwoWay | BindingMode::OneWayToSource)
            }
        };
        if allowed {
            self.flow(direction);
        }
    }

    /// Read the originating endpoint and, unless the value is the echo of
    /// the previous write, push it through the pipeline.
    pub(crate) fn flow(&self, direction: FlowDirection) {
        if self.is_disposed() {
            return;
        }
        let from = match direction {
            FlowDirection::ToTarget => &self.source,
            FlowDirection::ToSource => &self.target,
        };
        let value = match from.read() {
            Ok(value) => value,
            Err(error) => {
                self.report(&error);
                return;
            }
        };
        {
            // total_eq: an echoed NaN must still match the slot.
            let last = self.last_flowed.lock().expect("binding echo slot poisoned");
            if last.as_ref().is_some_and(|last| last.total_eq(&value)) {
                trace!(?direction, "suppressing reciprocal flow");
                return;
            }
        }
        self.resume_flow(value, direction, 0);
    }

    /// Run the pipeline from `index` and write the result. Deferred stages
    /// re-enter here through their [`FlowToken`].
    pub(crate) fn resume_flow(&self, value: Value, direction: FlowDirection, index: usize) {
        if self.is_disposed() {
            return;
        }
        let mut current = value;
        for (i, stage) in self.interceptors.iter().enumerate().skip(index) {
            let token = FlowToken {
                binding: self.weak_self.clone(),
                next: i + 1,
                direction,
            };
            match stage.intercept(current, direction, token) {
                InterceptResult::Continue(value) => current = value,
                InterceptResult::Deferred => return,
                InterceptResult::Failed(error) => {
                    self.report(&error);
                    return;
                }
            }
        }
        self.write(current, direction);
    }

    fn write(&self, value: Value, direction: FlowDirection) {
        // Record before writing so the reciprocal notification, which may
        // fire synchronously inside the write, sees the slot filled.
        *self.last_flowed.lock().expect("binding echo slot poisoned") = Some(value.clone());
        let to = match direction {
            FlowDirection::ToTarget => &self.target,
            FlowDirection::ToSource => &self.source,
        };
        match to.write(value) {
            Ok(()) => {
                let mut state = self.state.lock().expect("binding state poisoned");
                if *state == BindingState::Invalid {
                    *state = BindingState::Valid;
                }
            }
            Err(error) => self.report(&error),
        }
    }

    fn report(&self, error: &FlowError) {
        debug!(%error, "binding flow failed");
        {
            let mut state = self.state.lock().expect("binding state poisoned");
            if *state == BindingState::Valid {
                *state = BindingState::Invalid;
            }
        }
        let listeners: Vec<BindingErrorListener> = self
            .error_listeners
            .lock()
            .expect("binding listeners poisoned")
            .clone();
        for listener in &listeners {
            listener(error);
        }
    }

    /// Drop observer subscriptions while leaving the binding `Valid`. Used
    /// after the one and only `OneTime` flow.
    pub(crate) fn release_observers(&self) {
        self.source.dispose();
        self.target.dispose();
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("mode", &self.mode)
            .field("trigger", &self.trigger)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Adapter routing path-observer notifications for one side into the
/// binding. Built before the binding exists, so the back-pointer is filled
/// in by `attach` during assembly.
pub(crate) struct SideListener {
    binding: Mutex<Weak<Binding>>,
    /// Direction a change on this side flows in.
    direction: FlowDirection,
}

impl SideListener {
    pub(crate) fn new(direction: FlowDirection) -> Arc<Self> {
        Arc::new(Self {
            binding: Mutex::new(Weak::new()),
            direction,
        })
    }

    pub(crate) fn attach(&self, binding: &Arc<Binding>) {
        *self.binding.lock().expect("side listener poisoned") = Arc::downgrade(binding);
    }

    fn binding(&self) -> Option<Arc<Binding>> {
        self.binding
            .lock()
            .expect("side listener poisoned")
            .upgrade()
    }
}

impl PathObserverListener for SideListener {
    fn on_value_changed(&self, _observer: &PathObserver, _value: &Value) {
        if let Some(binding) = self.binding() {
            binding.on_endpoint_changed(self.direction);
        }
    }

    fn on_error(&self, _observer: &PathObserver, error: &ObservationError) {
        if let Some(binding) = self.binding() {
            binding.report(&FlowError::Observation(error.clone()));
        }
    }
}
