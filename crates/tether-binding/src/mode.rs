//! Binding modes, states, and triggers.

/// How values move between the two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingMode {
    /// Flow source to target once at construction; keep no observers.
    OneTime,
    /// Source changes flow to the target.
    #[default]
    OneWay,
    /// Changes flow both ways with reciprocal-write suppression.
    TwoWay,
    /// Target changes flow to the source.
    OneWayToSource,
}

/// When observed changes actually flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateTrigger {
    /// Flow on every endpoint change notification.
    #[default]
    PropertyChanged,
    /// Flow only on explicit `update_target()` / `update_source()` calls.
    Explicit,
}

/// Lifecycle of a binding.
///
/// `Valid` is initial, `Disposed` is terminal. `Invalid` is transient:
/// entered on an endpoint failure, left again on the next successful flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Valid,
    Invalid,
    Disposed,
}

/// Direction of one value flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// Source endpoint to target endpoint.
    ToTarget,
    /// Target endpoint to source endpoint.
    ToSource,
}
