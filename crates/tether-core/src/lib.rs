#![forbid(unsafe_code)]

//! Core contracts for the tether data-binding engine.
//!
//! This crate is the leaf of the tether workspace. It defines:
//!
//! - [`Value`]: the dynamic value model binding expressions evaluate over.
//! - [`DynObject`]: the trait a bindable object graph implements, plus the
//!   in-crate [`ViewModel`] property bag and [`ObservableList`].
//! - [`MemberDescriptor`] / [`MemberProvider`]: the closed descriptor set and
//!   the open provider extension point used instead of runtime reflection.
//! - [`MemberObserverAdapter`]: the change-notification seam. Observing must
//!   never fail; unsupported targets yield a no-op [`Subscription`].
//! - [`Scheduler`]: the execution seam used by delay/debounce and
//!   cross-thread write marshaling. The engine never blocks on it.
//!
//! Higher layers (`tether-expr`, `tether-observe`, `tether-binding`) consume
//! these contracts and never reach around them.

pub mod context;
pub mod member;
pub mod notify;
pub mod object;
pub mod provider;
pub mod scheduler;
pub mod value;

pub use context::EngineContext;
pub use member::{AccessError, Getter, Invoker, MemberDescriptor, MemberFlags, MemberKind, Setter};
pub use notify::{ChangeEvent, ChangeListener, ListenerSet, Subscription};
pub use object::{DynObject, MethodHandler, ObservableList, ViewModel};
pub use provider::{DefaultObserverAdapter, DynamicMemberProvider, MemberObserverAdapter, MemberProvider};
pub use scheduler::{ExecutionMode, ImmediateScheduler, ManualScheduler, ScheduledTask, Scheduler, ThreadScheduler};
pub use value::{Value, ValueKind};
