//! Member path resolution and live observation.
//!
//! A [`MemberPath`] is the parsed form of dotted/indexed path text
//! (`"A.B[0].C"`), shared through a global resolution cache. A
//! [`PathObserver`] walks such a path over a live object graph and keeps one
//! subscription per reachable segment, renotifying as intermediates repoint
//! and the final value changes.
//!
//! The observer layer is deliberately expression-free: the bridge from
//! binding expressions to paths is `tether-expr`'s source-path extraction.

#![forbid(unsafe_code)]

pub mod error;
pub mod observer;
pub mod path;

pub use error::ObservationError;
pub use observer::{ObserverFlags, PathObserver, PathObserverListener};
pub use path::{MemberPath, PathError, PathSegment};
