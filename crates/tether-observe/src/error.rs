//! Observation failures surfaced through listener callbacks.

use std::sync::Arc;

use thiserror::Error;
use tether_core::AccessError;

/// Why a path observer could not produce or maintain a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObservationError {
    /// A non-optional intermediate segment resolved to null, so the rest of
    /// the path has no owner.
    #[error("path '{path}' has no object at segment '{segment}'")]
    MissingIntermediate { path: Arc<str>, segment: Arc<str> },

    /// The provider has no member of this name on the owner's type.
    #[error("cannot resolve member '{member}' on type '{type_name}'")]
    MemberResolution {
        type_name: Arc<str>,
        member: Arc<str>,
    },

    /// Reading or writing through a resolved descriptor failed.
    #[error(transparent)]
    Access(#[from] AccessError),
}
