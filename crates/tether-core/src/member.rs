//! Member descriptors: the closed, trait-dispatched stand-in for reflection.
//!
//! A [`MemberDescriptor`] is what a [`MemberProvider`](crate::provider::MemberProvider)
//! hands back for a `(type, name, flags)` request: a small record plus
//! getter/setter/invoker closures. Descriptors are immutable and freely
//! shared (`Arc`) across observers and compiled evaluators.

use std::sync::Arc;

use bitflags::bitflags;
use thiserror::Error;

use crate::value::{Value, ValueKind};

bitflags! {
    /// Request and capability flags for member resolution.
    ///
    /// Requests combine a member kind (`ACCESSOR`/`METHOD`/`EVENT`) with
    /// scope (`INSTANCE`/`STATIC`) and access (`READABLE`/`WRITABLE`) bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u8 {
        const ACCESSOR = 1 << 0;
        const METHOD = 1 << 1;
        const EVENT = 1 << 2;
        const INSTANCE = 1 << 3;
        const STATIC = 1 << 4;
        const READABLE = 1 << 5;
        const WRITABLE = 1 << 6;
    }
}

impl MemberFlags {
    /// The common request: an instance accessor for reading.
    #[must_use]
    pub fn instance_read() -> Self {
        Self::ACCESSOR | Self::INSTANCE | Self::READABLE
    }

    /// An instance accessor for writing.
    #[must_use]
    pub fn instance_write() -> Self {
        Self::ACCESSOR | Self::INSTANCE | Self::WRITABLE
    }

    /// An instance method request.
    #[must_use]
    pub fn instance_method() -> Self {
        Self::METHOD | Self::INSTANCE
    }
}

/// What kind of member a descriptor exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Accessor,
    Method,
    Event,
}

/// Failure while reading, writing, or invoking through a descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("no member '{member}' on type '{type_name}'")]
    MissingMember {
        type_name: Arc<str>,
        member: Arc<str>,
    },
    #[error("member '{0}' is not readable")]
    NotReadable(Arc<str>),
    #[error("member '{0}' is not writable")]
    NotWritable(Arc<str>),
    #[error("member '{0}' is not invokable")]
    NotInvokable(Arc<str>),
    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("invalid index arguments: {0}")]
    InvalidIndex(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: ValueKind,
    },
}

/// Read a member value from an owner. Index arguments are empty for plain
/// accessors and carry the indexer arguments for `Item` descriptors.
pub type Getter = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, AccessError> + Send + Sync>;
/// Write a member value to an owner.
pub type Setter = Arc<dyn Fn(&Value, &[Value], Value) -> Result<(), AccessError> + Send + Sync>;
/// Invoke a method member on an owner.
pub type Invoker = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, AccessError> + Send + Sync>;

/// Resolved member metadata plus access closures.
#[derive(Clone)]
pub struct MemberDescriptor {
    pub name: Arc<str>,
    pub declaring_type: Arc<str>,
    pub kind: MemberKind,
    pub flags: MemberFlags,
    getter: Option<Getter>,
    setter: Option<Setter>,
    invoker: Option<Invoker>,
}

impl MemberDescriptor {
    /// An accessor member with optional read/write halves.
    #[must_use]
    pub fn accessor(
        name: impl Into<Arc<str>>,
        declaring_type: impl Into<Arc<str>>,
        getter: Option<Getter>,
        setter: Option<Setter>,
    ) -> Self {
        let mut flags = MemberFlags::ACCESSOR | MemberFlags::INSTANCE;
        if getter.is_some() {
            flags |= MemberFlags::READABLE;
        }
        if setter.is_some() {
            flags |= MemberFlags::WRITABLE;
        }
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            kind: MemberKind::Accessor,
            flags,
            getter,
            setter,
            invoker: None,
        }
    }

    /// A method member.
    #[must_use]
    pub fn method(
        name: impl Into<Arc<str>>,
        declaring_type: impl Into<Arc<str>>,
        invoker: Invoker,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            kind: MemberKind::Method,
            flags: MemberFlags::METHOD | MemberFlags::INSTANCE,
            getter: None,
            setter: None,
            invoker: Some(invoker),
        }
    }

    /// An event member (observed through the notification adapter).
    #[must_use]
    pub fn event(name: impl Into<Arc<str>>, declaring_type: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            kind: MemberKind::Event,
            flags: MemberFlags::EVENT | MemberFlags::INSTANCE,
            getter: None,
            setter: None,
            invoker: None,
        }
    }

    #[must_use]
    pub fn can_read(&self) -> bool {
        self.flags.contains(MemberFlags::READABLE)
    }

    #[must_use]
    pub fn can_write(&self) -> bool {
        self.flags.contains(MemberFlags::WRITABLE)
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    /// Read through the getter.
    pub fn get(&self, owner: &Value, args: &[Value]) -> Result<Value, AccessError> {
        match &self.getter {
            Some(getter) => getter(owner, args),
            None => Err(AccessError::NotReadable(self.name.clone())),
        }
    }

    /// Write through the setter.
    pub fn set(&self, owner: &Value, args: &[Value], value: Value) -> Result<(), AccessError> {
        match &self.setter {
            Some(setter) => setter(owner, args, value),
            None => Err(AccessError::NotWritable(self.name.clone())),
        }
    }

    /// Invoke the method.
    pub fn invoke(&self, owner: &Value, args: &[Value]) -> Result<Value, AccessError> {
        match &self.invoker {
            Some(invoker) => invoker(owner, args),
            None => Err(AccessError::NotInvokable(self.name.clone())),
        }
    }
}

impl std::fmt::Debug for MemberDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberDescriptor")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .finish()
    }
}
