//! Member providers and the change-notification adapter.
//!
//! [`MemberProvider`] is the open extension point platform integrations
//! implement; [`DynamicMemberProvider`] serves any [`DynObject`] property bag
//! plus the built-in list/string members. Resolved descriptors are cached per
//! `(type, name, flags)` in a concurrent map: duplicate concurrent resolution
//! work is acceptable, duplicate visible entries are not.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::member::{AccessError, MemberDescriptor, MemberFlags, MemberKind};
use crate::notify::{ChangeEvent, ChangeListener, Subscription};
use crate::value::Value;

/// Indexer member name (`obj[i]` resolves to the `Item` member).
pub const ITEM_MEMBER: &str = "Item";

/// Resolves member descriptors against logical type names.
pub trait MemberProvider: Send + Sync {
    /// Resolve a single member, or `None` when the type has no such member.
    fn try_get_member(
        &self,
        type_name: &str,
        name: &str,
        flags: MemberFlags,
    ) -> Option<Arc<MemberDescriptor>>;

    /// Resolve all candidates for an ambiguous/overloaded name. The default
    /// forwards to [`try_get_member`](Self::try_get_member).
    fn try_get_members(
        &self,
        type_name: &str,
        name: &str,
        flags: MemberFlags,
    ) -> Vec<Arc<MemberDescriptor>> {
        self.try_get_member(type_name, name, flags)
            .into_iter()
            .collect()
    }
}

/// Observes a member on a live value.
///
/// Must never fail: unsupported targets or member kinds yield
/// [`Subscription::none`]. Observing the same listener twice yields two
/// subscriptions (de-dup is implementation-defined and not performed here).
pub trait MemberObserverAdapter: Send + Sync {
    fn try_observe(
        &self,
        target: &Value,
        member: &MemberDescriptor,
        listener: ChangeListener,
    ) -> Subscription;
}

type DescriptorKey = (Arc<str>, Arc<str>, u8);

/// Provider for dynamic property-bag objects and built-in value members.
///
/// Any name resolves against an object type (the bag decides at access time
/// whether the member exists); lists and strings expose `Item` and `Count`.
pub struct DynamicMemberProvider {
    cache: DashMap<DescriptorKey, Arc<MemberDescriptor>, ahash::RandomState>,
}

impl Default for DynamicMemberProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicMemberProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Number of cached descriptors.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn build(type_name: &Arc<str>, name: &Arc<str>, flags: MemberFlags) -> Arc<MemberDescriptor> {
        if flags.contains(MemberFlags::METHOD) {
            let method_name = Arc::clone(name);
            let invoker = Arc::new(move |owner: &Value, args: &[Value]| match owner {
                Value::Object(obj) => obj
                    .invoke(&method_name, args)
                    .ok_or_else(|| AccessError::NotInvokable(Arc::clone(&method_name))),
                other => Err(AccessError::TypeMismatch {
                    expected: "object",
                    found: other.kind(),
                }),
            });
            return Arc::new(MemberDescriptor::method(
                Arc::clone(name),
                Arc::clone(type_name),
                invoker,
            ));
        }
        if flags.contains(MemberFlags::EVENT) {
            return Arc::new(MemberDescriptor::event(
                Arc::clone(name),
                Arc::clone(type_name),
            ));
        }
        match &**name {
            ITEM_MEMBER => Self::item_descriptor(type_name, name),
            "Count" | "Length" => Self::count_descriptor(type_name, name),
            _ => Self::plain_descriptor(type_name, name),
        }
    }

    fn plain_descriptor(type_name: &Arc<str>, name: &Arc<str>) -> Arc<MemberDescriptor> {
        let get_name = Arc::clone(name);
        let getter = Arc::new(move |owner: &Value, _args: &[Value]| match owner {
            Value::Object(obj) => {
                obj.get_member(&get_name)
                    .ok_or_else(|| AccessError::MissingMember {
                        type_name: Arc::from(obj.type_name()),
                        member: Arc::clone(&get_name),
                    })
            }
            other => Err(AccessError::MissingMember {
                type_name: Arc::from(other.kind().to_string().as_str()),
                member: Arc::clone(&get_name),
            }),
        });
        let set_name = Arc::clone(name);
        let setter = Arc::new(
            move |owner: &Value, _args: &[Value], value: Value| match owner {
                Value::Object(obj) => {
                    if obj.set_member(&set_name, value) {
                        Ok(())
                    } else {
                        Err(AccessError::NotWritable(Arc::clone(&set_name)))
                    }
                }
                other => Err(AccessError::TypeMismatch {
                    expected: "object",
                    found: other.kind(),
                }),
            },
        );
        Arc::new(MemberDescriptor::accessor(
            Arc::clone(name),
            Arc::clone(type_name),
            Some(getter),
            Some(setter),
        ))
    }

    fn item_descriptor(type_name: &Arc<str>, name: &Arc<str>) -> Arc<MemberDescriptor> {
        let getter = Arc::new(|owner: &Value, args: &[Value]| index_get(owner, args));
        let setter =
            Arc::new(|owner: &Value, args: &[Value], value: Value| index_set(owner, args, value));
        Arc::new(MemberDescriptor::accessor(
            Arc::clone(name),
            Arc::clone(type_name),
            Some(getter),
            Some(setter),
        ))
    }

    fn count_descriptor(type_name: &Arc<str>, name: &Arc<str>) -> Arc<MemberDescriptor> {
        let get_name = Arc::clone(name);
        let getter = Arc::new(move |owner: &Value, _args: &[Value]| match owner {
            Value::List(list) => Ok(Value::Int(list.len() as i64)),
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::Object(obj) => {
                obj.get_member(&get_name)
                    .ok_or_else(|| AccessError::MissingMember {
                        type_name: Arc::from(obj.type_name()),
                        member: Arc::clone(&get_name),
                    })
            }
            other => Err(AccessError::MissingMember {
                type_name: Arc::from(other.kind().to_string().as_str()),
                member: Arc::clone(&get_name),
            }),
        });
        Arc::new(MemberDescriptor::accessor(
            Arc::clone(name),
            Arc::clone(type_name),
            Some(getter),
            None,
        ))
    }
}

impl MemberProvider for DynamicMemberProvider {
    fn try_get_member(
        &self,
        type_name: &str,
        name: &str,
        flags: MemberFlags,
    ) -> Option<Arc<MemberDescriptor>> {
        let key: DescriptorKey = (Arc::from(type_name), Arc::from(name), flags.bits());
        if let Some(hit) = self.cache.get(&key) {
            return Some(Arc::clone(&hit));
        }
        trace!(type_name, name, ?flags, "resolving member descriptor");
        let descriptor = Self::build(&key.0, &key.1, flags);
        // entry() gives insert-if-absent: a concurrent resolver may have won.
        let entry = self
            .cache
            .entry(key)
            .or_insert_with(|| Arc::clone(&descriptor));
        Some(Arc::clone(&entry))
    }
}

/// Index read shared by the `Item` descriptor and compiled index evaluators.
pub fn index_get(owner: &Value, args: &[Value]) -> Result<Value, AccessError> {
    match owner {
        Value::List(list) => {
            let index = int_index(args, list.len())?;
            list.get(index).ok_or(AccessError::IndexOutOfRange {
                index: index as i64,
                len: list.len(),
            })
        }
        Value::Object(obj) => obj
            .get_index(args)
            .ok_or_else(|| AccessError::InvalidIndex(format!("{args:?}"))),
        Value::Str(s) => {
            let count = s.chars().count();
            let index = int_index(args, count)?;
            s.chars()
                .nth(index)
                .map(|c| Value::Str(Arc::from(c.to_string().as_str())))
                .ok_or(AccessError::IndexOutOfRange {
                    index: index as i64,
                    len: count,
                })
        }
        other => Err(AccessError::TypeMismatch {
            expected: "list, object, or string",
            found: other.kind(),
        }),
    }
}

/// Index write shared by the `Item` descriptor and compiled assign evaluators.
pub fn index_set(owner: &Value, args: &[Value], value: Value) -> Result<(), AccessError> {
    match owner {
        Value::List(list) => {
            let index = int_index(args, list.len())?;
            if list.set(index, value) {
                Ok(())
            } else {
                Err(AccessError::IndexOutOfRange {
                    index: index as i64,
                    len: list.len(),
                })
            }
        }
        Value::Object(obj) => {
            if obj.set_index(args, value) {
                Ok(())
            } else {
                Err(AccessError::InvalidIndex(format!("{args:?}")))
            }
        }
        other => Err(AccessError::TypeMismatch {
            expected: "list or object",
            found: other.kind(),
        }),
    }
}

fn int_index(args: &[Value], len: usize) -> Result<usize, AccessError> {
    let [Value::Int(i)] = args else {
        return Err(AccessError::InvalidIndex(format!("{args:?}")));
    };
    if *i < 0 {
        return Err(AccessError::IndexOutOfRange { index: *i, len });
    }
    Ok(*i as usize)
}

/// Adapter observing [`DynObject`](crate::object::DynObject) and
/// [`ObservableList`](crate::object::ObservableList) values.
///
/// Accessor members filter by name; `Item` descriptors observe index events.
/// Scalars and event-kind mismatches fall back to a no-op subscription.
#[derive(Debug, Default)]
pub struct DefaultObserverAdapter;

impl MemberObserverAdapter for DefaultObserverAdapter {
    fn try_observe(
        &self,
        target: &Value,
        member: &MemberDescriptor,
        listener: ChangeListener,
    ) -> Subscription {
        if member.kind == MemberKind::Method {
            return Subscription::none();
        }
        let name = Arc::clone(&member.name);
        let filtered: ChangeListener = Arc::new(move |event: &ChangeEvent| match event {
            ChangeEvent::Member { name: changed } if *changed == name => listener(event),
            ChangeEvent::Index { .. } if &*name == ITEM_MEMBER => listener(event),
            _ => {}
        });
        match target {
            Value::Object(obj) => obj.observe(filtered),
            Value::List(list) => list.observe(filtered),
            _ => Subscription::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{DynObject, ObservableList, ViewModel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn resolves_and_caches_descriptors() {
        let provider = DynamicMemberProvider::new();
        let a = provider
            .try_get_member("Vm", "Name", MemberFlags::instance_read())
            .unwrap();
        let b = provider
            .try_get_member("Vm", "Name", MemberFlags::instance_read())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.cached_len(), 1);
    }

    #[test]
    fn accessor_reads_and_writes_bag() {
        let provider = DynamicMemberProvider::new();
        let vm = ViewModel::new("Vm");
        vm.seed("Name", "a");
        let owner = vm.as_value();
        let d = provider
            .try_get_member("Vm", "Name", MemberFlags::instance_read())
            .unwrap();
        assert_eq!(d.get(&owner, &[]), Ok(Value::from("a")));
        d.set(&owner, &[], Value::from("b")).unwrap();
        assert_eq!(d.get(&owner, &[]), Ok(Value::from("b")));
    }

    #[test]
    fn missing_member_reports_type() {
        let provider = DynamicMemberProvider::new();
        let vm = ViewModel::new("Person");
        let d = provider
            .try_get_member("Person", "Ghost", MemberFlags::instance_read())
            .unwrap();
        let err = d.get(&vm.as_value(), &[]).unwrap_err();
        assert_eq!(
            err,
            AccessError::MissingMember {
                type_name: Arc::from("Person"),
                member: Arc::from("Ghost"),
            }
        );
    }

    #[test]
    fn item_descriptor_indexes_lists() {
        let provider = DynamicMemberProvider::new();
        let list = ObservableList::from_values(vec![Value::Int(10), Value::Int(20)]);
        let owner = Value::List(list);
        let d = provider
            .try_get_member("List", ITEM_MEMBER, MemberFlags::instance_read())
            .unwrap();
        assert_eq!(d.get(&owner, &[Value::Int(1)]), Ok(Value::Int(20)));
        assert!(matches!(
            d.get(&owner, &[Value::Int(5)]),
            Err(AccessError::IndexOutOfRange { .. })
        ));
        d.set(&owner, &[Value::Int(0)], Value::Int(7)).unwrap();
        assert_eq!(d.get(&owner, &[Value::Int(0)]), Ok(Value::Int(7)));
    }

    #[test]
    fn count_descriptor() {
        let provider = DynamicMemberProvider::new();
        let d = provider
            .try_get_member("List", "Count", MemberFlags::instance_read())
            .unwrap();
        let list = Value::List(ObservableList::from_values(vec![Value::Int(1)]));
        assert_eq!(d.get(&list, &[]), Ok(Value::Int(1)));
        assert_eq!(d.get(&Value::from("abc"), &[]), Ok(Value::Int(3)));
        assert!(!d.can_write());
    }

    #[test]
    fn adapter_filters_by_member_name() {
        let provider = DynamicMemberProvider::new();
        let adapter = DefaultObserverAdapter;
        let vm = ViewModel::new("Vm");
        let owner = vm.as_value();
        let d = provider
            .try_get_member("Vm", "Name", MemberFlags::instance_read())
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = adapter.try_observe(
            &owner,
            &d,
            Arc::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        vm.set_member("Name", Value::from("x"));
        vm.set_member("Other", Value::from("y"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adapter_noop_for_scalars() {
        let provider = DynamicMemberProvider::new();
        let adapter = DefaultObserverAdapter;
        let d = provider
            .try_get_member("int", "Anything", MemberFlags::instance_read())
            .unwrap();
        let sub = adapter.try_observe(&Value::Int(1), &d, Arc::new(|_| {}));
        assert!(!sub.is_active());
    }

    #[test]
    fn method_descriptor_invokes_object() {
        let provider = DynamicMemberProvider::new();
        let vm = ViewModel::new("Vm");
        vm.register_method("Greet", Arc::new(|_| Value::from("hi")));
        let d = provider
            .try_get_member("Vm", "Greet", MemberFlags::instance_method())
            .unwrap();
        assert_eq!(d.invoke(&vm.as_value(), &[]), Ok(Value::from("hi")));
    }
}
