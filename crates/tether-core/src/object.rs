//! Bindable object graphs: the [`DynObject`] contract, the [`ViewModel`]
//! property bag, and [`ObservableList`].
//!
//! # Invariants
//!
//! 1. Setting a member to a value equal to the current one is a no-op: no
//!    notification is raised (prevents notification storms on echo writes).
//! 2. Notifications are raised after the mutation is visible and outside any
//!    internal lock, on the mutating thread.
//! 3. `observe` never fails; every object can hand out a subscription.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::notify::{ChangeEvent, ChangeListener, ListenerSet, Subscription};
use crate::value::Value;

/// A dynamically-typed object a binding can read, write, call, and observe.
///
/// This is the closed seam platform integrations implement; the engine never
/// uses reflection. Default method bodies make an object read-only and
/// index-less, which is the common case for simple adapters.
pub trait DynObject: Send + Sync {
    /// Logical type name used for member resolution and diagnostics.
    fn type_name(&self) -> &str;

    /// Read a named member. `None` means the object has no such member.
    fn get_member(&self, name: &str) -> Option<Value>;

    /// Write a named member. Returns `false` when unsupported or read-only.
    fn set_member(&self, name: &str, value: Value) -> bool {
        let _ = (name, value);
        false
    }

    /// Read an indexed element (`obj[args]`).
    fn get_index(&self, args: &[Value]) -> Option<Value> {
        let _ = args;
        None
    }

    /// Write an indexed element. Returns `false` when unsupported.
    fn set_index(&self, args: &[Value], value: Value) -> bool {
        let _ = (args, value);
        false
    }

    /// Invoke a named method. `None` means no such method.
    fn invoke(&self, name: &str, args: &[Value]) -> Option<Value> {
        let _ = (name, args);
        None
    }

    /// Observe change notifications. Must not fail.
    fn observe(&self, listener: ChangeListener) -> Subscription;
}

/// Handler for a [`ViewModel`] method member.
pub type MethodHandler = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A mutable property bag raising [`ChangeEvent::Member`] on mutation.
///
/// The in-crate view-model implementation: tests and simple applications
/// build object graphs out of these; platform toolkits supply their own
/// [`DynObject`] impls instead.
pub struct ViewModel {
    type_name: Arc<str>,
    members: Mutex<HashMap<String, Value, ahash::RandomState>>,
    methods: Mutex<HashMap<String, MethodHandler, ahash::RandomState>>,
    listeners: ListenerSet,
}

impl ViewModel {
    /// Create an empty view-model with the given logical type name.
    #[must_use]
    pub fn new(type_name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            type_name: type_name.into(),
            members: Mutex::new(HashMap::default()),
            methods: Mutex::new(HashMap::default()),
            listeners: ListenerSet::new(),
        })
    }

    /// Seed a member without raising a notification (initial population).
    pub fn seed(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.members
            .lock()
            .expect("view-model members poisoned")
            .insert(name.into(), value.into());
    }

    /// Register a callable method member.
    pub fn register_method(&self, name: impl Into<String>, handler: MethodHandler) {
        self.methods
            .lock()
            .expect("view-model methods poisoned")
            .insert(name.into(), handler);
    }

    /// Wrap this view-model as a [`Value::Object`].
    #[must_use]
    pub fn as_value(self: &Arc<Self>) -> Value {
        Value::Object(self.clone() as Arc<dyn DynObject>)
    }

    /// Number of live change listeners (subscription-leak assertions).
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl DynObject for ViewModel {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get_member(&self, name: &str) -> Option<Value> {
        self.members
            .lock()
            .expect("view-model members poisoned")
            .get(name)
            .cloned()
    }

    fn set_member(&self, name: &str, value: Value) -> bool {
        {
            let mut members = self.members.lock().expect("view-model members poisoned");
            if members.get(name).is_some_and(|current| current.total_eq(&value)) {
                return true;
            }
            members.insert(name.to_owned(), value);
        }
        self.listeners.notify(&ChangeEvent::member(name));
        true
    }

    fn invoke(&self, name: &str, args: &[Value]) -> Option<Value> {
        let handler = self
            .methods
            .lock()
            .expect("view-model methods poisoned")
            .get(name)
            .cloned()?;
        Some(handler(args))
    }

    fn observe(&self, listener: ChangeListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

impl std::fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewModel")
            .field("type_name", &self.type_name)
            .field("members", &self.members.lock().expect("poisoned").len())
            .finish()
    }
}

struct ListInner {
    items: Mutex<Vec<Value>>,
    listeners: ListenerSet,
}

/// A shared, observable list raising [`ChangeEvent::Index`] on element
/// mutation. Cloning shares the underlying storage; equality is identity.
#[derive(Clone)]
pub struct ObservableList {
    inner: Arc<ListInner>,
}

impl Default for ObservableList {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableList {
    #[must_use]
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    #[must_use]
    pub fn from_values(items: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(ListInner {
                items: Mutex::new(items),
                listeners: ListenerSet::new(),
            }),
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner
            .items
            .lock()
            .expect("list items poisoned")
            .get(index)
            .cloned()
    }

    /// Replace the element at `index`. Returns `false` when out of range.
    /// Storing an equal value raises no notification.
    pub fn set(&self, index: usize, value: Value) -> bool {
        {
            let mut items = self.inner.items.lock().expect("list items poisoned");
            match items.get_mut(index) {
                Some(slot) if slot.total_eq(&value) => return true,
                Some(slot) => *slot = value,
                None => return false,
            }
        }
        self.inner.listeners.notify(&ChangeEvent::Index { index });
        true
    }

    /// Append an element, notifying with the new element's index.
    pub fn push(&self, value: Value) {
        let index = {
            let mut items = self.inner.items.lock().expect("list items poisoned");
            items.push(value);
            items.len() - 1
        };
        self.inner.listeners.notify(&ChangeEvent::Index { index });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.lock().expect("list items poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observe element changes.
    pub fn observe(&self, listener: ChangeListener) -> Subscription {
        self.inner.listeners.subscribe(listener)
    }

    /// Identity comparison (shared storage).
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live change listeners (subscription-leak assertions).
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl std::fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableList")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn set_member_notifies_once() {
        let vm = ViewModel::new("Vm");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = vm.observe(Arc::new(move |ev| {
            assert_eq!(*ev, ChangeEvent::member("Name"));
            h.fetch_add(1, Ordering::SeqCst);
        }));
        vm.set_member("Name", Value::from("a"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(vm.get_member("Name"), Some(Value::from("a")));
    }

    #[test]
    fn repeated_nan_set_is_noop() {
        let vm = ViewModel::new("Vm");
        vm.seed("Ratio", f64::NAN);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = vm.observe(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        vm.set_member("Ratio", Value::Float(f64::NAN));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn equal_set_is_noop() {
        let vm = ViewModel::new("Vm");
        vm.seed("Count", 3);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = vm.observe(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        vm.set_member("Count", Value::Int(3));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn seed_does_not_notify() {
        let vm = ViewModel::new("Vm");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = vm.observe(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        vm.seed("Name", "quiet");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(vm.get_member("Name"), Some(Value::from("quiet")));
    }

    #[test]
    fn method_invocation() {
        let vm = ViewModel::new("Vm");
        vm.register_method(
            "Add",
            Arc::new(|args| {
                let a = args[0].as_int().unwrap_or(0);
                let b = args[1].as_int().unwrap_or(0);
                Value::Int(a + b)
            }),
        );
        assert_eq!(
            vm.invoke("Add", &[Value::Int(2), Value::Int(3)]),
            Some(Value::Int(5))
        );
        assert_eq!(vm.invoke("Missing", &[]), None);
    }

    #[test]
    fn list_set_notifies_index() {
        let list = ObservableList::from_values(vec![Value::Int(1), Value::Int(2)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = list.observe(Arc::new(move |ev| {
            if let ChangeEvent::Index { index } = ev {
                s.lock().unwrap().push(*index);
            }
        }));
        assert!(list.set(1, Value::Int(9)));
        assert!(!list.set(5, Value::Int(0)));
        list.push(Value::Int(4));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn list_equal_set_is_noop() {
        let list = ObservableList::from_values(vec![Value::Int(1)]);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = list.observe(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(list.set(0, Value::Int(1)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn list_clone_shares_storage() {
        let a = ObservableList::new();
        let b = a.clone();
        a.push(Value::Int(1));
        assert_eq!(b.len(), 1);
        assert!(a.ptr_eq(&b));
    }
}
