//! Live member path observation.
//!
//! A [`PathObserver`] walks an [`MemberPath`] over a live object graph and
//! holds one `(descriptor, owner, subscription)` link per reachable segment.
//! When segment *i* raises a change, links *i..n* are torn down and rebuilt
//! against the new values, so the subscription count stays equal to the
//! reachable path length no matter how often intermediates repoint.
//!
//! # Invariants
//!
//! | Invariant | Enforced by |
//! |-----------|-------------|
//! | One live subscription per reachable segment | full tail teardown in `rebuild_from` |
//! | Dormant after root collection | `Weak` root upgrade before every rebuild |
//! | No notifications after `dispose` | disposed flag checked on entry and before notify |
//! | Listener never outlived | `Weak` listener registration |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bitflags::bitflags;
use tracing::trace;

use tether_core::{
    AccessError, ChangeEvent, DynObject, EngineContext, MemberDescriptor, MemberFlags,
    Subscription, Value,
};

use crate::error::ObservationError;
use crate::path::{MemberPath, PathSegment};

bitflags! {
    /// Behavior switches for a path observer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObserverFlags: u8 {
        /// Null intermediates yield no value instead of an error, as if every
        /// segment carried a `?.` marker.
        const OPTIONAL = 1 << 0;
        /// Intermediate segments are assumed never to repoint and are not
        /// subscribed. Unsound if they do mutate; the observer will serve
        /// stale values.
        const STABLE_PATH = 1 << 1;
    }
}

/// Callbacks for path observation. Registered weakly; a dropped listener
/// silences the observer without further bookkeeping.
pub trait PathObserverListener: Send + Sync {
    /// An intermediate segment repointed and the tail was rebuilt.
    fn on_path_changed(&self, observer: &PathObserver) {
        let _ = observer;
    }

    /// The value at the end of the path changed.
    fn on_value_changed(&self, observer: &PathObserver, value: &Value);

    /// The path could not be (re)resolved.
    fn on_error(&self, observer: &PathObserver, error: &ObservationError) {
        let _ = (observer, error);
    }
}

/// One resolved segment: the owner it reads from, the descriptor through the
/// provider cache, the current value, and the change subscription.
struct Link {
    descriptor: Arc<MemberDescriptor>,
    owner: Value,
    value: Value,
    subscription: Subscription,
}

/// Result of one chain rebuild, consumed outside the chain lock.
struct Rebuild {
    value: Value,
    repointed: bool,
    error: Option<ObservationError>,
    dormant: bool,
}

/// Observes the value at the end of a member path rooted at a weakly-held
/// object.
pub struct PathObserver {
    root: Weak<dyn DynObject>,
    path: Arc<MemberPath>,
    flags: ObserverFlags,
    context: Arc<EngineContext>,
    listener: Weak<dyn PathObserverListener>,
    chain: Mutex<Vec<Link>>,
    last_error: Mutex<Option<ObservationError>>,
    disposed: AtomicBool,
    weak_self: Weak<PathObserver>,
}

impl PathObserver {
    /// Attach an observer and build the initial chain. A resolution failure
    /// during the initial build is recorded in [`last_error`](Self::last_error)
    /// and reported to the listener.
    pub fn observe(
        root: &Arc<dyn DynObject>,
        path: Arc<MemberPath>,
        flags: ObserverFlags,
        context: Arc<EngineContext>,
        listener: Weak<dyn PathObserverListener>,
    ) -> Arc<Self> {
        let observer = Arc::new_cyclic(|weak| Self {
            root: Arc::downgrade(root),
            path,
            flags,
            context,
            listener,
            chain: Mutex::new(Vec::new()),
            last_error: Mutex::new(None),
            disposed: AtomicBool::new(false),
            weak_self: weak.clone(),
        });
        let outcome = observer.rebuild_from(0);
        if let Some(error) = outcome.error {
            if let Some(listener) = observer.listener.upgrade() {
                listener.on_error(&observer, &error);
            }
        }
        observer
    }

    #[must_use]
    pub fn path(&self) -> &Arc<MemberPath> {
        &self.path
    }

    /// Current value at the end of the path, `Null` while unreachable or
    /// dormant.
    #[must_use]
    pub fn value(&self) -> Value {
        if self.path.is_empty() {
            return self
                .root
                .upgrade()
                .map_or(Value::Null, |root| Value::Object(root));
        }
        let chain = self.chain.lock().expect("observer chain poisoned");
        if chain.len() == self.path.len() {
            chain.last().map_or(Value::Null, |link| link.value.clone())
        } else {
            Value::Null
        }
    }

    /// Error recorded by the most recent chain rebuild, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<ObservationError> {
        self.last_error
            .lock()
            .expect("observer error slot poisoned")
            .clone()
    }

    /// Write through the final segment.
    pub fn set_value(&self, value: Value) -> Result<(), ObservationError> {
        if self.disposed.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(last_segment) = self.path.segments().last() else {
            return Err(ObservationError::Access(AccessError::NotWritable(
                Arc::from("(root)"),
            )));
        };
        let (descriptor, owner) = {
            let chain = self.chain.lock().expect("observer chain poisoned");
            if chain.len() < self.path.len() {
                return Err(ObservationError::MissingIntermediate {
                    path: Arc::clone(self.path.text()),
                    segment: Arc::clone(&last_segment.name),
                });
            }
            let link = &chain[self.path.len() - 1];
            (Arc::clone(&link.descriptor), link.owner.clone())
        };
        descriptor.set(&owner, &last_segment.args, value)?;
        Ok(())
    }

    /// Number of live segment subscriptions, for diagnostics.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.chain
            .lock()
            .expect("observer chain poisoned")
            .iter()
            .filter(|link| link.subscription.is_active())
            .count()
    }

    /// Release every subscription. Idempotent; change events arriving after
    /// disposal are ignored.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.chain.lock().expect("observer chain poisoned").clear();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Change raised by the subscription of segment `index`.
    fn on_segment_changed(&self, index: usize) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let outcome = self.rebuild_from(index);
        if outcome.dormant || self.disposed.load(Ordering::Acquire) {
            return;
        }
        let Some(listener) = self.listener.upgrade() else {
            return;
        };
        if let Some(error) = outcome.error {
            listener.on_error(self, &error);
            return;
        }
        if outcome.repointed {
            listener.on_path_changed(self);
        }
        listener.on_value_changed(self, &outcome.value);
    }

    /// Tear down links `index..` and rebuild them against current state.
    fn rebuild_from(&self, index: usize) -> Rebuild {
        let mut chain = self.chain.lock().expect("observer chain poisoned");
        let index = index.min(chain.len());
        let last = self.path.len().saturating_sub(1);
        let repointed = index < last;
        chain.truncate(index);

        let Some(root) = self.root.upgrade() else {
            chain.clear();
            return Rebuild {
                value: Value::Null,
                repointed: false,
                error: None,
                dormant: true,
            };
        };
        trace!(path = %self.path.text(), index, "rebuilding observer chain");

        let segments = self.path.segments();
        for i in index..segments.len() {
            let owner = if i == 0 {
                Value::Object(Arc::clone(&root))
            } else {
                chain[i - 1].value.clone()
            };
            let segment = &segments[i];
            if owner.is_null() {
                if segment.optional || self.flags.contains(ObserverFlags::OPTIONAL) {
                    // Silently unreachable; the tail stays unbuilt.
                    self.record_error(None);
                    return Rebuild {
                        value: Value::Null,
                        repointed,
                        error: None,
                        dormant: false,
                    };
                }
                let error = ObservationError::MissingIntermediate {
                    path: Arc::clone(self.path.text()),
                    segment: Arc::clone(&segment.name),
                };
                self.record_error(Some(error.clone()));
                return Rebuild {
                    value: Value::Null,
                    repointed,
                    error: Some(error),
                    dormant: false,
                };
            }
            match self.build_link(segment, owner, i, i == last) {
                Ok(link) => chain.push(link),
                Err(error) => {
                    self.record_error(Some(error.clone()));
                    return Rebuild {
                        value: Value::Null,
                        repointed,
                        error: Some(error),
                        dormant: false,
                    };
                }
            }
        }
        self.record_error(None);
        let value = chain.last().map_or(Value::Null, |link| link.value.clone());
        Rebuild {
            value,
            repointed,
            error: None,
            dormant: false,
        }
    }

    fn build_link(
        &self,
        segment: &PathSegment,
        owner: Value,
        index: usize,
        is_last: bool,
    ) -> Result<Link, ObservationError> {
        let type_name = owner.type_name();
        let descriptor = self
            .context
            .members
            .try_get_member(&type_name, &segment.name, MemberFlags::instance_read())
            .ok_or_else(|| ObservationError::MemberResolution {
                type_name,
                member: Arc::clone(&segment.name),
            })?;
        let value = descriptor.get(&owner, &segment.args)?;
        let subscription = if self.flags.contains(ObserverFlags::STABLE_PATH) && !is_last {
            Subscription::none()
        } else {
            let weak = self.weak_self.clone();
            // An indexer segment with a literal index only watches its own
            // slot; sibling element changes are not this segment's business.
            let watched_index = match segment.args.as_slice() {
                [Value::Int(i)] => usize::try_from(*i).ok(),
                _ => None,
            };
            self.context.observers.try_observe(
                &owner,
                &descriptor,
                Arc::new(move |event| {
                    if let (Some(watched), ChangeEvent::Index { index: changed }) =
                        (watched_index, event)
                    {
                        if *changed != watched {
                            return;
                        }
                    }
                    if let Some(observer) = weak.upgrade() {
                        observer.on_segment_changed(index);
                    }
                }),
            )
        };
        Ok(Link {
            descriptor,
            owner,
            value,
            subscription,
        })
    }

    fn record_error(&self, error: Option<ObservationError>) {
        *self
            .last_error
            .lock()
            .expect("observer error slot poisoned") = error;
    }
}

impl std::fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathObserver")
            .field("path", &self.path.text())
            .field("flags", &self.flags)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
