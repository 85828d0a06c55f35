//! Engine context: the bundle of collaborator contracts threaded through
//! observers and bindings.

use std::sync::Arc;

use crate::provider::{DefaultObserverAdapter, DynamicMemberProvider, MemberObserverAdapter, MemberProvider};
use crate::scheduler::{ImmediateScheduler, Scheduler};

/// Shared collaborators: member resolution, change observation, scheduling.
///
/// Construct once and share (`Arc`) across every binding of an application.
/// The default context serves dynamic property bags with inline scheduling,
/// which is what tests and headless hosts want; UI toolkits swap in their
/// own provider/adapter/scheduler.
#[derive(Clone)]
pub struct EngineContext {
    pub members: Arc<dyn MemberProvider>,
    pub observers: Arc<dyn MemberObserverAdapter>,
    pub scheduler: Arc<dyn Scheduler>,
}

impl EngineContext {
    #[must_use]
    pub fn new(
        members: Arc<dyn MemberProvider>,
        observers: Arc<dyn MemberObserverAdapter>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            members,
            observers,
            scheduler,
        }
    }

    /// Replace only the scheduler (the common customization).
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            members: Arc::new(DynamicMemberProvider::new()),
            observers: Arc::new(DefaultObserverAdapter),
            scheduler: Arc::new(ImmediateScheduler),
        }
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext").finish_non_exhaustive()
    }
}
