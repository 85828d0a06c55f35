//! Execution scheduling seam.
//!
//! The engine performs no cooperative suspension and owns no thread pool:
//! delay/debounce and cross-thread marshaling hand work to a [`Scheduler`]
//! and never block on it. A scheduled task may run out of order relative to
//! other pending work, so callers always capture the latest known value
//! rather than replaying a queue, and re-check validity before writing.

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Where a scheduled task should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run inline on the calling thread.
    Immediate,
    /// Run off the calling thread.
    Background,
    /// Marshal asynchronously onto the UI thread.
    UiAsync,
}

/// A unit of scheduled work.
pub type ScheduledTask = Box<dyn FnOnce() + Send>;

/// External execution collaborator.
///
/// Returns `false` when the scheduler cannot honor the request; callers
/// treat that as "the write will not happen" and surface it as a fault.
pub trait Scheduler: Send + Sync {
    fn execute(&self, mode: ExecutionMode, task: ScheduledTask) -> bool;

    /// Schedule a task after `delay`. The default ignores the delay and runs
    /// the task in background mode; real UI schedulers override this.
    fn execute_after(&self, delay: Duration, task: ScheduledTask) -> bool {
        let _ = delay;
        self.execute(ExecutionMode::Background, task)
    }
}

/// Runs everything inline on the calling thread.
#[derive(Debug, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn execute(&self, _mode: ExecutionMode, task: ScheduledTask) -> bool {
        task();
        true
    }

    fn execute_after(&self, _delay: Duration, task: ScheduledTask) -> bool {
        task();
        true
    }
}

/// Queues tasks for explicit pumping.
///
/// The deterministic scheduler for tests and embedders that own a frame
/// loop: nothing runs until [`run_pending`](Self::run_pending) is called.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<ScheduledTask>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().expect("scheduler queue poisoned").len()
    }

    /// Run every queued task in FIFO order; returns how many ran.
    pub fn run_pending(&self) -> usize {
        // Tasks may schedule more tasks; drain a snapshot so those queue up
        // for the next pump instead of running in this one.
        let tasks: Vec<ScheduledTask> = std::mem::take(
            &mut *self.queue.lock().expect("scheduler queue poisoned"),
        );
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }
}

impl Scheduler for ManualScheduler {
    fn execute(&self, _mode: ExecutionMode, task: ScheduledTask) -> bool {
        self.queue
            .lock()
            .expect("scheduler queue poisoned")
            .push(task);
        true
    }

    fn execute_after(&self, _delay: Duration, task: ScheduledTask) -> bool {
        self.execute(ExecutionMode::Background, task)
    }
}

/// Spawns a thread per task; delays sleep on the spawned thread.
///
/// Suitable for headless use. UI toolkits should supply a scheduler that
/// marshals `UiAsync` onto their main loop instead.
#[derive(Debug, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn execute(&self, mode: ExecutionMode, task: ScheduledTask) -> bool {
        match mode {
            ExecutionMode::Immediate => {
                task();
            }
            ExecutionMode::Background | ExecutionMode::UiAsync => {
                thread::spawn(task);
            }
        }
        true
    }

    fn execute_after(&self, delay: Duration, task: ScheduledTask) -> bool {
        thread::spawn(move || {
            thread::sleep(delay);
            task();
        });
        true
    }
}
