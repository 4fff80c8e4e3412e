//! Registry of in-flight upload tasks.
//!
//! Every submitted task has exactly one [`TaskHandle`] in the registry from
//! submission until it finishes (or until [`abort`](TaskRegistry::abort)
//! removes it). A handle's phase only moves forward:
//!
//! ```text
//! Scheduled ──▶ Running ──▶ Committing
//!     │            │
//!     └────────────┴──▶ Cancelled
//! ```
//!
//! Cancellation is refused once a task is `Committing`, so a task that has
//! recorded its outcome is never reported as cancelled, and a cancelled task
//! never records one.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

const SCHEDULED: u8 = 0;
const RUNNING: u8 = 1;
const COMMITTING: u8 = 2;
const CANCELLED: u8 = 3;

#[derive(Debug, Clone)]
pub struct TaskHandle {
    token: CancellationToken,
    phase: Arc<AtomicU8>,
}

impl TaskHandle {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            phase: Arc::new(AtomicU8::new(SCHEDULED)),
        }
    }

    /// Cancels the task unless it is already committing (or cancelled).
    /// Returns whether this call cancelled it.
    pub fn cancel(&self) -> bool {
        let mut current = self.phase.load(Ordering::Acquire);
        while matches!(current, SCHEDULED | RUNNING) {
            match self.phase.compare_exchange(current, CANCELLED, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    self.token.cancel();
                    return true;
                },
                Err(actual) => current = actual,
            }
        }
        false
    }

    pub fn is_cancelled(&self) -> bool {
        self.phase.load(Ordering::Acquire) == CANCELLED
    }

    /// `Scheduled -> Running`; fails if the task was cancelled first.
    pub(crate) fn start(&self) -> bool {
        self.advance(SCHEDULED, RUNNING)
    }

    /// `Running -> Committing`; fails if the task was cancelled first.
    pub(crate) fn commit(&self) -> bool {
        self.advance(RUNNING, COMMITTING)
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    fn advance(&self, from: u8, to: u8) -> bool {
        self.phase.compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    fn same_task(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.phase, &other.phase)
    }
}

/// In-flight tasks keyed by picture path.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<PathBuf, TaskHandle>>,
}

impl TaskRegistry {
    /// Registers a new task for `path`. `None` if one is already in flight.
    pub(crate) fn register(&self, path: &Path) -> Option<TaskHandle> {
        match self.tasks.entry(path.to_path_buf()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                let handle = TaskHandle::new();
                entry.insert(handle.clone());
                Some(handle)
            },
        }
    }

    /// Removes `handle`, but only if it is still the one registered for `path`.
    pub(crate) fn complete(&self, path: &Path, handle: &TaskHandle) {
        self.tasks.remove_if(path, |_, registered| registered.same_task(handle));
    }

    /// Cancels every in-flight task that isn't already committing and removes
    /// it from the registry. Returns how many were cancelled.
    pub fn abort(&self) -> usize {
        // Snapshot first: removing while iterating a DashMap deadlocks.
        let snapshot: Vec<(PathBuf, TaskHandle)> =
            self.tasks.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect();
        let mut cancelled = 0;
        for (path, handle) in snapshot {
            if handle.cancel() {
                self.complete(&path, &handle);
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tasks.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Keeps a task registered for as long as it is alive, including when its
/// future is dropped or panics.
pub(crate) struct Registration {
    registry: TaskRegistry,
    path: PathBuf,
    handle: TaskHandle,
}

impl Registration {
    pub(crate) fn new(registry: TaskRegistry, path: PathBuf, handle: TaskHandle) -> Self {
        Self { registry, path, handle }
    }

    pub(crate) fn handle(&self) -> &TaskHandle {
        &self.handle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.complete(&self.path, &self.handle);
    }
}
