//! Idle-grant runtime: a single-threaded queue of one-shot idle callbacks
//! plus the keyed registry of scheduled mapping runs.
//!
//! The runtime never blocks and never spawns threads. A host drives it by
//! waiting for [`IdleScheduler::schedule_idle`] pings and then delivering
//! grants through [`IdleRuntime::drain_idle_callbacks`]. Everything else
//! happens on the thread that owns the runtime.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::platform::{IdleDeadline, IdleScheduler};
use crate::registry::{RunPhase, RunRecordSnapshot, RunRegistry};

/// Identifier of a queued idle callback, unique per runtime.
pub type IdleCallbackId = u64;

struct IdleCallbackEntry {
    id: IdleCallbackId,
    callback: Option<Box<dyn FnOnce(IdleDeadline) + 'static>>,
}

struct RuntimeInner {
    scheduler: Arc<dyn IdleScheduler>,
    needs_grant: Cell<bool>,
    idle_callbacks: RefCell<VecDeque<IdleCallbackEntry>>,
    next_idle_callback_id: Cell<u64>,
    registry: RefCell<RunRegistry>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self {
            scheduler,
            needs_grant: Cell::new(false),
            idle_callbacks: RefCell::new(VecDeque::new()),
            next_idle_callback_id: Cell::new(1),
            registry: RefCell::new(RunRegistry::default()),
        }
    }

    fn schedule(&self) {
        self.needs_grant.set(true);
        self.scheduler.schedule_idle();
    }

    fn register_idle_callback(
        &self,
        callback: Box<dyn FnOnce(IdleDeadline) + 'static>,
    ) -> IdleCallbackId {
        let id = self.next_idle_callback_id.get();
        self.next_idle_callback_id.set(id + 1);
        self.idle_callbacks
            .borrow_mut()
            .push_back(IdleCallbackEntry {
                id,
                callback: Some(callback),
            });
        self.schedule();
        id
    }

    fn cancel_idle_callback(&self, id: IdleCallbackId) {
        let mut callbacks = self.idle_callbacks.borrow_mut();
        if let Some(index) = callbacks.iter().position(|entry| entry.id == id) {
            callbacks.remove(index);
        }
        let empty = callbacks.is_empty();
        drop(callbacks);
        if empty {
            self.needs_grant.set(false);
        }
    }

    fn drain_idle_callbacks(&self, deadline: IdleDeadline) {
        // Snapshot the queue before running anything: callbacks registered
        // while draining must wait for the next grant, otherwise a run
        // would burn through every batch inside a single grant.
        let mut callbacks = self.idle_callbacks.borrow_mut();
        let mut pending: Vec<Box<dyn FnOnce(IdleDeadline)>> = Vec::with_capacity(callbacks.len());
        while let Some(mut entry) = callbacks.pop_front() {
            if let Some(callback) = entry.callback.take() {
                pending.push(callback);
            }
        }
        drop(callbacks);
        for callback in pending {
            callback(deadline);
        }
        if self.idle_callbacks.borrow().is_empty() {
            self.needs_grant.set(false);
        }
    }

    fn has_idle_callbacks(&self) -> bool {
        !self.idle_callbacks.borrow().is_empty()
    }

    fn record_keyed_run(
        &self,
        key: &str,
        idle_id: IdleCallbackId,
        phase: Rc<Cell<RunPhase>>,
    ) {
        let stale = self.registry.borrow_mut().record(key, idle_id, phase);
        if let Some(stale) = stale {
            log::trace!("run for '{key}' superseded; cancelling idle callback {stale}");
            self.cancel_idle_callback(stale);
        }
    }

    fn supersede_keyed_run(&self, key: &str) {
        let stale = self.registry.borrow_mut().supersede(key);
        if let Some(stale) = stale {
            log::trace!("run for '{key}' superseded; cancelling idle callback {stale}");
            self.cancel_idle_callback(stale);
        }
    }
}

/// Owner of the idle callback queue and run registry.
///
/// Lives on the thread that constructed it; hand out [`IdleRuntimeHandle`]s
/// to callers that schedule work.
#[derive(Clone)]
pub struct IdleRuntime {
    inner: Rc<RuntimeInner>,
}

impl IdleRuntime {
    pub fn new(scheduler: Arc<dyn IdleScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> IdleRuntimeHandle {
        IdleRuntimeHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether a grant has been requested and not yet fully delivered.
    pub fn needs_grant(&self) -> bool {
        self.inner.needs_grant.get()
    }

    pub fn has_idle_callbacks(&self) -> bool {
        self.inner.has_idle_callbacks()
    }

    /// Delivers one idle grant: runs every callback queued before this call.
    pub fn drain_idle_callbacks(&self, deadline: IdleDeadline) {
        self.inner.drain_idle_callbacks(deadline);
    }
}

/// Cheap cloneable reference to an [`IdleRuntime`].
///
/// Operations degrade gracefully once the runtime is dropped: registration
/// reports `None` and everything else becomes a no-op.
#[derive(Clone)]
pub struct IdleRuntimeHandle {
    inner: Weak<RuntimeInner>,
}

impl IdleRuntimeHandle {
    /// Queues a one-shot callback for the next idle grant.
    pub fn register_idle_callback(
        &self,
        callback: impl FnOnce(IdleDeadline) + 'static,
    ) -> Option<IdleCallbackId> {
        self.inner
            .upgrade()
            .map(|inner| inner.register_idle_callback(Box::new(callback)))
    }

    /// Removes a not-yet-fired callback. No-op for fired or unknown ids.
    pub fn cancel_idle_callback(&self, id: IdleCallbackId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel_idle_callback(id);
        }
    }

    pub fn drain_idle_callbacks(&self, deadline: IdleDeadline) {
        if let Some(inner) = self.inner.upgrade() {
            inner.drain_idle_callbacks(deadline);
        }
    }

    pub fn has_idle_callbacks(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.has_idle_callbacks())
            .unwrap_or(false)
    }

    pub fn needs_grant(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.needs_grant.get())
            .unwrap_or(false)
    }

    /// All run records ever registered under `key`, oldest first.
    pub fn run_records(&self, key: &str) -> Vec<RunRecordSnapshot> {
        self.inner
            .upgrade()
            .map(|inner| inner.registry.borrow().records(key))
            .unwrap_or_default()
    }

    /// The idle callback of `key`'s latest run while it still awaits its
    /// starter grant.
    pub fn pending_run(&self, key: &str) -> Option<IdleCallbackId> {
        self.inner
            .upgrade()
            .and_then(|inner| inner.registry.borrow().pending_run(key))
    }

    pub(crate) fn record_keyed_run(
        &self,
        key: &str,
        idle_id: IdleCallbackId,
        phase: Rc<Cell<RunPhase>>,
    ) {
        if let Some(inner) = self.inner.upgrade() {
            inner.record_keyed_run(key, idle_id, phase);
        }
    }

    pub(crate) fn supersede_keyed_run(&self, key: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.supersede_keyed_run(key);
        }
    }
}

/// No-op scheduler for hosts that poll [`IdleRuntime::needs_grant`]
/// themselves instead of reacting to pings.
#[derive(Default)]
pub struct DefaultScheduler;

impl IdleScheduler for DefaultScheduler {
    fn schedule_idle(&self) {}
}
