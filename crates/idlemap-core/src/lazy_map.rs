//! Batched mapping spread across idle grants.
//!
//! [`lazy_map`] applies a transform to every item of an input sequence,
//! one fixed-size batch per grant, so the owning thread stays responsive
//! while large sequences are processed. Calls are keyed: re-issuing a key
//! before the previous run's starter grant arrives cancels that starter,
//! so rapid recomputation only pays for the newest input.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::TransformError;
use crate::platform::IdleDeadline;
use crate::registry::RunPhase;
use crate::runtime::IdleRuntimeHandle;

/// Batch size used when callers do not configure one.
pub const DEFAULT_BATCH_SIZE: usize = 24;

/// How a run splits its input across grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPolicy {
    batch_size: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BatchPolicy {
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be non-zero");
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

struct MapFutureState<O> {
    value: Option<O>,
    resolved: bool,
    waker: Option<Waker>,
}

impl<O> MapFutureState<O> {
    fn new() -> Self {
        Self {
            value: None,
            resolved: false,
            waker: None,
        }
    }
}

/// Future returned by the `lazy_map` family.
///
/// Resolves once the run's final batch completes. A run superseded before
/// its starter grant never executes, so its future never resolves; callers
/// that re-issue a key are expected to drop the older future.
pub struct MapFuture<O> {
    state: Rc<RefCell<MapFutureState<O>>>,
}

impl<O> MapFuture<O> {
    fn with_state(state: Rc<RefCell<MapFutureState<O>>>) -> Self {
        Self { state }
    }

    /// Whether the run has produced its output yet.
    pub fn is_resolved(&self) -> bool {
        self.state.borrow().resolved
    }
}

impl<O> Future for MapFuture<O> {
    type Output = O;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<O> {
        let mut state = self.state.borrow_mut();
        if let Some(value) = state.value.take() {
            return Poll::Ready(value);
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

fn resolve<O>(state: &Rc<RefCell<MapFutureState<O>>>, value: O) {
    let mut state = state.borrow_mut();
    state.value = Some(value);
    state.resolved = true;
    if let Some(waker) = state.waker.take() {
        waker.wake();
    }
}

/// Maps `source` through `loop_fn` under the default batch policy.
///
/// `loop_fn` receives each item, its index, and the whole input slice, in
/// input order; the resolved output preserves that order regardless of
/// batch boundaries.
pub fn lazy_map<T, U, F>(
    handle: &IdleRuntimeHandle,
    key: impl Into<String>,
    source: Vec<T>,
    loop_fn: F,
) -> MapFuture<Vec<U>>
where
    T: 'static,
    U: 'static,
    F: Fn(&T, usize, &[T]) -> U + 'static,
{
    lazy_map_with(handle, key, source, BatchPolicy::default(), loop_fn)
}

/// [`lazy_map`] with an explicit batch policy.
pub fn lazy_map_with<T, U, F>(
    handle: &IdleRuntimeHandle,
    key: impl Into<String>,
    source: Vec<T>,
    policy: BatchPolicy,
    loop_fn: F,
) -> MapFuture<Vec<U>>
where
    T: 'static,
    U: 'static,
    F: Fn(&T, usize, &[T]) -> U + 'static,
{
    let state = Rc::new(RefCell::new(MapFutureState::new()));
    let future = MapFuture::with_state(Rc::clone(&state));
    let complete = Box::new(move |result: Result<Vec<U>, TransformError<Infallible>>| {
        let value = match result {
            Ok(value) => value,
            Err(error) => match error.into_inner() {},
        };
        resolve(&state, value);
    });
    spawn_run(
        handle,
        key.into(),
        source,
        policy,
        move |item, index, source| Ok::<_, Infallible>(loop_fn(item, index, source)),
        complete,
    );
    future
}

/// Fallible mapping under the default batch policy.
///
/// The first `Err` resolves the future to a [`TransformError`] carrying
/// the failing item's index; remaining items and batches are abandoned.
pub fn try_lazy_map<T, U, E, F>(
    handle: &IdleRuntimeHandle,
    key: impl Into<String>,
    source: Vec<T>,
    loop_fn: F,
) -> MapFuture<Result<Vec<U>, TransformError<E>>>
where
    T: 'static,
    U: 'static,
    E: 'static,
    F: Fn(&T, usize, &[T]) -> Result<U, E> + 'static,
{
    try_lazy_map_with(handle, key, source, BatchPolicy::default(), loop_fn)
}

/// [`try_lazy_map`] with an explicit batch policy.
pub fn try_lazy_map_with<T, U, E, F>(
    handle: &IdleRuntimeHandle,
    key: impl Into<String>,
    source: Vec<T>,
    policy: BatchPolicy,
    loop_fn: F,
) -> MapFuture<Result<Vec<U>, TransformError<E>>>
where
    T: 'static,
    U: 'static,
    E: 'static,
    F: Fn(&T, usize, &[T]) -> Result<U, E> + 'static,
{
    let state = Rc::new(RefCell::new(MapFutureState::new()));
    let future = MapFuture::with_state(Rc::clone(&state));
    let complete = Box::new(move |result: Result<Vec<U>, TransformError<E>>| {
        resolve(&state, result);
    });
    spawn_run(handle, key.into(), source, policy, loop_fn, complete);
    future
}

fn spawn_run<T, U, E, F>(
    handle: &IdleRuntimeHandle,
    key: String,
    source: Vec<T>,
    policy: BatchPolicy,
    loop_fn: F,
    complete: Box<dyn FnOnce(Result<Vec<U>, TransformError<E>>)>,
) where
    T: 'static,
    U: 'static,
    E: 'static,
    F: Fn(&T, usize, &[T]) -> Result<U, E> + 'static,
{
    if source.is_empty() {
        // Nothing to schedule; the call still wins over a pending run for
        // the same key.
        handle.supersede_keyed_run(&key);
        log::trace!("run '{key}' resolved immediately for empty input");
        complete(Ok(Vec::new()));
        return;
    }

    let phase = Rc::new(Cell::new(RunPhase::Scheduled));
    let run = RunCore {
        key: key.clone(),
        out: Vec::with_capacity(source.len()),
        source,
        loop_fn,
        batch_size: policy.batch_size(),
        next: 0,
        phase: Rc::clone(&phase),
        runtime: handle.clone(),
        complete: Some(complete),
    };
    let Some(idle_id) = handle.register_idle_callback(move |_deadline| run.start()) else {
        log::warn!("runtime dropped; run '{key}' will never start");
        return;
    };
    handle.record_keyed_run(&key, idle_id, phase);
}

struct RunCore<T, U, E, F> {
    key: String,
    out: Vec<U>,
    source: Vec<T>,
    loop_fn: F,
    batch_size: usize,
    next: usize,
    phase: Rc<Cell<RunPhase>>,
    runtime: IdleRuntimeHandle,
    complete: Option<Box<dyn FnOnce(Result<Vec<U>, TransformError<E>>)>>,
}

impl<T, U, E, F> RunCore<T, U, E, F>
where
    T: 'static,
    U: 'static,
    E: 'static,
    F: Fn(&T, usize, &[T]) -> Result<U, E> + 'static,
{
    fn start(self) {
        self.phase.set(RunPhase::Running);
        log::trace!(
            "run '{}' started with {} items (batch size {})",
            self.key,
            self.source.len(),
            self.batch_size
        );
        self.schedule_step();
    }

    fn schedule_step(self) {
        let runtime = self.runtime.clone();
        // Batch continuations stay out of the registry: superseding a key
        // only ever cancels a run that has not started.
        if runtime
            .register_idle_callback(move |deadline| self.step(deadline))
            .is_none()
        {
            log::warn!("runtime dropped mid-run; a batched map will never resolve");
        }
    }

    fn step(mut self, deadline: IdleDeadline) {
        if deadline.did_timeout() {
            log::trace!("run '{}' continuing under a fallback grant", self.key);
        }
        let len = self.source.len();
        let end = usize::min(self.next.saturating_add(self.batch_size), len);
        for index in self.next..end {
            match (self.loop_fn)(&self.source[index], index, &self.source) {
                Ok(value) => self.out.push(value),
                Err(source) => {
                    log::debug!("run '{}' failed at item {index}", self.key);
                    self.finish(Err(TransformError::new(index, source)));
                    return;
                }
            }
        }
        log::trace!("run '{}' mapped items {}..{} of {}", self.key, self.next, end, len);
        self.next = end;
        if self.next == len {
            let out = std::mem::take(&mut self.out);
            self.finish(Ok(out));
        } else {
            self.schedule_step();
        }
    }

    fn finish(mut self, result: Result<Vec<U>, TransformError<E>>) {
        self.phase.set(RunPhase::Finished);
        if let Some(complete) = self.complete.take() {
            complete(result);
        }
    }
}
