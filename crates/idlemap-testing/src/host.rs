//! Manual-grant host for driving the runtime from tests.
//!
//! Nothing here waits on time or threads: grants fire exactly when a test
//! calls for them, so batch boundaries and supersession windows are fully
//! deterministic.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use idlemap_core::{IdleDeadline, IdleRuntime, IdleRuntimeHandle, IdleScheduler};

const DEFAULT_GRANT_BUDGET_MILLIS: u64 = 16;
const DEFAULT_STEP_LIMIT: usize = 10_000;

/// Scheduler that only counts pings, letting tests assert how often the
/// runtime asked for a grant.
#[derive(Default)]
pub struct CountingScheduler {
    requests: AtomicUsize,
}

impl CountingScheduler {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl IdleScheduler for CountingScheduler {
    fn schedule_idle(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Host whose grants are delivered manually, one per call.
pub struct TestHost {
    runtime: IdleRuntime,
    scheduler: Arc<CountingScheduler>,
    step_limit: usize,
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    pub fn new() -> Self {
        Self::with_step_limit(DEFAULT_STEP_LIMIT)
    }

    /// Host whose [`settle`](TestHost::settle) loop panics after
    /// `step_limit` grants, for tests that expect non-resolution.
    pub fn with_step_limit(step_limit: usize) -> Self {
        let scheduler = Arc::new(CountingScheduler::default());
        Self {
            runtime: IdleRuntime::new(scheduler.clone()),
            scheduler,
            step_limit,
        }
    }

    pub fn handle(&self) -> IdleRuntimeHandle {
        self.runtime.handle()
    }

    pub fn runtime(&self) -> &IdleRuntime {
        &self.runtime
    }

    /// Number of times the runtime pinged the scheduler.
    pub fn idle_requests(&self) -> usize {
        self.scheduler.requests()
    }

    /// Delivers one grant with the default test budget.
    pub fn grant(&self) {
        self.grant_with(IdleDeadline::with_budget_millis(
            DEFAULT_GRANT_BUDGET_MILLIS,
        ));
    }

    pub fn grant_with(&self, deadline: IdleDeadline) {
        self.runtime.drain_idle_callbacks(deadline);
    }

    /// Grants until the runtime stops asking, returning how many fired.
    pub fn grants_until_idle(&self) -> usize {
        let mut granted = 0;
        while self.runtime.needs_grant() {
            self.grant();
            granted += 1;
            if granted > self.step_limit {
                panic!("runtime still requesting grants after {granted} grants");
            }
        }
        granted
    }

    /// Alternates polling and granting until the future resolves.
    ///
    /// Panics once the step limit is exceeded, which is how tests observe
    /// a future that can never resolve (e.g. a superseded run).
    pub fn settle<F>(&self, mut future: F) -> F::Output
    where
        F: Future + Unpin,
    {
        for _ in 0..self.step_limit {
            match poll_once(&mut future) {
                Poll::Ready(value) => return value,
                Poll::Pending => self.grant(),
            }
        }
        panic!("future failed to settle within {} idle grants", self.step_limit);
    }
}

/// Polls `future` once against a no-op waker.
pub fn poll_once<F>(future: &mut F) -> Poll<F::Output>
where
    F: Future + Unpin,
{
    let waker = futures_task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    Pin::new(future).poll(&mut cx)
}
