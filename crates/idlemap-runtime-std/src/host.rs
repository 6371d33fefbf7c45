//! Blocking host that drives an idle runtime from the current thread.
//!
//! The runtime pings a condvar-backed signal when callbacks are queued;
//! [`StdIdleHost::block_on`] waits on that signal (or a fallback tick) and
//! delivers one grant per wakeup. A grant that arrives via the fallback
//! tick is reported to callbacks as timed out, matching hosts that have no
//! real idle concept and substitute "run on the next scheduling tick".

use std::future::Future;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_task::ArcWake;
use idlemap_core::{Clock, IdleDeadline, IdleRuntime, IdleRuntimeHandle, IdleScheduler, SchedulingUnavailable};

use crate::clock::StdClock;

/// How the host sources its grants.
#[derive(Clone, Copy, Debug)]
pub struct HostConfig {
    /// React to runtime pings. Disabling this leaves only the fallback tick.
    pub idle_signal: bool,
    /// Deliver a grant every tick even without a ping. `None` disables the
    /// fallback; the host then waits on pings indefinitely.
    pub fallback_tick: Option<Duration>,
    /// Idle budget reported to callbacks on a signalled grant.
    pub grant_budget: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            idle_signal: true,
            fallback_tick: Some(Duration::from_millis(50)),
            grant_budget: Duration::from_millis(16),
        }
    }
}

struct HostSignal {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl HostSignal {
    fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn notify(&self) {
        let mut signaled = self.signaled.lock().expect("host signal lock poisoned");
        *signaled = true;
        self.condvar.notify_one();
    }

    /// Waits for a ping or the fallback tick. Returns whether a ping
    /// arrived; a spurious or timed-out wake reads as a tick.
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut signaled = self.signaled.lock().expect("host signal lock poisoned");
        if !*signaled {
            signaled = match timeout {
                Some(timeout) => {
                    self.condvar
                        .wait_timeout(signaled, timeout)
                        .expect("host signal lock poisoned")
                        .0
                }
                None => self
                    .condvar
                    .wait(signaled)
                    .expect("host signal lock poisoned"),
            };
        }
        let was_signaled = *signaled;
        *signaled = false;
        was_signaled
    }
}

struct SignalScheduler {
    signal: Arc<HostSignal>,
    enabled: bool,
}

impl IdleScheduler for SignalScheduler {
    fn schedule_idle(&self) {
        if self.enabled {
            self.signal.notify();
        }
    }
}

struct SignalWaker {
    signal: Arc<HostSignal>,
}

impl ArcWake for SignalWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.signal.notify();
    }
}

/// Host that owns an [`IdleRuntime`] on the constructing thread and
/// blocks that thread to deliver grants.
pub struct StdIdleHost {
    runtime: IdleRuntime,
    signal: Arc<HostSignal>,
    config: HostConfig,
    clock: StdClock,
}

impl Default for StdIdleHost {
    fn default() -> Self {
        Self::new()
    }
}

impl StdIdleHost {
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
            .expect("default host config always has a grant source")
    }

    /// Fails with [`SchedulingUnavailable`] when the config disables both
    /// the idle signal and the fallback tick: queued work could never run.
    pub fn with_config(config: HostConfig) -> Result<Self, SchedulingUnavailable> {
        if !config.idle_signal && config.fallback_tick.is_none() {
            return Err(SchedulingUnavailable);
        }
        let signal = Arc::new(HostSignal::new());
        let scheduler = Arc::new(SignalScheduler {
            signal: Arc::clone(&signal),
            enabled: config.idle_signal,
        });
        Ok(Self {
            runtime: IdleRuntime::new(scheduler),
            signal,
            config,
            clock: StdClock,
        })
    }

    pub fn handle(&self) -> IdleRuntimeHandle {
        self.runtime.handle()
    }

    pub fn runtime(&self) -> &IdleRuntime {
        &self.runtime
    }

    /// Drives `future` to completion, delivering one grant per wakeup.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let mut future = Box::pin(future);
        let waker = futures_task::waker(Arc::new(SignalWaker {
            signal: Arc::clone(&self.signal),
        }));
        let mut cx = Context::from_waker(&waker);
        let budget_millis = self.config.grant_budget.as_millis() as u64;

        loop {
            if let Poll::Ready(value) = future.as_mut().poll(&mut cx) {
                return value;
            }
            let signaled = self.signal.wait(self.config.fallback_tick);
            if !self.runtime.has_idle_callbacks() {
                continue;
            }
            let deadline = if signaled {
                IdleDeadline::with_budget_millis(budget_millis)
            } else {
                IdleDeadline::timed_out()
            };
            let started = self.clock.now();
            self.runtime.drain_idle_callbacks(deadline);
            let elapsed = self.clock.elapsed_millis(started);
            if elapsed > budget_millis {
                log::debug!("idle grant overran its budget: {elapsed}ms > {budget_millis}ms");
            }
        }
    }
}
