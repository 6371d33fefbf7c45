//! Platform abstraction traits for the idle runtime.
//!
//! These traits let the runtime delegate grant scheduling and clock
//! responsibilities to the host, so the same mapping code runs under a
//! real idle-detecting host, a plain timer fallback, or a deterministic
//! test driver.

/// Notifies the host that idle work has been queued.
///
/// Implementations are responsible for eventually delivering a grant by
/// draining the runtime's idle callbacks. They must be safe to use from
/// multiple threads.
pub trait IdleScheduler: Send + Sync {
    /// Request that the host deliver an idle grant.
    fn schedule_idle(&self);
}

/// Provides timing information for hosts.
pub trait Clock: Send + Sync {
    /// Instant type produced by this clock implementation.
    type Instant: Copy + Send + Sync;

    /// Returns the current instant.
    fn now(&self) -> Self::Instant;

    /// Returns the number of milliseconds elapsed since `since`.
    fn elapsed_millis(&self, since: Self::Instant) -> u64;
}

/// Describes a single idle grant handed to queued callbacks.
///
/// A timed-out grant is one delivered by a fallback timer rather than
/// observed host idleness; callbacks still run, they just cannot assume
/// any spare time remains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdleDeadline {
    remaining_millis: u64,
    timed_out: bool,
}

impl IdleDeadline {
    /// Grant backed by observed idleness with `remaining_millis` of budget.
    pub fn with_budget_millis(remaining_millis: u64) -> Self {
        Self {
            remaining_millis,
            timed_out: false,
        }
    }

    /// Grant delivered by a fallback timer with no idle budget.
    pub fn timed_out() -> Self {
        Self {
            remaining_millis: 0,
            timed_out: true,
        }
    }

    pub fn time_remaining_millis(&self) -> u64 {
        self.remaining_millis
    }

    pub fn did_timeout(&self) -> bool {
        self.timed_out
    }
}
