//! Deterministic test host and helpers for idlemap

pub mod clock;
pub mod host;

pub use clock::ManualClock;
pub use host::{poll_once, CountingScheduler, TestHost};

pub mod prelude {
    pub use crate::clock::ManualClock;
    pub use crate::host::{poll_once, CountingScheduler, TestHost};
}
