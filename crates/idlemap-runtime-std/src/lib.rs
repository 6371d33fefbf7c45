//! Standard library backed host driver for idlemap
//!
//! [`StdIdleHost`] owns an [`IdleRuntime`](idlemap_core::IdleRuntime) and
//! delivers grants whenever the runtime signals queued work, with an
//! optional fixed-interval timer standing in for hosts that cannot observe
//! real idleness.

pub mod clock;
pub mod host;

pub use clock::StdClock;
pub use host::{HostConfig, StdIdleHost};
