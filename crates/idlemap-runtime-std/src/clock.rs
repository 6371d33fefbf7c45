//! Wall clock over `std::time`.

use std::time::Instant;

use idlemap_core::Clock;

/// [`Clock`] backed by `std::time::Instant`.
#[derive(Default, Clone, Copy)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed_millis(&self, since: Instant) -> u64 {
        since.elapsed().as_millis() as u64
    }
}
