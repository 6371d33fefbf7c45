#![doc = r"Idle-time batched mapping runtime.

Applies a transform over a sequence in fixed-size batches, yielding back
to the host between batches so the owning thread stays responsive.
Repeated calls under the same key supersede a still-scheduled predecessor
(latest call wins). Hosts drive the runtime by delivering idle grants; see
`idlemap-runtime-std` for a std-backed driver and `idlemap-testing` for a
deterministic one."]

pub mod collections;
pub mod error;
pub mod lazy_map;
pub mod platform;
pub mod registry;
pub mod runtime;

pub use error::{SchedulingUnavailable, TransformError};
pub use lazy_map::{
    lazy_map, lazy_map_with, try_lazy_map, try_lazy_map_with, BatchPolicy, MapFuture,
    DEFAULT_BATCH_SIZE,
};
pub use platform::{Clock, IdleDeadline, IdleScheduler};
pub use registry::{RunPhase, RunRecordSnapshot};
pub use runtime::{DefaultScheduler, IdleCallbackId, IdleRuntime, IdleRuntimeHandle};
