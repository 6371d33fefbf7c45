//! Error types surfaced by the idle mapping runtime.

use std::error::Error;
use std::fmt;

/// A per-item transform failed while a batched run was executing.
///
/// Carries the input index of the failing item. The run resolves with this
/// error as soon as the failure is observed; remaining items and batches
/// are abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformError<E> {
    index: usize,
    source: E,
}

impl<E> TransformError<E> {
    pub(crate) fn new(index: usize, source: E) -> Self {
        Self { index, source }
    }

    /// Index of the input item whose transform failed.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn inner(&self) -> &E {
        &self.source
    }

    pub fn into_inner(self) -> E {
        self.source
    }
}

impl<E: fmt::Display> fmt::Display for TransformError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transform failed at item {}: {}", self.index, self.source)
    }
}

impl<E: Error + 'static> Error for TransformError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// The host was configured with neither an idle signal nor a fallback
/// timer, so queued work could never receive a grant.
///
/// This is a construction-time configuration error, never a per-call one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingUnavailable;

impl fmt::Display for SchedulingUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host provides neither an idle signal nor a fallback timer")
    }
}

impl Error for SchedulingUnavailable {}
