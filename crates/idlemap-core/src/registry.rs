//! Keyed registry of batched mapping runs.
//!
//! Each [`lazy_map`](crate::lazy_map) call registers a run under its key.
//! Only the most recent record for a key is actionable: issuing a new run
//! supersedes a still-scheduled predecessor and cancels its starter.
//! Retired records are kept around so hosts can inspect how a key's runs
//! progressed.

use std::cell::Cell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::collections::map::HashMap;
use crate::runtime::IdleCallbackId;

/// Lifecycle of a keyed mapping run.
///
/// A run is `Scheduled` from registration until its starter receives a
/// grant. A newer run for the same key moves a still-`Scheduled` run to
/// `Superseded`; once the starter fires the run is `Running` and can no
/// longer be superseded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Scheduled,
    Superseded,
    Running,
    Finished,
}

struct RunRecord {
    idle_id: IdleCallbackId,
    phase: Rc<Cell<RunPhase>>,
}

/// Point-in-time view of a run record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunRecordSnapshot {
    pub idle_id: IdleCallbackId,
    pub phase: RunPhase,
}

#[derive(Default)]
pub(crate) struct RunRegistry {
    runs: HashMap<String, SmallVec<[RunRecord; 2]>>,
}

impl RunRegistry {
    /// Marks the latest still-scheduled run under `key` as superseded and
    /// returns the idle callback that should be cancelled for it.
    pub(crate) fn supersede(&mut self, key: &str) -> Option<IdleCallbackId> {
        let last = self.runs.get(key)?.last()?;
        if last.phase.get() != RunPhase::Scheduled {
            return None;
        }
        last.phase.set(RunPhase::Superseded);
        Some(last.idle_id)
    }

    /// Records a newly scheduled run, superseding a pending predecessor.
    ///
    /// The caller keeps the `phase` cell and advances it as the run
    /// executes; the registry only observes it.
    pub(crate) fn record(
        &mut self,
        key: &str,
        idle_id: IdleCallbackId,
        phase: Rc<Cell<RunPhase>>,
    ) -> Option<IdleCallbackId> {
        let stale = self.supersede(key);
        self.runs
            .entry(key.to_owned())
            .or_default()
            .push(RunRecord { idle_id, phase });
        stale
    }

    /// All records ever registered under `key`, oldest first.
    pub(crate) fn records(&self, key: &str) -> Vec<RunRecordSnapshot> {
        self.runs
            .get(key)
            .map(|records| {
                records
                    .iter()
                    .map(|record| RunRecordSnapshot {
                        idle_id: record.idle_id,
                        phase: record.phase.get(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The idle callback of the latest run under `key`, if it is still
    /// waiting for its starter grant.
    pub(crate) fn pending_run(&self, key: &str) -> Option<IdleCallbackId> {
        let last = self.runs.get(key)?.last()?;
        if last.phase.get() == RunPhase::Scheduled {
            Some(last.idle_id)
        } else {
            None
        }
    }
}
