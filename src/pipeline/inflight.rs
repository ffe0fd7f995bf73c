//! # In-flight tracker.
//!
//! Records which items each stage's workers currently hold and how many of
//! those workers are still running.
//!
//! ```text
//! worker: take ──► enter(stage, seq, id) ──► process ──► hand-off/sink/report ──► leave(stage, seq)
//!                                                  │
//!                                   abort (grace exceeded): entry stays
//!                                                  ▼
//!                                drain: take_all() → reported as cancelled
//! ```
//!
//! ## Rules
//! - Entries are keyed by `seq`, which is unique per pipeline (ids need not be).
//! - `leave` is explicit; an aborted worker never leaves, so its items stay visible.
//! - Live-worker counters use an RAII guard and drop to zero on abort too;
//!   read them *before* aborting to find the stuck stages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct StageSlots {
    name: Arc<str>,
    held: Mutex<HashMap<u64, u64>>,
    live: AtomicUsize,
}

/// An item held by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Held {
    pub(crate) stage: Arc<str>,
    pub(crate) seq: u64,
    pub(crate) id: u64,
}

/// Thread-safe per-stage in-flight registry.
pub(crate) struct InflightTracker {
    stages: Vec<StageSlots>,
}

impl InflightTracker {
    pub(crate) fn new(names: &[Arc<str>]) -> Self {
        Self {
            stages: names
                .iter()
                .map(|name| StageSlots {
                    name: Arc::clone(name),
                    held: Mutex::new(HashMap::new()),
                    live: AtomicUsize::new(0),
                })
                .collect(),
        }
    }

    fn held(&self, stage: usize) -> MutexGuard<'_, HashMap<u64, u64>> {
        self.stages[stage]
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn enter(&self, stage: usize, seq: u64, id: u64) {
        self.held(stage).insert(seq, id);
    }

    pub(crate) fn leave(&self, stage: usize, seq: u64) {
        self.held(stage).remove(&seq);
    }

    /// Removes and returns every held item, ordered by stage then `seq`.
    pub(crate) fn take_all(&self) -> Vec<Held> {
        let mut out = Vec::new();
        for (k, slots) in self.stages.iter().enumerate() {
            let mut held: Vec<(u64, u64)> = self.held(k).drain().collect();
            held.sort_unstable();
            out.extend(held.into_iter().map(|(seq, id)| Held {
                stage: Arc::clone(&slots.name),
                seq,
                id,
            }));
        }
        out
    }

    /// Total number of held items.
    pub(crate) fn count(&self) -> usize {
        (0..self.stages.len()).map(|k| self.held(k).len()).sum()
    }

    /// Sorted ids held by the stage called `name`.
    pub(crate) fn ids_at(&self, name: &str) -> Vec<u64> {
        let Some(k) = self.stages.iter().position(|s| &*s.name == name) else {
            return Vec::new();
        };
        let mut ids: Vec<u64> = self.held(k).values().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Marks a worker of `stage` as running until the guard is dropped.
    pub(crate) fn worker_guard(self: &Arc<Self>, stage: usize) -> WorkerGuard {
        self.stages[stage].live.fetch_add(1, Ordering::AcqRel);
        WorkerGuard {
            tracker: Arc::clone(self),
            stage,
        }
    }

    /// Names of stages with at least one running worker.
    pub(crate) fn live_stages(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| s.live.load(Ordering::Acquire) > 0)
            .map(|s| s.name.to_string())
            .collect()
    }
}

/// Decrements the live-worker count of its stage on drop.
pub(crate) struct WorkerGuard {
    tracker: Arc<InflightTracker>,
    stage: usize,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.tracker.stages[self.stage]
            .live
            .fetch_sub(1, Ordering::AcqRel);
    }
}
