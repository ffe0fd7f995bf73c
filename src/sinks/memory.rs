//! # In-memory collecting sink.
//!
//! [`MemorySink`] implements both [`ResultSink`] and [`ErrorSink`] and keeps
//! everything it receives in arrival order.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use stagevisor::{MemorySink, ResultSink, WorkItem};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sink = Arc::new(MemorySink::<u32>::new());
//! sink.accept(WorkItem::new(1, 10)).await;
//! assert_eq!(sink.payloads(), vec![10]);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ErrorSink, ItemFailure, ResultSink};
use crate::pipeline::WorkItem;

/// Collects results and failures in memory.
pub struct MemorySink<T> {
    results: Mutex<Vec<WorkItem<T>>>,
    failures: Mutex<Vec<ItemFailure>>,
}

impl<T> MemorySink<T> {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    fn results_guard(&self) -> MutexGuard<'_, Vec<WorkItem<T>>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failures_guard(&self) -> MutexGuard<'_, Vec<ItemFailure>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes and returns every collected result, in arrival order.
    pub fn take_results(&self) -> Vec<WorkItem<T>> {
        std::mem::take(&mut *self.results_guard())
    }

    /// Returns the collected failures, in arrival order.
    pub fn failures(&self) -> Vec<ItemFailure> {
        self.failures_guard().clone()
    }

    /// Number of collected results.
    pub fn result_count(&self) -> usize {
        self.results_guard().len()
    }

    /// Number of collected failures.
    pub fn failure_count(&self) -> usize {
        self.failures_guard().len()
    }

    /// How many times each item id was reported as failed.
    pub fn failure_counts(&self) -> HashMap<u64, usize> {
        let mut counts = HashMap::new();
        for f in self.failures_guard().iter() {
            *counts.entry(f.id).or_insert(0) += 1;
        }
        counts
    }
}

impl<T: Clone> MemorySink<T> {
    /// Returns a copy of the collected results, in arrival order.
    pub fn results(&self) -> Vec<WorkItem<T>> {
        self.results_guard().clone()
    }

    /// Returns the payloads of the collected results, in arrival order.
    pub fn payloads(&self) -> Vec<T> {
        self.results_guard()
            .iter()
            .map(|item| item.payload.clone())
            .collect()
    }

    /// Returns the payloads ordered by submission sequence.
    pub fn payloads_by_seq(&self) -> Vec<T> {
        let mut items = self.results();
        items.sort_by_key(WorkItem::seq);
        items.into_iter().map(WorkItem::into_payload).collect()
    }
}

impl<T> Default for MemorySink<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> ResultSink<T> for MemorySink<T> {
    async fn accept(&self, item: WorkItem<T>) {
        self.results_guard().push(item);
    }
}

#[async_trait]
impl<T: Send + 'static> ErrorSink for MemorySink<T> {
    async fn report(&self, failure: ItemFailure) {
        self.failures_guard().push(failure);
    }
}
