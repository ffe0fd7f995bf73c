//! Sink traits and the failure record.

use async_trait::async_trait;

use crate::error::ItemError;
use crate::pipeline::WorkItem;

/// Receives items that passed every stage.
///
/// The item's admission ticket is released once `accept` returns, so a slow
/// sink keeps applying backpressure up to `submit`.
#[async_trait]
pub trait ResultSink<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Takes ownership of a finished item.
    async fn accept(&self, item: WorkItem<T>);
}

/// Receives exactly one report per item that did not reach the result sink.
#[async_trait]
pub trait ErrorSink: Send + Sync + 'static {
    /// Records a terminal failure.
    async fn report(&self, failure: ItemFailure);
}

/// Terminal failure of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Caller-assigned item id.
    pub id: u64,
    /// Submission order of the item.
    pub seq: u64,
    /// What happened.
    pub error: ItemError,
}

/// Used when no sink was configured: results are dropped, failures logged.
pub(crate) struct DiscardSink;

#[async_trait]
impl<T: Send + 'static> ResultSink<T> for DiscardSink {
    async fn accept(&self, item: WorkItem<T>) {
        tracing::trace!(item = item.id, "result discarded");
    }
}

#[async_trait]
impl ErrorSink for DiscardSink {
    async fn report(&self, failure: ItemFailure) {
        tracing::warn!(
            item = failure.id,
            stage = failure.error.stage(),
            error = %failure.error,
            "item failed without error sink"
        );
    }
}
