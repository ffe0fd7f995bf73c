//! Channel-backed sinks.
//!
//! A bounded `mpsc::Sender` used as a sink waits for room, which extends
//! backpressure past the last stage to the consumer. A dropped receiver
//! discards items.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ErrorSink, ItemFailure, ResultSink};
use crate::pipeline::WorkItem;

#[async_trait]
impl<T: Send + 'static> ResultSink<T> for mpsc::Sender<WorkItem<T>> {
    async fn accept(&self, item: WorkItem<T>) {
        if let Err(mpsc::error::SendError(item)) = self.send(item).await {
            tracing::debug!(item = item.id, "result receiver dropped");
        }
    }
}

#[async_trait]
impl ErrorSink for mpsc::Sender<ItemFailure> {
    async fn report(&self, failure: ItemFailure) {
        if let Err(mpsc::error::SendError(failure)) = self.send(failure).await {
            tracing::debug!(item = failure.id, error = %failure.error, "failure receiver dropped");
        }
    }
}
