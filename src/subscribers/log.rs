//! # LogWriter: renders pipeline events through `tracing`.
//!
//! A minimal subscriber for demos and local debugging. Item-level events go to
//! `debug`, failures and cancellations to `warn`, lifecycle events to `info`.
//!
//! ## Example output
//! ```text
//! INFO  stagevisor: worker started stage="double" worker=0
//! DEBUG stagevisor: item processed stage="double" item=3 attempt=1
//! WARN  stagevisor: item failed stage="score" item=5 attempt=1 reason="bad record"
//! INFO  stagevisor: drain completed
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let stage = e.stage.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ItemSubmitted => {
                tracing::debug!(stage, item = ?e.item, "item submitted");
            }
            EventKind::ItemProcessed => {
                tracing::debug!(stage, item = ?e.item, attempt = ?e.attempt, "item processed");
            }
            EventKind::ItemCompleted => {
                tracing::debug!(stage, item = ?e.item, "item completed");
            }
            EventKind::ItemRetrying => {
                tracing::info!(stage, item = ?e.item, attempt = ?e.attempt, delay_ms = ?e.delay_ms, reason, "item retrying");
            }
            EventKind::ItemFailed => {
                tracing::warn!(stage, item = ?e.item, attempt = ?e.attempt, reason, "item failed");
            }
            EventKind::ItemCancelled => {
                tracing::warn!(stage, item = ?e.item, "item cancelled");
            }
            EventKind::GateBusy => {
                tracing::warn!(item = ?e.item, waited_ms = ?e.delay_ms, "admission rejected");
            }
            EventKind::WorkerStarted => {
                tracing::info!(stage, worker = ?e.worker, "worker started");
            }
            EventKind::WorkerStopped => {
                tracing::info!(stage, worker = ?e.worker, "worker stopped");
            }
            EventKind::DrainStarted => tracing::info!("drain started"),
            EventKind::DrainCompleted => tracing::info!("drain completed"),
            EventKind::CancelRequested => tracing::warn!(reason, "cancellation requested"),
            EventKind::GraceExceeded => tracing::warn!(stuck = reason, "grace exceeded"),
            EventKind::SubscriberOverflow => {
                tracing::warn!(subscriber = stage, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(subscriber = stage, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
