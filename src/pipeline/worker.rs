//! # Stage worker: one member of a stage's worker pool.
//!
//! Takes items from its stage queue, runs the stage with retry and backoff,
//! then hands the result downstream or reports the failure.
//!
//! ## Item flow
//! ```text
//! take ──► enter ──► attempt 1 ──Ok──► ItemProcessed ──► push next queue ─┐
//!                       │                               or result sink ───┼─► leave + release ticket
//!                      Err(Fail) + retry allowed                          │
//!                       ├─► ItemRetrying ─► sleep(backoff) ─► attempt 2 … │
//!                      Err(Fatal) / panic / retries exhausted             │
//!                       └─► ItemFailed ─► error sink (ProcessingFailed) ──┤
//!                      signal raised at any point                         │
//!                       └─► ItemCancelled ─► error sink (Cancelled) ──────┘
//! ```
//!
//! ## Rules
//! - Each item is reported to exactly one sink, once.
//! - A raised signal is observed at safe points only (take, backoff, push,
//!   before the sink); a running stage call is never interrupted here.
//! - Stage panics are caught and become `ProcessingFailed` with a fatal error.
//! - The payload is cloned before an attempt only when a retry could follow.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use super::inflight::InflightTracker;
use super::item::{Envelope, WorkItem};
use super::queue::{PushError, QueueRx, QueueTx};
use crate::error::{ItemError, StageError};
use crate::events::{Bus, Event, EventKind};
use crate::gate::Ticket;
use crate::signal::CancellationSignal;
use crate::sinks::{ErrorSink, ItemFailure, ResultSink};
use crate::stages::StageSpec;
use crate::subscribers::panic_message;

/// Where a worker sends successful output.
pub(crate) enum Output<T> {
    /// Next stage's queue.
    Next(QueueTx<T>),
    /// Terminal sink (last stage only).
    Sink(Arc<dyn ResultSink<T>>),
}

/// State shared by every worker of a pipeline.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) errors: Arc<dyn ErrorSink>,
    pub(crate) inflight: Arc<InflightTracker>,
    pub(crate) bus: Bus,
    pub(crate) signal: CancellationSignal,
}

enum Outcome<T> {
    Done(T),
    Failed { error: StageError, attempt: u32 },
    Cancelled,
}

/// One worker of one stage.
pub(crate) struct StageWorker<T> {
    ctx: WorkerContext,
    index: usize,
    worker: usize,
    name: Arc<str>,
    spec: StageSpec<T>,
    input: QueueRx<T>,
    output: Output<T>,
}

impl<T: Clone + Send + 'static> StageWorker<T> {
    pub(crate) fn new(
        ctx: WorkerContext,
        (index, worker): (usize, usize),
        spec: StageSpec<T>,
        input: QueueRx<T>,
        output: Output<T>,
    ) -> Self {
        Self {
            ctx,
            index,
            worker,
            name: Arc::from(spec.name()),
            spec,
            input,
            output,
        }
    }

    /// Runs until the input queue is closed and empty, or the signal is raised.
    pub(crate) async fn run(self) {
        let _live = self.ctx.inflight.worker_guard(self.index);
        tracing::debug!(stage = %self.name, worker = self.worker, "worker started");
        self.ctx.bus.publish_with(|| self.event(EventKind::WorkerStarted));

        while let Some(env) = self.input.take(&self.ctx.signal).await {
            self.handle(env).await;
        }

        tracing::debug!(
            stage = %self.name,
            worker = self.worker,
            cancelled = self.ctx.signal.is_raised(),
            "worker stopped"
        );
        self.ctx.bus.publish_with(|| self.event(EventKind::WorkerStopped));
    }

    async fn handle(&self, env: Envelope<T>) {
        let Envelope { item, ticket } = env;
        let seq = item.seq();
        let id = item.id;
        self.ctx.inflight.enter(self.index, seq, id);

        match self.attempt_all(id, item.into_payload()).await {
            Outcome::Done(output) => {
                self.forward(WorkItem::new(id, output).with_seq(seq), ticket)
                    .await
            }
            Outcome::Failed { error, attempt } => {
                tracing::debug!(stage = %self.name, item = id, attempt, %error, "item failed");
                self.ctx.bus.publish_with(|| {
                    self.item_event(EventKind::ItemFailed, id)
                        .with_attempt(attempt)
                        .with_reason(error.as_message())
                });
                let error = ItemError::ProcessingFailed {
                    stage: self.name.to_string(),
                    error,
                };
                self.report(id, seq, error, ticket).await;
            }
            Outcome::Cancelled => self.cancel_item(id, seq, ticket).await,
        }
    }

    /// Runs the stage until success, a final failure, or cancellation.
    async fn attempt_all(&self, id: u64, payload: T) -> Outcome<T> {
        let retry = self.spec.retry();
        let backoff = self.spec.backoff();
        let mut input = payload;
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let spare = retry.allows_retry(attempt).then(|| input.clone());

            let fut = self.spec.stage().process(input, self.ctx.signal.clone());
            let error = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(output)) => {
                    self.ctx.bus.publish_with(|| {
                        self.item_event(EventKind::ItemProcessed, id)
                            .with_attempt(attempt)
                    });
                    return Outcome::Done(output);
                }
                Ok(Err(e)) => e,
                Err(panic) => {
                    let info = panic_message(panic.as_ref());
                    tracing::warn!(stage = %self.name, item = id, %info, "stage panicked");
                    StageError::fatal(format!("stage panicked: {info}"))
                }
            };

            if self.ctx.signal.is_raised() {
                return Outcome::Cancelled;
            }
            let next = match spare {
                Some(next) if error.is_retryable() => next,
                _ => return Outcome::Failed { error, attempt },
            };

            let delay = backoff.next(attempt - 1);
            tracing::trace!(stage = %self.name, item = id, attempt, ?delay, "retrying item");
            self.ctx.bus.publish_with(|| {
                self.item_event(EventKind::ItemRetrying, id)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_reason(error.as_message())
            });

            tokio::select! {
                biased;
                _ = self.ctx.signal.cancelled() => return Outcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            input = next;
        }
    }

    async fn forward(&self, item: WorkItem<T>, ticket: Option<Ticket>) {
        let seq = item.seq();
        match &self.output {
            Output::Next(next) => {
                match next.push(Envelope::new(item, ticket), &self.ctx.signal).await {
                    Ok(()) => self.ctx.inflight.leave(self.index, seq),
                    Err(PushError::Cancelled(env) | PushError::Closed(env)) => {
                        let Envelope { item, ticket } = env;
                        self.cancel_item(item.id, seq, ticket).await;
                    }
                }
            }
            Output::Sink(sink) => {
                if self.ctx.signal.is_raised() {
                    return self.cancel_item(item.id, seq, ticket).await;
                }
                let id = item.id;
                if let Err(panic) = AssertUnwindSafe(sink.accept(item)).catch_unwind().await {
                    let info = panic_message(panic.as_ref());
                    tracing::warn!(stage = %self.name, item = id, %info, "result sink panicked");
                }
                self.ctx.inflight.leave(self.index, seq);
                drop(ticket);
                self.ctx
                    .bus
                    .publish_with(|| self.item_event(EventKind::ItemCompleted, id));
            }
        }
    }

    async fn cancel_item(&self, id: u64, seq: u64, ticket: Option<Ticket>) {
        tracing::trace!(stage = %self.name, item = id, "item cancelled");
        self.ctx
            .bus
            .publish_with(|| self.item_event(EventKind::ItemCancelled, id));
        let error = ItemError::Cancelled {
            stage: self.name.to_string(),
        };
        self.report(id, seq, error, ticket).await;
    }

    /// Delivers the failure, then forgets the item and releases its ticket.
    async fn report(&self, id: u64, seq: u64, error: ItemError, ticket: Option<Ticket>) {
        let failure = ItemFailure { id, seq, error };
        if let Err(panic) = AssertUnwindSafe(self.ctx.errors.report(failure))
            .catch_unwind()
            .await
        {
            let info = panic_message(panic.as_ref());
            tracing::warn!(stage = %self.name, item = id, %info, "error sink panicked");
        }
        self.ctx.inflight.leave(self.index, seq);
        drop(ticket);
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind)
            .with_stage(Arc::clone(&self.name))
            .with_worker(self.worker)
    }

    fn item_event(&self, kind: EventKind, id: u64) -> Event {
        self.event(kind).with_item(id)
    }
}
