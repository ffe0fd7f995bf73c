//! # Pipeline: submission, drain and cancellation.
//!
//! [`Pipeline`] owns the stage queues, the worker pools (a `JoinSet`), the
//! optional admission gate and the pipeline's own cancellation signal.
//!
//! ## Architecture
//! ```text
//! submit(item)
//!   ├─► gate.acquire(signal, cfg.acquire_timeout)   (if configured) ─► Busy / Cancelled
//!   └─► queue[0].push(item + ticket)  (waits while full) ─────────────► Cancelled / Closed
//!
//! queue[0] ─► stage 0 workers ─► queue[1] ─► … ─► stage N-1 workers ─► ResultSink
//!                   │                                    │
//!                   └────────── failures / cancellations ┴──────────► ErrorSink
//!
//! drain(signal)
//!   ├─► drop queue[0] sender  → queues close in cascade as pools finish
//!   ├─► all workers joined    → Ok(())
//!   └─► signal raised first   → raise pipeline signal
//!         ├─► workers joined within cfg.grace → Err(Cancelled)
//!         └─► grace exceeded → abort workers  → Err(GraceExceeded { stuck })
//!       in both cases: held + queued items → ErrorSink as ItemError::Cancelled
//! ```
//!
//! ## Rules
//! - Every submitted item reaches exactly one sink.
//! - A ticket is held from admission until the item leaves the pipeline.
//! - `submit` after `drain` fails with [`PipelineError::Closed`]; a second `drain` is `Ok(())`.
//! - Dropping a pipeline without draining aborts its workers.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use super::builder::PipelineBuilder;
use super::inflight::InflightTracker;
use super::item::{Envelope, WorkItem};
use super::queue::{PushError, QueueRx, QueueTx, TryPushError};
use crate::config::Config;
use crate::error::{GateError, ItemError, PipelineError};
use crate::events::{Bus, Event, EventKind};
use crate::gate::AdmissionGate;
use crate::signal::CancellationSignal;
use crate::sinks::{ErrorSink, ItemFailure};
use crate::subscribers::panic_message;

pub(crate) struct PipelineParts<T> {
    pub(crate) cfg: Config,
    pub(crate) names: Vec<Arc<str>>,
    pub(crate) input: QueueTx<T>,
    pub(crate) queues: Vec<QueueRx<T>>,
    pub(crate) workers: JoinSet<()>,
    pub(crate) gate: Option<AdmissionGate>,
    pub(crate) signal: CancellationSignal,
    pub(crate) errors: Arc<dyn ErrorSink>,
    pub(crate) bus: Bus,
    pub(crate) inflight: Arc<InflightTracker>,
    pub(crate) listener: Option<JoinHandle<()>>,
}

/// A running multi-stage pipeline.
///
/// Share it behind an `Arc` to submit from several tasks.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use stagevisor::{
///     AdmissionGate, CancellationSignal, Config, MemorySink, Pipeline, StageError, StageFn,
///     StageSpec, WorkItem,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), stagevisor::PipelineError> {
/// let double = StageFn::arc("double", |x: u64, _ctx: CancellationSignal| async move {
///     Ok::<_, StageError>(x * 2)
/// });
/// let sink = Arc::new(MemorySink::new());
///
/// let pipeline = Pipeline::builder(Config::default())
///     .stage(StageSpec::new(double, 2, 4))
///     .with_result_sink(sink.clone())
///     .with_gate(AdmissionGate::new(3))
///     .build()?;
///
/// for x in 1..=3 {
///     pipeline.submit(WorkItem::new(x, x)).await?;
/// }
/// pipeline.drain(&CancellationSignal::new()).await?;
///
/// let mut out = sink.payloads();
/// out.sort();
/// assert_eq!(out, vec![2, 4, 6]);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<T> {
    cfg: Config,
    names: Vec<Arc<str>>,
    input: Mutex<Option<QueueTx<T>>>,
    queues: Vec<QueueRx<T>>,
    workers: tokio::sync::Mutex<JoinSet<()>>,
    gate: Option<AdmissionGate>,
    signal: CancellationSignal,
    errors: Arc<dyn ErrorSink>,
    bus: Bus,
    inflight: Arc<InflightTracker>,
    next_seq: AtomicU64,
    drained: AtomicBool,
    listener: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + 'static> Pipeline<T> {
    /// Starts building a pipeline with `cfg`.
    pub fn builder(cfg: Config) -> PipelineBuilder<T> {
        PipelineBuilder::new(cfg)
    }

    pub(crate) fn from_parts(parts: PipelineParts<T>) -> Self {
        Self {
            cfg: parts.cfg,
            names: parts.names,
            input: Mutex::new(Some(parts.input)),
            queues: parts.queues,
            workers: tokio::sync::Mutex::new(parts.workers),
            gate: parts.gate,
            signal: parts.signal,
            errors: parts.errors,
            bus: parts.bus,
            inflight: parts.inflight,
            next_seq: AtomicU64::new(0),
            drained: AtomicBool::new(false),
            listener: parts.listener,
        }
    }

    /// Admits `item` and queues it for the first stage.
    ///
    /// Waits for gate admission (bounded by [`Config::acquire_timeout`]) and
    /// then for room in the first queue. Returns once the item is queued.
    ///
    /// # Errors
    /// - [`PipelineError::Busy`] if the gate stayed full for the whole wait
    ///   (also cancels the pipeline when [`Config::cancel_on_busy`] is set);
    /// - [`PipelineError::Cancelled`] if the pipeline's signal is raised;
    /// - [`PipelineError::Closed`] after [`drain`](Self::drain) started.
    pub async fn submit(&self, item: WorkItem<T>) -> Result<(), PipelineError> {
        if self.is_closed() {
            return Err(PipelineError::Closed);
        }
        if self.signal.is_raised() {
            return Err(PipelineError::Cancelled);
        }

        let id = item.id;
        let ticket = match &self.gate {
            Some(gate) => match gate.acquire(&self.signal, self.cfg.acquire_timeout()).await {
                Ok(ticket) => Some(ticket),
                Err(GateError::Busy { waited }) => {
                    self.bus.publish(
                        Event::new(EventKind::GateBusy)
                            .with_item(id)
                            .with_delay(waited),
                    );
                    if self.cfg.cancel_on_busy {
                        tracing::warn!(item = id, ?waited, "admission busy, cancelling pipeline");
                        self.raise("gate_busy");
                    }
                    return Err(PipelineError::Busy { waited });
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let input = self.sender().ok_or(PipelineError::Closed)?;
        let item = item.with_seq(self.next_seq.fetch_add(1, Ordering::Relaxed));
        match input.push(Envelope::new(item, ticket), &self.signal).await {
            Ok(()) => {
                self.bus.publish(self.submitted_event(id));
                Ok(())
            }
            Err(PushError::Cancelled(_)) => Err(PipelineError::Cancelled),
            Err(PushError::Closed(_)) => Err(PipelineError::Closed),
        }
    }

    /// Queues `item` only if the gate and the first queue have room right now.
    ///
    /// # Errors
    /// [`PipelineError::Full`] when either is full; `Cancelled` and `Closed` as for
    /// [`submit`](Self::submit).
    pub fn try_submit(&self, item: WorkItem<T>) -> Result<(), PipelineError> {
        let input = self.sender().ok_or(PipelineError::Closed)?;
        if self.signal.is_raised() {
            return Err(PipelineError::Cancelled);
        }

        let ticket = match &self.gate {
            Some(gate) => match gate.try_acquire() {
                Ok(ticket) => Some(ticket),
                Err(GateError::Busy { .. }) => return Err(PipelineError::Full),
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let id = item.id;
        let item = item.with_seq(self.next_seq.fetch_add(1, Ordering::Relaxed));
        match input.try_push(Envelope::new(item, ticket)) {
            Ok(()) => {
                self.bus.publish(self.submitted_event(id));
                Ok(())
            }
            Err(TryPushError::Full(_)) => Err(PipelineError::Full),
            Err(TryPushError::Closed(_)) => Err(PipelineError::Closed),
        }
    }

    /// Closes the input and waits until every queued item has left the pipeline.
    ///
    /// If `signal` or the pipeline's own signal is raised first, the pipeline is
    /// cancelled: workers stop at their next safe point, items still queued or
    /// held are reported as [`ItemError::Cancelled`], and workers still running
    /// after [`Config::grace`] are aborted.
    ///
    /// # Errors
    /// - [`PipelineError::Cancelled`] if the drain was interrupted;
    /// - [`PipelineError::GraceExceeded`] if workers had to be aborted.
    pub async fn drain(&self, signal: &CancellationSignal) -> Result<(), PipelineError> {
        let mut workers = self.workers.lock().await;
        let input = self.take_input();
        if input.is_none() && workers.is_empty() {
            return Ok(());
        }
        drop(input);

        tracing::debug!(stages = self.names.len(), "drain started");
        self.bus.publish(Event::new(EventKind::DrainStarted));

        let interrupted = tokio::select! {
            biased;
            _ = signal.cancelled() => true,
            _ = self.signal.cancelled() => true,
            _ = join_all(&mut workers) => false,
        };

        let mut outcome = Ok(());
        if interrupted {
            let reason = signal.reason().or(self.signal.reason());
            self.raise(reason.map_or("explicit", |r| r.as_label()));
            outcome = Err(PipelineError::Cancelled);

            let grace = self.cfg.grace;
            if tokio::time::timeout(grace, join_all(&mut workers))
                .await
                .is_err()
            {
                let stuck = self.inflight.live_stages();
                workers.abort_all();
                join_all(&mut workers).await;

                tracing::warn!(?grace, ?stuck, "workers aborted after grace period");
                self.bus
                    .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
                outcome = Err(PipelineError::GraceExceeded { grace, stuck });
            }
        }

        self.report_leftovers().await;
        tracing::debug!(interrupted, "drain completed");
        self.bus.publish(Event::new(EventKind::DrainCompleted));
        self.drained.store(true, Ordering::Release);
        outcome
    }

    async fn report_leftovers(&self) {
        for held in self.inflight.take_all() {
            self.report_cancelled(held.id, held.seq, &held.stage).await;
        }
        for (name, queue) in self.names.iter().zip(&self.queues) {
            for env in queue.take_remaining().await {
                let Envelope { item, ticket } = env;
                self.report_cancelled(item.id, item.seq(), name).await;
                drop(ticket);
            }
        }
    }

    async fn report_cancelled(&self, id: u64, seq: u64, stage: &Arc<str>) {
        self.bus.publish(
            Event::new(EventKind::ItemCancelled)
                .with_stage(Arc::clone(stage))
                .with_item(id),
        );
        let failure = ItemFailure {
            id,
            seq,
            error: ItemError::Cancelled {
                stage: stage.to_string(),
            },
        };
        if let Err(panic) = AssertUnwindSafe(self.errors.report(failure))
            .catch_unwind()
            .await
        {
            let info = panic_message(panic.as_ref());
            tracing::warn!(item = id, %info, "error sink panicked");
        }
    }
}

impl<T> Pipeline<T> {
    /// Raises the pipeline's signal: workers, submitters and gate waiters stop.
    ///
    /// Call [`drain`](Self::drain) afterwards to collect the cancellation reports.
    pub fn cancel(&self) {
        self.raise("explicit");
    }

    fn raise(&self, reason: &str) {
        if self.signal.is_raised() {
            return;
        }
        tracing::debug!(reason, "pipeline cancellation requested");
        self.signal.raise();
        self.bus
            .publish(Event::new(EventKind::CancelRequested).with_reason(reason));
    }

    fn sender(&self) -> Option<QueueTx<T>> {
        self.input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_input(&self) -> Option<QueueTx<T>> {
        self.input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn submitted_event(&self, id: u64) -> Event {
        Event::new(EventKind::ItemSubmitted)
            .with_stage(Arc::clone(&self.names[0]))
            .with_item(id)
    }

    /// True once `drain` has started; `submit` then fails with `Closed`.
    pub fn is_closed(&self) -> bool {
        self.input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// The pipeline's own signal (a child of the builder's parent, if any).
    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// The admission gate, if configured.
    pub fn gate(&self) -> Option<&AdmissionGate> {
        self.gate.as_ref()
    }

    /// Configuration the pipeline was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Stage names in pipeline order.
    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| &**n)
    }

    /// Number of items currently held by workers (queued items excluded).
    pub fn in_flight(&self) -> usize {
        self.inflight.count()
    }

    /// Ids of the items currently held by workers of `stage`.
    pub fn in_flight_at(&self, stage: &str) -> Vec<u64> {
        self.inflight.ids_at(stage)
    }

    /// Receiver for pipeline events published from now on.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }
}

impl<T> Drop for Pipeline<T> {
    fn drop(&mut self) {
        // After drain the listener stops by itself once `DrainCompleted` is flushed.
        if self.drained.load(Ordering::Acquire) {
            return;
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.names)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.in_flight())
            .field("signal", &self.signal)
            .finish()
    }
}

async fn join_all(set: &mut JoinSet<()>) {
    while let Some(res) = set.join_next().await {
        if matches!(&res, Err(e) if e.is_panic()) {
            tracing::warn!("stage worker panicked outside item handling");
        }
    }
}
