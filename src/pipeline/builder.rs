//! # Pipeline builder.
//!
//! Collects stage specs, sinks, an optional gate, an optional parent signal and
//! subscribers, validates the layout, then spawns every worker pool.
//!
//! ```text
//! Pipeline::builder(cfg)
//!     .stage(parse)            ┐
//!     .stage(score)            ├─ at least one stage, every stage >= 1 worker
//!     .with_result_sink(sink)  ┘
//!     .build()?  ──► queues[0..N] created, N × workers spawned, listener started
//! ```
//!
//! `build` must run inside a Tokio runtime.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};

use super::inflight::InflightTracker;
use super::orchestrator::{Pipeline, PipelineParts};
use super::queue::{QueueRx, QueueTx, stage_queue};
use super::worker::{Output, StageWorker, WorkerContext};
use crate::config::Config;
use crate::error::PipelineError;
use crate::events::{Bus, EventKind};
use crate::gate::AdmissionGate;
use crate::signal::CancellationSignal;
use crate::sinks::{DiscardSink, ErrorSink, ResultSink};
use crate::stages::StageSpec;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder returned by [`Pipeline::builder`].
pub struct PipelineBuilder<T> {
    cfg: Config,
    stages: Vec<StageSpec<T>>,
    results: Option<Arc<dyn ResultSink<T>>>,
    errors: Option<Arc<dyn ErrorSink>>,
    gate: Option<AdmissionGate>,
    parent: Option<CancellationSignal>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<T: Clone + Send + 'static> PipelineBuilder<T> {
    pub(crate) fn new(cfg: Config) -> Self {
        Self {
            cfg,
            stages: Vec::new(),
            results: None,
            errors: None,
            gate: None,
            parent: None,
            subscribers: Vec::new(),
        }
    }

    /// Appends a stage; stages run in the order they are added.
    pub fn stage(mut self, spec: StageSpec<T>) -> Self {
        self.stages.push(spec);
        self
    }

    /// Sets where finished items go. Without it, results are dropped.
    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink<T>>) -> Self {
        self.results = Some(sink);
        self
    }

    /// Sets where failed and cancelled items are reported. Without it, they are logged.
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.errors = Some(sink);
        self
    }

    /// Guards `submit` with an admission gate; the ticket lives as long as the item.
    pub fn with_gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Makes the pipeline's signal a child of `parent`.
    pub fn with_signal(mut self, parent: CancellationSignal) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds event subscribers.
    pub fn with_subscribers(mut self, subs: impl IntoIterator<Item = Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subs);
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::InvalidConfig {
                reason: "pipeline needs at least one stage".into(),
            });
        }
        if let Some(spec) = self.stages.iter().find(|s| s.workers() == 0) {
            return Err(PipelineError::InvalidConfig {
                reason: format!("stage '{}' has zero workers", spec.name()),
            });
        }
        Ok(())
    }

    /// Validates the layout and spawns the worker pools.
    ///
    /// # Errors
    /// [`PipelineError::InvalidConfig`] for zero stages or a zero-worker stage.
    pub fn build(self) -> Result<Pipeline<T>, PipelineError> {
        self.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let listener = if self.subscribers.is_empty() {
            None
        } else {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            Some(subscriber_listener(&bus, set))
        };

        let signal = CancellationSignal::derive(self.parent.as_ref(), None);
        let names: Vec<Arc<str>> = self.stages.iter().map(|s| Arc::from(s.name())).collect();
        let inflight = Arc::new(InflightTracker::new(&names));
        let ctx = WorkerContext {
            errors: self.errors.unwrap_or_else(|| Arc::new(DiscardSink)),
            inflight: Arc::clone(&inflight),
            bus: bus.clone(),
            signal: signal.clone(),
        };
        let results: Arc<dyn ResultSink<T>> = self.results.unwrap_or_else(|| Arc::new(DiscardSink));

        let (mut senders, queues): (Vec<QueueTx<T>>, Vec<QueueRx<T>>) = self
            .stages
            .iter()
            .map(|s| stage_queue(s.capacity()))
            .unzip();
        let input = senders.remove(0);

        let mut workers = JoinSet::new();
        for (index, spec) in self.stages.into_iter().enumerate() {
            for worker in 0..spec.workers() {
                let output = match senders.get(index) {
                    Some(next) => Output::Next(next.clone()),
                    None => Output::Sink(Arc::clone(&results)),
                };
                let w = StageWorker::new(
                    ctx.clone(),
                    (index, worker),
                    spec.clone(),
                    queues[index].clone(),
                    output,
                );
                workers.spawn(w.run());
            }
        }
        // Only worker-held clones may keep downstream queues open.
        drop(senders);

        tracing::debug!(stages = names.len(), "pipeline started");
        Ok(Pipeline::from_parts(PipelineParts {
            cfg: self.cfg,
            names,
            input,
            queues,
            workers,
            gate: self.gate,
            signal,
            errors: ctx.errors,
            bus,
            inflight,
            listener,
        }))
    }
}

/// Forwards bus events to the subscriber set until `DrainCompleted` (or the bus closes),
/// then lets every subscriber finish its queue.
fn subscriber_listener(bus: &Bus, set: SubscriberSet) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let last = ev.kind == EventKind::DrainCompleted;
                    set.emit(ev);
                    if last {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "subscriber listener lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    })
}
