//! # stagevisor
//!
//! **Stagevisor** is a bounded concurrency pipeline for Tokio.
//!
//! It combines three primitives:
//! - an **admission gate** capping how much work is inside the system at once;
//! - a **stage pipeline**: ordered stages, each with a worker pool and a bounded
//!   input queue, so backpressure from the slowest stage reaches `submit`;
//! - a **cancellation signal**: one-shot, hierarchical, optionally timed, that
//!   makes every blocked submitter, worker and gate waiter exit promptly.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   submit(WorkItem) ──► AdmissionGate ──admit──► Ticket travels with the item
//!          │                 ├─ busy (timeout)  ─► PipelineError::Busy
//!          │                 └─ cancelled       ─► PipelineError::Cancelled
//!          ▼
//! ┌──────────────────┐   ┌──────────────────┐        ┌──────────────────┐
//! │ queue 0 (cap C0) │──►│ queue 1 (cap C1) │─ … ──► │ queue N-1        │
//! └────────┬─────────┘   └────────┬─────────┘        └────────┬─────────┘
//!          ▼                      ▼                           ▼
//!   stage 0 workers ──push──► stage 1 workers ──push──► stage N-1 workers ──► ResultSink
//!   (W0 in parallel)          (W1 in parallel)          (WN-1 in parallel)
//!          │                      │                           │
//!          └──────── ProcessingFailed / Cancelled (once per item) ─────────► ErrorSink
//!
//!   every worker ── publish(Event) ──► Bus ──► listener ──► SubscriberSet ──► Subscribe::on_event
//! ```
//!
//! ### Cancellation
//! ```text
//! parent signal ──child──► pipeline signal ──► take / push / backoff / gate waits return
//!                                │
//! drain(signal) ─ raised first ──┴─► grace wait ─► abort stragglers ─► report held + queued
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Admission**     | Cap concurrently admitted work; RAII tickets.                | [`AdmissionGate`], [`Ticket`]               |
//! | **Pipeline**      | Ordered stages, worker pools, bounded queues.                | [`Pipeline`], [`PipelineBuilder`]           |
//! | **Stages**        | Processing functions and per-stage settings.                 | [`Stage`], [`StageFn`], [`StageSpec`]       |
//! | **Cancellation**  | Hierarchical one-shot signals, timeouts, OS signals.         | [`CancellationSignal`], [`raise_on_shutdown`] |
//! | **Sinks**         | Terminal destinations for results and failures.              | [`ResultSink`], [`ErrorSink`], [`MemorySink`] |
//! | **Policies**      | Per-stage retry with backoff and jitter.                     | [`RetryPolicy`], [`BackoffPolicy`]          |
//! | **Subscriber API**| Observe item and worker lifecycle events.                    | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed errors for gate, pipeline, stages and items.           | [`PipelineError`], [`ItemError`]            |
//! | **Pooling**       | Reusable objects for stage internals.                        | [`pool::Pool`]                              |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stagevisor::{
//!     CancellationSignal, Config, MemorySink, Pipeline, StageError, StageFn, StageSpec, WorkItem,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let parse = StageFn::arc("parse", |s: String, _ctx: CancellationSignal| async move {
//!         s.trim().parse::<i64>().map(|n| n.to_string()).map_err(|e| StageError::fatal(e.to_string()))
//!     });
//!     let shout = StageFn::arc("shout", |s: String, _ctx: CancellationSignal| async move {
//!         Ok::<_, StageError>(format!("{s}!"))
//!     });
//!
//!     let sink = Arc::new(MemorySink::new());
//!     let pipeline = Pipeline::builder(Config::default())
//!         .stage(StageSpec::new(parse, 2, 8))
//!         .stage(StageSpec::new(shout, 1, 8))
//!         .with_result_sink(sink.clone())
//!         .with_error_sink(sink.clone())
//!         .build()?;
//!
//!     for (id, raw) in [" 1", "two", "3 "].into_iter().enumerate() {
//!         pipeline.submit(WorkItem::new(id as u64, raw.to_string())).await?;
//!     }
//!
//!     let deadline = CancellationSignal::with_timeout(Duration::from_secs(5));
//!     pipeline.drain(&deadline).await?;
//!
//!     assert_eq!(sink.result_count(), 2);
//!     assert_eq!(sink.failures()[0].id, 1);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod gate;
mod pipeline;
mod policies;
mod signal;
mod sinks;
mod stages;
mod subscribers;

pub mod pool;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{GateError, ItemError, PipelineError, StageError};
pub use events::{Bus, Event, EventKind};
pub use gate::{AdmissionGate, Ticket};
pub use pipeline::{Pipeline, PipelineBuilder, WorkItem};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use signal::{CancelReason, CancellationSignal, raise_on_shutdown, wait_for_shutdown_signal};
pub use sinks::{ErrorSink, ItemFailure, MemorySink, ResultSink};
pub use stages::{Stage, StageFn, StageRef, StageSpec};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
