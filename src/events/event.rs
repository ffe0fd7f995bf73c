//! # Events emitted while items move through a pipeline.
//!
//! [`EventKind`] classifies events into four groups:
//! - **Item events**: one item's journey (submitted, processed, retrying, failed, cancelled, completed)
//! - **Admission events**: gate rejections
//! - **Worker/drain events**: worker pool lifecycle and pipeline shutdown
//! - **Subscriber events**: overflow and panics of the fan-out itself
//!
//! Each [`Event`] published on a pipeline's [`Bus`](crate::Bus) carries that bus's
//! monotonic `seq` (starting at 0); use it to restore order when events from
//! different workers are observed out of order.
//!
//! ## Example
//! ```rust
//! use stagevisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ItemFailed)
//!     .with_stage("score")
//!     .with_item(42)
//!     .with_attempt(3)
//!     .with_reason("bad record");
//!
//! assert_eq!(ev.stage.as_deref(), Some("score"));
//! assert_eq!(ev.item, Some(42));
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Classification of pipeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Item events ===
    /// Item accepted into the first stage queue.
    ///
    /// Sets: `item`, `stage` (first stage).
    ItemSubmitted,

    /// A stage processed the item successfully and handed it on.
    ///
    /// Sets: `item`, `stage`, `attempt`.
    ItemProcessed,

    /// A retryable failure occurred; the stage will try again after `delay_ms`.
    ///
    /// Sets: `item`, `stage`, `attempt`, `delay_ms`, `reason`.
    ItemRetrying,

    /// Item dropped from the pipeline after a processing failure (reported to the error sink).
    ///
    /// Sets: `item`, `stage`, `attempt`, `reason`.
    ItemFailed,

    /// Item abandoned because cancellation was raised (reported to the error sink).
    ///
    /// Sets: `item`, `stage`.
    ItemCancelled,

    /// Item reached the result sink.
    ///
    /// Sets: `item`, `stage` (last stage).
    ItemCompleted,

    // === Admission events ===
    /// Submission rejected: the gate had no capacity within the wait timeout.
    ///
    /// Sets: `item`, `delay_ms` (time waited).
    GateBusy,

    // === Worker / drain events ===
    /// A stage worker started.
    ///
    /// Sets: `stage`, `worker`.
    WorkerStarted,

    /// A stage worker exited (queue closed or cancellation).
    ///
    /// Sets: `stage`, `worker`.
    WorkerStopped,

    /// `drain` closed the input and began waiting for workers.
    DrainStarted,

    /// Every worker exited and every leftover item was reported.
    DrainCompleted,

    /// The pipeline's cancellation signal was raised.
    ///
    /// Sets: `reason` (cancel reason label).
    CancelRequested,

    /// Workers ignored cancellation past the grace period and were aborted.
    ///
    /// Sets: `reason` (stuck stages).
    GraceExceeded,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `stage` (subscriber name), `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `stage` (subscriber name), `reason`.
    SubscriberOverflow,
}

/// Pipeline event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Per-bus monotonically increasing sequence number, stamped on publish.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Stage (or subscriber) name, if applicable.
    pub stage: Option<Arc<str>>,
    /// Item identifier, if applicable.
    pub item: Option<u64>,
    /// Worker index within its stage pool.
    pub worker: Option<usize>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Delay in milliseconds (retry backoff or admission wait).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp.
    ///
    /// `seq` stays 0 until the event is published.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            stage: None,
            item: None,
            worker: None,
            attempt: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a stage name.
    #[inline]
    pub fn with_stage(mut self, stage: impl Into<Arc<str>>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Attaches an item identifier.
    #[inline]
    pub fn with_item(mut self, id: u64) -> Self {
        self.item = Some(id);
        self
    }

    /// Attaches a worker index.
    #[inline]
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_stage(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_stage(subscriber)
            .with_reason(info)
    }
}
