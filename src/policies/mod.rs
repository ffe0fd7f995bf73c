//! Retry policies for stage processing.
//!
//! This module groups the knobs that control **if** a stage re-runs its
//! processing function after a failure and **how long** it waits in between.
//!
//! ## Contents
//! - [`RetryPolicy`] when to retry an item (never / limited / always)
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! StageSpec { retry: RetryPolicy, backoff: BackoffPolicy, .. }
//!      └─► pipeline::worker uses:
//!           - retry.allows_retry(attempt) to decide re-run/report
//!           - backoff.next(attempt - 1) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::Never` (a failure is reported immediately).
//! - `BackoffPolicy::default()` → first=100ms, factor=1.0 (constant), max=30s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
