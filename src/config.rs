//! # Pipeline configuration.
//!
//! Provides [`Config`], the settings shared by a pipeline and its stages.
//!
//! Config is used in two ways:
//! 1. **Pipeline creation**: `Pipeline::builder(config)`
//! 2. **StageSpec defaults**: `StageSpec::with_defaults(stage, &config)`
//!
//! ## Sentinel values
//! - `acquire_timeout = 0s` → submitters wait for admission without bound
//! - `grace = 0s` → workers are aborted immediately after cancellation
//! - `default_workers = 0` → treated as 1
//! - `default_capacity = 0` → synchronous hand-off queues

use std::time::Duration;

use crate::policies::{BackoffPolicy, RetryPolicy};

/// Configuration for a pipeline and the defaults of its stages.
///
/// All fields are public. Prefer the helper accessors over checking the
/// `0` sentinels by hand.
#[derive(Clone, Debug)]
pub struct Config {
    /// How long `submit` waits for gate admission before failing with `Busy`.
    ///
    /// Only used when the pipeline has an [`AdmissionGate`](crate::AdmissionGate).
    pub acquire_timeout: Duration,

    /// If true, a `Busy` admission failure cancels the whole pipeline instead of
    /// failing only that `submit` call.
    pub cancel_on_busy: bool,

    /// How long `drain` waits for workers to stop after cancellation before aborting them.
    pub grace: Duration,

    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,

    /// Default worker-pool size for [`StageSpec::with_defaults`](crate::StageSpec::with_defaults).
    pub default_workers: usize,

    /// Default input queue capacity for [`StageSpec::with_defaults`](crate::StageSpec::with_defaults).
    pub default_capacity: usize,

    /// Default retry policy for stages.
    pub retry: RetryPolicy,

    /// Default backoff between retries.
    pub backoff: BackoffPolicy,
}

impl Config {
    /// Returns the admission wait timeout as an `Option` (`None` = wait without bound).
    #[inline]
    pub fn acquire_timeout(&self) -> Option<Duration> {
        if self.acquire_timeout == Duration::ZERO {
            None
        } else {
            Some(self.acquire_timeout)
        }
    }

    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the default worker count clamped to a minimum of 1.
    #[inline]
    pub fn default_workers_clamped(&self) -> usize {
        self.default_workers.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `acquire_timeout = 0s` (wait for admission without bound)
    /// - `cancel_on_busy = false`
    /// - `grace = 5s`
    /// - `bus_capacity = 1024`
    /// - `default_workers = 1`, `default_capacity = 16`
    /// - `retry = RetryPolicy::Never`, `backoff = BackoffPolicy::default()`
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::ZERO,
            cancel_on_busy: false,
            grace: Duration::from_secs(5),
            bus_capacity: 1024,
            default_workers: 1,
            default_capacity: 16,
            retry: RetryPolicy::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}
