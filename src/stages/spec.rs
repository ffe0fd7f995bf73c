//! # Stage specification.
//!
//! [`StageSpec`] bundles a [`StageRef`] with how it runs inside a pipeline:
//! worker-pool size, input queue capacity, retry and backoff.
//!
//! A spec can be created:
//! - **Explicitly** with [`StageSpec::new`]
//! - **From config** with [`StageSpec::with_defaults`]
//!
//! ## Example
//! ```rust
//! use stagevisor::{CancellationSignal, Config, RetryPolicy, StageError, StageFn, StageRef, StageSpec};
//!
//! let parse: StageRef<String> = StageFn::arc("parse", |s: String, _ctx: CancellationSignal| async move {
//!     Ok::<_, StageError>(s.trim().to_string())
//! });
//!
//! let spec = StageSpec::new(parse.clone(), 4, 32)
//!     .with_retry(RetryPolicy::Limited { max_retries: 2 });
//! assert_eq!(spec.workers(), 4);
//!
//! let cfg = Config::default();
//! let spec2 = StageSpec::with_defaults(parse, &cfg);
//! assert_eq!(spec2.capacity(), cfg.default_capacity);
//! ```

use crate::{
    config::Config,
    policies::{BackoffPolicy, RetryPolicy},
    stages::StageRef,
};

/// Specification for running a stage inside a pipeline.
pub struct StageSpec<T> {
    stage: StageRef<T>,
    workers: usize,
    capacity: usize,
    retry: RetryPolicy,
    backoff: BackoffPolicy,
}

impl<T: Send + 'static> StageSpec<T> {
    /// Creates a spec with explicit pool size and queue capacity.
    ///
    /// `capacity = 0` makes the input queue a synchronous hand-off.
    /// `workers = 0` is rejected by the pipeline builder.
    pub fn new(stage: StageRef<T>, workers: usize, capacity: usize) -> Self {
        Self {
            stage,
            workers,
            capacity,
            retry: RetryPolicy::default(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Creates a spec inheriting pool size, capacity, retry and backoff from `cfg`.
    pub fn with_defaults(stage: StageRef<T>, cfg: &Config) -> Self {
        Self {
            stage,
            workers: cfg.default_workers_clamped(),
            capacity: cfg.default_capacity,
            retry: cfg.retry,
            backoff: cfg.backoff,
        }
    }

    /// Returns reference to the stage.
    pub fn stage(&self) -> &StageRef<T> {
        &self.stage
    }

    /// Convenience: returns the stage name.
    pub fn name(&self) -> &str {
        self.stage.name()
    }

    /// Worker-pool size.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Input queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retry policy.
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Backoff between retries.
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Returns a new spec with updated pool size.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Returns a new spec with updated queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Returns a new spec with updated retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns a new spec with updated backoff.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

impl<T> Clone for StageSpec<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
            workers: self.workers,
            capacity: self.capacity,
            retry: self.retry,
            backoff: self.backoff,
        }
    }
}
