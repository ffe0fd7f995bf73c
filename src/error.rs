//! Error types used by the gate, the pipeline and stage functions.
//!
//! This module defines four error enums:
//!
//! - [`GateError`] failures to obtain an admission [`Ticket`](crate::Ticket).
//! - [`PipelineError`] failures of pipeline operations (`submit`, `drain`, `build`).
//! - [`StageError`] failures returned by a stage's processing function.
//! - [`ItemError`] per-item outcomes delivered to the [`ErrorSink`](crate::ErrorSink).
//!
//! All types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//!
//! No "capacity leak" variant exists: tickets and queue slots are
//! released by their owners' `Drop`, so a leak cannot be observed at runtime.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the admission gate.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// No ticket became available within the wait timeout.
    #[error("gate busy: no capacity after {waited:?}")]
    Busy {
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The cancellation signal was raised while waiting.
    #[error("cancelled while waiting for admission")]
    Cancelled,

    /// The gate was closed and admits nothing anymore.
    #[error("gate closed")]
    Closed,
}

impl GateError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stagevisor::GateError;
    /// use std::time::Duration;
    ///
    /// let err = GateError::Busy { waited: Duration::from_millis(5) };
    /// assert_eq!(err.as_label(), "gate_busy");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            GateError::Busy { .. } => "gate_busy",
            GateError::Cancelled => "gate_cancelled",
            GateError::Closed => "gate_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            GateError::Busy { waited } => format!("busy after {waited:?}"),
            GateError::Cancelled => "cancelled".to_string(),
            GateError::Closed => "closed".to_string(),
        }
    }
}

/// # Errors produced by pipeline operations.
///
/// Returned synchronously to the caller of `submit`, `try_submit`, `drain`
/// or the builder. Per-item outcomes never show up here; they go to the sinks.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The admission gate had no capacity within the configured wait timeout.
    #[error("pipeline busy: no admission after {waited:?}")]
    Busy {
        /// How long the submitter waited.
        waited: Duration,
    },

    /// The pipeline's cancellation signal was raised.
    #[error("pipeline cancelled")]
    Cancelled,

    /// The pipeline is drained (or draining) and accepts no new items.
    #[error("pipeline closed")]
    Closed,

    /// Non-blocking submission found no room.
    #[error("pipeline full")]
    Full,

    /// Builder received an unusable stage layout.
    #[error("invalid pipeline config: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Workers did not stop within the grace period after cancellation and were aborted.
    #[error("shutdown grace {grace:?} exceeded; stuck stages: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the stages whose workers had to be aborted.
        stuck: Vec<String>,
    },
}

impl PipelineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stagevisor::PipelineError;
    ///
    /// assert_eq!(PipelineError::Closed.as_label(), "pipeline_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PipelineError::Busy { .. } => "pipeline_busy",
            PipelineError::Cancelled => "pipeline_cancelled",
            PipelineError::Closed => "pipeline_closed",
            PipelineError::Full => "pipeline_full",
            PipelineError::InvalidConfig { .. } => "pipeline_invalid_config",
            PipelineError::GraceExceeded { .. } => "pipeline_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            PipelineError::Busy { waited } => format!("busy after {waited:?}"),
            PipelineError::Cancelled => "cancelled".to_string(),
            PipelineError::Closed => "closed".to_string(),
            PipelineError::Full => "full".to_string(),
            PipelineError::InvalidConfig { reason } => format!("invalid config: {reason}"),
            PipelineError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck stages={stuck:?}")
            }
        }
    }
}

impl From<GateError> for PipelineError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Busy { waited } => PipelineError::Busy { waited },
            GateError::Cancelled => PipelineError::Cancelled,
            GateError::Closed => PipelineError::Closed,
        }
    }
}

/// # Errors returned by a stage's processing function.
///
/// `Fail` may be retried according to the stage's
/// [`RetryPolicy`](crate::RetryPolicy); `Fatal` never is.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Processing failed but may succeed if retried.
    #[error("processing failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error (should not be retried).
    #[error("fatal processing error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl StageError {
    /// Shorthand for [`StageError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        StageError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`StageError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        StageError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StageError::Fail { .. } => "stage_failed",
            StageError::Fatal { .. } => "stage_fatal",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StageError::Fail { error } => format!("error: {error}"),
            StageError::Fatal { error } => format!("fatal: {error}"),
        }
    }

    /// Indicates whether the error type is safe to retry.
    ///
    /// # Example
    /// ```
    /// use stagevisor::StageError;
    ///
    /// assert!(StageError::fail("flaky").is_retryable());
    /// assert!(!StageError::fatal("corrupt").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Fail { .. })
    }
}

/// # Terminal per-item failure, as delivered to the error sink.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// The stage's processing function failed (after any retries).
    #[error("stage '{stage}' failed: {error}")]
    ProcessingFailed {
        /// Name of the stage that failed.
        stage: String,
        /// The final error returned by the stage.
        error: StageError,
    },

    /// The item was abandoned because cancellation was raised.
    #[error("cancelled at stage '{stage}'")]
    Cancelled {
        /// Name of the stage that held (or was about to take) the item.
        stage: String,
    },
}

impl ItemError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ItemError::ProcessingFailed { .. } => "item_processing_failed",
            ItemError::Cancelled { .. } => "item_cancelled",
        }
    }

    /// Name of the stage the failure is attributed to.
    pub fn stage(&self) -> &str {
        match self {
            ItemError::ProcessingFailed { stage, .. } | ItemError::Cancelled { stage } => stage,
        }
    }

    /// True if the item was abandoned by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ItemError::Cancelled { .. })
    }
}
