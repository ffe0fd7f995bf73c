//! # Retry policy for stage processing.
//!
//! [`RetryPolicy`] decides whether a stage re-runs its processing function for
//! the same item after a retryable [`StageError::Fail`](crate::StageError::Fail).
//!
//! - [`RetryPolicy::Never`] one attempt per item (default).
//! - [`RetryPolicy::Limited`] up to `max_retries` extra attempts.
//! - [`RetryPolicy::Always`] retry until success, a fatal error, or cancellation.
//!
//! The item is reported to the error sink **once**, after the last attempt.
//! Backoff sleeps between attempts are cancellable.

/// Policy controlling how often a failed item is re-processed by the same stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Never retry: the first failure is final.
    #[default]
    Never,
    /// Retry at most `max_retries` times after the first attempt.
    Limited {
        /// Extra attempts allowed after the initial one.
        max_retries: u32,
    },
    /// Retry retryable failures without limit (stopped only by cancellation).
    Always,
}

impl RetryPolicy {
    /// Returns true if another attempt is allowed after `attempt` attempts (1-based) have failed.
    ///
    /// # Example
    /// ```
    /// use stagevisor::RetryPolicy;
    ///
    /// let p = RetryPolicy::Limited { max_retries: 2 };
    /// assert!(p.allows_retry(1));
    /// assert!(p.allows_retry(2));
    /// assert!(!p.allows_retry(3));
    /// assert!(!RetryPolicy::Never.allows_retry(1));
    /// ```
    pub fn allows_retry(&self, attempt: u32) -> bool {
        match self {
            RetryPolicy::Never => false,
            RetryPolicy::Limited { max_retries } => attempt <= *max_retries,
            RetryPolicy::Always => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_never() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::Never);
    }

    #[test]
    fn limited_zero_behaves_like_never() {
        let p = RetryPolicy::Limited { max_retries: 0 };
        assert!(!p.allows_retry(1));
    }

    #[test]
    fn always_keeps_allowing() {
        assert!(RetryPolicy::Always.allows_retry(u32::MAX));
    }
}
