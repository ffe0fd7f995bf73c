//! # Jitter for retry delays.
//!
//! [`JitterPolicy`] spreads retries of many workers that failed at the same
//! moment (for example when a downstream dependency blips).
//!
//! - [`JitterPolicy::None`] exact backoff delay
//! - [`JitterPolicy::Full`] random delay in `[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    #[default]
    None,
    /// Full jitter: random delay in `[0, delay]`.
    Full,
    /// Equal jitter: keeps at least half of the delay.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        if matches!(self, JitterPolicy::None) {
            return delay;
        }
        let nanos = delay.as_nanos().min(u128::from(u64::MAX)) as u64;
        if nanos == 0 {
            return Duration::ZERO;
        }
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_nanos(rand::rng().random_range(0..=nanos)),
            JitterPolicy::Equal => {
                let half = nanos / 2;
                Duration::from_nanos(half + rand::rng().random_range(0..=nanos - half))
            }
        }
    }
}
