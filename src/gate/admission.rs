//! # Admission gate: a counting gate with cancellable, bounded waits.
//!
//! [`AdmissionGate`] admits at most `limit` holders of a [`Ticket`] at a time.
//! It is a thin layer over [`tokio::sync::Semaphore`] that adds:
//! - racing every wait against a [`CancellationSignal`];
//! - an optional wait timeout reported as [`GateError::Busy`];
//! - observable counters (`in_use`, `peak_in_use`).
//!
//! ## Rules
//! - Outstanding tickets never exceed `limit`.
//! - Cancellation wins over admission when both are ready.
//! - No FIFO promise between waiters beyond eventual admission.
//! - The gate never holds its state across the protected work; only the ticket does.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stagevisor::{AdmissionGate, CancellationSignal, GateError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gate = AdmissionGate::new(1);
//! let signal = CancellationSignal::new();
//!
//! let held = gate.acquire(&signal, None).await.unwrap();
//! let err = gate
//!     .acquire(&signal, Some(Duration::from_millis(5)))
//!     .await
//!     .unwrap_err();
//! assert!(matches!(err, GateError::Busy { .. }));
//!
//! drop(held);
//! assert_eq!(gate.in_use(), 0);
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError};
use tokio::time::Instant;

use super::Ticket;
use crate::error::GateError;
use crate::signal::CancellationSignal;

pub(crate) struct GateState {
    semaphore: Arc<Semaphore>,
    limit: usize,
    pub(super) in_use: AtomicUsize,
    peak: AtomicUsize,
}

impl GateState {
    pub(super) fn on_admit(&self) {
        let now = self.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }
}

/// Concurrency-limiting guard. Cheap to clone; clones share capacity.
#[derive(Clone)]
pub struct AdmissionGate {
    state: Arc<GateState>,
}

impl AdmissionGate {
    /// Creates a gate admitting at most `limit` tickets (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            state: Arc::new(GateState {
                semaphore: Arc::new(Semaphore::new(limit)),
                limit,
                in_use: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Waits for admission.
    ///
    /// ### Timeout semantics
    /// - `None` → wait until admitted, cancelled or closed;
    /// - `Some(Duration::ZERO)` → single non-blocking attempt;
    /// - `Some(d)` → give up with [`GateError::Busy`] after `d`.
    ///
    /// # Errors
    /// - [`GateError::Cancelled`] if `signal` is (or becomes) raised first;
    /// - [`GateError::Busy`] if the timeout elapses first;
    /// - [`GateError::Closed`] if the gate is closed.
    pub async fn acquire(
        &self,
        signal: &CancellationSignal,
        timeout: Option<Duration>,
    ) -> Result<Ticket, GateError> {
        if signal.is_raised() {
            return Err(GateError::Cancelled);
        }
        if timeout == Some(Duration::ZERO) {
            return self.try_acquire();
        }

        let started = Instant::now();
        let permit = Arc::clone(&self.state.semaphore).acquire_owned();
        tokio::pin!(permit);

        tokio::select! {
            biased;
            _ = signal.cancelled() => Err(GateError::Cancelled),
            res = &mut permit => match res {
                Ok(permit) => Ok(Ticket::new(permit, Arc::clone(&self.state))),
                Err(_closed) => Err(GateError::Closed),
            },
            _ = sleep_for(timeout) => {
                let waited = started.elapsed();
                tracing::debug!(?waited, limit = self.state.limit, "admission timed out");
                Err(GateError::Busy { waited })
            }
        }
    }

    /// Attempts admission without waiting.
    ///
    /// # Errors
    /// [`GateError::Busy`] (with `waited = 0`) when full, [`GateError::Closed`] when closed.
    pub fn try_acquire(&self) -> Result<Ticket, GateError> {
        match Arc::clone(&self.state.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(Ticket::new(permit, Arc::clone(&self.state))),
            Err(TryAcquireError::NoPermits) => Err(GateError::Busy {
                waited: Duration::ZERO,
            }),
            Err(TryAcquireError::Closed) => Err(GateError::Closed),
        }
    }

    /// Runs `work` while holding a ticket; the ticket is released on every exit path.
    ///
    /// # Errors
    /// Same as [`AdmissionGate::acquire`]; `work` is not started unless admitted.
    pub async fn run<F>(
        &self,
        signal: &CancellationSignal,
        timeout: Option<Duration>,
        work: F,
    ) -> Result<F::Output, GateError>
    where
        F: Future,
    {
        let _ticket = self.acquire(signal, timeout).await?;
        Ok(work.await)
    }

    /// Closes the gate: pending and future `acquire` calls fail with [`GateError::Closed`].
    ///
    /// Tickets already handed out stay valid until released.
    pub fn close(&self) {
        self.state.semaphore.close();
    }

    /// True once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.state.semaphore.is_closed()
    }

    /// Configured capacity.
    #[inline]
    pub fn limit(&self) -> usize {
        self.state.limit
    }

    /// Number of tickets currently outstanding.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.state.in_use.load(Ordering::Acquire)
    }

    /// Remaining capacity.
    #[inline]
    pub fn available(&self) -> usize {
        self.state.semaphore.available_permits()
    }

    /// Highest number of simultaneously outstanding tickets observed so far.
    #[inline]
    pub fn peak_in_use(&self) -> usize {
        self.state.peak.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("limit", &self.limit())
            .field("in_use", &self.in_use())
            .field("peak_in_use", &self.peak_in_use())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn sleep_for(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
