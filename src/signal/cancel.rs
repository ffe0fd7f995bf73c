//! # One-shot hierarchical cancellation signal.
//!
//! [`CancellationSignal`] wraps a [`CancellationToken`] and adds the two things
//! the pipeline needs on top of it: a recorded [`CancelReason`] and an optional
//! deadline after which the signal raises itself.
//!
//! ## State machine
//! ```text
//!   Active ──raise() / timeout / parent raised──► Raised   (terminal)
//! ```
//!
//! ## Rules
//! - `raise()` is idempotent; the first cause wins and is kept as the reason.
//! - Raising a parent raises every child; raising a child never touches the parent.
//! - `cancelled()` is ready for every current and future waiter once raised.
//! - Clones share state. The deadline timer is aborted when the last clone is dropped.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stagevisor::{CancelReason, CancellationSignal};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let root = CancellationSignal::new();
//! let request = root.child_with_timeout(Duration::from_millis(10));
//!
//! request.cancelled().await;
//! assert_eq!(request.reason(), Some(CancelReason::Timeout));
//! assert!(!root.is_raised());
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why a [`CancellationSignal`] was raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// `raise()` was called (directly or on an ancestor).
    Explicit,
    /// The signal's own deadline (or an ancestor's) elapsed.
    Timeout,
}

impl CancelReason {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CancelReason::Explicit => "explicit",
            CancelReason::Timeout => "timeout",
        }
    }
}

struct Inner {
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
    parent: Option<CancellationSignal>,
    timer: OnceLock<AbortHandle>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get() {
            timer.abort();
        }
    }
}

/// One-shot, broadcast, hierarchical cancellation flag.
#[derive(Clone)]
pub struct CancellationSignal {
    inner: Arc<Inner>,
}

impl CancellationSignal {
    /// Creates a fresh root signal without deadline.
    pub fn new() -> Self {
        Self::derive(None, None)
    }

    /// Creates a root signal that raises itself after `timeout`.
    ///
    /// Must be called inside a Tokio runtime (the deadline runs as a task).
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::derive(None, Some(timeout))
    }

    /// Creates a child signal: raised when `self` is raised, never the reverse.
    pub fn child(&self) -> Self {
        Self::derive(Some(self), None)
    }

    /// Creates a child signal with its own deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        Self::derive(Some(self), Some(timeout))
    }

    /// General constructor: optional parent, optional deadline.
    ///
    /// A zero timeout yields an already-raised signal with [`CancelReason::Timeout`].
    /// A non-zero timeout spawns a timer task and therefore needs a Tokio runtime.
    pub fn derive(parent: Option<&CancellationSignal>, timeout: Option<Duration>) -> Self {
        let token = match parent {
            Some(p) => p.inner.token.child_token(),
            None => CancellationToken::new(),
        };
        let signal = Self {
            inner: Arc::new(Inner {
                token,
                reason: OnceLock::new(),
                parent: parent.cloned(),
                timer: OnceLock::new(),
            }),
        };

        match timeout {
            Some(d) if d.is_zero() => signal.raise_with(CancelReason::Timeout),
            Some(d) => signal.arm_timer(d),
            None => {}
        }
        signal
    }

    fn arm_timer(&self, timeout: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(inner) = weak.upgrade() {
                        tracing::debug!(?timeout, "cancellation deadline elapsed");
                        CancellationSignal { inner }.raise_with(CancelReason::Timeout);
                    }
                }
            }
        });
        let _ = self.inner.timer.set(handle.abort_handle());
    }

    /// Raises the signal. Has no effect if it is already raised.
    pub fn raise(&self) {
        self.raise_with(CancelReason::Explicit);
    }

    fn raise_with(&self, reason: CancelReason) {
        if self.inner.token.is_cancelled() {
            return;
        }
        let _ = self.inner.reason.set(reason);
        self.inner.token.cancel();
    }

    /// True once the signal (or any ancestor) has been raised.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Future that completes once the signal is raised.
    ///
    /// Use it as one branch of `tokio::select!` at every blocking point.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Why the signal was raised, or `None` while active.
    ///
    /// Signals raised through an ancestor report the ancestor's reason.
    pub fn reason(&self) -> Option<CancelReason> {
        if !self.is_raised() {
            return None;
        }
        if let Some(reason) = self.inner.reason.get() {
            return Some(*reason);
        }
        self.inner
            .parent
            .as_ref()
            .and_then(CancellationSignal::reason)
            .or(Some(CancelReason::Explicit))
    }

    /// Returns a plain child [`CancellationToken`] for code written against `tokio-util`.
    ///
    /// Cancelling the returned token does not raise this signal.
    pub fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("raised", &self.is_raised())
            .field("reason", &self.reason())
            .field("has_parent", &self.inner.parent.is_some())
            .finish()
    }
}
