//! Cooperative cancellation.
//!
//! - [`CancellationSignal`] one-shot broadcast flag with parent → child propagation
//!   and optional auto-raise on timeout;
//! - [`CancelReason`] why a signal was raised;
//! - [`raise_on_shutdown`] raises a signal when the process receives a termination signal.

mod cancel;
mod os;

pub use cancel::{CancelReason, CancellationSignal};
pub use os::{raise_on_shutdown, wait_for_shutdown_signal};
