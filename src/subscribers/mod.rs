//! # Event subscribers.
//!
//! ```text
//!   workers ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//!                                                          ┌──────────┼──────────┐
//!                                                          ▼          ▼          ▼
//!                                                      LogWriter   Metrics    Custom
//! ```
//!
//! - [`Subscribe`] the extension trait;
//! - [`SubscriberSet`] per-subscriber bounded queues and workers;
//! - `LogWriter` (feature `logging`) renders events through `tracing`.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
