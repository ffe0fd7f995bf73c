//! # Terminal destinations for items leaving the pipeline.
//!
//! Every submitted item ends in exactly one of two places:
//! - a [`ResultSink`] after the last stage succeeded, or
//! - an [`ErrorSink`] as an [`ItemFailure`] (processing failure or cancellation).
//!
//! Built-in implementations:
//! - [`MemorySink`] collects both into memory (tests, demos);
//! - `tokio::sync::mpsc::Sender` forwards into a channel with backpressure.

mod channel;
mod memory;
mod sink;

pub use memory::MemorySink;
pub(crate) use sink::DiscardSink;
pub use sink::{ErrorSink, ItemFailure, ResultSink};
