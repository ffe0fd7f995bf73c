//! Multi-stage pipeline with bounded queues and per-stage worker pools.
//!
//! ## Contents
//! - [`Pipeline`] submission, drain, cancellation
//! - [`PipelineBuilder`] stage layout, sinks, gate, parent signal, subscribers
//! - [`WorkItem`] caller id + payload + submission sequence
//!
//! Internals: bounded stage queues (`queue`), stage workers (`worker`) and
//! the in-flight tracker used to report items lost to aborted workers.

mod builder;
mod inflight;
mod item;
mod orchestrator;
mod queue;
mod worker;

pub use builder::PipelineBuilder;
pub use item::WorkItem;
pub use orchestrator::Pipeline;
