//! Stage abstractions and per-stage configuration.
//!
//! ## Contents
//! - [`Stage`] the processing function of a pipeline step (async, cancelable)
//! - [`StageFn`] closure-backed [`Stage`] implementation
//! - [`StageRef`] shared handle (`Arc<dyn Stage<T>>`)
//! - [`StageSpec`] stage + worker count + queue capacity + retry/backoff

mod spec;
mod stage;
mod stage_fn;

pub use spec::StageSpec;
pub use stage::{Stage, StageRef};
pub use stage_fn::StageFn;
