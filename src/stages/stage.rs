//! # Stage abstraction.
//!
//! A [`Stage`] transforms one payload into the next. It receives a
//! [`CancellationSignal`] and may use it to stop early; the pipeline does not
//! abort a running stage, it only refuses to commit the result once cancellation
//! is raised.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StageError;
use crate::signal::CancellationSignal;

/// # Asynchronous, cancelable processing step.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use stagevisor::{CancellationSignal, Stage, StageError};
///
/// struct Validate;
///
/// #[async_trait]
/// impl Stage<String> for Validate {
///     fn name(&self) -> &str { "validate" }
///
///     async fn process(&self, input: String, _ctx: CancellationSignal) -> Result<String, StageError> {
///         if input.is_empty() {
///             return Err(StageError::fatal("empty record"));
///         }
///         Ok(input)
///     }
/// }
/// ```
#[async_trait]
pub trait Stage<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Returns a stable, human-readable stage name.
    fn name(&self) -> &str;

    /// Processes one payload.
    ///
    /// Must not hold pipeline resources; any lock it takes is its own.
    async fn process(&self, input: T, ctx: CancellationSignal) -> Result<T, StageError>;
}

/// Shared handle to a stage.
pub type StageRef<T> = Arc<dyn Stage<T>>;
