//! # Function-backed stage (`StageFn`)
//!
//! [`StageFn`] wraps a closure `F: Fn(T, CancellationSignal) -> Fut` and builds a
//! fresh future per item, so workers of the same stage never share hidden state.
//! Shared state, if any, goes into an explicit `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use stagevisor::{CancellationSignal, StageError, StageFn, StageRef};
//!
//! let double: StageRef<u64> = StageFn::arc("double", |x: u64, _ctx: CancellationSignal| async move {
//!     Ok::<_, StageError>(x * 2)
//! });
//! assert_eq!(double.name(), "double");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StageError;
use crate::signal::CancellationSignal;
use crate::stages::stage::Stage;

/// Closure-backed stage implementation.
pub struct StageFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> StageFn<F> {
    /// Creates a new function-backed stage.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the stage and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> std::fmt::Debug for StageFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageFn").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<T, F, Fut> Stage<T> for StageFn<F>
where
    T: Send + 'static,
    F: Fn(T, CancellationSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, StageError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, input: T, ctx: CancellationSignal) -> Result<T, StageError> {
        (self.f)(input, ctx).await
    }
}
