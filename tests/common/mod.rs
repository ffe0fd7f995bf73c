#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use stagevisor::{CancellationSignal, StageError, StageFn, StageRef};

/// Polls `cond` until it holds or one second passes.
pub async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached within 1s");
}

/// Stage that doubles its input.
pub fn double() -> StageRef<u64> {
    StageFn::arc("double", |x: u64, _ctx: CancellationSignal| async move {
        Ok::<_, StageError>(x * 2)
    })
}

/// Stage that holds every item until cancellation, then fails it.
pub fn hold_until_cancelled(name: &'static str) -> StageRef<u64> {
    StageFn::arc(name, |_x: u64, ctx: CancellationSignal| async move {
        ctx.cancelled().await;
        Err::<u64, _>(StageError::fail("interrupted"))
    })
}

/// Stage that ignores cancellation and sleeps far longer than any test.
pub fn ignore_cancellation(name: &'static str) -> StageRef<u64> {
    StageFn::arc(name, |x: u64, _ctx: CancellationSignal| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok::<_, StageError>(x)
    })
}

/// Runs `fut` with a wall-clock bound.
pub async fn within<F: Future>(bound: Duration, fut: F) -> F::Output {
    tokio::time::timeout(bound, fut)
        .await
        .expect("operation exceeded its time bound")
}
