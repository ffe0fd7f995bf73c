//! # Example: pipeline
//!
//! A three-stage pipeline (parse → enrich → persist) behind an admission gate,
//! with per-stage worker pools, a flaky stage retried with backoff, and the
//! built-in [`LogWriter`] rendering events through `tracing`.
//!
//! ## Flow
//! ```text
//! submit(id, line) ─► gate(4) ─► parse (2 workers, cap 4)
//!                                  └─► enrich (3 workers, cap 2, retry ×2)
//!                                        └─► persist (1 worker, hand-off)
//!                                              └─► MemorySink
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example pipeline --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stagevisor::{
    AdmissionGate, BackoffPolicy, CancellationSignal, Config, JitterPolicy, LogWriter,
    MemorySink, Pipeline, RetryPolicy, StageError, StageFn, StageRef, StageSpec, Subscribe,
    WorkItem,
};
use tracing_subscriber::EnvFilter;

static ENRICH_CALLS: AtomicU64 = AtomicU64::new(0);

fn parse() -> StageRef<String> {
    StageFn::arc("parse", |line: String, _ctx: CancellationSignal| async move {
        let n: u64 = line
            .trim()
            .parse()
            .map_err(|e| StageError::fatal(format!("{line:?}: {e}")))?;
        Ok::<_, StageError>(n.to_string())
    })
}

fn enrich() -> StageRef<String> {
    StageFn::arc("enrich", |value: String, _ctx: CancellationSignal| async move {
        // Every third call fails once to show retries.
        if ENRICH_CALLS.fetch_add(1, Ordering::Relaxed) % 3 == 2 {
            return Err(StageError::fail("upstream blip"));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(format!("{value}:enriched"))
    })
}

fn persist() -> StageRef<String> {
    StageFn::arc("persist", |value: String, ctx: CancellationSignal| async move {
        tokio::select! {
            _ = ctx.cancelled() => Err(StageError::fail("interrupted")),
            _ = tokio::time::sleep(Duration::from_millis(5)) => Ok(value),
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config {
        grace: Duration::from_secs(2),
        ..Config::default()
    };
    let gate = AdmissionGate::new(4);
    let sink = Arc::new(MemorySink::new());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    let pipeline = Pipeline::builder(cfg)
        .stage(StageSpec::new(parse(), 2, 4))
        .stage(
            StageSpec::new(enrich(), 3, 2)
                .with_retry(RetryPolicy::Limited { max_retries: 2 })
                .with_backoff(BackoffPolicy {
                    first: Duration::from_millis(10),
                    max: Duration::from_millis(100),
                    factor: 2.0,
                    jitter: JitterPolicy::Equal,
                }),
        )
        .stage(StageSpec::new(persist(), 1, 0))
        .with_gate(gate.clone())
        .with_result_sink(sink.clone())
        .with_error_sink(sink.clone())
        .with_subscribers(subs)
        .build()?;

    let lines = ["1", "2", "three", "4", "5", "6", "7", "eight", "9", "10"];
    for (id, line) in lines.iter().enumerate() {
        pipeline
            .submit(WorkItem::new(id as u64, line.to_string()))
            .await?;
    }

    let deadline = CancellationSignal::with_timeout(Duration::from_secs(10));
    pipeline.drain(&deadline).await?;

    println!("results (by submission order):");
    for value in sink.payloads_by_seq() {
        println!("  {value}");
    }
    println!("failures:");
    for failure in sink.failures() {
        println!("  item {} → {}", failure.id, failure.error);
    }
    println!("gate peak: {}/{}", gate.peak_in_use(), gate.limit());

    // Give the LogWriter a moment to flush its queue.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
