//! # Example: shutdown
//!
//! Runs an endless feed through a two-stage pipeline until Ctrl-C (or
//! SIGTERM), then drains with a grace period and prints what was cancelled.
//!
//! ## Flow
//! ```text
//! root signal ◄── raise_on_shutdown (SIGINT/SIGTERM/SIGQUIT)
//!    └─► pipeline signal (child)
//!          ├─► producer: submit() returns Cancelled → stop
//!          └─► drain(root): held + queued items → ErrorSink as Cancelled
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example shutdown
//! # press Ctrl-C after a few seconds
//! ```

use std::sync::Arc;
use std::time::Duration;

use stagevisor::{
    CancellationSignal, Config, MemorySink, Pipeline, PipelineError, StageError, StageFn,
    StageSpec, WorkItem, raise_on_shutdown,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let root = CancellationSignal::new();
    let _listener = raise_on_shutdown(&root);

    let square = StageFn::arc("square", |x: u64, _ctx: CancellationSignal| async move {
        Ok::<_, StageError>(x * x)
    });
    let slow_store = StageFn::arc("store", |x: u64, ctx: CancellationSignal| async move {
        tokio::select! {
            _ = ctx.cancelled() => Err(StageError::fail("interrupted")),
            _ = tokio::time::sleep(Duration::from_millis(300)) => Ok(x),
        }
    });

    let sink = Arc::new(MemorySink::new());
    let cfg = Config {
        grace: Duration::from_secs(1),
        ..Config::default()
    };
    let pipeline = Arc::new(
        Pipeline::builder(cfg)
            .stage(StageSpec::new(square, 2, 8))
            .stage(StageSpec::new(slow_store, 2, 4))
            .with_signal(root.clone())
            .with_result_sink(sink.clone())
            .with_error_sink(sink.clone())
            .build()?,
    );

    let producer = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let mut id = 0;
            loop {
                match pipeline.submit(WorkItem::new(id, id)).await {
                    Ok(()) => id += 1,
                    Err(PipelineError::Cancelled | PipelineError::Closed) => break id,
                    Err(err) => eprintln!("submit {id} rejected: {err}"),
                }
            }
        })
    };

    println!("running; press Ctrl-C to stop");
    let submitted = producer.await?;
    match pipeline.drain(&root).await {
        Ok(()) => println!("drained cleanly"),
        Err(err) => println!("drain ended with: {err}"),
    }

    println!(
        "submitted {submitted}, stored {}, cancelled {}",
        sink.result_count(),
        sink.failures().iter().filter(|f| f.error.is_cancelled()).count()
    );
    Ok(())
}
