mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use stagevisor::{
    AdmissionGate, BackoffPolicy, CancellationSignal, Config, EventKind, ItemError, JitterPolicy,
    MemorySink, Pipeline, PipelineError, RetryPolicy, StageError, StageFn, StageSpec, WorkItem,
};

use common::{double, hold_until_cancelled, ignore_cancellation, wait_until, within};

fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        first: Duration::from_millis(1),
        max: Duration::from_millis(5),
        factor: 2.0,
        jitter: JitterPolicy::None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn doubles_every_item_under_gate_limit() {
    let gate = AdmissionGate::new(3);
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(double(), 2, 2))
        .with_result_sink(sink.clone())
        .with_error_sink(sink.clone())
        .with_gate(gate.clone())
        .build()
        .unwrap();

    for x in 1..=5 {
        pipeline.submit(WorkItem::new(x, x)).await.unwrap();
    }
    within(Duration::from_secs(2), pipeline.drain(&CancellationSignal::new()))
        .await
        .unwrap();

    let got: HashSet<u64> = sink.payloads().into_iter().collect();
    assert_eq!(got, HashSet::from([2, 4, 6, 8, 10]));
    assert_eq!(sink.failure_count(), 0);
    assert!(gate.peak_in_use() <= 3);
    assert_eq!(gate.in_use(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_queue_blocks_submit() {
    // One worker holding item 1, plus C = 2 queued items: the fourth submit must wait.
    const CAPACITY: usize = 2;
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(hold_until_cancelled("hold"), 1, CAPACITY))
        .with_result_sink(sink.clone())
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();
    wait_until(|| pipeline.in_flight() == 1).await;
    for id in 2..=(CAPACITY as u64 + 1) {
        within(Duration::from_millis(200), pipeline.submit(WorkItem::new(id, id)))
            .await
            .unwrap();
    }

    let blocked = tokio::time::timeout(
        Duration::from_millis(100),
        pipeline.submit(WorkItem::new(99, 99)),
    )
    .await;
    assert!(blocked.is_err(), "submit past capacity must wait");
    assert_eq!(
        pipeline.try_submit(WorkItem::new(100, 100)),
        Err(PipelineError::Full)
    );

    pipeline.cancel();
    let res = within(Duration::from_secs(1), pipeline.drain(&CancellationSignal::new())).await;
    assert_eq!(res, Err(PipelineError::Cancelled));

    assert_eq!(sink.result_count(), 0);
    let mut ids: Vec<u64> = sink.failures().iter().map(|f| f.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(sink.failures().iter().all(|f| f.error.is_cancelled()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backpressure_reaches_submit_across_stages() {
    // hold worker + hold queue (1) + double worker stuck pushing + double queue (1) = 4 items.
    let sink = Arc::new(MemorySink::<u64>::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(double(), 1, 1))
        .stage(StageSpec::new(hold_until_cancelled("hold"), 1, 1))
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    for id in 1..=4 {
        within(Duration::from_millis(200), pipeline.submit(WorkItem::new(id, id)))
            .await
            .unwrap();
    }
    wait_until(|| pipeline.in_flight() == 2).await;

    let blocked = tokio::time::timeout(
        Duration::from_millis(100),
        pipeline.submit(WorkItem::new(5, 5)),
    )
    .await;
    assert!(blocked.is_err(), "a full downstream stage must stall submit");

    pipeline.cancel();
    let res = within(Duration::from_secs(1), pipeline.drain(&CancellationSignal::new())).await;
    assert_eq!(res, Err(PipelineError::Cancelled));

    let failures = sink.failures();
    let mut ids: Vec<u64> = failures.iter().map(|f| f.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(failures.iter().all(|f| f.error.is_cancelled()));
    let at = |stage: &str| failures.iter().filter(|f| f.error.stage() == stage).count();
    assert_eq!(at("double"), 2);
    assert_eq!(at("hold"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hand_off_queue_waits_for_a_taker() {
    let sink = Arc::new(MemorySink::<u64>::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(hold_until_cancelled("hold"), 1, 0))
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();
    wait_until(|| pipeline.in_flight() == 1).await;

    let blocked = tokio::time::timeout(
        Duration::from_millis(50),
        pipeline.submit(WorkItem::new(2, 2)),
    )
    .await;
    assert!(blocked.is_err());

    pipeline.cancel();
    assert_eq!(
        pipeline.drain(&CancellationSignal::new()).await,
        Err(PipelineError::Cancelled)
    );
    assert_eq!(sink.failure_counts(), HashMap::from([(1, 1)]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_releases_every_blocked_caller() {
    let parent = CancellationSignal::new();
    let gate = AdmissionGate::new(2);
    let sink = Arc::new(MemorySink::<u64>::new());
    let pipeline = Arc::new(
        Pipeline::builder(Config::default())
            .stage(StageSpec::new(hold_until_cancelled("hold"), 1, 1))
            .with_gate(gate.clone())
            .with_signal(parent.clone())
            .with_error_sink(sink.clone())
            .build()
            .unwrap(),
    );

    pipeline.submit(WorkItem::new(0, 0)).await.unwrap();
    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();

    let mut waiters = Vec::new();
    for id in 2..8 {
        let pipeline = Arc::clone(&pipeline);
        waiters.push(tokio::spawn(async move {
            pipeline.submit(WorkItem::new(id, id)).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    parent.raise();
    for w in waiters {
        let res = within(Duration::from_millis(500), w).await.unwrap();
        assert_eq!(res, Err(PipelineError::Cancelled));
    }
    let res = within(Duration::from_millis(500), pipeline.drain(&CancellationSignal::new())).await;
    assert_eq!(res, Err(PipelineError::Cancelled));

    assert_eq!(sink.failure_count(), 2);
    assert_eq!(gate.in_use(), 0);
    assert!(pipeline.signal().is_raised());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drain_signal_cancels_held_and_queued_items() {
    let sink = Arc::new(MemorySink::<u64>::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(hold_until_cancelled("hold"), 1, 4))
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    for id in 0..3 {
        pipeline.submit(WorkItem::new(id, id)).await.unwrap();
    }
    let deadline = CancellationSignal::with_timeout(Duration::from_millis(30));
    let res = within(Duration::from_secs(1), pipeline.drain(&deadline)).await;
    assert_eq!(res, Err(PipelineError::Cancelled));

    let failures = sink.failures();
    assert_eq!(failures.len(), 3);
    for f in &failures {
        assert_eq!(
            f.error,
            ItemError::Cancelled {
                stage: "hold".into()
            }
        );
    }
    assert_eq!(
        pipeline.submit(WorkItem::new(9, 9)).await,
        Err(PipelineError::Closed)
    );
}

#[tokio::test]
async fn single_worker_preserves_fifo() {
    let stage = StageFn::arc("yield", |x: u64, _ctx: CancellationSignal| async move {
        tokio::task::yield_now().await;
        Ok::<_, StageError>(x)
    });
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(stage, 1, 4))
        .stage(StageSpec::new(double(), 1, 0))
        .with_result_sink(sink.clone())
        .build()
        .unwrap();

    for x in 0..20 {
        pipeline.submit(WorkItem::new(x, x)).await.unwrap();
    }
    pipeline.drain(&CancellationSignal::new()).await.unwrap();

    let expected: Vec<u64> = (0..20).map(|x| x * 2).collect();
    assert_eq!(sink.payloads(), expected);
    let seqs: Vec<u64> = sink.results().iter().map(WorkItem::seq).collect();
    assert_eq!(seqs, (0..20).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_item_is_reported_once_and_others_complete() {
    let check = StageFn::arc("check", |x: u64, _ctx: CancellationSignal| async move {
        if x == 5 {
            Err(StageError::fatal("five is not allowed"))
        } else {
            Ok(x)
        }
    });
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(check, 3, 2))
        .stage(StageSpec::new(double(), 2, 2))
        .with_result_sink(sink.clone())
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    for x in 1..=10 {
        pipeline.submit(WorkItem::new(x, x)).await.unwrap();
    }
    pipeline.drain(&CancellationSignal::new()).await.unwrap();

    assert_eq!(sink.result_count(), 9);
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id, 5);
    assert_eq!(
        failures[0].error,
        ItemError::ProcessingFailed {
            stage: "check".into(),
            error: StageError::fatal("five is not allowed"),
        }
    );
}

#[tokio::test]
async fn panicking_stage_becomes_processing_failure() {
    let boom = StageFn::arc("boom", |x: u64, _ctx: CancellationSignal| async move {
        if x == 2 {
            panic!("stage exploded");
        }
        Ok::<_, StageError>(x)
    });
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(boom, 1, 4))
        .with_result_sink(sink.clone())
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    for x in 1..=3 {
        pipeline.submit(WorkItem::new(x, x)).await.unwrap();
    }
    pipeline.drain(&CancellationSignal::new()).await.unwrap();

    assert_eq!(sink.payloads(), vec![1, 3]);
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    match &failures[0].error {
        ItemError::ProcessingFailed { stage, error } => {
            assert_eq!(stage, "boom");
            assert!(!error.is_retryable());
            assert!(error.as_message().contains("stage exploded"));
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

#[tokio::test]
async fn retries_until_success() {
    let attempts = Arc::new(AtomicU32::new(0));
    let flaky = {
        let attempts = Arc::clone(&attempts);
        StageFn::arc("flaky", move |x: u64, _ctx: CancellationSignal| {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(StageError::fail(format!("attempt {n}")))
                } else {
                    Ok(x + 100)
                }
            }
        })
    };
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::builder(Config::default())
        .stage(
            StageSpec::new(flaky, 1, 1)
                .with_retry(RetryPolicy::Limited { max_retries: 2 })
                .with_backoff(fast_backoff()),
        )
        .with_result_sink(sink.clone())
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    let mut events = pipeline.events();
    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();
    pipeline.drain(&CancellationSignal::new()).await.unwrap();

    assert_eq!(sink.payloads(), vec![101]);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let mut retrying = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::ItemRetrying {
            retrying += 1;
        }
    }
    assert_eq!(retrying, 2);
}

#[tokio::test]
async fn exhausted_retries_report_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let always_fails = {
        let calls = Arc::clone(&calls);
        StageFn::arc("always-fails", move |_x: u64, _ctx: CancellationSignal| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<u64, _>(StageError::fail("nope")) }
        })
    };
    let sink = Arc::new(MemorySink::<u64>::new());
    let cfg = Config {
        retry: RetryPolicy::Limited { max_retries: 1 },
        backoff: fast_backoff(),
        default_capacity: 4,
        ..Config::default()
    };
    let pipeline = Pipeline::builder(cfg.clone())
        .stage(StageSpec::with_defaults(always_fails, &cfg))
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    for id in 0..3 {
        pipeline.submit(WorkItem::new(id, id)).await.unwrap();
    }
    pipeline.drain(&CancellationSignal::new()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(
        sink.failure_counts(),
        HashMap::from([(0, 1), (1, 1), (2, 1)])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stuck_workers_are_aborted_after_grace() {
    let gate = AdmissionGate::new(4);
    let sink = Arc::new(MemorySink::<u64>::new());
    let cfg = Config {
        grace: Duration::from_millis(50),
        ..Config::default()
    };
    let pipeline = Pipeline::builder(cfg)
        .stage(StageSpec::new(double(), 1, 1))
        .stage(StageSpec::new(ignore_cancellation("stuck"), 1, 1))
        .with_gate(gate.clone())
        .with_error_sink(sink.clone())
        .build()
        .unwrap();

    pipeline.submit(WorkItem::new(7, 7)).await.unwrap();
    wait_until(|| pipeline.in_flight_at("stuck") == vec![7]).await;

    let res = within(Duration::from_secs(1), async {
        pipeline.cancel();
        pipeline.drain(&CancellationSignal::new()).await
    })
    .await;

    assert_eq!(
        res,
        Err(PipelineError::GraceExceeded {
            grace: Duration::from_millis(50),
            stuck: vec!["stuck".to_string()],
        })
    );
    assert_eq!(sink.failure_counts(), HashMap::from([(7, 1)]));
    assert_eq!(gate.in_use(), 0);
    assert_eq!(pipeline.in_flight(), 0);
}

#[tokio::test]
async fn busy_gate_rejects_after_acquire_timeout() {
    let cfg = Config {
        acquire_timeout: Duration::from_millis(20),
        ..Config::default()
    };
    let pipeline = Pipeline::builder(cfg)
        .stage(StageSpec::new(hold_until_cancelled("hold"), 1, 4))
        .with_gate(AdmissionGate::new(1))
        .build()
        .unwrap();

    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();
    match pipeline.submit(WorkItem::new(2, 2)).await {
        Err(PipelineError::Busy { waited }) => assert!(waited >= Duration::from_millis(15)),
        other => panic!("expected busy, got {other:?}"),
    }
    assert!(!pipeline.signal().is_raised(), "busy fails only the caller by default");
    assert_eq!(
        pipeline.try_submit(WorkItem::new(3, 3)),
        Err(PipelineError::Full)
    );

    pipeline.cancel();
    assert_eq!(
        pipeline.drain(&CancellationSignal::new()).await,
        Err(PipelineError::Cancelled)
    );
}

#[tokio::test]
async fn busy_gate_cancels_pipeline_when_configured() {
    let cfg = Config {
        acquire_timeout: Duration::from_millis(20),
        cancel_on_busy: true,
        ..Config::default()
    };
    let sink = Arc::new(MemorySink::<u64>::new());
    let pipeline = Pipeline::builder(cfg)
        .stage(StageSpec::new(hold_until_cancelled("hold"), 1, 4))
        .with_gate(AdmissionGate::new(1))
        .with_error_sink(sink.clone())
        .build()
        .unwrap();
    let mut events = pipeline.events();

    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();
    assert!(matches!(
        pipeline.submit(WorkItem::new(2, 2)).await,
        Err(PipelineError::Busy { .. })
    ));
    assert!(pipeline.signal().is_raised());
    assert_eq!(
        pipeline.submit(WorkItem::new(3, 3)).await,
        Err(PipelineError::Cancelled)
    );

    assert_eq!(
        within(Duration::from_secs(1), pipeline.drain(&CancellationSignal::new())).await,
        Err(PipelineError::Cancelled)
    );
    assert_eq!(sink.failure_counts(), HashMap::from([(1, 1)]));

    let mut reasons = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::CancelRequested {
            reasons.push(ev.reason.as_deref().map(str::to_owned));
        }
    }
    assert_eq!(reasons, vec![Some("gate_busy".to_owned())]);
}

#[tokio::test]
async fn second_drain_is_a_no_op() {
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(double(), 1, 1))
        .build()
        .unwrap();
    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();

    assert_eq!(pipeline.drain(&CancellationSignal::new()).await, Ok(()));
    assert!(pipeline.is_closed());
    assert_eq!(pipeline.drain(&CancellationSignal::new()).await, Ok(()));
    assert_eq!(
        pipeline.try_submit(WorkItem::new(2, 2)),
        Err(PipelineError::Closed)
    );
}

#[tokio::test]
async fn builder_rejects_invalid_layouts() {
    let empty = Pipeline::<u64>::builder(Config::default()).build();
    assert!(matches!(empty, Err(PipelineError::InvalidConfig { .. })));

    let idle = Pipeline::builder(Config::default())
        .stage(StageSpec::new(double(), 0, 1))
        .build();
    match idle {
        Err(PipelineError::InvalidConfig { reason }) => assert!(reason.contains("double")),
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(double(), 2, 1))
        .build()
        .unwrap();
    let mut events = pipeline.events();

    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();
    pipeline.drain(&CancellationSignal::new()).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        kinds.push(ev.kind);
    }
    for kind in [
        EventKind::ItemSubmitted,
        EventKind::ItemProcessed,
        EventKind::ItemCompleted,
        EventKind::WorkerStopped,
        EventKind::DrainStarted,
        EventKind::DrainCompleted,
    ] {
        assert!(kinds.contains(&kind), "missing {kind:?} in {kinds:?}");
    }
    assert_eq!(
        kinds.iter().filter(|k| **k == EventKind::WorkerStopped).count(),
        2
    );
    assert_eq!(kinds.last(), Some(&EventKind::DrainCompleted));
}

#[tokio::test]
async fn every_pipeline_numbers_its_events_from_zero() {
    for _ in 0..2 {
        let pipeline = Pipeline::builder(Config::default())
            .stage(StageSpec::new(double(), 1, 2))
            .build()
            .unwrap();
        let mut events = pipeline.events();

        for x in 0..3 {
            pipeline.submit(WorkItem::new(x, x)).await.unwrap();
        }
        pipeline.drain(&CancellationSignal::new()).await.unwrap();

        let mut seqs = Vec::new();
        while let Ok(ev) = events.try_recv() {
            seqs.push(ev.seq);
        }
        seqs.sort_unstable();
        let expected: Vec<u64> = (0..seqs.len() as u64).collect();
        assert!(!seqs.is_empty());
        assert_eq!(seqs, expected);
    }
}
