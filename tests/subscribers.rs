mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use stagevisor::{
    CancellationSignal, Config, Event, EventKind, Pipeline, StageSpec, Subscribe, WorkItem,
};

use common::{double, wait_until};

#[derive(Default)]
struct Completions(AtomicUsize);

#[async_trait]
impl Subscribe for Completions {
    async fn on_event(&self, ev: &Event) {
        if ev.kind == EventKind::ItemCompleted {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn name(&self) -> &'static str {
        "completions"
    }
}

#[derive(Default)]
struct Kinds(std::sync::Mutex<Vec<EventKind>>);

#[async_trait]
impl Subscribe for Kinds {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().unwrap().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "kinds"
    }
}

struct Slow;

#[async_trait]
impl Subscribe for Slow {
    async fn on_event(&self, _ev: &Event) {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    fn name(&self) -> &'static str {
        "slow"
    }

    fn queue_capacity(&self) -> usize {
        1
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribers_observe_items_without_slowing_workers() {
    let completions = Arc::new(Completions::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![completions.clone(), Arc::new(Slow)];
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(double(), 2, 4))
        .with_subscribers(subs)
        .build()
        .unwrap();

    for x in 0..10 {
        pipeline.submit(WorkItem::new(x, x)).await.unwrap();
    }
    tokio::time::timeout(
        Duration::from_secs(1),
        pipeline.drain(&CancellationSignal::new()),
    )
    .await
    .expect("a slow subscriber must not hold up the pipeline")
    .unwrap();

    wait_until(|| completions.0.load(Ordering::SeqCst) == 10).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trailing_events_reach_subscribers_after_drop() {
    let kinds = Arc::new(Kinds::default());
    let pipeline = Pipeline::builder(Config::default())
        .stage(StageSpec::new(double(), 1, 2))
        .with_subscribers([kinds.clone() as Arc<dyn Subscribe>])
        .build()
        .unwrap();

    pipeline.submit(WorkItem::new(1, 1)).await.unwrap();
    pipeline.drain(&CancellationSignal::new()).await.unwrap();
    drop(pipeline);

    wait_until(|| {
        kinds
            .0
            .lock()
            .unwrap()
            .last()
            .is_some_and(|k| *k == EventKind::DrainCompleted)
    })
    .await;
    assert!(kinds.0.lock().unwrap().contains(&EventKind::ItemCompleted));
}
