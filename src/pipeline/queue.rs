//! # Bounded stage queue.
//!
//! A stage queue is a `tokio::sync::mpsc` channel whose receiver is shared by
//! the stage's worker pool behind an async mutex. The mutex is held only while
//! a worker waits to take, never while it processes.
//!
//! ```text
//!   producers (submit / stage K workers)           stage K+1 workers
//!   QueueTx::push ──reserve()──► [ mpsc, cap C ] ──► QueueRx::take (one at a time)
//! ```
//!
//! ## Rules
//! - Push on a full queue waits; the wait races the cancellation signal.
//! - A cancelled push hands the envelope back so it can be reported.
//! - `capacity = 0` is a synchronous hand-off: a push needs a taker that is
//!   already waiting (a `ready` semaphore counts waiting takers).
//! - The queue is closed when every `QueueTx` is dropped; takers then drain
//!   what is left and get `None`.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, TryAcquireError, mpsc};

use super::item::Envelope;
use crate::signal::CancellationSignal;

/// Why a push did not enqueue; carries the envelope back.
pub(crate) enum PushError<T> {
    Cancelled(Envelope<T>),
    Closed(Envelope<T>),
}

/// Why a non-blocking push did not enqueue.
pub(crate) enum TryPushError<T> {
    Full(Envelope<T>),
    Closed(Envelope<T>),
}

/// Producer half. Cloned into each upstream worker.
pub(crate) struct QueueTx<T> {
    tx: mpsc::Sender<Envelope<T>>,
    ready: Option<Arc<Semaphore>>,
}

impl<T> Clone for QueueTx<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            ready: self.ready.clone(),
        }
    }
}

/// Consumer half. Cloned into each worker of the owning stage.
pub(crate) struct QueueRx<T> {
    rx: Arc<Mutex<mpsc::Receiver<Envelope<T>>>>,
    ready: Option<Arc<Semaphore>>,
}

impl<T> Clone for QueueRx<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            ready: self.ready.clone(),
        }
    }
}

/// Creates a queue holding at most `capacity` items (`0` = hand-off).
pub(crate) fn stage_queue<T>(capacity: usize) -> (QueueTx<T>, QueueRx<T>) {
    let (ready, buffer) = match capacity {
        0 => (Some(Arc::new(Semaphore::new(0))), 1),
        n => (None, n),
    };
    let (tx, rx) = mpsc::channel(buffer);
    (
        QueueTx {
            tx,
            ready: ready.clone(),
        },
        QueueRx {
            rx: Arc::new(Mutex::new(rx)),
            ready,
        },
    )
}

impl<T> QueueTx<T> {
    /// Enqueues `env`, waiting for room unless `signal` is raised first.
    pub(crate) async fn push(
        &self,
        env: Envelope<T>,
        signal: &CancellationSignal,
    ) -> Result<(), PushError<T>> {
        if signal.is_raised() {
            return Err(PushError::Cancelled(env));
        }

        if let Some(ready) = &self.ready {
            let taker = tokio::select! {
                biased;
                _ = signal.cancelled() => return Err(PushError::Cancelled(env)),
                res = ready.acquire() => res,
            };
            match taker {
                Ok(permit) => permit.forget(),
                Err(_closed) => return Err(PushError::Closed(env)),
            }
        }

        let slot = tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(PushError::Cancelled(env)),
            res = self.tx.reserve() => res,
        };
        match slot {
            Ok(permit) => {
                permit.send(env);
                Ok(())
            }
            Err(_closed) => Err(PushError::Closed(env)),
        }
    }

    /// Enqueues `env` only if there is room right now.
    pub(crate) fn try_push(&self, env: Envelope<T>) -> Result<(), TryPushError<T>> {
        if let Some(ready) = &self.ready {
            match ready.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(TryAcquireError::NoPermits) => return Err(TryPushError::Full(env)),
                Err(TryAcquireError::Closed) => return Err(TryPushError::Closed(env)),
            }
        }
        match self.tx.try_send(env) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(env)) => {
                if let Some(ready) = &self.ready {
                    ready.add_permits(1);
                }
                Err(TryPushError::Full(env))
            }
            Err(mpsc::error::TrySendError::Closed(env)) => Err(TryPushError::Closed(env)),
        }
    }
}

impl<T> QueueRx<T> {
    /// Takes the next envelope in FIFO order.
    ///
    /// Returns `None` when the queue is closed and empty, or when `signal` is raised.
    pub(crate) async fn take(&self, signal: &CancellationSignal) -> Option<Envelope<T>> {
        let mut rx = tokio::select! {
            biased;
            _ = signal.cancelled() => return None,
            guard = self.rx.lock() => guard,
        };
        if let Some(ready) = &self.ready {
            ready.add_permits(1);
        }
        tokio::select! {
            biased;
            _ = signal.cancelled() => None,
            env = rx.recv() => env,
        }
    }

    /// Removes everything still buffered without waiting for producers.
    pub(crate) async fn take_remaining(&self) -> Vec<Envelope<T>> {
        let mut rx = self.rx.lock().await;
        let mut left = Vec::new();
        while let Ok(env) = rx.try_recv() {
            left.push(env);
        }
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::WorkItem;
    use std::time::Duration;

    fn env(id: u64) -> Envelope<u64> {
        Envelope::new(WorkItem::new(id, id), None)
    }

    fn id_of(res: Result<(), PushError<u64>>) -> Option<u64> {
        match res {
            Ok(()) => None,
            Err(PushError::Cancelled(e)) | Err(PushError::Closed(e)) => Some(e.item.id),
        }
    }

    #[tokio::test]
    async fn fifo_and_close() {
        let (tx, rx) = stage_queue::<u64>(4);
        let signal = CancellationSignal::new();
        for id in 0..3 {
            assert!(tx.push(env(id), &signal).await.is_ok());
        }
        drop(tx);
        let mut seen = Vec::new();
        while let Some(e) = rx.take(&signal).await {
            seen.push(e.item.id);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn full_queue_push_returns_envelope_on_cancel() {
        let (tx, _rx) = stage_queue::<u64>(1);
        let signal = CancellationSignal::new();
        assert!(tx.push(env(1), &signal).await.is_ok());
        assert!(matches!(tx.try_push(env(2)), Err(TryPushError::Full(_))));

        let blocked = {
            let tx = tx.clone();
            let signal = signal.clone();
            tokio::spawn(async move { id_of(tx.push(env(2), &signal).await) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!blocked.is_finished());

        signal.raise();
        let returned = tokio::time::timeout(Duration::from_millis(200), blocked)
            .await
            .expect("push must observe cancellation")
            .unwrap();
        assert_eq!(returned, Some(2));
    }

    #[tokio::test]
    async fn zero_capacity_waits_for_a_taker() {
        let (tx, rx) = stage_queue::<u64>(0);
        let signal = CancellationSignal::new();
        assert!(matches!(tx.try_push(env(1)), Err(TryPushError::Full(_))));

        let pusher = {
            let tx = tx.clone();
            let signal = signal.clone();
            tokio::spawn(async move { id_of(tx.push(env(7), &signal).await) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!pusher.is_finished(), "no taker yet, push must wait");

        let got = rx.take(&signal).await.unwrap();
        assert_eq!(got.item.id, 7);
        assert_eq!(pusher.await.unwrap(), None);
    }

    #[tokio::test]
    async fn take_remaining_sweeps_buffer() {
        let (tx, rx) = stage_queue::<u64>(3);
        let signal = CancellationSignal::new();
        for id in 0..3 {
            assert!(tx.try_push(env(id)).is_ok());
        }
        signal.raise();
        assert!(rx.take(&signal).await.is_none());
        let left: Vec<u64> = rx.take_remaining().await.iter().map(|e| e.item.id).collect();
        assert_eq!(left, vec![0, 1, 2]);
    }
}
