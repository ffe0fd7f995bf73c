//! # Event bus for broadcasting pipeline events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from many sources (workers, submitters, drain).
//!
//! ```text
//! Publishers (many):                  Subscriber (one):
//!   submit()  ──┐
//!   worker 1  ──┼──────► Bus ───────► subscriber listener ────► SubscriberSet
//!   worker N  ──┤  (broadcast chan)     (in Pipeline)
//!   drain()   ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: a slow subscriber never applies backpressure to workers.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if nobody listens at send time.
//! - **Per-bus ordering**: `publish` stamps `seq` from a counter owned by the bus,
//!   so every pipeline numbers its events from 0.
//!
//! Events are observability only. Item outcomes travel through the sinks,
//! never through the bus, so a lagging subscriber cannot lose a result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for pipeline events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    seq: Arc<AtomicU64>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stamps the next sequence number and publishes to all active receivers;
    /// returns immediately.
    pub fn publish(&self, mut ev: Event) {
        ev.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver observing events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publishes the event built by `build`, skipping the build when nobody listens.
    #[inline]
    pub fn publish_with(&self, build: impl FnOnce() -> Event) {
        if self.has_receivers() {
            self.publish(build());
        }
    }

    /// True if at least one receiver exists.
    #[inline]
    pub fn has_receivers(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_get_events_published_after_subscribe() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::DrainStarted));
        assert!(!bus.has_receivers());

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ItemSubmitted).with_item(7));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ItemSubmitted);
        assert_eq!(ev.item, Some(7));
    }

    #[tokio::test]
    async fn publish_with_skips_building_without_receivers() {
        let bus = Bus::new(8);
        let mut built = false;
        bus.publish_with(|| {
            built = true;
            Event::new(EventKind::ItemCompleted)
        });
        assert!(!built);

        let mut rx = bus.subscribe();
        bus.publish_with(|| Event::new(EventKind::ItemCompleted).with_item(3));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.item, Some(3));
        assert_eq!(ev.seq, 0);
    }

    #[tokio::test]
    async fn sequence_is_per_bus() {
        let first = Bus::new(8);
        let mut rx = first.subscribe();
        first.publish(Event::new(EventKind::DrainStarted));
        first.clone().publish(Event::new(EventKind::DrainCompleted));
        assert_eq!(rx.recv().await.unwrap().seq, 0);
        assert_eq!(rx.recv().await.unwrap().seq, 1);

        let second = Bus::new(8);
        let mut rx = second.subscribe();
        second.publish(Event::new(EventKind::DrainStarted));
        assert_eq!(rx.recv().await.unwrap().seq, 0);
    }

    #[tokio::test]
    async fn slow_receiver_observes_lag() {
        let bus = Bus::new(2);
        let mut rx = bus.subscribe();
        for id in 0..5 {
            bus.publish(Event::new(EventKind::ItemCompleted).with_item(id));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }
}
