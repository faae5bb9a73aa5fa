//! Lossy fan-out of activity events to live subscribers.
//!
//! Each subscriber owns a bounded event channel and a done signal. Delivery
//! is strictly non-blocking: a subscriber whose buffer is full misses the
//! event and the broadcast moves on. Slow consumers therefore see gaps, never
//! backpressure.

use crate::domain::event::ActivityEvent;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// A live consumer of activity events.
///
/// Returned by [`EventBroadcaster::subscribe`]; hand it back to
/// [`EventBroadcaster::unsubscribe`] when the consumer goes away. Taking the
/// subscriber by value there makes double-unsubscribe unrepresentable.
#[derive(Debug)]
pub struct Subscriber {
    id: u64,
    events: mpsc::Receiver<Arc<ActivityEvent>>,
    done: watch::Receiver<bool>,
}

impl Subscriber {
    /// Identity of this subscription within its broadcaster.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once unsubscribed and the
    /// buffer is drained.
    pub async fn recv(&mut self) -> Option<Arc<ActivityEvent>> {
        self.events.recv().await
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Result<Arc<ActivityEvent>, mpsc::error::TryRecvError> {
        self.events.try_recv()
    }

    /// A watch on the done signal, usable in a `select!` alongside `recv`.
    /// Fires when the subscription is removed from the broadcaster.
    pub fn done_signal(&self) -> watch::Receiver<bool> {
        self.done.clone()
    }
}

/// Sender half of one subscription, kept by the broadcaster.
#[derive(Debug)]
struct SubscriberHandle {
    events: mpsc::Sender<Arc<ActivityEvent>>,
    done: watch::Sender<bool>,
}

/// Fan-out hub over a set of live subscribers.
#[derive(Debug)]
pub struct EventBroadcaster {
    subscribers: RwLock<HashMap<u64, SubscriberHandle>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl EventBroadcaster {
    /// Create a broadcaster whose subscribers buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        assert!(buffer > 0, "subscriber buffer must be non-zero");
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            buffer,
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscriber {
        let (events_tx, events_rx) = mpsc::channel(self.buffer);
        let (done_tx, done_rx) = watch::channel(false);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers.write().insert(
            id,
            SubscriberHandle {
                events: events_tx,
                done: done_tx,
            },
        );

        Subscriber {
            id,
            events: events_rx,
            done: done_rx,
        }
    }

    /// Remove a subscriber, firing its done signal and closing its channels.
    pub fn unsubscribe(&self, subscriber: Subscriber) {
        let handle = self.subscribers.write().remove(&subscriber.id);
        if let Some(handle) = handle {
            let _ = handle.done.send(true);
        }
    }

    /// Deliver an event to every current subscriber without blocking.
    ///
    /// The subscriber set is snapshotted under the lock and delivery happens
    /// after release, so a slow send can never hold the set.
    pub fn broadcast(&self, event: &Arc<ActivityEvent>) {
        let senders: Vec<mpsc::Sender<Arc<ActivityEvent>>> = {
            let subscribers = self.subscribers.read();
            subscribers.values().map(|h| h.events.clone()).collect()
        };

        for sender in senders {
            // Full buffer: drop for this subscriber, keep going.
            let _ = sender.try_send(Arc::clone(event));
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;

    fn event(id: &str) -> Arc<ActivityEvent> {
        Arc::new(ActivityEvent::new(
            id.to_string(),
            EventKind::StoreFailed,
        ))
    }

    #[tokio::test]
    async fn subscriber_receives_in_broadcast_order() {
        let broadcaster = EventBroadcaster::new(10);
        let mut subscriber = broadcaster.subscribe();

        broadcaster.broadcast(&event("a"));
        broadcaster.broadcast(&event("b"));
        broadcaster.broadcast(&event("c"));

        assert_eq!(subscriber.recv().await.unwrap().id, "a");
        assert_eq!(subscriber.recv().await.unwrap().id, "b");
        assert_eq!(subscriber.recv().await.unwrap().id, "c");
    }

    #[tokio::test]
    async fn full_buffer_drops_without_blocking() {
        let broadcaster = EventBroadcaster::new(1);
        let mut subscriber = broadcaster.subscribe();

        let start = std::time::Instant::now();
        for i in 0..100 {
            broadcaster.broadcast(&event(&format!("event-{i}")));
        }
        assert!(
            start.elapsed() < std::time::Duration::from_millis(100),
            "broadcast must not block on a full subscriber"
        );

        // Exactly the first event fit in the buffer.
        assert_eq!(subscriber.try_recv().unwrap().id, "event-0");
        assert!(subscriber.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_fires_done_and_closes_events() {
        let broadcaster = EventBroadcaster::new(4);
        let subscriber = broadcaster.subscribe();
        let mut done = subscriber.done_signal();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.unsubscribe(subscriber);

        assert_eq!(broadcaster.subscriber_count(), 0);
        done.changed().await.unwrap();
        assert!(*done.borrow());
    }

    #[tokio::test]
    async fn each_subscription_is_fresh() {
        let broadcaster = EventBroadcaster::new(4);
        let first = broadcaster.subscribe();
        let second = broadcaster.subscribe();
        assert_ne!(first.id(), second.id());
        assert_eq!(broadcaster.subscriber_count(), 2);

        broadcaster.unsubscribe(first);
        let third = broadcaster.subscribe();
        assert_ne!(second.id(), third.id());
    }

    #[tokio::test]
    async fn unsubscribed_peer_does_not_affect_others() {
        let broadcaster = EventBroadcaster::new(4);
        let gone = broadcaster.subscribe();
        let mut kept = broadcaster.subscribe();

        broadcaster.unsubscribe(gone);
        broadcaster.broadcast(&event("after"));

        assert_eq!(kept.recv().await.unwrap().id, "after");
    }
}
