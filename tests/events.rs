//! Event pipeline integration: ring history, live fan-out, and the
//! replay-then-stream pattern a push endpoint uses.

use rategate::{
    CircuitState, EmitterConfig, EventEmitter, EventKind, RequestInfo,
};
use std::time::Duration;

fn rejected_request(path: &str) -> RequestInfo {
    RequestInfo::new("GET", path, "198.51.100.7:4242")
}

fn emitter(ring_capacity: usize, subscriber_buffer: usize) -> EventEmitter {
    EventEmitter::new(EmitterConfig::new(ring_capacity, subscriber_buffer).unwrap()).unwrap()
}

#[test]
fn ring_retains_only_the_newest_events() {
    let emitter = emitter(5, 10);

    for i in 0..10 {
        emitter.emit_rate_limit_rejected(&rejected_request(&format!("/p/{i}")));
    }

    let events = emitter.recent(10);
    assert_eq!(events.len(), 5);
    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["rl-5", "rl-6", "rl-7", "rl-8", "rl-9"]);

    // Timestamps are non-decreasing oldest-first.
    for pair in events.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn every_emission_is_replayable_until_evicted() {
    let emitter = emitter(3, 10);

    emitter.emit_breaker_transition(CircuitState::Closed, CircuitState::Open, 5);
    assert_eq!(emitter.recent(3).len(), 1);

    emitter.emit_rate_limit_rejected(&rejected_request("/a"));
    emitter.emit_rate_limit_rejected(&rejected_request("/b"));
    assert_eq!(emitter.recent(3).len(), 3);

    // A fourth event evicts the oldest in FIFO order.
    emitter.emit_rate_limit_rejected(&rejected_request("/c"));
    let events = emitter.recent(3);
    assert_eq!(events.len(), 3);
    assert!(events
        .iter()
        .all(|e| e.kind == EventKind::RateLimitRejected));
}

#[tokio::test]
async fn replay_then_stream_sees_everything_once() {
    let emitter = emitter(100, 10);

    // History before the subscriber arrives.
    emitter.emit_rate_limit_rejected(&rejected_request("/old"));

    let mut subscriber = emitter.subscribe();
    let replayed = emitter.recent(100);
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].path.as_deref(), Some("/old"));

    // Live traffic after.
    emitter.emit_rate_limit_rejected(&rejected_request("/new"));
    let live = subscriber.recv().await.unwrap();
    assert_eq!(live.path.as_deref(), Some("/new"));

    emitter.unsubscribe(subscriber);
}

#[tokio::test]
async fn slow_subscriber_loses_events_not_liveness() {
    let emitter = emitter(100, 1);
    let mut subscriber = emitter.subscribe();

    let start = std::time::Instant::now();
    for i in 0..100 {
        emitter.emit_rate_limit_rejected(&rejected_request(&format!("/{i}")));
    }
    assert!(start.elapsed() < Duration::from_millis(100));

    // The buffer held exactly one event; the ring held them all.
    assert!(subscriber.try_recv().is_ok());
    assert!(subscriber.try_recv().is_err());
    assert_eq!(emitter.recent(200).len(), 100);

    emitter.unsubscribe(subscriber);
}

#[tokio::test]
async fn done_signal_fires_on_unsubscribe() {
    let emitter = EventEmitter::default();
    let subscriber = emitter.subscribe();
    let mut done = subscriber.done_signal();
    assert_eq!(emitter.subscriber_count(), 1);

    emitter.unsubscribe(subscriber);
    done.changed().await.unwrap();
    assert!(*done.borrow());
    assert_eq!(emitter.subscriber_count(), 0);
}

#[tokio::test]
async fn subscribers_see_their_own_ordered_stream() {
    let emitter = emitter(100, 50);
    let mut first = emitter.subscribe();
    let mut second = emitter.subscribe();

    for i in 0..10 {
        emitter.emit_rate_limit_rejected(&rejected_request(&format!("/{i}")));
    }

    for expected in 0..10 {
        let path = format!("/{expected}");
        assert_eq!(first.recv().await.unwrap().path.as_deref(), Some(&path[..]));
        assert_eq!(
            second.recv().await.unwrap().path.as_deref(),
            Some(&path[..])
        );
    }

    emitter.unsubscribe(first);
    emitter.unsubscribe(second);
}
