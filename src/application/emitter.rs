//! Event emission: ring-buffer history plus live fan-out.
//!
//! The emitter is the only producer of [`ActivityEvent`]s. Every emission
//! lands in the [`ActivityFeed`] first and is then broadcast to subscribers,
//! so `recent()` always covers at least what a live subscriber has seen.

use crate::application::broadcast::{EventBroadcaster, Subscriber};
use crate::application::circuit_breaker::CircuitState;
use crate::application::feed::ActivityFeed;
use crate::application::ports::StoreError;
use crate::domain::event::{ActivityEvent, EventKind};
use crate::domain::request::RequestInfo;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Error returned when emitter configuration validation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EmitterConfigError {
    /// Ring capacity must be greater than zero
    #[error("ring capacity must be greater than 0")]
    ZeroRingCapacity,
    /// Subscriber buffer depth must be greater than zero
    #[error("subscriber buffer must be greater than 0")]
    ZeroSubscriberBuffer,
}

/// Configuration for the event pipeline.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Number of events the ring buffer retains.
    pub ring_capacity: usize,
    /// Per-subscriber channel depth.
    pub subscriber_buffer: usize,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1000,
            subscriber_buffer: 10,
        }
    }
}

impl EmitterConfig {
    /// Create a validated config.
    ///
    /// # Errors
    /// Returns an [`EmitterConfigError`] when either bound is zero.
    pub fn new(ring_capacity: usize, subscriber_buffer: usize) -> Result<Self, EmitterConfigError> {
        let config = Self {
            ring_capacity,
            subscriber_buffer,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check both bounds.
    ///
    /// # Errors
    /// Returns the first [`EmitterConfigError`] found.
    pub fn validate(&self) -> Result<(), EmitterConfigError> {
        if self.ring_capacity == 0 {
            return Err(EmitterConfigError::ZeroRingCapacity);
        }
        if self.subscriber_buffer == 0 {
            return Err(EmitterConfigError::ZeroSubscriberBuffer);
        }
        Ok(())
    }
}

/// Joins the event ring buffer with the live broadcaster and owns the
/// typed event constructors.
#[derive(Debug)]
pub struct EventEmitter {
    feed: ActivityFeed,
    broadcaster: EventBroadcaster,
    /// Process-local sequence combined with a kind prefix so concurrent
    /// emitters can never mint colliding identifiers.
    sequence: AtomicU64,
}

impl EventEmitter {
    /// Create an emitter with the given pipeline bounds.
    ///
    /// The config is re-validated here: its fields are public, so a caller
    /// can bypass [`EmitterConfig::new`].
    ///
    /// # Errors
    /// Returns an [`EmitterConfigError`] when either bound is zero.
    pub fn new(config: EmitterConfig) -> Result<Self, EmitterConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: EmitterConfig) -> Self {
        Self {
            feed: ActivityFeed::new(config.ring_capacity),
            broadcaster: EventBroadcaster::new(config.subscriber_buffer),
            sequence: AtomicU64::new(0),
        }
    }

    fn next_id(&self, kind: EventKind) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", kind.id_prefix(), seq)
    }

    /// Record an event in the ring and fan it out to subscribers, in that
    /// order.
    pub fn emit(&self, event: ActivityEvent) {
        let event = Arc::new(event);
        self.feed.add(Arc::clone(&event));
        self.broadcaster.broadcast(&event);
    }

    /// Emit a rejection event for a request that exceeded its limit.
    pub fn emit_rate_limit_rejected(&self, request: &RequestInfo) {
        let mut event = ActivityEvent::new(
            self.next_id(EventKind::RateLimitRejected),
            EventKind::RateLimitRejected,
        );
        event.ip = Some(request.client_ip());
        event.path = Some(request.path.clone());
        event
            .details
            .insert("method".to_string(), json!(request.method));
        self.emit(event);
    }

    /// Emit a breaker state transition.
    pub fn emit_breaker_transition(&self, old: CircuitState, new: CircuitState, failures: u32) {
        let mut event = ActivityEvent::new(
            self.next_id(EventKind::BreakerStateChanged),
            EventKind::BreakerStateChanged,
        );
        event
            .details
            .insert("old_state".to_string(), json!(old.as_str()));
        event
            .details
            .insert("new_state".to_string(), json!(new.as_str()));
        event
            .details
            .insert("failures".to_string(), json!(failures));
        self.emit(event);
    }

    /// Emit a store failure with the operation that hit it.
    pub fn emit_store_failure(&self, operation: &str, error: &StoreError) {
        let mut event = ActivityEvent::new(
            self.next_id(EventKind::StoreFailed),
            EventKind::StoreFailed,
        );
        event
            .details
            .insert("operation".to_string(), json!(operation));
        event
            .details
            .insert("error".to_string(), json!(error.to_string()));
        self.emit(event);
    }

    /// Up to `limit` retained events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<ActivityEvent>> {
        self.feed.recent(limit)
    }

    /// Register a live subscriber.
    pub fn subscribe(&self) -> Subscriber {
        self.broadcaster.subscribe()
    }

    /// Remove a subscriber, firing its done signal.
    pub fn unsubscribe(&self, subscriber: Subscriber) {
        self.broadcaster.unsubscribe(subscriber);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// The underlying ring buffer.
    pub fn feed(&self) -> &ActivityFeed {
        &self.feed
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::from_validated(EmitterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_zero_bounds() {
        assert!(matches!(
            EmitterConfig::new(0, 10),
            Err(EmitterConfigError::ZeroRingCapacity)
        ));
        assert!(matches!(
            EmitterConfig::new(10, 0),
            Err(EmitterConfigError::ZeroSubscriberBuffer)
        ));
        assert!(EmitterConfig::new(10, 10).is_ok());
    }

    #[test]
    fn new_rejects_unvalidated_config_instead_of_panicking() {
        // The fields are public, so a zero can arrive without going through
        // EmitterConfig::new.
        assert!(matches!(
            EventEmitter::new(EmitterConfig {
                ring_capacity: 0,
                subscriber_buffer: 10,
            }),
            Err(EmitterConfigError::ZeroRingCapacity)
        ));
        assert!(matches!(
            EventEmitter::new(EmitterConfig {
                ring_capacity: 10,
                subscriber_buffer: 0,
            }),
            Err(EmitterConfigError::ZeroSubscriberBuffer)
        ));
    }

    #[test]
    fn ids_are_unique_and_kind_prefixed() {
        let emitter = EventEmitter::default();
        let req = RequestInfo::new("GET", "/a", "1.2.3.4:80");

        emitter.emit_rate_limit_rejected(&req);
        emitter.emit_breaker_transition(CircuitState::Closed, CircuitState::Open, 5);
        emitter.emit_rate_limit_rejected(&req);

        let ids: Vec<String> = emitter
            .recent(10)
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(ids, vec!["rl-0", "cb-1", "rl-2"]);
    }

    #[test]
    fn rejection_event_carries_request_fields() {
        let emitter = EventEmitter::default();
        let req = RequestInfo::new("PUT", "/x", "9.9.9.9:1234").with_real_ip("7.7.7.7");

        emitter.emit_rate_limit_rejected(&req);

        let events = emitter.recent(1);
        let event = &events[0];
        assert_eq!(event.kind, EventKind::RateLimitRejected);
        assert_eq!(event.ip.as_deref(), Some("7.7.7.7"));
        assert_eq!(event.path.as_deref(), Some("/x"));
        assert_eq!(event.details["method"], "PUT");
    }

    #[test]
    fn breaker_event_carries_transition_details() {
        let emitter = EventEmitter::default();
        emitter.emit_breaker_transition(CircuitState::Closed, CircuitState::Open, 3);

        let events = emitter.recent(1);
        let event = &events[0];
        assert_eq!(event.kind, EventKind::BreakerStateChanged);
        assert_eq!(event.details["old_state"], "closed");
        assert_eq!(event.details["new_state"], "open");
        assert_eq!(event.details["failures"], 3);
        assert!(event.ip.is_none());
    }

    #[test]
    fn store_failure_event_carries_operation_and_error() {
        let emitter = EventEmitter::default();
        let error = StoreError::Timeout(std::time::Duration::from_millis(500));
        emitter.emit_store_failure("rate_limit_check", &error);

        let events = emitter.recent(1);
        let event = &events[0];
        assert_eq!(event.kind, EventKind::StoreFailed);
        assert_eq!(event.details["operation"], "rate_limit_check");
        assert!(event.details["error"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn emission_reaches_both_ring_and_subscriber() {
        let emitter = EventEmitter::new(EmitterConfig::new(8, 4).unwrap()).unwrap();
        let mut subscriber = emitter.subscribe();

        let req = RequestInfo::new("GET", "/r", "1.1.1.1:80");
        emitter.emit_rate_limit_rejected(&req);

        let live = subscriber.recv().await.unwrap();
        let replay = emitter.recent(8);
        assert_eq!(live.id, replay[0].id);

        emitter.unsubscribe(subscriber);
        assert_eq!(emitter.subscriber_count(), 0);
    }
}
