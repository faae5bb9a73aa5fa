//! Activity events describing notable rate-limiter occurrences.
//!
//! Events are immutable values created by the
//! [`EventEmitter`](crate::application::emitter::EventEmitter), retained in
//! the [`ActivityFeed`](crate::application::feed::ActivityFeed) ring buffer,
//! and pushed to live subscribers. The serialized form is part of the wire
//! contract consumed by dashboards, so field and type names are stable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Kind of occurrence an [`ActivityEvent`] describes.
///
/// The serialized names are stable wire identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// A request was rejected because its client exceeded the limit.
    #[serde(rename = "rate_limit_rejected")]
    RateLimitRejected,
    /// The circuit breaker changed state.
    #[serde(rename = "circuit_breaker_state_change")]
    BreakerStateChanged,
    /// A store operation failed.
    #[serde(rename = "redis_failure")]
    StoreFailed,
}

impl EventKind {
    /// Stable wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RateLimitRejected => "rate_limit_rejected",
            EventKind::BreakerStateChanged => "circuit_breaker_state_change",
            EventKind::StoreFailed => "redis_failure",
        }
    }

    /// Short prefix used when minting event identifiers (`rl-42`, `cb-7`, ...).
    pub(crate) fn id_prefix(&self) -> &'static str {
        match self {
            EventKind::RateLimitRejected => "rl",
            EventKind::BreakerStateChanged => "cb",
            EventKind::StoreFailed => "rf",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable record of a rate-limiter occurrence.
///
/// Serializes to the envelope `{id, type, timestamp, ip?, path?, details}`
/// with the timestamp in RFC3339.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    /// Process-locally unique, kind-prefixed identifier.
    pub id: String,
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Wall-clock time of the occurrence.
    pub timestamp: DateTime<Utc>,
    /// Client IP, for events tied to a specific request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Request path, for events tied to a specific request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Kind-specific fields (old/new breaker state, failed operation, ...).
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

impl ActivityEvent {
    /// Create an event with no request association and empty details.
    pub fn new(id: String, kind: EventKind) -> Self {
        Self {
            id,
            kind,
            timestamp: Utc::now(),
            ip: None,
            path: None,
            details: Map::new(),
        }
    }
}
