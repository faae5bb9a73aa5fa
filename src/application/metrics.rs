//! Observability counters for the admission engine.
//!
//! Counters are mutated under one lock by the engine and read out by value:
//! a [`MetricsSnapshot`] never aliases live state. The snapshot serializes
//! to the stable metrics JSON envelope.

use crate::application::circuit_breaker::CircuitState;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

/// Which tier is currently answering admission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineMode {
    /// Store-backed decisions.
    #[serde(rename = "distributed")]
    Distributed,
    /// Local decisions while the store is unhealthy.
    #[serde(rename = "fallback")]
    Fallback,
    /// Local decisions by configuration; no store at all.
    #[serde(rename = "in-memory")]
    InMemory,
}

impl EngineMode {
    /// Stable label, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMode::Distributed => "distributed",
            EngineMode::Fallback => "fallback",
            EngineMode::InMemory => "in-memory",
        }
    }
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct MetricsInner {
    total_requests: u64,
    allowed_requests: u64,
    rejected_requests: u64,
    store_failures: u64,
    fallback_count: u64,
    store_latency: Duration,
    mode: EngineMode,
    last_updated: DateTime<Utc>,
}

/// Shared counters recording what the engine decided and how.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<RwLock<MetricsInner>>,
}

impl Metrics {
    /// Create a metrics tracker starting in `mode`.
    pub fn new(mode: EngineMode) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                total_requests: 0,
                allowed_requests: 0,
                rejected_requests: 0,
                store_failures: 0,
                fallback_count: 0,
                store_latency: Duration::ZERO,
                mode,
                last_updated: Utc::now(),
            })),
        }
    }

    /// Count one admission call, before any decision is made.
    pub(crate) fn record_request(&self) {
        self.inner.write().total_requests += 1;
    }

    /// Count one decision outcome.
    pub(crate) fn record_outcome(&self, allowed: bool) {
        let mut inner = self.inner.write();
        if allowed {
            inner.allowed_requests += 1;
        } else {
            inner.rejected_requests += 1;
        }
        inner.last_updated = Utc::now();
    }

    /// A store round-trip succeeded: note its latency, mode is distributed.
    pub(crate) fn record_store_success(&self, latency: Duration) {
        let mut inner = self.inner.write();
        inner.store_latency = latency;
        inner.mode = EngineMode::Distributed;
    }

    /// A store round-trip failed.
    pub(crate) fn record_store_failure(&self) {
        self.inner.write().store_failures += 1;
    }

    /// The local counter answered in place of the store.
    pub(crate) fn record_fallback(&self) {
        let mut inner = self.inner.write();
        inner.fallback_count += 1;
        inner.mode = EngineMode::Fallback;
    }

    /// Set the mode label directly (recovery monitor).
    pub(crate) fn set_mode(&self, mode: EngineMode) {
        self.inner.write().mode = mode;
    }

    /// Current mode label.
    pub fn mode(&self) -> EngineMode {
        self.inner.read().mode
    }

    /// Copy all counters out.
    ///
    /// `circuit` is the breaker state for store-backed engines; pass `None`
    /// for a pure-local engine and the store-derived fields are omitted from
    /// the serialized envelope.
    pub fn snapshot(&self, circuit: Option<CircuitState>) -> MetricsSnapshot {
        let inner = self.inner.read();
        let store_backed = circuit.is_some();
        MetricsSnapshot {
            mode: inner.mode,
            total_requests: inner.total_requests,
            allowed_requests: inner.allowed_requests,
            rejected_requests: inner.rejected_requests,
            redis_latency: store_backed.then_some(inner.store_latency),
            redis_failures: store_backed.then_some(inner.store_failures),
            fallback_count: store_backed.then_some(inner.fallback_count),
            last_updated: inner.last_updated,
            circuit_state: circuit.map(|state| {
                if state == CircuitState::Open {
                    "open"
                } else {
                    "closed"
                }
            }),
        }
    }
}

fn serialize_latency<S>(latency: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match latency {
        Some(latency) => serializer.serialize_str(&format!("{latency:?}")),
        None => serializer.serialize_none(),
    }
}

/// Point-in-time copy of the engine's counters.
///
/// Serializes to `{mode, total_requests, allowed_requests,
/// rejected_requests, redis_latency?, redis_failures?, fallback_count?,
/// last_updated, circuit_state?}`. Field names derived from the store keep
/// their historical `redis_` prefix for wire compatibility.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Current decision tier.
    pub mode: EngineMode,
    /// Admission calls seen.
    pub total_requests: u64,
    /// Calls that returned allow.
    pub allowed_requests: u64,
    /// Calls that returned deny.
    pub rejected_requests: u64,
    /// Last observed store round-trip latency.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_latency"
    )]
    pub redis_latency: Option<Duration>,
    /// Store operations that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_failures: Option<u64>,
    /// Times the local counter answered for the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_count: Option<u64>,
    /// When any counter last changed.
    pub last_updated: DateTime<Utc>,
    /// `"open"` or `"closed"`; absent for pure-local engines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_state: Option<&'static str>,
}

impl MetricsSnapshot {
    /// `total = allowed + rejected` holds at any quiescent point.
    pub fn decided_requests(&self) -> u64 {
        self.allowed_requests + self.rejected_requests
    }
}
