//! # rategate
//!
//! Per-client sliding-window admission control with a two-tier decision
//! engine: a Redis-backed distributed counter shared across replicas, and a
//! local in-process counter used as fallback. A circuit breaker bridges the
//! two, demoting traffic to the local counter when the store misbehaves and
//! re-promoting it after a successful recovery probe.
//!
//! Every rejection, breaker transition, and store failure becomes an
//! [`ActivityEvent`] pushed onto a bounded ring buffer and fanned out
//! non-blockingly to live subscribers, so dashboards can replay recent
//! history and stream what happens next.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rategate::{EngineConfig, EventEmitter, RateLimitEngine, RequestInfo};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let emitter = Arc::new(EventEmitter::default());
//!
//!     let config = EngineConfig {
//!         store_url: Some("redis://127.0.0.1/".to_string()),
//!         limit: 100,
//!         window: Duration::from_secs(60),
//!         ..EngineConfig::default()
//!     };
//!     let engine = RateLimitEngine::new(config, Some(emitter.clone())).await?;
//!
//!     // Per request: derive the client identity, then ask the engine.
//!     let request = RequestInfo::new("GET", "/api/users", "203.0.113.9:54231");
//!     let identifier = request.client_ip();
//!     if !engine.allow_with_request(&identifier, &request).await {
//!         // respond 429
//!     }
//!
//!     engine.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Atomic distributed window**: one Lua script expires, counts, and
//!   admits in a single store round-trip
//! - **Local fallback**: decisions keep flowing during a store outage
//! - **Circuit breaker**: consecutive failures open it; a background probe
//!   half-opens it; the next store success closes it
//! - **Lossy live feed**: bounded per-subscriber buffers, never backpressure
//! - **Pluggable store**: bring your own [`AdmissionStore`] implementation

// Domain layer - pure business types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    event::{ActivityEvent, EventKind},
    request::RequestInfo,
};

pub use application::{
    broadcast::{EventBroadcaster, Subscriber},
    circuit_breaker::{CircuitBreaker, CircuitState},
    emitter::{EmitterConfig, EmitterConfigError, EventEmitter},
    engine::{EngineConfig, EngineConfigError, EngineError, RateLimitEngine},
    feed::ActivityFeed,
    local::LocalRateLimiter,
    metrics::{EngineMode, Metrics, MetricsSnapshot},
    ports::{AdmissionStore, Clock, StoreError},
};

pub use infrastructure::{
    clock::SystemClock,
    redis_store::{RedisAdmissionStore, RedisStoreConfig},
};
