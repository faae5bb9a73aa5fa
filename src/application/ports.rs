//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Error from a shared-store operation.
///
/// Store errors never reach admission callers: the engine records a breaker
/// failure, emits a store-failure event, and answers from the local counter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport-level failure: connect, protocol, or broken connection.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] redis::RedisError),
    /// The admission script failed to load or execute on the store.
    #[error("store script failed: {0}")]
    Script(#[source] redis::RedisError),
    /// The operation did not complete within the configured deadline.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Port for the shared sliding-window counter.
///
/// The engine consults this in distributed mode; the one required operation
/// is an atomic check-and-admit for one identifier. `ping` is the cheap
/// liveness probe the recovery monitor uses while the breaker is open.
#[async_trait]
pub trait AdmissionStore: Send + Sync + Debug {
    /// Atomically decide whether one more request from `identifier` fits in
    /// the current window, admitting it if so.
    async fn check_admission(&self, identifier: &str) -> Result<bool, StoreError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}
