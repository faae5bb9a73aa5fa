//! Mock admission store with failure injection.

use crate::application::local::LocalRateLimiter;
use crate::application::ports::{AdmissionStore, StoreError};
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory stand-in for the shared store.
///
/// While healthy it enforces the same sliding-window semantics as the real
/// store; flipped to failing, every operation errors, which is how tests
/// drive the breaker and fallback paths without a server.
#[derive(Debug)]
pub struct MockStore {
    window: LocalRateLimiter,
    failing: AtomicBool,
    checks: AtomicU64,
    pings: AtomicU64,
}

impl MockStore {
    /// Create a healthy store allowing `limit` requests per `window`.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            window: LocalRateLimiter::new(limit, window, Arc::new(SystemClock::new())),
            failing: AtomicBool::new(false),
            checks: AtomicU64::new(0),
            pings: AtomicU64::new(0),
        }
    }

    /// Make every subsequent operation fail (or recover).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of admission checks attempted against this store.
    pub fn checks(&self) -> u64 {
        self.checks.load(Ordering::SeqCst)
    }

    /// Number of liveness probes attempted against this store.
    pub fn pings(&self) -> u64 {
        self.pings.load(Ordering::SeqCst)
    }

    fn outage() -> StoreError {
        StoreError::Unavailable(redis::RedisError::from((
            redis::ErrorKind::IoError,
            "simulated store outage",
        )))
    }
}

#[async_trait]
impl AdmissionStore for MockStore {
    async fn check_admission(&self, identifier: &str) -> Result<bool, StoreError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        Ok(self.window.allow(identifier))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_store_enforces_the_window() {
        let store = MockStore::new(2, Duration::from_secs(60));

        assert!(store.check_admission("a").await.unwrap());
        assert!(store.check_admission("a").await.unwrap());
        assert!(!store.check_admission("a").await.unwrap());
        assert_eq!(store.checks(), 3);
    }

    #[tokio::test]
    async fn failing_store_errors_everything() {
        let store = MockStore::new(10, Duration::from_secs(60));
        store.set_failing(true);

        assert!(store.check_admission("a").await.is_err());
        assert!(store.ping().await.is_err());

        store.set_failing(false);
        assert!(store.check_admission("a").await.unwrap());
        assert!(store.ping().await.is_ok());
        assert_eq!(store.pings(), 2);
    }
}
