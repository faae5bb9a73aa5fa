//! Circuit breaker guarding the shared store.
//!
//! While the breaker is closed the engine consults the store; once enough
//! consecutive store failures accumulate it opens and the engine answers
//! from the local counter. The recovery monitor half-opens it after a
//! successful probe, and the next successful store call closes it again.

use crate::application::emitter::EventEmitter;
use parking_lot::RwLock;
use std::time::Instant;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, store in use.
    Closed,
    /// Store considered down, local fallback in use.
    Open,
    /// A probe succeeded; the next store call decides.
    HalfOpen,
}

impl CircuitState {
    /// Stable label used in event details.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
}

/// Threshold-driven state machine over store health.
///
/// All transitions are serialized by one lock; readers take it shared.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: RwLock<BreakerInner>,
    failure_threshold: u32,
}

impl CircuitBreaker {
    /// Create a closed breaker that opens after `failure_threshold`
    /// consecutive failures.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
            }),
            failure_threshold,
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Whether traffic should bypass the store.
    pub fn is_open(&self) -> bool {
        self.inner.read().state == CircuitState::Open
    }

    /// Consecutive failures since the last success.
    pub fn failures(&self) -> u32 {
        self.inner.read().failures
    }

    /// Instant of the most recent failure, if any.
    pub fn last_failure(&self) -> Option<Instant> {
        self.inner.read().last_failure
    }

    /// Record a store failure; opens the breaker on the threshold edge.
    ///
    /// The state-change event goes through `emitter` when one is wired.
    pub fn record_failure(&self, emitter: Option<&EventEmitter>) {
        let transition = {
            let mut inner = self.inner.write();
            inner.failures += 1;
            inner.last_failure = Some(Instant::now());

            if inner.failures >= self.failure_threshold && inner.state != CircuitState::Open {
                let old = inner.state;
                inner.state = CircuitState::Open;
                Some((old, inner.failures))
            } else {
                None
            }
        };

        // Emit outside the lock.
        if let (Some((old, failures)), Some(emitter)) = (transition, emitter) {
            emitter.emit_breaker_transition(old, CircuitState::Open, failures);
        }
    }

    /// Record a successful store operation.
    ///
    /// Closes a half-open breaker; in either non-open state the consecutive
    /// failure counter restarts from zero.
    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failures = 0;
            }
            CircuitState::Closed => {
                inner.failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Move an open breaker to half-open after a successful probe.
    /// No-op in any other state.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        if inner.state == CircuitState::Open {
            inner.state = CircuitState::HalfOpen;
        }
    }
}
