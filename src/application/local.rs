//! In-process sliding-window counter, the fallback admission path.
//!
//! Tracks admitted-request timestamps per client identifier in a concurrent
//! map. Decisions are atomic per identifier; a periodic sweep drops
//! identifiers that have gone quiet.

use crate::application::ports::Clock;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-identifier sliding-window rate limiter held entirely in memory.
#[derive(Debug)]
pub struct LocalRateLimiter {
    requests: DashMap<String, VecDeque<Instant>>,
    limit: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl LocalRateLimiter {
    /// Create a limiter allowing `limit` requests per `window` per
    /// identifier.
    pub fn new(limit: usize, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            requests: DashMap::new(),
            limit,
            window,
            clock,
        }
    }

    /// Decide whether one more request from `identifier` fits in the
    /// current window, admitting it if so.
    ///
    /// Atomic per identifier: the map entry stays locked for the whole
    /// filter-count-append step.
    pub fn allow(&self, identifier: &str) -> bool {
        let now = self.clock.now();
        let mut timestamps = self
            .requests
            .entry(identifier.to_string())
            .or_default();

        Self::expire(&mut timestamps, now, self.window);

        if timestamps.len() >= self.limit {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Drop expired timestamps everywhere and remove identifiers whose
    /// window is empty. Invoked by a periodic task, never by `allow`.
    pub fn sweep(&self) {
        let now = self.clock.now();
        self.requests.retain(|_, timestamps| {
            Self::expire(timestamps, now, self.window);
            !timestamps.is_empty()
        });
    }

    /// Number of identifiers currently tracked.
    pub fn tracked_identifiers(&self) -> usize {
        self.requests.len()
    }

    /// Timestamps are appended in order, so expiry is a pop from the front.
    /// Retained entries are strictly newer than `now - window`.
    fn expire(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        let cutoff = now.checked_sub(window);
        while let Some(front) = timestamps.front() {
            let expired = match cutoff {
                Some(cutoff) => *front <= cutoff,
                // The process is younger than the window; nothing can be
                // outside it.
                None => false,
            };
            if !expired {
                break;
            }
            timestamps.pop_front();
        }
    }
}
