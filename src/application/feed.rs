//! Bounded circular history of activity events.
//!
//! The feed keeps the N most recent events, overwriting the oldest when
//! full. Writes are serialized; reads take a shared lock and observe a
//! consistent snapshot.

use crate::domain::event::ActivityEvent;
use parking_lot::RwLock;
use std::sync::Arc;

/// Fixed-capacity ring buffer of the most recent events.
#[derive(Debug)]
pub struct ActivityFeed {
    inner: RwLock<FeedInner>,
    capacity: usize,
}

#[derive(Debug)]
struct FeedInner {
    slots: Vec<Option<Arc<ActivityEvent>>>,
    /// Next write position; once wrapped, also the oldest retained event.
    cursor: usize,
    /// Number of occupied slots, saturating at capacity.
    len: usize,
}

impl ActivityFeed {
    /// Create a feed retaining at most `capacity` events.
    ///
    /// Callers validate capacity up front; a zero capacity is a programming
    /// error.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "feed capacity must be non-zero");
        Self {
            inner: RwLock::new(FeedInner {
                slots: vec![None; capacity],
                cursor: 0,
                len: 0,
            }),
            capacity,
        }
    }

    /// Append an event, overwriting the oldest one when full.
    pub fn add(&self, event: Arc<ActivityEvent>) {
        let mut inner = self.inner.write();
        let cursor = inner.cursor;
        inner.slots[cursor] = Some(event);
        inner.cursor = (cursor + 1) % self.capacity;
        inner.len = (inner.len + 1).min(self.capacity);
    }

    /// Up to `limit` retained events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<ActivityEvent>> {
        let inner = self.inner.read();
        let start = if inner.len < self.capacity {
            0
        } else {
            inner.cursor
        };

        (0..inner.len)
            .take(limit)
            .filter_map(|i| inner.slots[(start + i) % self.capacity].clone())
            .collect()
    }

    /// Number of events currently retained.
    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    /// Whether no events have been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
