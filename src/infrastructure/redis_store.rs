//! Redis-backed sliding-window counter.
//!
//! One sorted set per client identifier, members scored by admission time in
//! epoch milliseconds. The whole check runs as a single Lua script, so
//! expiry, count, and admit are atomic across every process sharing the
//! store. Keys expire after roughly twice the window, bounding storage for
//! clients that go quiet.
//!
//! Connections go through `redis::aio::ConnectionManager`, established
//! lazily so an unreachable server surfaces as a per-operation error rather
//! than a construction failure.

use crate::application::ports::{AdmissionStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use uuid::Uuid;

/// Key namespace shared with every other process using the store.
const KEY_PREFIX: &str = "rate_limit:";

/// Expire, count, and conditionally admit in one atomic step.
const ADMISSION_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_start = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local token = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, 0, window_start)

local count = redis.call('ZCARD', key)

if count >= limit then
    return 0
end

redis.call('ZADD', key, now, token)
redis.call('EXPIRE', key, ttl)
return 1
"#;

/// Configuration for the Redis admission store.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Requests allowed per window per identifier.
    pub limit: usize,
    /// Sliding window length.
    pub window: Duration,
    /// Deadline for any single store operation.
    pub timeout: Duration,
}

/// Shared sliding-window counter backed by Redis sorted sets.
pub struct RedisAdmissionStore {
    client: Client,
    connection: RwLock<Option<ConnectionManager>>,
    script: Script,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisAdmissionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisAdmissionStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisAdmissionStore {
    /// Parse the connection string and prepare the admission script.
    ///
    /// No I/O happens here; the connection is established on first use.
    ///
    /// # Errors
    /// Returns the parse error for a malformed URL.
    pub fn connect(url: &str, config: RedisStoreConfig) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            connection: RwLock::new(None),
            script: Script::new(ADMISSION_SCRIPT),
            config,
        })
    }

    fn key(identifier: &str) -> String {
        format!("{KEY_PREFIX}{identifier}")
    }

    /// Seconds until an untouched identifier's key expires.
    fn ttl_secs(&self) -> u64 {
        (2 * self.config.window).as_secs().max(1)
    }

    /// Clone the managed connection, establishing it first if needed.
    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        {
            let guard = self.connection.read().await;
            if let Some(connection) = guard.as_ref() {
                return Ok(connection.clone());
            }
        }

        let mut guard = self.connection.write().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }
        let connection = ConnectionManager::new(self.client.clone())
            .await
            .map_err(StoreError::Unavailable)?;
        *guard = Some(connection.clone());
        Ok(connection)
    }

    async fn run_admission(&self, identifier: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection().await?;

        let now_ms = Utc::now().timestamp_millis();
        let window_start_ms = now_ms - self.config.window.as_millis() as i64;
        let token = Uuid::new_v4().to_string();

        let verdict: i64 = self
            .script
            .key(Self::key(identifier))
            .arg(now_ms)
            .arg(window_start_ms)
            .arg(self.config.limit)
            .arg(token)
            .arg(self.ttl_secs())
            .invoke_async(&mut connection)
            .await
            .map_err(StoreError::Script)?;

        Ok(verdict == 1)
    }

    async fn run_ping(&self) -> Result<(), StoreError> {
        let mut connection = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(StoreError::Unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl AdmissionStore for RedisAdmissionStore {
    async fn check_admission(&self, identifier: &str) -> Result<bool, StoreError> {
        let deadline = self.config.timeout;
        match timeout(deadline, self.run_admission(identifier)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(deadline)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let deadline = self.config.timeout;
        match timeout(deadline, self.run_ping()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(deadline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(window: Duration) -> RedisAdmissionStore {
        RedisAdmissionStore::connect(
            "redis://127.0.0.1/",
            RedisStoreConfig {
                limit: 10,
                window,
                timeout: Duration::from_millis(500),
            },
        )
        .unwrap()
    }

    #[test]
    fn keys_are_namespaced_per_identifier() {
        assert_eq!(
            RedisAdmissionStore::key("203.0.113.9"),
            "rate_limit:203.0.113.9"
        );
    }

    #[test]
    fn ttl_is_twice_the_window() {
        assert_eq!(store(Duration::from_secs(60)).ttl_secs(), 120);
        // Sub-second windows still get a non-zero TTL.
        assert_eq!(store(Duration::from_millis(200)).ttl_secs(), 1);
    }

    #[test]
    fn malformed_url_is_rejected() {
        let result = RedisAdmissionStore::connect(
            "not a url",
            RedisStoreConfig {
                limit: 1,
                window: Duration::from_secs(1),
                timeout: Duration::from_millis(100),
            },
        );
        assert!(result.is_err());
    }
}
