//! Two-tier admission engine.
//!
//! In distributed mode every decision goes to the shared store; a store
//! failure records a breaker failure and the local counter answers instead.
//! Once the breaker opens, decisions stay local until the recovery monitor's
//! probe succeeds. Without a store URL the engine runs the local counter
//! only.
//!
//! Background tasks (recovery monitor, local-counter sweeper) are spawned at
//! construction and stopped by [`RateLimitEngine::close`] via a shared watch
//! signal.

use crate::application::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::application::emitter::EventEmitter;
use crate::application::local::LocalRateLimiter;
use crate::application::metrics::{EngineMode, Metrics, MetricsSnapshot};
use crate::application::ports::{AdmissionStore, Clock};
use crate::domain::request::RequestInfo;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::redis_store::{RedisAdmissionStore, RedisStoreConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Error returned when engine configuration validation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineConfigError {
    /// Request limit must be greater than zero
    #[error("limit must be greater than 0")]
    ZeroLimit,
    /// Window duration must be greater than zero
    #[error("window must be greater than 0")]
    ZeroWindow,
    /// Breaker threshold must be greater than zero
    #[error("failure threshold must be greater than 0")]
    ZeroFailureThreshold,
    /// Probe cadence must be greater than zero
    #[error("recovery interval must be greater than 0")]
    ZeroRecoveryInterval,
    /// Store deadline must be greater than zero
    #[error("store timeout must be greater than 0")]
    ZeroStoreTimeout,
    /// Sweep cadence must be greater than zero
    #[error("sweep interval must be greater than 0")]
    ZeroSweepInterval,
}

/// Error from engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A numeric option was out of range.
    #[error(transparent)]
    Config(#[from] EngineConfigError),
    /// The store connection string did not parse.
    #[error("invalid store URL: {0}")]
    InvalidStoreUrl(#[source] redis::RedisError),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Store connection string. `None` or empty runs the engine pure-local.
    pub store_url: Option<String>,
    /// Requests allowed per window per identifier.
    pub limit: usize,
    /// Sliding window length.
    pub window: Duration,
    /// Consecutive store failures that open the breaker.
    pub failure_threshold: u32,
    /// How often the recovery monitor probes an unhealthy store.
    pub recovery_interval: Duration,
    /// Deadline for any single store operation.
    pub store_timeout: Duration,
    /// How often idle identifiers are swept from the local counter.
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_url: None,
            limit: 100,
            window: Duration::from_secs(60),
            failure_threshold: 5,
            recovery_interval: Duration::from_secs(10),
            store_timeout: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Check every numeric option.
    ///
    /// # Errors
    /// Returns the first [`EngineConfigError`] found.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if self.limit == 0 {
            return Err(EngineConfigError::ZeroLimit);
        }
        if self.window.is_zero() {
            return Err(EngineConfigError::ZeroWindow);
        }
        if self.failure_threshold == 0 {
            return Err(EngineConfigError::ZeroFailureThreshold);
        }
        if self.recovery_interval.is_zero() {
            return Err(EngineConfigError::ZeroRecoveryInterval);
        }
        if self.store_timeout.is_zero() {
            return Err(EngineConfigError::ZeroStoreTimeout);
        }
        if self.sweep_interval.is_zero() {
            return Err(EngineConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

/// Per-client admission control with a distributed primary path and a
/// local fallback, bridged by a circuit breaker.
#[derive(Debug)]
pub struct RateLimitEngine {
    store: Option<Arc<dyn AdmissionStore>>,
    local: Arc<LocalRateLimiter>,
    breaker: Arc<CircuitBreaker>,
    metrics: Metrics,
    emitter: Option<Arc<EventEmitter>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RateLimitEngine {
    /// Build an engine from configuration.
    ///
    /// With a store URL the engine starts in distributed mode and probes the
    /// store once; an unreachable store is not fatal here, the breaker and
    /// fallback machinery absorb it. Without one the engine runs pure-local.
    ///
    /// # Errors
    /// [`EngineError::Config`] for out-of-range options,
    /// [`EngineError::InvalidStoreUrl`] when the URL does not parse.
    pub async fn new(
        config: EngineConfig,
        emitter: Option<Arc<EventEmitter>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let store = match config.store_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => {
                let store_config = RedisStoreConfig {
                    limit: config.limit,
                    window: config.window,
                    timeout: config.store_timeout,
                };
                let store = RedisAdmissionStore::connect(url, store_config)
                    .map_err(EngineError::InvalidStoreUrl)?;
                if let Err(error) = store.ping().await {
                    tracing::warn!(
                        error = %error,
                        "store unreachable at startup, fallback will cover until it recovers"
                    );
                }
                Some(Arc::new(store) as Arc<dyn AdmissionStore>)
            }
            None => None,
        };

        Ok(Self::assemble(config, store, emitter))
    }

    /// Build an engine over a caller-supplied store implementation.
    ///
    /// Must be called within a tokio runtime; the engine spawns its
    /// background tasks here.
    ///
    /// # Errors
    /// [`EngineError::Config`] for out-of-range options.
    pub fn with_store(
        config: EngineConfig,
        store: Arc<dyn AdmissionStore>,
        emitter: Option<Arc<EventEmitter>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::assemble(config, Some(store), emitter))
    }

    fn assemble(
        config: EngineConfig,
        store: Option<Arc<dyn AdmissionStore>>,
        emitter: Option<Arc<EventEmitter>>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let local = Arc::new(LocalRateLimiter::new(config.limit, config.window, clock));
        let breaker = Arc::new(CircuitBreaker::new(config.failure_threshold));
        let initial_mode = if store.is_some() {
            EngineMode::Distributed
        } else {
            EngineMode::InMemory
        };
        let metrics = Metrics::new(initial_mode);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = vec![Self::spawn_sweeper(
            Arc::clone(&local),
            config.sweep_interval,
            shutdown_rx.clone(),
        )];
        if let Some(store) = store.clone() {
            tasks.push(Self::spawn_recovery_monitor(
                store,
                Arc::clone(&breaker),
                metrics.clone(),
                config.recovery_interval,
                shutdown_rx,
            ));
        }

        Self {
            store,
            local,
            breaker,
            metrics,
            emitter,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }
    }

    /// Decide whether one more request from `identifier` may proceed.
    pub async fn allow(&self, identifier: &str) -> bool {
        self.metrics.record_request();

        let Some(store) = self.store.as_ref() else {
            let allowed = self.local.allow(identifier);
            self.metrics.record_outcome(allowed);
            return allowed;
        };

        if self.breaker.is_open() {
            return self.fallback_allow(identifier);
        }

        let started = Instant::now();
        match store.check_admission(identifier).await {
            Ok(allowed) => {
                self.breaker.record_success();
                self.metrics.record_store_success(started.elapsed());
                self.metrics.record_outcome(allowed);
                allowed
            }
            Err(error) => {
                self.breaker.record_failure(self.emitter.as_deref());
                self.metrics.record_store_failure();
                if let Some(emitter) = &self.emitter {
                    emitter.emit_store_failure("rate_limit_check", &error);
                }
                tracing::warn!(
                    error = %error,
                    identifier,
                    "store admission check failed, answering from local counter"
                );
                self.fallback_allow(identifier)
            }
        }
    }

    /// Like [`allow`](Self::allow), and additionally emits a rejection event
    /// describing `request` when the verdict is deny.
    pub async fn allow_with_request(&self, identifier: &str, request: &RequestInfo) -> bool {
        let allowed = self.allow(identifier).await;
        if !allowed {
            if let Some(emitter) = &self.emitter {
                emitter.emit_rate_limit_rejected(request);
            }
        }
        allowed
    }

    fn fallback_allow(&self, identifier: &str) -> bool {
        let allowed = self.local.allow(identifier);
        self.metrics.record_fallback();
        self.metrics.record_outcome(allowed);
        allowed
    }

    /// Copy the current counters out.
    pub fn metrics(&self) -> MetricsSnapshot {
        let circuit: Option<CircuitState> =
            self.store.as_ref().map(|_| self.breaker.state());
        self.metrics.snapshot(circuit)
    }

    /// The breaker gating store access. Pure-local engines keep it
    /// permanently closed.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Whether this engine has a store configured.
    pub fn is_distributed(&self) -> bool {
        self.store.is_some()
    }

    /// Stop the background tasks and wait for them. Safe to call twice.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    fn spawn_sweeper(
        local: Arc<LocalRateLimiter>,
        every: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        // A dropped sender means the engine is gone.
                        if changed.is_err() || *shutdown_rx.borrow_and_update() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        local.sweep();
                    }
                }
            }
        })
    }

    fn spawn_recovery_monitor(
        store: Arc<dyn AdmissionStore>,
        breaker: Arc<CircuitBreaker>,
        metrics: Metrics,
        every: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow_and_update() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if !breaker.is_open() {
                            continue;
                        }
                        match store.ping().await {
                            Ok(()) => {
                                breaker.reset();
                                metrics.set_mode(EngineMode::Distributed);
                                tracing::info!("store probe succeeded, leaving fallback mode");
                            }
                            Err(error) => {
                                tracing::debug!(
                                    error = %error,
                                    "store probe failed, staying on fallback"
                                );
                            }
                        }
                    }
                }
            }
        })
    }
}
