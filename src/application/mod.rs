//! Application layer - orchestration of the admission-control machinery.
//!
//! This layer coordinates the domain types and manages runtime behavior:
//! - Admission engine (two-tier decision making)
//! - Circuit breaker (store health)
//! - Local sliding-window counter (fallback path)
//! - Event pipeline (ring buffer, broadcaster, emitter)
//! - Metrics
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod broadcast;
pub mod circuit_breaker;
pub mod emitter;
pub mod engine;
pub mod feed;
pub mod local;
pub mod metrics;
pub mod ports;
