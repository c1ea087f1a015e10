//! Scoreboard Recovery Crate
//!
//! This crate is the failure-recovery core of the scoreboard display. It sits
//! between the display loop and the sport-specific data fetchers and decides
//! what the display should show when a fetch fails.
//!
//! # Overview
//!
//! The crate provides:
//! - A failure taxonomy with recoverable and non-recoverable kinds
//! - Bounded retry with exponential backoff and jitter
//! - A per-key circuit breaker that isolates failing endpoints
//! - A fallback cache of last-known-good results with age-bounded reads
//! - An orchestrator that composes all of the above into one tick-driven policy
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |   Display Loop   |  (one tick per refresh)
//! +------------------+
//!          |
//!          v
//! +----------------------+       +------------------+
//! | RecoveryOrchestrator | ----> |   Connectivity   |  (device-level probe)
//! +----------------------+       +------------------+
//!          |
//!          v
//! +------------------+
//! |  CircuitBreaker  |  (per key)
//! +------------------+
//!          |
//!          v
//! +------------------+
//! |    RetryState    |  (deadline-driven backoff)
//! +------------------+
//!          |
//!          v
//! +------------------+       +------------------+
//! | fetch operation  | ----> |  FallbackCache   |  (write on success, read on failure)
//! +------------------+       +------------------+
//!          |
//!          v
//! +------------------+
//! |  RecoveryStatus  |  (back to the display loop)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Failure`] - Classified error raised by a fetch operation
//! - [`RetryConfig`] / [`RetryState`] - Backoff configuration and per-sequence state
//! - [`CircuitBreaker`] - Per-key failure gate
//! - [`FallbackCache`] - Last successful payload per key
//! - [`RecoveryOrchestrator`] - The composition point driven by the host loop
//! - [`RecoveryStatus`] - What the display should show for a key on this tick

pub mod clock;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod retry;

mod serde_secs;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{CircuitError, Failure, FailureKind, RetryClass};
pub use models::{FetchKey, RecoveryEvent, RecoveryStatus};
pub use orchestrator::{
    AlwaysOnline, Connectivity, RecoveryConfig, RecoveryOrchestrator, RecoveryStats,
};
pub use registry::{
    CacheStats, CachedData, CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState,
    FallbackCache, PayloadValidator, RequiredFields,
};
pub use retry::{
    retry_with_backoff, retry_with_backoff_async, RetryConfig, RetryDecision, RetryState,
};
