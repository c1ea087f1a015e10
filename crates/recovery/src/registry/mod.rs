//! Per-key recovery registries.
//!
//! This module provides the shared state consulted by the orchestrator:
//! - Circuit breaking per fetch key
//! - Fallback caching of the last good payload per fetch key
//! - Payload validation before anything is cached

mod circuit_breaker;
mod fallback_cache;
mod validator;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use fallback_cache::{CacheStats, CachedData, FallbackCache, DEFAULT_FALLBACK_MAX_AGE};
pub use validator::{PayloadValidator, RequiredFields};
