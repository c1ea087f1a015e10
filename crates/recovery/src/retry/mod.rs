//! Retry policy module.
//!
//! This module provides bounded retry with exponential backoff:
//! - [`RetryConfig`]: attempt ceiling and delay schedule, with optional jitter
//! - [`RetryState`]: per-sequence progress expressed as a monotonic deadline,
//!   so a tick-driven caller can wait without blocking
//! - [`retry_with_backoff`] / [`retry_with_backoff_async`]: drivers for callers
//!   that can afford to wait in place (worker threads, async tasks)

mod policy;
mod state;

pub use policy::{RetryConfig, JITTER_RATIO, MIN_DELAY};
pub use state::{retry_with_backoff, retry_with_backoff_async, RetryDecision, RetryState};
