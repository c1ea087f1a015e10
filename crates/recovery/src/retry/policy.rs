use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::Failure;

/// Maximum relative jitter applied to a backoff delay (±20%).
pub const JITTER_RATIO: f64 = 0.2;

/// Smallest delay jitter may produce.
pub const MIN_DELAY: Duration = Duration::from_millis(10);

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_EXPONENTIAL_BASE: f64 = 2.0;

/// Configuration for retry behavior.
///
/// The delay before retrying attempt `i` (0-indexed) is:
///
/// ```text
/// delay = min(initial_delay * exponential_base ^ i, max_delay)
/// ```
///
/// optionally perturbed by uniform ±20% jitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum invocations of the operation, counting the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "crate::serde_secs")]
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    #[serde(with = "crate::serde_secs")]
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub exponential_base: f64,
    /// Whether to add random jitter to delays.
    pub jitter_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            exponential_base: DEFAULT_EXPONENTIAL_BASE,
            jitter_enabled: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    pub fn with_jitter(mut self, jitter_enabled: bool) -> Self {
        self.jitter_enabled = jitter_enabled;
        self
    }

    /// Check the configuration for values the delay math cannot honor.
    pub fn validate(&self) -> Result<(), Failure> {
        if self.max_attempts == 0 {
            return Err(Failure::configuration(
                "Retry max_attempts must be at least 1",
                Some("max_attempts"),
            ));
        }
        if !self.exponential_base.is_finite() || self.exponential_base <= 1.0 {
            return Err(Failure::configuration(
                format!(
                    "Retry exponential_base must be greater than 1, got {}",
                    self.exponential_base
                ),
                Some("exponential_base"),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Failure::configuration(
                format!(
                    "Retry max_delay ({:?}) is shorter than initial_delay ({:?})",
                    self.max_delay, self.initial_delay
                ),
                Some("max_delay"),
            ));
        }
        Ok(())
    }

    /// Backoff delay for attempt `attempt_index` without jitter.
    pub fn base_delay(&self, attempt_index: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Backoff delay for attempt `attempt_index`, jittered when enabled.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let base = self.base_delay(attempt_index);
        if self.jitter_enabled {
            jittered(base, &mut rand::thread_rng())
        } else {
            base
        }
    }
}

/// Perturb `base` by a uniform factor in `[-JITTER_RATIO, JITTER_RATIO]`.
///
/// Never returns less than [`MIN_DELAY`].
fn jittered<R: Rng + ?Sized>(base: Duration, rng: &mut R) -> Duration {
    let factor = 1.0 + rng.gen_range(-JITTER_RATIO..=JITTER_RATIO);
    let secs = base.as_secs_f64() * factor;
    Duration::from_secs_f64(secs.max(0.0)).max(MIN_DELAY)
}
