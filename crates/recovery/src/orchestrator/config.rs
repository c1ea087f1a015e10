use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Failure;
use crate::registry::{CircuitBreakerConfig, DEFAULT_FALLBACK_MAX_AGE};
use crate::retry::RetryConfig;

const DEFAULT_RECOVERY_CEILING: u32 = 12;
const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(25);
const DEFAULT_OFFLINE_PROBE_INTERVAL: Duration = Duration::from_secs(20);
const DEFAULT_OFFLINE_DISPLAY_SWITCH: Duration = Duration::from_secs(240);

/// Tunables of the recovery policy. Durations are (fractional) seconds when
/// serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub retry: RetryConfig,
    pub circuit: CircuitBreakerConfig,
    /// Oldest cached payload still shown as a fallback.
    #[serde(with = "crate::serde_secs")]
    pub fallback_max_age: Duration,
    /// Failed recovery cycles tolerated before giving up on a key.
    pub recovery_ceiling: u32,
    /// Wait between recovery cycles, and how long a terminal failure holds.
    #[serde(with = "crate::serde_secs")]
    pub recovery_interval: Duration,
    /// Wait between fetches after a success.
    #[serde(with = "crate::serde_secs")]
    pub refresh_interval: Duration,
    /// Cadence of reconnection probes while offline.
    #[serde(with = "crate::serde_secs")]
    pub offline_probe_interval: Duration,
    /// Offline time after which the display switches to its neutral screen.
    #[serde(with = "crate::serde_secs")]
    pub offline_display_switch: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit: CircuitBreakerConfig::default(),
            fallback_max_age: DEFAULT_FALLBACK_MAX_AGE,
            recovery_ceiling: DEFAULT_RECOVERY_CEILING,
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            offline_probe_interval: DEFAULT_OFFLINE_PROBE_INTERVAL,
            offline_display_switch: DEFAULT_OFFLINE_DISPLAY_SWITCH,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<(), Failure> {
        self.retry.validate()?;
        if self.circuit.failure_threshold == 0 {
            return Err(Failure::configuration(
                "Circuit failure_threshold must be at least 1",
                Some("failure_threshold"),
            ));
        }
        if self.recovery_ceiling == 0 {
            return Err(Failure::configuration(
                "recovery_ceiling must be at least 1",
                Some("recovery_ceiling"),
            ));
        }
        if self.offline_probe_interval.is_zero() {
            return Err(Failure::configuration(
                "offline_probe_interval must be positive",
                Some("offline_probe_interval"),
            ));
        }
        Ok(())
    }
}
