//! Per-key circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to stop hammering an endpoint that
//! keeps failing. The circuit has three states:
//!
//! - **Closed**: Normal operation, calls are allowed through.
//! - **Open**: The endpoint is failing, calls are rejected without being made.
//! - **HalfOpen**: The cooldown has elapsed and a single probe is in flight.
//!
//! There are no background timers. Open becomes HalfOpen only when a call
//! arrives after the cooldown. Circuits are created lazily on the first
//! failure, live in memory, and reset on restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::errors::{CircuitError, Failure};
use crate::models::FetchKey;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before an open circuit admits a probe.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - calls are allowed.
    Closed,
    /// Endpoint is failing - calls are rejected.
    Open,
    /// Cooldown elapsed - one probe call is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Internal circuit state for a single key.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    /// When the circuit last opened. Set whenever `state` becomes Open.
    opened_at: Option<Instant>,
    /// A HalfOpen probe has been admitted and not yet resolved.
    probe_in_flight: bool,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.probe_in_flight = false;
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Cooldown before an open circuit admits a probe.
    #[serde(with = "crate::serde_secs")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Per-key circuit breaker.
///
/// Thread-safe: every method takes `&self`, so one breaker can be shared by
/// the orchestrator and by worker threads. Keys are fully independent.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default settings.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly stale failure count,
    /// which is better than taking the display down.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Ask permission to make a call for `key`.
    ///
    /// Returns `Ok(())` when the circuit is Closed, or when it is Open, the
    /// cooldown has elapsed, and no other probe is outstanding (the circuit
    /// moves to HalfOpen). Otherwise returns [`CircuitError::Open`] and the
    /// caller must not make the call.
    ///
    /// Every admitted call must be resolved with [`record_success`],
    /// [`record_failure`] or [`release`].
    ///
    /// [`record_success`]: Self::record_success
    /// [`record_failure`]: Self::record_failure
    /// [`release`]: Self::release
    pub fn acquire(&self, key: &FetchKey) -> Result<(), CircuitError> {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();

        let Some(circuit) = circuits.get_mut(key.as_str()) else {
            return Ok(());
        };

        match circuit.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    debug!(
                        "Circuit breaker: rejecting '{}', probe already in flight",
                        key
                    );
                    return Err(CircuitError::Open {
                        key: key.to_string(),
                        retry_in: Duration::ZERO,
                    });
                }
                circuit.probe_in_flight = true;
                Ok(())
            }
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map_or(self.config.timeout, |opened_at| now.duration_since(opened_at));
                if elapsed >= self.config.timeout {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen after {:.0}s",
                        key,
                        elapsed.as_secs_f64()
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_in_flight = true;
                    return Ok(());
                }
                Err(CircuitError::Open {
                    key: key.to_string(),
                    retry_in: self.config.timeout - elapsed,
                })
            }
        }
    }

    /// Record a successful call for `key`.
    ///
    /// In Closed state: resets the failure count.
    /// In HalfOpen state: the probe succeeded, so the circuit closes.
    pub fn record_success(&self, key: &FetchKey) {
        let mut circuits = self.lock_circuits();

        let Some(circuit) = circuits.get_mut(key.as_str()) else {
            return;
        };

        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures > 0 {
                    debug!(
                        "Circuit breaker: success for '{}', failure count reset",
                        key
                    );
                }
                circuit.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker: probe succeeded, closing circuit for '{}'", key);
                circuit.close();
            }
            CircuitState::Open => {
                // acquire() should have moved the circuit to HalfOpen
                debug!(
                    "Circuit breaker: unexpected success for '{}' in Open state",
                    key
                );
            }
        }
    }

    /// Record a failed call for `key`.
    ///
    /// Increments the failure count and may open the circuit.
    /// In HalfOpen state, the failed probe reopens it with a fresh cooldown.
    pub fn record_failure(&self, key: &FetchKey) {
        let now = self.clock.now();
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(key.to_string())
            .or_insert_with(Circuit::new);

        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        key, circuit.consecutive_failures
                    );
                    circuit.open(now);
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        key, circuit.consecutive_failures, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    "Circuit breaker: probe failed, reopening circuit for '{}'",
                    key
                );
                circuit.open(now);
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    key
                );
            }
        }
    }

    /// Resolve an admitted call without counting it either way.
    ///
    /// Used when the call failed for a reason the endpoint is not responsible
    /// for. A HalfOpen circuit stays HalfOpen and admits the next probe.
    pub fn release(&self, key: &FetchKey) {
        let mut circuits = self.lock_circuits();
        if let Some(circuit) = circuits.get_mut(key.as_str()) {
            if circuit.state == CircuitState::HalfOpen && circuit.probe_in_flight {
                debug!("Circuit breaker: probe for '{}' released uncounted", key);
                circuit.probe_in_flight = false;
            }
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`CircuitError::Open`] without invoking `operation` when the
    /// circuit rejects the call. Recoverable failures count toward opening the
    /// circuit; non-recoverable ones are passed through uncounted.
    pub fn call<T, F>(&self, key: &FetchKey, operation: F) -> Result<T, CircuitError>
    where
        F: FnOnce() -> Result<T, Failure>,
    {
        self.acquire(key)?;
        match operation() {
            Ok(value) => {
                self.record_success(key);
                Ok(value)
            }
            Err(failure) => {
                if failure.is_recoverable() {
                    self.record_failure(key);
                } else {
                    self.release(key);
                }
                Err(CircuitError::Failed(failure))
            }
        }
    }

    /// Get the current state for `key`.
    ///
    /// An Open circuit whose cooldown has elapsed still reports Open until
    /// the next call arrives.
    pub fn state(&self, key: &FetchKey) -> CircuitState {
        self.lock_circuits()
            .get(key.as_str())
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Get the consecutive failure count for `key`.
    pub fn consecutive_failures(&self, key: &FetchKey) -> u32 {
        self.lock_circuits()
            .get(key.as_str())
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
    }

    /// Reset the circuit for `key` to Closed.
    pub fn reset(&self, key: &FetchKey) {
        let mut circuits = self.lock_circuits();
        if let Some(circuit) = circuits.get_mut(key.as_str()) {
            info!("Circuit breaker: manually resetting circuit for '{}'", key);
            circuit.close();
        }
    }

    /// Reset all circuits to their initial state.
    pub fn reset_all(&self) {
        self.lock_circuits().clear();
        info!("Circuit breaker: all circuits reset");
    }

    /// Get metrics for all tracked keys, sorted by key.
    pub fn metrics(&self) -> Vec<CircuitMetrics> {
        let now = self.clock.now();
        let circuits = self.lock_circuits();

        let mut metrics: Vec<CircuitMetrics> = circuits
            .iter()
            .map(|(key, circuit)| CircuitMetrics {
                key: key.clone(),
                state: circuit.state,
                consecutive_failures: circuit.consecutive_failures,
                retry_in_secs: match (circuit.state, circuit.opened_at) {
                    (CircuitState::Open, Some(opened_at)) => Some(
                        self.config
                            .timeout
                            .saturating_sub(now.duration_since(opened_at))
                            .as_secs(),
                    ),
                    _ => None,
                },
            })
            .collect();
        metrics.sort_by(|a, b| a.key.cmp(&b.key));
        metrics
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a single circuit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CircuitMetrics {
    pub key: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// Seconds until an open circuit admits a probe.
    pub retry_in_secs: Option<u64>,
}
