//! Tick-driven recovery policy.
//!
//! [`RecoveryOrchestrator::attempt_fetch`] is called by the display loop once
//! per tick for every key it shows. Each call either returns the stored status
//! untouched (nothing is due) or performs at most one fetch and decides the
//! next visible state:
//!
//! ```text
//!  Idle/Fresh --due--> acquire breaker --rejected--> failed cycle
//!                           |
//!                           v
//!                      fetch + validate --ok--> Success (cache, Fresh)
//!                           |
//!                      record_failure(retry)
//!                        |       |        |
//!                  RetryAfter  Exhausted  Aborted
//!                        |       |        |
//!                  Retrying   failed     TerminallyFailed
//!                             cycle
//!
//!  failed cycle: fallback? -> UsingFallback
//!                ceiling?  -> TerminallyFailed
//!                otherwise -> StillRecovering   (next cycle after recovery_interval)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;

use super::{Connectivity, RecoveryConfig};
use crate::clock::Clock;
use crate::errors::Failure;
use crate::models::{FetchKey, RecoveryEvent, RecoveryStatus};
use crate::registry::{CircuitBreaker, FallbackCache, PayloadValidator};
use crate::retry::{RetryDecision, RetryState};

/// Counters describing what the orchestrator has done since construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    pub fetch_attempts: u64,
    pub successes: u64,
    pub retries_scheduled: u64,
    pub circuit_rejections: u64,
    pub fallbacks_served: u64,
    pub terminal_failures: u64,
    pub offline_episodes: u64,
}

#[derive(Clone, Debug)]
enum Phase {
    /// Never fetched, or restarted from scratch.
    Idle,
    /// Last fetch succeeded.
    Fresh { next_fetch_at: Instant },
    /// Inside a retry sequence; the breaker call is still outstanding.
    Retrying(RetryState),
    /// A recovery cycle failed; the next one starts at `next_cycle_at`.
    Waiting { next_cycle_at: Instant },
    /// Gave up. Restarts from scratch at `until`.
    Terminal { until: Instant },
}

impl Phase {
    fn is_due(&self, now: Instant) -> bool {
        match self {
            Self::Idle => true,
            Self::Fresh { next_fetch_at } => now >= *next_fetch_at,
            Self::Retrying(state) => state.is_due(now),
            Self::Waiting { next_cycle_at } => now >= *next_cycle_at,
            Self::Terminal { until } => now >= *until,
        }
    }
}

struct KeyRecord<T> {
    phase: Phase,
    /// Failed recovery cycles since the last success.
    recovery_attempts: u32,
    recovery_started: Option<Instant>,
    last_failure: Option<Failure>,
    status: Option<RecoveryStatus<T>>,
}

impl<T> KeyRecord<T> {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            recovery_attempts: 0,
            recovery_started: None,
            last_failure: None,
            status: None,
        }
    }

    /// Forget recovery progress. The last status is kept for display.
    fn restart(&mut self) {
        self.phase = Phase::Idle;
        self.recovery_attempts = 0;
        self.recovery_started = None;
        self.last_failure = None;
    }

    /// Restart, handing back the breaker call an unfinished retry sequence
    /// still holds. Otherwise a half-open probe would stay in flight forever.
    fn abandon(&mut self, key: &FetchKey, breaker: &CircuitBreaker) {
        if matches!(self.phase, Phase::Retrying(_)) {
            breaker.release(key);
        }
        self.restart();
    }

    fn recovering_for(&self, now: Instant) -> Duration {
        self.recovery_started
            .map_or(Duration::ZERO, |started| now.duration_since(started))
    }
}

struct OfflineEpisode {
    since: Instant,
    last_probe: Instant,
    display_switched: bool,
}

/// Composes the circuit breaker, retry policy and fallback cache into the
/// policy driven by the display loop.
///
/// Owns every piece of per-key state, so independent instances never share
/// anything (useful for tests and for running several displays).
pub struct RecoveryOrchestrator<T> {
    config: RecoveryConfig,
    clock: Arc<dyn Clock>,
    connectivity: Arc<dyn Connectivity>,
    breaker: CircuitBreaker,
    cache: FallbackCache<T>,
    validator: Option<Box<dyn PayloadValidator<T>>>,
    records: HashMap<FetchKey, KeyRecord<T>>,
    offline: Option<OfflineEpisode>,
    stats: RecoveryStats,
}

impl<T: Clone> RecoveryOrchestrator<T> {
    /// Build an orchestrator. The configuration is used as given; call
    /// [`RecoveryConfig::validate`] first when it comes from user input.
    pub fn new(
        config: RecoveryConfig,
        clock: Arc<dyn Clock>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            breaker: CircuitBreaker::with_clock(config.circuit.clone(), clock.clone()),
            cache: FallbackCache::with_clock(clock.clone()),
            config,
            clock,
            connectivity,
            validator: None,
            records: HashMap::new(),
            offline: None,
            stats: RecoveryStats::default(),
        }
    }

    /// Check every fetched payload before it is reported or cached.
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: PayloadValidator<T> + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> &FallbackCache<T> {
        &self.cache
    }

    pub fn stats(&self) -> &RecoveryStats {
        &self.stats
    }

    pub fn is_offline(&self) -> bool {
        self.offline.is_some()
    }

    /// Status reported for `key` on its most recent tick.
    pub fn status(&self, key: &FetchKey) -> Option<&RecoveryStatus<T>> {
        self.records.get(key).and_then(|record| record.status.as_ref())
    }

    /// Make the next tick for `key` fetch immediately, with recovery counters
    /// cleared. Breaker state is left alone.
    pub fn reset(&mut self, key: &FetchKey) {
        if let Some(record) = self.records.get_mut(key) {
            info!("Recovery state for '{}' reset", key);
            record.abandon(key, &self.breaker);
        }
    }

    /// Drop all state for a key the display no longer polls.
    pub fn forget(&mut self, key: &FetchKey) {
        if let Some(mut record) = self.records.remove(key) {
            record.abandon(key, &self.breaker);
            debug!("Stopped tracking '{}'", key);
        }
    }

    /// Drive one tick for `key`.
    ///
    /// `fetch` is invoked at most once, and only if something is due.
    /// `on_tick` receives the one-shot events raised during this tick.
    pub fn attempt_fetch<F, E>(
        &mut self,
        key: &FetchKey,
        fetch: F,
        mut on_tick: E,
    ) -> RecoveryStatus<T>
    where
        F: FnOnce() -> Result<T, Failure>,
        E: FnMut(RecoveryEvent),
    {
        let now = self.clock.now();

        let mut connectivity_checked = false;
        if self.offline.is_some() {
            match self.poll_offline(now, &mut on_tick) {
                Some(status) => return self.store(key, status),
                None => connectivity_checked = true,
            }
        }

        let mut record = self.records.remove(key).unwrap_or_else(KeyRecord::new);
        let status = self.tick(key, &mut record, now, connectivity_checked, fetch, &mut on_tick);
        record.status = Some(status.clone());
        self.records.insert(key.clone(), record);
        status
    }

    fn store(&mut self, key: &FetchKey, status: RecoveryStatus<T>) -> RecoveryStatus<T> {
        self.records
            .entry(key.clone())
            .or_insert_with(KeyRecord::new)
            .status = Some(status.clone());
        status
    }

    fn tick<F>(
        &mut self,
        key: &FetchKey,
        record: &mut KeyRecord<T>,
        now: Instant,
        connectivity_checked: bool,
        fetch: F,
        on_tick: &mut dyn FnMut(RecoveryEvent),
    ) -> RecoveryStatus<T>
    where
        F: FnOnce() -> Result<T, Failure>,
    {
        if !record.phase.is_due(now) {
            if let Some(status) = &record.status {
                return status.clone();
            }
        }

        if !connectivity_checked && !self.connectivity.is_connected() {
            warn!("Network connectivity lost while fetching '{}'", key);
            self.offline = Some(OfflineEpisode {
                since: now,
                last_probe: now,
                display_switched: false,
            });
            self.stats.offline_episodes += 1;
            return self.offline_status(now, on_tick);
        }

        let mut retry_state = match std::mem::replace(&mut record.phase, Phase::Idle) {
            Phase::Retrying(state) => state,
            previous => {
                if matches!(previous, Phase::Terminal { .. }) {
                    info!("Retrying '{}' from scratch after terminal failure", key);
                    record.restart();
                }
                if let Err(rejection) = self.breaker.acquire(key) {
                    self.stats.circuit_rejections += 1;
                    info!(
                        "Skipping fetch for '{}': {} (recovering for {:.0}s)",
                        key,
                        rejection,
                        record.recovering_for(now).as_secs_f64()
                    );
                    record.recovery_started.get_or_insert(now);
                    return self.failed_cycle(key, record, rejection.into_failure(), now, on_tick);
                }
                RetryState::new()
            }
        };

        self.stats.fetch_attempts += 1;
        let validator = self.validator.as_deref();
        let result = fetch().and_then(|data| {
            if let Some(validator) = validator {
                validator.validate(&data)?;
            }
            Ok(data)
        });

        let failure = match result {
            Ok(data) => return self.succeeded(key, record, data, now),
            Err(failure) => failure,
        };

        record.recovery_started.get_or_insert(now);
        match retry_state.record_failure(&failure, &self.config.retry, now) {
            RetryDecision::RetryAfter(delay) => {
                self.stats.retries_scheduled += 1;
                warn!(
                    "Fetch for '{}' failed: {} [{}]. Attempt {}/{}, retrying in {:.2}s (recovering for {:.0}s)",
                    key,
                    failure,
                    failure.kind(),
                    retry_state.attempt_index(),
                    self.config.retry.max_attempts,
                    delay.as_secs_f64(),
                    record.recovering_for(now).as_secs_f64()
                );
                record.last_failure = Some(failure);
                record.phase = Phase::Retrying(retry_state);
                RecoveryStatus::StillRecovering {
                    attempt: record.recovery_attempts + 1,
                    next_delay: delay,
                }
            }
            RetryDecision::Exhausted => {
                self.breaker.record_failure(key);
                warn!(
                    "Fetch for '{}' failed after {} attempts: {} [{}]",
                    key,
                    self.config.retry.max_attempts,
                    failure,
                    failure.kind()
                );
                self.failed_cycle(key, record, failure, now, on_tick)
            }
            RetryDecision::Aborted => {
                self.breaker.release(key);
                error!(
                    "Non-recoverable failure for '{}': {} [{}]",
                    key,
                    failure,
                    failure.kind()
                );
                self.terminal(key, record, failure, now, on_tick)
            }
        }
    }

    fn succeeded(
        &mut self,
        key: &FetchKey,
        record: &mut KeyRecord<T>,
        data: T,
        now: Instant,
    ) -> RecoveryStatus<T> {
        self.breaker.record_success(key);
        self.cache.cache_data(key, data.clone());
        self.stats.successes += 1;

        if record.recovery_started.is_some() {
            info!(
                "Recovered '{}' after {:.0}s",
                key,
                record.recovering_for(now).as_secs_f64()
            );
        } else {
            debug!("Fetched '{}'", key);
        }

        record.restart();
        record.phase = Phase::Fresh {
            next_fetch_at: now + self.config.refresh_interval,
        };
        RecoveryStatus::Success { data }
    }

    /// A whole recovery cycle failed, either by retry exhaustion or because
    /// the breaker refused the call.
    fn failed_cycle(
        &mut self,
        key: &FetchKey,
        record: &mut KeyRecord<T>,
        failure: Failure,
        now: Instant,
        on_tick: &mut dyn FnMut(RecoveryEvent),
    ) -> RecoveryStatus<T> {
        record.recovery_attempts = record.recovery_attempts.saturating_add(1);

        if let Some(cached) = self.cache.get_cached_data(key, self.config.fallback_max_age) {
            self.stats.fallbacks_served += 1;
            info!(
                "Serving fallback for '{}' ({:.0}s old) after {} [{}], cycle {}",
                key,
                cached.age.as_secs_f64(),
                failure.error_code(),
                failure.kind(),
                record.recovery_attempts
            );
            record.last_failure = Some(failure);
            record.phase = Phase::Waiting {
                next_cycle_at: now + self.config.recovery_interval,
            };
            return RecoveryStatus::UsingFallback {
                data: cached.data,
                age: cached.age,
            };
        }

        if record.recovery_attempts >= self.config.recovery_ceiling {
            return self.terminal(key, record, failure, now, on_tick);
        }

        info!(
            "No fallback for '{}' after {} [{}], cycle {}/{}, next in {:.0}s (recovering for {:.0}s)",
            key,
            failure.error_code(),
            failure.kind(),
            record.recovery_attempts,
            self.config.recovery_ceiling,
            self.config.recovery_interval.as_secs_f64(),
            record.recovering_for(now).as_secs_f64()
        );
        record.last_failure = Some(failure);
        record.phase = Phase::Waiting {
            next_cycle_at: now + self.config.recovery_interval,
        };
        RecoveryStatus::StillRecovering {
            attempt: record.recovery_attempts,
            next_delay: self.config.recovery_interval,
        }
    }

    fn terminal(
        &mut self,
        key: &FetchKey,
        record: &mut KeyRecord<T>,
        failure: Failure,
        now: Instant,
        on_tick: &mut dyn FnMut(RecoveryEvent),
    ) -> RecoveryStatus<T> {
        self.stats.terminal_failures += 1;
        error!(
            "Giving up on '{}' after {} cycles and {:.0}s: {} [{}]",
            key,
            record.recovery_attempts,
            record.recovering_for(now).as_secs_f64(),
            failure,
            failure.kind()
        );

        let code = failure.error_code().to_string();
        let message = failure.message().to_string();
        on_tick(RecoveryEvent::TerminalFailure {
            key: key.clone(),
            code: code.clone(),
        });

        record.last_failure = Some(failure);
        record.phase = Phase::Terminal {
            until: now + self.config.recovery_interval,
        };
        RecoveryStatus::TerminallyFailed { code, message }
    }

    /// Advance the offline episode. Returns `None` once connectivity is back.
    fn poll_offline(
        &mut self,
        now: Instant,
        on_tick: &mut dyn FnMut(RecoveryEvent),
    ) -> Option<RecoveryStatus<T>> {
        let episode = self.offline.as_mut()?;
        let probe_due = now.duration_since(episode.last_probe) >= self.config.offline_probe_interval;

        if probe_due {
            episode.last_probe = now;
            let offline = now.duration_since(episode.since);
            debug!(
                "Probing connectivity ({:.0}s offline)",
                offline.as_secs_f64()
            );
            self.connectivity.reconnect();
            let connected = self.connectivity.is_connected();
            on_tick(RecoveryEvent::ReconnectProbe { offline });

            if connected {
                info!(
                    "Network connectivity restored after {:.0}s",
                    offline.as_secs_f64()
                );
                self.offline = None;
                for (key, record) in self.records.iter_mut() {
                    record.abandon(key, &self.breaker);
                }
                on_tick(RecoveryEvent::ConnectivityRestored { offline });
                return None;
            }
        }

        Some(self.offline_status(now, on_tick))
    }

    fn offline_status(
        &mut self,
        now: Instant,
        on_tick: &mut dyn FnMut(RecoveryEvent),
    ) -> RecoveryStatus<T> {
        let Some(episode) = self.offline.as_mut() else {
            return RecoveryStatus::NetworkDown {
                offline: Duration::ZERO,
            };
        };

        let offline = now.duration_since(episode.since);
        if !episode.display_switched && offline >= self.config.offline_display_switch {
            episode.display_switched = true;
            warn!(
                "Offline for {:.0}s, switching to offline display",
                offline.as_secs_f64()
            );
            on_tick(RecoveryEvent::SwitchToOfflineDisplay { offline });
        }
        RecoveryStatus::NetworkDown { offline }
    }
}
