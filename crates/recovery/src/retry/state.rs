use std::future::Future;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use super::RetryConfig;
use crate::errors::{Failure, RetryClass};

/// What to do after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once the delay has elapsed.
    RetryAfter(Duration),
    /// The attempt ceiling was reached.
    Exhausted,
    /// The failure is not recoverable. Retrying cannot help.
    Aborted,
}

/// Progress through one retry sequence.
///
/// The wait between attempts is a deadline on the monotonic clock rather than
/// a sleep, so a caller driven by periodic ticks can check [`is_due`] and move
/// on without blocking.
///
/// [`is_due`]: RetryState::is_due
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    attempt_index: u32,
    next_deadline: Option<Instant>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next attempt (0 for the first).
    pub fn attempt_index(&self) -> u32 {
        self.attempt_index
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    /// Whether the next attempt may run at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_deadline.map_or(true, |deadline| now >= deadline)
    }

    /// Record a failed attempt and decide whether to try again.
    pub fn record_failure(
        &mut self,
        failure: &Failure,
        config: &RetryConfig,
        now: Instant,
    ) -> RetryDecision {
        if failure.retry_class() == RetryClass::Never {
            self.next_deadline = None;
            return RetryDecision::Aborted;
        }
        if self.attempt_index.saturating_add(1) >= config.max_attempts {
            self.next_deadline = None;
            return RetryDecision::Exhausted;
        }

        let delay = config.delay_for(self.attempt_index);
        self.attempt_index += 1;
        self.next_deadline = Some(now + delay);
        RetryDecision::RetryAfter(delay)
    }
}

/// Run `operation` until it succeeds, fails non-recoverably, or runs out of
/// attempts, waiting between attempts with `sleep`.
///
/// The operation is invoked at most `config.max_attempts` times. On
/// exhaustion the last failure is returned unchanged.
pub fn retry_with_backoff<T, F, S>(
    config: &RetryConfig,
    mut operation: F,
    mut sleep: S,
) -> Result<T, Failure>
where
    F: FnMut() -> Result<T, Failure>,
    S: FnMut(Duration),
{
    let mut state = RetryState::new();
    loop {
        let attempt = state.attempt_index() + 1;
        match operation() {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(failure) => match state.record_failure(&failure, config, Instant::now()) {
                RetryDecision::RetryAfter(delay) => {
                    log_retry(attempt, config, &failure, delay);
                    sleep(delay);
                }
                RetryDecision::Exhausted => {
                    log_exhausted(config, &failure);
                    return Err(failure);
                }
                RetryDecision::Aborted => {
                    log_aborted(&failure);
                    return Err(failure);
                }
            },
        }
    }
}

/// Async variant of [`retry_with_backoff`], waiting with `tokio::time::sleep`.
pub async fn retry_with_backoff_async<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, Failure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let mut state = RetryState::new();
    loop {
        let attempt = state.attempt_index() + 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(failure) => match state.record_failure(&failure, config, Instant::now()) {
                RetryDecision::RetryAfter(delay) => {
                    log_retry(attempt, config, &failure, delay);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Exhausted => {
                    log_exhausted(config, &failure);
                    return Err(failure);
                }
                RetryDecision::Aborted => {
                    log_aborted(&failure);
                    return Err(failure);
                }
            },
        }
    }
}

fn log_retry(attempt: u32, config: &RetryConfig, failure: &Failure, delay: Duration) {
    warn!(
        "Attempt {}/{} failed: {} [{}]. Retrying in {:.2}s",
        attempt,
        config.max_attempts,
        failure,
        failure.kind(),
        delay.as_secs_f64()
    );
}

fn log_exhausted(config: &RetryConfig, failure: &Failure) {
    error!(
        "All {} attempts failed. Last error: {} [{}]",
        config.max_attempts,
        failure,
        failure.kind()
    );
}

fn log_aborted(failure: &Failure) {
    warn!(
        "Non-recoverable failure, not retrying: {} [{}]",
        failure,
        failure.kind()
    );
}
