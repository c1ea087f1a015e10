//! Failure taxonomy and retry classification for the recovery crate.
//!
//! This module provides:
//! - [`Failure`]: The classified error value raised by fetch operations
//! - [`FailureKind`]: The kind discriminant with kind-specific context
//! - [`CircuitError`]: The result of a breaker-guarded call, separating
//!   "did not try" from "tried and failed"
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Error code used when a breaker rejection is reported as a failure.
pub const CIRCUIT_OPEN_CODE: &str = "CIRCUIT_OPEN";

/// The kind of a [`Failure`], carrying kind-specific context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Network connectivity is unavailable or the connection failed.
    Network,

    /// An API request failed (timeout, bad status, rate limit).
    Api {
        /// HTTP status code, when one was received.
        status_code: Option<u16>,
    },

    /// The response was received but is missing required fields.
    DataValidation {
        /// Paths of the fields that were missing.
        missing_fields: BTreeSet<String>,
    },

    /// Fetching data for a specific team or league failed.
    DataFetch {
        team: Option<String>,
        league: Option<String>,
    },

    /// Configuration is invalid. Retrying cannot help.
    Configuration {
        /// Name of the offending setting.
        setting_name: Option<String>,
    },
}

impl FailureKind {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Network => "NetworkError",
            Self::Api { .. } => "APIError",
            Self::DataValidation { .. } => "DataValidationError",
            Self::DataFetch { .. } => "DataFetchError",
            Self::Configuration { .. } => "ConfigurationError",
        }
    }

    /// Whether failures of this kind are recoverable unless overridden.
    pub fn default_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration { .. })
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified failure raised by a fetch operation.
///
/// Failures are immutable values: they are built once where the problem is
/// detected and then only moved or cloned. A higher layer that wants to
/// describe the problem in its own terms re-wraps the original with
/// [`caused_by`](Self::caused_by); the original stays reachable as the
/// error source, error code included.
#[derive(Error, Clone, Debug, PartialEq)]
#[error("{message} ({error_code})")]
pub struct Failure {
    kind: FailureKind,
    message: String,
    error_code: String,
    recoverable: bool,
    #[source]
    cause: Option<Box<Failure>>,
}

impl Failure {
    fn build(kind: FailureKind, message: impl Into<String>, error_code: String) -> Self {
        let recoverable = kind.default_recoverable();
        Self {
            kind,
            message: message.into(),
            error_code,
            recoverable,
            cause: None,
        }
    }

    /// Network connectivity is unavailable.
    pub fn network(message: impl Into<String>) -> Self {
        Self::build(FailureKind::Network, message, "NET_UNREACHABLE".to_string())
    }

    /// An API request failed, optionally with the HTTP status received.
    pub fn api(message: impl Into<String>, status_code: Option<u16>) -> Self {
        let code = match status_code {
            Some(status) => format!("API_ERROR_{}", status),
            None => "API_ERROR_UNKNOWN".to_string(),
        };
        Self::build(FailureKind::Api { status_code }, message, code)
    }

    /// A response was missing required fields.
    pub fn validation<I, S>(message: impl Into<String>, missing_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let missing_fields = missing_fields.into_iter().map(Into::into).collect();
        Self::build(
            FailureKind::DataValidation { missing_fields },
            message,
            "DATA_VALIDATION_FAILED".to_string(),
        )
    }

    /// Fetching data for a team or league failed.
    pub fn data_fetch(
        message: impl Into<String>,
        team: Option<&str>,
        league: Option<&str>,
    ) -> Self {
        let code = format!("DATA_FETCH_FAILED_{}", league.unwrap_or("UNKNOWN"));
        Self::build(
            FailureKind::DataFetch {
                team: team.map(str::to_string),
                league: league.map(str::to_string),
            },
            message,
            code,
        )
    }

    /// A setting is invalid. Never recoverable by default.
    pub fn configuration(message: impl Into<String>, setting_name: Option<&str>) -> Self {
        let code = format!("CONFIG_ERROR_{}", setting_name.unwrap_or("UNKNOWN"));
        Self::build(
            FailureKind::Configuration {
                setting_name: setting_name.map(str::to_string),
            },
            message,
            code,
        )
    }

    /// Replace the machine-readable error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = code.into();
        self
    }

    /// Override the recoverability implied by the kind.
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Attach the lower-layer failure this one re-describes.
    pub fn caused_by(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> &FailureKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// The wrapped lower-layer failure, if any.
    pub fn cause(&self) -> Option<&Failure> {
        self.cause.as_deref()
    }

    /// HTTP status code for API failures.
    pub fn status_code(&self) -> Option<u16> {
        match &self.kind {
            FailureKind::Api { status_code } => *status_code,
            _ => None,
        }
    }

    /// Missing field paths for validation failures.
    pub fn missing_fields(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            FailureKind::DataValidation { missing_fields } => Some(missing_fields),
            _ => None,
        }
    }

    /// Error codes of this failure and every wrapped cause, outermost first.
    pub fn error_codes(&self) -> Vec<&str> {
        let mut codes = vec![self.error_code.as_str()];
        let mut next = self.cause();
        while let Some(cause) = next {
            codes.push(cause.error_code.as_str());
            next = cause.cause();
        }
        codes
    }

    /// Returns the retry classification for this failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use scoreboard_recovery::errors::{Failure, RetryClass};
    ///
    /// let failure = Failure::api("Gateway timeout", Some(504));
    /// assert_eq!(failure.retry_class(), RetryClass::WithBackoff);
    ///
    /// let failure = Failure::configuration("No teams selected", Some("teams"));
    /// assert_eq!(failure.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        if self.recoverable {
            RetryClass::WithBackoff
        } else {
            RetryClass::Never
        }
    }
}

/// Outcome of a call guarded by the circuit breaker.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum CircuitError {
    /// The breaker is open for this key. The operation was not invoked.
    #[error("Circuit open: {key} (retry in {retry_in:?})")]
    Open {
        /// The key whose circuit is open
        key: String,
        /// Time left until the breaker admits a probe
        retry_in: Duration,
    },

    /// The operation was invoked and failed.
    #[error(transparent)]
    Failed(#[from] Failure),
}

impl CircuitError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Open { .. } => RetryClass::CircuitOpen,
            Self::Failed(failure) => failure.retry_class(),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Describe the outcome as a [`Failure`] for status reporting.
    ///
    /// A rejection becomes a recoverable API failure coded `CIRCUIT_OPEN`.
    pub fn into_failure(self) -> Failure {
        match self {
            Self::Open { key, .. } => Failure::api(
                format!("Circuit breaker for '{}' is open. Endpoint unavailable.", key),
                None,
            )
            .with_code(CIRCUIT_OPEN_CODE),
            Self::Failed(failure) => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_network_error_is_recoverable() {
        let failure = Failure::network("No route to host");
        assert!(failure.is_recoverable());
        assert_eq!(failure.error_code(), "NET_UNREACHABLE");
        assert_eq!(failure.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_network_error_code_can_be_overridden() {
        let failure = Failure::network("Interface down").with_code("NET_DOWN");
        assert_eq!(failure.error_code(), "NET_DOWN");
        assert_eq!(failure.kind(), &FailureKind::Network);
    }

    #[test]
    fn test_api_error_carries_status() {
        let failure = Failure::api("Service unavailable", Some(503));
        assert_eq!(failure.status_code(), Some(503));
        assert_eq!(failure.error_code(), "API_ERROR_503");

        let failure = Failure::api("Timed out", None);
        assert_eq!(failure.status_code(), None);
        assert_eq!(failure.error_code(), "API_ERROR_UNKNOWN");
    }

    #[test]
    fn test_validation_error_collects_missing_fields() {
        let failure = Failure::validation("Missing competitors", ["status", "competitors", "status"]);
        let missing = failure.missing_fields().unwrap();
        assert_eq!(missing.len(), 2);
        assert!(missing.contains("competitors"));
        assert_eq!(failure.error_code(), "DATA_VALIDATION_FAILED");
        assert!(failure.is_recoverable());
    }

    #[test]
    fn test_data_fetch_error_code_uses_league() {
        let failure = Failure::data_fetch("No data", Some("Lakers"), Some("NBA"));
        assert_eq!(failure.error_code(), "DATA_FETCH_FAILED_NBA");
        assert_eq!(
            failure.kind(),
            &FailureKind::DataFetch {
                team: Some("Lakers".to_string()),
                league: Some("NBA".to_string()),
            }
        );

        let failure = Failure::data_fetch("No data", None, None);
        assert_eq!(failure.error_code(), "DATA_FETCH_FAILED_UNKNOWN");
    }

    #[test]
    fn test_configuration_error_never_retries() {
        let failure = Failure::configuration("Unknown league", Some("league"));
        assert!(!failure.is_recoverable());
        assert_eq!(failure.error_code(), "CONFIG_ERROR_league");
        assert_eq!(failure.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_recoverable_override() {
        let failure = Failure::api("Invalid API key", Some(401)).with_recoverable(false);
        assert_eq!(failure.retry_class(), RetryClass::Never);

        let failure = Failure::configuration("Transient settings reload", None).with_recoverable(true);
        assert_eq!(failure.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_wrapping_preserves_inner_code() {
        let inner = Failure::validation("Event missing status", ["status"]);
        let outer = Failure::api("NBA API returned bad data", Some(200))
            .with_code("NBA_API_ERROR")
            .caused_by(inner.clone());

        assert_eq!(outer.error_codes(), vec!["NBA_API_ERROR", "DATA_VALIDATION_FAILED"]);
        assert_eq!(outer.cause(), Some(&inner));

        let source = outer.source().expect("wrapped failure exposes its source");
        assert_eq!(source.to_string(), inner.to_string());
    }

    #[test]
    fn test_error_display() {
        let failure = Failure::api("Rate limited", Some(429));
        assert_eq!(format!("{}", failure), "Rate limited (API_ERROR_429)");

        let error = CircuitError::Open {
            key: "NBA:Lakers".to_string(),
            retry_in: Duration::from_secs(5),
        };
        assert_eq!(format!("{}", error), "Circuit open: NBA:Lakers (retry in 5s)");
    }

    #[test]
    fn test_circuit_open_is_distinct_from_failure() {
        let open = CircuitError::Open {
            key: "NHL:Bruins".to_string(),
            retry_in: Duration::ZERO,
        };
        assert!(open.is_open());
        assert_eq!(open.retry_class(), RetryClass::CircuitOpen);

        let failed = CircuitError::from(Failure::network("down"));
        assert!(!failed.is_open());
        assert_eq!(failed.retry_class(), RetryClass::WithBackoff);
    }

    #[test]
    fn test_circuit_rejection_as_failure() {
        let open = CircuitError::Open {
            key: "MLB:Cubs".to_string(),
            retry_in: Duration::from_secs(30),
        };
        let failure = open.into_failure();
        assert_eq!(failure.error_code(), CIRCUIT_OPEN_CODE);
        assert!(failure.message().contains("MLB:Cubs"));
        assert!(failure.is_recoverable());
    }
}
