use std::time::Duration;

/// What the display should show for a key on this tick.
///
/// The display maps each variant to a visible state: normal display, a
/// stale-data banner, a "recovering" indicator, the clock screen, or an
/// error banner.
#[derive(Clone, Debug, PartialEq)]
pub enum RecoveryStatus<T> {
    /// Fresh data from the fetch operation.
    Success { data: T },

    /// The fetch is failing; this is the last good payload and its age.
    UsingFallback { data: T, age: Duration },

    /// Recovery is in progress and nothing usable is cached.
    StillRecovering {
        /// Recovery attempt in progress (1-based).
        attempt: u32,
        /// Delay before the next scheduled attempt.
        next_delay: Duration,
    },

    /// The device has no network connection.
    NetworkDown { offline: Duration },

    /// Recovery gave up. Carries the last failure's code and message.
    TerminallyFailed { code: String, message: String },
}

impl<T> RecoveryStatus<T> {
    /// Stable tag for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Success { .. } => "Success",
            Self::UsingFallback { .. } => "UsingFallback",
            Self::StillRecovering { .. } => "StillRecovering",
            Self::NetworkDown { .. } => "NetworkDown",
            Self::TerminallyFailed { .. } => "TerminallyFailed",
        }
    }

    /// Displayable data, fresh or stale.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } | Self::UsingFallback { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Age of the fallback payload in whole seconds.
    pub fn fallback_age_secs(&self) -> Option<u64> {
        match self {
            Self::UsingFallback { age, .. } => Some(age.as_secs()),
            _ => None,
        }
    }
}
