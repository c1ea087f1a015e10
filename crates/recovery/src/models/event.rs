use std::time::Duration;

use super::FetchKey;

/// One-shot signal raised while handling a tick.
///
/// Statuses describe the steady state; events describe edges the host may
/// want to act on exactly once.
#[derive(Clone, Debug, PartialEq)]
pub enum RecoveryEvent {
    /// A reconnection probe was just attempted.
    ReconnectProbe { offline: Duration },

    /// Connectivity came back after an offline episode.
    ConnectivityRestored { offline: Duration },

    /// The device has been offline long enough that the display should switch
    /// to its neutral screen. Raised once per offline episode.
    SwitchToOfflineDisplay { offline: Duration },

    /// A key entered `TerminallyFailed`.
    TerminalFailure { key: FetchKey, code: String },
}
