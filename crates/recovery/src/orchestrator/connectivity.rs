/// Device-level network check.
///
/// Consulted only when a fetch is due, so implementations may do real I/O
/// (a short TCP connect, an interface query) without slowing idle ticks.
pub trait Connectivity: Send + Sync {
    /// Whether the device currently has a usable network connection.
    fn is_connected(&self) -> bool;

    /// Try to bring the connection back. Called once per offline probe,
    /// before [`is_connected`](Self::is_connected).
    fn reconnect(&self) {}
}

/// Connectivity that is never lost. For hosts without a network probe.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}
