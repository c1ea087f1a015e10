/// Classification for retry policy.
///
/// Used to determine how the orchestrator should respond to a failed call.
///
/// # Behavior Summary
///
/// | Class | Retry? | Record Circuit Breaker Failure? | Serve Fallback? |
/// |-------|--------|--------------------------------|-----------------|
/// | `Never` | No | No | No |
/// | `WithBackoff` | Yes, until attempts run out | Yes, on exhaustion | Yes, on exhaustion |
/// | `CircuitOpen` | Not now (next recovery cycle) | No (already recorded) | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - invalid configuration or another failure marked
    /// non-recoverable. Retrying won't help, so the failure is surfaced
    /// immediately.
    Never,

    /// Transient failure: network hiccup, API error, malformed payload.
    ///
    /// The call is retried with exponential backoff. If every attempt fails,
    /// the whole sequence counts as one failure for the circuit breaker.
    WithBackoff,

    /// Circuit breaker is open for this key.
    /// The operation was not invoked.
    CircuitOpen,
}
