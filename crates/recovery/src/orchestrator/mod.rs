//! Recovery orchestration.
//!
//! This module provides the composition point driven by the display loop:
//! - [`RecoveryOrchestrator`]: per-key recovery state machine
//! - [`RecoveryConfig`]: every tunable of the policy, serde-loadable
//! - [`Connectivity`]: device-level network check with reconnect hook

mod config;
mod connectivity;
mod orchestrator;

pub use config::RecoveryConfig;
pub use connectivity::{AlwaysOnline, Connectivity};
pub use orchestrator::{RecoveryOrchestrator, RecoveryStats};
