//! Recovery models
//!
//! This module contains the values exchanged with the host loop:
//! - `key` - Per-entity key partitioning all recovery state (FetchKey)
//! - `status` - What the display should show for a key (RecoveryStatus)
//! - `event` - One-shot signals raised during a tick (RecoveryEvent)

mod event;
mod key;
mod status;

pub use event::RecoveryEvent;
pub use key::FetchKey;
pub use status::RecoveryStatus;
