use std::net::{SocketAddr, TcpStream};
use std::process::Command;
use std::time::Duration;

use scoreboard_recovery::Connectivity;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connectivity check by TCP connect to a well-known address.
pub struct TcpConnectivity {
    probe_addr: SocketAddr,
    reconnect_cmd: Option<String>,
}

impl TcpConnectivity {
    pub fn new(probe_addr: SocketAddr, reconnect_cmd: Option<String>) -> Self {
        Self {
            probe_addr,
            reconnect_cmd,
        }
    }
}

impl Connectivity for TcpConnectivity {
    fn is_connected(&self) -> bool {
        TcpStream::connect_timeout(&self.probe_addr, PROBE_TIMEOUT).is_ok()
    }

    fn reconnect(&self) {
        let Some(cmd) = &self.reconnect_cmd else {
            return;
        };
        match Command::new("sh").arg("-c").arg(cmd).status() {
            Ok(status) if status.success() => tracing::info!("Reconnect command finished"),
            Ok(status) => tracing::warn!("Reconnect command exited with {}", status),
            Err(e) => tracing::warn!("Failed to run reconnect command: {}", e),
        }
    }
}
