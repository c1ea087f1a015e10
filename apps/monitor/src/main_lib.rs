use std::sync::Arc;

use scoreboard_recovery::{
    FetchKey, RecoveryEvent, RecoveryOrchestrator, RecoveryStatus, SystemClock,
};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Config, TeamSelection};
use crate::connectivity::TcpConnectivity;
use crate::feed::Scoreboard;

pub fn init_tracing() {
    let log_format = std::env::var("SCOREBOARD_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub fn build_orchestrator(config: &Config) -> RecoveryOrchestrator<Scoreboard> {
    let connectivity = TcpConnectivity::new(config.probe_addr, config.reconnect_cmd.clone());
    RecoveryOrchestrator::new(
        config.recovery.clone(),
        Arc::new(SystemClock),
        Arc::new(connectivity),
    )
}

pub fn tracked_keys(teams: &[TeamSelection]) -> Vec<(FetchKey, TeamSelection)> {
    teams
        .iter()
        .map(|selection| (FetchKey::team(&selection.team, &selection.league), selection.clone()))
        .collect()
}

pub fn handle_event(event: RecoveryEvent) {
    match event {
        RecoveryEvent::ReconnectProbe { offline } => {
            tracing::debug!("Reconnect probe after {}s offline", offline.as_secs());
        }
        RecoveryEvent::ConnectivityRestored { offline } => {
            tracing::info!("Back online after {}s", offline.as_secs());
        }
        RecoveryEvent::SwitchToOfflineDisplay { offline } => {
            tracing::warn!(
                "Offline for {}s, display switched to clock",
                offline.as_secs()
            );
        }
        RecoveryEvent::TerminalFailure { key, code } => {
            tracing::error!(key = %key, code = %code, "Display showing error banner");
        }
    }
}

fn render_board(board: &Scoreboard) -> String {
    match &board.game {
        Some(game) => format!(
            "{} {} - {} {} ({})",
            game.away.name, game.away.score, game.home.score, game.home.name, game.status
        ),
        None => format!("{}: no game today", board.team),
    }
}

/// One display line for a status.
pub fn render_status(status: &RecoveryStatus<Scoreboard>) -> String {
    match status {
        RecoveryStatus::Success { data } => render_board(data),
        RecoveryStatus::UsingFallback { data, age } => {
            format!("{} [stale, {}s old]", render_board(data), age.as_secs())
        }
        RecoveryStatus::StillRecovering {
            attempt,
            next_delay,
        } => format!(
            "Recovering (attempt {}, next try in {}s)",
            attempt,
            next_delay.as_secs()
        ),
        RecoveryStatus::NetworkDown { offline } => {
            format!("No network ({}s)", offline.as_secs())
        }
        RecoveryStatus::TerminallyFailed { code, message } => {
            format!("Error {}: {}", code, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{GameLine, TeamScore};
    use chrono::Utc;
    use std::time::Duration;

    fn board() -> Scoreboard {
        Scoreboard {
            league: "NHL".into(),
            team: "Bruins".into(),
            game: Some(GameLine {
                name: "Toronto Maple Leafs at Boston Bruins".into(),
                status: "2nd 10:01".into(),
                home: TeamScore {
                    name: "Boston Bruins".into(),
                    score: "3".into(),
                },
                away: TeamScore {
                    name: "Toronto Maple Leafs".into(),
                    score: "1".into(),
                },
            }),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_fresh_and_stale() {
        let line = render_status(&RecoveryStatus::Success { data: board() });
        assert_eq!(line, "Toronto Maple Leafs 1 - 3 Boston Bruins (2nd 10:01)");

        let line = render_status(&RecoveryStatus::UsingFallback {
            data: board(),
            age: Duration::from_secs(95),
        });
        assert!(line.ends_with("[stale, 95s old]"));
    }

    #[test]
    fn test_render_failures() {
        let line = render_status(&RecoveryStatus::TerminallyFailed {
            code: "CIRCUIT_OPEN".into(),
            message: "Endpoint unavailable".into(),
        });
        assert_eq!(line, "Error CIRCUIT_OPEN: Endpoint unavailable");

        let line = render_status(&RecoveryStatus::NetworkDown {
            offline: Duration::from_secs(42),
        });
        assert_eq!(line, "No network (42s)");
    }

    #[test]
    fn test_tracked_keys() {
        let keys = tracked_keys(&[TeamSelection {
            league: "MLB".into(),
            team: "Chicago Cubs".into(),
        }]);
        assert_eq!(keys[0].0.as_str(), "MLB:Chicago Cubs");
    }
}
