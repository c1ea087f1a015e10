use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use scoreboard_recovery::RecoveryConfig;

const DEFAULT_FEED_URL: &str =
    "https://site.api.espn.com/apis/site/v2/sports/{sport}/{league}/scoreboard";

/// A team the display follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeamSelection {
    pub league: String,
    pub team: String,
}

pub struct Config {
    pub teams: Vec<TeamSelection>,
    /// Feed URL template with `{sport}` and `{league}` placeholders.
    pub feed_url: String,
    pub tick: Duration,
    pub max_ticks: Option<u64>,
    pub request_timeout: Duration,
    pub probe_addr: SocketAddr,
    pub reconnect_cmd: Option<String>,
    pub recovery: RecoveryConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let teams = parse_teams(
            &std::env::var("SCOREBOARD_TEAMS").unwrap_or_else(|_| "NBA:Lakers".into()),
        )?;
        let feed_url =
            std::env::var("SCOREBOARD_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.into());
        let tick_ms: u64 = setting("SCOREBOARD_TICK_MS")?.unwrap_or(1000);
        let max_ticks: Option<u64> = setting("SCOREBOARD_MAX_TICKS")?;
        let timeout_ms: u64 = setting("SCOREBOARD_REQUEST_TIMEOUT_MS")?.unwrap_or(10000);
        let probe_addr: SocketAddr = setting("SCOREBOARD_PROBE_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([8, 8, 8, 8], 53)));
        let reconnect_cmd = std::env::var("SCOREBOARD_RECONNECT_CMD")
            .ok()
            .filter(|cmd| !cmd.trim().is_empty());
        let recovery = match std::env::var("SCOREBOARD_RECOVERY_FILE") {
            Ok(path) => load_recovery_config(Path::new(&path))?,
            Err(_) => RecoveryConfig::default(),
        };
        recovery
            .validate()
            .context("Invalid recovery configuration")?;

        Ok(Self {
            teams,
            feed_url,
            tick: Duration::from_millis(tick_ms.max(1)),
            max_ticks,
            request_timeout: Duration::from_millis(timeout_ms),
            probe_addr,
            reconnect_cmd,
            recovery,
        })
    }
}

fn setting<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    parse_setting(name, raw)
}

/// Parse an optional setting. A value that is present but malformed is an
/// error rather than a silent default.
fn parse_setting<T>(name: &str, raw: Option<String>) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {} '{}'", name, value))
    })
    .transpose()
}

/// Parse `LEAGUE:Team` pairs separated by commas.
pub fn parse_teams(raw: &str) -> anyhow::Result<Vec<TeamSelection>> {
    let mut teams = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((league, team)) = entry.split_once(':') else {
            bail!("Invalid team '{}', expected LEAGUE:Team", entry);
        };
        let (league, team) = (league.trim(), team.trim());
        if league.is_empty() || team.is_empty() {
            bail!("Invalid team '{}', expected LEAGUE:Team", entry);
        }
        teams.push(TeamSelection {
            league: league.to_uppercase(),
            team: team.to_string(),
        });
    }
    if teams.is_empty() {
        bail!("SCOREBOARD_TEAMS selects no teams");
    }
    Ok(teams)
}

fn load_recovery_config(path: &Path) -> anyhow::Result<RecoveryConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read recovery config {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse recovery config {}", path.display()))
}
