//! Payload validation.
//!
//! A fetch that returns a structurally incomplete payload is treated as a
//! failed attempt: the validator runs before anything is cached, so a partial
//! response never replaces a good fallback entry.

use log::{debug, warn};
use serde_json::Value;

use crate::errors::Failure;

/// Checks a fetched payload before it is used or cached.
pub trait PayloadValidator<T>: Send + Sync {
    /// Returns a `DataValidation` failure when the payload is unusable.
    fn validate(&self, payload: &T) -> Result<(), Failure>;
}

impl<T, F> PayloadValidator<T> for F
where
    F: Fn(&T) -> Result<(), Failure> + Send + Sync,
{
    fn validate(&self, payload: &T) -> Result<(), Failure> {
        self(payload)
    }
}

/// Validates that a JSON payload contains a set of field paths.
///
/// Paths are dotted; numeric segments index into arrays, so
/// `competitors.1.team.displayName` requires a second competitor with a
/// team display name. Every missing path is reported in one failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequiredFields {
    label: String,
    fields: Vec<String>,
}

impl RequiredFields {
    pub fn new<I, S>(label: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// ESPN scoreboard response for a league.
    pub fn espn_scoreboard(league: &str) -> Self {
        Self::new(format!("ESPN {} scoreboard", league), ["events"])
    }

    /// ESPN event with at least one competition between two teams.
    pub fn espn_event(league: &str) -> Self {
        Self::new(
            format!("ESPN {} event", league),
            [
                "name",
                "status",
                "competitions.0.date",
                "competitions.0.status",
                "competitions.0.competitors.0.team.displayName",
                "competitions.0.competitors.0.score",
                "competitions.0.competitors.1.team.displayName",
                "competitions.0.competitors.1.score",
            ],
        )
    }

    /// MLB StatsAPI live game feed.
    pub fn mlb_game(team: &str) -> Self {
        Self::new(
            format!("MLB game data for {}", team),
            [
                "gameData.datetime",
                "gameData.status",
                "gameData.teams.home",
                "gameData.teams.away",
                "liveData.plays",
            ],
        )
    }

    /// NHL boxscore.
    pub fn nhl_boxscore(team: &str) -> Self {
        Self::new(
            format!("NHL boxscore for {}", team),
            [
                "gameState",
                "period",
                "homeTeam.teamName",
                "homeTeam.score",
                "awayTeam.teamName",
                "awayTeam.score",
            ],
        )
    }

    /// NBA live scoreboard game.
    pub fn nba_game(team: &str) -> Self {
        Self::new(
            format!("NBA game data for {}", team),
            [
                "gameId",
                "gameTimeUTC",
                "homeTeam.teamName",
                "homeTeam.score",
                "awayTeam.teamName",
                "awayTeam.score",
            ],
        )
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Paths absent from `payload`, in declaration order.
    pub fn missing(&self, payload: &Value) -> Vec<String> {
        self.fields
            .iter()
            .filter(|path| lookup(payload, path).is_none())
            .cloned()
            .collect()
    }
}

impl PayloadValidator<Value> for RequiredFields {
    fn validate(&self, payload: &Value) -> Result<(), Failure> {
        let missing = self.missing(payload);
        if missing.is_empty() {
            debug!("Validated {}", self.label);
            return Ok(());
        }

        warn!(
            "{} missing required fields: {}",
            self.label,
            missing.join(", ")
        );
        Err(Failure::validation(
            format!("{} missing required fields", self.label),
            missing,
        ))
    }
}

/// Resolve a dotted path. Null values count as missing.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let found = path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })?;
    (!found.is_null()).then_some(found)
}
