//! Score feed client.
//!
//! Every problem is reported as a [`Failure`] so the recovery core can decide
//! what to do with it: transport errors are network failures, bad statuses are
//! API failures, and malformed bodies are validation failures. All of them are
//! wrapped in a data-fetch failure naming the team and league.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use scoreboard_recovery::{Failure, PayloadValidator, RequiredFields};
use serde::Serialize;
use serde_json::Value;

use crate::config::TeamSelection;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TeamScore {
    pub name: String,
    pub score: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameLine {
    pub name: String,
    pub status: String,
    pub home: TeamScore,
    pub away: TeamScore,
}

/// What the display shows for one team.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Scoreboard {
    pub league: String,
    pub team: String,
    /// `None` when the team has no game on the board.
    pub game: Option<GameLine>,
    pub fetched_at: DateTime<Utc>,
}

pub struct ScoreFeed {
    client: Client,
    url_template: String,
}

impl ScoreFeed {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    pub fn fetch(&self, selection: &TeamSelection) -> Result<Scoreboard, Failure> {
        self.fetch_payload(selection)
            .and_then(|payload| extract_game(&payload, selection))
            .map(|game| Scoreboard {
                league: selection.league.clone(),
                team: selection.team.clone(),
                game,
                fetched_at: Utc::now(),
            })
            .map_err(|inner| {
                Failure::data_fetch(
                    format!(
                        "Failed to fetch {} data for {}",
                        selection.league, selection.team
                    ),
                    Some(selection.team.as_str()),
                    Some(selection.league.as_str()),
                )
                .with_recoverable(inner.is_recoverable())
                .caused_by(inner)
            })
    }

    fn fetch_payload(&self, selection: &TeamSelection) -> Result<Value, Failure> {
        let url = feed_url(&self.url_template, &selection.league)?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).send().map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }
        response.json::<Value>().map_err(|e| {
            Failure::validation(format!("Response body is not valid JSON: {}", e), ["body"])
        })
    }
}

fn sport_for(league: &str) -> Option<&'static str> {
    match league {
        "NBA" | "WNBA" => Some("basketball"),
        "NHL" => Some("hockey"),
        "NFL" => Some("football"),
        "MLB" => Some("baseball"),
        _ => None,
    }
}

fn feed_url(template: &str, league: &str) -> Result<String, Failure> {
    let sport = sport_for(league).ok_or_else(|| {
        Failure::configuration(format!("Unsupported league '{}'", league), Some("league"))
    })?;
    Ok(template
        .replace("{sport}", sport)
        .replace("{league}", &league.to_lowercase()))
}

fn classify_transport(error: reqwest::Error) -> Failure {
    if error.is_timeout() {
        Failure::api(format!("Request timed out: {}", error), None)
    } else if error.is_connect() {
        Failure::network(format!("Connection failed: {}", error))
    } else {
        Failure::api(format!("Request failed: {}", error), None)
    }
}

/// Authentication problems will not fix themselves; everything else might.
fn classify_status(status: StatusCode) -> Failure {
    let failure = Failure::api(format!("Feed returned {}", status), Some(status.as_u16()));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => failure.with_recoverable(false),
        _ => failure,
    }
}

/// Find the selected team's game on a scoreboard payload.
pub fn extract_game(
    payload: &Value,
    selection: &TeamSelection,
) -> Result<Option<GameLine>, Failure> {
    RequiredFields::espn_scoreboard(&selection.league).validate(payload)?;

    let events = payload
        .get("events")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            Failure::validation(
                format!("ESPN {} scoreboard events is not a list", selection.league),
                ["events"],
            )
        })?;

    let needle = selection.team.to_lowercase();
    let Some(event) = events.iter().find(|event| {
        event
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| name.to_lowercase().contains(&needle))
    }) else {
        return Ok(None);
    };

    RequiredFields::espn_event(&selection.league).validate(event)?;

    let competition = &event["competitions"][0];
    let competitors = competition["competitors"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();
    let side = |home_away: &str, fallback: usize| {
        competitors
            .iter()
            .find(|c| c["homeAway"].as_str() == Some(home_away))
            .or_else(|| competitors.get(fallback))
            .map(team_score)
            .unwrap_or_else(|| TeamScore {
                name: String::new(),
                score: String::new(),
            })
    };

    Ok(Some(GameLine {
        name: text(&event["name"]),
        status: competition["status"]["type"]["shortDetail"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| text(&event["status"]["type"]["description"])),
        home: side("home", 0),
        away: side("away", 1),
    }))
}

fn team_score(competitor: &Value) -> TeamScore {
    TeamScore {
        name: text(&competitor["team"]["displayName"]),
        score: text(&competitor["score"]),
    }
}

/// Scores arrive as strings from some feeds and numbers from others.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
