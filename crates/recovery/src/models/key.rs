use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier partitioning all per-entity recovery state.
///
/// Breaker state, cached payloads and retry progress are all tracked per key,
/// so a failing team never affects another team's display.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchKey(String);

impl FetchKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Canonical key for a team in a league, e.g. `NBA:Los Angeles Lakers`.
    pub fn team(team: &str, league: &str) -> Self {
        Self(format!("{}:{}", league.trim().to_uppercase(), team.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FetchKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for FetchKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FetchKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for FetchKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}
