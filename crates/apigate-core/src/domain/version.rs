//! Dated API version identifiers (`2021-06-04`, `2021-06-04~beta`).

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2})(?:~([a-z]+))?$").expect("version pattern is valid")
    })
}

/// Stability level attached to a version.
///
/// A version without a `~suffix` is generally available.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    Ga,
    Named(String),
}

impl Stability {
    /// Parse a stability name. `"ga"` and the empty string map to [`Stability::Ga`].
    pub fn parse(name: &str) -> Self {
        match name {
            "" | "ga" => Stability::Ga,
            other => Stability::Named(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Stability::Ga => "ga",
            Stability::Named(name) => name,
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published API version: a `YYYY-MM-DD` date plus a stability level.
///
/// The date is kept as text and is not checked against the calendar, so
/// every string the grammar admits is a version. Versions order by date
/// text (lexicographic order equals chronological order for this format);
/// the raw text breaks ties. Stability never influences ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId {
    date: String,
    stability: Stability,
    raw: String,
}

impl VersionId {
    /// Parse a version string. Returns `None` for anything outside the
    /// `YYYY-MM-DD[~stability]` grammar.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = version_pattern().captures(raw)?;
        let date = caps[1].to_string();
        let stability = caps
            .get(2)
            .map(|m| Stability::parse(m.as_str()))
            .unwrap_or(Stability::Ga);
        Some(Self {
            date,
            stability,
            raw: raw.to_string(),
        })
    }

    /// Build a version from a `YYYY-MM-DD` date and a stability.
    pub fn new(date: impl Into<String>, stability: Stability) -> Self {
        let date = date.into();
        let raw = match &stability {
            Stability::Ga => date.clone(),
            Stability::Named(name) => format!("{date}~{name}"),
        };
        Self {
            date,
            stability,
            raw,
        }
    }

    /// The `YYYY-MM-DD` date component.
    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn stability(&self) -> &Stability {
        &self.stability
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for VersionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for VersionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for VersionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionId::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid version: {raw}")))
    }
}

/// The set of stability levels the gate checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityFilter {
    accepted: BTreeSet<Stability>,
}

impl Default for StabilityFilter {
    /// GA and beta.
    fn default() -> Self {
        Self::new([Stability::Ga, Stability::Named("beta".to_string())])
    }
}

impl StabilityFilter {
    pub fn new(accepted: impl IntoIterator<Item = Stability>) -> Self {
        Self {
            accepted: accepted.into_iter().collect(),
        }
    }

    pub fn accepts(&self, version: &VersionId) -> bool {
        self.accepted.contains(version.stability())
    }
}
