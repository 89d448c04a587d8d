use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct City {
    pub city_name: String,
    #[serde(default)]
    pub provider_ids: BTreeSet<String>,
    /// Provider id -> that provider's internal city code.
    #[serde(default)]
    pub locators: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Theatre {
    pub theatre_name: String, // upper-cased, provider-suffixed: "GRAND 21"
    pub city_name: Option<String>,
    pub provider_id: Option<String>,
    /// One display name can map to several provider-side ids.
    #[serde(default)]
    pub locators: BTreeSet<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Film {
    pub film_title: String,
    #[serde(default)]
    pub provider_ids: BTreeSet<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Screening {
    pub city_name: String,
    pub theatre_name: String,
    pub film_title: String,
    pub variant: String,
    pub date: String, // YYYY-MM-DD
    pub time: String, // HH:MM, 24h
    pub provider_id: Option<String>,
    pub price_idr: Option<i64>,
    pub theatre_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum KeywordKind {
    City,
    Theatre,
    Film,
}

impl KeywordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordKind::City => "city",
            KeywordKind::Theatre => "theatre",
            KeywordKind::Film => "film",
        }
    }
}

impl fmt::Display for KeywordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeywordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "city" => Ok(KeywordKind::City),
            "theatre" | "theater" | "cinema" => Ok(KeywordKind::Theatre),
            "film" | "movie" => Ok(KeywordKind::Film),
            other => Err(format!("unknown keyword kind: {other}")),
        }
    }
}

/// Denormalized search entry pointing back at a city, theatre or film.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Keyword {
    pub keyword: String,
    pub kind: KeywordKind,
    /// Natural key of the entity this keyword was built from.
    pub source_key: String,
}
