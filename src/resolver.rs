//! Free-text lookup over the keyword index.

use serde::Serialize;

use crate::error::{CinemaError, Result};
use crate::matching::{clean_name, search_pattern};
use crate::models::{Keyword, KeywordKind};
use crate::store::{Field, Filter, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordQuery {
    pub keyword: String,
    pub kind: Option<KeywordKind>,
    /// Return every candidate instead of picking one.
    pub allow_ambiguous: bool,
}

impl KeywordQuery {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            kind: None,
            allow_ambiguous: false,
        }
    }

    pub fn of_kind(mut self, kind: KeywordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn allow_ambiguous(mut self) -> Self {
        self.allow_ambiguous = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "matches", rename_all = "snake_case")]
pub enum Resolution {
    NoMatch,
    Unique(Keyword),
    Ambiguous(Vec<Keyword>),
}

impl Resolution {
    pub fn unique(&self) -> Option<&Keyword> {
        match self {
            Resolution::Unique(keyword) => Some(keyword),
            _ => None,
        }
    }
}

pub fn resolve_keyword(store: &Store, query: &KeywordQuery) -> Result<Resolution> {
    let needle = clean_name(&query.keyword);
    if needle.is_empty() {
        return Ok(Resolution::NoMatch);
    }
    let pattern = search_pattern(&needle)
        .map_err(|err| CinemaError::InvalidQuery(format!("keyword {needle}: {err}")))?;
    let filter = Filter::<Keyword>::new()
        .matches(Field::Keyword, pattern)
        .eq_opt(Field::Kind, query.kind.map(|kind| kind.as_str()));

    let candidates = store.find(&filter)?;
    Ok(pick(candidates, &needle, query.allow_ambiguous))
}

/// Chooses among keyword matches already in natural-key order.
fn pick(mut candidates: Vec<Keyword>, needle: &str, allow_ambiguous: bool) -> Resolution {
    if candidates.is_empty() {
        return Resolution::NoMatch;
    }
    if let Some(exact) = candidates.iter().position(|k| k.keyword == needle) {
        return Resolution::Unique(candidates.swap_remove(exact));
    }
    if candidates.len() == 1 || !allow_ambiguous {
        return Resolution::Unique(candidates.swap_remove(0));
    }
    Resolution::Ambiguous(candidates)
}
