//! Schedule trees: screenings grouped by a pivot (film or theatre), then by
//! variant, with one price and the show times per bucket in chronological
//! order.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::{CinemaError, Result};
use crate::matching::clean_name;
use crate::models::Screening;
use crate::providers::{canonical_date, canonical_time, standardize_title};
use crate::store::{Field, Filter};

pub const START_OF_DAY: &str = "00:00";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub city_name: Option<String>,
    pub theatre_name: Option<String>,
    pub film_title: Option<String>,
    pub variant: Option<String>,
    /// YYYY-MM-DD; today when absent.
    pub date: Option<String>,
    /// HH:MM on `date`; start of day when absent.
    pub time: Option<String>,
    /// Collapse to each provider's latest published day. Chains publish
    /// different look-ahead windows, and mixing one chain's leftover day
    /// with another's fresh one gives a misleading single-day view.
    pub latest_day_only: bool,
}

impl ScheduleQuery {
    pub fn for_film(film_title: impl Into<String>) -> Self {
        Self {
            film_title: Some(film_title.into()),
            ..Self::default()
        }
    }

    pub fn for_theatre(theatre_name: impl Into<String>) -> Self {
        Self {
            theatre_name: Some(theatre_name.into()),
            ..Self::default()
        }
    }

    pub fn in_city(mut self, city_name: impl Into<String>) -> Self {
        self.city_name = Some(city_name.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn from_time(mut self, date: impl Into<String>, time: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self.time = Some(time.into());
        self
    }

    pub fn on(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn latest_day_only(mut self) -> Self {
        self.latest_day_only = true;
        self
    }

    /// Names normalized the same way they were stored.
    fn normalized(&self) -> Self {
        let clean = |value: &Option<String>| value.as_deref().map(clean_name).filter(|v| !v.is_empty());
        Self {
            city_name: clean(&self.city_name),
            theatre_name: clean(&self.theatre_name),
            film_title: self
                .film_title
                .as_deref()
                .map(standardize_title)
                .filter(|v| !v.is_empty()),
            variant: clean(&self.variant),
            date: self.date.as_deref().map(str::trim).map(str::to_string),
            time: self.time.as_deref().map(str::trim).map(str::to_string),
            latest_day_only: self.latest_day_only,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pivot {
    Film,
    Theatre,
}

impl Pivot {
    fn key<'a>(&self, screening: &'a Screening) -> &'a str {
        match self {
            Pivot::Film => &screening.film_title,
            Pivot::Theatre => &screening.theatre_name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShowTimes {
    /// `HH:MM` on the reference date; `YYYY-MM-DD HH:MM` on later dates.
    /// A latest-day view only carries `HH:MM`.
    pub times: Vec<String>,
    pub price: i64,
}

/// pivot key -> variant -> show times
pub type ScheduleTree = BTreeMap<String, BTreeMap<String, ShowTimes>>;

/// A query resolved against "today", ready to run against the store.
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub pivot: Pivot,
    pub date: String,
    pub time: String,
    pub latest_day_only: bool,
    pub filter: Filter<Screening>,
}

/// Normalizes `query`, picks the pivot and builds the store filter. The
/// filter only bounds the date from below; the time-of-day cut on the
/// reference date is applied in [`build_tree`].
pub fn resolve_query(query: &ScheduleQuery, today: &str) -> Result<ResolvedQuery> {
    let query = query.normalized();
    let pivot = match (&query.theatre_name, &query.film_title) {
        (Some(_), _) => Pivot::Film,
        (None, Some(_)) => Pivot::Theatre,
        (None, None) => {
            return Err(CinemaError::InvalidQuery(
                "a theatre name or a film title is required".to_string(),
            ))
        }
    };
    let date = match query.date {
        Some(date) => canonical_date(&date)
            .map_err(|_| CinemaError::InvalidQuery(format!("date {date:?}, expected YYYY-MM-DD")))?,
        None => today.to_string(),
    };
    let time = match query.time {
        Some(time) => canonical_time(&time)
            .map_err(|_| CinemaError::InvalidQuery(format!("time {time:?}, expected HH:MM")))?,
        None => START_OF_DAY.to_string(),
    };

    let filter = Filter::new()
        .gte(Field::Date, date.as_str())
        .eq_opt(Field::CityName, query.city_name)
        .eq_opt(Field::TheatreName, query.theatre_name)
        .eq_opt(Field::FilmTitle, query.film_title)
        .eq_opt(Field::Variant, query.variant);

    Ok(ResolvedQuery {
        pivot,
        date,
        time,
        latest_day_only: query.latest_day_only,
        filter,
    })
}

/// Keeps screenings after the reference date, or on it at or after the
/// reference time.
fn is_upcoming(screening: &Screening, date: &str, time: &str) -> bool {
    match screening.date.as_str().cmp(date) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Equal => screening.time.as_str() >= time,
        std::cmp::Ordering::Less => false,
    }
}

/// Latest date each provider has published within `screenings`.
pub fn freshness_horizons(screenings: &[Screening]) -> HashMap<&str, &str> {
    let mut latest: HashMap<&str, &str> = HashMap::new();
    for screening in screenings {
        let provider = screening.provider_id.as_deref().unwrap_or_default();
        let date = screening.date.as_str();
        let entry = latest.entry(provider).or_insert(date);
        if *entry < date {
            *entry = date;
        }
    }
    latest
}

pub fn build_tree(screenings: Vec<Screening>, query: &ResolvedQuery) -> ScheduleTree {
    let upcoming: Vec<Screening> = screenings
        .into_iter()
        .filter(|s| is_upcoming(s, &query.date, &query.time))
        .collect();

    let horizons = if query.latest_day_only {
        Some(freshness_horizons(&upcoming))
    } else {
        None
    };

    let mut tree = ScheduleTree::new();
    for screening in &upcoming {
        if let Some(horizons) = &horizons {
            let provider = screening.provider_id.as_deref().unwrap_or_default();
            if horizons.get(provider) != Some(&screening.date.as_str()) {
                continue;
            }
        }

        let bucket = tree
            .entry(query.pivot.key(screening).to_string())
            .or_default()
            .entry(screening.variant.clone())
            .or_default();
        if bucket.price == 0 {
            bucket.price = screening.price_idr.unwrap_or(0);
        }
        bucket
            .times
            .push(format!("{} {}", screening.date, screening.time));
    }

    for variants in tree.values_mut() {
        for show in variants.values_mut() {
            show.times.sort();
            for entry in show.times.iter_mut() {
                *entry = time_label(entry, &query.date, query.latest_day_only);
            }
        }
    }
    tree
}

/// `entry` is "YYYY-MM-DD HH:MM".
fn time_label(entry: &str, reference_date: &str, latest_day_only: bool) -> String {
    match entry.split_once(' ') {
        Some((date, time)) if latest_day_only || date == reference_date => time.to_string(),
        _ => entry.to_string(),
    }
}
