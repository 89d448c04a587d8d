use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use crate::error::{CinemaError, Result};
use crate::matching::clean_name;
use crate::models::{City, Film, Keyword, KeywordKind, Screening, Theatre};
use crate::store::Store;

const CONNECTIVES: [&str; 2] = ["DAN", "AND"];
const THEATRE_VARIANTS: [&str; 2] = ["PREMIERE", "IMAX"];
pub const DEFAULT_VARIANT: &str = "REGULAR";

/// Cleans a film title and replaces connective words between other words
/// with `&`, so "Kakak dan Adik" and "KAKAK & ADIK" are the same film.
/// Applying it twice gives the same result as applying it once.
pub fn standardize_title(title: &str) -> String {
    let cleaned = clean_name(title);
    let words: Vec<&str> = cleaned.split(' ').collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i > 0 && i < last && CONNECTIVES.contains(word) {
                "&"
            } else {
                *word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits a trailing hall type off a theatre name: "PLAZA SENAYAN PREMIERE"
/// becomes ("PLAZA SENAYAN", Some("PREMIERE")).
pub fn split_theatre_variant(name: &str) -> (String, Option<String>) {
    let cleaned = clean_name(name);
    if let Some((base, tail)) = cleaned.rsplit_once(' ') {
        if THEATRE_VARIANTS.contains(&tail) {
            return (base.to_string(), Some(tail.to_string()));
        }
    }
    (cleaned, None)
}

#[derive(Clone, Debug, Default)]
pub struct TheatreEntry {
    pub theatre_name: String,
    pub city_name: String,
    pub locator: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ScreeningEntry {
    pub city_name: String,
    pub theatre_name: String,
    pub film_title: String,
    pub variant: String,
    pub date: String,
    pub time: String,
    pub price_idr: Option<i64>,
    pub theatre_id: Option<String>,
}

/// Write access handed to one provider adapter. Every write is normalized
/// and stamped with the adapter's provider id here, never in the adapter.
#[derive(Clone)]
pub struct Registry {
    store: Arc<Store>,
    provider_id: String,
}

impl Registry {
    pub fn new(store: Arc<Store>, provider_id: impl Into<String>) -> Self {
        Self {
            store,
            provider_id: provider_id.into(),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn register_city(&self, city_name: &str, locator: Option<&str>) -> Result<City> {
        let city_name = required("city name", clean_name(city_name))?;
        let mut locators = BTreeMap::new();
        if let Some(locator) = locator.map(str::trim).filter(|l| !l.is_empty()) {
            locators.insert(self.provider_id.clone(), locator.to_string());
        }
        let city = self.store.upsert(City {
            city_name: city_name.clone(),
            provider_ids: BTreeSet::from([self.provider_id.clone()]),
            locators,
        })?;
        self.register_keyword(&city_name, KeywordKind::City)?;
        Ok(city)
    }

    pub fn register_theatre(&self, entry: TheatreEntry) -> Result<Theatre> {
        let theatre_name = required("theatre name", clean_name(&entry.theatre_name))?;
        let city_name = Some(clean_name(&entry.city_name)).filter(|c| !c.is_empty());
        let theatre = self.store.upsert(Theatre {
            theatre_name: theatre_name.clone(),
            city_name,
            provider_id: Some(self.provider_id.clone()),
            locators: entry.locator.into_iter().collect(),
        })?;
        self.register_keyword(&theatre_name, KeywordKind::Theatre)?;
        Ok(theatre)
    }

    pub fn register_film(&self, film_title: &str) -> Result<Film> {
        let film_title = required("film title", standardize_title(film_title))?;
        let film = self.store.upsert(Film {
            film_title: film_title.clone(),
            provider_ids: BTreeSet::from([self.provider_id.clone()]),
        })?;
        self.register_keyword(&film_title, KeywordKind::Film)?;
        Ok(film)
    }

    /// Stores one showtime. Screenings are not searchable by keyword, so
    /// nothing is added to the keyword index.
    pub fn register_screening(&self, entry: ScreeningEntry) -> Result<Screening> {
        let variant = Some(clean_name(&entry.variant))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_VARIANT.to_string());
        let screening = Screening {
            city_name: required("city name", clean_name(&entry.city_name))?,
            theatre_name: required("theatre name", clean_name(&entry.theatre_name))?,
            film_title: required("film title", standardize_title(&entry.film_title))?,
            variant,
            date: canonical_date(&entry.date)?,
            time: canonical_time(&entry.time)?,
            provider_id: Some(self.provider_id.clone()),
            price_idr: entry.price_idr,
            theatre_id: entry.theatre_id,
        };
        self.store.upsert(screening)
    }

    fn register_keyword(&self, keyword: &str, kind: KeywordKind) -> Result<()> {
        self.store.upsert(Keyword {
            keyword: keyword.to_string(),
            kind,
            source_key: keyword.to_string(),
        })?;
        Ok(())
    }
}

fn required(what: &str, value: String) -> Result<String> {
    if value.is_empty() {
        Err(CinemaError::MalformedSourceData(format!("empty {what}")))
    } else {
        Ok(value)
    }
}

pub(crate) fn canonical_date(raw: &str) -> Result<String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|err| CinemaError::MalformedSourceData(format!("date {raw:?}: {err}")))
}

pub(crate) fn canonical_time(raw: &str) -> Result<String> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map(|time| time.format("%H:%M").to_string())
        .map_err(|err| CinemaError::MalformedSourceData(format!("time {raw:?}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Collection, Field, Filter};

    fn registry(provider_id: &str) -> (Arc<Store>, Registry) {
        let store = Arc::new(Store::in_memory());
        let registry = Registry::new(Arc::clone(&store), provider_id);
        (store, registry)
    }

    fn entry(time: &str) -> ScreeningEntry {
        ScreeningEntry {
            city_name: " jakarta ".into(),
            theatre_name: "grand  indonesia 21".into(),
            film_title: "Kakak dan Adik".into(),
            variant: "2d".into(),
            date: "2024-01-01".into(),
            time: time.into(),
            price_idr: Some(50_000),
            theatre_id: Some("GRA".into()),
        }
    }

    #[test]
    fn standardize_title_replaces_interior_connectives() {
        assert_eq!(standardize_title("Kakak dan  Adik"), "KAKAK & ADIK");
        assert_eq!(standardize_title("tom and jerry"), "TOM & JERRY");
        assert_eq!(standardize_title("And Then There Were None"), "AND THEN THERE WERE NONE");
        assert_eq!(standardize_title("Dancing Queen"), "DANCING QUEEN");
    }

    #[test]
    fn standardize_title_is_idempotent() {
        for title in [
            "a dan dan b",
            "Kakak dan Adik",
            "  and  ",
            "x & y and z",
            "",
            "Love AND Thunder (IMAX 3D)",
        ] {
            let once = standardize_title(title);
            assert_eq!(standardize_title(&once), once, "title {title:?}");
        }
    }

    #[test]
    fn split_theatre_variant_detects_hall_types() {
        assert_eq!(
            split_theatre_variant("plaza senayan premiere"),
            ("PLAZA SENAYAN".to_string(), Some("PREMIERE".to_string()))
        );
        assert_eq!(
            split_theatre_variant("Gandaria City IMAX"),
            ("GANDARIA CITY".to_string(), Some("IMAX".to_string()))
        );
        assert_eq!(split_theatre_variant("IMAX"), ("IMAX".to_string(), None));
        assert_eq!(split_theatre_variant("grand 21"), ("GRAND 21".to_string(), None));
    }

    #[test]
    fn register_city_merges_providers_and_indexes_keyword_once() {
        let (store, xxi) = registry("xxi");
        let blitz = Registry::new(Arc::clone(&store), "cgvblitz");

        xxi.register_city("jakarta", Some("10")).expect("xxi city");
        let city = blitz.register_city("JAKARTA ", None).expect("blitz city");

        assert_eq!(city.provider_ids.len(), 2);
        assert_eq!(city.locators.get("xxi").map(String::as_str), Some("10"));
        assert_eq!(store.count(Collection::Cities).expect("count"), 1);
        assert_eq!(store.count(Collection::Keywords).expect("count"), 1);
    }

    #[test]
    fn register_theatre_and_film_index_keywords() {
        let (store, registry) = registry("xxi");
        let theatre = registry
            .register_theatre(TheatreEntry {
                theatre_name: "grand indonesia 21".into(),
                city_name: "jakarta".into(),
                locator: Some("GRA".into()),
            })
            .expect("theatre");
        assert_eq!(theatre.provider_id.as_deref(), Some("xxi"));
        registry.register_film("tom and jerry").expect("film");

        let keywords: Vec<Keyword> = store.find_all().expect("keywords");
        let names: Vec<(&str, KeywordKind)> = keywords
            .iter()
            .map(|k| (k.keyword.as_str(), k.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("TOM & JERRY", KeywordKind::Film),
                ("GRAND INDONESIA 21", KeywordKind::Theatre),
            ]
        );
    }

    #[test]
    fn register_screening_normalizes_without_keywords() {
        let (store, registry) = registry("xxi");
        let screening = registry.register_screening(entry("9:05")).expect("screening");

        assert_eq!(screening.city_name, "JAKARTA");
        assert_eq!(screening.theatre_name, "GRAND INDONESIA 21");
        assert_eq!(screening.film_title, "KAKAK & ADIK");
        assert_eq!(screening.variant, "2D");
        assert_eq!(screening.time, "09:05");
        assert_eq!(screening.provider_id.as_deref(), Some("xxi"));
        assert_eq!(store.count(Collection::Keywords).expect("count"), 0);

        registry.register_screening(entry("09:05")).expect("again");
        let found = store
            .find(&Filter::<Screening>::new().eq(Field::FilmTitle, "KAKAK & ADIK"))
            .expect("find");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn register_screening_rejects_malformed_records() {
        let (store, registry) = registry("xxi");
        let mut bad_date = entry("10:00");
        bad_date.date = "01-02-2024".into();
        let mut missing_title = entry("10:00");
        missing_title.film_title = "   ".into();

        for bad in [bad_date, entry("25:00"), missing_title] {
            assert!(matches!(
                registry.register_screening(bad),
                Err(CinemaError::MalformedSourceData(_))
            ));
        }
        assert_eq!(store.count(Collection::Screenings).expect("count"), 0);
    }
}
