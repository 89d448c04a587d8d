use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use futures::future::join_all;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::RwLock;

use super::base;
use super::registry::{ScreeningEntry, TheatreEntry};
use super::{Provider, Registry};

const BASE_URL: &str = "https://www.cgvblitz.com/en/schedule/cinema";
const PROVIDER_ID: &str = "cgvblitz";
const PROVIDER_NAME: &str = "CGV Blitz";
const THEATRE_SUFFIX: &str = "CGVBLITZ";

static CITY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".city").expect("blitz city selector"));
static SCHEDULE_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".schedule-title").expect("blitz title selector"));
static SCHEDULE_TYPE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".schedule-type").expect("blitz type selector"));
static SHOWTIME_LIST_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".showtime-lists").expect("blitz showtime selector"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CinemaListing {
    pub theatre_name: String,
    pub theatre_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Showtime {
    pub film_title: String,
    pub variant: String,
    pub time: String,
    pub price_idr: Option<i64>,
}

/// CGV only publishes the current day, so every showtime is stamped with
/// today's date in the chain's timezone.
pub struct CgvBlitz {
    client: Client,
    timezone: Tz,
    cinemas: RwLock<HashMap<String, Vec<CinemaListing>>>,
}

impl CgvBlitz {
    pub fn new(client: Client, timezone: Tz) -> Self {
        Self {
            client,
            timezone,
            cinemas: RwLock::new(HashMap::new()),
        }
    }

    fn today(&self) -> String {
        Utc::now()
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d")
            .to_string()
    }

    async fn load_cinema(
        &self,
        registry: &Registry,
        city_name: &str,
        cinema: &CinemaListing,
        date: &str,
    ) -> Result<usize> {
        let url = format!("{BASE_URL}/{}", cinema.theatre_id);
        let html = base::fetch_html(&self.client, &url, None).await?;

        registry.register_theatre(TheatreEntry {
            theatre_name: cinema.theatre_name.clone(),
            city_name: city_name.to_string(),
            locator: Some(cinema.theatre_id.clone()),
        })?;

        let mut stored = 0;
        for show in parse_cinema(&html) {
            registry.register_film(&show.film_title)?;
            let entry = ScreeningEntry {
                city_name: city_name.to_string(),
                theatre_name: cinema.theatre_name.clone(),
                film_title: show.film_title,
                variant: show.variant,
                date: date.to_string(),
                time: show.time,
                price_idr: show.price_idr,
                theatre_id: Some(cinema.theatre_id.clone()),
            };
            match registry.register_screening(entry) {
                Ok(_) => stored += 1,
                Err(err) => tracing::warn!(provider = PROVIDER_ID, error = %err, "dropped screening"),
            }
        }
        Ok(stored)
    }
}

#[async_trait]
impl Provider for CgvBlitz {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn provider_url(&self) -> &'static str {
        BASE_URL
    }

    async fn init(&self, registry: &Registry) -> Result<()> {
        let html = base::fetch_html(&self.client, BASE_URL, None).await?;
        let mut cinemas = self.cinemas.write().await;
        cinemas.clear();
        for (city_name, listings) in parse_cities(&html) {
            let city = registry.register_city(&city_name, None)?;
            cinemas.insert(city.city_name, listings);
        }
        base::fail_if_empty(PROVIDER_ID, cinemas.len())
    }

    async fn load_city(&self, registry: &Registry, city_name: &str) -> Result<()> {
        let listings = match self.cinemas.read().await.get(city_name) {
            Some(listings) => listings.clone(),
            None => {
                tracing::debug!(provider = PROVIDER_ID, city = city_name, "city not served");
                return Ok(());
            }
        };

        let date = self.today();
        let loads = listings
            .iter()
            .map(|cinema| self.load_cinema(registry, city_name, cinema, &date));
        let mut stored = 0;
        for (cinema, result) in listings.iter().zip(join_all(loads).await) {
            match result {
                Ok(count) => stored += count,
                Err(err) => tracing::warn!(
                    provider = PROVIDER_ID,
                    theatre = %cinema.theatre_name,
                    error = %err,
                    "cinema page failed"
                ),
            }
        }
        tracing::info!(provider = PROVIDER_ID, city = city_name, screenings = stored, "city loaded");
        Ok(())
    }
}

/// Each `.city` block holds the city label in its first child and the
/// cinema list in the first child of its second child.
pub fn parse_cities(html: &str) -> Vec<(String, Vec<CinemaListing>)> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for city in document.select(&CITY_SELECTOR) {
        let mut children = base::child_elements(city);
        let Some(label) = children.next() else {
            continue;
        };
        let city_name = base::inner_text(label).to_uppercase();
        if city_name.is_empty() {
            continue;
        }

        let listings = children
            .next()
            .and_then(|wrapper| base::child_elements(wrapper).next())
            .map(|list| base::child_elements(list).filter_map(parse_listing).collect())
            .unwrap_or_default();
        out.push((city_name, listings));
    }
    out
}

fn parse_listing(item: ElementRef<'_>) -> Option<CinemaListing> {
    let name = base::inner_text(item).to_uppercase();
    let theatre_id = base::child_elements(item)
        .next()
        .and_then(|anchor| anchor.value().attr("id"))?
        .trim()
        .to_string();
    if name.is_empty() || theatre_id.is_empty() {
        return None;
    }
    Some(CinemaListing {
        theatre_name: format!("{name} {THEATRE_SUFFIX}"),
        theatre_id,
    })
}

pub fn parse_cinema(html: &str) -> Vec<Showtime> {
    let document = Html::parse_document(html);
    let mut shows = Vec::new();
    for title in document.select(&SCHEDULE_TITLE_SELECTOR) {
        let Some(film_title) = base::child_elements(title)
            .next()
            .map(base::inner_text)
            .filter(|text| !text.is_empty())
        else {
            continue;
        };
        let Some(section) = title.parent().and_then(ElementRef::wrap) else {
            continue;
        };

        for kind in section.select(&SCHEDULE_TYPE_SELECTOR) {
            let variant = base::inner_text(kind);
            let Some(list) = base::next_element(kind)
                .and_then(|sibling| sibling.select(&SHOWTIME_LIST_SELECTOR).next())
            else {
                continue;
            };
            for item in base::child_elements(list) {
                let time = base::inner_text(item);
                if time.is_empty() {
                    continue;
                }
                let price_idr = base::child_elements(item)
                    .next()
                    .and_then(|el| el.value().attr("price"))
                    .and_then(parse_price_attr);
                shows.push(Showtime {
                    film_title: film_title.clone(),
                    variant: variant.clone(),
                    time,
                    price_idr,
                });
            }
        }
    }
    shows
}

/// Prices come as decimal attributes ("50000.00").
fn parse_price_attr(raw: &str) -> Option<i64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|price| *price > 0.0)
        .map(|price| price.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CINEMA_LIST_HTML: &str = r#"
    <div class="cities">
        <div class="city">
            <a class="city-name">Jakarta</a>
            <div class="collapse">
                <ul>
                    <li><a id="041">Grand Indonesia</a></li>
                    <li><a id="001">Pacific Place</a></li>
                </ul>
            </div>
        </div>
        <div class="city">
            <a class="city-name">Bandung</a>
            <div class="collapse"><ul><li><a id="011">Paris Van Java</a></li></ul></div>
        </div>
    </div>
    "#;

    const CINEMA_HTML: &str = r#"
    <div class="schedule-lists">
        <div class="schedule-title"><a href="/movie/1">Kakak dan Adik</a></div>
        <ul class="schedule-type">2D</ul>
        <div class="showtime">
            <ul class="showtime-lists">
                <li><a price="50000.00">12:00</a></li>
                <li><a price="60000">19:30</a></li>
            </ul>
        </div>
        <ul class="schedule-type">4DX 3D</ul>
        <div class="showtime">
            <ul class="showtime-lists"><li><a price="">21:00</a></li></ul>
        </div>
    </div>
    "#;

    #[test]
    fn parses_cities_and_cinemas() {
        let cities = parse_cities(CINEMA_LIST_HTML);
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0].0, "JAKARTA");
        assert_eq!(
            cities[0].1,
            vec![
                CinemaListing {
                    theatre_name: "GRAND INDONESIA CGVBLITZ".into(),
                    theatre_id: "041".into()
                },
                CinemaListing {
                    theatre_name: "PACIFIC PLACE CGVBLITZ".into(),
                    theatre_id: "001".into()
                },
            ]
        );
        assert_eq!(cities[1].1.len(), 1);
    }

    #[test]
    fn parses_showtimes_per_variant() {
        let shows = parse_cinema(CINEMA_HTML);
        assert_eq!(shows.len(), 3);
        assert_eq!(shows[0].film_title, "Kakak dan Adik");
        assert_eq!(shows[0].variant, "2D");
        assert_eq!(shows[0].time, "12:00");
        assert_eq!(shows[0].price_idr, Some(50_000));
        assert_eq!(shows[1].price_idr, Some(60_000));
        assert_eq!(shows[2].variant, "4DX 3D");
        assert_eq!(shows[2].price_idr, None);
    }
}
