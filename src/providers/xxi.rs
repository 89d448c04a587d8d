use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::RwLock;

use super::base;
use crate::matching::collapse_whitespace;
use super::registry::{split_theatre_variant, ScreeningEntry, TheatreEntry};
use super::{Provider, Registry};

const BASE_URL: &str = "http://m.21cineplex.com/";
const LIST_MOVIE_URL: &str = "http://m.21cineplex.com/gui.list_movie";
const LIST_THEATRE_URL: &str = "http://m.21cineplex.com/gui.list_theater";
const PROVIDER_ID: &str = "xxi";
const PROVIDER_NAME: &str = "Cinema 21 / XXI";
const DEFAULT_CITY_ID: &str = "10";

static CITY_OPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#city_id option").expect("xxi city selector"));
static MOVIE_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[id=menu_ol_arrow] a").expect("xxi movie link selector"));
static BOX_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div[id=box_title]").expect("xxi box title selector"));
static LIST_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li a").expect("xxi list link selector"));
static FILM_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.flm_ttl").expect("xxi film title selector"));
static SCHEDULE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[id=menu_ol_schedule]").expect("xxi schedule selector"));
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("xxi link"));
static DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p.p_date").expect("xxi date selector"));

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})-(\d{2})-(\d{4})").expect("xxi date regex"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d{2}:\d{2})\]$").expect("xxi time regex"));
static FILM_FORMAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+)\s\(((?:IMAX )?[23]D)\)$").expect("xxi film format regex")
});
static CHAIN_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)XXI|21").expect("xxi chain suffix regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShowBlock {
    pub theatre_id: String,
    pub theatre_name: String,
    pub film_title: String,
    pub variant: String,
    pub date: String,
    pub times: Vec<String>,
    pub price_idr: Option<i64>,
}

pub struct Xxi {
    client: Client,
    city_ids: RwLock<HashMap<String, String>>,
}

impl Xxi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            city_ids: RwLock::new(HashMap::new()),
        }
    }

    async fn fetch(&self, url: &str, city_id: &str) -> Result<String> {
        let mut target = reqwest::Url::parse(url)?;
        target.query_pairs_mut().append_pair("city_id", city_id);
        let cookie = format!("city_id={city_id}");
        base::fetch_html(&self.client, target.as_str(), Some(&cookie)).await
    }

    async fn load_movie(
        &self,
        registry: &Registry,
        movie_url: &str,
        city_id: &str,
        city_name: &str,
        theatre_names: &HashMap<String, String>,
    ) -> Result<usize> {
        let html = self.fetch(movie_url, city_id).await?;
        let blocks = parse_movie(&html, theatre_names);
        let mut stored = 0;
        for block in blocks {
            registry.register_theatre(TheatreEntry {
                theatre_name: block.theatre_name.clone(),
                city_name: city_name.to_string(),
                locator: Some(block.theatre_id.clone()),
            })?;
            registry.register_film(&block.film_title)?;
            for time in &block.times {
                let entry = ScreeningEntry {
                    city_name: city_name.to_string(),
                    theatre_name: block.theatre_name.clone(),
                    film_title: block.film_title.clone(),
                    variant: block.variant.clone(),
                    date: block.date.clone(),
                    time: time.clone(),
                    price_idr: block.price_idr,
                    theatre_id: Some(block.theatre_id.clone()),
                };
                match registry.register_screening(entry) {
                    Ok(_) => stored += 1,
                    Err(err) => tracing::warn!(provider = PROVIDER_ID, error = %err, "dropped screening"),
                }
            }
        }
        Ok(stored)
    }
}

#[async_trait]
impl Provider for Xxi {
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
        let html = self.fetch(BASE_URL, DEFAULT_CITY_ID).await?;
        let cities = parse_cities(&html);
        let mut city_ids = self.city_ids.write().await;
        city_ids.clear();
        for (city_name, city_id) in cities {
            let city = registry.register_city(&city_name, Some(&city_id))?;
            city_ids.insert(city.city_name, city_id);
        }
        base::fail_if_empty(PROVIDER_ID, city_ids.len())
    }

    async fn load_city(&self, registry: &Registry, city_name: &str) -> Result<()> {
        let city_id = match self.city_ids.read().await.get(city_name) {
            Some(id) => id.clone(),
            None => {
                tracing::debug!(provider = PROVIDER_ID, city = city_name, "city not served");
                return Ok(());
            }
        };

        let movie_urls = parse_movie_links(&self.fetch(LIST_MOVIE_URL, &city_id).await?);
        let theatre_names = parse_theatres(&self.fetch(LIST_THEATRE_URL, &city_id).await?);

        let loads = movie_urls.iter().map(|movie_url| {
            self.load_movie(registry, movie_url, &city_id, city_name, &theatre_names)
        });
        let mut stored = 0;
        for (movie_url, result) in movie_urls.iter().zip(join_all(loads).await) {
            match result {
                Ok(count) => stored += count,
                Err(err) => tracing::warn!(provider = PROVIDER_ID, url = %movie_url, error = %err, "movie page failed"),
            }
        }
        tracing::info!(provider = PROVIDER_ID, city = city_name, screenings = stored, "city loaded");
        Ok(())
    }
}

/// (upper-cased city name, provider city id) pairs from the city picker.
pub fn parse_cities(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&CITY_OPTION_SELECTOR)
        .filter_map(|option| {
            let name = base::inner_text(option).to_uppercase();
            let id = option.value().attr("value")?.trim().to_string();
            (!name.is_empty() && !id.is_empty()).then_some((name, id))
        })
        .collect()
}

pub fn parse_movie_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&MOVIE_LINK_SELECTOR)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| base::absolute_url(BASE_URL, href))
        .collect()
}

/// Provider theatre id -> raw theatre name, from the "ALL THEATERS" list.
pub fn parse_theatres(html: &str) -> HashMap<String, String> {
    let document = Html::parse_document(html);
    let mut theatres = HashMap::new();
    let all_theatres = document
        .select(&BOX_TITLE_SELECTOR)
        .find(|div| base::inner_text(*div) == "ALL THEATERS");
    let Some(list) = all_theatres.and_then(base::next_element) else {
        return theatres;
    };
    for link in list.select(&LIST_LINK_SELECTOR) {
        let name = base::inner_text(link);
        let id = link
            .value()
            .attr("href")
            .and_then(|href| base::query_param(BASE_URL, href, "cinema_id"));
        if let (Some(id), false) = (id, name.is_empty()) {
            theatres.insert(id, name);
        }
    }
    theatres
}

/// Splits the hall type off the theatre and the format off the title:
/// ("Avatar (IMAX 3D)", "Gandaria City") -> ("Avatar", "GANDARIA CITY 21", "IMAX 3D").
pub fn parse_film_title(raw_title: &str, raw_theatre: &str) -> (String, String, String) {
    let raw_title = collapse_whitespace(raw_title);
    let mut variant = "Regular".to_string();

    let (mut theatre_name, hall) = split_theatre_variant(raw_theatre);
    if let Some(hall) = hall {
        theatre_name.push_str(" XXI");
        variant = hall;
    }
    if !CHAIN_SUFFIX_RE.is_match(&theatre_name) {
        theatre_name.push_str(" 21");
    }

    let film_title = match FILM_FORMAT_RE.captures(&raw_title) {
        Some(caps) => {
            variant = caps[2].to_string();
            caps[1].to_string()
        }
        None => raw_title.clone(),
    };

    (film_title, theatre_name, variant)
}

/// One block per (theatre, date) on a movie page. Blocks whose theatre or
/// date cannot be read are skipped.
pub fn parse_movie(html: &str, theatre_names: &HashMap<String, String>) -> Vec<ShowBlock> {
    let document = Html::parse_document(html);
    let raw_title = document
        .select(&FILM_TITLE_SELECTOR)
        .next()
        .map(base::inner_text)
        .unwrap_or_default();
    if raw_title.is_empty() {
        return Vec::new();
    }

    let mut blocks = Vec::new();
    for schedule in document.select(&SCHEDULE_SELECTOR) {
        let theatre_id = match base::first_attr(&schedule, &LINK_SELECTOR, "href")
            .and_then(|href| base::query_param(BASE_URL, &href, "cinema_id"))
        {
            Some(id) => id,
            None => continue,
        };
        let raw_theatre = match theatre_names.get(&theatre_id) {
            Some(name) => name,
            None => {
                tracing::debug!(provider = PROVIDER_ID, theatre_id = %theatre_id, "unknown theatre id");
                continue;
            }
        };
        let (film_title, theatre_name, variant) = parse_film_title(&raw_title, raw_theatre);

        let Some(details) = base::next_element(schedule) else {
            continue;
        };
        for date_p in details.select(&DATE_SELECTOR) {
            let date_text = base::inner_text(date_p);
            let Some(caps) = DATE_RE.captures(&date_text) else {
                tracing::warn!(provider = PROVIDER_ID, text = %date_text, "unreadable date");
                continue;
            };
            let date = format!("{}-{}-{}", &caps[3], &caps[2], &caps[1]);

            let times_p = base::next_element(date_p);
            let times: Vec<String> = times_p
                .map(base::inner_text)
                .unwrap_or_default()
                .split_whitespace()
                .filter_map(|fragment| TIME_RE.captures(fragment).map(|c| c[1].to_string()))
                .collect();
            let price_idr = times_p
                .and_then(base::next_element)
                .and_then(|price_p| base::parse_price(&base::inner_text(price_p)));

            if times.is_empty() {
                continue;
            }
            blocks.push(ShowBlock {
                theatre_id: theatre_id.clone(),
                theatre_name: theatre_name.clone(),
                film_title: film_title.clone(),
                variant: variant.clone(),
                date,
                times,
                price_idr,
            });
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME_HTML: &str = r#"
    <form><select id="city_id" name="city_id">
        <option value="10">Jakarta</option>
        <option value="3">Bandung</option>
        <option value="">  </option>
    </select></form>
    "#;

    const THEATRES_HTML: &str = r#"
    <div id="box_title">FAVORITE THEATERS</div>
    <ol><li><a href="gui.schedule?cinema_id=FAV&find_by=2">Should Not Count</a></li></ol>
    <div id="box_title">ALL THEATERS</div>
    <ol id="menu_ol_arrow">
        <li><a href="gui.schedule?cinema_id=JKTGRIN&find_by=2">GRAND INDONESIA</a></li>
        <li><a href="gui.schedule?cinema_id=JKTPLSE&find_by=2">PLAZA SENAYAN PREMIERE</a></li>
        <li><a href="gui.schedule?cinema_id=JKTKOKA&find_by=2">KOTA KASABLANKA XXI</a></li>
    </ol>
    "#;

    const MOVIE_HTML: &str = r##"
    <div id="box_content">
        <a class="flm_ttl" href="#">AVATAR: THE WAY OF WATER (IMAX 3D)</a>
    </div>
    <ol id="menu_ol_schedule"><li><a href="gui.schedule?cinema_id=JKTGRIN&find_by=2">GRAND INDONESIA</a></li></ol>
    <div>
        <p class="p_date">Senin, 01-01-2024</p>
        <p class="p_time">[12:30] [18:45] sold</p>
        <p class="p_price">HTM: Rp. 75,000</p>
        <p class="p_date">Selasa, 02-01-2024</p>
        <p class="p_time">[13:00]</p>
        <p class="p_price">HTM: Rp. 80,000</p>
    </div>
    <ol id="menu_ol_schedule"><li><a href="gui.schedule?cinema_id=UNKNOWN&find_by=2">GONE</a></li></ol>
    <div>
        <p class="p_date">01-01-2024</p>
        <p>[10:00]</p>
        <p>Rp. 50,000</p>
    </div>
    "##;

    #[test]
    fn parses_city_picker() {
        let cities = parse_cities(HOME_HTML);
        assert_eq!(
            cities,
            vec![
                ("JAKARTA".to_string(), "10".to_string()),
                ("BANDUNG".to_string(), "3".to_string())
            ]
        );
    }

    #[test]
    fn parses_only_the_all_theatres_list() {
        let theatres = parse_theatres(THEATRES_HTML);
        assert_eq!(theatres.len(), 3);
        assert_eq!(theatres.get("JKTPLSE").map(String::as_str), Some("PLAZA SENAYAN PREMIERE"));
        assert!(!theatres.contains_key("FAV"));
    }

    #[test]
    fn normalizes_theatre_and_title_variants() {
        assert_eq!(
            parse_film_title("Avatar (IMAX 3D)", "Gandaria City"),
            ("Avatar".to_string(), "GANDARIA CITY 21".to_string(), "IMAX 3D".to_string())
        );
        assert_eq!(
            parse_film_title("Dune", "Plaza Senayan Premiere"),
            ("Dune".to_string(), "PLAZA SENAYAN XXI".to_string(), "PREMIERE".to_string())
        );
        assert_eq!(
            parse_film_title("Dune", "Kota Kasablanka XXI"),
            ("Dune".to_string(), "KOTA KASABLANKA XXI".to_string(), "Regular".to_string())
        );
    }

    #[test]
    fn parses_movie_schedule_blocks() {
        let theatres = parse_theatres(THEATRES_HTML);
        let blocks = parse_movie(MOVIE_HTML, &theatres);
        assert_eq!(blocks.len(), 2, "unknown theatre ids are skipped");

        let first = &blocks[0];
        assert_eq!(first.film_title, "AVATAR: THE WAY OF WATER");
        assert_eq!(first.theatre_name, "GRAND INDONESIA 21");
        assert_eq!(first.variant, "IMAX 3D");
        assert_eq!(first.date, "2024-01-01");
        assert_eq!(first.times, vec!["12:30".to_string(), "18:45".to_string()]);
        assert_eq!(first.price_idr, Some(75_000));

        assert_eq!(blocks[1].date, "2024-01-02");
        assert_eq!(blocks[1].price_idr, Some(80_000));
    }
}
