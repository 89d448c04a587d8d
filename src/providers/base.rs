use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Url};
use scraper::{ElementRef, Selector};

use crate::matching::collapse_whitespace;

pub fn inner_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Next sibling that is an element, skipping text and comment nodes.
pub fn next_element<'a>(element: ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

pub fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

/// Reads one query parameter from a possibly relative link.
pub fn query_param(base: &str, href: &str, name: &str) -> Option<String> {
    let url = Url::parse(base).ok()?.join(href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Parses "Rp 45,000" or "45.000" style prices into whole rupiah.
pub fn parse_price(text: &str) -> Option<i64> {
    let digits: String = text
        .trim()
        .rsplit(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
        .next()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok().filter(|price| *price > 0)
}

pub fn build_client(timeout: Duration, user_agent: &str) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .context("http client")
}

pub async fn fetch_html(client: &Client, url: &str, cookie: Option<&str>) -> Result<String> {
    let mut request = client.get(url);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("request failed for {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    response
        .text()
        .await
        .with_context(|| format!("unable to read response body for {url}"))
}

pub fn fail_if_empty(provider_id: &str, cities: usize) -> Result<()> {
    if cities == 0 {
        anyhow::bail!("no cities scraped for {provider_id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_prices() {
        assert_eq!(parse_price("HTM: Rp. 45,000"), Some(45_000));
        assert_eq!(parse_price("Rp 1.250.000"), Some(1_250_000));
        assert_eq!(parse_price("35000"), Some(35_000));
        assert_eq!(parse_price("Harga belum tersedia"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn reads_query_params_from_relative_links() {
        assert_eq!(
            query_param("http://m.example.com/", "gui.schedule?cinema_id=GRA&find_by=2", "cinema_id")
                .as_deref(),
            Some("GRA")
        );
        assert_eq!(query_param("http://m.example.com/", "gui.schedule", "cinema_id"), None);
    }
}
