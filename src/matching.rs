//! Name normalization and the loose matchers used to turn user input into
//! stored names.

use std::collections::BTreeMap;

use regex::Regex;

/// Trims and collapses inner runs of whitespace to one space.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// [`collapse_whitespace`] plus upper-casing. Every stored name goes through
/// this, so comparisons are case and whitespace insensitive.
pub fn clean_name(input: &str) -> String {
    collapse_whitespace(input).to_uppercase()
}

/// Unanchored pattern where each gap between words matches any run of
/// characters: "GRAND IND" finds "GRAND INDONESIA".
pub fn search_pattern(needle: &str) -> Result<Regex, regex::Error> {
    let pattern = clean_name(needle)
        .split(' ')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".+");
    Regex::new(&pattern)
}

fn is_prefix_or_suffix(item: &str, needle: &str) -> bool {
    item.starts_with(needle) || item.ends_with(needle)
}

/// Picks one name out of `haystack`: an exact match wins immediately,
/// otherwise the single candidate that starts or ends with the needle.
pub fn search_set<'a, I>(haystack: I, needle: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = clean_name(needle);
    if needle.is_empty() {
        return None;
    }

    let mut candidate: Option<&str> = None;
    let mut candidates = 0usize;
    for item in haystack {
        if item == needle {
            return Some(item.to_string());
        }
        if is_prefix_or_suffix(item, &needle) && candidate != Some(item) {
            candidates += 1;
            candidate = Some(item);
        }
    }

    match candidates {
        1 => candidate.map(str::to_string),
        _ => None,
    }
}

/// Keeps entries whose key equals, starts with or ends with the needle.
pub fn filter_by_key<V: Clone>(haystack: &BTreeMap<String, V>, needle: &str) -> BTreeMap<String, V> {
    let needle = clean_name(needle);
    if needle.is_empty() {
        return BTreeMap::new();
    }
    haystack
        .iter()
        .filter(|(key, _)| key.as_str() == needle || is_prefix_or_suffix(key, &needle))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
