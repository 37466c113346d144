//! Client preference lists (`Accept`, `Accept-Language`, `Accept-Charset`,
//! `Accept-Encoding`).

use axum::http::{header, HeaderMap};

/// One weighted entry of a preference header.
#[derive(Debug, Clone, PartialEq)]
pub struct Preference {
    /// Lowercased value without parameters, e.g. `text/html` or `en-us`.
    pub value: String,
    /// Quality weight in `0.0..=1.0`.
    pub weight: f32,
}

/// Parse a comma-separated preference header.
///
/// Entries are sorted by descending weight; equal weights keep header
/// order. Parameters other than `q` are dropped and unparseable weights
/// count as `1.0`.
pub fn parse_preferences(text: &str) -> Vec<Preference> {
    let mut preferences: Vec<Preference> = text
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let value = parts.next()?.trim().to_ascii_lowercase();
            if value.is_empty() {
                return None;
            }
            let weight = parts
                .filter_map(|param| {
                    let (name, value) = param.split_once('=')?;
                    if name.trim().eq_ignore_ascii_case("q") {
                        value.trim().parse::<f32>().ok().filter(|w| w.is_finite())
                    } else {
                        None
                    }
                })
                .next()
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);
            Some(Preference { value, weight })
        })
        .collect();

    preferences.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    preferences
}

/// Parsed preferences of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    pub media_types: Vec<Preference>,
    pub languages: Vec<Preference>,
    pub charsets: Vec<Preference>,
    pub encodings: Vec<Preference>,
}

impl Preferences {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let parse = |name: header::HeaderName| -> Vec<Preference> {
            headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(parse_preferences)
                .collect()
        };

        let mut preferences = Self {
            media_types: parse(header::ACCEPT),
            languages: parse(header::ACCEPT_LANGUAGE),
            charsets: parse(header::ACCEPT_CHARSET),
            encodings: parse(header::ACCEPT_ENCODING),
        };
        // Repeated headers are parsed separately; re-sort the merged list
        for list in [
            &mut preferences.media_types,
            &mut preferences.languages,
            &mut preferences.charsets,
            &mut preferences.encodings,
        ] {
            list.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        }
        preferences
    }
}
