//! Content negotiation.
//!
//! # Data Flow
//! ```text
//! Request headers
//!     → preference.rs (weighted Accept / Accept-Language / Accept-Charset)
//!     → negotiate() scores every (representation, content type, language)
//!     → Negotiated { index, content_type, language, charset } or None (406)
//!     → negotiate_encoding() picks the content coding (encoding.rs)
//! ```
//!
//! # Design Decisions
//! - Each axis scores independently: explicit match 1.0, partial 0.5,
//!   wildcard 0.25, undeclared 0.01, multiplied by the client's weight
//! - A declared value that no client range accepts (or that the most
//!   specific matching range weights at 0) rejects the candidate
//! - The aggregate score is the product of the three axes
//! - Ties keep declaration order: representation, then content type, then language

pub mod encoding;
pub mod preference;

pub use encoding::{negotiate_encoding, Encoding};
pub use preference::{parse_preferences, Preference, Preferences};

use crate::rest::{Representation, DEFAULT_CHARSET};

const EXPLICIT: f32 = 1.0;
const PARTIAL: f32 = 0.5;
const WILDCARD: f32 = 0.25;
const ABSENT: f32 = 0.01;

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiated {
    /// Index of the chosen representation in declaration order.
    pub index: usize,
    pub content_type: Option<String>,
    pub language: Option<String>,
    pub charset: String,
    pub score: f32,
}

/// Choose the best representation for the client's preferences.
///
/// Returns `None` when every representation is incompatible.
pub fn negotiate(representations: &[Representation], preferences: &Preferences) -> Option<Negotiated> {
    negotiate_among(representations.iter().enumerate(), preferences)
}

/// Like [`negotiate`], over a subset of representations tagged with their
/// declaration index. The returned index is the tag of the winner.
pub fn negotiate_among<'a, I>(representations: I, preferences: &Preferences) -> Option<Negotiated>
where
    I: IntoIterator<Item = (usize, &'a Representation)>,
{
    let mut best: Option<Negotiated> = None;

    for (index, representation) in representations {
        let charset = representation
            .declared_charset()
            .unwrap_or(DEFAULT_CHARSET)
            .to_string();
        let Some(charset_score) = score_charset(&charset, &preferences.charsets) else {
            continue;
        };

        let content_types = candidates(representation.declared_content_types());
        let languages = candidates(representation.declared_languages());

        for content_type in &content_types {
            let Some(type_score) = score_media_type(content_type.as_deref(), &preferences.media_types) else {
                continue;
            };

            for language in &languages {
                let Some(language_score) = score_language(language.as_deref(), &preferences.languages) else {
                    continue;
                };

                let score = type_score * language_score * charset_score;
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(Negotiated {
                        index,
                        content_type: content_type.clone(),
                        language: language.clone(),
                        charset: charset.clone(),
                        score,
                    });
                }
            }
        }
    }

    best
}

/// Declared values, or a single "undeclared" slot.
fn candidates(declared: &[String]) -> Vec<Option<String>> {
    if declared.is_empty() {
        vec![None]
    } else {
        declared.iter().cloned().map(Some).collect()
    }
}

/// Specificity and weight of the most specific matching range.
fn best_range<F>(preferences: &[Preference], specificity: F) -> Option<f32>
where
    F: Fn(&str) -> Option<f32>,
{
    let (level, weight) = preferences
        .iter()
        .filter_map(|p| specificity(&p.value).map(|level| (level, p.weight)))
        // Most specific first; among equals the first (highest weighted) wins
        .fold(None, |acc: Option<(f32, f32)>, (level, weight)| match acc {
            Some((best, _)) if best >= level => acc,
            _ => Some((level, weight)),
        })?;

    (weight > 0.0).then_some(level * weight)
}

fn score_media_type(declared: Option<&str>, preferences: &[Preference]) -> Option<f32> {
    if preferences.is_empty() {
        return Some(EXPLICIT);
    }
    let Some(declared) = declared else {
        return Some(ABSENT);
    };
    let declared_major = declared.split('/').next().unwrap_or(declared);

    best_range(preferences, |range| {
        if range == declared {
            Some(EXPLICIT)
        } else if range == "*/*" || range == "*" {
            Some(WILDCARD)
        } else {
            match range.split_once('/') {
                Some((major, "*")) if major == declared_major => Some(PARTIAL),
                _ => None,
            }
        }
    })
}

fn score_language(declared: Option<&str>, preferences: &[Preference]) -> Option<f32> {
    if preferences.is_empty() {
        return Some(EXPLICIT);
    }
    let Some(declared) = declared else {
        return Some(ABSENT);
    };

    best_range(preferences, |range| {
        if range == declared {
            Some(EXPLICIT)
        } else if range == "*" {
            Some(WILDCARD)
        } else if is_prefix_tag(range, declared) || is_prefix_tag(declared, range) {
            Some(PARTIAL)
        } else {
            None
        }
    })
}

fn score_charset(declared: &str, preferences: &[Preference]) -> Option<f32> {
    if preferences.is_empty() {
        return Some(EXPLICIT);
    }

    best_range(preferences, |range| {
        if range == declared {
            Some(EXPLICIT)
        } else if range == "*" {
            Some(WILDCARD)
        } else {
            None
        }
    })
}

/// `en` is a prefix tag of `en-us`.
fn is_prefix_tag(prefix: &str, tag: &str) -> bool {
    tag.len() > prefix.len() && tag.starts_with(prefix) && tag.as_bytes()[prefix.len()] == b'-'
}
