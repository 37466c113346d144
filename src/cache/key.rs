//! Cache key derivation.
//!
//! # Responsibilities
//! - Default the logical key to the normalised request path
//! - Compose the stored key from the logical key and the negotiated
//!   content type, charset and language
//! - Collect the group tags attached by hooks
//!
//! # Design Decisions
//! - The composite key keeps different negotiated variants of one resource
//!   from ever colliding
//! - An empty logical key disables caching for the request

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rest::{Context, Request};

/// A composite key as stored in a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compose `key|content_type|charset|language`.
    pub fn compose(key: &str, content_type: &str, charset: &str, language: &str) -> Self {
        CacheKey(format!("{}|{}|{}|{}", key, content_type, charset, language))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The logical key this composite key was built from.
    pub fn logical(&self) -> &str {
        self.0.split('|').next().unwrap_or_default()
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey(value.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        CacheKey(value)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives keys and group sets from request state and hook output.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// `/` + decoded path, plus the query with parameters sorted by name so
    /// that `?a=1&b=2` and `?b=2&a=1` share an entry.
    pub fn default_key(request: &Request) -> String {
        let mut key = format!("/{}", request.path);
        let mut pairs = request.query_pairs();
        if !pairs.is_empty() {
            pairs.sort();
            let query: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| if v.is_empty() { k } else { format!("{}={}", k, v) })
                .collect();
            key.push('?');
            key.push_str(&query.join("&"));
        }
        key
    }

    /// The composite key for the current context, or `None` when caching is
    /// disabled by an empty logical key.
    pub fn derive(ctx: &Context) -> Option<CacheKey> {
        if ctx.cache_key.is_empty() {
            return None;
        }
        let response = &ctx.response;
        Some(CacheKey::compose(
            &ctx.cache_key,
            response.content_type.as_deref().unwrap_or_default(),
            response.charset.as_deref().unwrap_or_default(),
            response.language.as_deref().unwrap_or_default(),
        ))
    }

    /// Group tags in insertion order, without duplicates or empty tags.
    pub fn groups(ctx: &Context) -> Vec<String> {
        let mut groups: Vec<String> = Vec::with_capacity(ctx.cache_groups.len());
        for group in &ctx.cache_groups {
            if !group.is_empty() && !groups.contains(group) {
                groups.push(group.clone());
            }
        }
        groups
    }
}
