//! Stored representation snapshots.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use time::OffsetDateTime;

use crate::negotiation::Encoding;

/// A cached response for one composite key.
///
/// Groups are fixed at insertion; a later `set` under the same key replaces
/// them with whatever the new entry carries.
///
/// The body is kept per content coding. Usually only the coding the first
/// client negotiated is stored; other codings are produced from it on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub status: u16,
    /// Response headers minus `Cache-Control` and coding headers, replayed on hit.
    pub headers: Vec<(String, String)>,
    pub bodies: BTreeMap<Encoding, Bytes>,
    pub signature: Option<String>,
    pub weak_signature: bool,
    pub timestamp: Option<OffsetDateTime>,
    pub groups: Vec<String>,
    /// `None` never expires.
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    /// An entry for an identity `body` that lives for `ttl`.
    pub fn new(body: impl Into<Bytes>, ttl: Duration) -> Self {
        Self::encoded(Encoding::Identity, body, ttl)
    }

    /// An entry for `body` already in `encoding`.
    pub fn encoded(encoding: Encoding, body: impl Into<Bytes>, ttl: Duration) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            bodies: BTreeMap::from([(encoding, body.into())]),
            signature: None,
            weak_signature: false,
            timestamp: None,
            groups: Vec::new(),
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Whether no stored coding carries any bytes.
    pub fn is_empty(&self) -> bool {
        self.bodies.values().all(Bytes::is_empty)
    }

    /// The body in `encoding`, re-encoded from a stored coding when that
    /// coding was never stored. `None` if no stored body can be decoded.
    pub fn body(&self, encoding: Encoding) -> Option<Bytes> {
        if let Some(body) = self.bodies.get(&encoding) {
            return Some(body.clone());
        }

        let plain: Cow<'_, [u8]> = match self.bodies.get(&Encoding::Identity) {
            Some(plain) => Cow::Borrowed(plain.as_ref()),
            None => Cow::Owned(self.bodies.iter().find_map(|(stored, body)| {
                stored
                    .decode(body)
                    .map_err(|e| tracing::warn!(encoding = %stored, error = %e, "Cached body failed to decode"))
                    .ok()
            })?),
        };

        match encoding.encode(&plain) {
            Ok(body) => Some(Bytes::from(body)),
            Err(e) => {
                tracing::warn!(encoding = %encoding, error = %e, "Cached body failed to re-encode");
                None
            }
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Remaining lifetime, zero once expired. `None` never expires.
    pub fn time_to_live(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Estimated in-memory cost in bytes.
    pub fn size(&self) -> usize {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        let groups: usize = self.groups.iter().map(String::len).sum();
        let signature = self.signature.as_ref().map_or(0, String::len);
        let bodies: usize = self.bodies.values().map(Bytes::len).sum();
        bodies + headers + groups + signature
    }
}
