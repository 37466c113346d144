//! Content codings (`Accept-Encoding` / `Content-Encoding`).
//!
//! # Design Decisions
//! - Supported codings are `gzip` and `deflate` (zlib framing, as HTTP
//!   means it) on top of `identity`; anything else the client lists is skipped
//! - The client's highest weighted supported coding wins; `*` never selects
//!   a coding, it only matters when weighted 0
//! - Identity is the fallback unless refused by `identity;q=0` or `*;q=0`

use std::fmt;
use std::io::{self, Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::negotiation::Preference;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Encoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
}

impl Encoding {
    /// Parse a coding token. `None` for codings this server cannot produce.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Some(Encoding::Identity),
            "gzip" | "x-gzip" => Some(Encoding::Gzip),
            "deflate" => Some(Encoding::Deflate),
            _ => None,
        }
    }

    /// The `Content-Encoding` token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Identity => "identity",
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Encoding::Identity
    }

    pub fn encode(self, body: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Encoding::Identity => Ok(body.to_vec()),
            Encoding::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(body)?;
                encoder.finish()
            }
            Encoding::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(body)?;
                encoder.finish()
            }
        }
    }

    pub fn decode(self, body: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoded = Vec::new();
        match self {
            Encoding::Identity => decoded.extend_from_slice(body),
            Encoding::Gzip => {
                GzDecoder::new(body).read_to_end(&mut decoded)?;
            }
            Encoding::Deflate => {
                ZlibDecoder::new(body).read_to_end(&mut decoded)?;
            }
        }
        Ok(decoded)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Choose the coding for a parsed `Accept-Encoding` list.
///
/// `preferences` must be sorted by descending weight, as
/// [`parse_preferences`](crate::negotiation::parse_preferences) returns them.
/// Returns `None` when the client refuses identity and lists nothing usable.
pub fn negotiate_encoding(preferences: &[Preference]) -> Option<Encoding> {
    let chosen = preferences
        .iter()
        .filter(|p| p.weight > 0.0)
        .find_map(|p| Encoding::from_token(&p.value));
    if chosen.is_some() {
        return chosen;
    }

    let refuses_identity = preferences
        .iter()
        .any(|p| p.weight == 0.0 && (p.value == "identity" || p.value == "*"));
    (!refuses_identity).then_some(Encoding::Identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::parse_preferences;

    fn pick(header: &str) -> Option<Encoding> {
        negotiate_encoding(&parse_preferences(header))
    }

    #[test]
    fn test_negotiate_encoding() {
        assert_eq!(pick(""), Some(Encoding::Identity));
        assert_eq!(pick("gzip, deflate"), Some(Encoding::Gzip));
        assert_eq!(pick("gzip;q=0.5, deflate"), Some(Encoding::Deflate));
        assert_eq!(pick("br, zstd"), Some(Encoding::Identity));
        assert_eq!(pick("gzip;q=0"), Some(Encoding::Identity));
        assert_eq!(pick("*"), Some(Encoding::Identity));
        assert_eq!(pick("br, *;q=0"), None);
        assert_eq!(pick("identity;q=0, deflate;q=0.1"), Some(Encoding::Deflate));
    }

    #[test]
    fn test_gzip_and_deflate_round_trip() {
        let body = b"alice has 2 chores\n".repeat(20);
        for encoding in [Encoding::Gzip, Encoding::Deflate] {
            let encoded = encoding.encode(&body).unwrap();
            assert_ne!(encoded, body);
            assert!(encoded.len() < body.len());
            assert_eq!(encoding.decode(&encoded).unwrap(), body);
        }
        // Gzip member header
        assert_eq!(&Encoding::Gzip.encode(b"x").unwrap()[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Encoding::Gzip.decode(b"not gzip").is_err());
        assert_eq!(Encoding::Identity.decode(b"plain").unwrap(), b"plain");
    }
}
