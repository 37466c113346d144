//! Buffered response produced by the hook pipeline.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use time::OffsetDateTime;

use crate::negotiation::Encoding;

/// Charset applied when a representation does not declare one.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Response under construction. Nothing reaches the wire until the engine
/// hands the finished value to the transport.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    pub charset: Option<String>,
    pub language: Option<String>,
    /// Opaque version identifier, rendered as the ETag.
    pub signature: Option<String>,
    pub weak_signature: bool,
    /// Modification time, rendered as `Last-Modified`.
    pub timestamp: Option<OffsetDateTime>,
    /// Negotiated content coding. Hooks always write the identity body; the
    /// pipeline encodes it when the response is finalized.
    pub encoding: Encoding,
    pub body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            content_type: None,
            charset: None,
            language: None,
            signature: None,
            weak_signature: false,
            timestamp: None,
            encoding: Encoding::Identity,
            body: Vec::new(),
        }
    }
}

impl Response {
    /// A bare response with a status and a plain-text body.
    pub fn with_status(status: StatusCode, message: &str) -> Self {
        let mut response = Self {
            status,
            content_type: Some("text/plain".to_string()),
            charset: Some(DEFAULT_CHARSET.to_string()),
            ..Self::default()
        };
        response.body.extend_from_slice(message.as_bytes());
        response
    }

    /// Set a header, ignoring invalid names or values.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::from_str(value)) {
            self.headers.insert(name, value);
        }
    }

    /// The `Content-Type` value including the charset parameter.
    pub fn content_type_header(&self) -> Option<String> {
        let content_type = self.content_type.as_ref()?;
        Some(match &self.charset {
            Some(charset) => format!("{}; charset={}", content_type, charset),
            None => content_type.clone(),
        })
    }

    /// The quoted ETag for the current signature. Encoded bodies get a
    /// coding suffix so each coding has its own validator.
    pub fn etag(&self) -> Option<String> {
        let signature = self.signature.as_ref()?;
        let tag = if self.encoding.is_identity() {
            signature.clone()
        } else {
            format!("{}-{}", signature, self.encoding)
        };
        Some(if self.weak_signature {
            format!("W/\"{}\"", tag)
        } else {
            format!("\"{}\"", tag)
        })
    }

    /// Clear the body and switch to `304 Not Modified`.
    pub fn not_modified(&mut self) {
        self.status = StatusCode::NOT_MODIFIED;
        self.body.clear();
    }

    /// Write the representation metadata into the header map.
    pub fn apply_metadata_headers(&mut self) {
        if let Some(value) = self.content_type_header() {
            if let Ok(value) = HeaderValue::from_str(&value) {
                self.headers.insert(header::CONTENT_TYPE, value);
            }
        }
        if let Some(language) = self.language.clone() {
            if let Ok(value) = HeaderValue::from_str(&language) {
                self.headers.insert(header::CONTENT_LANGUAGE, value);
            }
        }
        if let Some(etag) = self.etag() {
            if let Ok(value) = HeaderValue::from_str(&etag) {
                self.headers.insert(header::ETAG, value);
            }
        }
        if let Some(timestamp) = self.timestamp {
            if let Some(value) = crate::rest::conditional::format_http_date(timestamp)
                .and_then(|text| HeaderValue::from_str(&text).ok())
            {
                self.headers.insert(header::LAST_MODIFIED, value);
            }
        }
    }
}
