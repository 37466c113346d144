//! Conditional request evaluation (`If-None-Match`, `If-Modified-Since`).
//!
//! # Design Decisions
//! - `If-None-Match` takes precedence: when the client sends it and the
//!   response has a signature, `If-Modified-Since` is ignored
//! - ETags are compared weakly (a `W/` prefix on either side is ignored)
//! - Timestamps compare at second precision, as HTTP dates carry no more

use axum::http::{header, HeaderMap};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::rest::Response;

const HTTP_DATE: &[time::format_description::FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Render an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(timestamp: OffsetDateTime) -> Option<String> {
    timestamp.to_offset(UtcOffset::UTC).format(HTTP_DATE).ok()
}

/// Parse an IMF-fixdate. Obsolete date formats are not accepted.
pub fn parse_http_date(text: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(text.trim(), HTTP_DATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Whether the client's cached copy is still current.
pub fn is_not_modified(request_headers: &HeaderMap, response: &Response) -> bool {
    if let Some(etag) = response.etag() {
        if let Some(if_none_match) = request_headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
        {
            let ours = strip_weak(&etag);
            return if_none_match
                .split(',')
                .map(str::trim)
                .any(|theirs| theirs == "*" || strip_weak(theirs) == ours);
        }
    }

    let Some(timestamp) = response.timestamp else {
        return false;
    };
    let Some(since) = request_headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
    else {
        return false;
    };

    timestamp.unix_timestamp() <= since.unix_timestamp()
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}
