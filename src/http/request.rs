//! Request conversion and request IDs.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) unless the client sent one
//! - Open a trace span carrying the request ID, method and path
//! - Convert an HTTP request into an engine request within the body limit
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Bodies are buffered; hooks see the complete body as bytes

use axum::body::Body;
use axum::http::{HeaderName, StatusCode};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::rest::Request;

/// Header carrying the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Assigns `x-request-id` to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Copies `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Span opened for every request by the trace layer.
pub fn make_span<B>(request: &axum::http::Request<B>) -> tracing::Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Convert an HTTP request, buffering at most `max_body_bytes` of body.
pub async fn from_axum(request: axum::http::Request<Body>, max_body_bytes: usize) -> Result<Request, StatusCode> {
    let (parts, body) = request.into_parts();
    let target = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    let mut converted = Request::new(parts.method, target);
    converted.headers = parts.headers;
    converted.body = axum::body::to_bytes(body, max_body_bytes).await.map_err(|e| {
        tracing::debug!(error = %e, limit = max_body_bytes, "Request body rejected");
        StatusCode::PAYLOAD_TOO_LARGE
    })?;
    Ok(converted)
}
