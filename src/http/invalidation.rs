//! Peer invalidation endpoint.
//!
//! # Responsibilities
//! - Accept `InvalidationMessage` JSON from cache peers
//! - Check the shared bearer secret when one is configured
//! - Apply the message to the local cache only
//!
//! # Design Decisions
//! - Authorization is checked before the body is parsed
//! - The bearer token is compared in constant time
//! - Never re-broadcast: a peer's invalidation stops here

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use subtle::ConstantTimeEq;

use crate::cache::{apply_local, InvalidationMessage};
use crate::http::server::AppState;

/// `POST {invalidation_path}`
pub async fn invalidate(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if !authorized(&headers, state.shared_secret.as_deref()) {
        tracing::warn!("Rejected unauthorized cache invalidation");
        return StatusCode::UNAUTHORIZED;
    }

    let Some(local) = &state.local_cache else {
        return StatusCode::NOT_FOUND;
    };

    let message: InvalidationMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed invalidation message");
            return StatusCode::BAD_REQUEST;
        }
    };

    match apply_local(local.as_ref(), &message) {
        Ok(()) => {
            tracing::debug!(?message, "Applied peer invalidation");
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            tracing::warn!(?message, error = %e, "Peer invalidation failed locally");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(secret.as_bytes())))
}
