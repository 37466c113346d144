//! Error taxonomy for dispatch, hooks, and cache backends.
//!
//! # Design Decisions
//! - Routing misses, negotiation failures, and unsupported methods never
//!   surface as errors; they are committed as 404/406/405 where they occur
//! - Hook failures propagate to the engine, which logs them and commits a 500
//! - Cache failures stop at the backend boundary (miss on read, no-op on
//!   invalidation) and never reach the client

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::rest::HookKind;

pub use crate::routing::matcher::PatternError;

/// Boxed error type accepted from hook code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error raised by a lifecycle hook or a plain function handler.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Message(String),

    #[error("invalid redirect status {0}: must be 3xx")]
    InvalidRedirect(u16),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] BoxError),
}

impl HookError {
    /// Create an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        HookError::Message(message.into())
    }
}

/// Fatal dispatch error, converted to a 5xx by the engine.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("hook `{hook}` of representation `{representation}` failed: {source}")]
    Hook {
        hook: HookKind,
        representation: String,
        #[source]
        source: HookError,
    },

    #[error("handler `{name}` failed: {source}")]
    Handler {
        name: String,
        #[source]
        source: HookError,
    },

    #[error("handler deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("handler task aborted: {0}")]
    TaskAborted(String),
}

impl DispatchError {
    /// HTTP status committed for this error when nothing was written yet.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure inside a cache backend, a tier, or a peer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend `{backend}` unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("peer {peer} rejected invalidation with status {status}")]
    PeerStatus { peer: String, status: u16 },

    #[error("peer request failed: {0}")]
    Peer(#[from] reqwest::Error),

    #[error("invalid peer address `{0}`")]
    InvalidPeer(String),
}
