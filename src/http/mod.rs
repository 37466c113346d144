//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span)
//!     → request.rs (convert to an engine Request, enforce body limit)
//!     → Engine::serve (blocking pool, handler deadline)
//!     → response.rs (engine Response → HTTP response)
//!     → Send to client
//!
//! Peer invalidation:
//!     POST {invalidation_path}
//!     → invalidation.rs (bearer check, apply to the local cache only)
//! ```

pub mod invalidation;
pub mod request;
pub mod response;
pub mod server;

pub use request::{from_axum, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
