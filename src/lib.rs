//! Request dispatch and response caching engine.
//!
//! Requests travel a tree of routers, resources and facets, are negotiated
//! to one representation, run through that representation's hook lifecycle
//! and are served from, or stored into, a pluggable cache with group
//! invalidation.

pub mod cache;
pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod negotiation;
pub mod observability;
pub mod platform;
pub mod resilience;
pub mod rest;
pub mod routing;

pub use config::ServerConfig;
pub use engine::{Engine, Outcome};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
