//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all dispatch route
//! - Mount the peer invalidation endpoint
//! - Wire up middleware (request ID, trace span)
//! - Bind server to listener and shut down gracefully
//! - Record request metrics

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::{any, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::cache::CacheBackend;
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::http::invalidation::invalidate;
use crate::http::request::{from_axum, make_span, propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::Deadline;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Target of peer invalidations; `None` when caching is disabled.
    pub local_cache: Option<Arc<dyn CacheBackend>>,
    pub deadline: Deadline,
    pub max_body_bytes: usize,
    pub server_name: Option<HeaderValue>,
    pub shared_secret: Option<String>,
}

/// HTTP front end of the dispatch engine.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ServerConfig, engine: Arc<Engine>, local_cache: Option<Arc<dyn CacheBackend>>) -> Self {
        let state = AppState {
            engine,
            local_cache,
            deadline: Deadline::from_secs(config.timeouts.handler_secs),
            max_body_bytes: config.listener.max_body_bytes,
            server_name: Some(config.listener.server_name.as_str())
                .filter(|name| !name.is_empty())
                .and_then(|name| HeaderValue::from_str(name).ok()),
            shared_secret: config.peers.shared_secret.clone().filter(|s| !s.is_empty()),
        };

        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route(&config.peers.invalidation_path, post(invalidate))
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(make_span))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// The configured router, for serving without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut signal = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler feeding the dispatch engine.
async fn dispatch(State(state): State<AppState>, request: axum::extract::Request) -> axum::response::Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let request = match from_axum(request, state.max_body_bytes).await {
        Ok(request) => request,
        Err(status) => {
            metrics::record_request(&method, status.as_u16(), start);
            return (status, status.canonical_reason().unwrap_or_default()).into_response();
        }
    };

    let mut response = state.engine.clone().serve(request, state.deadline).await;
    if let Some(name) = &state.server_name {
        response.headers.insert(header::SERVER, name.clone());
    }

    metrics::record_request(&method, response.status.as_u16(), start);
    response.into_response()
}
