//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use facet_server::cache::{build_backend, Cache, InvalidationMessage};
use facet_server::config::ServerConfig;
use facet_server::lifecycle::StartGroup;
use facet_server::routing::Handler;
use facet_server::{Engine, HttpServer, Shutdown};

/// A running server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub components: StartGroup,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.components.stop_all();
        self.shutdown.trigger();
    }
}

/// Config for tests: loopback listener, debug headers, short deadline.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.debug = true;
    config.timeouts.handler_secs = 5;
    config
}

/// Start a server for `site` with the cache tree described by `config`.
pub async fn start_server(config: ServerConfig, site: Handler) -> TestServer {
    let shutdown = Shutdown::new();
    let mut components = StartGroup::new();

    let (cache, local) = if config.cache.enabled {
        let stack = build_backend(&config.cache, &config.peers).unwrap();
        components.extend(stack.startables());
        (
            Some(Cache::new(stack.backend.clone(), config.cache.write_policy)),
            Some(stack.local.clone()),
        )
    } else {
        (None, None)
    };
    components.start_all(&shutdown);

    let engine = Engine::new(site).with_cache(cache).with_debug(config.listener.debug);
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(&config, Arc::new(engine), local);
    let run_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, run_shutdown).await;
    });

    TestServer {
        addr,
        shutdown,
        components,
    }
}

/// Invalidations received by a mock peer, with their authorization header.
pub type Received = Arc<Mutex<Vec<(Option<String>, InvalidationMessage)>>>;

/// Start a peer that records every invalidation it receives.
pub async fn start_mock_peer(path: &'static str) -> (SocketAddr, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();

    let app = Router::new().route(
        path,
        post(move |headers: HeaderMap, body: axum::body::Bytes| {
            let sink = sink.clone();
            async move {
                let auth = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match serde_json::from_slice::<InvalidationMessage>(&body) {
                    Ok(message) => {
                        sink.lock().unwrap().push((auth, message));
                        StatusCode::NO_CONTENT
                    }
                    Err(_) => StatusCode::BAD_REQUEST,
                }
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, received)
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll `check` until it holds or two seconds pass.
#[allow(dead_code)]
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
