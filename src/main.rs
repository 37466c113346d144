//! Facet server.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                   FACET SERVER                    │
//!                         │                                                   │
//!   Client Request        │  ┌─────────┐   ┌──────────┐   ┌───────────────┐  │
//!   ──────────────────────┼─▶│  http   │──▶│  engine  │──▶│    routing    │  │
//!                         │  │ server  │   │(blocking │   │ router/route  │  │
//!                         │  └─────────┘   │  pool)   │   └───────┬───────┘  │
//!                         │       ▲        └──────────┘           ▼          │
//!                         │       │                      ┌───────────────┐   │
//!                         │       │                      │     rest      │   │
//!   Client Response       │       │                      │resource/facet │   │
//!   ◀─────────────────────┼───────┘                      │ negotiation + │   │
//!                         │                              │ hook pipeline │   │
//!                         │                              └───────┬───────┘   │
//!                         │                                      ▼           │
//!   Peer invalidation     │  ┌─────────────┐            ┌───────────────┐   │
//!   ──────────────────────┼─▶│invalidation │───────────▶│     cache     │───┼──▶ Peers
//!                         │  └─────────────┘            │map/memory/tier│   │
//!                         │                             │ /distributed  │   │
//!                         │                             └───────────────┘   │
//!                         │  ┌─────────────────────────────────────────────┐│
//!                         │  │ config │ observability │ lifecycle │platform ││
//!                         │  └─────────────────────────────────────────────┘│
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use facet_server::cache::{build_backend, Cache};
use facet_server::config::{load_config, ServerConfig};
use facet_server::lifecycle::{signals, StartGroup};
use facet_server::observability::{logging, metrics};
use facet_server::platform::Registry;
use facet_server::{demo, Engine, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "facet-server")]
#[command(about = "Serves the demo people site through the facet dispatch engine", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("facet-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        handler_secs = config.timeouts.handler_secs,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let mut components = StartGroup::new();

    let (cache, local_cache) = if config.cache.enabled {
        let stack = build_backend(&config.cache, &config.peers)?;
        components.extend(stack.startables());
        (
            Some(Cache::new(stack.backend.clone(), config.cache.write_policy)),
            Some(stack.local.clone()),
        )
    } else {
        (None, None)
    };

    let registry = Registry::new();
    let engine = Engine::new(demo::site(&registry)?)
        .with_cache(cache)
        .with_debug(config.listener.debug);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    components.start_all(&shutdown);

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::shutdown_on_signal(&signal_shutdown).await;
    });

    let server = HttpServer::new(&config, Arc::new(engine), local_cache);
    server.run(listener, shutdown).await?;

    components.stop_all();
    tracing::info!("Shutdown complete");
    Ok(())
}
