//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! section carries defaults so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::cache::WritePolicy;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, naming, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Response cache backend tree.
    pub cache: CacheConfig,

    /// Peers of the distributed cache.
    pub peers: PeerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Value of the `Server` response header; empty disables it.
    pub server_name: String,

    /// Adds debug headers (cache hits) to responses.
    pub debug: bool,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            server_name: "facet-server".to_string(),
            debug: false,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Overall deadline for one request's handler chain, in seconds.
    pub handler_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { handler_secs: 30 }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disable to dispatch without any cache.
    pub enabled: bool,

    /// Whether stores block the producing request.
    pub write_policy: WritePolicy,

    /// Backend tree.
    pub backend: BackendConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_policy: WritePolicy::Synchronous,
            backend: BackendConfig::default(),
        }
    }
}

/// One node of the cache backend tree.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Unbounded map with a periodic expiry sweep.
    Map {
        #[serde(default = "default_prune_frequency")]
        prune_frequency_secs: u64,
    },

    /// Size-bounded LRU map.
    Memory {
        /// Budget in bytes.
        max_size: usize,
        /// Estimated cost per entry; 0 measures each entry.
        #[serde(default)]
        average_size: usize,
        #[serde(default = "default_prune_frequency")]
        prune_frequency_secs: u64,
    },

    /// Ordered tiers, fastest first.
    Tiered { tiers: Vec<BackendConfig> },

    /// Local backend plus peer invalidation. Only valid as the root.
    Distributed { local: Box<BackendConfig> },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory {
            max_size: 64 * 1024 * 1024,
            average_size: 0,
            prune_frequency_secs: default_prune_frequency(),
        }
    }
}

fn default_prune_frequency() -> u64 {
    60
}

/// Distributed cache peers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Static peer base URLs (e.g., "http://10.0.0.2:8080").
    pub peers: Vec<String>,

    /// Path of the invalidation endpoint, served locally and called on peers.
    pub invalidation_path: String,

    /// Bearer token required on, and sent with, invalidation requests.
    pub shared_secret: Option<String>,

    /// Per-peer broadcast timeout in milliseconds.
    pub broadcast_timeout_ms: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            invalidation_path: "/_cache/invalidate".to_string(),
            shared_secret: None,
            broadcast_timeout_ms: 2000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
