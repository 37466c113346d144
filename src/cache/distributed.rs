//! Distributed backend: a local backend plus best-effort peer invalidation.
//!
//! # Responsibilities
//! - Serve every read and write from the local backend
//! - Broadcast deletes and group invalidations to every known peer
//! - Apply invalidations received from peers to the local backend only
//!
//! # Design Decisions
//! - Writes are never replicated; invalidation is the only consistency
//!   mechanism between peers
//! - Broadcasts run on the Tokio runtime and never block the request;
//!   per-peer failures are logged and counted, never rolled back
//! - The peer list is swapped atomically by the discovery collaborator

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::{CacheBackend, CacheEntry, CacheKey};
use crate::config::PeerConfig;
use crate::error::CacheError;
use crate::lifecycle::Startable;
use crate::observability::metrics;

/// Invalidation sent to, and received from, peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InvalidationMessage {
    Delete { key: CacheKey },
    InvalidateGroup { group: String },
}

/// Known peers, replaceable at runtime without locking readers.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: Arc<ArcSwap<Vec<Url>>>,
}

impl PeerSet {
    pub fn new(peers: Vec<Url>) -> Self {
        Self {
            peers: Arc::new(ArcSwap::from_pointee(peers)),
        }
    }

    /// Parse the static peer list from configuration.
    pub fn from_config(config: &PeerConfig) -> Result<Self, CacheError> {
        let peers = config
            .peers
            .iter()
            .map(|peer| Url::parse(peer).map_err(|_| CacheError::InvalidPeer(peer.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(peers))
    }

    /// Replace the whole peer list. In-flight broadcasts keep their snapshot.
    pub fn replace(&self, peers: Vec<Url>) {
        tracing::info!(peers = peers.len(), "Cache peer set replaced");
        self.peers.store(Arc::new(peers));
    }

    pub fn snapshot(&self) -> Arc<Vec<Url>> {
        self.peers.load_full()
    }
}

/// Everything a broadcast needs, cheap to clone into a task.
#[derive(Clone)]
struct Broadcaster {
    client: reqwest::Client,
    peers: PeerSet,
    invalidation_path: String,
    shared_secret: Option<String>,
}

impl Broadcaster {
    async fn send(&self, message: &InvalidationMessage) -> Vec<(Url, Result<(), CacheError>)> {
        let peers = self.peers.snapshot();
        let sends = peers.iter().map(|peer| async move {
            let result = self.send_one(peer, message).await;
            (peer.clone(), result)
        });
        join_all(sends).await
    }

    async fn send_one(&self, peer: &Url, message: &InvalidationMessage) -> Result<(), CacheError> {
        let endpoint = peer
            .join(&self.invalidation_path)
            .map_err(|_| CacheError::InvalidPeer(peer.to_string()))?;

        let mut request = self.client.post(endpoint).json(message);
        if let Some(secret) = &self.shared_secret {
            request = request.bearer_auth(secret);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(CacheError::PeerStatus {
                peer: peer.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Local backend with invalidation broadcast.
pub struct DistributedBackend {
    name: String,
    local: Arc<dyn CacheBackend>,
    broadcaster: Broadcaster,
}

impl DistributedBackend {
    pub fn new(
        local: Arc<dyn CacheBackend>,
        peers: PeerSet,
        config: &PeerConfig,
    ) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.broadcast_timeout_ms))
            .build()?;

        Ok(Self {
            name: "distributed".to_string(),
            local,
            broadcaster: Broadcaster {
                client,
                peers,
                invalidation_path: config.invalidation_path.clone(),
                shared_secret: config.shared_secret.clone().filter(|s| !s.is_empty()),
            },
        })
    }

    pub fn local(&self) -> &Arc<dyn CacheBackend> {
        &self.local
    }

    pub fn peers(&self) -> &PeerSet {
        &self.broadcaster.peers
    }

    /// Apply an invalidation received from a peer. Never re-broadcast.
    pub fn apply_remote(&self, message: &InvalidationMessage) -> Result<(), CacheError> {
        apply_local(self.local.as_ref(), message)
    }

    /// Send `message` to every peer and wait for all of them.
    pub async fn broadcast_now(&self, message: &InvalidationMessage) -> Vec<(Url, Result<(), CacheError>)> {
        let results = self.broadcaster.send(message).await;
        for (peer, result) in &results {
            if let Err(e) = result {
                tracing::warn!(peer = %peer, error = %e, "Cache invalidation broadcast failed");
                metrics::record_peer_broadcast_failure();
            }
        }
        results
    }

    fn broadcast(&self, message: InvalidationMessage) {
        if self.broadcaster.peers.snapshot().is_empty() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(?message, "No async runtime; invalidation not broadcast");
            return;
        };

        let broadcaster = self.broadcaster.clone();
        runtime.spawn(async move {
            for (peer, result) in broadcaster.send(&message).await {
                match result {
                    Ok(()) => tracing::debug!(peer = %peer, ?message, "Invalidation delivered"),
                    Err(e) => {
                        tracing::warn!(peer = %peer, error = %e, "Cache invalidation broadcast failed");
                        metrics::record_peer_broadcast_failure();
                    }
                }
            }
        });
    }
}

/// Apply a message to a backend without any broadcast.
pub fn apply_local(backend: &dyn CacheBackend, message: &InvalidationMessage) -> Result<(), CacheError> {
    match message {
        InvalidationMessage::Delete { key } => backend.delete(key),
        InvalidationMessage::InvalidateGroup { group } => backend.invalidate_group(group),
    }
}

impl fmt::Debug for DistributedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedBackend")
            .field("local", &self.local)
            .field("peers", &self.broadcaster.peers.snapshot().len())
            .finish()
    }
}

impl CacheBackend for DistributedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        self.local.get(key)
    }

    fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.local.set(key, entry)
    }

    fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        let result = self.local.delete(key);
        self.broadcast(InvalidationMessage::Delete { key: key.clone() });
        result
    }

    fn invalidate_group(&self, group: &str) -> Result<(), CacheError> {
        let result = self.local.invalidate_group(group);
        self.broadcast(InvalidationMessage::InvalidateGroup {
            group: group.to_string(),
        });
        result
    }

    fn startables(&self) -> Vec<Arc<dyn Startable>> {
        self.local.startables()
    }
}
