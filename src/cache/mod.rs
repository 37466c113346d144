//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! HookPipeline (after construct)
//!     → key.rs (composite key from cache_key + negotiated variant)
//!     → Cache::load → CacheBackend::get
//!         map.rs | memory.rs | tiered.rs | distributed.rs
//!     → hit: replay entry / miss: run describe + present
//!     → Cache::store (synchronous or background, per WritePolicy)
//!
//! Hooks / peers:
//!     → invalidate_group(tag) → groups.rs index → remove every key under tag
//!     → distributed.rs broadcasts delete/invalidate to peers
//! ```
//!
//! # Design Decisions
//! - Backends are a single object-safe trait; composites hold `Arc<dyn CacheBackend>`
//! - Backend failures stop at `Cache`: a failed read is a miss, a failed
//!   write or invalidation is logged and dropped
//! - Every backend keeps its group index under the same lock as its entries

pub mod distributed;
pub mod entry;
pub mod groups;
pub mod key;
pub(crate) mod lock;
pub mod map;
pub mod memory;
pub mod sweep;
pub mod tiered;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, CacheConfig, PeerConfig};
use crate::error::CacheError;
use crate::lifecycle::Startable;
use crate::observability::metrics;

pub use distributed::{apply_local, DistributedBackend, InvalidationMessage, PeerSet};
pub use entry::CacheEntry;
pub use groups::GroupIndex;
pub use key::{CacheKey, CacheKeyBuilder};
pub use map::MapBackend;
pub use memory::MemoryBackend;
pub use tiered::TieredBackend;

/// Storage contract implemented by every backend.
///
/// All methods may be called concurrently from many requests.
pub trait CacheBackend: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Fetch an entry. Expired entries may be returned; callers check expiry.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or replace an entry, indexing it under its groups.
    fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError>;

    /// Remove one entry. Removing a missing key is not an error.
    fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Remove every entry indexed under `group`. Idempotent.
    fn invalidate_group(&self, group: &str) -> Result<(), CacheError>;

    /// Background components owned by this backend.
    fn startables(&self) -> Vec<Arc<dyn Startable>> {
        Vec::new()
    }
}

/// Whether stores block the request that produced them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    #[default]
    Synchronous,
    /// Stores run on the blocking pool; without a runtime they run inline.
    Background,
}

/// Request-facing cache handle used by the hook pipeline.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    policy: WritePolicy,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.backend.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, policy: WritePolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Look up a live entry. Failures and expired entries count as misses.
    pub fn load(&self, key: &CacheKey) -> Option<CacheEntry> {
        let found = match self.backend.get(key) {
            Ok(Some(entry)) if !entry.is_expired(Instant::now()) => Some(entry),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), cache_key = %key, error = %e, "Cache read failed; treating as miss");
                None
            }
        };
        metrics::record_cache_lookup(found.is_some());
        found
    }

    /// Store an entry according to the write policy.
    pub fn store(&self, key: CacheKey, entry: CacheEntry) {
        metrics::record_cache_store();
        let backend = self.backend.clone();
        let write = move || {
            if let Err(e) = backend.set(&key, entry) {
                tracing::warn!(backend = backend.name(), cache_key = %key, error = %e, "Cache write failed");
            }
        };

        match (self.policy, tokio::runtime::Handle::try_current()) {
            (WritePolicy::Background, Ok(runtime)) => {
                runtime.spawn_blocking(write);
            }
            _ => write(),
        }
    }

    /// Delete one entry; failures are logged.
    pub fn delete(&self, key: &CacheKey) {
        metrics::record_cache_invalidation("delete");
        if let Err(e) = self.backend.delete(key) {
            tracing::warn!(backend = self.backend.name(), cache_key = %key, error = %e, "Cache delete failed");
        }
    }

    /// Invalidate a group; failures are logged.
    pub fn invalidate_group(&self, group: &str) {
        metrics::record_cache_invalidation("group");
        if let Err(e) = self.backend.invalidate_group(group) {
            tracing::warn!(backend = self.backend.name(), group, error = %e, "Cache group invalidation failed");
        }
    }
}

/// A built backend tree.
pub struct CacheStack {
    /// Backend used by requests.
    pub backend: Arc<dyn CacheBackend>,
    /// Backend that invalidations received from peers apply to. Equal to
    /// `backend` unless the tree is distributed.
    pub local: Arc<dyn CacheBackend>,
    /// Peer set of the distributed backend, replaced by discovery.
    pub peers: Option<PeerSet>,
}

impl CacheStack {
    pub fn startables(&self) -> Vec<Arc<dyn Startable>> {
        self.backend.startables()
    }
}

/// Build the backend tree described by configuration.
pub fn build_backend(config: &CacheConfig, peers: &PeerConfig) -> Result<CacheStack, CacheError> {
    if let BackendConfig::Distributed { local } = &config.backend {
        let local = build_node(local)?;
        let peer_set = PeerSet::from_config(peers)?;
        let distributed = Arc::new(DistributedBackend::new(
            local.clone(),
            peer_set.clone(),
            peers,
        )?);
        return Ok(CacheStack {
            backend: distributed,
            local,
            peers: Some(peer_set),
        });
    }

    let backend = build_node(&config.backend)?;
    Ok(CacheStack {
        local: backend.clone(),
        backend,
        peers: None,
    })
}

fn build_node(config: &BackendConfig) -> Result<Arc<dyn CacheBackend>, CacheError> {
    let backend: Arc<dyn CacheBackend> = match config {
        BackendConfig::Map { prune_frequency_secs } => Arc::new(MapBackend::new(
            "map",
            Duration::from_secs(*prune_frequency_secs),
        )),
        BackendConfig::Memory {
            max_size,
            average_size,
            prune_frequency_secs,
        } => Arc::new(MemoryBackend::new(
            "memory",
            *max_size,
            *average_size,
            Duration::from_secs(*prune_frequency_secs),
        )),
        BackendConfig::Tiered { tiers } => {
            let tiers = tiers.iter().map(build_node).collect::<Result<Vec<_>, _>>()?;
            Arc::new(TieredBackend::new("tiered", tiers))
        }
        BackendConfig::Distributed { .. } => {
            return Err(CacheError::Unavailable {
                backend: "distributed".to_string(),
                reason: "distributed backend must be the outermost backend".to_string(),
            })
        }
    };
    Ok(backend)
}
