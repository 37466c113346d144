//! Size-bounded in-memory backend with LRU eviction.
//!
//! # Responsibilities
//! - Track the estimated total size of stored entries
//! - Evict least-recently-used entries once the total exceeds `max_size`
//! - Keep the group index consistent with every removal, eviction included
//!
//! # Design Decisions
//! - Entry cost is the configured `average_size` when non-zero, otherwise
//!   the measured size of the entry
//! - Recency, map and index live under one mutex so an evicted key leaves
//!   its groups in the same critical section
//! - An entry larger than `max_size` on its own is not stored

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::cache::lock::lock_state;
use crate::cache::sweep::{Prune, PruneSweep};
use crate::cache::{CacheBackend, CacheEntry, CacheKey, GroupIndex};
use crate::error::CacheError;
use crate::lifecycle::Startable;
use crate::observability::metrics;

struct Stored {
    entry: CacheEntry,
    cost: usize,
}

struct MemoryState {
    entries: LruCache<CacheKey, Stored>,
    groups: GroupIndex,
    total: usize,
}

impl MemoryState {
    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let stored = self.entries.pop(key)?;
        self.total -= stored.cost;
        self.groups.remove(key, &stored.entry.groups);
        Some(stored.entry)
    }

    fn evict_until(&mut self, max_size: usize) -> usize {
        let mut evicted = 0;
        while self.total > max_size {
            let Some((key, stored)) = self.entries.pop_lru() else {
                break;
            };
            self.total -= stored.cost;
            self.groups.remove(&key, &stored.entry.groups);
            evicted += 1;
        }
        evicted
    }
}

struct Shared {
    state: Mutex<MemoryState>,
}

impl Prune for Shared {
    fn prune(&self) -> usize {
        let now = Instant::now();
        let mut state = lock_state(&self.state, "memory", "prune");
        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, stored)| stored.entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }

        let MemoryState { entries, groups, .. } = &mut *state;
        groups.prune(|key| entries.contains(key));
        expired.len()
    }
}

/// Bounded in-memory backend.
pub struct MemoryBackend {
    name: String,
    max_size: usize,
    average_size: usize,
    shared: Arc<Shared>,
    sweep: Arc<PruneSweep>,
}

impl MemoryBackend {
    /// `max_size` and `average_size` are in bytes; `average_size == 0`
    /// measures each entry instead.
    pub fn new(
        name: impl Into<String>,
        max_size: usize,
        average_size: usize,
        prune_frequency: Duration,
    ) -> Self {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(MemoryState {
                entries: LruCache::unbounded(),
                groups: GroupIndex::new(),
                total: 0,
            }),
        });
        let sweep = Arc::new(PruneSweep::new(
            format!("{}-sweep", name),
            shared.clone(),
            prune_frequency,
        ));
        Self {
            name,
            max_size,
            average_size,
            shared,
            sweep,
        }
    }

    fn cost(&self, entry: &CacheEntry) -> usize {
        if self.average_size > 0 {
            self.average_size
        } else {
            entry.size().max(1)
        }
    }

    pub fn len(&self) -> usize {
        lock_state(&self.shared.state, "memory", "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Estimated total size of stored entries.
    pub fn total_size(&self) -> usize {
        lock_state(&self.shared.state, "memory", "total_size").total
    }

    /// Run one expiry sweep now.
    pub fn prune(&self) -> usize {
        self.shared.prune()
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("name", &self.name)
            .field("max_size", &self.max_size)
            .field("average_size", &self.average_size)
            .finish()
    }
}

impl CacheBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        // `get` refreshes recency, so it needs the exclusive lock
        Ok(lock_state(&self.shared.state, "memory", "get")
            .entries
            .get(key)
            .map(|stored| stored.entry.clone()))
    }

    fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        let cost = self.cost(&entry);
        let mut state = lock_state(&self.shared.state, "memory", "set");
        state.remove(key);

        if cost > self.max_size {
            tracing::debug!(backend = %self.name, cache_key = %key, cost, max_size = self.max_size, "Entry larger than cache; not stored");
            return Ok(());
        }

        state.groups.add(key, &entry.groups);
        state.entries.put(key.clone(), Stored { entry, cost });
        state.total += cost;

        let evicted = state.evict_until(self.max_size);
        if evicted > 0 {
            tracing::debug!(backend = %self.name, evicted, "Evicted least-recently-used entries");
            metrics::record_cache_evictions(evicted);
        }
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        lock_state(&self.shared.state, "memory", "delete").remove(key);
        Ok(())
    }

    fn invalidate_group(&self, group: &str) -> Result<(), CacheError> {
        let mut state = lock_state(&self.shared.state, "memory", "invalidate_group");
        let keys = state.groups.take(group);
        for key in &keys {
            state.remove(key);
        }
        tracing::debug!(backend = %self.name, group, removed = keys.len(), "Invalidated cache group");
        Ok(())
    }

    fn startables(&self) -> Vec<Arc<dyn Startable>> {
        vec![self.sweep.clone()]
    }
}
