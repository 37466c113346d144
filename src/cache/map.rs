//! Single-map backend.
//!
//! # Responsibilities
//! - Store entries in one `HashMap` guarded by one exclusive lock
//! - Maintain the group index under that same lock
//! - Sweep expired entries at a configurable frequency
//!
//! # Design Decisions
//! - One lock makes `set` and `invalidate_group` trivially linearizable
//! - Single-process only; pair with `distributed` for peer invalidation

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::cache::lock::lock_state;
use crate::cache::sweep::{Prune, PruneSweep};
use crate::cache::{CacheBackend, CacheEntry, CacheKey, GroupIndex};
use crate::error::CacheError;
use crate::lifecycle::Startable;

#[derive(Default)]
struct MapState {
    entries: HashMap<CacheKey, CacheEntry>,
    groups: GroupIndex,
}

impl MapState {
    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.groups.remove(key, &entry.groups);
        Some(entry)
    }
}

struct Shared {
    state: Mutex<MapState>,
}

impl Prune for Shared {
    fn prune(&self) -> usize {
        let now = Instant::now();
        let mut state = lock_state(&self.state, "map", "prune");
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();

        let MapState { entries, groups } = &mut *state;
        groups.prune(|key| entries.contains_key(key));
        removed
    }
}

/// In-process map backend.
pub struct MapBackend {
    name: String,
    shared: Arc<Shared>,
    sweep: Arc<PruneSweep>,
}

impl MapBackend {
    pub fn new(name: impl Into<String>, prune_frequency: Duration) -> Self {
        let name = name.into();
        let shared = Arc::new(Shared {
            state: Mutex::new(MapState::default()),
        });
        let sweep = Arc::new(PruneSweep::new(
            format!("{}-sweep", name),
            shared.clone(),
            prune_frequency,
        ));
        Self { name, shared, sweep }
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        lock_state(&self.shared.state, "map", "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one expiry sweep now.
    pub fn prune(&self) -> usize {
        self.shared.prune()
    }
}

impl fmt::Debug for MapBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapBackend")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish()
    }
}

impl CacheBackend for MapBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(lock_state(&self.shared.state, "map", "get")
            .entries
            .get(key)
            .cloned())
    }

    fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        let mut state = lock_state(&self.shared.state, "map", "set");
        state.remove(key);
        state.groups.add(key, &entry.groups);
        state.entries.insert(key.clone(), entry);
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        lock_state(&self.shared.state, "map", "delete").remove(key);
        Ok(())
    }

    fn invalidate_group(&self, group: &str) -> Result<(), CacheError> {
        let mut state = lock_state(&self.shared.state, "map", "invalidate_group");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::Encoding;

    fn backend() -> MapBackend {
        MapBackend::new("map", Duration::from_secs(10))
    }

    fn entry(body: &str, groups: &[&str]) -> CacheEntry {
        CacheEntry::new(body.to_string(), Duration::from_secs(5)).with_groups(groups.iter().copied())
    }

    #[test]
    fn test_set_then_get() {
        let map = backend();
        let key = CacheKey::from("person:alice");
        map.set(&key, entry("alice", &["person:alice"])).unwrap();

        let found = map.get(&key).unwrap().unwrap();
        assert_eq!(found.body(Encoding::Identity).unwrap(), "alice");
    }

    #[test]
    fn test_group_invalidation_is_exhaustive() {
        let map = backend();
        map.set(&CacheKey::from("a|json"), entry("a", &["person:alice"])).unwrap();
        map.set(&CacheKey::from("a|html"), entry("a", &["person:alice", "people"])).unwrap();
        map.set(&CacheKey::from("b"), entry("b", &["people"])).unwrap();

        map.invalidate_group("person:alice").unwrap();

        assert!(map.get(&CacheKey::from("a|json")).unwrap().is_none());
        assert!(map.get(&CacheKey::from("a|html")).unwrap().is_none());
        assert!(map.get(&CacheKey::from("b")).unwrap().is_some());

        // Idempotent on an already-empty group
        map.invalidate_group("person:alice").unwrap();
        assert_eq!(map.len(), 1);

        // The remaining group no longer references the removed key
        map.invalidate_group("people").unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_replacing_entry_replaces_groups() {
        let map = backend();
        let key = CacheKey::from("k");
        map.set(&key, entry("v1", &["old"])).unwrap();
        map.set(&key, entry("v2", &["new"])).unwrap();

        map.invalidate_group("old").unwrap();
        assert_eq!(map.get(&key).unwrap().unwrap().body(Encoding::Identity).unwrap(), "v2");

        map.invalidate_group("new").unwrap();
        assert!(map.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_prune_removes_expired() {
        let map = backend();
        map.set(
            &CacheKey::from("old"),
            CacheEntry::new("x", Duration::ZERO).with_groups(["g"]),
        )
        .unwrap();
        map.set(&CacheKey::from("new"), entry("y", &["g"])).unwrap();

        assert_eq!(map.prune(), 1);
        assert_eq!(map.len(), 1);

        map.invalidate_group("g").unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let map = backend();
        assert!(map.delete(&CacheKey::from("nothing")).is_ok());
        assert_eq!(map.startables().len(), 1);
    }
}
