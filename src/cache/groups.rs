//! Group tag index.
//!
//! # Responsibilities
//! - Map each group tag to the keys currently stored under it
//! - Make group invalidation O(group size) instead of a full scan
//!
//! # Design Decisions
//! - Not synchronised on its own: every backend keeps its index behind the
//!   same lock as its key map so both change atomically
//! - Empty groups are dropped eagerly

use std::collections::{HashMap, HashSet};

use crate::cache::CacheKey;

#[derive(Debug, Default)]
pub struct GroupIndex {
    groups: HashMap<String, HashSet<CacheKey>>,
}

impl GroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `key` under every group in `groups`.
    pub fn add(&mut self, key: &CacheKey, groups: &[String]) {
        for group in groups {
            self.groups
                .entry(group.clone())
                .or_default()
                .insert(key.clone());
        }
    }

    /// Remove `key` from the given groups.
    pub fn remove(&mut self, key: &CacheKey, groups: &[String]) {
        for group in groups {
            if let Some(keys) = self.groups.get_mut(group) {
                keys.remove(key);
                if keys.is_empty() {
                    self.groups.remove(group);
                }
            }
        }
    }

    /// Detach and return every key indexed under `group`.
    pub fn take(&mut self, group: &str) -> HashSet<CacheKey> {
        self.groups.remove(group).unwrap_or_default()
    }

    /// Drop keys for which `exists` is false, then drop empty groups.
    /// Returns the number of keys removed from the index.
    pub fn prune<F>(&mut self, mut exists: F) -> usize
    where
        F: FnMut(&CacheKey) -> bool,
    {
        let mut removed = 0;
        self.groups.retain(|_, keys| {
            let before = keys.len();
            keys.retain(|key| exists(key));
            removed += before - keys.len();
            !keys.is_empty()
        });
        removed
    }

    pub fn keys(&self, group: &str) -> Option<&HashSet<CacheKey>> {
        self.groups.get(group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
