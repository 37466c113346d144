//! Tiered backend: an ordered chain of backends, fastest first.
//!
//! # Responsibilities
//! - Probe tiers in order on read
//! - Populate every earlier tier after a hit in a later one
//! - Fan writes, deletes and group invalidations out to every tier
//!
//! # Design Decisions
//! - A failing tier is logged and skipped: a read error counts as a miss in
//!   that tier, a write error never fails the overall write
//! - Population copies the entry as found, groups and expiry included
//! - Deletes and group invalidations bump a generation while holding it
//!   exclusively; a read only populates upper tiers if the generation it
//!   saw before probing is still current, so an entry invalidated while the
//!   read was in flight is never copied back up

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::cache::lock::{read_state, write_state};
use crate::cache::{CacheBackend, CacheEntry, CacheKey};
use crate::error::CacheError;
use crate::lifecycle::Startable;

pub struct TieredBackend {
    name: String,
    tiers: Vec<Arc<dyn CacheBackend>>,
    /// Bumped after every delete or invalidation.
    generation: RwLock<u64>,
}

impl TieredBackend {
    pub fn new(name: impl Into<String>, tiers: Vec<Arc<dyn CacheBackend>>) -> Self {
        Self {
            name: name.into(),
            tiers,
            generation: RwLock::new(0),
        }
    }

    pub fn tiers(&self) -> &[Arc<dyn CacheBackend>] {
        &self.tiers
    }

    fn fan_out<F>(&self, op: &'static str, mut f: F)
    where
        F: FnMut(&dyn CacheBackend) -> Result<(), CacheError>,
    {
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Err(e) = f(tier.as_ref()) {
                tracing::warn!(backend = %self.name, tier = index, tier_name = tier.name(), op, error = %e, "Cache tier operation failed");
            }
        }
    }

    /// Fan out a removal and bump the generation before readers may populate again.
    fn remove<F>(&self, op: &'static str, f: F)
    where
        F: FnMut(&dyn CacheBackend) -> Result<(), CacheError>,
    {
        let mut generation = write_state(&self.generation, "tiered", op);
        self.fan_out(op, f);
        *generation += 1;
    }

    fn populate(&self, key: &CacheKey, entry: &CacheEntry, upper: &[Arc<dyn CacheBackend>], seen: u64) {
        let generation = read_state(&self.generation, "tiered", "populate");
        if *generation != seen {
            tracing::debug!(backend = %self.name, cache_key = %key, "Invalidated during read; not populating upper tiers");
            return;
        }
        for tier in upper {
            if let Err(e) = tier.set(key, entry.clone()) {
                tracing::warn!(backend = %self.name, tier_name = tier.name(), error = %e, "Cache tier population failed");
            }
        }
    }
}

impl fmt::Debug for TieredBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredBackend")
            .field("name", &self.name)
            .field("tiers", &self.tiers)
            .finish()
    }
}

impl CacheBackend for TieredBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let seen = *read_state(&self.generation, "tiered", "get");
        for (index, tier) in self.tiers.iter().enumerate() {
            let found = match tier.get(key) {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(backend = %self.name, tier = index, error = %e, "Cache tier read failed; skipping");
                    continue;
                }
            };

            if let Some(entry) = found {
                if index > 0 {
                    self.populate(key, &entry, &self.tiers[..index], seen);
                }
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.fan_out("set", |tier| tier.set(key, entry.clone()));
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.remove("delete", |tier| tier.delete(key));
        Ok(())
    }

    fn invalidate_group(&self, group: &str) -> Result<(), CacheError> {
        self.remove("invalidate_group", |tier| tier.invalidate_group(group));
        Ok(())
    }

    fn startables(&self) -> Vec<Arc<dyn Startable>> {
        self.tiers.iter().flat_map(|tier| tier.startables()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MapBackend;
    use crate::negotiation::Encoding;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Counts reads before delegating to a map.
    #[derive(Debug)]
    struct Counting {
        inner: MapBackend,
        reads: AtomicUsize,
        fail_writes: bool,
    }

    impl Counting {
        fn new(fail_writes: bool) -> Self {
            Self {
                inner: MapBackend::new("counting", Duration::from_secs(10)),
                reads: AtomicUsize::new(0),
                fail_writes,
            }
        }
    }

    impl CacheBackend for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
            if self.fail_writes {
                return Err(CacheError::Unavailable {
                    backend: "counting".into(),
                    reason: "read-only".into(),
                });
            }
            self.inner.set(key, entry)
        }

        fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
            self.inner.delete(key)
        }

        fn invalidate_group(&self, group: &str) -> Result<(), CacheError> {
            self.inner.invalidate_group(group)
        }
    }

    type DuringRead = Box<dyn FnOnce() + Send>;

    /// Runs a callback after reading, before the entry is handed back.
    struct Interleaving {
        inner: MapBackend,
        during_read: Mutex<Option<DuringRead>>,
    }

    impl fmt::Debug for Interleaving {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("Interleaving").field("inner", &self.inner).finish()
        }
    }

    impl CacheBackend for Interleaving {
        fn name(&self) -> &str {
            "interleaving"
        }

        fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
            let found = self.inner.get(key);
            if let Some(callback) = self.during_read.lock().unwrap().take() {
                callback();
            }
            found
        }

        fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
            self.inner.set(key, entry)
        }

        fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
            self.inner.delete(key)
        }

        fn invalidate_group(&self, group: &str) -> Result<(), CacheError> {
            self.inner.invalidate_group(group)
        }
    }

    #[test]
    fn test_lower_tier_hit_populates_upper_tier() {
        let a = Arc::new(Counting::new(false));
        let b = Arc::new(Counting::new(false));
        let tiered = TieredBackend::new("tiered", vec![a.clone(), b.clone()]);
        let key = CacheKey::from("person:alice");

        // Only B holds the value
        b.set(&key, CacheEntry::new("alice", Duration::from_secs(5))).unwrap();

        assert!(tiered.get(&key).unwrap().is_some());
        assert_eq!(b.reads.load(Ordering::SeqCst), 1);

        // Second read is served by A without touching B again
        assert_eq!(tiered.get(&key).unwrap().unwrap().body(Encoding::Identity).unwrap(), "alice");
        assert_eq!(a.reads.load(Ordering::SeqCst), 2);
        assert_eq!(b.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_tier_write_does_not_fail_set() {
        let a = Arc::new(Counting::new(true));
        let b = Arc::new(Counting::new(false));
        let tiered = TieredBackend::new("tiered", vec![a.clone(), b.clone()]);
        let key = CacheKey::from("k");

        tiered.set(&key, CacheEntry::new("v", Duration::from_secs(5))).unwrap();
        assert!(a.inner.get(&key).unwrap().is_none());
        assert!(b.inner.get(&key).unwrap().is_some());
        assert!(tiered.get(&key).unwrap().is_some());
    }

    #[test]
    fn test_invalidation_reaches_every_tier() {
        let a = Arc::new(MapBackend::new("a", Duration::from_secs(10)));
        let b = Arc::new(MapBackend::new("b", Duration::from_secs(10)));
        let tiered = TieredBackend::new("tiered", vec![a.clone(), b.clone()]);
        let key = CacheKey::from("k");

        tiered
            .set(&key, CacheEntry::new("v", Duration::from_secs(5)).with_groups(["g"]))
            .unwrap();
        tiered.invalidate_group("g").unwrap();

        assert!(a.is_empty());
        assert!(b.is_empty());
        assert!(tiered.get(&key).unwrap().is_none());
        assert_eq!(tiered.startables().len(), 2);
    }

    #[test]
    fn test_invalidation_during_read_is_not_undone() {
        let a = Arc::new(MapBackend::new("a", Duration::from_secs(10)));
        let b = Arc::new(Interleaving {
            inner: MapBackend::new("b", Duration::from_secs(10)),
            during_read: Mutex::new(None),
        });
        let tiered = Arc::new(TieredBackend::new("tiered", vec![a.clone(), b.clone()]));
        let key = CacheKey::from("person:alice");
        b.inner
            .set(&key, CacheEntry::new("stale", Duration::from_secs(5)).with_groups(["person:alice"]))
            .unwrap();

        // B has read the entry when another thread invalidates its group
        let invalidator = tiered.clone();
        *b.during_read.lock().unwrap() = Some(Box::new(move || {
            std::thread::spawn(move || invalidator.invalidate_group("person:alice").unwrap())
                .join()
                .unwrap();
        }));

        assert!(tiered.get(&key).unwrap().is_some());
        assert!(a.is_empty());
        assert!(tiered.get(&key).unwrap().is_none());
    }
}
