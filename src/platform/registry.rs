//! Named shared resources with guarded lazy initialisation.
//!
//! # Design Decisions
//! - One `OnceLock` per name: concurrent callers of `get_or_init` for the
//!   same name run the initialiser at most once and all observe its value
//! - The map shard lock is released before the initialiser runs, so an
//!   initialiser may itself use the registry for other names
//! - Values are type-erased; asking for the wrong type is an error, not a panic

use std::any::{type_name, Any};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use thiserror::Error;

type Slot = Arc<OnceLock<Arc<dyn Any + Send + Sync>>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("resource `{name}` is not a `{expected}`")]
    TypeMismatch { name: String, expected: &'static str },
}

/// Process-scoped named resources (database handles, shared stores).
#[derive(Default, Clone)]
pub struct Registry {
    slots: Arc<DashMap<String, Slot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Slot {
        self.slots.entry(name.to_string()).or_default().clone()
    }

    /// The resource under `name`, initialising it with `init` on first use.
    pub fn get_or_init<T, F>(&self, name: &str, init: F) -> Result<Arc<T>, RegistryError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let slot = self.slot(name);
        let value = slot
            .get_or_init(|| {
                tracing::debug!(resource = name, "Initialising shared resource");
                let value: Arc<dyn Any + Send + Sync> = Arc::new(init());
                value
            })
            .clone();
        downcast(name, value)
    }

    /// Register an already built resource. Returns `false` if `name` is taken.
    pub fn register<T: Any + Send + Sync>(&self, name: &str, value: T) -> bool {
        self.slot(name).set(Arc::new(value)).is_ok()
    }

    /// The resource under `name`, if initialised.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Result<Arc<T>, RegistryError>> {
        let value = self.slots.get(name)?.get()?.clone();
        Some(downcast(name, value))
    }

    /// Names of initialised resources.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

fn downcast<T: Any + Send + Sync>(name: &str, value: Arc<dyn Any + Send + Sync>) -> Result<Arc<T>, RegistryError> {
    value.downcast::<T>().map_err(|_| RegistryError::TypeMismatch {
        name: name.to_string(),
        expected: type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_initialises_once() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    registry
                        .get_or_init("people", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Mutex::new(vec!["alice".to_string()])
                        })
                        .unwrap()
                })
            })
            .collect();
        let stores: Vec<Arc<Mutex<Vec<String>>>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        stores[0].lock().unwrap().push("bob".into());
        assert_eq!(stores[7].lock().unwrap().len(), 2);
        assert_eq!(registry.names(), vec!["people".to_string()]);
    }

    #[test]
    fn test_type_mismatch() {
        let registry = Registry::new();
        assert!(registry.register("answer", 42u32));
        assert!(!registry.register("answer", 7u32));

        assert_eq!(*registry.get::<u32>("answer").unwrap().unwrap(), 42);
        assert!(matches!(
            registry.get::<String>("answer"),
            Some(Err(RegistryError::TypeMismatch { .. }))
        ));
        assert!(registry.get::<u32>("missing").is_none());
    }
}
