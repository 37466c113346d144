//! Periodic expiry sweep for in-process backends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::cache::lock::lock_state;
use crate::lifecycle::Startable;

/// Something that can drop its expired entries.
pub trait Prune: Send + Sync {
    /// Remove expired entries and stale group index references.
    /// Returns the number of entries removed.
    fn prune(&self) -> usize;
}

/// Background task calling [`Prune::prune`] at a fixed frequency.
pub struct PruneSweep {
    name: String,
    target: Arc<dyn Prune>,
    frequency: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PruneSweep {
    pub fn new(name: impl Into<String>, target: Arc<dyn Prune>, frequency: Duration) -> Self {
        Self {
            name: name.into(),
            target,
            frequency,
            task: Mutex::new(None),
        }
    }
}

impl Startable for PruneSweep {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut task = lock_state(&self.task, "sweep", "start");
        if task.is_some() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(sweep = %self.name, "No async runtime; expiry sweep not started");
            return;
        };

        let target = self.target.clone();
        let name = self.name.clone();
        let frequency = self.frequency;

        *task = Some(runtime.spawn(async move {
            tracing::debug!(sweep = %name, frequency_secs = frequency.as_secs_f64(), "Expiry sweep starting");
            let mut ticker = time::interval(frequency);
            ticker.tick().await; // First tick completes immediately

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = target.prune();
                        if removed > 0 {
                            tracing::debug!(sweep = %name, removed, "Pruned expired cache entries");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!(sweep = %name, "Expiry sweep received shutdown signal");
                        break;
                    }
                }
            }
        }));
    }

    fn stop(&self) {
        if let Some(task) = lock_state(&self.task, "sweep", "stop").take() {
            task.abort();
        }
    }
}
