//! Startable background components.
//!
//! # Responsibilities
//! - Define the start/stop contract for components owning background work
//!   (cache prune sweeps, peer connections, schedulers)
//! - Start a group of them in order and stop them in reverse order
//!
//! # Design Decisions
//! - `start` spawns onto the current Tokio runtime and returns immediately
//! - Each started task also listens to the shutdown broadcast, so a missed
//!   `stop` never leaks a task past process shutdown

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::lifecycle::Shutdown;

/// A component with background work that must be started and stopped.
pub trait Startable: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Begin background work. Calling `start` twice has no further effect.
    fn start(&self, shutdown: broadcast::Receiver<()>);

    /// Stop background work. Idempotent.
    fn stop(&self);
}

/// Ordered collection of startables.
#[derive(Default, Clone)]
pub struct StartGroup {
    members: Vec<Arc<dyn Startable>>,
}

impl StartGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, startable: Arc<dyn Startable>) {
        self.members.push(startable);
    }

    pub fn extend<I>(&mut self, startables: I)
    where
        I: IntoIterator<Item = Arc<dyn Startable>>,
    {
        self.members.extend(startables);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Start every member in registration order.
    pub fn start_all(&self, shutdown: &Shutdown) {
        for member in &self.members {
            tracing::info!(component = member.name(), "Starting component");
            member.start(shutdown.subscribe());
        }
    }

    /// Stop every member in reverse registration order.
    pub fn stop_all(&self) {
        for member in self.members.iter().rev() {
            tracing::info!(component = member.name(), "Stopping component");
            member.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Startable for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn start(&self, _shutdown: broadcast::Receiver<()>) {
            self.log.lock().unwrap().push(format!("start {}", self.name));
        }

        fn stop(&self) {
            self.log.lock().unwrap().push(format!("stop {}", self.name));
        }
    }

    #[test]
    fn test_start_and_stop_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut group = StartGroup::new();
        for name in ["a", "b"] {
            group.add(Arc::new(Recorder {
                name: name.to_string(),
                log: log.clone(),
            }));
        }

        let shutdown = Shutdown::new();
        group.start_all(&shutdown);
        group.stop_all();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }
}
