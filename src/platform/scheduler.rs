//! Recurring task registration.
//!
//! # Responsibilities
//! - Define the `schedule(cron, job)` contract implemented by a concrete
//!   scheduler outside this crate
//! - Buffer registrations made during startup until that scheduler starts
//!
//! The binary runs no cron runtime of its own. An embedder wraps theirs in a
//! [`QueuedScheduler`], hands it to registration code such as
//! [`crate::demo::schedule_jobs`], and adds it to the `StartGroup` so queued
//! jobs reach the runtime once components start.
//!
//! # Design Decisions
//! - Cron syntax is never parsed here; the concrete scheduler validates it
//! - Flushing keeps registration order
//! - A failed flush of one job is logged and does not stop the others

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::lifecycle::Startable;

/// A recurring task.
pub type Job = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
}

/// Registers recurring tasks.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, cron: &str, job: Job) -> Result<(), ScheduleError>;
}

#[derive(Default)]
struct QueueState {
    started: bool,
    pending: Vec<(String, Job)>,
}

/// Queues registrations until started, then forwards them to `target`.
pub struct QueuedScheduler {
    target: Arc<dyn Scheduler>,
    state: Mutex<QueueState>,
}

impl QueuedScheduler {
    pub fn new(target: Arc<dyn Scheduler>) -> Self {
        Self {
            target,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Registrations waiting for `start`.
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).pending.len()
    }

    /// Forward queued jobs and pass later registrations straight through.
    /// Returns the number of jobs accepted by the target.
    pub fn flush(&self) -> usize {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.started = true;
            std::mem::take(&mut state.pending)
        };

        let mut accepted = 0;
        for (cron, job) in pending {
            match self.target.schedule(&cron, job) {
                Ok(()) => accepted += 1,
                Err(e) => tracing::error!(cron = %cron, error = %e, "Failed to schedule queued job"),
            }
        }
        accepted
    }
}

impl Scheduler for QueuedScheduler {
    fn schedule(&self, cron: &str, job: Job) -> Result<(), ScheduleError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.started {
                tracing::debug!(cron, "Queued job until scheduler starts");
                state.pending.push((cron.to_string(), job));
                return Ok(());
            }
        }
        self.target.schedule(cron, job)
    }
}

impl Startable for QueuedScheduler {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn start(&self, _shutdown: broadcast::Receiver<()>) {
        let accepted = self.flush();
        tracing::info!(jobs = accepted, "Scheduler started");
    }

    fn stop(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;

    #[derive(Default)]
    struct Recording {
        patterns: Mutex<Vec<String>>,
    }

    impl Scheduler for Recording {
        fn schedule(&self, cron: &str, job: Job) -> Result<(), ScheduleError> {
            if cron.is_empty() {
                return Err(ScheduleError::InvalidPattern {
                    pattern: cron.to_string(),
                    reason: "empty".to_string(),
                });
            }
            job();
            self.patterns.lock().unwrap().push(cron.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_queues_until_started() {
        let target = Arc::new(Recording::default());
        let scheduler = QueuedScheduler::new(target.clone());
        let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let job: Job = {
            let runs = runs.clone();
            Arc::new(move || {
                runs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
        };

        scheduler.schedule("0 * * * *", job.clone()).unwrap();
        scheduler.schedule("", job.clone()).unwrap();
        scheduler.schedule("*/5 * * * *", job.clone()).unwrap();
        assert_eq!(scheduler.pending(), 3);
        assert!(target.patterns.lock().unwrap().is_empty());

        scheduler.start(Shutdown::new().subscribe());
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(*target.patterns.lock().unwrap(), vec!["0 * * * *", "*/5 * * * *"]);

        scheduler.schedule("@daily", job).unwrap();
        assert_eq!(target.patterns.lock().unwrap().len(), 3);
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn test_direct_errors_surface_after_start() {
        let scheduler = QueuedScheduler::new(Arc::new(Recording::default()));
        assert_eq!(scheduler.flush(), 0);
        assert!(matches!(
            scheduler.schedule("", Arc::new(|| {})),
            Err(ScheduleError::InvalidPattern { .. })
        ));
    }
}
