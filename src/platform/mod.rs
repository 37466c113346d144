//! Process-scoped collaborators shared by handlers.
//!
//! # Responsibilities
//! - registry.rs: named shared resources initialised once per process
//! - scheduler.rs: the recurring-task registration contract
//!
//! # Design Decisions
//! - Explicit objects passed to whoever needs them, never ambient globals
//! - Cron patterns are opaque strings; the concrete scheduler parses them

pub mod registry;
pub mod scheduler;

pub use registry::{Registry, RegistryError};
pub use scheduler::{Job, QueuedScheduler, ScheduleError, Scheduler};
