//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build cache stack → collect Startables → StartGroup::start_all
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → sweeps exit, server drains → stop_all
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: background components first, listener last
//! - Ordered shutdown: stop accepting, drain, stop components in reverse

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{StartGroup, Startable};
