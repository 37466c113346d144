//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request dispatch:
//!     → timeouts.rs (enforce the handler deadline)
//!     → deadline exceeded: 504 unless a response was already committed
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every handler chain has a deadline
//! - Hooks are never preempted; only the waiting request is released

pub mod timeouts;

pub use timeouts::{with_deadline, Deadline};
