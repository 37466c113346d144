//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap handler execution with the configured deadline
//! - Report a distinct error when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use crate::error::DispatchError;

/// Overall deadline for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Duration);

impl Deadline {
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for Deadline {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

/// Await `future` for at most `deadline`.
pub async fn with_deadline<F, T>(deadline: Deadline, future: F) -> Result<T, DispatchError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline.0, future)
        .await
        .map_err(|_| DispatchError::Timeout(deadline.0))
}
