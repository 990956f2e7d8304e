//! Cooperative deadlines for long batch operations
//!
//! Batch loops call [`Deadline::check`] between items; a running item is
//! never interrupted.

use crate::error::{ContentError, Result};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// A deadline that never expires
    pub fn none() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    /// Expire `limit` from now
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.limit.map(|l| self.elapsed() >= l).unwrap_or(false)
    }

    /// Fail with `DeadlineExceeded` once expired
    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            return Err(ContentError::DeadlineExceeded {
                elapsed_ms: self.elapsed().as_millis(),
            });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}
