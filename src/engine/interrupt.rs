//! Correlation Interruption
//!
//! Cooperative cancellation for a running correlation. The follower checks
//! the interrupt at every line boundary; store calls get their own per-query
//! timeout from the constraint.
//!
//! Uses an atomic flag shared between the running correlation and any number
//! of [`CancelHandle`]s, plus an optional overall deadline.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Interruption state for one correlation: an explicit cancel flag and an
/// optional deadline. Clones share the same flag.
#[derive(Clone)]
pub struct Interrupt {
    cancelled: Arc<AtomicBool>,
    started: Instant,
    deadline: Option<Duration>,
}

impl Interrupt {
    /// An interrupt with an overall deadline.
    pub fn with_deadline(deadline: Duration) -> Self {
        Interrupt {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: Some(deadline),
        }
    }

    /// An interrupt that only fires on explicit cancellation.
    pub fn none() -> Self {
        Interrupt {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: None,
        }
    }

    /// Check whether the correlation may continue. Called at each line
    /// boundary; returns `Err(Error::Cancelled)` once cancelled or past the
    /// deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if self.started.elapsed() > deadline {
                self.cancelled.store(true, Ordering::Relaxed);
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    /// Cancel the correlation explicitly.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// A handle that can cancel this correlation from another task.
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Interrupt::none()
    }
}

/// Cancels the associated correlation from another task.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
