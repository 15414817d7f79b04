//! Counting semaphore for worker-to-control-thread hand-off
//!
//! Used where a control thread must block until a native worker reports
//! completion (e.g. a sink writer finalize callback).

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Blocking counting semaphore
#[derive(Debug, Default)]
pub struct FinalizeSemaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl FinalizeSemaphore {
    /// Create a semaphore with no permits
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one permit and wake a waiter
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }

    /// Current number of unclaimed permits
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }

    /// Drop any stale permits left over from a previous cycle
    pub fn drain(&self) -> usize {
        std::mem::take(&mut *self.permits.lock())
    }

    /// Block until a permit is available.
    ///
    /// With `timeout == None` this waits indefinitely.
    pub fn acquire(&self, timeout: Option<Duration>) -> CoreResult<()> {
        let deadline = timeout.map(|t| (t, Instant::now() + t));
        let mut permits = self.permits.lock();
        while *permits == 0 {
            match deadline {
                Some((bound, deadline)) => {
                    if self.available.wait_until(&mut permits, deadline).timed_out() && *permits == 0 {
                        return Err(CoreError::Timeout {
                            operation: "semaphore acquire".to_string(),
                            duration: bound,
                        });
                    }
                }
                None => self.available.wait(&mut permits),
            }
        }
        *permits -= 1;
        Ok(())
    }
}
