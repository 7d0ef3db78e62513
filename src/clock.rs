//! Monotonic time source.
//!
//! Timeouts are evaluated only at decision points (handshake polling and the
//! start of each service tick), so all the transport needs is a way to read
//! the current instant and to pause between idle polls.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic clock used for every transport deadline.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Pause the calling thread. Used between empty polls.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for deterministic timeout handling.
///
/// Clones share the same time, so a test can keep one handle and advance it
/// while the station owns another. `sleep` advances time instead of blocking.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
