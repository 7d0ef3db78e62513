//! Incremental literal matcher for modem responses.
//!
//! The matcher keeps a cursor into the needle and advances it on every
//! matching byte. On a mismatch the cursor restarts and the byte is
//! compared against the first needle byte again. This is not KMP: a needle
//! whose prefix repeats inside itself can be missed, which is fine for the
//! fixed marker set used here (`\r\nOK\r\n`, `\r\nready\r\n`, `SEND OK\r\n`).

use std::time::Duration;

use crate::clock::Clock;
use crate::diag::Escaped;
use crate::transport::Modem;

/// Pause between empty polls while scanning.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Restart-on-mismatch substring scanner.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    needle: &'static str,
    cursor: usize,
}

impl PatternMatcher {
    /// Create a matcher for a non-empty needle.
    pub const fn new(needle: &'static str) -> Self {
        Self { needle, cursor: 0 }
    }

    #[inline]
    pub fn needle(&self) -> &'static str {
        self.needle
    }

    /// Needle bytes matched so far.
    #[inline]
    pub fn progress(&self) -> usize {
        self.cursor
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Feed one byte. Returns `true` when it completes the needle; the
    /// matcher is then ready to find the next occurrence.
    pub fn feed(&mut self, byte: u8) -> bool {
        let needle = self.needle.as_bytes();
        if needle.is_empty() {
            return true;
        }
        if byte != needle[self.cursor] {
            self.cursor = 0;
        }
        if byte == needle[self.cursor] {
            self.cursor += 1;
            if self.cursor == needle.len() {
                self.cursor = 0;
                return true;
            }
        }
        false
    }

    /// Busy-poll `modem` until the needle is seen or `timeout` elapses.
    ///
    /// Every received byte is echoed at `trace` level. Returns the time it
    /// took to find the needle, or `None` on timeout. Only meant for the
    /// startup handshake: this blocks the calling thread.
    pub fn scan<M, C>(&mut self, modem: &mut M, clock: &C, timeout: Duration) -> Option<Duration>
    where
        M: Modem + ?Sized,
        C: Clock + ?Sized,
    {
        self.reset();
        let start = clock.now();
        tracing::debug!("Wifi check: {}", Escaped(self.needle.as_bytes()));

        loop {
            match modem.read_byte() {
                Some(byte) => {
                    tracing::trace!("AT< {}", Escaped(&[byte]));
                    if self.feed(byte) {
                        let elapsed = clock.now().saturating_duration_since(start);
                        tracing::debug!("Found in {}ms", elapsed.as_millis());
                        return Some(elapsed);
                    }
                }
                None => clock.sleep(POLL_INTERVAL),
            }

            if clock.now().saturating_duration_since(start) >= timeout {
                tracing::warn!("TIMEOUT after {}ms", timeout.as_millis());
                return None;
            }
        }
    }
}
