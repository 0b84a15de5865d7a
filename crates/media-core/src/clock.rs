//! Millisecond media clock
//!
//! The pipeline works on plain `u64` milliseconds. [`MediaClock`] maps
//! `tokio::time::Instant` onto that scale, so code driven by a paused test
//! runtime sees the same time the timers do.

use std::time::Duration;

use tokio::time::Instant;

/// Monotonic millisecond clock anchored at its creation
#[derive(Debug, Clone, Copy)]
pub struct MediaClock {
    origin: Instant,
}

impl MediaClock {
    /// Create a clock reading 0 now
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    /// Milliseconds since the clock was created
    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Instant of a millisecond reading
    pub fn instant_at(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms)
    }
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}
