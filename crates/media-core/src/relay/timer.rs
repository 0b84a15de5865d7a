//! Dispatch timer
//!
//! A source group has exactly one pending wake-up at any time. Scheduling
//! replaces the previous deadline, it never adds a second one.

use tracing::trace;

/// Single, replaceable deadline in media clock milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchTimer {
    deadline: Option<u64>,
}

impl DispatchTimer {
    /// Create a timer with nothing scheduled
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `delay` ms after `now`, replacing any pending deadline
    pub fn schedule(&mut self, now: u64, delay: u64) {
        let deadline = now.saturating_add(delay);
        trace!("Dispatch scheduled [deadline:{},previous:{:?}]", deadline, self.deadline);
        self.deadline = Some(deadline);
    }

    /// Drop the pending deadline
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Pending deadline
    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }
}
