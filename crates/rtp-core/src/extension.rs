//! Wraparound extension of RTP counters
//!
//! RTP carries 16-bit sequence numbers and 32-bit timestamps that wrap. The
//! pipeline works on 64-bit extended values instead, built from the wire value
//! and the number of wrap cycles seen so far (RFC 3550 Appendix A.1).

use std::fmt;

/// A wire counter that wraps at `2^BITS`
pub trait WrappingCounter: Copy + Into<u64> + fmt::Debug {
    /// Width of the wire counter in bits
    const BITS: u32;
}

impl WrappingCounter for u16 {
    const BITS: u32 = 16;
}

impl WrappingCounter for u32 {
    const BITS: u32 = 32;
}

/// Extension state of one wrapping counter: the newest raw value seen and the
/// wrap cycle it belongs to.
///
/// The stored value is a watermark, it only moves forward. A reordered packet
/// that arrives a little late gets extended against the watermark without
/// touching it, so small-distance reordering never fakes a wrap.
///
/// Extended values start at cycle 0, so a value sent before the first one seen
/// across a wrap has no extended representation. [`Self::extend`] and
/// [`Self::recover`] return `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtensionState<T> {
    /// Newest raw value seen
    last_seen: Option<T>,
    /// Wrap cycles of `last_seen`
    cycles: u32,
}

/// Extension state for 16-bit sequence numbers
pub type SequenceExtender = ExtensionState<u16>;

/// Extension state for 32-bit RTP timestamps
pub type TimestampExtender = ExtensionState<u32>;

impl<T: WrappingCounter> ExtensionState<T> {
    /// Half of the counter range, the largest forward distance between two values
    const HALF: u64 = 1 << (T::BITS - 1);

    /// Largest raw value
    const MAX: u64 = (1 << T::BITS) - 1;

    /// Below this the watermark is considered "just wrapped"
    const LOW_THRESHOLD: u64 = Self::MAX >> 4;

    /// Above this a past value is considered "from before the wrap"
    const HIGH_THRESHOLD: u64 = Self::MAX - Self::LOW_THRESHOLD;

    /// Create an empty state
    pub const fn new() -> Self {
        Self {
            last_seen: None,
            cycles: 0,
        }
    }

    /// Extend a raw value, moving the watermark if it is the newest one seen
    ///
    /// Returns `None` for a late value from before cycle 0; the state is left
    /// untouched in that case.
    pub fn extend(&mut self, raw: T) -> Option<u64> {
        let value: u64 = raw.into();

        let Some(last) = self.last_seen.map(Into::<u64>::into) else {
            self.last_seen = Some(raw);
            return Some(Self::compose(self.cycles, value));
        };

        if value < last && last - value > Self::HALF {
            // Forward wrap
            self.cycles = self.cycles.wrapping_add(1);
            self.last_seen = Some(raw);
            Some(Self::compose(self.cycles, value))
        } else if value > last && value - last > Self::HALF {
            // Late value from the previous cycle
            let cycles = self.cycles.checked_sub(1)?;
            Some(Self::compose(cycles, value))
        } else {
            if value > last {
                self.last_seen = Some(raw);
            }
            Some(Self::compose(self.cycles, value))
        }
    }

    /// Wrap cycle a past raw value belongs to
    ///
    /// Used for retransmissions, whose original sequence number may predate the
    /// last wrap: if the watermark has just wrapped and the candidate sits at the
    /// top of the range, it belongs to the previous cycle. `None` when that
    /// previous cycle would be before cycle 0.
    pub fn recover_cycles(&self, past: T) -> Option<u32> {
        let Some(last) = self.last_seen.map(Into::<u64>::into) else {
            return Some(self.cycles);
        };

        if last < Self::LOW_THRESHOLD && past.into() > Self::HIGH_THRESHOLD {
            self.cycles.checked_sub(1)
        } else {
            Some(self.cycles)
        }
    }

    /// Extended value of a past raw value, see [`Self::recover_cycles`]
    pub fn recover(&self, past: T) -> Option<u64> {
        self.recover_cycles(past)
            .map(|cycles| Self::compose(cycles, past.into()))
    }

    /// Newest extended value seen, if any
    pub fn extended(&self) -> Option<u64> {
        self.last_seen
            .map(|last| Self::compose(self.cycles, last.into()))
    }

    /// Current wrap cycle count
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Newest raw value seen
    pub fn last_seen(&self) -> Option<T> {
        self.last_seen
    }

    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn compose(cycles: u32, value: u64) -> u64 {
        (u64::from(cycles) << T::BITS) | value
    }
}
