//! Jitter buffering for incoming RTP
//!
//! Packets are released in strict extended sequence order. A missing packet
//! holds the queue for at most the configured wait time, after which the buffer
//! skips ahead and leaves the gap to loss recovery.
//!
//! Two variants implement the same ordering contract:
//!
//! - [`ReorderingBuffer`]: poll free. Callers ask [`PacketBuffer::get_wait_time`]
//!   when to come back, so one scheduler can serve any number of streams.
//! - [`WaitedBuffer`]: shared between tasks, consumers `await` the next
//!   packet instead of scheduling their own wake-ups.

pub mod reordering;
pub mod waited;

use std::sync::Arc;

use sfu_rtp_core::RtpPacket;

pub use reordering::ReorderingBuffer;
pub use waited::WaitedBuffer;

/// Ordering contract shared by the jitter buffer variants
pub trait PacketBuffer {
    /// Queue a packet, keyed by its extended sequence number
    ///
    /// Returns `false` without changing anything if the packet was already
    /// released or is already queued.
    fn add(&mut self, packet: Arc<RtpPacket>) -> bool;

    /// Next packet in order, if one is due at `now`
    ///
    /// Padding packets are consumed silently and never returned.
    fn get_ordered(&mut self, now: u64) -> Option<Arc<RtpPacket>>;

    /// Milliseconds until [`Self::get_ordered`] can return something
    ///
    /// `Some(0)` if a packet is due now, `None` if the buffer is empty and
    /// there is nothing to wait for.
    fn get_wait_time(&self, now: u64) -> Option<u64>;

    /// Release the head packet on the next call regardless of its wait time
    fn hurry_up(&mut self);

    /// Clear all state, the next packet starts a new stream
    fn reset(&mut self);
}
