//! Timer driven reordering buffer

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use sfu_rtp_core::stats::{Accumulator, STATS_WINDOW_MS};
use sfu_rtp_core::{ExtendedSequenceNumber, RtpPacket};

use super::PacketBuffer;

/// Reordering buffer keyed by extended sequence number
///
/// The head packet is released when it is the next expected one, when it has
/// waited `max_wait_time` since arrival, when the stream has not started yet
/// or when [`PacketBuffer::hurry_up`] was called.
#[derive(Debug, Clone)]
pub struct ReorderingBuffer {
    /// Queued packets
    packets: BTreeMap<ExtendedSequenceNumber, Arc<RtpPacket>>,
    /// Arrival time -> number of queued packets that arrived then
    arrivals: BTreeMap<u64, usize>,
    /// Next expected extended sequence number, `None` until the first release
    next: Option<ExtendedSequenceNumber>,
    /// Maximum time a packet waits for its predecessors, in ms
    max_wait_time: u64,
    /// Release the head regardless of its wait time
    hurry_up: bool,
    /// Padding packets consumed without being returned
    discarded: u64,
    /// Time released packets spent queued
    waited: Accumulator,
}

impl ReorderingBuffer {
    /// Create an empty buffer
    pub fn new(max_wait_time: u64) -> Self {
        Self {
            packets: BTreeMap::new(),
            arrivals: BTreeMap::new(),
            next: None,
            max_wait_time,
            hurry_up: false,
            discarded: 0,
            waited: Accumulator::new(STATS_WINDOW_MS),
        }
    }

    /// Maximum wait time in ms
    pub fn max_wait_time(&self) -> u64 {
        self.max_wait_time
    }

    /// Set the maximum wait time in ms
    pub fn set_max_wait_time(&mut self, max_wait_time: u64) {
        self.max_wait_time = max_wait_time;
    }

    /// Drop the queued packets, keeping the stream position and counters
    pub fn clear(&mut self) {
        self.packets.clear();
        self.arrivals.clear();
        self.hurry_up = false;
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Next expected extended sequence number
    pub fn next_expected(&self) -> Option<ExtendedSequenceNumber> {
        self.next
    }

    /// Padding packets consumed so far
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Arrival time of the oldest queued packet
    pub fn head_time(&self) -> Option<u64> {
        self.arrivals.keys().next().copied()
    }

    fn remove_arrival(&mut self, time: u64) {
        if let Some(count) = self.arrivals.get_mut(&time) {
            *count -= 1;
            if *count == 0 {
                self.arrivals.remove(&time);
            }
        }
    }

    /// Wait time statistics of released packets
    pub fn waited(&self) -> &Accumulator {
        &self.waited
    }

    /// Shortest wait time in the last second
    pub fn min_waited_time(&self) -> u64 {
        self.waited.min_value_in_window().unwrap_or(0)
    }

    /// Longest wait time in the last second
    pub fn max_waited_time(&self) -> u64 {
        self.waited.max_value_in_window().unwrap_or(0)
    }

    /// Mean wait time in the last second
    pub fn avg_waited_time(&self) -> f64 {
        self.waited.instant_media()
    }

    fn is_due(&self, key: ExtendedSequenceNumber, time: u64, now: u64) -> bool {
        match self.next {
            None => true,
            Some(next) if key == next => true,
            _ => self.hurry_up || time + self.max_wait_time <= now,
        }
    }
}

impl PacketBuffer for ReorderingBuffer {
    fn add(&mut self, packet: Arc<RtpPacket>) -> bool {
        let key = packet.ext_seq_num();

        if self.next.is_some_and(|next| key < next) {
            trace!("Rejecting already released packet [seq:{},next:{:?}]", key, self.next);
            return false;
        }

        if self.packets.contains_key(&key) {
            trace!("Rejecting duplicate packet [seq:{}]", key);
            return false;
        }

        *self.arrivals.entry(packet.time).or_insert(0) += 1;
        self.packets.insert(key, packet);
        true
    }

    fn get_ordered(&mut self, now: u64) -> Option<Arc<RtpPacket>> {
        loop {
            let (&key, head) = self.packets.first_key_value()?;
            if !self.is_due(key, head.time, now) {
                return None;
            }

            let (_, packet) = self.packets.pop_first()?;
            self.remove_arrival(packet.time);
            self.next = Some(key + 1);
            self.waited.update(now, now.saturating_sub(packet.time));

            if self.packets.is_empty() {
                self.hurry_up = false;
            }

            if packet.is_padding() {
                self.discarded += 1;
                trace!("Discarding padding packet [seq:{},discarded:{}]", key, self.discarded);
                continue;
            }

            return Some(packet);
        }
    }

    fn get_wait_time(&self, now: u64) -> Option<u64> {
        let (&key, head) = self.packets.first_key_value()?;
        if self.is_due(key, head.time, now) {
            return Some(0);
        }
        Some((head.time + self.max_wait_time).saturating_sub(now))
    }

    fn hurry_up(&mut self) {
        self.hurry_up = true;
    }

    fn reset(&mut self) {
        self.packets.clear();
        self.arrivals.clear();
        self.next = None;
        self.hurry_up = false;
        self.discarded = 0;
        self.waited.reset();
    }
}

impl Default for ReorderingBuffer {
    fn default() -> Self {
        Self::new(0)
    }
}
