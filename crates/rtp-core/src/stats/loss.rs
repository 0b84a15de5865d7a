//! Packet loss tracking over a sliding window of extended sequence numbers
//!
//! The tracker remembers, for the last `size` sequence numbers, whether each one
//! arrived. It reports how many packets a new arrival revealed as lost and
//! builds the NACK fields requesting the ones still missing.

use bitvec::vec::BitVec;
use tracing::trace;

use crate::packet::rtcp::NackField;
use crate::ExtendedSequenceNumber;

/// Default number of sequence numbers tracked
pub const DEFAULT_LOSS_WINDOW: usize = 128;

/// Bits in the BLP mask of one NACK field
const MASK_BITS: u16 = (NackField::MAX_SEQUENCES - 1) as u16;

/// Sliding window loss tracker
#[derive(Debug, Clone)]
pub struct LossTracker {
    /// Window capacity
    size: usize,
    /// Received flag per position relative to `first`
    window: BitVec,
    /// Extended sequence number of window position 0
    first: Option<ExtendedSequenceNumber>,
    /// Highest position seen + 1
    len: usize,
    /// Packets ever found missing, never decreases
    total: u64,
}

impl LossTracker {
    /// Create a tracker remembering `size` sequence numbers (at least one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            window: BitVec::repeat(false, size),
            first: None,
            len: 0,
            total: 0,
        }
    }

    /// Register an arrival and return the number of packets newly found missing
    ///
    /// Packets older than the window are ignored. Duplicates and late arrivals
    /// inside the window only mark their slot.
    pub fn add_packet(&mut self, ext_seq: ExtendedSequenceNumber) -> u64 {
        let first = *self.first.get_or_insert(ext_seq);

        if ext_seq < first {
            trace!("Ignoring packet older than loss window [seq:{},first:{}]", ext_seq, first);
            return 0;
        }

        let mut lost = 0;
        let mut pos = ext_seq - first;

        if pos >= self.size as u64 {
            let shift = pos - self.size as u64 + 1;
            let new_first = first + shift;

            // Gaps above the watermark that slide out without ever being walked
            let watermark = first + self.len as u64;
            if new_first > watermark {
                lost += new_first - watermark;
            }

            let evicted = shift.min(self.size as u64) as usize;
            self.window.drain(..evicted);
            self.window.resize(self.size, false);

            self.first = Some(new_first);
            self.len = self.len.saturating_sub(evicted);
            pos = self.size as u64 - 1;
        }

        let pos = pos as usize;

        if pos >= self.len {
            // Slots between the old watermark and us were never seen
            lost += self.window[self.len..pos].count_zeros() as u64;
            self.len = pos + 1;
        }

        self.window.set(pos, true);
        self.total += lost;

        lost
    }

    /// NACK fields for every packet still missing in the window
    ///
    /// Runs of consecutive losses are packed into one field each, a field
    /// carrying the first loss plus up to 16 following ones.
    pub fn get_nacks(&self) -> Vec<NackField> {
        let Some(first) = self.first else {
            return Vec::new();
        };

        let mut nacks = Vec::new();
        // (pid, mask, bits used)
        let mut run: Option<(u16, u16, u16)> = None;

        for i in 0..self.len {
            let missing = !self.window[i];

            run = match run {
                Some((pid, mask, n)) if missing => {
                    let mask = mask | (1u16 << n);
                    if n + 1 == MASK_BITS {
                        nacks.push(NackField::new(pid, mask));
                        None
                    } else {
                        Some((pid, mask, n + 1))
                    }
                }
                Some((pid, mask, _)) => {
                    nacks.push(NackField::new(pid, mask));
                    None
                }
                None if missing => Some(((first + i as u64) as u16, 0, 0)),
                None => None,
            };
        }

        if let Some((pid, mask, _)) = run {
            nacks.push(NackField::new(pid, mask));
        }

        nacks
    }

    /// Packets ever found missing
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Packets currently missing inside the window
    pub fn current_lost(&self) -> u64 {
        self.window[..self.len].count_zeros() as u64
    }

    /// Extended sequence number of the window start
    pub fn first(&self) -> Option<ExtendedSequenceNumber> {
        self.first
    }

    /// Window capacity
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.window.fill(false);
        self.first = None;
        self.len = 0;
        self.total = 0;
    }
}

impl Default for LossTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LOSS_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_gap() {
        let mut losts = LossTracker::new(128);
        assert_eq!(losts.add_packet(1), 0);
        assert_eq!(losts.add_packet(2), 0);
        assert_eq!(losts.add_packet(4), 1);
        assert_eq!(losts.total(), 1);
        assert_eq!(losts.current_lost(), 1);
    }

    #[test]
    fn test_late_arrival_keeps_total() {
        let mut losts = LossTracker::new(128);
        losts.add_packet(1);
        losts.add_packet(4);
        assert_eq!(losts.total(), 2);

        // 2 arrives late: no new loss, total unchanged
        assert_eq!(losts.add_packet(2), 0);
        assert_eq!(losts.total(), 2);
        assert_eq!(losts.current_lost(), 1);
    }

    #[test]
    fn test_duplicates_are_idempotent() {
        let mut losts = LossTracker::new(128);
        losts.add_packet(10);
        losts.add_packet(12);
        assert_eq!(losts.add_packet(12), 0);
        assert_eq!(losts.add_packet(10), 0);
        assert_eq!(losts.total(), 1);
    }

    #[test]
    fn test_packets_before_window_are_ignored() {
        let mut losts = LossTracker::new(128);
        losts.add_packet(100);
        assert_eq!(losts.add_packet(50), 0);
        assert_eq!(losts.first(), Some(100));
        assert_eq!(losts.total(), 0);
    }

    #[test]
    fn test_sliding_does_not_double_count() {
        let mut losts = LossTracker::new(8);
        losts.add_packet(0);
        // 1..=4 lost
        assert_eq!(losts.add_packet(5), 4);
        // Slide by 3: slots 0..3 leave, 1 and 2 were already counted
        assert_eq!(losts.add_packet(10), 4);
        assert_eq!(losts.first(), Some(3));
        assert_eq!(losts.total(), 8);
    }

    #[test]
    fn test_jump_far_beyond_window() {
        let mut losts = LossTracker::new(4);
        losts.add_packet(0);
        losts.add_packet(1);
        // Everything between 2 and 99 is lost
        assert_eq!(losts.add_packet(100), 98);
        assert_eq!(losts.first(), Some(97));
        assert_eq!(losts.total(), 98);
        assert_eq!(losts.current_lost(), 3);
    }

    #[test]
    fn test_nack_runs() {
        let mut losts = LossTracker::new(128);
        losts.add_packet(99);
        for seq in 101..=104 {
            losts.add_packet(seq);
        }
        losts.add_packet(107);

        assert_eq!(
            losts.get_nacks(),
            vec![NackField::new(100, 0b0), NackField::new(105, 0b01)]
        );
    }

    #[test]
    fn test_nack_long_run_is_split() {
        let mut losts = LossTracker::new(128);
        losts.add_packet(0);
        // 1..=20 lost
        losts.add_packet(21);

        let nacks = losts.get_nacks();
        assert_eq!(nacks, vec![NackField::new(1, 0xFFFF), NackField::new(18, 0b11)]);
        let requested: Vec<u16> = nacks.iter().flat_map(|nack| nack.lost_sequences()).collect();
        assert_eq!(requested, (1..=20).collect::<Vec<u16>>());
    }

    #[test]
    fn test_nack_uses_wire_sequence_numbers() {
        let mut losts = LossTracker::new(128);
        losts.add_packet(0x1_FFFE);
        losts.add_packet(0x2_0001);
        assert_eq!(losts.get_nacks(), vec![NackField::new(0xFFFF, 0b1)]);
    }

    #[test]
    fn test_reset() {
        let mut losts = LossTracker::new(16);
        losts.add_packet(1);
        losts.add_packet(5);
        losts.reset();
        assert_eq!(losts.total(), 0);
        assert_eq!(losts.first(), None);
        assert!(losts.get_nacks().is_empty());
        assert_eq!(losts.add_packet(1000), 0);
    }

    proptest! {
        #[test]
        fn prop_total_never_decreases(seqs in proptest::collection::vec(0u64..500, 1..200)) {
            let mut losts = LossTracker::new(32);
            let mut previous = 0;
            for seq in seqs {
                let lost = losts.add_packet(seq);
                prop_assert_eq!(losts.total(), previous + lost);
                previous = losts.total();
            }
        }

        #[test]
        fn prop_in_order_stream_has_no_loss(start in 0u64..100_000, count in 1usize..400) {
            let mut losts = LossTracker::new(64);
            for seq in start..start + count as u64 {
                prop_assert_eq!(losts.add_packet(seq), 0);
            }
            prop_assert!(losts.get_nacks().is_empty());
        }
    }
}
