use serde::{Deserialize, Serialize};

use crate::RtpSequenceNumber;

/// Generic NACK feedback control information (RFC 4585 Section 6.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NackField {
    /// Packet ID: first lost sequence number
    pub pid: RtpSequenceNumber,

    /// Bitmask of following lost packets: bit n set means `pid + n + 1` is lost
    pub blp: u16,
}

impl NackField {
    /// Sequence numbers covered by one field
    pub const MAX_SEQUENCES: usize = 17;

    /// Create a NACK field
    pub fn new(pid: RtpSequenceNumber, blp: u16) -> Self {
        Self { pid, blp }
    }

    /// All sequence numbers requested by this field, in order
    pub fn lost_sequences(&self) -> impl Iterator<Item = RtpSequenceNumber> + '_ {
        std::iter::once(self.pid).chain(
            (0..(Self::MAX_SEQUENCES as u16 - 1))
                .filter(move |&bit| self.blp & (1u16 << bit) != 0)
                .map(move |bit| self.pid.wrapping_add(bit + 1)),
        )
    }

    /// Number of sequence numbers requested
    pub fn count(&self) -> usize {
        1 + self.blp.count_ones() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_loss() {
        let field = NackField::new(100, 0);
        assert_eq!(field.lost_sequences().collect::<Vec<_>>(), vec![100]);
        assert_eq!(field.count(), 1);
    }

    #[test]
    fn test_mask_expansion() {
        let field = NackField::new(65535, 0b101);
        assert_eq!(field.lost_sequences().collect::<Vec<_>>(), vec![65535, 0, 2]);
        assert_eq!(field.count(), 3);
    }
}
