use serde::{Deserialize, Serialize};

/// NTP timestamp representation (64 bits)
/// As defined in RFC 3550
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NtpTimestamp {
    /// Seconds since January 1, 1900
    pub seconds: u32,

    /// Fraction of a second
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Middle 32 bits of the timestamp
    ///
    /// This is the "last SR" (LSR) field of RTCP report blocks, RFC 3550 Section 6.4.1.
    pub fn to_u32(&self) -> u32 {
        ((self.seconds & 0x0000FFFF) << 16) | ((self.fraction & 0xFFFF0000) >> 16)
    }

    /// Milliseconds since the NTP epoch
    pub fn to_millis(&self) -> u64 {
        (self.seconds as u64) * 1000 + (((self.fraction as u64) * 1000) >> 32)
    }

    /// Build from milliseconds since the NTP epoch
    pub fn from_millis(ms: u64) -> Self {
        Self {
            seconds: (ms / 1000) as u32,
            fraction: (((ms % 1000) << 32) / 1000) as u32,
        }
    }
}
