use serde::{Deserialize, Serialize};

use crate::RtpSsrc;

/// Report block in RTCP SR/RR packets
/// Defined in RFC 3550 Section 6.4.1 and 6.4.2
///
/// Serialization is done by the RTCP packet builder; this is the field set the
/// incoming pipeline produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpReportBlock {
    /// SSRC identifier of the source this report is for
    pub ssrc: RtpSsrc,

    /// Fraction of packets lost since last report
    pub fraction_lost: u8,

    /// Cumulative number of packets lost (24-bit on the wire)
    pub cumulative_lost: u32,

    /// Extended highest sequence number received
    pub highest_seq: u32,

    /// Interarrival jitter estimate
    pub jitter: u32,

    /// Last SR timestamp from this source
    pub last_sr: u32,

    /// Delay since last SR from this source (in units of 1/65536 seconds)
    pub delay_since_last_sr: u32,
}

impl RtcpReportBlock {
    /// Largest cumulative loss that fits the 24-bit field
    pub const MAX_CUMULATIVE_LOST: u32 = 0x00FF_FFFF;

    /// Create a new empty report block
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            fraction_lost: 0,
            cumulative_lost: 0,
            highest_seq: 0,
            jitter: 0,
            last_sr: 0,
            delay_since_last_sr: 0,
        }
    }

    /// Fraction lost in the 8-bit fixed point format (255 = 100%)
    pub fn calculate_fraction_lost(expected: u64, lost: u64) -> u8 {
        if expected == 0 {
            return 0;
        }
        ((lost.min(expected) * 256) / expected).min(255) as u8
    }

    /// Convert a delay in milliseconds to 1/65536 second units
    pub fn delay_from_millis(ms: u64) -> u32 {
        ((ms * 65536) / 1000).min(u32::MAX as u64) as u32
    }
}
