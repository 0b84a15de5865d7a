use serde::{Deserialize, Serialize};

use super::ntp::NtpTimestamp;
use crate::{RtpSsrc, RtpTimestamp};

/// Sender report correlation event
///
/// The part of an RTCP SR (RFC 3550 Section 6.4.1) the incoming pipeline needs:
/// the sender's wall clock and the RTP timestamp that corresponds to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderReportInfo {
    /// SSRC of the sender
    pub ssrc: RtpSsrc,

    /// Sender wall clock
    pub ntp_timestamp: NtpTimestamp,

    /// RTP timestamp corresponding to `ntp_timestamp`
    pub rtp_timestamp: RtpTimestamp,

    /// Sender's packet count
    pub packet_count: u32,

    /// Sender's octet count
    pub octet_count: u32,
}

impl SenderReportInfo {
    /// Create a sender report event with zero counters
    pub fn new(ssrc: RtpSsrc, ntp_timestamp: NtpTimestamp, rtp_timestamp: RtpTimestamp) -> Self {
        Self {
            ssrc,
            ntp_timestamp,
            rtp_timestamp,
            packet_count: 0,
            octet_count: 0,
        }
    }
}
