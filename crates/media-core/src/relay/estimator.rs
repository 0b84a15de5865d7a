//! Remote bitrate estimation seam
//!
//! The bandwidth estimator lives outside the pipeline. A source group only
//! reports the stream, its packets and its losses.

use sfu_rtp_core::{RtpPacket, RtpSsrc};

/// External receive-side bandwidth estimator
pub trait RemoteRateEstimator: Send + Sync {
    /// Start estimating for a media SSRC
    fn add_stream(&self, ssrc: RtpSsrc);

    /// Stop estimating for a media SSRC
    fn remove_stream(&self, ssrc: RtpSsrc);

    /// A media packet of `size` bytes arrived at `now`
    fn update(&self, now: u64, packet: &RtpPacket, size: usize);

    /// `lost` packets were found missing at `now`
    fn update_lost(&self, now: u64, ssrc: RtpSsrc, lost: u64);
}
