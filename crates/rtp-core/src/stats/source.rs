//! Per-SSRC reception statistics
//!
//! [`SourceStats`] accumulates everything known about one incoming SSRC:
//! counters, layer bitrates, the last sender report and the derived clock
//! skew/drift. It produces the receiver report block for the source with
//! [`SourceStats::create_report`].
//!
//! Single writer: the owning pipeline context calls `update` and
//! `create_report`, never concurrently.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use super::accumulator::Accumulator;
use crate::extension::{SequenceExtender, TimestampExtender};
use crate::packet::rtcp::{NtpTimestamp, RtcpReportBlock, SenderReportInfo};
use crate::packet::LayerInfo;
use crate::time::{rtp_ticks_to_millis, rtp_timestamp_delta};
use crate::{ExtendedSequenceNumber, RtpSsrc};

/// Window used for instant bitrate and frame counting
pub const STATS_WINDOW_MS: u64 = 1000;

/// Shortest interval between two PLIs for the same source
pub const MIN_PLI_INTERVAL_MS: u64 = 500;

/// Sender report as received by this side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedSenderReport {
    /// Sender wall clock
    pub ntp_timestamp: NtpTimestamp,
    /// RTP timestamp matching `ntp_timestamp`
    pub rtp_timestamp: u32,
    /// `rtp_timestamp` extended over wraps
    pub ext_rtp_timestamp: u64,
    /// Local time the report arrived, in milliseconds
    pub received_at: u64,
}

/// Statistics of one simulcast/SVC layer
#[derive(Debug, Clone)]
pub struct LayerSource {
    /// Layer identifiers
    pub info: LayerInfo,
    /// Packets received on this layer
    pub num_packets: u64,
    /// Bytes received on this layer
    pub total_bytes: u64,
    /// Bytes in the last second
    pub bitrate: Accumulator,
}

impl LayerSource {
    /// Create an empty layer entry
    pub fn new(info: LayerInfo) -> Self {
        Self {
            info,
            num_packets: 0,
            total_bytes: 0,
            bitrate: Accumulator::new(STATS_WINDOW_MS),
        }
    }

    /// Account one packet of `size` bytes
    pub fn update(&mut self, now: u64, size: u64) {
        self.num_packets += 1;
        self.total_bytes += size;
        self.bitrate.update(now, size);
    }

    /// Instant bitrate in bits per second
    pub fn bitrate_bps(&self) -> u64 {
        (self.bitrate.instant_avg() * 8.0) as u64
    }
}

/// Reception statistics of one incoming SSRC
#[derive(Debug, Clone)]
pub struct SourceStats {
    /// SSRC, 0 when unassigned
    pub ssrc: RtpSsrc,
    /// RTP clock rate, 0 when unknown
    pub clock_rate: u32,
    /// Sequence number extension
    pub seq: SequenceExtender,
    /// RTP timestamp extension
    pub timestamp: TimestampExtender,

    /// Packets received
    pub num_packets: u64,
    /// Bytes received
    pub num_bytes: u64,
    /// Frames received (marker bit)
    pub num_frames: u64,
    /// Frames received in the last second
    pub num_frames_delta: u64,
    /// Cumulative lost packets, as reported in receiver reports
    pub lost_packets: u64,
    /// Packets found missing by the loss tracker
    pub lost_packets_detected: u64,
    /// Packets rejected by the jitter buffer
    pub drop_packets: u64,

    /// Packets received since the last report
    pub total_packets_since_last_report: u64,
    /// Bytes received since the last report
    pub total_bytes_since_last_report: u64,
    /// Lowest extended sequence number since the last report
    min_ext_seq_since_last_report: ExtendedSequenceNumber,

    /// NACKs sent for this source
    pub total_nacks: u64,
    /// Local time of the last NACK
    pub last_nacked: Option<u64>,
    /// PLIs sent for this source
    pub total_plis: u64,
    /// Local time of the last PLI
    pub last_pli: Option<u64>,
    /// Local time of the last receiver report
    pub last_report: Option<u64>,

    /// Last sender report
    last_sender_report: Option<ReceivedSenderReport>,
    /// First sender report, reference for skew and drift
    first_sender_report: Option<ReceivedSenderReport>,
    /// Extension of sender report RTP timestamps
    sender_report_timestamp: TimestampExtender,
    /// Wall clock minus RTP clock elapsed since the first sender report, in ms
    pub skew: i64,
    /// RTP clock elapsed / wall clock elapsed since the first sender report
    pub drift: f64,

    /// Bytes in the last second
    pub bitrate: Accumulator,
    /// Frames in the last second
    frames: Accumulator,
    /// Lost packets in the last second
    losts: Accumulator,
    /// Per layer statistics keyed by [`LayerInfo::id`]
    pub layers: BTreeMap<u16, LayerSource>,
}

impl SourceStats {
    /// Create empty statistics for an SSRC
    pub fn new(ssrc: RtpSsrc) -> Self {
        Self {
            ssrc,
            clock_rate: 0,
            seq: SequenceExtender::new(),
            timestamp: TimestampExtender::new(),
            num_packets: 0,
            num_bytes: 0,
            num_frames: 0,
            num_frames_delta: 0,
            lost_packets: 0,
            lost_packets_detected: 0,
            drop_packets: 0,
            total_packets_since_last_report: 0,
            total_bytes_since_last_report: 0,
            min_ext_seq_since_last_report: ExtendedSequenceNumber::MAX,
            total_nacks: 0,
            last_nacked: None,
            total_plis: 0,
            last_pli: None,
            last_report: None,
            last_sender_report: None,
            first_sender_report: None,
            sender_report_timestamp: TimestampExtender::new(),
            skew: 0,
            drift: 1.0,
            bitrate: Accumulator::new(STATS_WINDOW_MS),
            frames: Accumulator::new(STATS_WINDOW_MS),
            losts: Accumulator::new(STATS_WINDOW_MS),
            layers: BTreeMap::new(),
        }
    }

    /// Set the clock rate
    pub fn with_clock_rate(mut self, clock_rate: u32) -> Self {
        self.clock_rate = clock_rate;
        self
    }

    /// Account one received packet
    pub fn update(
        &mut self,
        now: u64,
        ext_seq: ExtendedSequenceNumber,
        size: u64,
        layer: Option<LayerInfo>,
    ) {
        self.num_packets += 1;
        self.num_bytes += size;
        self.bitrate.update(now, size);

        self.total_packets_since_last_report += 1;
        self.total_bytes_since_last_report += size;
        self.min_ext_seq_since_last_report = self.min_ext_seq_since_last_report.min(ext_seq);

        if let Some(info) = layer {
            self.layers
                .entry(info.id())
                .or_insert_with(|| LayerSource::new(info))
                .update(now, size);
        }
    }

    /// Account a frame boundary
    pub fn add_frame(&mut self, now: u64) {
        self.num_frames += 1;
        self.num_frames_delta = self.frames.update(now, 1);
    }

    /// Account packets the loss tracker found missing
    pub fn add_lost(&mut self, now: u64, lost: u64) {
        self.lost_packets_detected += lost;
        self.losts.update(now, lost);
    }

    /// Account a PLI about to be sent for this source
    ///
    /// Returns `false`, counting nothing, if the previous PLI went out less
    /// than [`MIN_PLI_INTERVAL_MS`] ago.
    pub fn add_pli(&mut self, now: u64) -> bool {
        if self
            .last_pli
            .is_some_and(|last| now.saturating_sub(last) < MIN_PLI_INTERVAL_MS)
        {
            trace!("PLI suppressed [ssrc:{},last:{:?}]", self.ssrc, self.last_pli);
            return false;
        }

        self.total_plis += 1;
        self.last_pli = Some(now);
        true
    }

    /// Packets found missing in the last second
    pub fn instant_lost(&self) -> u64 {
        self.losts.instant()
    }

    /// Refresh instant bitrates without adding data
    pub fn refresh(&mut self, now: u64) {
        self.bitrate.refresh(now);
        self.num_frames_delta = self.frames.refresh(now);
        self.losts.refresh(now);
        for layer in self.layers.values_mut() {
            layer.bitrate.refresh(now);
        }
    }

    /// Instant bitrate in bits per second
    pub fn bitrate_bps(&self) -> u64 {
        (self.bitrate.instant_avg() * 8.0) as u64
    }

    /// Highest extended sequence number received
    pub fn highest_ext_seq(&self) -> Option<ExtendedSequenceNumber> {
        self.seq.extended()
    }

    /// Last sender report received
    pub fn last_sender_report(&self) -> Option<&ReceivedSenderReport> {
        self.last_sender_report.as_ref()
    }

    /// Record a sender report and recompute skew and drift
    ///
    /// A report whose RTP timestamp predates the first report seen is stale
    /// and ignored.
    pub fn process_sender_report(&mut self, now: u64, sr: &SenderReportInfo) {
        let Some(ext_rtp_timestamp) = self.sender_report_timestamp.extend(sr.rtp_timestamp) else {
            debug!(
                "Ignoring stale sender report [ssrc:{},ts:{}]",
                self.ssrc, sr.rtp_timestamp
            );
            return;
        };

        let received = ReceivedSenderReport {
            ntp_timestamp: sr.ntp_timestamp,
            rtp_timestamp: sr.rtp_timestamp,
            ext_rtp_timestamp,
            received_at: now,
        };

        self.last_sender_report = Some(received);
        let first = *self.first_sender_report.get_or_insert(received);

        if self.clock_rate == 0 {
            return;
        }

        let delta_time =
            received.ntp_timestamp.to_millis() as i64 - first.ntp_timestamp.to_millis() as i64;
        let delta_ticks = received.ext_rtp_timestamp as i64 - first.ext_rtp_timestamp as i64;
        let delta_timestamp = rtp_ticks_to_millis(delta_ticks, self.clock_rate);

        self.skew = delta_time - delta_timestamp;
        self.drift = if delta_time > 0 {
            delta_timestamp as f64 / delta_time as f64
        } else {
            1.0
        };

        trace!(
            "Sender report processed [ssrc:{},skew:{}ms,drift:{}]",
            self.ssrc, self.skew, self.drift
        );
    }

    /// Sender wall clock (ms since the NTP epoch) of an RTP timestamp
    ///
    /// Correlated from the last sender report plus the RTP clock distance, so a
    /// fresh report is not needed per packet.
    pub fn sender_time_for(&self, timestamp: u32) -> Option<u64> {
        let sr = self.last_sender_report.as_ref()?;
        if self.clock_rate == 0 {
            return None;
        }

        let ticks = rtp_timestamp_delta(sr.rtp_timestamp, timestamp);
        let elapsed = rtp_ticks_to_millis(ticks, self.clock_rate);
        let sender_time = sr.ntp_timestamp.to_millis() as i64 + elapsed;
        u64::try_from(sender_time).ok()
    }

    /// Build the receiver report block for the period since the last report
    ///
    /// Returns `None` if nothing was received in the period. The period counters
    /// are reset together with producing the block, and also when the period
    /// is inconsistent (lowest sequence number above the highest one).
    pub fn create_report(&mut self, now: u64) -> Option<RtcpReportBlock> {
        if self.total_packets_since_last_report == 0 {
            return None;
        }

        let ext_seq = self.seq.extended()?;

        if self.min_ext_seq_since_last_report > ext_seq {
            debug!(
                "Skipping receiver report, min seq above highest [ssrc:{},min:{},ext:{}]",
                self.ssrc, self.min_ext_seq_since_last_report, ext_seq
            );
            self.reset_period();
            return None;
        }

        let expected = ext_seq - self.min_ext_seq_since_last_report + 1;
        let lost = expected.saturating_sub(self.total_packets_since_last_report);
        self.lost_packets += lost;

        let mut block = RtcpReportBlock::new(self.ssrc);
        block.fraction_lost = RtcpReportBlock::calculate_fraction_lost(expected, lost);
        block.cumulative_lost =
            self.lost_packets.min(RtcpReportBlock::MAX_CUMULATIVE_LOST as u64) as u32;
        block.highest_seq = ext_seq as u32;

        if let Some(sr) = &self.last_sender_report {
            block.last_sr = sr.ntp_timestamp.to_u32();
            block.delay_since_last_sr =
                RtcpReportBlock::delay_from_millis(now.saturating_sub(sr.received_at));
        }

        self.reset_period();
        self.last_report = Some(now);

        Some(block)
    }

    fn reset_period(&mut self) {
        self.total_packets_since_last_report = 0;
        self.total_bytes_since_last_report = 0;
        self.min_ext_seq_since_last_report = ExtendedSequenceNumber::MAX;
    }

    /// Reset everything but the SSRC and clock rate
    pub fn reset(&mut self) {
        *self = Self::new(self.ssrc).with_clock_rate(self.clock_rate);
    }
}
