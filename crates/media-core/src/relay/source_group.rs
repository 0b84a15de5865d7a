//! Incoming source group
//!
//! One media SSRC and its optional RTX SSRC, composed with a jitter buffer, a
//! loss tracker and a dispatch timer. The group is single writer: everything
//! here runs on the context that owns it, with time passed in explicitly as
//! media clock milliseconds. [`crate::relay::SourceGroupHandle`] provides that
//! context as a tokio task.
//!
//! Packet flow:
//!
//! 1. [`IncomingSourceGroup::process`] extends sequence numbers and timestamps
//!    and updates the per-source statistics.
//! 2. [`IncomingSourceGroup::recover_rtx`] turns a retransmission back into
//!    the media packet it carries.
//! 3. [`IncomingSourceGroup::add_packet`] runs loss detection and queues the
//!    packet in the jitter buffer.
//! 4. [`IncomingSourceGroup::dispatch`] releases due packets to the listeners
//!    in one ordered batch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use sfu_rtp_core::packet::TemplateDependencyStructure;
use sfu_rtp_core::stats::{LossTracker, SourceStats};
use sfu_rtp_core::{
    ExtendedSequenceNumber, NackField, RtcpReportBlock, RtpPacket, RtpSequenceNumber, RtpSsrc,
    SenderReportInfo,
};

use super::estimator::RemoteRateEstimator;
use super::listener::{ListenerRegistry, RtpListener};
use super::timer::DispatchTimer;
use crate::config::{MediaType, SourceGroupConfig};
use crate::error::Result;
use crate::jitter::{PacketBuffer, ReorderingBuffer};

/// Lower bound of the RTT derived wait time
pub const MIN_RTX_WAIT_TIME_MS: u64 = 200;

/// Upper bound of the RTT derived wait time
pub const MAX_RTX_WAIT_TIME_MS: u64 = 750;

/// Lifecycle of a source group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupState {
    /// Created, not dispatching yet
    Stopped,
    /// Dispatching to listeners
    Started,
    /// Stopped for good
    Ended,
}

/// Outcome of [`IncomingSourceGroup::add_packet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketAdmission {
    /// Queued in the jitter buffer, `lost` packets newly found missing
    Queued {
        /// Packets newly found missing
        lost: u64,
    },
    /// Already released, already queued, or sent before the stream start
    Rejected,
    /// Loopback of an RTT probe, consumed
    Probe {
        /// Measured round trip time in ms
        rtt: u64,
    },
    /// Not for the media SSRC, or the group has ended
    Ignored,
}

/// Outcome of [`IncomingSourceGroup::recover_rtx`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtxRecovery {
    /// Rewritten into the media packet it retransmits
    Recovered,
    /// Padding only, no original sequence number to recover
    Padding,
    /// Retransmits a packet sent before the first media packet seen
    BeforeStreamStart,
}

/// Statistics published after every dispatch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceGroupStats {
    /// Packets ever found missing
    pub lost: u64,
    /// Shortest jitter buffer wait in the last second, ms
    pub min_waited_time: u64,
    /// Longest jitter buffer wait in the last second, ms
    pub max_waited_time: u64,
    /// Mean jitter buffer wait in the last second, ms
    pub avg_waited_time: f64,
    /// Padding packets consumed by the jitter buffer
    pub discarded: u64,
    /// Last measured round trip time, ms
    pub rtt: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct RttProbe {
    ext_seq: ExtendedSequenceNumber,
    sent_at: u64,
}

/// Media source plus RTX source of one incoming stream
pub struct IncomingSourceGroup {
    config: SourceGroupConfig,
    media: SourceStats,
    rtx: Option<SourceStats>,
    buffer: ReorderingBuffer,
    losts: LossTracker,
    listeners: ListenerRegistry,
    timer: Option<DispatchTimer>,
    estimator: Option<Arc<dyn RemoteRateEstimator>>,
    remb_active: bool,
    state: GroupState,
    muted: bool,
    probe: Option<RttProbe>,
    rtt: Option<u64>,
    /// Last template structure seen on the media SSRC
    template_structure: Option<TemplateDependencyStructure>,
    remote_bitrate_estimation: u64,
    stats: SourceGroupStats,
}

impl IncomingSourceGroup {
    /// Create a stopped group for a media SSRC and an optional RTX SSRC
    pub fn new(
        config: SourceGroupConfig,
        media_ssrc: RtpSsrc,
        rtx_ssrc: Option<RtpSsrc>,
        estimator: Option<Arc<dyn RemoteRateEstimator>>,
    ) -> Result<Self> {
        config.validate()?;

        let mut group = Self {
            buffer: ReorderingBuffer::new(0),
            losts: LossTracker::new(config.loss_window_size),
            media: SourceStats::new(media_ssrc),
            rtx: rtx_ssrc.map(SourceStats::new),
            listeners: ListenerRegistry::new(),
            timer: None,
            estimator,
            remb_active: false,
            state: GroupState::Stopped,
            muted: false,
            probe: None,
            rtt: None,
            template_structure: None,
            remote_bitrate_estimation: 0,
            stats: SourceGroupStats::default(),
            config,
        };
        let wait = group.wait_time_policy();
        group.buffer.set_max_wait_time(wait);

        debug!(
            "Source group created [media:{},rtx:{:?},wait:{}ms]",
            media_ssrc, rtx_ssrc, wait
        );
        Ok(group)
    }

    /// Start dispatching
    ///
    /// No-op unless the group is in its initial stopped state.
    pub fn start(&mut self, now: u64) {
        if self.state != GroupState::Stopped {
            debug!("Ignoring start [media:{},state:{:?}]", self.media.ssrc, self.state);
            return;
        }

        self.state = GroupState::Started;
        self.timer = Some(DispatchTimer::new());

        if self.config.remb_enabled {
            if let Some(estimator) = &self.estimator {
                estimator.add_stream(self.media.ssrc);
                self.remb_active = true;
            }
        }

        info!("Source group started [media:{},remb:{}]", self.media.ssrc, self.remb_active);
        // Packets queued before start
        self.reschedule(now);
    }

    /// Stop for good, notifying every listener
    ///
    /// No-op unless the group is started, so a group stopped before its start
    /// can still be started later. Only the first call after start has an
    /// effect.
    pub fn stop(&mut self) {
        if self.state != GroupState::Started {
            debug!("Ignoring stop [media:{},state:{:?}]", self.media.ssrc, self.state);
            return;
        }

        self.state = GroupState::Ended;
        self.timer = None;
        self.probe = None;

        if self.remb_active {
            if let Some(estimator) = &self.estimator {
                estimator.remove_stream(self.media.ssrc);
            }
            self.remb_active = false;
        }

        self.listeners.for_each(|listener| listener.on_ended());
        self.listeners.clear();
        self.buffer.clear();

        info!("Source group stopped [media:{}]", self.media.ssrc);
    }

    /// Register a listener
    ///
    /// Returns `false` if it was already registered or the group has ended.
    pub fn add_listener(&mut self, listener: &Arc<dyn RtpListener>) -> bool {
        if self.state == GroupState::Ended {
            return false;
        }
        self.listeners.add(listener)
    }

    /// Unregister a listener
    pub fn remove_listener(&mut self, listener: &Arc<dyn RtpListener>) -> bool {
        self.listeners.remove(listener)
    }

    fn is_media(&self, ssrc: RtpSsrc) -> bool {
        ssrc == self.media.ssrc
    }

    fn is_rtx(&self, ssrc: RtpSsrc) -> bool {
        self.rtx.as_ref().is_some_and(|rtx| rtx.ssrc == ssrc)
    }

    fn source_mut(&mut self, ssrc: RtpSsrc) -> Option<&mut SourceStats> {
        if self.is_media(ssrc) {
            Some(&mut self.media)
        } else {
            self.rtx.as_mut().filter(|rtx| rtx.ssrc == ssrc)
        }
    }

    /// Extend the packet counters and account it on its source
    ///
    /// Returns `None` if the SSRC belongs to neither source, or if the packet
    /// was sent before the first one of its source and has no extended
    /// sequence number. Such a packet is not accounted.
    pub fn process(&mut self, packet: &mut RtpPacket) -> Option<&SourceStats> {
        let is_media = self.is_media(packet.ssrc);
        if !is_media && !self.is_rtx(packet.ssrc) {
            trace!("Packet for unknown ssrc [ssrc:{}]", packet.ssrc);
            return None;
        }

        if is_media && self.config.media_type == MediaType::Video {
            self.resolve_layer(packet);
        }

        let now = packet.time;
        let source = if is_media { &mut self.media } else { self.rtx.as_mut()? };

        if source.clock_rate == 0 {
            source.clock_rate = packet.clock_rate;
        }

        let Some(ext_seq) = source.seq.extend(packet.seq_num()) else {
            debug!(
                "Packet sent before stream start [ssrc:{},seq:{}]",
                packet.ssrc,
                packet.seq_num()
            );
            return None;
        };
        packet.set_ext_seq_num(ext_seq);
        let timestamp_cycles = source
            .timestamp
            .extend(packet.timestamp())
            .map_or(0, |ext| (ext >> 32) as u32);
        packet.set_timestamp_cycles(timestamp_cycles);

        source.update(now, ext_seq, packet.size() as u64, packet.layer);
        if is_media && packet.marker {
            source.add_frame(now);
        }

        Some(&*source)
    }

    fn resolve_layer(&mut self, packet: &mut RtpPacket) {
        let Some(descriptor) = &packet.dependency_descriptor else {
            return;
        };
        let template_id = descriptor.template_id;

        if let Some(structure) = &descriptor.template_structure {
            trace!(
                "Template structure updated [ssrc:{},templates:{}]",
                packet.ssrc,
                structure.templates.len()
            );
            self.template_structure = Some(structure.clone());
        }

        let layer = self
            .template_structure
            .as_ref()
            .and_then(|structure| structure.layer_for(template_id));
        if layer.is_some() {
            packet.layer = layer;
        }
    }

    /// Unwrap an RTX packet into the media packet it retransmits
    ///
    /// Padding-only retransmissions carry no original sequence number and are
    /// left untouched.
    pub fn recover_rtx(&self, packet: &mut RtpPacket) -> Result<RtxRecovery> {
        if packet.is_padding() {
            return Ok(RtxRecovery::Padding);
        }

        let osn = packet.recover_osn()?;
        let Some(seq_cycles) = self.media.seq.recover_cycles(osn) else {
            debug!(
                "Retransmission from before stream start [ssrc:{},osn:{}]",
                packet.ssrc, osn
            );
            return Ok(RtxRecovery::BeforeStreamStart);
        };

        let timestamp_cycles = self
            .media
            .timestamp
            .recover_cycles(packet.timestamp())
            .unwrap_or(0);
        packet.ssrc = self.media.ssrc;
        packet.set_seq_cycles(seq_cycles);
        packet.set_timestamp_cycles(timestamp_cycles);

        trace!(
            "Recovered rtx packet [ssrc:{},osn:{},ext:{}]",
            packet.ssrc,
            osn,
            packet.ext_seq_num()
        );
        Ok(RtxRecovery::Recovered)
    }

    /// Run a freshly received packet through the whole ingress path
    ///
    /// Rejections are charged to the source the packet arrived on, so a
    /// retransmission the jitter buffer refuses counts on the RTX source.
    pub fn receive(&mut self, mut packet: RtpPacket, now: u64) -> PacketAdmission {
        let size = packet.size();
        let ssrc = packet.ssrc;
        if !self.is_media(ssrc) && !self.is_rtx(ssrc) {
            trace!("Packet for unknown ssrc [ssrc:{}]", ssrc);
            return PacketAdmission::Ignored;
        }

        let admission = if self.process(&mut packet).is_none() {
            PacketAdmission::Rejected
        } else if self.is_rtx(ssrc) {
            match self.recover_rtx(&mut packet) {
                Ok(RtxRecovery::Recovered) => self.add_packet(Arc::new(packet), size, now),
                Ok(RtxRecovery::Padding) => PacketAdmission::Ignored,
                Ok(RtxRecovery::BeforeStreamStart) => PacketAdmission::Rejected,
                Err(e) => {
                    warn!("Dropping malformed rtx packet [ssrc:{}]: {}", ssrc, e);
                    PacketAdmission::Ignored
                }
            }
        } else {
            self.add_packet(Arc::new(packet), size, now)
        };

        if admission == PacketAdmission::Rejected {
            if let Some(source) = self.source_mut(ssrc) {
                source.drop_packets += 1;
            }
        }
        admission
    }

    /// Loss detection and jitter buffer admission of a media packet
    ///
    /// The caller accounts rejections on the receiving source, see
    /// [`Self::receive`].
    pub fn add_packet(
        &mut self,
        mut packet: Arc<RtpPacket>,
        size: usize,
        now: u64,
    ) -> PacketAdmission {
        if self.state == GroupState::Ended || !self.is_media(packet.ssrc) {
            return PacketAdmission::Ignored;
        }

        let ext_seq = packet.ext_seq_num();
        if let Some(probe) = self.probe.filter(|probe| probe.ext_seq == ext_seq) {
            self.probe = None;
            let rtt = now.saturating_sub(probe.sent_at);
            debug!("RTT probe returned [ext:{},rtt:{}ms]", probe.ext_seq, rtt);
            self.set_rtt(rtt, now);
            return PacketAdmission::Probe { rtt };
        }

        let lost = self.losts.add_packet(ext_seq);
        let estimator = self.estimator.as_ref().filter(|_| self.remb_active);

        if lost > 0 {
            trace!("Packets lost [ssrc:{},lost:{},ext:{}]", packet.ssrc, lost, ext_seq);
            self.media.add_lost(now, lost);
            if let Some(estimator) = estimator {
                estimator.update_lost(now, packet.ssrc, lost);
            }
        }

        if let Some(estimator) = estimator {
            estimator.update(now, &packet, size);
        }

        let sender_time = self.media.sender_time_for(packet.timestamp());
        let rewritten = Arc::make_mut(&mut packet);
        rewritten.sender_time = sender_time;
        rewritten.timestamp_skew = self.media.skew;

        let limit = self.config.max_accumulated_wait_time_ms;
        if let (Some(limit), Some(head)) = (limit, self.buffer.head_time()) {
            if now.saturating_sub(head) >= limit {
                debug!(
                    "Accumulated wait over limit, hurrying up [ssrc:{},queued:{},limit:{}ms]",
                    packet.ssrc,
                    self.buffer.len(),
                    limit
                );
                self.buffer.hurry_up();
            }
        }

        if !self.buffer.add(packet) {
            debug!("Packet rejected by jitter buffer [ssrc:{},ext:{}]", self.media.ssrc, ext_seq);
            return PacketAdmission::Rejected;
        }

        self.reschedule(now);
        PacketAdmission::Queued { lost }
    }

    fn reschedule(&mut self, now: u64) {
        let Some(timer) = self.timer.as_mut() else {
            return;
        };

        match self.buffer.get_wait_time(now) {
            Some(wait) => timer.schedule(now, wait),
            None => timer.cancel(),
        }
    }

    /// Pending dispatch deadline
    pub fn deadline(&self) -> Option<u64> {
        self.timer.as_ref().and_then(DispatchTimer::deadline)
    }

    /// Release due packets to the listeners
    ///
    /// Returns the number of packets released. Extended sequence numbers are
    /// shifted down by the discarded padding count so listeners see a gapless
    /// numbering.
    pub fn dispatch(&mut self, now: u64) -> usize {
        if self.state != GroupState::Started {
            return 0;
        }
        if let Some(timer) = self.timer.as_mut() {
            timer.cancel();
        }

        let mut batch = Vec::new();
        while let Some(mut packet) = self.buffer.get_ordered(now) {
            let discarded = self.buffer.discarded();
            if discarded > 0 {
                let ext_seq = packet.ext_seq_num().saturating_sub(discarded);
                Arc::make_mut(&mut packet).set_ext_seq_num(ext_seq);
            }
            batch.push(packet);
        }

        if !self.muted && !batch.is_empty() {
            trace!("Dispatching packets [ssrc:{},count:{}]", self.media.ssrc, batch.len());
            self.listeners.for_each(|listener| listener.on_rtp_batch(&batch));
        }

        self.stats = SourceGroupStats {
            lost: self.losts.total(),
            min_waited_time: self.buffer.min_waited_time(),
            max_waited_time: self.buffer.max_waited_time(),
            avg_waited_time: self.buffer.avg_waited_time(),
            discarded: self.buffer.discarded(),
            rtt: self.rtt,
        };

        self.reschedule(now);
        batch.len()
    }

    /// Handle an RTCP BYE
    pub fn bye(&mut self, ssrc: RtpSsrc) {
        if !self.is_media(ssrc) || self.state == GroupState::Ended {
            return;
        }

        info!("Bye received [ssrc:{}]", ssrc);
        self.buffer.reset();
        self.losts.reset();
        if let Some(timer) = self.timer.as_mut() {
            timer.cancel();
        }
        self.listeners.for_each(|listener| listener.on_bye());
    }

    /// Record a sender report for the media or RTX source
    pub fn process_sender_report(&mut self, now: u64, sr: &SenderReportInfo) {
        if self.is_media(sr.ssrc) {
            self.media.process_sender_report(now, sr);
        } else if let Some(rtx) = self.rtx.as_mut().filter(|rtx| rtx.ssrc == sr.ssrc) {
            rtx.process_sender_report(now, sr);
        }
    }

    fn wait_time_policy(&self) -> u64 {
        if let Some(wait) = self.config.max_wait_time_override_ms {
            return wait;
        }
        if !self.config.rtx_enabled {
            return 0;
        }
        match self.rtt {
            Some(rtt) => rtt
                .saturating_mul(3)
                .clamp(MIN_RTX_WAIT_TIME_MS, MAX_RTX_WAIT_TIME_MS),
            None => self.config.initial_max_wait_time_ms,
        }
    }

    /// Update the round trip time and the derived jitter buffer wait time
    pub fn set_rtt(&mut self, rtt: u64, now: u64) {
        self.rtt = Some(rtt);
        self.stats.rtt = Some(rtt);

        let wait = self.wait_time_policy();
        self.buffer.set_max_wait_time(wait);
        debug!("RTT updated [ssrc:{},rtt:{}ms,wait:{}ms]", self.media.ssrc, rtt, wait);

        self.reschedule(now);
    }

    /// Arm an RTT probe and return the sequence number to send it with
    ///
    /// The probe is the last media sequence number, retransmitted over RTX.
    /// Returns `None` before any media was received.
    pub fn set_rtt_rtx(&mut self, now: u64) -> Option<RtpSequenceNumber> {
        let ext_seq = self.media.seq.extended()?;
        self.probe = Some(RttProbe { ext_seq, sent_at: now });
        trace!("RTT probe armed [ssrc:{},ext:{}]", self.media.ssrc, ext_seq);
        Some(ext_seq as RtpSequenceNumber)
    }

    /// Pin or unpin the jitter buffer wait time
    pub fn set_max_wait_time(&mut self, wait: Option<u64>, now: u64) {
        self.config.max_wait_time_override_ms = wait;
        let wait = self.wait_time_policy();
        self.buffer.set_max_wait_time(wait);
        debug!("Max wait time set [ssrc:{},wait:{}ms]", self.media.ssrc, wait);
        self.reschedule(now);
    }

    /// Current jitter buffer wait time in ms
    pub fn max_wait_time(&self) -> u64 {
        self.buffer.max_wait_time()
    }

    /// Stop or resume delivery; the buffer keeps draining while muted
    pub fn mute(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Whether delivery is muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// NACK fields for the packets currently missing
    pub fn get_nacks(&mut self, now: u64) -> Vec<NackField> {
        let nacks = self.losts.get_nacks();
        if !nacks.is_empty() {
            self.media.total_nacks += nacks.len() as u64;
            self.media.last_nacked = Some(now);
        }
        nacks
    }

    /// Account a PLI about to be requested for the media source
    ///
    /// Returns `false` if one was requested too recently and this one should
    /// not be sent.
    pub fn add_pli(&mut self, now: u64) -> bool {
        self.media.add_pli(now)
    }

    /// Receiver report blocks for the media and RTX sources
    pub fn create_reports(&mut self, now: u64) -> Vec<RtcpReportBlock> {
        let mut blocks = Vec::with_capacity(2);
        blocks.extend(self.media.create_report(now));
        if let Some(rtx) = self.rtx.as_mut() {
            blocks.extend(rtx.create_report(now));
        }
        blocks
    }

    /// Refresh instant bitrates
    pub fn update(&mut self, now: u64) {
        self.media.refresh(now);
        if let Some(rtx) = self.rtx.as_mut() {
            rtx.refresh(now);
        }
    }

    /// Latest estimate from the remote rate estimator, bps
    pub fn remote_bitrate_estimation(&self) -> u64 {
        self.remote_bitrate_estimation
    }

    /// Store the latest estimate from the remote rate estimator
    pub fn set_remote_bitrate_estimation(&mut self, bitrate: u64) {
        self.remote_bitrate_estimation = bitrate;
    }

    /// Statistics published by the last dispatch
    pub fn stats(&self) -> &SourceGroupStats {
        &self.stats
    }

    /// Media source statistics
    pub fn media(&self) -> &SourceStats {
        &self.media
    }

    /// RTX source statistics
    pub fn rtx(&self) -> Option<&SourceStats> {
        self.rtx.as_ref()
    }

    /// Lifecycle state
    pub fn state(&self) -> GroupState {
        self.state
    }

    /// Last measured round trip time
    pub fn rtt(&self) -> Option<u64> {
        self.rtt
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Configuration in effect
    pub fn config(&self) -> &SourceGroupConfig {
        &self.config
    }
}

impl std::fmt::Debug for IncomingSourceGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingSourceGroup")
            .field("media", &self.media.ssrc)
            .field("rtx", &self.rtx.as_ref().map(|rtx| rtx.ssrc))
            .field("state", &self.state)
            .field("muted", &self.muted)
            .field("queued", &self.buffer.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}
