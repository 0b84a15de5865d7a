//! RTP packet model
//!
//! [`RtpPacket`] is the already-parsed, already-decrypted packet as it flows
//! through the pipeline. It is shared as `Arc<RtpPacket>` between the jitter
//! buffer, the loss tracker and the listeners; the few fields the pipeline
//! rewrites (extended sequence number, sender time, timestamp skew) are changed
//! through `Arc::make_mut` so no other observer sees the rewrite.

pub mod layer;
pub mod rtcp;

use bytes::{Buf, Bytes};

use crate::error::Error;
use crate::{ExtendedSequenceNumber, Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

pub use layer::{DependencyDescriptor, FrameTemplate, LayerInfo, TemplateDependencyStructure};

/// Size of a fixed RTP header without CSRCs or extensions
pub const RTP_MIN_HEADER_SIZE: usize = 12;

/// RTP packet as seen by the incoming pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RtpPacket {
    /// Synchronization source
    pub ssrc: RtpSsrc,

    /// Payload type
    pub payload_type: u8,

    /// Marker bit (end of frame for video)
    pub marker: bool,

    /// Wire sequence number
    seq_num: RtpSequenceNumber,

    /// Wrap cycles of the sequence number
    seq_cycles: u32,

    /// Wire RTP timestamp
    timestamp: RtpTimestamp,

    /// Wrap cycles of the timestamp
    timestamp_cycles: u32,

    /// Clock rate of the RTP timestamp in Hz (0 if unknown)
    pub clock_rate: u32,

    /// Arrival wall-clock time in milliseconds
    pub time: u64,

    /// Size of the RTP header on the wire, including extensions
    pub header_size: usize,

    /// Media payload, empty for padding-only and probing packets
    pub payload: Bytes,

    /// Sender wall-clock time in milliseconds, correlated from the last sender report
    pub sender_time: Option<u64>,

    /// Clock skew annotation in milliseconds
    pub timestamp_skew: i64,

    /// Simulcast/SVC layer this packet belongs to
    pub layer: Option<LayerInfo>,

    /// Dependency descriptor header extension, if present on this packet
    pub dependency_descriptor: Option<DependencyDescriptor>,
}

impl RtpPacket {
    /// Create a packet with an empty payload
    pub fn new(
        ssrc: RtpSsrc,
        seq_num: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        time: u64,
    ) -> Self {
        Self {
            ssrc,
            payload_type: 0,
            marker: false,
            seq_num,
            seq_cycles: 0,
            timestamp,
            timestamp_cycles: 0,
            clock_rate: 0,
            time,
            header_size: RTP_MIN_HEADER_SIZE,
            payload: Bytes::new(),
            sender_time: None,
            timestamp_skew: 0,
            layer: None,
            dependency_descriptor: None,
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Set the payload type
    pub fn with_payload_type(mut self, payload_type: u8) -> Self {
        self.payload_type = payload_type;
        self
    }

    /// Set the marker bit
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Set the clock rate
    pub fn with_clock_rate(mut self, clock_rate: u32) -> Self {
        self.clock_rate = clock_rate;
        self
    }

    /// Attach a dependency descriptor
    pub fn with_dependency_descriptor(mut self, descriptor: DependencyDescriptor) -> Self {
        self.dependency_descriptor = Some(descriptor);
        self
    }

    /// Wire sequence number
    pub fn seq_num(&self) -> RtpSequenceNumber {
        self.seq_num
    }

    /// Replace the wire sequence number, keeping the cycles
    pub fn set_seq_num(&mut self, seq_num: RtpSequenceNumber) {
        self.seq_num = seq_num;
    }

    /// Sequence number wrap cycles
    pub fn seq_cycles(&self) -> u32 {
        self.seq_cycles
    }

    /// Set the sequence number wrap cycles
    pub fn set_seq_cycles(&mut self, cycles: u32) {
        self.seq_cycles = cycles;
    }

    /// Extended sequence number
    pub fn ext_seq_num(&self) -> ExtendedSequenceNumber {
        (u64::from(self.seq_cycles) << 16) | u64::from(self.seq_num)
    }

    /// Set both wire sequence number and cycles from an extended value
    pub fn set_ext_seq_num(&mut self, ext_seq_num: ExtendedSequenceNumber) {
        self.seq_num = ext_seq_num as u16;
        self.seq_cycles = (ext_seq_num >> 16) as u32;
    }

    /// Wire RTP timestamp
    pub fn timestamp(&self) -> RtpTimestamp {
        self.timestamp
    }

    /// Timestamp wrap cycles
    pub fn timestamp_cycles(&self) -> u32 {
        self.timestamp_cycles
    }

    /// Set the timestamp wrap cycles
    pub fn set_timestamp_cycles(&mut self, cycles: u32) {
        self.timestamp_cycles = cycles;
    }

    /// Extended RTP timestamp
    pub fn ext_timestamp(&self) -> u64 {
        (u64::from(self.timestamp_cycles) << 32) | u64::from(self.timestamp)
    }

    /// Length of the media payload
    pub fn media_length(&self) -> usize {
        self.payload.len()
    }

    /// Padding-only or probing packet
    pub fn is_padding(&self) -> bool {
        self.payload.is_empty()
    }

    /// Total size on the wire (header + payload)
    pub fn size(&self) -> usize {
        self.header_size + self.payload.len()
    }

    /// Strip the original sequence number from an RTX payload (RFC 4588)
    ///
    /// The first two payload bytes carry the sequence number of the packet
    /// being retransmitted. They are removed and become this packet's sequence
    /// number; cycles are left to the caller, which knows the media source.
    pub fn recover_osn(&mut self) -> Result<RtpSequenceNumber> {
        if self.payload.len() < 2 {
            return Err(Error::BufferTooSmall {
                required: 2,
                available: self.payload.len(),
            });
        }

        let osn = self.payload.get_u16();
        self.seq_num = osn;
        Ok(osn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_sequence_number() {
        let mut packet = RtpPacket::new(0x1234, 10, 1000, 0);
        assert_eq!(packet.ext_seq_num(), 10);

        packet.set_seq_cycles(2);
        assert_eq!(packet.ext_seq_num(), 0x2_000A);

        packet.set_ext_seq_num(0x3_FFFF);
        assert_eq!(packet.seq_num(), 0xFFFF);
        assert_eq!(packet.seq_cycles(), 3);
    }

    #[test]
    fn test_extended_timestamp() {
        let mut packet = RtpPacket::new(0x1234, 10, 0xFFFF_FFFF, 0);
        packet.set_timestamp_cycles(1);
        assert_eq!(packet.ext_timestamp(), 0x1_FFFF_FFFF);
    }

    #[test]
    fn test_padding_and_size() {
        let packet = RtpPacket::new(1, 1, 0, 0);
        assert!(packet.is_padding());
        assert_eq!(packet.size(), RTP_MIN_HEADER_SIZE);

        let packet = packet.with_payload(vec![1u8, 2, 3]);
        assert!(!packet.is_padding());
        assert_eq!(packet.media_length(), 3);
        assert_eq!(packet.size(), RTP_MIN_HEADER_SIZE + 3);
    }

    #[test]
    fn test_recover_osn() {
        let mut packet = RtpPacket::new(2, 500, 0, 0).with_payload(vec![0x12u8, 0x34, 0xAA, 0xBB]);

        assert_eq!(packet.recover_osn(), Ok(0x1234));
        assert_eq!(packet.seq_num(), 0x1234);
        assert_eq!(&packet.payload[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_recover_osn_too_short() {
        let mut packet = RtpPacket::new(2, 500, 0, 0).with_payload(vec![0x12u8]);

        assert_eq!(
            packet.recover_osn(),
            Err(Error::BufferTooSmall { required: 2, available: 1 })
        );
        assert_eq!(packet.seq_num(), 500);
    }
}
