//! # sfu-rtp-core
//!
//! Protocol-state primitives for the incoming RTP media pipeline of the relay.
//!
//! This crate holds everything that is pure wire-level arithmetic or per-source
//! bookkeeping and that does not need a scheduler:
//!
//! - [`extension`]: unwrapping of 16-bit sequence numbers and 32-bit RTP
//!   timestamps into monotonic 64-bit values
//! - [`packet`]: the shared [`RtpPacket`] model handed around the pipeline
//! - [`packet::rtcp`]: RTCP value types (NTP timestamps, report blocks, NACK fields)
//! - [`stats`]: loss tracking, per-source statistics and windowed accumulators
//! - [`time`]: RTP clock conversions
//!
//! Wire parsing, SRTP and transport I/O live elsewhere; packets reach this crate
//! already parsed and decrypted.

pub mod error;
pub mod extension;
pub mod packet;
pub mod stats;
pub mod time;

pub use error::{Error, Result};
pub use extension::{ExtensionState, SequenceExtender, TimestampExtender, WrappingCounter};
pub use packet::{
    DependencyDescriptor, FrameTemplate, LayerInfo, RtpPacket, TemplateDependencyStructure,
};
pub use packet::rtcp::{NackField, NtpTimestamp, RtcpReportBlock, SenderReportInfo};
pub use stats::{Accumulator, LayerSource, LossTracker, SourceStats};

/// RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Wire-level (16-bit) RTP sequence number
pub type RtpSequenceNumber = u16;

/// Wire-level (32-bit) RTP timestamp
pub type RtpTimestamp = u32;

/// Extended (wraparound free) sequence number
pub type ExtendedSequenceNumber = u64;
