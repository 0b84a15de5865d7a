//! # sfu-media-core
//!
//! Incoming RTP media pipeline of the SFU: jitter buffering, loss recovery
//! bookkeeping and fan-out of ordered packets to listeners.
//!
//! ```text
//! transport ──► SourceGroupHandle ──► IncomingSourceGroup ──► RtpListener(s)
//!                   (tokio task)        │ process / recover_rtx
//!                                       │ LossTracker + ReorderingBuffer
//!                                       └ DispatchTimer
//! ```
//!
//! Packets arrive parsed and decrypted as [`sfu_rtp_core::RtpPacket`]. Time is
//! media clock milliseconds, see [`MediaClock`].

pub mod clock;
pub mod config;
pub mod error;
pub mod jitter;
pub mod relay;

pub use clock::MediaClock;
pub use config::{MediaType, SourceGroupConfig, SourceGroupConfigBuilder};
pub use error::{Error, Result};
pub use jitter::{PacketBuffer, ReorderingBuffer, WaitedBuffer};
pub use relay::{
    ChannelListener, GroupState, IncomingSourceGroup, PacketAdmission, RemoteRateEstimator,
    RtpListener, RtxRecovery, SourceGroupEvent, SourceGroupHandle, SourceGroupStats,
};

/// Commonly used types
pub mod prelude {
    pub use crate::{
        ChannelListener, IncomingSourceGroup, MediaClock, PacketAdmission, RtpListener,
        SourceGroupConfig, SourceGroupConfigBuilder, SourceGroupEvent, SourceGroupHandle,
    };
    pub use sfu_rtp_core::{NackField, RtcpReportBlock, RtpPacket, SenderReportInfo};
}
