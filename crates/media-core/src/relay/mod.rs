//! Incoming stream relay
//!
//! The SFU side of an incoming stream: a source group per media SSRC, the
//! listeners it fans out to and the task that owns it.

pub mod estimator;
pub mod listener;
pub mod source_group;
pub mod timer;
pub mod worker;

pub use estimator::RemoteRateEstimator;
pub use listener::{ChannelListener, ListenerRegistry, RtpListener, SourceGroupEvent};
pub use source_group::{
    GroupState, IncomingSourceGroup, PacketAdmission, RtxRecovery, SourceGroupStats,
};
pub use timer::DispatchTimer;
pub use worker::SourceGroupHandle;
