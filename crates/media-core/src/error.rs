//! Error types for the media pipeline
//!
//! Packet handling itself never fails: rejected, duplicate and foreign packets
//! are reported through return values. Errors cover invalid configuration,
//! malformed retransmissions and requests sent to a group whose task has
//! already stopped.

use thiserror::Error;

/// Result type alias for media-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for media-core operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid source group configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The owning task of the source group is gone
    #[error("Source group stopped")]
    GroupStopped,

    /// Error from rtp-core
    #[error("RTP error: {0}")]
    Rtp(#[from] sfu_rtp_core::Error),
}

impl Error {
    /// Create a new invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig(details.into())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::GroupStopped
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::GroupStopped
    }
}
