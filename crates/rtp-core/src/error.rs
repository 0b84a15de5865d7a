//! Error types for rtp-core
//!
//! Almost nothing in the packet pipeline fails: rejected or duplicate packets are
//! ordinary return values. The variants here cover malformed input.

use thiserror::Error;

/// Result type alias for rtp-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rtp-core operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Not enough bytes to read a field
    #[error("Buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes required
        required: usize,
        /// Bytes available
        available: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BufferTooSmall { required: 2, available: 1 };
        assert_eq!(err.to_string(), "Buffer too small: need 2 bytes, have 1");
    }
}
