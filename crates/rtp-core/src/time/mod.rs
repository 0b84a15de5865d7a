//! Time and clock utilities for RTP
//!
//! The pipeline keeps wall-clock time as milliseconds in a `u64` and converts
//! RTP clock distances with the helpers below.

/// Convert a (signed) distance in RTP clock ticks to milliseconds
///
/// Returns 0 for an unknown (zero) clock rate.
pub fn rtp_ticks_to_millis(ticks: i64, clock_rate: u32) -> i64 {
    if clock_rate == 0 {
        return 0;
    }
    ticks.saturating_mul(1000) / clock_rate as i64
}

/// Signed distance from `from` to `to`, handling wraparound
///
/// The result is in `[-2^31, 2^31)`; timestamps further apart than half the
/// range are assumed to have wrapped.
pub fn rtp_timestamp_delta(from: u32, to: u32) -> i64 {
    to.wrapping_sub(from) as i32 as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_to_millis() {
        assert_eq!(rtp_ticks_to_millis(90_000, 90_000), 1000);
        assert_eq!(rtp_ticks_to_millis(-4_500, 90_000), -50);
        assert_eq!(rtp_ticks_to_millis(480, 48_000), 10);
        assert_eq!(rtp_ticks_to_millis(480, 0), 0);
    }

    #[test]
    fn test_timestamp_delta() {
        assert_eq!(rtp_timestamp_delta(1000, 2000), 1000);
        assert_eq!(rtp_timestamp_delta(2000, 1000), -1000);
        // Wraparound cases
        assert_eq!(rtp_timestamp_delta(0xFFFF_FFFF, 10), 11);
        assert_eq!(rtp_timestamp_delta(10, 0xFFFF_FFFF), -11);
    }
}
