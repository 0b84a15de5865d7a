//! Reception statistics
//!
//! - [`accumulator`]: sliding time window sums (bitrates, frame rates, waits)
//! - [`loss`]: sliding window loss detection and NACK generation
//! - [`source`]: per-SSRC counters and receiver report blocks

pub mod accumulator;
pub mod loss;
pub mod source;

pub use accumulator::Accumulator;
pub use loss::{LossTracker, DEFAULT_LOSS_WINDOW};
pub use source::{
    LayerSource, ReceivedSenderReport, SourceStats, MIN_PLI_INTERVAL_MS, STATS_WINDOW_MS,
};
