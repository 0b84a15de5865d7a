//! Source group configuration
//!
//! The defaults describe a video stream with RTX negotiated and a small initial
//! jitter buffer that grows with the measured RTT.

use serde::{Deserialize, Serialize};

use sfu_rtp_core::stats::DEFAULT_LOSS_WINDOW;

use crate::error::{Error, Result};

/// Initial maximum wait time before any RTT is known
pub const DEFAULT_MAX_WAIT_TIME_MS: u64 = 100;

/// Largest accepted wait time override
pub const MAX_WAIT_TIME_LIMIT_MS: u64 = 10_000;

/// Kind of media carried by a source group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Audio stream
    Audio,
    /// Video stream, layers and dependency descriptors are resolved
    #[default]
    Video,
}

/// Configuration of one incoming source group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceGroupConfig {
    /// Media kind
    pub media_type: MediaType,
    /// Jitter buffer wait time until the first RTT measurement
    pub initial_max_wait_time_ms: u64,
    /// Sequence numbers tracked for loss detection
    pub loss_window_size: usize,
    /// Whether retransmissions are negotiated for this stream
    pub rtx_enabled: bool,
    /// Fixed jitter buffer wait time, ignoring RTT
    pub max_wait_time_override_ms: Option<u64>,
    /// Upper bound on how much media the jitter buffer may hold
    pub max_accumulated_wait_time_ms: Option<u64>,
    /// Register the stream with the remote rate estimator on start
    pub remb_enabled: bool,
}

impl Default for SourceGroupConfig {
    fn default() -> Self {
        Self {
            media_type: MediaType::Video,
            initial_max_wait_time_ms: DEFAULT_MAX_WAIT_TIME_MS,
            loss_window_size: DEFAULT_LOSS_WINDOW,
            rtx_enabled: true,
            max_wait_time_override_ms: None,
            max_accumulated_wait_time_ms: None,
            remb_enabled: false,
        }
    }
}

impl SourceGroupConfig {
    /// Default configuration for an audio stream
    pub fn audio() -> Self {
        Self {
            media_type: MediaType::Audio,
            ..Self::default()
        }
    }

    /// Default configuration for a video stream
    pub fn video() -> Self {
        Self::default()
    }

    /// Check the configuration for values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.loss_window_size == 0 {
            return Err(Error::invalid_config("loss window size must be greater than zero"));
        }

        if let Some(wait) = self.max_wait_time_override_ms {
            if wait > MAX_WAIT_TIME_LIMIT_MS {
                return Err(Error::invalid_config(format!(
                    "max wait time override {}ms above limit of {}ms",
                    wait, MAX_WAIT_TIME_LIMIT_MS
                )));
            }
        }

        Ok(())
    }
}

/// Builder for SourceGroupConfig
#[derive(Debug, Clone, Default)]
pub struct SourceGroupConfigBuilder {
    config: SourceGroupConfig,
}

impl SourceGroupConfigBuilder {
    /// Create a new builder with video defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder with audio defaults
    pub fn audio() -> Self {
        Self {
            config: SourceGroupConfig::audio(),
        }
    }

    /// Set the media type
    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.config.media_type = media_type;
        self
    }

    /// Set the initial maximum wait time
    pub fn initial_max_wait_time_ms(mut self, wait: u64) -> Self {
        self.config.initial_max_wait_time_ms = wait;
        self
    }

    /// Set the loss window size
    pub fn loss_window_size(mut self, size: usize) -> Self {
        self.config.loss_window_size = size;
        self
    }

    /// Enable or disable RTX
    pub fn rtx_enabled(mut self, enabled: bool) -> Self {
        self.config.rtx_enabled = enabled;
        self
    }

    /// Pin the jitter buffer wait time
    pub fn max_wait_time_override_ms(mut self, wait: Option<u64>) -> Self {
        self.config.max_wait_time_override_ms = wait;
        self
    }

    /// Bound the media held by the jitter buffer
    pub fn max_accumulated_wait_time_ms(mut self, wait: Option<u64>) -> Self {
        self.config.max_accumulated_wait_time_ms = wait;
        self
    }

    /// Enable or disable remote rate estimation
    pub fn remb_enabled(mut self, enabled: bool) -> Self {
        self.config.remb_enabled = enabled;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<SourceGroupConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SourceGroupConfig::default();
        assert_eq!(config.media_type, MediaType::Video);
        assert_eq!(config.initial_max_wait_time_ms, 100);
        assert_eq!(config.loss_window_size, 128);
        assert!(config.rtx_enabled);
        assert!(config.validate().is_ok());
        assert_eq!(SourceGroupConfig::audio().media_type, MediaType::Audio);
    }

    #[test]
    fn test_builder_validation() {
        let config = SourceGroupConfigBuilder::audio()
            .rtx_enabled(false)
            .max_accumulated_wait_time_ms(Some(500))
            .build()
            .unwrap();
        assert!(!config.rtx_enabled);
        assert_eq!(config.max_accumulated_wait_time_ms, Some(500));

        assert!(SourceGroupConfigBuilder::new().loss_window_size(0).build().is_err());
        assert!(matches!(
            SourceGroupConfigBuilder::new()
                .max_wait_time_override_ms(Some(MAX_WAIT_TIME_LIMIT_MS + 1))
                .build(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_serde_defaults_missing_fields() {
        let json = r#"{"media_type":"audio","rtx_enabled":false}"#;
        let config: SourceGroupConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.media_type, MediaType::Audio);
        assert!(!config.rtx_enabled);
        assert_eq!(config.loss_window_size, DEFAULT_LOSS_WINDOW);
    }
}
