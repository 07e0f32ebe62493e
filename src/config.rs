//! Stream parameters supplied by format detection.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::head::MAX_CHANNELS;
use crate::stream::StreamError;
use crate::variant::Variant;

/// Everything needed to present one packet stream as Ogg Opus.
///
/// Immutable once a [`VirtualStream`](crate::stream::VirtualStream) owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub variant:       Variant,
    /// Physical offset of the first packet.
    pub stream_offset: u64,
    /// Physical bytes covered by packets, starting at `stream_offset`.
    pub stream_size:   u64,
    pub channels:      u8,
    /// Input rate advertised in the identification header.
    pub sample_rate:   u32,
    /// Decoder pre-skip in 48 kHz samples.
    #[serde(default)]
    pub skip:          u16,
}

impl StreamConfig {
    pub fn new(variant: Variant, stream_offset: u64, stream_size: u64) -> Self {
        Self {
            variant,
            stream_offset,
            stream_size,
            channels:    2,
            sample_rate: 48_000,
            skip:        0,
        }
    }

    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_skip(mut self, skip: u16) -> Self {
        self.skip = skip;
        self
    }

    /// Physical offset one past the last packet byte.
    pub fn stream_end(&self) -> u64 {
        self.stream_offset.saturating_add(self.stream_size)
    }

    /// Reject parameters the identification header cannot express.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(StreamError::UnsupportedChannels(self.channels));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, StreamError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, StreamError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a JSON descriptor from disk.
    pub fn load(path: &Path) -> Result<Self, StreamError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let c = StreamConfig::new(Variant::Ea, 0x40, 0x1000).with_channels(1).with_skip(312);
        assert_eq!(c.channels, 1);
        assert_eq!(c.sample_rate, 48_000);
        assert_eq!(c.skip, 312);
        assert_eq!(c.stream_end(), 0x1040);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn channel_limits() {
        let c = StreamConfig::new(Variant::Ue4, 0, 0);
        assert!(matches!(c.clone().with_channels(0).validate(), Err(StreamError::UnsupportedChannels(0))));
        assert!(matches!(c.with_channels(6).validate(), Err(StreamError::UnsupportedChannels(6))));
    }

    #[test]
    fn json_descriptor() {
        let json = r#"{
            "variant": "switch",
            "stream_offset": 48,
            "stream_size": 1024,
            "channels": 2,
            "sample_rate": 48000
        }"#;
        let c = StreamConfig::from_json(json).unwrap();
        assert_eq!(c.variant, Variant::Switch);
        assert_eq!(c.skip, 0);
        assert_eq!(StreamConfig::from_json(&c.to_json().unwrap()).unwrap(), c);
    }

    #[test]
    fn json_rejects_unknown_variant() {
        let json = r#"{"variant":"ogg","stream_offset":0,"stream_size":0,"channels":2,"sample_rate":48000}"#;
        assert!(matches!(StreamConfig::from_json(json), Err(StreamError::Json(_))));
    }
}
