//! Session and recording configuration

use crate::error::{MediaError, MediaResult};
use crate::media_type::{ContainerFormat, Subtype, VideoResolution};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Session controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Period of the duration timer
    pub duration_interval: Duration,
    /// Upper bound on waiting for the writer to finalize, `None` waits forever
    pub finalize_timeout: Option<Duration>,
    /// Capacity of the session event channel
    pub event_capacity: usize,
    /// Publish `NewVideoFrame` events alongside the render sink
    pub emit_frame_events: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_interval: Duration::from_millis(100),
            finalize_timeout: Some(Duration::from_secs(10)),
            event_capacity: 100,
            emit_frame_events: true,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> MediaResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.duration_interval.is_zero() {
            return Err(MediaError::InvalidConfiguration {
                message: "Duration interval must be > 0".to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "Event capacity must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Parameters of one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub destination: PathBuf,
    pub container: ContainerFormat,
    pub video_format: Subtype,
    /// Bits per second, 0 lets the encoder choose
    pub video_bitrate: u32,
    /// Empty keeps the source geometry
    pub resolution: VideoResolution,
    /// 0 keeps the source rate
    pub frame_rate: f64,
    pub audio_format: Subtype,
    pub audio_bitrate: u32,
}

impl RecordingSettings {
    /// MPEG-4 with H.264 and AAC at source geometry
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            container: ContainerFormat::Mpeg4,
            video_format: Subtype::H264,
            video_bitrate: 0,
            resolution: VideoResolution::default(),
            frame_rate: 0.0,
            audio_format: Subtype::Aac,
            audio_bitrate: 128_000,
        }
    }

    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    pub fn with_video_format(mut self, format: Subtype) -> Self {
        self.video_format = format;
        self
    }

    pub fn with_video_bitrate(mut self, bitrate: u32) -> Self {
        self.video_bitrate = bitrate;
        self
    }

    pub fn with_resolution(mut self, resolution: VideoResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_audio_format(mut self, format: Subtype) -> Self {
        self.audio_format = format;
        self
    }

    pub fn with_audio_bitrate(mut self, bitrate: u32) -> Self {
        self.audio_bitrate = bitrate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        tokio_test::assert_ok!(config.validate());
        assert_eq!(config.finalize_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_session_config_from_json() {
        let config = SessionConfig::from_json(r#"{"event_capacity": 16, "finalize_timeout": null}"#)
            .unwrap();
        assert_eq!(config.event_capacity, 16);
        assert_eq!(config.finalize_timeout, None);
        assert_eq!(config.duration_interval, Duration::from_millis(100));

        let err = SessionConfig::from_json(r#"{"event_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, MediaError::InvalidConfiguration { .. }));
        assert!(matches!(
            SessionConfig::from_json("{").unwrap_err(),
            MediaError::ConfigParse { .. }
        ));
    }
}
