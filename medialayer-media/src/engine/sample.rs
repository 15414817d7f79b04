//! Samples, stream flags and events exchanged with a native engine

use bytes::Bytes;
use std::time::Duration;

/// A buffer of media data produced by a source reader
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSample {
    data: Bytes,
    timestamp: Duration,
    duration: Duration,
}

impl MediaSample {
    pub fn new(data: impl Into<Bytes>, timestamp: Duration, duration: Duration) -> Self {
        Self {
            data: data.into(),
            timestamp,
            duration,
        }
    }

    /// Same payload presented at a different time
    pub fn with_timestamp(&self, timestamp: Duration) -> Self {
        Self {
            data: self.data.clone(),
            timestamp,
            duration: self.duration,
        }
    }

    /// Same timing with a replaced payload
    pub fn with_data(&self, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            timestamp: self.timestamp,
            duration: self.duration,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Per-callback stream status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamFlags {
    pub error: bool,
    pub end_of_stream: bool,
    pub new_stream: bool,
    pub current_media_type_changed: bool,
    pub stream_tick: bool,
    pub discontinuity: bool,
}

/// A sample delivery from the source reader
#[derive(Debug, Clone)]
pub struct FrameEvent {
    pub stream_index: u32,
    pub flags: StreamFlags,
    pub timestamp: Duration,
    pub sample: Option<MediaSample>,
}

/// Out-of-band events raised by a media source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    SourceStarted,
    SourceStopped,
    EndOfPresentation,
    DeviceLost,
    Other { name: String },
}

impl MediaEvent {
    /// Events after which the source will deliver nothing more
    pub fn is_terminal(&self) -> bool {
        matches!(self, MediaEvent::EndOfPresentation | MediaEvent::DeviceLost)
    }
}
