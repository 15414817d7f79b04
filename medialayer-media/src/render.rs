//! Render sinks for forwarded video frames
//!
//! The session hands every decoded video frame to at most one [`VideoSink`].
//! Frames arrive one at a time, in the order the engine delivered them.

use crate::engine::MediaSample;
use crate::error::{MediaError, MediaResult};
use crate::media_type::{MediaTypeDescriptor, PixelFormat, VideoResolution};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// A video frame forwarded out of the capture callback
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub data: Bytes,
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per row of the first plane
    pub stride: u32,
    pub timestamp: Duration,
    pub frame_rate: f64,
    pub stream_index: u32,
}

impl VideoFrame {
    /// Wrap a sample delivered with `media_type`. The payload is shared, not copied.
    pub fn from_sample(sample: &MediaSample, media_type: &MediaTypeDescriptor, stream_index: u32) -> Self {
        Self {
            data: sample.data().clone(),
            pixel_format: media_type.pixel_format(),
            width: media_type.width(),
            height: media_type.height(),
            stride: media_type.stride(),
            timestamp: sample.timestamp(),
            frame_rate: media_type.frame_rate(),
            stream_index,
        }
    }

    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// Check the payload against the declared geometry
    pub fn validate(&self) -> MediaResult<()> {
        if self.pixel_format == PixelFormat::Invalid {
            return Err(MediaError::UnsupportedFormat {
                format: "invalid pixel format".to_string(),
            });
        }
        if let Some(expected) = self.pixel_format.frame_size(self.width, self.height) {
            if self.data.len() < expected {
                return Err(MediaError::InvalidFrameData {
                    expected,
                    actual: self.data.len(),
                });
            }
        }
        Ok(())
    }
}

/// Receives frames forwarded by a capture session
pub trait VideoSink: Send + Sync {
    fn push_frame(&self, frame: VideoFrame) -> MediaResult<()>;
}

/// Forwards frames into a tokio channel
pub struct ChannelVideoSink {
    tx: mpsc::Sender<VideoFrame>,
}

impl ChannelVideoSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<VideoFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl VideoSink for ChannelVideoSink {
    fn push_frame(&self, frame: VideoFrame) -> MediaResult<()> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            // A slow consumer loses frames rather than stalling capture
            Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(MediaError::StreamError {
                source: medialayer_core::NativeError::fail("render channel closed"),
            }),
        }
    }
}

/// Video render statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoRenderStats {
    pub frames_rendered: u64,
    pub bytes_rendered: u64,
    pub last_resolution: Option<VideoResolution>,
    pub last_timestamp: Option<Duration>,
    /// A push started while another was still running
    pub overlapping_pushes: u64,
    /// Frames whose timestamp went backwards on the same stream
    pub reordered_frames: u64,
}

/// Sink that only counts what it receives
#[derive(Default)]
pub struct FrameStatsSink {
    stats: Mutex<VideoRenderStats>,
    busy: AtomicBool,
    last_per_stream: Mutex<std::collections::HashMap<u32, Duration>>,
}

impl FrameStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> VideoRenderStats {
        self.stats.lock().clone()
    }
}

impl VideoSink for FrameStatsSink {
    fn push_frame(&self, frame: VideoFrame) -> MediaResult<()> {
        if self.busy.swap(true, Ordering::AcqRel) {
            warn!("overlapping frame push");
            self.stats.lock().overlapping_pushes += 1;
        }

        let reordered = {
            let mut last = self.last_per_stream.lock();
            let previous = last.insert(frame.stream_index, frame.timestamp);
            matches!(previous, Some(p) if p > frame.timestamp)
        };

        {
            let mut stats = self.stats.lock();
            stats.frames_rendered += 1;
            stats.bytes_rendered += frame.data.len() as u64;
            stats.last_resolution = Some(frame.resolution());
            stats.last_timestamp = Some(frame.timestamp);
            if reordered {
                stats.reordered_frames += 1;
            }
        }

        self.busy.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_type::Subtype;

    fn frame(ts_ms: u64) -> VideoFrame {
        let media_type = MediaTypeDescriptor::video(Subtype::Yuy2, VideoResolution::new(4, 2), 30.0);
        let sample = MediaSample::new(vec![0u8; 16], Duration::from_millis(ts_ms), Duration::ZERO);
        VideoFrame::from_sample(&sample, &media_type, 0)
    }

    #[test]
    fn test_frame_from_sample() {
        let f = frame(10);
        assert_eq!(f.pixel_format, PixelFormat::Yuyv);
        assert_eq!(f.stride, 8);
        assert!(f.validate().is_ok());

        let short = VideoFrame {
            data: Bytes::from_static(&[0; 4]),
            ..f
        };
        assert!(matches!(
            short.validate(),
            Err(MediaError::InvalidFrameData { expected: 16, actual: 4 })
        ));
    }

    #[test]
    fn test_stats_sink_detects_reordering() {
        let sink = FrameStatsSink::new();
        sink.push_frame(frame(10)).unwrap();
        sink.push_frame(frame(20)).unwrap();
        sink.push_frame(frame(15)).unwrap();

        let stats = sink.stats();
        assert_eq!(stats.frames_rendered, 3);
        assert_eq!(stats.reordered_frames, 1);
        assert_eq!(stats.overlapping_pushes, 0);
        assert_eq!(stats.last_resolution, Some(VideoResolution::new(4, 2)));
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelVideoSink::new(1);
        sink.push_frame(frame(1)).unwrap();
        // Full channel drops the frame
        sink.push_frame(frame(2)).unwrap();
        assert_eq!(rx.recv().await.unwrap().timestamp, Duration::from_millis(1));

        drop(rx);
        assert!(sink.push_frame(frame(3)).is_err());
    }
}
