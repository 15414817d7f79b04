//! Media type descriptors, camera formats and stream index bindings
//!
//! A [`MediaTypeDescriptor`] describes one concrete stream encoding. Descriptors
//! are values: renegotiation produces a new descriptor that replaces the old one
//! wholesale, nothing mutates a descriptor in place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Media modality of a stream or device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Stream encoding identifier (pixel encoding, video codec or audio codec)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subtype {
    // Uncompressed video
    Nv12,
    Yuy2,
    I420,
    Rgb32,
    Argb32,
    // Compressed video
    Mjpg,
    H264,
    Hevc,
    Wmv3,
    // Audio
    Pcm,
    Float,
    Aac,
    Mp3,
    Wma,
}

impl Subtype {
    pub fn kind(&self) -> MediaKind {
        match self {
            Subtype::Pcm | Subtype::Float | Subtype::Aac | Subtype::Mp3 | Subtype::Wma => {
                MediaKind::Audio
            }
            _ => MediaKind::Video,
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(
            self,
            Subtype::Nv12
                | Subtype::Yuy2
                | Subtype::I420
                | Subtype::Rgb32
                | Subtype::Argb32
                | Subtype::Pcm
                | Subtype::Float
        )
    }

    /// Pixel format a decoded frame of this subtype is presented in
    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            Subtype::Nv12 => PixelFormat::Nv12,
            Subtype::Yuy2 => PixelFormat::Yuyv,
            Subtype::I420 => PixelFormat::Yuv420p,
            Subtype::Rgb32 => PixelFormat::Bgrx8888,
            Subtype::Argb32 => PixelFormat::Bgra8888,
            Subtype::Mjpg => PixelFormat::Jpeg,
            _ => PixelFormat::Invalid,
        }
    }
}

/// Pixel layout of frames forwarded to a render sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Invalid,
    Bgra8888,
    Bgrx8888,
    Nv12,
    Yuyv,
    Yuv420p,
    Jpeg,
}

impl PixelFormat {
    /// Native subtype that carries this pixel format
    pub fn subtype(&self) -> Option<Subtype> {
        match self {
            PixelFormat::Invalid => None,
            PixelFormat::Bgra8888 => Some(Subtype::Argb32),
            PixelFormat::Bgrx8888 => Some(Subtype::Rgb32),
            PixelFormat::Nv12 => Some(Subtype::Nv12),
            PixelFormat::Yuyv => Some(Subtype::Yuy2),
            PixelFormat::Yuv420p => Some(Subtype::I420),
            PixelFormat::Jpeg => Some(Subtype::Mjpg),
        }
    }

    /// Bytes per row of the first plane
    pub fn stride(&self, width: u32) -> u32 {
        match self {
            PixelFormat::Bgra8888 | PixelFormat::Bgrx8888 => width * 4,
            PixelFormat::Yuyv => width * 2,
            PixelFormat::Nv12 | PixelFormat::Yuv420p => width,
            PixelFormat::Jpeg | PixelFormat::Invalid => 0,
        }
    }

    /// Size of one raw frame, `None` for compressed or invalid formats
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        match self {
            PixelFormat::Bgra8888 | PixelFormat::Bgrx8888 => Some(w * h * 4),
            PixelFormat::Yuyv => Some(w * h * 2),
            PixelFormat::Nv12 | PixelFormat::Yuv420p => Some(w * h * 3 / 2),
            PixelFormat::Jpeg | PixelFormat::Invalid => None,
        }
    }
}

/// Output container of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerFormat {
    Mpeg4,
    Asf,
    Mp3,
    Wave,
    Adts,
}

impl ContainerFormat {
    /// Encodings the container can carry, in order of preference
    pub fn codecs(&self) -> &'static [Subtype] {
        match self {
            ContainerFormat::Mpeg4 => &[Subtype::H264, Subtype::Hevc, Subtype::Aac, Subtype::Mp3],
            ContainerFormat::Asf => &[Subtype::Wmv3, Subtype::Wma],
            ContainerFormat::Mp3 => &[Subtype::Mp3],
            ContainerFormat::Wave => &[Subtype::Pcm, Subtype::Float],
            ContainerFormat::Adts => &[Subtype::Aac],
        }
    }

    /// Whether the container can carry a stream of the given subtype
    pub fn supports(&self, subtype: Subtype) -> bool {
        self.codecs().contains(&subtype)
    }

    /// Whether the container has any format of the given modality
    pub fn carries(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => true,
            MediaKind::Video => matches!(self, ContainerFormat::Mpeg4 | ContainerFormat::Asf),
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mpeg4 => "mp4",
            ContainerFormat::Asf => "wmv",
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::Wave => "wav",
            ContainerFormat::Adts => "aac",
        }
    }
}

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
}

impl VideoResolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const VGA: Self = Self::new(640, 480);
    pub const HD: Self = Self::new(1280, 720);
    pub const FULL_HD: Self = Self::new(1920, 1080);

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }
}

impl fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Concrete encoding of one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTypeDescriptor {
    kind: MediaKind,
    subtype: Subtype,
    width: u32,
    height: u32,
    frame_rate: f64,
    bitrate: u32,
    sample_rate: u32,
    channels: u16,
}

impl MediaTypeDescriptor {
    /// Video stream type
    pub fn video(subtype: Subtype, resolution: VideoResolution, frame_rate: f64) -> Self {
        Self {
            kind: MediaKind::Video,
            subtype,
            width: resolution.width,
            height: resolution.height,
            frame_rate,
            bitrate: 0,
            sample_rate: 0,
            channels: 0,
        }
    }

    /// Audio stream type
    pub fn audio(subtype: Subtype, sample_rate: u32, channels: u16) -> Self {
        Self {
            kind: MediaKind::Audio,
            subtype,
            width: 0,
            height: 0,
            frame_rate: 0.0,
            bitrate: 0,
            sample_rate,
            channels,
        }
    }

    pub fn with_subtype(self, subtype: Subtype) -> Self {
        Self { subtype, ..self }
    }

    pub fn with_resolution(self, resolution: VideoResolution) -> Self {
        Self {
            width: resolution.width,
            height: resolution.height,
            ..self
        }
    }

    pub fn with_frame_rate(self, frame_rate: f64) -> Self {
        Self { frame_rate, ..self }
    }

    pub fn with_bitrate(self, bitrate: u32) -> Self {
        Self { bitrate, ..self }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn subtype(&self) -> Subtype {
        self.subtype
    }

    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Average bitrate in bits per second, 0 when unspecified
    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.subtype.pixel_format()
    }

    pub fn stride(&self) -> u32 {
        self.pixel_format().stride(self.width)
    }

    /// Duration of one video frame
    pub fn frame_interval(&self) -> Duration {
        if self.frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.frame_rate)
        } else {
            Duration::ZERO
        }
    }

    /// Bytes per sample frame (all channels) for uncompressed audio
    pub fn block_align(&self) -> usize {
        let bytes_per_sample = match self.subtype {
            Subtype::Float => 4,
            Subtype::Pcm => 2,
            _ => 0,
        };
        bytes_per_sample * self.channels as usize
    }
}

impl fmt::Display for MediaTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MediaKind::Video => write!(
                f,
                "{:?} {}x{} @ {:.2}fps",
                self.subtype, self.width, self.height, self.frame_rate
            ),
            MediaKind::Audio => write!(
                f,
                "{:?} {}Hz x{}",
                self.subtype, self.sample_rate, self.channels
            ),
        }
    }
}

/// A format advertised by a capture device
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraFormat {
    pub resolution: VideoResolution,
    pub pixel_format: PixelFormat,
    pub min_frame_rate: f64,
    pub max_frame_rate: f64,
}

impl CameraFormat {
    pub fn new(resolution: VideoResolution, pixel_format: PixelFormat, frame_rate: f64) -> Self {
        Self {
            resolution,
            pixel_format,
            min_frame_rate: frame_rate,
            max_frame_rate: frame_rate,
        }
    }

    /// A null format requests nothing in particular
    pub fn is_null(&self) -> bool {
        self.pixel_format == PixelFormat::Invalid && self.resolution.is_empty()
    }

    pub fn from_descriptor(media_type: &MediaTypeDescriptor) -> Self {
        Self::new(
            media_type.resolution(),
            media_type.pixel_format(),
            media_type.frame_rate(),
        )
    }
}

/// Logical role of a native stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    SourceVideo,
    SourceAudio,
    SinkVideo,
    SinkAudio,
}

/// Mapping from logical stream roles to native stream indices
///
/// `None` means the role is absent, which is distinct from a stream at index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamIndexBinding {
    pub source_video: Option<u32>,
    pub source_audio: Option<u32>,
    pub sink_video: Option<u32>,
    pub sink_audio: Option<u32>,
}

impl StreamIndexBinding {
    pub fn get(&self, role: StreamRole) -> Option<u32> {
        match role {
            StreamRole::SourceVideo => self.source_video,
            StreamRole::SourceAudio => self.source_audio,
            StreamRole::SinkVideo => self.sink_video,
            StreamRole::SinkAudio => self.sink_audio,
        }
    }

    /// Modality of a source stream index, if bound
    pub fn source_kind(&self, stream_index: u32) -> Option<MediaKind> {
        if self.source_video == Some(stream_index) {
            Some(MediaKind::Video)
        } else if self.source_audio == Some(stream_index) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    /// Sink stream that receives samples of the given modality
    pub fn sink_index(&self, kind: MediaKind) -> Option<u32> {
        match kind {
            MediaKind::Video => self.sink_video,
            MediaKind::Audio => self.sink_audio,
        }
    }

    pub fn clear_sink(&mut self) {
        self.sink_video = None;
        self.sink_audio = None;
    }

    /// Each modality's source index is bound iff its source exists
    pub fn is_consistent(&self, has_video: bool, has_audio: bool) -> bool {
        self.source_video.is_some() == has_video && self.source_audio.is_some() == has_audio
    }
}
