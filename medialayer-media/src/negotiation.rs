//! Media type negotiation
//!
//! Picks concrete stream encodings for the source (decoding) side from what a
//! device advertises, and builds the encoding types handed to the sink writer.
//! Candidates are always walked in the order the engine reports them.

use crate::engine::SourceReader;
use crate::error::{MediaError, MediaResult, NativeResultExt};
use crate::media_type::{
    CameraFormat, ContainerFormat, MediaKind, MediaTypeDescriptor, Subtype, VideoResolution,
};
use crate::session::RecordingSettings;
use tracing::{debug, warn};

/// Requested capability profile for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingProfile {
    pub format: Subtype,
    /// Bits per second, 0 keeps the candidate's value
    pub bitrate: u32,
    /// Empty keeps the candidate's geometry
    pub resolution: VideoResolution,
    /// 0 keeps the candidate's rate
    pub frame_rate: f64,
}

impl EncodingProfile {
    pub fn new(format: Subtype) -> Self {
        Self {
            format,
            bitrate: 0,
            resolution: VideoResolution::default(),
            frame_rate: 0.0,
        }
    }
}

/// Stateless media type selection
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaTypeNegotiator;

impl MediaTypeNegotiator {
    /// Index of the advertised format matching `requested` in geometry and
    /// pixel encoding. Frame rate is not compared. Falls back to 0 when
    /// nothing matches, including for an empty list.
    pub fn find_media_type_index(formats: &[CameraFormat], requested: &CameraFormat) -> usize {
        formats
            .iter()
            .position(|f| {
                f.resolution == requested.resolution && f.pixel_format == requested.pixel_format
            })
            .unwrap_or(0)
    }

    /// First candidate whose subtype matches the profile, with the profile's
    /// non-zero values applied on top
    pub fn negotiate(
        profile: &EncodingProfile,
        candidates: &[MediaTypeDescriptor],
    ) -> MediaResult<MediaTypeDescriptor> {
        Self::negotiate_stream("source", profile, candidates)
    }

    fn negotiate_stream(
        stream: &str,
        profile: &EncodingProfile,
        candidates: &[MediaTypeDescriptor],
    ) -> MediaResult<MediaTypeDescriptor> {
        let base = candidates
            .iter()
            .find(|c| c.subtype() == profile.format)
            .cloned()
            .ok_or_else(|| {
                MediaError::negotiation(
                    stream,
                    format!("no candidate with subtype {:?}", profile.format),
                )
            })?;
        Ok(Self::apply_overrides(base, profile))
    }

    fn apply_overrides(mut media_type: MediaTypeDescriptor, profile: &EncodingProfile) -> MediaTypeDescriptor {
        if profile.bitrate > 0 {
            media_type = media_type.with_bitrate(profile.bitrate);
        }
        if media_type.kind() == MediaKind::Video {
            if !profile.resolution.is_empty() {
                media_type = media_type.with_resolution(profile.resolution);
            }
            if profile.frame_rate > 0.0 {
                media_type = media_type.with_frame_rate(profile.frame_rate);
            }
        }
        media_type
    }

    /// All native types of `stream`, in reported order
    pub fn native_types(reader: &dyn SourceReader, stream: u32) -> Vec<MediaTypeDescriptor> {
        (0..)
            .map_while(|index| reader.native_media_type(stream, index))
            .collect()
    }

    /// Select native type `index` on a video stream and, for compressed
    /// devices, ask the reader to decode into NV12. Returns the type the
    /// reader will actually deliver.
    pub fn prepare_video_stream(
        reader: &dyn SourceReader,
        stream: u32,
        index: usize,
    ) -> MediaResult<MediaTypeDescriptor> {
        let native = reader
            .native_media_type(stream, index as u32)
            .ok_or_else(|| {
                MediaError::negotiation("video", format!("stream {stream} has no type {index}"))
            })?;
        reader
            .set_current_media_type(stream, &native)
            .native_context("select native video type")?;

        if native.subtype().is_compressed() {
            let decoded = native.clone().with_subtype(Subtype::Nv12);
            reader
                .set_current_media_type(stream, &decoded)
                .native_context("select decoded video type")?;
            debug!(stream, from = %native, "inserted video decoder");
        }

        let current = reader
            .current_media_type(stream)
            .native_context("read current video type")?;
        debug!(stream, media_type = %current, "video stream negotiated");
        Ok(current)
    }

    /// Request float PCM at the device's native rate and channel count
    pub fn prepare_audio_stream(
        reader: &dyn SourceReader,
        stream: u32,
    ) -> MediaResult<MediaTypeDescriptor> {
        let native = reader
            .native_media_type(stream, 0)
            .ok_or_else(|| MediaError::negotiation("audio", format!("stream {stream} has no types")))?;
        let float = MediaTypeDescriptor::audio(Subtype::Float, native.sample_rate(), native.channels());

        if let Err(e) = reader.set_current_media_type(stream, &float) {
            warn!(stream, error = %e, "float PCM rejected, keeping native audio type");
            reader
                .set_current_media_type(stream, &native)
                .native_context("select native audio type")?;
        }

        let current = reader
            .current_media_type(stream)
            .native_context("read current audio type")?;
        debug!(stream, media_type = %current, "audio stream negotiated");
        Ok(current)
    }

    /// Encoding candidates the container offers for `kind`, shaped after the
    /// source stream. Bitrate starts at zero so only the settings set it.
    pub fn sink_candidates(
        container: ContainerFormat,
        kind: MediaKind,
        source: &MediaTypeDescriptor,
    ) -> Vec<MediaTypeDescriptor> {
        container
            .codecs()
            .iter()
            .filter(|codec| codec.kind() == kind)
            .map(|&codec| match kind {
                MediaKind::Video => source.clone().with_subtype(codec).with_bitrate(0),
                MediaKind::Audio => {
                    MediaTypeDescriptor::audio(codec, source.sample_rate(), source.channels())
                }
            })
            .collect()
    }

    /// Video encoding type for the sink. Geometry and rate fall back to the
    /// source's when the settings leave them at zero.
    pub fn video_sink_type(
        settings: &RecordingSettings,
        source: &MediaTypeDescriptor,
    ) -> MediaResult<MediaTypeDescriptor> {
        Self::check_sink_kind("sink video", settings.video_format, MediaKind::Video)?;

        let profile = EncodingProfile {
            format: settings.video_format,
            bitrate: settings.video_bitrate,
            resolution: settings.resolution,
            frame_rate: settings.frame_rate,
        };
        let candidates = Self::sink_candidates(settings.container, MediaKind::Video, source);
        Self::negotiate_stream("sink video", &profile, &candidates).map_err(|_| {
            Self::unsupported("sink video", settings.container, settings.video_format)
        })
    }

    /// Audio encoding type for the sink at the source's rate and channel count
    pub fn audio_sink_type(
        settings: &RecordingSettings,
        source: &MediaTypeDescriptor,
    ) -> MediaResult<MediaTypeDescriptor> {
        Self::check_sink_kind("sink audio", settings.audio_format, MediaKind::Audio)?;

        let profile = EncodingProfile {
            bitrate: settings.audio_bitrate,
            ..EncodingProfile::new(settings.audio_format)
        };
        let candidates = Self::sink_candidates(settings.container, MediaKind::Audio, source);
        Self::negotiate_stream("sink audio", &profile, &candidates).map_err(|_| {
            Self::unsupported("sink audio", settings.container, settings.audio_format)
        })
    }

    fn check_sink_kind(stream: &str, format: Subtype, kind: MediaKind) -> MediaResult<()> {
        if format.kind() != kind {
            return Err(MediaError::negotiation(
                stream,
                format!("{format:?} is not a {kind} format"),
            ));
        }
        Ok(())
    }

    fn unsupported(stream: &str, container: ContainerFormat, format: Subtype) -> MediaError {
        MediaError::negotiation(stream, format!("{container:?} cannot carry {format:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_type::PixelFormat;
    use std::path::PathBuf;

    fn candidates() -> Vec<MediaTypeDescriptor> {
        vec![
            MediaTypeDescriptor::video(Subtype::Yuy2, VideoResolution::VGA, 30.0),
            MediaTypeDescriptor::video(Subtype::Nv12, VideoResolution::HD, 30.0),
            MediaTypeDescriptor::video(Subtype::Nv12, VideoResolution::FULL_HD, 15.0),
        ]
    }

    #[test]
    fn test_find_media_type_index_matches_geometry_and_format() {
        let formats = vec![
            CameraFormat::new(VideoResolution::VGA, PixelFormat::Yuyv, 30.0),
            CameraFormat::new(VideoResolution::HD, PixelFormat::Nv12, 30.0),
        ];
        let wanted = CameraFormat::new(VideoResolution::HD, PixelFormat::Nv12, 5.0);
        assert_eq!(MediaTypeNegotiator::find_media_type_index(&formats, &wanted), 1);

        let unsupported = CameraFormat::new(VideoResolution::FULL_HD, PixelFormat::Jpeg, 30.0);
        assert_eq!(MediaTypeNegotiator::find_media_type_index(&formats, &unsupported), 0);
        assert_eq!(MediaTypeNegotiator::find_media_type_index(&[], &wanted), 0);
    }

    #[test]
    fn test_negotiate_takes_first_subtype_match() {
        let profile = EncodingProfile::new(Subtype::Nv12);
        let chosen = MediaTypeNegotiator::negotiate(&profile, &candidates()).unwrap();
        assert_eq!(chosen.resolution(), VideoResolution::HD);
    }

    #[test]
    fn test_negotiate_applies_overrides() {
        let profile = EncodingProfile {
            format: Subtype::Yuy2,
            bitrate: 2_000_000,
            resolution: VideoResolution::new(320, 240),
            frame_rate: 15.0,
        };
        let chosen = MediaTypeNegotiator::negotiate(&profile, &candidates()).unwrap();
        assert_eq!(chosen.resolution(), VideoResolution::new(320, 240));
        assert_eq!(chosen.bitrate(), 2_000_000);
        assert_eq!(chosen.frame_rate(), 15.0);
    }

    #[test]
    fn test_negotiate_without_match_fails() {
        let profile = EncodingProfile::new(Subtype::Mjpg);
        let err = MediaTypeNegotiator::negotiate(&profile, &candidates()).unwrap_err();
        assert!(matches!(err, MediaError::NegotiationFailed { .. }));
    }

    #[test]
    fn test_sink_types_follow_container() {
        let source = MediaTypeDescriptor::video(Subtype::Nv12, VideoResolution::HD, 30.0);
        let settings = RecordingSettings::new(PathBuf::from("out.mp4")).with_video_bitrate(4_000_000);
        let sink = MediaTypeNegotiator::video_sink_type(&settings, &source).unwrap();
        assert_eq!(sink.subtype(), Subtype::H264);
        assert_eq!(sink.resolution(), VideoResolution::HD);
        assert_eq!(sink.bitrate(), 4_000_000);

        let wav = RecordingSettings::new(PathBuf::from("out.wav"))
            .with_container(ContainerFormat::Wave);
        assert!(MediaTypeNegotiator::video_sink_type(&wav, &source).is_err());

        let mic = MediaTypeDescriptor::audio(Subtype::Float, 48_000, 2);
        let wav = wav.with_audio_format(Subtype::Pcm);
        let audio = MediaTypeNegotiator::audio_sink_type(&wav, &mic).unwrap();
        assert_eq!(audio.subtype(), Subtype::Pcm);
        assert_eq!(audio.sample_rate(), 48_000);
    }

    #[test]
    fn test_sink_candidates_follow_codec_table() {
        let source = MediaTypeDescriptor::video(Subtype::Nv12, VideoResolution::VGA, 30.0);
        let video: Vec<_> = MediaTypeNegotiator::sink_candidates(ContainerFormat::Mpeg4, MediaKind::Video, &source)
            .iter()
            .map(|c| c.subtype())
            .collect();
        assert_eq!(video, vec![Subtype::H264, Subtype::Hevc]);

        let mic = MediaTypeDescriptor::audio(Subtype::Float, 44_100, 1);
        let audio = MediaTypeNegotiator::sink_candidates(ContainerFormat::Asf, MediaKind::Audio, &mic);
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].subtype(), Subtype::Wma);
        assert_eq!(audio[0].sample_rate(), 44_100);
        assert!(MediaTypeNegotiator::sink_candidates(ContainerFormat::Wave, MediaKind::Video, &source).is_empty());
    }

    #[test]
    fn test_sink_type_rejects_codec_outside_container() {
        let source = MediaTypeDescriptor::video(Subtype::Nv12, VideoResolution::HD, 30.0);
        let settings = RecordingSettings::new(PathBuf::from("out.wmv"))
            .with_container(ContainerFormat::Asf)
            .with_video_format(Subtype::H264);
        let err = MediaTypeNegotiator::video_sink_type(&settings, &source).unwrap_err();
        assert!(matches!(err, MediaError::NegotiationFailed { .. }));
    }
}
