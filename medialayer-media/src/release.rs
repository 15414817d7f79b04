//! Ordered teardown of native handles
//!
//! Release order: stop reads, finalize and release the writer, release the
//! reader, shut down the aggregate source, then the individual sources, then
//! drop the media type descriptors. Every step tolerates a missing handle, so
//! the releaser can run from any error path and any number of times.

use crate::engine::{MediaSource, SinkWriter, SourceReader};
use crate::media_type::MediaTypeDescriptor;
use std::sync::Arc;
use tracing::{debug, warn};

/// Native handles owned by an active session
#[derive(Default)]
pub struct NativeResources {
    pub video_source: Option<Arc<dyn MediaSource>>,
    pub audio_source: Option<Arc<dyn MediaSource>>,
    pub aggregate_source: Option<Arc<dyn MediaSource>>,
    pub reader: Option<Box<dyn SourceReader>>,
    pub writer: Option<Box<dyn SinkWriter>>,
    /// Finalize was already requested on `writer`
    pub writer_finalized: bool,
    pub video_type: Option<MediaTypeDescriptor>,
    pub audio_type: Option<MediaTypeDescriptor>,
    pub sink_video_type: Option<MediaTypeDescriptor>,
    pub sink_audio_type: Option<MediaTypeDescriptor>,
}

impl NativeResources {
    pub fn is_empty(&self) -> bool {
        self.video_source.is_none()
            && self.audio_source.is_none()
            && self.aggregate_source.is_none()
            && self.reader.is_none()
            && self.writer.is_none()
            && self.video_type.is_none()
            && self.audio_type.is_none()
            && self.sink_video_type.is_none()
            && self.sink_audio_type.is_none()
    }
}

impl std::fmt::Debug for NativeResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeResources")
            .field("video_source", &self.video_source.as_ref().map(|s| s.id().to_string()))
            .field("audio_source", &self.audio_source.as_ref().map(|s| s.id().to_string()))
            .field(
                "aggregate_source",
                &self.aggregate_source.as_ref().map(|s| s.id().to_string()),
            )
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .field("writer_finalized", &self.writer_finalized)
            .finish()
    }
}

/// One teardown step that found something to release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStep {
    StopReads,
    FinalizeWriter,
    ReleaseWriter,
    ReleaseReader,
    ReleaseAggregateSource,
    ReleaseVideoSource,
    ReleaseAudioSource,
    ReleaseMediaTypes,
}

/// Steps performed by one release pass, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub steps: Vec<ReleaseStep>,
}

impl ReleaseReport {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceReleaser;

impl ResourceReleaser {
    /// Release everything held by `resources`, leaving it empty
    pub fn release(resources: &mut NativeResources) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        if let Some(reader) = resources.reader.as_ref() {
            reader.stop();
            report.steps.push(ReleaseStep::StopReads);
        }

        if let Some(writer) = resources.writer.take() {
            if !resources.writer_finalized {
                // Nobody waits for this completion; the writer flushes on its own
                if let Err(e) = writer.finalize() {
                    warn!(error = %e, "finalize during release failed");
                }
                report.steps.push(ReleaseStep::FinalizeWriter);
            }
            drop(writer);
            report.steps.push(ReleaseStep::ReleaseWriter);
        }
        resources.writer_finalized = false;

        if resources.reader.take().is_some() {
            report.steps.push(ReleaseStep::ReleaseReader);
        }

        if let Some(aggregate) = resources.aggregate_source.take() {
            aggregate.shutdown();
            report.steps.push(ReleaseStep::ReleaseAggregateSource);
        }

        if let Some(video) = resources.video_source.take() {
            video.shutdown();
            report.steps.push(ReleaseStep::ReleaseVideoSource);
        }

        if let Some(audio) = resources.audio_source.take() {
            audio.shutdown();
            report.steps.push(ReleaseStep::ReleaseAudioSource);
        }

        let had_types = resources.video_type.take().is_some()
            | resources.audio_type.take().is_some()
            | resources.sink_video_type.take().is_some()
            | resources.sink_audio_type.take().is_some();
        if had_types {
            report.steps.push(ReleaseStep::ReleaseMediaTypes);
        }

        if !report.is_noop() {
            debug!(steps = ?report.steps, "native resources released");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MediaEngine, SourceReaderCallback};
    use crate::engine::virtual_engine::{VirtualEngine, VirtualEngineConfig};
    use crate::engine::{FrameEvent, MediaEvent, NativeResult, ReaderCallback};

    struct Ignore;

    impl SourceReaderCallback for Ignore {
        fn on_read_sample(&self, _status: NativeResult<()>, _event: FrameEvent) {}
        fn on_flush(&self, _stream_index: u32) {}
        fn on_event(&self, _stream_index: u32, _event: MediaEvent) {}
    }

    #[test]
    fn test_release_order_and_idempotence() {
        let engine = VirtualEngine::with_default_devices(VirtualEngineConfig::default());
        let video = engine.open_source(&VirtualEngine::default_camera()).unwrap();
        let audio = engine.open_source(&VirtualEngine::default_microphone()).unwrap();
        let aggregate = engine
            .create_aggregate_source(&[video.clone(), audio.clone()])
            .unwrap();
        let target: Arc<dyn SourceReaderCallback> = Arc::new(Ignore);
        let reader = engine
            .create_source_reader(&aggregate, ReaderCallback::new("reader", &target))
            .unwrap();

        let mut resources = NativeResources {
            video_source: Some(video),
            audio_source: Some(audio),
            aggregate_source: Some(aggregate),
            reader: Some(reader),
            video_type: Some(VirtualEngine::default_camera().formats[0].clone()),
            ..Default::default()
        };

        let report = ResourceReleaser::release(&mut resources);
        assert_eq!(
            report.steps,
            vec![
                ReleaseStep::StopReads,
                ReleaseStep::ReleaseReader,
                ReleaseStep::ReleaseAggregateSource,
                ReleaseStep::ReleaseVideoSource,
                ReleaseStep::ReleaseAudioSource,
                ReleaseStep::ReleaseMediaTypes,
            ]
        );
        assert!(resources.is_empty());
        assert!(engine.live_handles().is_empty());

        assert!(ResourceReleaser::release(&mut resources).is_noop());
    }

    #[test]
    fn test_release_empty_is_noop() {
        let mut resources = NativeResources::default();
        assert!(ResourceReleaser::release(&mut resources).is_noop());
    }
}
