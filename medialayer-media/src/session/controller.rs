//! Capture session controller
//!
//! Owns the native source graph of one capture session and drives it through
//! activation, streaming, recording and teardown. Control operations run on
//! the caller's thread; sample, event and finalize completions arrive on
//! engine worker threads through callback shims.
//!
//! Locking: control operations are serialised by `control`, teardowns by
//! `teardown`, and all mutable session state lives behind `shared`.
//! Callbacks take only `shared`. Events
//! and frame forwarding happen after `shared` is released. Blocking waits
//! (finalize, reader shutdown) never happen while holding `shared`.

use super::config::{RecordingSettings, SessionConfig};
use super::delivery::DeliveryOrder;
use super::events::SessionEvent;
use super::state::{PausePhase, SessionState};
use crate::device::DeviceInfo;
use crate::duration::{DurationTracker, RecordingTimeline};
use crate::engine::{
    FrameEvent, MediaEngine, MediaEvent, MediaSample, NativeResult, ReaderCallback,
    SinkWriterCallback, SourceReaderCallback, WriterCallback,
};
use crate::error::{MediaError, MediaResult, NativeResultExt};
use crate::media_type::{
    CameraFormat, MediaKind, MediaTypeDescriptor, PixelFormat, StreamIndexBinding, Subtype,
};
use crate::negotiation::MediaTypeNegotiator;
use crate::release::{NativeResources, ResourceReleaser};
use crate::render::{VideoFrame, VideoSink};
use crate::source_factory::NativeSourceFactory;
use bytes::{BufMut, BytesMut};
use medialayer_core::{FinalizeSemaphore, NativeError};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Geometry of the negotiated video stream
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct VideoGeometry {
    width: u32,
    height: u32,
    stride: u32,
    pixel_format: PixelFormat,
    frame_rate: f64,
}

impl VideoGeometry {
    fn of(media_type: &MediaTypeDescriptor) -> Self {
        Self {
            width: media_type.width(),
            height: media_type.height(),
            stride: media_type.stride(),
            pixel_format: media_type.pixel_format(),
            frame_rate: media_type.frame_rate(),
        }
    }
}

struct SessionShared {
    state: SessionState,
    /// Incremented per activation so a stale teardown cannot hit a newer session
    generation: u64,
    resources: NativeResources,
    bindings: StreamIndexBinding,
    geometry: VideoGeometry,
    first_frame: bool,
    timeline: RecordingTimeline,
    duration: DurationTracker,
    muted: bool,
    volume: f32,
    next_ticket: u64,
    reader_shim: Option<ReaderCallback>,
    writer_shim: Option<WriterCallback>,
}

impl Default for SessionShared {
    fn default() -> Self {
        Self {
            state: SessionState::Inactive,
            generation: 0,
            resources: NativeResources::default(),
            bindings: StreamIndexBinding::default(),
            geometry: VideoGeometry::default(),
            first_frame: true,
            timeline: RecordingTimeline::new(),
            duration: DurationTracker::new(),
            muted: false,
            volume: 1.0,
            next_ticket: 0,
            reader_shim: None,
            writer_shim: None,
        }
    }
}

struct SessionInner {
    weak_self: Weak<SessionInner>,
    factory: NativeSourceFactory,
    config: SessionConfig,
    control: Mutex<()>,
    /// Held for a whole teardown so a losing caller returns only once it is done
    teardown: Mutex<()>,
    shared: Mutex<SessionShared>,
    delivery: DeliveryOrder,
    finalize: FinalizeSemaphore,
    finalize_status: Mutex<Option<NativeResult<()>>>,
    events: broadcast::Sender<SessionEvent>,
    sink: RwLock<Option<Arc<dyn VideoSink>>>,
    runtime: Option<Handle>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Platform capture session: preview plus optional recording to a file
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    /// Create an inactive session on `engine`.
    ///
    /// When called inside a tokio runtime the duration timer runs on it;
    /// otherwise call [`update_duration`](Self::update_duration) to publish
    /// duration changes.
    pub fn new(engine: Arc<dyn MediaEngine>, config: SessionConfig) -> MediaResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let runtime = Handle::try_current().ok();

        let inner = Arc::new_cyclic(|weak_self| SessionInner {
            weak_self: weak_self.clone(),
            factory: NativeSourceFactory::new(engine),
            config,
            control: Mutex::new(()),
            teardown: Mutex::new(()),
            shared: Mutex::new(SessionShared::default()),
            delivery: DeliveryOrder::default(),
            finalize: FinalizeSemaphore::new(),
            finalize_status: Mutex::new(None),
            events,
            sink: RwLock::new(None),
            runtime,
            timer: Mutex::new(None),
        });
        debug!(engine = inner.factory.engine().name(), "session controller created");
        Ok(Self { inner })
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Set or clear the sink that receives forwarded video frames
    pub fn set_video_sink(&self, sink: Option<Arc<dyn VideoSink>>) {
        *self.inner.sink.write() = sink;
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.inner.shared.lock().state
    }

    /// Devices of `kind` the engine currently reports
    pub fn devices(&self, kind: MediaKind) -> Vec<DeviceInfo> {
        self.inner.factory.devices(kind)
    }

    /// The engine's default device of `kind`, if any
    pub fn default_device(&self, kind: MediaKind) -> Option<DeviceInfo> {
        self.inner.factory.default_device(kind)
    }

    /// Open the requested devices and start streaming.
    ///
    /// `None` or an empty id leaves that modality out. `format` selects the
    /// camera format; with no match the first advertised format is used.
    /// On failure everything opened so far is released.
    pub fn activate(
        &self,
        video_device: Option<&str>,
        format: Option<&CameraFormat>,
        audio_device: Option<&str>,
    ) -> MediaResult<()> {
        let _control = self.inner.control.lock();
        self.inner.activate(video_device, format, audio_device)
    }

    /// Stop any recording, release every native handle and return to
    /// inactive. Does nothing when already inactive.
    pub fn deactivate(&self) {
        let _control = self.inner.control.lock();
        self.inner.teardown(None, None);
    }

    /// Start recording the live streams to `settings.destination`
    pub fn start_recording(&self, settings: &RecordingSettings) -> MediaResult<()> {
        let _control = self.inner.control.lock();
        self.inner.start_recording(settings)
    }

    /// Finalize the recording and wait until the writer has flushed
    pub fn stop_recording(&self) -> MediaResult<()> {
        let _control = self.inner.control.lock();
        self.inner.stop_recording()
    }

    /// Request a pause. Rejected unless recording and not already pausing.
    pub fn pause_recording(&self) -> bool {
        let _control = self.inner.control.lock();
        let accepted = self.inner.shared.lock().state.request_pause();
        if accepted {
            info!("recording paused");
            let _ = self.inner.events.send(SessionEvent::RecordingPaused);
        }
        accepted
    }

    /// Request a resume. Rejected unless a pause has taken effect.
    pub fn resume_recording(&self) -> bool {
        let _control = self.inner.control.lock();
        let accepted = self.inner.shared.lock().state.request_resume();
        if accepted {
            info!("recording resumed");
            let _ = self.inner.events.send(SessionEvent::RecordingResumed);
        }
        accepted
    }

    /// Width of the delivered video, 0 without a video stream
    pub fn frame_width(&self) -> u32 {
        self.inner.shared.lock().geometry.width
    }

    /// Height of the delivered video, 0 without a video stream
    pub fn frame_height(&self) -> u32 {
        self.inner.shared.lock().geometry.height
    }

    /// Frames per second of the delivered video
    pub fn frame_rate(&self) -> f64 {
        self.inner.shared.lock().geometry.frame_rate
    }

    /// Pixel layout of forwarded frames
    pub fn pixel_format(&self) -> PixelFormat {
        self.inner.shared.lock().geometry.pixel_format
    }

    /// Bytes per row of the first plane of forwarded frames
    pub fn stride(&self) -> u32 {
        self.inner.shared.lock().geometry.stride
    }

    /// Reader and sink stream indices of the current activation
    pub fn stream_bindings(&self) -> StreamIndexBinding {
        self.inner.shared.lock().bindings
    }

    /// Whether recorded audio is currently silenced
    pub fn is_muted(&self) -> bool {
        self.inner.shared.lock().muted
    }

    /// Muted recordings write silence. Takes effect from the next sample.
    pub fn set_muted(&self, muted: bool) {
        self.inner.shared.lock().muted = muted;
    }

    /// Gain applied to recorded audio
    pub fn volume(&self) -> f32 {
        self.inner.shared.lock().volume
    }

    /// Linear gain applied to recorded audio, clamped to 0.0..=1.0
    pub fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        self.inner.shared.lock().volume = volume.clamp(0.0, 1.0);
    }

    /// Milliseconds recorded so far
    pub fn recording_duration(&self) -> i64 {
        self.inner.shared.lock().duration.current()
    }

    /// Publish `DurationChanged` if the duration moved since the last
    /// publication, returning the new value
    pub fn update_duration(&self) -> Option<i64> {
        self.inner.publish_duration().1
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("factory", &self.inner.factory)
            .finish()
    }
}

impl SessionInner {
    fn upgrade(&self, operation: &str) -> MediaResult<Arc<SessionInner>> {
        self.weak_self
            .upgrade()
            .ok_or_else(|| MediaError::invalid_state(operation, "shutting down"))
    }

    fn activate(
        &self,
        video_device: Option<&str>,
        format: Option<&CameraFormat>,
        audio_device: Option<&str>,
    ) -> MediaResult<()> {
        let video_device = video_device.filter(|id| !id.is_empty());
        let audio_device = audio_device.filter(|id| !id.is_empty());

        let generation = {
            let mut shared = self.shared.lock();
            if shared.state != SessionState::Inactive {
                return Err(MediaError::invalid_state("activate", shared.state));
            }
            if video_device.is_none() && audio_device.is_none() {
                return Err(MediaError::InvalidConfiguration {
                    message: "No capture device requested".to_string(),
                });
            }
            shared.state = SessionState::Activating;
            shared.generation += 1;
            shared.generation
        };
        info!(generation, video = ?video_device, audio = ?audio_device, "activating capture session");

        let this = match self.upgrade("activate") {
            Ok(this) => this,
            Err(e) => {
                self.shared.lock().state = SessionState::Inactive;
                return Err(e);
            }
        };
        let target: Arc<dyn SourceReaderCallback> = this;
        let shim = ReaderCallback::new("source-reader", &target)
            .with_drop_hook(move || debug!(generation, "reader callback released by engine"));
        drop(target);

        let mut resources = NativeResources::default();
        let bindings = match self.build_pipeline(video_device, format, audio_device, &shim, &mut resources) {
            Ok(bindings) => bindings,
            Err(e) => {
                self.abort_activation(shim, resources, &e);
                return Err(e);
            }
        };

        let mut shared = self.shared.lock();
        shared.geometry = resources
            .video_type
            .as_ref()
            .map(VideoGeometry::of)
            .unwrap_or_default();
        shared.resources = resources;
        shared.bindings = bindings;
        shared.first_frame = true;
        shared.state = SessionState::Streaming;

        // Samples cannot be processed before the lock is released
        let primed = match shared.resources.reader.as_ref() {
            Some(reader) => reader.read_sample().native_context("request first sample"),
            None => Err(MediaError::invalid_state("activate", "no reader")),
        };
        if let Err(e) = primed {
            let resources = std::mem::take(&mut shared.resources);
            shared.bindings = StreamIndexBinding::default();
            shared.geometry = VideoGeometry::default();
            drop(shared);
            self.abort_activation(shim, resources, &e);
            return Err(e);
        }
        shared.reader_shim = Some(shim);
        drop(shared);

        info!(generation, ?bindings, "capture session streaming");
        let _ = self.events.send(SessionEvent::StreamingStarted);
        Ok(())
    }

    /// Open sources, build the reader and negotiate source stream types
    fn build_pipeline(
        &self,
        video_device: Option<&str>,
        format: Option<&CameraFormat>,
        audio_device: Option<&str>,
        shim: &ReaderCallback,
        resources: &mut NativeResources,
    ) -> MediaResult<StreamIndexBinding> {
        if let Some(id) = video_device {
            let (_, source) = self.factory.create_source(id, MediaKind::Video)?;
            resources.video_source = Some(source);
        }
        if let Some(id) = audio_device {
            let (_, source) = self.factory.create_source(id, MediaKind::Audio)?;
            resources.audio_source = Some(source);
        }

        let (first, second) = match (&resources.video_source, &resources.audio_source) {
            (Some(video), audio) => (video.clone(), audio.clone()),
            (None, Some(audio)) => (audio.clone(), None),
            (None, None) => {
                return Err(MediaError::InvalidConfiguration {
                    message: "No capture device requested".to_string(),
                })
            }
        };
        let (aggregate, reader) =
            self.factory
                .create_aggregate_reader(&first, second.as_ref(), shim.clone())?;
        resources.aggregate_source = Some(aggregate);
        resources.reader = Some(reader);

        let Some(reader) = resources.reader.as_deref() else {
            return Err(MediaError::invalid_state("activate", "no reader"));
        };

        let mut bindings = StreamIndexBinding::default();
        for stream in 0..reader.stream_count() {
            let selected = match reader.stream_kind(stream) {
                Some(MediaKind::Video)
                    if resources.video_source.is_some() && bindings.source_video.is_none() =>
                {
                    bindings.source_video = Some(stream);
                    true
                }
                Some(MediaKind::Audio)
                    if resources.audio_source.is_some() && bindings.source_audio.is_none() =>
                {
                    bindings.source_audio = Some(stream);
                    true
                }
                _ => false,
            };
            reader
                .set_stream_selection(stream, selected)
                .native_context("select stream")?;
        }
        if !bindings.is_consistent(resources.video_source.is_some(), resources.audio_source.is_some()) {
            return Err(MediaError::negotiation(
                "source",
                "reader does not expose a stream for every requested device",
            ));
        }

        if let Some(stream) = bindings.source_video {
            let formats: Vec<CameraFormat> = MediaTypeNegotiator::native_types(reader, stream)
                .iter()
                .map(CameraFormat::from_descriptor)
                .collect();
            let index = format
                .filter(|f| !f.is_null())
                .map_or(0, |f| MediaTypeNegotiator::find_media_type_index(&formats, f));
            debug!(stream, index, "selecting camera format");
            resources.video_type = Some(MediaTypeNegotiator::prepare_video_stream(reader, stream, index)?);
        }
        if let Some(stream) = bindings.source_audio {
            resources.audio_type = Some(MediaTypeNegotiator::prepare_audio_stream(reader, stream)?);
        }

        Ok(bindings)
    }

    fn abort_activation(&self, shim: ReaderCallback, mut resources: NativeResources, reason: &MediaError) {
        warn!(error = %reason, "activation failed, rolling back");
        shim.detach();
        drop(shim);
        ResourceReleaser::release(&mut resources);
        self.shared.lock().state = SessionState::Inactive;

        if let MediaError::NativeOperationFailed { source, .. } = reason {
            let _ = self.events.send(SessionEvent::StreamingError {
                code: source.code,
                message: reason.to_string(),
            });
        }
    }

    /// Tear the session down once. `generation` restricts the teardown to a
    /// specific activation; `error` is reported as a streaming error.
    fn teardown(&self, generation: Option<u64>, error: Option<NativeError>) -> bool {
        let _teardown = self.teardown.lock();
        let (mut resources, reader_shim, writer_shim, was_recording) = {
            let mut shared = self.shared.lock();
            if !shared.state.is_streaming() {
                return false;
            }
            if generation.is_some_and(|g| g != shared.generation) {
                return false;
            }
            let was_recording = shared.state.is_recording();
            shared.state = SessionState::Inactive;
            shared.bindings = StreamIndexBinding::default();
            shared.geometry = VideoGeometry::default();
            shared.first_frame = true;
            shared.timeline = RecordingTimeline::new();
            shared.duration.reset();
            (
                std::mem::take(&mut shared.resources),
                shared.reader_shim.take(),
                shared.writer_shim.take(),
                was_recording,
            )
        };

        match &error {
            Some(e) => error!(error = %e, "capture stream failed, tearing down"),
            None => info!("deactivating capture session"),
        }

        self.stop_duration_timer();
        if let Some(shim) = &reader_shim {
            shim.detach();
        }
        // No sample may reach the writer once finalize is requested
        if let Some(reader) = resources.reader.as_ref() {
            reader.stop();
        }
        if was_recording {
            if let Err(e) = self.finalize_writer(&mut resources) {
                warn!(error = %e, "recording not finalized cleanly");
            }
        }
        if let Some(shim) = &writer_shim {
            shim.detach();
        }
        drop(reader_shim);
        drop(writer_shim);
        ResourceReleaser::release(&mut resources);

        if let Some(e) = error {
            let _ = self.events.send(SessionEvent::StreamingError {
                code: e.code,
                message: e.message,
            });
        }
        if was_recording {
            let _ = self.events.send(SessionEvent::RecordingStopped);
        }
        let _ = self.events.send(SessionEvent::StreamingStopped);
        true
    }

    fn spawn_teardown(&self, generation: u64, error: Option<NativeError>) {
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        let spawned = thread::Builder::new()
            .name("session-teardown".to_string())
            .spawn(move || {
                this.teardown(Some(generation), error);
            });
        if let Err(e) = spawned {
            error!(error = %e, "failed to spawn teardown thread");
        }
    }

    fn start_recording(&self, settings: &RecordingSettings) -> MediaResult<()> {
        let (video_type, audio_type, bindings) = {
            let shared = self.shared.lock();
            if shared.state != SessionState::Streaming {
                return Err(MediaError::invalid_state("start recording", shared.state));
            }
            (
                shared.resources.video_type.clone(),
                shared.resources.audio_type.clone(),
                shared.bindings,
            )
        };

        let target: Arc<dyn SinkWriterCallback> = self.upgrade("start recording")?;
        let shim = WriterCallback::new("sink-writer", &target);
        drop(target);

        let mut pending = NativeResources::default();
        let sinks = self.configure_writer(
            settings,
            video_type.as_ref(),
            audio_type.as_ref(),
            &bindings,
            &shim,
            &mut pending,
        );
        let (sink_video, sink_audio) = match sinks {
            Ok(sinks) => sinks,
            Err(e) => {
                warn!(error = %e, destination = %settings.destination.display(), "recording setup failed");
                shim.detach();
                ResourceReleaser::release(&mut pending);
                return Err(e);
            }
        };

        let mut shared = self.shared.lock();
        if shared.state != SessionState::Streaming {
            let state = shared.state;
            drop(shared);
            shim.detach();
            ResourceReleaser::release(&mut pending);
            return Err(MediaError::invalid_state("start recording", state));
        }
        shared.resources.writer = pending.writer.take();
        shared.resources.writer_finalized = false;
        shared.resources.sink_video_type = pending.sink_video_type.take();
        shared.resources.sink_audio_type = pending.sink_audio_type.take();
        shared.bindings.sink_video = sink_video;
        shared.bindings.sink_audio = sink_audio;
        shared.timeline = RecordingTimeline::new();
        shared.duration.reset();
        shared.writer_shim = Some(shim);
        shared.state = SessionState::Recording(PausePhase::Running);
        drop(shared);

        self.finalize.drain();
        self.start_duration_timer();
        info!(destination = %settings.destination.display(), ?sink_video, ?sink_audio, "recording started");
        let _ = self.events.send(SessionEvent::RecordingStarted {
            destination: settings.destination.clone(),
        });
        Ok(())
    }

    /// Create the writer and bind one sink stream per captured modality the
    /// container can carry
    fn configure_writer(
        &self,
        settings: &RecordingSettings,
        video_type: Option<&MediaTypeDescriptor>,
        audio_type: Option<&MediaTypeDescriptor>,
        bindings: &StreamIndexBinding,
        shim: &WriterCallback,
        pending: &mut NativeResources,
    ) -> MediaResult<(Option<u32>, Option<u32>)> {
        let writer = self
            .factory
            .create_sink_writer(&settings.destination, settings.container, shim.clone())?;
        pending.writer = Some(writer);
        let Some(writer) = pending.writer.as_deref() else {
            return Err(MediaError::invalid_state("start recording", "no writer"));
        };

        let mut sink_video = None;
        if let (Some(_), Some(source)) = (bindings.source_video, video_type) {
            if settings.container.carries(MediaKind::Video) {
                let sink_type = MediaTypeNegotiator::video_sink_type(settings, source)?;
                let index = writer
                    .add_stream(&sink_type)
                    .map_err(|e| MediaError::negotiation("sink video", e.to_string()))?;
                writer
                    .set_input_media_type(index, source)
                    .map_err(|e| MediaError::negotiation("sink video", e.to_string()))?;
                debug!(index, media_type = %sink_type, "sink video stream added");
                pending.sink_video_type = Some(sink_type);
                sink_video = Some(index);
            } else {
                debug!(container = ?settings.container, "container carries no video, recording audio only");
            }
        }

        let mut sink_audio = None;
        if let (Some(_), Some(source)) = (bindings.source_audio, audio_type) {
            let sink_type = MediaTypeNegotiator::audio_sink_type(settings, source)?;
            let index = writer
                .add_stream(&sink_type)
                .map_err(|e| MediaError::negotiation("sink audio", e.to_string()))?;
            writer
                .set_input_media_type(index, source)
                .map_err(|e| MediaError::negotiation("sink audio", e.to_string()))?;
            debug!(index, media_type = %sink_type, "sink audio stream added");
            pending.sink_audio_type = Some(sink_type);
            sink_audio = Some(index);
        }

        if sink_video.is_none() && sink_audio.is_none() {
            return Err(MediaError::negotiation(
                "sink",
                format!("{:?} cannot carry any captured stream", settings.container),
            ));
        }
        writer.begin_writing().native_context("begin writing")?;
        Ok((sink_video, sink_audio))
    }

    fn stop_recording(&self) -> MediaResult<()> {
        let (mut pending, writer_shim) = {
            let mut shared = self.shared.lock();
            if !shared.state.is_recording() {
                return Err(MediaError::invalid_state("stop recording", shared.state));
            }
            shared.state = SessionState::Streaming;
            shared.bindings.clear_sink();
            let pending = NativeResources {
                writer: shared.resources.writer.take(),
                sink_video_type: shared.resources.sink_video_type.take(),
                sink_audio_type: shared.resources.sink_audio_type.take(),
                ..Default::default()
            };
            (pending, shared.writer_shim.take())
        };

        self.stop_duration_timer();
        let result = self.finalize_writer(&mut pending);
        if let Some(shim) = writer_shim {
            shim.detach();
        }
        ResourceReleaser::release(&mut pending);

        self.publish_duration();
        match &result {
            Ok(()) => info!("recording stopped"),
            Err(e) => warn!(error = %e, "recording stopped with error"),
        }
        let _ = self.events.send(SessionEvent::RecordingStopped);
        result
    }

    /// Request finalize and block until the writer reports completion
    fn finalize_writer(&self, resources: &mut NativeResources) -> MediaResult<()> {
        let Some(writer) = resources.writer.as_ref() else {
            return Ok(());
        };
        if resources.writer_finalized {
            return Ok(());
        }

        self.finalize.drain();
        self.finalize_status.lock().take();
        writer.finalize().native_context("finalize recording")?;
        resources.writer_finalized = true;

        debug!(timeout = ?self.config.finalize_timeout, "waiting for finalize");
        self.finalize.acquire(self.config.finalize_timeout)?;

        match self.finalize_status.lock().take() {
            Some(Err(source)) => Err(MediaError::NativeOperationFailed {
                operation: "finalize recording".to_string(),
                source,
            }),
            _ => Ok(()),
        }
    }

    /// Returns whether the session is still recording and the newly
    /// published duration, if it changed
    fn publish_duration(&self) -> (bool, Option<i64>) {
        let (recording, changed) = {
            let mut shared = self.shared.lock();
            (shared.state.is_recording(), shared.duration.poll())
        };
        if let Some(ms) = changed {
            let _ = self.events.send(SessionEvent::DurationChanged(ms));
        }
        (recording, changed)
    }

    fn start_duration_timer(&self) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let weak = self.weak_self.clone();
        let period = self.config.duration_interval;
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let (recording, _) = inner.publish_duration();
                if !recording {
                    break;
                }
            }
        });
        if let Some(previous) = self.timer.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop_duration_timer(&self) {
        if let Some(task) = self.timer.lock().take() {
            task.abort();
        }
    }

    fn reconcile_geometry(shared: &mut SessionShared, stream: u32) {
        shared.first_frame = false;
        let Some(reader) = shared.resources.reader.as_ref() else {
            return;
        };
        match reader.current_media_type(stream) {
            Ok(current) => {
                if shared.resources.video_type.as_ref() != Some(&current) {
                    info!(stream, media_type = %current, "video geometry changed by device");
                }
                shared.geometry = VideoGeometry::of(&current);
                shared.resources.video_type = Some(current);
            }
            Err(e) => warn!(stream, error = %e, "cannot read delivered video type"),
        }
    }

    /// Write one sample to its sink stream if recording
    fn record_sample(
        shared: &mut SessionShared,
        kind: MediaKind,
        stream: u32,
        sample: &MediaSample,
    ) -> NativeResult<()> {
        let SessionShared {
            state,
            resources,
            bindings,
            timeline,
            duration,
            ..
        } = shared;
        let SessionState::Recording(phase) = state else {
            return Ok(());
        };
        let (Some(sink_index), Some(writer)) = (bindings.sink_index(kind), resources.writer.as_ref()) else {
            return Ok(());
        };

        if let Some(timestamp) = timeline.adjust(stream, sample.timestamp(), phase) {
            writer.write_sample(sink_index, &sample.with_timestamp(timestamp))?;
            duration.record(timestamp);
        }
        Ok(())
    }

    fn forward_frame(&self, ticket: u64, frame: VideoFrame) {
        self.delivery.run_in_order(ticket, || {
            let sink = self.sink.read().clone();
            if let Some(sink) = sink {
                match panic::catch_unwind(AssertUnwindSafe(|| sink.push_frame(frame.clone()))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(error = %e, "render sink rejected frame"),
                    Err(_) => warn!("render sink panicked, frame dropped"),
                }
            }
            if self.config.emit_frame_events {
                let _ = self.events.send(SessionEvent::NewVideoFrame(frame));
            }
        });
    }
}

impl SourceReaderCallback for SessionInner {
    fn on_read_sample(&self, status: NativeResult<()>, event: FrameEvent) {
        let forwarded = {
            let mut guard = self.shared.lock();
            let shared = &mut *guard;
            if !shared.state.is_streaming() {
                trace!(stream = event.stream_index, "sample after teardown ignored");
                return;
            }
            let generation = shared.generation;

            if let Err(error) = status {
                self.spawn_teardown(generation, Some(error));
                return;
            }
            if event.flags.error {
                self.spawn_teardown(
                    generation,
                    Some(NativeError::fail(format!(
                        "stream {} reported an error",
                        event.stream_index
                    ))),
                );
                return;
            }
            if event.flags.end_of_stream {
                info!(stream = event.stream_index, "end of stream");
                self.spawn_teardown(generation, None);
                return;
            }

            let mut frame = None;
            if let Some(sample) = event.sample.as_ref() {
                let written = match shared.bindings.source_kind(event.stream_index) {
                    Some(MediaKind::Video) => {
                        if shared.first_frame || event.flags.current_media_type_changed {
                            Self::reconcile_geometry(shared, event.stream_index);
                        }
                        frame = shared
                            .resources
                            .video_type
                            .as_ref()
                            .map(|t| VideoFrame::from_sample(sample, t, event.stream_index));
                        Self::record_sample(shared, MediaKind::Video, event.stream_index, sample)
                    }
                    Some(MediaKind::Audio) if shared.state.is_recording() => {
                        let gain = if shared.muted { 0.0 } else { shared.volume };
                        let scaled = match shared.resources.audio_type.as_ref() {
                            Some(audio_type) => apply_gain(sample, audio_type, gain),
                            None => sample.clone(),
                        };
                        Self::record_sample(shared, MediaKind::Audio, event.stream_index, &scaled)
                    }
                    Some(MediaKind::Audio) => Ok(()),
                    None => {
                        trace!(stream = event.stream_index, "sample on unbound stream");
                        Ok(())
                    }
                };
                if let Err(error) = written {
                    self.spawn_teardown(generation, Some(error));
                    return;
                }
            }

            if let Some(reader) = shared.resources.reader.as_ref() {
                if let Err(error) = reader.read_sample() {
                    self.spawn_teardown(generation, Some(error));
                    return;
                }
            }

            frame.map(|frame| {
                let ticket = shared.next_ticket;
                shared.next_ticket += 1;
                (ticket, frame)
            })
        };

        if let Some((ticket, frame)) = forwarded {
            self.forward_frame(ticket, frame);
        }
    }

    fn on_flush(&self, stream_index: u32) {
        debug!(stream = stream_index, "stream flushed");
        self.shared.lock().timeline.flush_stream(stream_index);
    }

    fn on_event(&self, stream_index: u32, event: MediaEvent) {
        if !event.is_terminal() {
            trace!(stream = stream_index, ?event, "source event");
            return;
        }
        let generation = {
            let shared = self.shared.lock();
            if !shared.state.is_streaming() {
                return;
            }
            shared.generation
        };
        let error = match event {
            MediaEvent::DeviceLost => Some(NativeError::new(
                NativeError::E_HW_DEVICE_LOST,
                "capture device lost",
            )),
            _ => None,
        };
        info!(?event, "source presentation ended");
        self.spawn_teardown(generation, error);
    }
}

impl SinkWriterCallback for SessionInner {
    fn on_finalize(&self, status: NativeResult<()>) {
        debug!(ok = status.is_ok(), "writer finalize completed");
        *self.finalize_status.lock() = Some(status);
        self.finalize.release();
    }

    fn on_marker(&self, stream_index: u32) {
        trace!(stream = stream_index, "writer marker");
    }
}

/// Scale uncompressed audio by `gain`
fn apply_gain(sample: &MediaSample, media_type: &MediaTypeDescriptor, gain: f32) -> MediaSample {
    if (gain - 1.0).abs() < f32::EPSILON {
        return sample.clone();
    }
    let data = sample.data();
    let mut scaled = BytesMut::with_capacity(data.len());
    match media_type.subtype() {
        Subtype::Float => {
            for b in data.chunks_exact(4) {
                scaled.put_f32_le(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) * gain);
            }
        }
        Subtype::Pcm => {
            for b in data.chunks_exact(2) {
                let value = i16::from_le_bytes([b[0], b[1]]) as f32 * gain;
                scaled.put_i16_le(value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16);
            }
        }
        _ => return sample.clone(),
    }
    sample.with_data(scaled.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_apply_gain_scales_float_and_pcm() {
        let float = MediaTypeDescriptor::audio(Subtype::Float, 48_000, 1);
        let data: Vec<u8> = [0.5f32, -0.25].iter().flat_map(|v| v.to_le_bytes()).collect();
        let sample = MediaSample::new(data, Duration::ZERO, Duration::ZERO);

        let half = apply_gain(&sample, &float, 0.5);
        let first = f32::from_le_bytes([half.data()[0], half.data()[1], half.data()[2], half.data()[3]]);
        assert_eq!(first, 0.25);

        let silent = apply_gain(&sample, &float, 0.0);
        assert!(silent.data().iter().all(|b| *b == 0 || *b == 0x80));

        let pcm = MediaTypeDescriptor::audio(Subtype::Pcm, 48_000, 1);
        let sample = MediaSample::new(16_384i16.to_le_bytes().to_vec(), Duration::ZERO, Duration::ZERO);
        let quarter = apply_gain(&sample, &pcm, 0.25);
        assert_eq!(i16::from_le_bytes([quarter.data()[0], quarter.data()[1]]), 4_096);
    }

    #[test]
    fn test_unit_gain_shares_payload() {
        let float = MediaTypeDescriptor::audio(Subtype::Float, 48_000, 1);
        let sample = MediaSample::new(vec![1u8, 2, 3, 4], Duration::ZERO, Duration::ZERO);
        let same = apply_gain(&sample, &float, 1.0);
        assert_eq!(same.data().as_ptr(), sample.data().as_ptr());
    }
}
