//! In-process media engine
//!
//! `VirtualEngine` implements the full engine contract without hardware:
//! devices are described in memory, readers synthesise frames and PCM on a
//! worker thread, and writers dump samples to the destination file. It keeps
//! count of every live native handle so teardown can be verified, and can be
//! configured to fail at each stage of the pipeline.

mod reader;
mod source;
mod writer;

use super::{
    MediaEngine, MediaEvent, MediaSource, NativeResult, ReaderCallback, SinkWriter, SourceReader,
    StreamDescriptor, WriterCallback,
};
use crate::device::DeviceInfo;
use crate::error::{MediaError, MediaResult};
use crate::media_type::{
    ContainerFormat, MediaKind, MediaTypeDescriptor, Subtype, VideoResolution,
};
use medialayer_core::NativeError;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use reader::{ReaderShared, VirtualReader};
use source::VirtualSource;
use writer::VirtualWriter;

/// Behaviour of the virtual engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualEngineConfig {
    /// Pace samples by their timestamps instead of producing them as fast as possible
    pub realtime: bool,
    /// Length of one synthesised audio buffer
    pub audio_chunk: Duration,
    /// Device ids that resolve but fail to open
    pub fail_open: Vec<String>,
    /// Reject composition of several sources
    pub reject_aggregation: bool,
    /// Report an error status instead of the n-th sample
    pub fail_read_after: Option<u64>,
    /// Report end of stream instead of the n-th sample
    pub end_of_stream_after: Option<u64>,
    /// Geometry the device switches to when delivering its first frame
    pub delivered_resolution: Option<VideoResolution>,
    /// Delay before a finalize completes
    pub finalize_delay: Duration,
    /// Complete finalize with an error status
    pub fail_finalize: bool,
}

impl Default for VirtualEngineConfig {
    fn default() -> Self {
        Self {
            realtime: true,
            audio_chunk: Duration::from_millis(10),
            fail_open: Vec::new(),
            reject_aggregation: false,
            fail_read_after: None,
            end_of_stream_after: None,
            delivered_resolution: None,
            finalize_delay: Duration::ZERO,
            fail_finalize: false,
        }
    }
}

impl VirtualEngineConfig {
    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> MediaResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.audio_chunk.is_zero() {
            return Err(MediaError::InvalidConfiguration {
                message: "Audio chunk must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Count of native handles currently alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveHandles {
    pub sources: usize,
    pub readers: usize,
    pub writers: usize,
}

impl LiveHandles {
    pub fn is_empty(&self) -> bool {
        self.sources == 0 && self.readers == 0 && self.writers == 0
    }
}

#[derive(Debug, Default)]
struct HandleCounters {
    sources: AtomicUsize,
    readers: AtomicUsize,
    writers: AtomicUsize,
}

#[derive(Debug, Clone, Copy)]
enum HandleKind {
    Source,
    Reader,
    Writer,
}

/// Decrements the live count of its handle kind when dropped
#[derive(Debug)]
struct HandleGuard {
    counters: Arc<HandleCounters>,
    kind: HandleKind,
}

impl HandleGuard {
    fn new(counters: &Arc<HandleCounters>, kind: HandleKind) -> Self {
        Self::counter(counters, kind).fetch_add(1, Ordering::AcqRel);
        Self {
            counters: counters.clone(),
            kind,
        }
    }

    fn counter(counters: &HandleCounters, kind: HandleKind) -> &AtomicUsize {
        match kind {
            HandleKind::Source => &counters.sources,
            HandleKind::Reader => &counters.readers,
            HandleKind::Writer => &counters.writers,
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        Self::counter(&self.counters, self.kind).fetch_sub(1, Ordering::AcqRel);
    }
}

/// A sample as it reached the writer
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenSample {
    pub stream: u32,
    pub timestamp: Duration,
    pub size: usize,
    /// Peak absolute amplitude for PCM payloads, normalised to 1.0
    pub peak: Option<f32>,
}

/// Everything a virtual writer did with one destination
#[derive(Debug, Default)]
pub struct RecordingLog {
    samples: Mutex<Vec<WrittenSample>>,
    output_types: Mutex<Vec<MediaTypeDescriptor>>,
    finalized: AtomicBool,
}

impl RecordingLog {
    pub fn samples(&self) -> Vec<WrittenSample> {
        self.samples.lock().clone()
    }

    pub fn timestamps(&self, stream: u32) -> Vec<Duration> {
        self.samples
            .lock()
            .iter()
            .filter(|s| s.stream == stream)
            .map(|s| s.timestamp)
            .collect()
    }

    pub fn output_types(&self) -> Vec<MediaTypeDescriptor> {
        self.output_types.lock().clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn push(&self, sample: WrittenSample) {
        self.samples.lock().push(sample);
    }
}

/// Media engine backed by synthetic devices
pub struct VirtualEngine {
    config: VirtualEngineConfig,
    devices: RwLock<Vec<DeviceInfo>>,
    counters: Arc<HandleCounters>,
    recordings: Mutex<HashMap<PathBuf, Arc<RecordingLog>>>,
    readers: Mutex<Vec<Weak<ReaderShared>>>,
}

impl VirtualEngine {
    pub const CAMERA_ID: &'static str = "virtual-camera-0";
    pub const MICROPHONE_ID: &'static str = "virtual-microphone-0";

    /// Engine without any devices
    pub fn new(config: VirtualEngineConfig) -> Self {
        Self {
            config,
            devices: RwLock::new(Vec::new()),
            counters: Arc::new(HandleCounters::default()),
            recordings: Mutex::new(HashMap::new()),
            readers: Mutex::new(Vec::new()),
        }
    }

    /// Engine with one camera and one microphone
    pub fn with_default_devices(config: VirtualEngineConfig) -> Self {
        let engine = Self::new(config);
        engine.add_device(Self::default_camera());
        engine.add_device(Self::default_microphone());
        engine
    }

    pub fn default_camera() -> DeviceInfo {
        DeviceInfo::new(Self::CAMERA_ID, "Virtual Camera", MediaKind::Video)
            .as_default()
            .with_format(MediaTypeDescriptor::video(Subtype::Yuy2, VideoResolution::VGA, 30.0))
            .with_format(MediaTypeDescriptor::video(Subtype::Nv12, VideoResolution::HD, 30.0))
            .with_format(MediaTypeDescriptor::video(Subtype::Mjpg, VideoResolution::FULL_HD, 30.0))
    }

    pub fn default_microphone() -> DeviceInfo {
        DeviceInfo::new(Self::MICROPHONE_ID, "Virtual Microphone", MediaKind::Audio)
            .as_default()
            .with_format(MediaTypeDescriptor::audio(Subtype::Float, 48_000, 2))
            .with_format(MediaTypeDescriptor::audio(Subtype::Pcm, 44_100, 2))
    }

    pub fn add_device(&self, device: DeviceInfo) {
        debug!(device = %device.id, kind = %device.kind, "virtual device added");
        self.devices.write().push(device);
    }

    /// Simulate unplugging a device
    pub fn remove_device(&self, id: &str) -> bool {
        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|d| d.id != id);
        before != devices.len()
    }

    pub fn config(&self) -> &VirtualEngineConfig {
        &self.config
    }

    pub fn live_handles(&self) -> LiveHandles {
        LiveHandles {
            sources: self.counters.sources.load(Ordering::Acquire),
            readers: self.counters.readers.load(Ordering::Acquire),
            writers: self.counters.writers.load(Ordering::Acquire),
        }
    }

    /// What was written to `destination`, if a writer was ever created for it
    pub fn recording(&self, destination: &Path) -> Option<Arc<RecordingLog>> {
        self.recordings.lock().get(destination).cloned()
    }

    /// Raise a source event on every live reader. Returns how many were reached.
    pub fn inject_event(&self, event: MediaEvent) -> usize {
        let mut readers = self.readers.lock();
        readers.retain(|r| r.strong_count() > 0);
        readers
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|shared| shared.post_event(event.clone()))
            .count()
    }

    /// Flush every live reader as a source restart would: selected streams
    /// move their clocks back by `rewind` and report a flush before the next
    /// sample. Returns how many readers were reached.
    pub fn inject_flush(&self, rewind: Duration) -> usize {
        let mut readers = self.readers.lock();
        readers.retain(|r| r.strong_count() > 0);
        readers
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|shared| shared.post_flush(rewind))
            .count()
    }
}

impl MediaEngine for VirtualEngine {
    fn name(&self) -> &str {
        "virtual"
    }

    fn devices(&self, kind: MediaKind) -> Vec<DeviceInfo> {
        self.devices
            .read()
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }

    fn open_source(&self, device: &DeviceInfo) -> NativeResult<Arc<dyn MediaSource>> {
        if self.config.fail_open.iter().any(|id| id == &device.id) {
            return Err(NativeError::new(
                NativeError::E_HW_DEVICE_LOST,
                format!("device {} is busy", device.id),
            ));
        }
        if device.formats.is_empty() {
            return Err(NativeError::new(
                NativeError::E_INVALID_MEDIA_TYPE,
                format!("device {} advertises no formats", device.id),
            ));
        }

        let stream = StreamDescriptor {
            kind: device.kind,
            native_types: device.formats.clone(),
        };
        info!(device = %device.id, "opened virtual source");
        Ok(Arc::new(VirtualSource::new(
            device.id.clone(),
            vec![stream],
            Vec::new(),
            HandleGuard::new(&self.counters, HandleKind::Source),
        )))
    }

    fn create_aggregate_source(
        &self,
        sources: &[Arc<dyn MediaSource>],
    ) -> NativeResult<Arc<dyn MediaSource>> {
        if self.config.reject_aggregation {
            return Err(NativeError::fail("source composition rejected"));
        }
        if sources.is_empty() {
            return Err(NativeError::new(
                NativeError::E_INVALIDARG,
                "aggregate of zero sources",
            ));
        }

        let streams = sources.iter().flat_map(|s| s.streams()).collect();
        Ok(Arc::new(VirtualSource::new(
            format!("aggregate-{}", Uuid::new_v4()),
            streams,
            sources.to_vec(),
            HandleGuard::new(&self.counters, HandleKind::Source),
        )))
    }

    fn create_source_reader(
        &self,
        source: &Arc<dyn MediaSource>,
        callback: ReaderCallback,
    ) -> NativeResult<Box<dyn SourceReader>> {
        let reader = VirtualReader::spawn(
            source.clone(),
            callback,
            &self.config,
            HandleGuard::new(&self.counters, HandleKind::Reader),
        )?;
        self.readers.lock().push(Arc::downgrade(reader.shared()));
        Ok(Box::new(reader))
    }

    fn create_sink_writer(
        &self,
        destination: &Path,
        container: ContainerFormat,
        callback: WriterCallback,
    ) -> NativeResult<Box<dyn SinkWriter>> {
        let log = Arc::new(RecordingLog::default());
        let writer = VirtualWriter::create(
            destination,
            container,
            callback,
            log.clone(),
            &self.config,
            HandleGuard::new(&self.counters, HandleKind::Writer),
        )?;
        self.recordings.lock().insert(destination.to_path_buf(), log);
        Ok(Box::new(writer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_devices() {
        let engine = VirtualEngine::with_default_devices(VirtualEngineConfig::default());
        let cameras = engine.devices(MediaKind::Video);
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].formats.len(), 3);
        assert_eq!(engine.devices(MediaKind::Audio)[0].id, VirtualEngine::MICROPHONE_ID);
    }

    #[test]
    fn test_sources_are_counted() {
        let engine = VirtualEngine::with_default_devices(VirtualEngineConfig::default());
        let camera = VirtualEngine::default_camera();
        let source = engine.open_source(&camera).unwrap();
        assert_eq!(engine.live_handles().sources, 1);

        let aggregate = engine.create_aggregate_source(&[source.clone()]).unwrap();
        assert_eq!(engine.live_handles().sources, 2);
        assert_eq!(aggregate.streams().len(), 1);

        drop(aggregate);
        drop(source);
        assert!(engine.live_handles().is_empty());
    }

    #[test]
    fn test_failure_injection() {
        let config = VirtualEngineConfig {
            fail_open: vec![VirtualEngine::CAMERA_ID.to_string()],
            reject_aggregation: true,
            ..Default::default()
        };
        let engine = VirtualEngine::with_default_devices(config);
        assert!(engine.open_source(&VirtualEngine::default_camera()).is_err());

        let mic = engine.open_source(&VirtualEngine::default_microphone()).unwrap();
        assert!(engine.create_aggregate_source(&[mic]).is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config =
            VirtualEngineConfig::from_json(r#"{"realtime": false, "reject_aggregation": true}"#)
                .unwrap();
        assert!(!config.realtime);
        assert!(config.reject_aggregation);
        assert_eq!(config.audio_chunk, Duration::from_millis(10));
    }
}
