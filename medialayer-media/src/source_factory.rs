//! Opening device sources and composing them into one reader

use crate::device::{self, DeviceInfo};
use crate::engine::{MediaEngine, MediaSource, ReaderCallback, SinkWriter, SourceReader, WriterCallback};
use crate::error::{MediaError, MediaResult, NativeResultExt};
use crate::media_type::{ContainerFormat, MediaKind};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates sources, readers and writers through a [`MediaEngine`]
#[derive(Clone)]
pub struct NativeSourceFactory {
    engine: Arc<dyn MediaEngine>,
}

impl NativeSourceFactory {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    pub fn devices(&self, kind: MediaKind) -> Vec<DeviceInfo> {
        self.engine.devices(kind)
    }

    pub fn default_device(&self, kind: MediaKind) -> Option<DeviceInfo> {
        let devices = self.engine.devices(kind);
        device::default_device(&devices, kind).cloned()
    }

    /// Resolve a device id of the given modality
    pub fn find_device(&self, device_id: &str, kind: MediaKind) -> MediaResult<DeviceInfo> {
        self.engine
            .devices(kind)
            .into_iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| MediaError::DeviceNotFound {
                device_id: device_id.to_string(),
            })
    }

    /// Open the device `device_id`
    pub fn create_source(
        &self,
        device_id: &str,
        kind: MediaKind,
    ) -> MediaResult<(DeviceInfo, Arc<dyn MediaSource>)> {
        let device = self.find_device(device_id, kind)?;
        let source = self
            .engine
            .open_source(&device)
            .native_context(&format!("open {kind} source {device_id}"))?;
        info!(device = %device.id, %kind, "source opened");
        Ok((device, source))
    }

    /// Build a reader over `first` and, when present, `second`.
    ///
    /// Two sources are composed into an aggregate; a single source is read
    /// directly and returned as its own aggregate.
    pub fn create_aggregate_reader(
        &self,
        first: &Arc<dyn MediaSource>,
        second: Option<&Arc<dyn MediaSource>>,
        callback: ReaderCallback,
    ) -> MediaResult<(Arc<dyn MediaSource>, Box<dyn SourceReader>)> {
        let aggregate = match second {
            Some(second) => self
                .engine
                .create_aggregate_source(&[first.clone(), second.clone()])
                .native_context("compose sources")?,
            None => first.clone(),
        };
        debug!(source = aggregate.id(), "creating source reader");

        let reader = self
            .engine
            .create_source_reader(&aggregate, callback)
            .native_context("create source reader")?;
        Ok((aggregate, reader))
    }

    /// Open a writer on `destination`. Any engine failure is reported as an
    /// unavailable destination.
    pub fn create_sink_writer(
        &self,
        destination: &Path,
        container: ContainerFormat,
        callback: WriterCallback,
    ) -> MediaResult<Box<dyn SinkWriter>> {
        self.engine
            .create_sink_writer(destination, container, callback)
            .map_err(|e| MediaError::DestinationUnavailable {
                path: destination.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for NativeSourceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeSourceFactory")
            .field("engine", &self.engine.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::virtual_engine::{VirtualEngine, VirtualEngineConfig};

    fn factory(config: VirtualEngineConfig) -> (Arc<VirtualEngine>, NativeSourceFactory) {
        let engine = Arc::new(VirtualEngine::with_default_devices(config));
        (engine.clone(), NativeSourceFactory::new(engine))
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let (_, factory) = factory(VirtualEngineConfig::default());
        let err = factory.create_source("no-such-camera", MediaKind::Video).unwrap_err();
        assert!(matches!(err, MediaError::DeviceNotFound { .. }));

        // A microphone id does not resolve as a camera
        let err = factory
            .create_source(VirtualEngine::MICROPHONE_ID, MediaKind::Video)
            .unwrap_err();
        assert!(matches!(err, MediaError::DeviceNotFound { .. }));
    }

    #[test]
    fn test_open_failure_is_native_error() {
        let (_, factory) = factory(VirtualEngineConfig {
            fail_open: vec![VirtualEngine::CAMERA_ID.to_string()],
            ..Default::default()
        });
        let err = factory
            .create_source(VirtualEngine::CAMERA_ID, MediaKind::Video)
            .unwrap_err();
        assert!(matches!(err, MediaError::NativeOperationFailed { .. }));
    }

    #[test]
    fn test_default_device() {
        let (engine, factory) = factory(VirtualEngineConfig::default());
        assert_eq!(
            factory.default_device(MediaKind::Video).unwrap().id,
            VirtualEngine::CAMERA_ID
        );
        engine.remove_device(VirtualEngine::CAMERA_ID);
        assert!(factory.default_device(MediaKind::Video).is_none());
    }

    #[test]
    fn test_missing_destination_directory() {
        let (engine, factory) = factory(VirtualEngineConfig::default());
        let target: Arc<dyn crate::engine::SinkWriterCallback> = Arc::new(NoopWriterCallback);
        let shim = WriterCallback::new("writer", &target);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.mp4");

        let err = factory
            .create_sink_writer(&path, ContainerFormat::Mpeg4, shim)
            .err()
            .unwrap();
        assert!(matches!(err, MediaError::DestinationUnavailable { .. }));
        assert!(engine.live_handles().is_empty());
    }

    struct NoopWriterCallback;

    impl crate::engine::SinkWriterCallback for NoopWriterCallback {
        fn on_finalize(&self, _status: crate::engine::NativeResult<()>) {}
        fn on_marker(&self, _stream_index: u32) {}
    }
}
