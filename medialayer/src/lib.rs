//! # MediaLayer - Capture Sessions for Camera and Microphone
//!
//! MediaLayer drives a platform media engine through a capture session:
//! open a camera and/or microphone, preview frames, record to a file with
//! pause and resume, and follow the recording duration as it advances.
//!
//! ## Key Features
//!
//! - **One session, two modalities**: video and audio read through a single
//!   composed source so their timestamps share a clock
//! - **Gap-free pause**: paused time is cut out of the recorded timeline
//! - **Safe teardown**: every native handle is released on every path, and
//!   asynchronous failures tear the session down exactly once
//! - **Engine contract**: the native engine sits behind traits; an in-process
//!   virtual engine runs everything without hardware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medialayer::{MediaKind, MediaLayer, RecordingSettings};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let layer = MediaLayer::init()?;
//!     let session = layer.session()?;
//!
//!     let camera = layer.default_device(MediaKind::Video);
//!     let microphone = layer.default_device(MediaKind::Audio);
//!     session.activate(
//!         camera.as_ref().map(|d| d.id.as_str()),
//!         None,
//!         microphone.as_ref().map(|d| d.id.as_str()),
//!     )?;
//!
//!     session.start_recording(&RecordingSettings::new("capture.mp4"))?;
//!     std::thread::sleep(std::time::Duration::from_secs(2));
//!     session.stop_recording()?;
//!     session.deactivate();
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use medialayer_core::{CallbackShim, CoreError, FinalizeSemaphore, NativeError};

pub use medialayer_media::{
    CameraFormat, ChannelVideoSink, ContainerFormat, DeviceInfo, ErrorCategory, FrameStatsSink,
    MediaEngine, MediaError, MediaKind, MediaResult, MediaTypeDescriptor, PausePhase, PixelFormat,
    RecordingSettings, SessionConfig, SessionController, SessionEvent, SessionState, Subtype,
    VideoFrame, VideoResolution, VideoSink, VirtualEngine, VirtualEngineConfig,
};

#[cfg(feature = "diagnostics")]
pub use medialayer_diagnostics::{DebugLogger, SessionMonitor, SessionStats};

// Public API modules
pub mod config;

// Re-export main API types
pub use config::GlobalConfig;

use std::fmt;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tracing::{info, warn};

/// Main entry point for MediaLayer
///
/// Owns the async runtime that session timers and monitors run on, and the
/// engine every session is created against. Cloning shares both.
#[derive(Clone)]
pub struct MediaLayer {
    inner: Arc<MediaLayerInner>,
}

struct MediaLayerInner {
    runtime: Runtime,
    config: GlobalConfig,
    engine: Arc<dyn MediaEngine>,
}

impl MediaLayer {
    /// Initialize with default settings on the virtual engine
    ///
    /// # Example
    /// ```rust,no_run
    /// use medialayer::MediaLayer;
    ///
    /// let layer = MediaLayer::init()?;
    /// # Ok::<(), medialayer::MediaError>(())
    /// ```
    pub fn init() -> MediaResult<Self> {
        let engine = Arc::new(VirtualEngine::with_default_devices(VirtualEngineConfig::default()));
        Self::init_with(GlobalConfig::default(), engine)
    }

    /// Initialize with custom global configuration and engine
    pub fn init_with(config: GlobalConfig, engine: Arc<dyn MediaEngine>) -> MediaResult<Self> {
        config.validate()?;
        if config.debug_logging {
            init_logging(&config);
        }

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name("medialayer-runtime");
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads);
        }
        let runtime = builder.build()?;

        info!(engine = engine.name(), "MediaLayer initialised");
        Ok(Self {
            inner: Arc::new(MediaLayerInner {
                runtime,
                config,
                engine,
            }),
        })
    }

    /// Global configuration in effect
    pub fn config(&self) -> &GlobalConfig {
        &self.inner.config
    }

    /// Engine sessions are created against
    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.inner.engine
    }

    /// Handle to the owned runtime
    pub fn runtime(&self) -> Handle {
        self.inner.runtime.handle().clone()
    }

    /// Devices of one modality currently present
    pub fn devices(&self, kind: MediaKind) -> Vec<DeviceInfo> {
        self.inner.engine.devices(kind)
    }

    /// The flagged default device of a modality, else the first one
    pub fn default_device(&self, kind: MediaKind) -> Option<DeviceInfo> {
        medialayer_media::default_device(&self.devices(kind), kind).cloned()
    }

    /// Create an inactive capture session whose timer runs on this runtime
    pub fn session(&self) -> MediaResult<SessionController> {
        let _guard = self.inner.runtime.enter();
        SessionController::new(self.inner.engine.clone(), self.inner.config.session.clone())
    }

    /// Start collecting statistics from `session`'s events
    #[cfg(feature = "diagnostics")]
    pub fn monitor(&self, session: &SessionController) -> SessionMonitor {
        let _guard = self.inner.runtime.enter();
        SessionMonitor::spawn(session.subscribe())
    }
}

impl fmt::Debug for MediaLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaLayer")
            .field("engine", &self.inner.engine.name())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(feature = "diagnostics")]
fn init_logging(config: &GlobalConfig) {
    let logger = DebugLogger::new().with_default_directive(config.log_filter.clone());
    if let Err(e) = logger.init() {
        warn!(error = %e, "keeping existing log subscriber");
    }
}

#[cfg(not(feature = "diagnostics"))]
fn init_logging(_config: &GlobalConfig) {
    warn!("debug logging requested without the diagnostics feature");
}
