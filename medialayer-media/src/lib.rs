//! # MediaLayer Media
//!
//! The capture stack of MediaLayer: media type descriptors and negotiation,
//! the native engine contract, device sources, resource release, recording
//! duration tracking and the session controller that ties them together.
//! An in-process virtual engine implements the engine contract without
//! hardware.

#![warn(clippy::all)]

pub mod device;
pub mod duration;
pub mod engine;
pub mod error;
pub mod media_type;
pub mod negotiation;
pub mod release;
pub mod render;
pub mod session;
pub mod source_factory;

// Re-export main types
pub use device::{default_device, DeviceInfo};
pub use duration::{DurationTracker, RecordingTimeline};
pub use engine::virtual_engine::{
    LiveHandles, RecordingLog, VirtualEngine, VirtualEngineConfig, WrittenSample,
};
pub use engine::{
    FrameEvent, MediaEngine, MediaEvent, MediaSample, MediaSource, SinkWriter, SourceReader,
    StreamFlags,
};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use medialayer_core::NativeError;
pub use media_type::{
    CameraFormat, ContainerFormat, MediaKind, MediaTypeDescriptor, PixelFormat, StreamIndexBinding,
    StreamRole, Subtype, VideoResolution,
};
pub use negotiation::{EncodingProfile, MediaTypeNegotiator};
pub use release::{NativeResources, ReleaseReport, ReleaseStep, ResourceReleaser};
pub use render::{ChannelVideoSink, FrameStatsSink, VideoFrame, VideoRenderStats, VideoSink};
pub use session::{
    PausePhase, RecordingSettings, SessionConfig, SessionController, SessionEvent, SessionState,
};
pub use source_factory::NativeSourceFactory;
