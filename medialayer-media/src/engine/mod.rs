//! Native media engine contract
//!
//! The capture session drives a platform engine through these traits. The
//! shape follows the source-reader / sink-writer model of platform media
//! frameworks: sources are opened per device and may be composed into one
//! aggregate source, a reader pulls samples from it asynchronously and a
//! writer encodes samples into a container.
//!
//! Asynchronous completions are delivered through [`CallbackShim`]s. Engines
//! must invoke callbacks on their own worker threads, never from inside the
//! call that requested the work.

pub mod sample;
pub mod virtual_engine;

use crate::device::DeviceInfo;
use crate::media_type::{ContainerFormat, MediaKind, MediaTypeDescriptor};
use medialayer_core::{CallbackShim, NativeError};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use sample::{FrameEvent, MediaEvent, MediaSample, StreamFlags};

/// Result of a native engine call
pub type NativeResult<T> = Result<T, NativeError>;

/// Shim handed to a source reader
pub type ReaderCallback = CallbackShim<dyn SourceReaderCallback>;

/// Shim handed to a sink writer
pub type WriterCallback = CallbackShim<dyn SinkWriterCallback>;

/// Receives source reader completions
pub trait SourceReaderCallback: Send + Sync {
    fn on_read_sample(&self, status: NativeResult<()>, event: FrameEvent);
    fn on_flush(&self, stream_index: u32);
    fn on_event(&self, stream_index: u32, event: MediaEvent);
}

/// Receives sink writer completions
pub trait SinkWriterCallback: Send + Sync {
    fn on_finalize(&self, status: NativeResult<()>);
    fn on_marker(&self, stream_index: u32);
}

/// One stream exposed by a media source
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub kind: MediaKind,
    /// Native media types in reported order
    pub native_types: Vec<MediaTypeDescriptor>,
}

/// An opened device source, or an aggregate of several
pub trait MediaSource: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Streams the source presents, in native stream order
    fn streams(&self) -> Vec<StreamDescriptor>;

    /// Stop producing data and release the device
    fn shutdown(&self);
}

/// Asynchronous sample reader over a media source
pub trait SourceReader: Send + Sync {
    fn stream_count(&self) -> u32;

    fn stream_kind(&self, stream: u32) -> Option<MediaKind>;

    /// Native media type `index` of `stream`, `None` past the last one
    fn native_media_type(&self, stream: u32, index: u32) -> Option<MediaTypeDescriptor>;

    fn current_media_type(&self, stream: u32) -> NativeResult<MediaTypeDescriptor>;

    /// Request an output type. The reader may insert a decoder.
    fn set_current_media_type(&self, stream: u32, media_type: &MediaTypeDescriptor) -> NativeResult<()>;

    fn set_stream_selection(&self, stream: u32, selected: bool) -> NativeResult<()>;

    /// Request the next sample from any selected stream. Completion arrives
    /// through [`SourceReaderCallback::on_read_sample`].
    fn read_sample(&self) -> NativeResult<()>;

    /// Discard pending samples. Completion arrives through
    /// [`SourceReaderCallback::on_flush`].
    fn flush(&self) -> NativeResult<()>;

    /// Stop servicing reads and wait for in-flight callbacks to return.
    /// Called from a callback thread it must not wait on itself.
    fn stop(&self);
}

/// Encoder/multiplexer writing samples to a destination
pub trait SinkWriter: Send + Sync {
    /// Add an output stream, returning its index
    fn add_stream(&self, output_type: &MediaTypeDescriptor) -> NativeResult<u32>;

    /// Declare the type of samples that will be written to `stream`
    fn set_input_media_type(&self, stream: u32, input_type: &MediaTypeDescriptor) -> NativeResult<()>;

    fn begin_writing(&self) -> NativeResult<()>;

    fn write_sample(&self, stream: u32, sample: &MediaSample) -> NativeResult<()>;

    /// Flush and close the destination. Completion arrives through
    /// [`SinkWriterCallback::on_finalize`].
    fn finalize(&self) -> NativeResult<()>;
}

/// Platform media engine
pub trait MediaEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Devices of the given modality currently present
    fn devices(&self, kind: MediaKind) -> Vec<DeviceInfo>;

    fn open_source(&self, device: &DeviceInfo) -> NativeResult<Arc<dyn MediaSource>>;

    /// Compose several sources into one multiplexed source
    fn create_aggregate_source(&self, sources: &[Arc<dyn MediaSource>]) -> NativeResult<Arc<dyn MediaSource>>;

    fn create_source_reader(
        &self,
        source: &Arc<dyn MediaSource>,
        callback: ReaderCallback,
    ) -> NativeResult<Box<dyn SourceReader>>;

    fn create_sink_writer(
        &self,
        destination: &Path,
        container: ContainerFormat,
        callback: WriterCallback,
    ) -> NativeResult<Box<dyn SinkWriter>>;
}
