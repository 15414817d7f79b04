//! Notifications published by a capture session

use crate::render::VideoFrame;
use std::path::PathBuf;

/// Session events delivered through the broadcast channel
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Sources are open and samples flow
    StreamingStarted,
    /// The session returned to inactive
    StreamingStopped,
    /// An asynchronous failure tore the session down
    StreamingError {
        /// Native status code
        code: u32,
        /// Failure description
        message: String,
    },
    /// The writer accepted its first configuration
    RecordingStarted {
        /// Recording destination
        destination: PathBuf,
    },
    RecordingStopped,
    RecordingPaused,
    RecordingResumed,
    /// Elapsed recording time in milliseconds
    DurationChanged(i64),
    /// A video frame was forwarded to the render sink
    NewVideoFrame(VideoFrame),
}
