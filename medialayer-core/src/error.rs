//! Error types for MediaLayer core primitives

use std::time::Duration;
use thiserror::Error;

/// Status reported by a native media engine call.
///
/// Mirrors the HRESULT-style convention of platform frameworks: a numeric
/// code plus a human readable message. Cheap to clone so it can travel
/// through callbacks and broadcast events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("native error 0x{code:08X}: {message}")]
pub struct NativeError {
    /// Native status code
    pub code: u32,
    /// Description of the failure
    pub message: String,
}

impl NativeError {
    /// Generic failure
    pub const E_FAIL: u32 = 0x8000_4005;
    /// Invalid argument
    pub const E_INVALIDARG: u32 = 0x8007_0057;
    /// Media type not accepted by a stream
    pub const E_INVALID_MEDIA_TYPE: u32 = 0xC00D_36B4;
    /// Device or hardware disappeared
    pub const E_HW_DEVICE_LOST: u32 = 0xC00D_3EA2;
    /// Operation issued after shutdown
    pub const E_SHUTDOWN: u32 = 0xC00D_3E85;
    /// Destination path does not exist or cannot be created
    pub const E_PATH_NOT_FOUND: u32 = 0x8007_0003;

    /// Create a native error from a code and message
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for an `E_FAIL` status
    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(Self::E_FAIL, message)
    }
}

/// Errors raised by the core interop primitives
#[derive(Error, Debug)]
pub enum CoreError {
    /// Waiting on a worker-thread signal exceeded the configured bound
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// A native engine call failed
    #[error(transparent)]
    Native(#[from] NativeError),
}

impl CoreError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::Native(_) => "NATIVE_FAILURE".to_string(),
        }
    }
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
