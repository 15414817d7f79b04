//! Media session error types and handling
//!
//! This module defines the error taxonomy of the capture stack: device
//! resolution, media type negotiation, native engine failures, invalid
//! lifecycle transitions and asynchronous stream failures.

use medialayer_core::{CoreError, NativeError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for capture session operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Requested input device does not resolve
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// Recording destination cannot be opened
    #[error("Destination unavailable: {path:?} - {reason}")]
    DestinationUnavailable {
        /// Destination path
        path: PathBuf,
        /// Failure reason
        reason: String,
    },

    /// No compatible media type for a requested profile
    #[error("Media type negotiation failed for {stream}: {reason}")]
    NegotiationFailed {
        /// Stream role being negotiated
        stream: String,
        /// Failure reason
        reason: String,
    },

    /// A native engine call failed
    #[error("Native operation failed: {operation} - {source}")]
    NativeOperationFailed {
        /// Operation that failed
        operation: String,
        /// Native status
        #[source]
        source: NativeError,
    },

    /// Operation not valid in the current session state
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        /// Rejected operation
        operation: String,
        /// State the session was in
        state: String,
    },

    /// Asynchronous stream failure reported by the engine
    #[error("Stream error: {source}")]
    StreamError {
        /// Native status carried by the callback
        #[source]
        source: NativeError,
    },

    /// Timeout error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: std::time::Duration,
    },

    /// Unsupported format error
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format description
        format: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Configuration could not be parsed
    #[error("Configuration parse error: {source}")]
    ConfigParse {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable by retrying the same call later
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Io { .. } => true,
            MediaError::Timeout { .. } => true,
            MediaError::DestinationUnavailable { .. } => true,
            MediaError::InvalidState { .. } => true,
            MediaError::StreamError { .. } => true,
            MediaError::DeviceNotFound { .. } => false,
            MediaError::NegotiationFailed { .. } => false,
            MediaError::UnsupportedFormat { .. } => false,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Io { .. } => ErrorCategory::System,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::ConfigParse { .. } => ErrorCategory::Configuration,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::DestinationUnavailable { .. } => ErrorCategory::Device,
            MediaError::NegotiationFailed { .. } => ErrorCategory::Negotiation,
            MediaError::UnsupportedFormat { .. } => ErrorCategory::Negotiation,
            MediaError::NativeOperationFailed { .. } => ErrorCategory::Native,
            MediaError::InvalidState { .. } => ErrorCategory::State,
            MediaError::StreamError { .. } => ErrorCategory::Stream,
            MediaError::Timeout { .. } => ErrorCategory::System,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
        }
    }

    pub(crate) fn invalid_state(operation: &str, state: impl ToString) -> Self {
        MediaError::InvalidState {
            operation: operation.to_string(),
            state: state.to_string(),
        }
    }

    pub(crate) fn negotiation(stream: &str, reason: impl Into<String>) -> Self {
        MediaError::NegotiationFailed {
            stream: stream.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<CoreError> for MediaError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Timeout { operation, duration } => MediaError::Timeout { operation, duration },
            CoreError::Native(source) => MediaError::NativeOperationFailed {
                operation: "native call".to_string(),
                source,
            },
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors (I/O, timeouts)
    System,
    /// Configuration and parameter errors
    Configuration,
    /// Device and destination resolution errors
    Device,
    /// Media type negotiation errors
    Negotiation,
    /// Native engine call failures
    Native,
    /// Lifecycle state errors
    State,
    /// Asynchronous stream failures
    Stream,
    /// Data validation errors
    Data,
}

/// Helper trait for attaching operation context to native results
pub trait NativeResultExt<T> {
    /// Map a native failure into [`MediaError::NativeOperationFailed`]
    fn native_context(self, operation: &str) -> MediaResult<T>;
}

impl<T> NativeResultExt<T> for Result<T, NativeError> {
    fn native_context(self, operation: &str) -> MediaResult<T> {
        self.map_err(|source| MediaError::NativeOperationFailed {
            operation: operation.to_string(),
            source,
        })
    }
}
