//! # MediaLayer Diagnostics
//!
//! Debugging and diagnostic tools for MediaLayer.
//! Provides structured logging setup and a monitor that folds a capture
//! session's event stream into statistics.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod session_monitor;

use thiserror::Error;

// Re-export main types
pub use debug_logger::DebugLogger;
pub use session_monitor::{SessionMonitor, SessionStats};

/// Errors raised by diagnostics setup
#[derive(Error, Debug)]
pub enum DiagnosticsError {
    /// The log filter directive could not be parsed
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter {
        /// Directive that failed to parse
        directive: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Logging already initialised: {message}")]
    AlreadyInitialized {
        /// Subscriber error message
        message: String,
    },

    /// Statistics could not be serialised
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
