//! Structured debug logging system

use crate::DiagnosticsError;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Debug logger for structured logging
#[derive(Debug, Clone)]
pub struct DebugLogger {
    default_directive: String,
    thread_names: bool,
}

impl DebugLogger {
    /// Create new debug logger
    pub fn new() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            thread_names: true,
        }
    }

    /// Use `directive` when `RUST_LOG` does not provide a filter
    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// Include thread names in log lines. Engine callbacks run on named
    /// worker threads, so this is on by default.
    pub fn with_thread_names(mut self, enabled: bool) -> Self {
        self.thread_names = enabled;
        self
    }

    /// Build the filter: `RUST_LOG` if it parses, the default directive otherwise
    pub fn filter(&self) -> Result<EnvFilter, DiagnosticsError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.default_directive).map_err(|e| DiagnosticsError::InvalidFilter {
            directive: self.default_directive.clone(),
            reason: e.to_string(),
        })
    }

    /// Install this logger as the global subscriber
    pub fn init(&self) -> Result<(), DiagnosticsError> {
        tracing_subscriber::fmt()
            .with_env_filter(self.filter()?)
            .with_thread_names(self.thread_names)
            .with_target(true)
            .try_init()
            .map_err(|e| DiagnosticsError::AlreadyInitialized {
                message: e.to_string(),
            })?;
        tracing::debug!(default = %self.default_directive, "logging initialised");
        Ok(())
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}
