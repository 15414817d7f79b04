//! Configuration types and defaults

use medialayer_media::{MediaError, MediaResult, SessionConfig};
use serde::{Deserialize, Serialize};

/// Global MediaLayer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Install a global tracing subscriber on init
    pub debug_logging: bool,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Runtime worker threads, `None` uses one per core
    pub worker_threads: Option<usize>,
    /// Configuration for sessions created through [`crate::MediaLayer::session`]
    pub session: SessionConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_filter: "info".to_string(),
            worker_threads: None,
            session: SessionConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> MediaResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.worker_threads == Some(0) {
            return Err(MediaError::InvalidConfiguration {
                message: "Worker thread count must be > 0".to_string(),
            });
        }
        if self.log_filter.trim().is_empty() {
            return Err(MediaError::InvalidConfiguration {
                message: "Log filter must not be empty".to_string(),
            });
        }
        self.session.validate()
    }
}
