//! Capture session: lifecycle, recording control and notifications

mod config;
mod controller;
mod delivery;
mod events;
mod state;

pub use config::{RecordingSettings, SessionConfig};
pub use controller::SessionController;
pub use events::SessionEvent;
pub use state::{PausePhase, SessionState};
