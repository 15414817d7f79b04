//! Session lifecycle state

use std::fmt;

/// Pause sub-state of a recording
///
/// `Pausing` and `Resuming` are transitional: a request has been accepted but
/// no sample has acknowledged it yet, and further pause/resume requests are
/// rejected until one does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PausePhase {
    Running,
    Pausing,
    Paused,
    Resuming,
}

/// Lifecycle state of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Inactive,
    Activating,
    Streaming,
    Recording(PausePhase),
}

impl SessionState {
    /// Sources are live and samples flow (with or without recording)
    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming | SessionState::Recording(_))
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording(_))
    }

    /// Paused, or about to be
    pub fn is_paused(&self) -> bool {
        matches!(
            self,
            SessionState::Recording(PausePhase::Pausing | PausePhase::Paused)
        )
    }

    /// Transition for a pause request. Only a running recording can pause.
    pub fn request_pause(&mut self) -> bool {
        match self {
            SessionState::Recording(phase @ PausePhase::Running) => {
                *phase = PausePhase::Pausing;
                true
            }
            _ => false,
        }
    }

    /// Transition for a resume request. Only an acknowledged pause can resume.
    pub fn request_resume(&mut self) -> bool {
        match self {
            SessionState::Recording(phase @ PausePhase::Paused) => {
                *phase = PausePhase::Resuming;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Inactive => write!(f, "inactive"),
            SessionState::Activating => write!(f, "activating"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Recording(PausePhase::Running) => write!(f, "recording"),
            SessionState::Recording(PausePhase::Pausing) => write!(f, "pausing"),
            SessionState::Recording(PausePhase::Paused) => write!(f, "paused"),
            SessionState::Recording(PausePhase::Resuming) => write!(f, "resuming"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_resume_transitions() {
        let mut state = SessionState::Recording(PausePhase::Running);
        assert!(state.request_pause());
        assert_eq!(state, SessionState::Recording(PausePhase::Pausing));

        // Not acknowledged yet
        assert!(!state.request_pause());
        assert!(!state.request_resume());

        state = SessionState::Recording(PausePhase::Paused);
        assert!(state.request_resume());
        assert!(!state.request_resume());
        assert!(!state.request_pause());
    }

    #[test]
    fn test_pause_requires_recording() {
        let mut state = SessionState::Streaming;
        assert!(!state.request_pause());
        assert_eq!(state, SessionState::Streaming);
        assert!(state.is_streaming());
        assert!(!SessionState::Activating.is_streaming());
    }
}
