//! Session event monitoring
//!
//! A [`SessionMonitor`] subscribes to a capture session's event channel on a
//! tokio task and keeps running totals that can be read at any time or
//! exported as JSON.

use crate::DiagnosticsError;
use chrono::{DateTime, Utc};
use medialayer_media::SessionEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Running totals over a session's events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Times streaming started
    pub streaming_sessions: u64,
    /// Video frames observed
    pub frames: u64,
    /// Payload bytes of observed frames
    pub frame_bytes: u64,
    /// Asynchronous failures reported
    pub errors: u64,
    /// Native code of the most recent failure
    pub last_error_code: Option<u32>,
    /// Recordings started
    pub recordings_started: u64,
    /// Recordings stopped
    pub recordings_stopped: u64,
    /// Pause requests accepted
    pub pauses: u64,
    /// Last published recording duration in milliseconds
    pub last_duration_ms: i64,
    /// Events lost because the monitor fell behind
    pub lagged_events: u64,
    /// Wall-clock time of the most recent event
    pub last_event_at: Option<DateTime<Utc>>,
}

impl SessionStats {
    /// Fold one event into the totals
    pub fn observe(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::StreamingStarted => self.streaming_sessions += 1,
            SessionEvent::StreamingStopped => {}
            SessionEvent::StreamingError { code, .. } => {
                self.errors += 1;
                self.last_error_code = Some(*code);
            }
            SessionEvent::RecordingStarted { .. } => self.recordings_started += 1,
            SessionEvent::RecordingStopped => self.recordings_stopped += 1,
            SessionEvent::RecordingPaused => self.pauses += 1,
            SessionEvent::RecordingResumed => {}
            SessionEvent::DurationChanged(ms) => self.last_duration_ms = *ms,
            SessionEvent::NewVideoFrame(frame) => {
                self.frames += 1;
                self.frame_bytes += frame.data.len() as u64;
            }
        }
        self.last_event_at = Some(Utc::now());
    }
}

/// Collects [`SessionStats`] from a session event stream
#[derive(Debug)]
pub struct SessionMonitor {
    stats: Arc<Mutex<SessionStats>>,
    task: JoinHandle<()>,
}

impl SessionMonitor {
    /// Start monitoring `events` on the current tokio runtime
    pub fn spawn(mut events: broadcast::Receiver<SessionEvent>) -> Self {
        let stats = Arc::new(Mutex::new(SessionStats::default()));
        let task_stats = stats.clone();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => task_stats.lock().observe(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "session monitor lagging");
                        task_stats.lock().lagged_events += missed;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("session event channel closed");
                        break;
                    }
                }
            }
        });
        Self { stats, task }
    }

    /// Snapshot of the current totals
    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    /// Current totals as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, DiagnosticsError> {
        Ok(serde_json::to_string_pretty(&self.stats())?)
    }

    /// Whether the monitored channel has closed
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medialayer_media::{MediaSample, MediaTypeDescriptor, Subtype, VideoFrame, VideoResolution};
    use std::time::Duration;

    #[test]
    fn test_observe_folds_events() {
        let mut stats = SessionStats::default();
        let media_type = MediaTypeDescriptor::video(Subtype::Nv12, VideoResolution::new(4, 4), 30.0);
        let sample = MediaSample::new(vec![0u8; 24], Duration::ZERO, Duration::ZERO);

        for event in [
            SessionEvent::StreamingStarted,
            SessionEvent::NewVideoFrame(VideoFrame::from_sample(&sample, &media_type, 0)),
            SessionEvent::RecordingStarted {
                destination: "out.mp4".into(),
            },
            SessionEvent::DurationChanged(40),
            SessionEvent::RecordingPaused,
            SessionEvent::DurationChanged(90),
            SessionEvent::StreamingError {
                code: 0xC00D_3EA2,
                message: "lost".to_string(),
            },
            SessionEvent::RecordingStopped,
            SessionEvent::StreamingStopped,
        ] {
            stats.observe(&event);
        }

        assert_eq!(stats.streaming_sessions, 1);
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.frame_bytes, 24);
        assert_eq!(stats.recordings_started, 1);
        assert_eq!(stats.recordings_stopped, 1);
        assert_eq!(stats.pauses, 1);
        assert_eq!(stats.last_duration_ms, 90);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.last_error_code, Some(0xC00D_3EA2));
        assert!(stats.last_event_at.is_some());
    }

    #[tokio::test]
    async fn test_monitor_stops_when_channel_closes() {
        let (tx, rx) = broadcast::channel(8);
        let monitor = SessionMonitor::spawn(rx);
        tx.send(SessionEvent::StreamingStarted).unwrap();
        drop(tx);

        for _ in 0..100 {
            if monitor.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(monitor.is_finished());
        assert_eq!(monitor.stats().streaming_sessions, 1);
        assert!(monitor.to_json().unwrap().contains("\"streaming_sessions\": 1"));
    }
}
