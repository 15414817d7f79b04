//! Helpers shared by the session integration tests

#![allow(dead_code)]

use medialayer_media::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn engine(config: VirtualEngineConfig) -> Arc<VirtualEngine> {
    Arc::new(VirtualEngine::with_default_devices(config))
}

pub fn quiet_config() -> SessionConfig {
    SessionConfig {
        emit_frame_events: false,
        duration_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

pub fn session(engine: &Arc<VirtualEngine>, config: SessionConfig) -> SessionController {
    SessionController::new(engine.clone(), config).expect("valid session config")
}

pub fn activate_both(session: &SessionController) {
    session
        .activate(
            Some(VirtualEngine::CAMERA_ID),
            None,
            Some(VirtualEngine::MICROPHONE_ID),
        )
        .expect("activation succeeds");
}

/// Wait for the first event accepted by `matches`, skipping anything else
pub async fn next_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    matches: impl Fn(&SessionEvent) -> bool,
) -> Option<SessionEvent> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Poll `condition` until it holds or the event timeout passes
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Largest distance between consecutive timestamps
pub fn max_gap(timestamps: &[Duration]) -> Duration {
    timestamps
        .windows(2)
        .map(|w| w[1].saturating_sub(w[0]))
        .max()
        .unwrap_or_default()
}
