//! The facade owns its runtime, so these tests run on plain threads.

use medialayer::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_init_exposes_virtual_devices() {
    let layer = MediaLayer::init().unwrap();
    assert_eq!(layer.engine().name(), "virtual");
    assert_eq!(layer.devices(MediaKind::Video).len(), 1);
    assert_eq!(
        layer.default_device(MediaKind::Audio).map(|d| d.id),
        Some(VirtualEngine::MICROPHONE_ID.to_string())
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let engine = Arc::new(VirtualEngine::new(VirtualEngineConfig::default()));
    let config = GlobalConfig {
        worker_threads: Some(0),
        ..Default::default()
    };
    assert!(matches!(
        MediaLayer::init_with(config, engine),
        Err(MediaError::InvalidConfiguration { .. })
    ));
}

#[test]
fn test_session_timer_runs_on_owned_runtime() {
    let layer = MediaLayer::init_with(
        GlobalConfig {
            worker_threads: Some(2),
            ..Default::default()
        },
        Arc::new(VirtualEngine::with_default_devices(VirtualEngineConfig::default())),
    )
    .unwrap();
    let session = layer.session().unwrap();
    let monitor = layer.monitor(&session);
    let dir = tempfile::tempdir().unwrap();

    session
        .activate(
            Some(VirtualEngine::CAMERA_ID),
            None,
            Some(VirtualEngine::MICROPHONE_ID),
        )
        .unwrap();
    session
        .start_recording(&RecordingSettings::new(dir.path().join("facade.mp4")))
        .unwrap();

    // Published by the timer task, not by any call on this thread
    assert!(wait_for(|| monitor.stats().last_duration_ms > 0));

    session.stop_recording().unwrap();
    session.deactivate();
    assert!(wait_for(|| monitor.stats().recordings_stopped == 1));
    assert!(monitor.stats().frames > 0);
}
