use medialayer_diagnostics::SessionMonitor;
use medialayer_media::*;
use std::sync::Arc;
use std::time::Duration;

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn test_monitor_counts_live_session() {
    let engine = Arc::new(VirtualEngine::with_default_devices(VirtualEngineConfig::default()));
    let session = SessionController::new(engine, SessionConfig::default()).unwrap();
    let monitor = SessionMonitor::spawn(session.subscribe());

    session
        .activate(Some(VirtualEngine::CAMERA_ID), None, None)
        .unwrap();
    assert!(wait_for(|| monitor.stats().frames >= 3).await);
    session.deactivate();

    let stats = monitor.stats();
    assert_eq!(stats.streaming_sessions, 1);
    assert_eq!(stats.errors, 0);
    assert!(stats.frame_bytes >= 3 * 640 * 480 * 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_monitor_records_stream_failure() {
    let engine = Arc::new(VirtualEngine::with_default_devices(VirtualEngineConfig {
        fail_read_after: Some(3),
        ..Default::default()
    }));
    let session = SessionController::new(engine, SessionConfig::default()).unwrap();
    let monitor = SessionMonitor::spawn(session.subscribe());

    session
        .activate(None, None, Some(VirtualEngine::MICROPHONE_ID))
        .unwrap();
    assert!(wait_for(|| monitor.stats().errors == 1).await);
    assert_eq!(
        monitor.stats().last_error_code,
        Some(NativeError::E_HW_DEVICE_LOST)
    );
}
