//! Capture demo: preview, record with a pause, then print session statistics.
//!
//! Runs against the in-process virtual engine, so no hardware is needed.
//!
//! ```text
//! RUST_LOG=medialayer_media=debug cargo run --example capture_demo
//! ```

use anyhow::{Context, Result};
use medialayer::{
    ChannelVideoSink, GlobalConfig, MediaKind, MediaLayer, RecordingSettings, SessionEvent,
    VirtualEngine, VirtualEngineConfig,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

fn main() -> Result<()> {
    let config = GlobalConfig {
        debug_logging: true,
        ..Default::default()
    };
    let engine = Arc::new(VirtualEngine::with_default_devices(VirtualEngineConfig::default()));
    let layer = MediaLayer::init_with(config, engine).context("failed to initialise MediaLayer")?;

    println!("🎥 MediaLayer Capture Demo");
    println!("==========================");
    for kind in [MediaKind::Video, MediaKind::Audio] {
        for device in layer.devices(kind) {
            let marker = if device.is_default { "*" } else { " " };
            println!(" {marker} {kind}: {} ({})", device.description, device.id);
            for format in &device.formats {
                println!("       {format}");
            }
        }
    }

    let session = layer.session()?;
    let monitor = layer.monitor(&session);

    // Preview frames go to a channel consumed on the runtime
    let (sink, mut frames) = ChannelVideoSink::new(8);
    session.set_video_sink(Some(Arc::new(sink)));
    layer.runtime().spawn(async move {
        let mut received = 0u64;
        while let Some(frame) = frames.recv().await {
            received += 1;
            if received % 30 == 0 {
                println!("   🖼  frame {received}: {}x{} {:?}", frame.width, frame.height, frame.pixel_format);
            }
        }
    });

    let mut events = session.subscribe();
    layer.runtime().spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::NewVideoFrame(_) | SessionEvent::DurationChanged(_)) => {}
                Ok(other) => println!("   📣 {other:?}"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let camera = layer
        .default_device(MediaKind::Video)
        .context("no camera available")?;
    let microphone = layer.default_device(MediaKind::Audio);
    session.activate(
        Some(camera.id.as_str()),
        None,
        microphone.as_ref().map(|d| d.id.as_str()),
    )?;
    println!(
        "✅ Streaming {}x{} @ {:.0}fps ({:?})",
        session.frame_width(),
        session.frame_height(),
        session.frame_rate(),
        session.pixel_format()
    );
    thread::sleep(Duration::from_secs(1));

    let destination = std::env::temp_dir().join("medialayer-demo.mp4");
    session.start_recording(&RecordingSettings::new(&destination).with_video_bitrate(4_000_000))?;
    println!("⏺  Recording to {}", destination.display());
    thread::sleep(Duration::from_secs(2));

    session.pause_recording();
    println!("⏸  Paused at {} ms", session.recording_duration());
    thread::sleep(Duration::from_secs(1));
    session.resume_recording();
    println!("▶️  Resumed");
    thread::sleep(Duration::from_secs(1));

    session.stop_recording().context("recording did not finalize")?;
    println!("⏹  Recorded {} ms", session.recording_duration());
    session.deactivate();

    println!("📊 Session statistics:");
    println!("{}", monitor.to_json()?);
    Ok(())
}
