//! Camera format selection through a live session

mod common;

use common::*;
use medialayer_media::*;

fn activate_with(session: &SessionController, format: CameraFormat) {
    session
        .activate(Some(VirtualEngine::CAMERA_ID), Some(&format), None)
        .expect("activation succeeds");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_requested_format_is_selected() {
    let engine = engine(VirtualEngineConfig::default());
    let session = session(&engine, quiet_config());

    activate_with(&session, CameraFormat::new(VideoResolution::HD, PixelFormat::Nv12, 30.0));
    assert_eq!(session.frame_width(), 1280);
    assert_eq!(session.frame_height(), 720);
    assert_eq!(session.pixel_format(), PixelFormat::Nv12);
    assert_eq!(session.stride(), 1280);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_frame_rate_is_not_compared() {
    let engine = engine(VirtualEngineConfig::default());
    let session = session(&engine, quiet_config());

    activate_with(&session, CameraFormat::new(VideoResolution::HD, PixelFormat::Nv12, 15.0));
    assert_eq!(session.frame_width(), 1280);
    assert_eq!(session.frame_rate(), 30.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unmatched_format_falls_back_to_first() {
    let engine = engine(VirtualEngineConfig::default());
    let session = session(&engine, quiet_config());

    // Right geometry, wrong encoding
    activate_with(&session, CameraFormat::new(VideoResolution::HD, PixelFormat::Yuyv, 30.0));
    assert_eq!(session.frame_width(), 640);
    assert_eq!(session.pixel_format(), PixelFormat::Yuyv);
    session.deactivate();

    activate_with(&session, CameraFormat::default());
    assert_eq!(session.frame_width(), 640);
    assert_eq!(session.frame_height(), 480);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_compressed_format_is_decoded() {
    let engine = engine(VirtualEngineConfig::default());
    let session = session(&engine, quiet_config());

    activate_with(
        &session,
        CameraFormat::new(VideoResolution::FULL_HD, PixelFormat::Jpeg, 30.0),
    );
    assert_eq!(session.frame_width(), 1920);
    assert_eq!(session.frame_height(), 1080);
    assert_eq!(session.pixel_format(), PixelFormat::Nv12);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_microphone_delivers_float() {
    let engine = engine(VirtualEngineConfig::default());
    let session = session(&engine, quiet_config());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mic.aac");

    session
        .activate(None, None, Some(VirtualEngine::MICROPHONE_ID))
        .unwrap();
    session
        .start_recording(&RecordingSettings::new(&path).with_container(ContainerFormat::Adts))
        .unwrap();
    session.stop_recording().unwrap();

    let types = engine.recording(&path).unwrap().output_types();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].subtype(), Subtype::Aac);
    assert_eq!(types[0].sample_rate(), 48_000);
    assert_eq!(types[0].channels(), 2);
    assert_eq!(types[0].bitrate(), 128_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sink_overrides_apply() {
    let engine = engine(VirtualEngineConfig::default());
    let session = session(&engine, quiet_config());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scaled.mp4");

    activate_both(&session);
    let settings = RecordingSettings::new(&path)
        .with_video_format(Subtype::Hevc)
        .with_resolution(VideoResolution::HD)
        .with_frame_rate(25.0);
    session.start_recording(&settings).unwrap();
    session.stop_recording().unwrap();

    let video = &engine.recording(&path).unwrap().output_types()[0];
    assert_eq!(video.subtype(), Subtype::Hevc);
    assert_eq!(video.resolution(), VideoResolution::HD);
    assert_eq!(video.frame_rate(), 25.0);
}
