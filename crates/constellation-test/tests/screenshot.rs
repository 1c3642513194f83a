use constellation_render::{FrameOutcome, ScreenshotConfig, SkipReason};
use constellation_test::{MockHarness, StubRenderable};
use glam::Vec3;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "constellation_{}_{}.png",
        name,
        std::process::id()
    ))
}

#[test]
fn screenshot_is_written_once() {
    let path = temp_path("once");
    let _ = std::fs::remove_file(&path);

    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();

    harness
        .handle()
        .set_background_colour(Vec3::new(1.0, 0.0, 0.0));
    harness.handle().request_screenshot(&path);
    let first = harness.frame().unwrap();
    let second = harness.frame().unwrap();

    assert_eq!(first.screenshot.as_deref(), Some(path.as_path()));
    assert_eq!(
        second.outcome,
        FrameOutcome::Skipped(SkipReason::NothingToDraw)
    );
    assert!(second.screenshot.is_none());
    assert_eq!(harness.device.image_reads(), 1);

    let image = image::open(&path).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (800, 600));
    assert_eq!(image.get_pixel(10, 10).0, [255, 0, 0, 255]);
    std::fs::remove_file(&path).unwrap();
    harness.check_violations().unwrap();
}

#[test]
fn screenshot_request_forces_a_frame() {
    let path = temp_path("forced");
    let _ = std::fs::remove_file(&path);

    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();
    assert!(!harness.frame().unwrap().presented());

    harness.handle().request_screenshot(&path);
    let report = harness.frame().unwrap();

    assert!(report.presented());
    assert!(path.exists());
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn configured_frames_map_to_paths() {
    let config = ScreenshotConfig::parse_args(["--screenshot", "--frames", "0,5"]);

    assert!(config.enabled);
    assert!(config.capture_path(0).is_some());
    assert!(config.capture_path(1).is_none());
    assert!(config.capture_path(5).is_some());
    assert!(!config.finished(0));
    assert!(!config.finished(5));
    assert!(config.finished(6));
}
