use constellation_render::view::vulkan_perspective;
use constellation_render::{FrameOutcome, RendererConfig, RendererHandle, SkipReason};
use constellation_test::{MockHarness, StubRenderable, Scripted};
use glam::Vec3;

#[test]
fn first_frame_presents_image_zero() {
    let mut harness = MockHarness::new();
    let stub = StubRenderable::new(3);
    let log = stub.log();
    harness.handle().add_renderable(Box::new(stub));

    let report = harness.frame().unwrap();
    assert_eq!(report.outcome, FrameOutcome::Presented { image_index: 0 });
    assert!(report.initialisation_failures.is_empty());

    let log = log.lock();
    assert_eq!(log.initialised, 1);
    assert_eq!(log.display_updates, 1);
    assert_eq!(log.recorded, vec![0]);
    assert!(matches!(log.swap_chains.last(), Some(Some(_))));
    assert_eq!(harness.device.frames().len(), 1);
    harness.check_violations().unwrap();
}

#[test]
fn idle_frame_draws_nothing() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(3)));
    harness.frame().unwrap();

    let report = harness.frame().unwrap();
    assert_eq!(
        report.outcome,
        FrameOutcome::Skipped(SkipReason::NothingToDraw)
    );
    assert_eq!(harness.device.frames().len(), 1);
}

#[test]
fn zero_vertex_renderables_are_not_recorded() {
    let mut harness = MockHarness::new();
    let empty = StubRenderable::new(0);
    let empty_log = empty.log();
    let full = StubRenderable::new(2);
    let full_log = full.log();
    harness.handle().add_renderable(Box::new(empty));
    harness.handle().add_renderable(Box::new(full));

    harness.frame().unwrap();

    assert!(empty_log.lock().recorded.is_empty());
    assert_eq!(full_log.lock().recorded, vec![0]);
    let frame = harness.device.last_frame().unwrap();
    assert_eq!(frame.secondaries.len(), 1);
    assert_eq!(harness.device.last_frame_draws()[0].vertex_count, 2);
}

#[test]
fn frames_cycle_images_without_fence_misuse() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));

    for i in 0..10u8 {
        harness
            .handle()
            .set_background_colour(Vec3::splat(f32::from(i) / 10.0));
        assert!(harness.frame().unwrap().presented());
    }

    assert_eq!(
        harness.device.presented(),
        vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]
    );
    assert!(harness.device.max_in_flight() <= 3);
    assert_eq!(harness.device.swap_chains_created(), 1);
    assert_eq!(harness.renderer.frame_count(), 10);
    assert_eq!(harness.renderer.current_image(), 1);
    harness.check_violations().unwrap();
}

#[test]
fn failed_recording_leaves_the_image_fence_usable() {
    let mut harness = MockHarness::new();
    harness
        .handle()
        .add_renderable(Box::new(StubRenderable::new(1).with_failing_records(1)));

    assert!(harness.frame().is_err());
    assert_eq!(harness.device.submitted(), 0);

    for i in 0..4u8 {
        harness
            .handle()
            .set_background_colour(Vec3::splat(f32::from(i) / 4.0));
        assert!(harness.frame().unwrap().presented());
    }

    // Image 0 was acquired by the failed frame and reused on the last one.
    assert_eq!(harness.device.acquired(), vec![0, 1, 2, 0, 1]);
    assert_eq!(harness.device.presented(), vec![1, 2, 0, 1]);
    harness.check_violations().unwrap();
}

#[test]
fn background_colour_is_the_clear_colour() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness
        .handle()
        .set_background_colour(Vec3::new(0.25, 0.5, 0.75));

    harness.frame().unwrap();

    let frame = harness.device.last_frame().unwrap();
    assert_eq!(frame.clear_colour, [0.25, 0.5, 0.75, 1.0]);
    assert_eq!(
        harness.renderer.background_colour(),
        Vec3::new(0.25, 0.5, 0.75)
    );
}

#[test]
fn configured_colours_and_clip_planes_apply_from_the_first_frame() {
    let config = RendererConfig::default()
        .with_clip_planes(0.5, 1000.0)
        .with_background_colour(Vec3::new(0.1, 0.2, 0.3))
        .with_highlight_colour(Vec3::new(0.0, 1.0, 0.0));
    let fov = config.fov;
    let mut harness = MockHarness::with_config(config);
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));

    harness.frame().unwrap();

    let frame = harness.device.last_frame().unwrap();
    assert_eq!(frame.clear_colour, [0.1, 0.2, 0.3, 1.0]);
    let view = harness.renderer.view();
    assert_eq!((view.near, view.far), (0.5, 1000.0));
    assert_eq!(view.highlight_colour, Vec3::new(0.0, 1.0, 0.0));
    let expected = vulkan_perspective(fov, 800.0 / 600.0, 0.5, 1000.0);
    assert!(view.projection.abs_diff_eq(expected, 1e-6));
}

#[test]
fn out_of_date_acquire_rebuilds_on_next_frame() {
    let mut harness = MockHarness::new();
    let stub = StubRenderable::new(1);
    let log = stub.log();
    harness.handle().add_renderable(Box::new(stub));
    harness.frame().unwrap();

    harness.device.script_acquire(Scripted::OutOfDate);
    harness.handle().set_background_colour(Vec3::ONE);
    let report = harness.frame().unwrap();
    assert_eq!(
        report.outcome,
        FrameOutcome::Skipped(SkipReason::SwapChainOutOfDate)
    );

    let report = harness.frame().unwrap();
    assert_eq!(report.outcome, FrameOutcome::Presented { image_index: 0 });
    assert_eq!(harness.device.swap_chains_created(), 2);
    assert_eq!(harness.device.live_count(constellation_test::ObjectKind::SwapChain), 1);
    assert_eq!(log.lock().swap_chains.len(), 2);
    harness.check_violations().unwrap();
}

#[test]
fn suboptimal_acquire_still_draws_then_rebuilds() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();

    harness.device.script_acquire(Scripted::Suboptimal);
    harness.handle().set_background_colour(Vec3::ONE);
    assert!(harness.frame().unwrap().presented());
    assert_eq!(harness.device.swap_chains_created(), 1);

    assert!(harness.frame().unwrap().presented());
    assert_eq!(harness.device.swap_chains_created(), 2);
    harness.check_violations().unwrap();
}

#[test]
fn out_of_date_present_rebuilds_on_next_frame() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.device.script_present(Scripted::OutOfDate);

    assert!(harness.frame().unwrap().presented());
    assert!(harness.frame().unwrap().presented());
    assert_eq!(harness.device.swap_chains_created(), 2);
    harness.check_violations().unwrap();
}

#[test]
fn resize_takes_effect_on_next_frame() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();
    assert_eq!(harness.renderer.view().extent.width, 800);

    harness.device.set_surface_extent(1024, 768);
    harness.handle().component_resized(1024, 768);
    assert!(harness.handle().needs_redraw());
    assert!(harness.frame().unwrap().presented());

    let extent = harness.renderer.view().extent;
    assert_eq!((extent.width, extent.height), (1024, 768));
    assert_eq!(harness.renderer.swap_chain().unwrap().extent(), extent);
    harness.check_violations().unwrap();
}

#[test]
fn zero_sized_surface_skips_until_it_grows() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.device.set_surface_extent(0, 0);

    let report = harness.frame().unwrap();
    assert_eq!(
        report.outcome,
        FrameOutcome::Skipped(SkipReason::SwapChainUnavailable)
    );
    assert!(harness.renderer.swap_chain().is_none());

    harness.device.set_surface_extent(640, 480);
    assert!(harness.frame().unwrap().presented());
    harness.check_violations().unwrap();
}

#[test]
fn image_count_is_stable_across_acquires() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();
    let image_count = harness.renderer.swap_chain().unwrap().image_count();

    for _ in 0..5 {
        harness.handle().set_background_colour(Vec3::ZERO);
        harness.frame().unwrap();
        assert_eq!(
            harness.renderer.swap_chain().unwrap().image_count(),
            image_count
        );
    }
    assert!(harness.device.acquired().iter().all(|&i| i < image_count));
}

fn assert_rebuilds_on_next_frame(notify: impl Fn(&RendererHandle)) {
    let mut harness = MockHarness::new();
    let stub = StubRenderable::new(1);
    let log = stub.log();
    harness.handle().add_renderable(Box::new(stub));
    harness.frame().unwrap();
    assert!(!harness.handle().needs_redraw());

    notify(&harness.handle());
    assert!(harness.handle().needs_redraw());
    assert_eq!(harness.device.swap_chains_created(), 1);

    assert!(harness.frame().unwrap().presented());
    assert_eq!(harness.device.swap_chains_created(), 2);
    assert_eq!(log.lock().swap_chains.len(), 2);
    harness.check_violations().unwrap();
}

#[test]
fn moving_the_window_rebuilds_on_next_frame() {
    assert_rebuilds_on_next_frame(RendererHandle::component_moved);
}

#[test]
fn showing_the_window_rebuilds_on_next_frame() {
    assert_rebuilds_on_next_frame(RendererHandle::component_shown);
}

#[test]
fn hiding_the_window_rebuilds_on_next_frame() {
    assert_rebuilds_on_next_frame(RendererHandle::component_hidden);
}
