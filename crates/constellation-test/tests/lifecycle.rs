use constellation_gpu::RenderDevice;
use constellation_render::{
    AxesRenderable, FrameOutcome, IconsRenderable, InitContext, LinkStyle, LinksStager,
    RenderError, Renderable, ShaderCache,
};
use constellation_test::{MockDevice, MockHarness, ObjectKind, StubRenderable, TestGraph};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn failed_initialisation_is_reported_and_excluded() {
    let mut harness = MockHarness::new();
    let failing = StubRenderable::failing();
    let failing_log = failing.log();
    let working = StubRenderable::new(1);
    let working_log = working.log();
    harness.handle().add_renderable(Box::new(failing));
    harness.handle().add_renderable(Box::new(working));

    let report = harness.frame().unwrap();

    assert!(report.presented());
    assert_eq!(report.initialisation_failures.len(), 1);
    assert!(matches!(
        &report.initialisation_failures[0],
        RenderError::RenderableInitialisation { name, .. } if name == "stub"
    ));
    assert_eq!(harness.renderer.renderable_count(), 1);

    let failing_log = failing_log.lock();
    assert!(failing_log.destroyed);
    assert!(failing_log.swap_chains.is_empty());
    assert!(failing_log.recorded.is_empty());
    assert_eq!(working_log.lock().recorded, vec![0]);
}

#[test]
fn renderables_added_later_join_the_next_frame() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();

    let late = StubRenderable::new(4);
    let log = late.log();
    let id = harness.handle().add_renderable(Box::new(late));
    assert!(harness.renderer.renderable(id).is_none());

    assert!(harness.frame().unwrap().presented());
    assert!(harness.renderer.renderable(id).is_some());
    let log = log.lock();
    assert_eq!(log.initialised, 1);
    assert_eq!(log.swap_chains.len(), 1);
    assert_eq!(log.recorded, vec![1]);
}

#[test]
fn second_initialise_is_rejected_without_creating_objects() {
    constellation_test::init_logging();
    let mock = Arc::new(MockDevice::new());
    let device: Arc<dyn RenderDevice> = mock.clone();
    let shaders = ShaderCache::new(device.clone());
    let ctx = InitContext {
        device: &device,
        shaders: &shaders,
    };
    assert!(!shaders.is_initialised());

    let links = LinksStager::new();
    let mut renderables: Vec<Box<dyn Renderable>> = vec![
        Box::new(IconsRenderable::new()),
        Box::new(links.renderable(LinkStyle::Perspective)),
        Box::new(links.renderable(LinkStyle::Orthogonal)),
        Box::new(AxesRenderable::new()),
    ];
    for renderable in &mut renderables {
        renderable.initialise(&ctx).unwrap();
        assert!(shaders.is_initialised());
        let live = mock.live_objects();

        let second = renderable.initialise(&ctx);
        assert!(
            matches!(second, Err(RenderError::AlreadyInitialised(name)) if name == renderable.name()),
            "{}",
            renderable.name()
        );
        assert_eq!(mock.live_objects(), live, "{}", renderable.name());
    }
    assert_eq!(mock.live_count(ObjectKind::PipelineLayout), 4);
    assert_eq!(mock.live_count(ObjectKind::DescriptorSetLayout), 3);
    assert!(mock.violations().is_empty());
}

#[test]
fn destroy_releases_every_device_object() {
    let mut harness = MockHarness::new();
    let graph = TestGraph::ring(6);

    let icons = IconsRenderable::new();
    let icons_stager = icons.stager(harness.renderer.atlas());
    let links = LinksStager::new();
    let handle = harness.handle();
    handle.add_renderable(Box::new(icons));
    handle.add_renderable(Box::new(links.renderable(LinkStyle::Perspective)));
    handle.add_renderable(Box::new(links.renderable(LinkStyle::Orthogonal)));
    handle.add_renderable(Box::new(AxesRenderable::new()));
    handle.submit(icons_stager.rebuild_icons(&graph));
    handle.submit_all(links.rebuild_links(&graph));

    assert!(harness.frame().unwrap().presented());
    handle.set_background_colour(glam::Vec3::ONE);
    assert!(harness.frame().unwrap().presented());
    assert!(!harness.device.live_objects().is_empty());

    harness.renderer.destroy();
    assert!(harness.renderer.is_destroyed());
    assert_eq!(harness.device.live_objects(), Vec::<ObjectKind>::new());
    harness.check_violations().unwrap();

    harness.renderer.destroy();
    let report = harness.frame().unwrap();
    assert_eq!(report.outcome, FrameOutcome::Exited);
}

#[test]
fn dropping_the_renderer_tears_down() {
    let mut harness = MockHarness::new();
    let device = harness.device.clone();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();
    assert!(device.live_count(ObjectKind::SwapChain) > 0);

    drop(harness);
    assert!(device.live_objects().is_empty());
}

#[test]
fn exit_request_is_honoured_on_next_frame() {
    let mut harness = MockHarness::new();
    let stub = StubRenderable::new(1);
    let log = stub.log();
    let handle = harness.handle();
    handle.add_renderable(Box::new(stub));
    harness.frame().unwrap();

    assert!(!handle.wait_for_exit(Duration::from_millis(10)));

    let waiter = {
        let handle = handle.clone();
        thread::spawn(move || handle.wait_for_exit(Duration::from_secs(10)))
    };
    handle.request_exit();
    let report = harness.frame().unwrap();

    assert_eq!(report.outcome, FrameOutcome::Exited);
    assert!(waiter.join().unwrap());
    assert!(log.lock().destroyed);
    assert!(harness.device.live_objects().is_empty());
}

#[test]
fn surface_loss_releases_then_restores_resources() {
    let mut harness = MockHarness::new();
    let stub = StubRenderable::new(1);
    let log = stub.log();
    harness.handle().add_renderable(Box::new(stub));
    harness.frame().unwrap();

    harness.renderer.surface_lost().unwrap();
    assert!(harness.renderer.swap_chain().is_none());
    assert!(harness.renderer.descriptor_pool().is_none());
    assert_eq!(harness.device.live_count(ObjectKind::SwapChain), 0);
    assert_eq!(harness.device.live_count(ObjectKind::DescriptorPool), 0);

    assert!(harness.frame().unwrap().presented());
    assert_eq!(harness.device.live_count(ObjectKind::SwapChain), 1);
    assert_eq!(harness.device.live_count(ObjectKind::DescriptorPool), 1);
    assert!(log.lock().swap_chains.contains(&None));
    harness.check_violations().unwrap();
}

#[test]
fn surface_loss_from_another_thread_is_serviced_by_display() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();

    let handle = harness.handle();
    thread::spawn(move || handle.surface_lost()).join().unwrap();
    assert!(harness.handle().needs_redraw());

    assert!(harness.frame().unwrap().presented());
    assert_eq!(harness.device.swap_chains_created(), 2);
    harness.check_violations().unwrap();
}

#[test]
#[cfg(debug_assertions)]
fn display_off_the_render_thread_panics_in_debug() {
    let mut harness = MockHarness::new();
    harness.handle().add_renderable(Box::new(StubRenderable::new(1)));
    harness.frame().unwrap();

    let result = thread::spawn(move || harness.renderer.display().map(|_| ())).join();
    assert!(result.is_err());
}
