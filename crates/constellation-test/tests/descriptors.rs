use ash::vk;
use constellation_render::{DescriptorPoolRequirements, IconsRenderable};
use constellation_test::{MockHarness, ObjectKind, StubRenderable, TestGraph};

fn assert_pool_covers_requirements(harness: &MockHarness) {
    let image_count = harness.renderer.swap_chain().unwrap().image_count();
    let (global, per_image) = harness.renderer.descriptor_requirements();
    let needed = DescriptorPoolRequirements::total(global, per_image, image_count);
    let pool = harness.renderer.descriptor_pool().unwrap();
    assert!(
        pool.capacity().covers(&needed),
        "pool {:?} does not cover {:?}",
        pool.capacity(),
        needed
    );
}

#[test]
fn pool_covers_every_renderable() {
    let mut harness = MockHarness::new();
    harness
        .handle()
        .add_renderable(Box::new(StubRenderable::new(1).with_uniform_buffers(1)));
    harness.frame().unwrap();
    assert_pool_covers_requirements(&harness);

    let big = StubRenderable::new(1).with_uniform_buffers(4);
    let log = big.log();
    harness.handle().add_renderable(Box::new(big));
    harness.frame().unwrap();
    assert_pool_covers_requirements(&harness);

    let pool = harness.renderer.descriptor_pool().unwrap();
    assert!(pool.capacity().count(vk::DescriptorType::UNIFORM_BUFFER) >= (1 + 4) * 3);
    assert!(pool.capacity().count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER) >= 2);
    assert!(pool.capacity().sets() >= 2 * 3 + 2);
    assert_eq!(harness.device.live_count(ObjectKind::DescriptorPool), 1);
    // Once on joining, once when the pool grew
    assert_eq!(log.lock().pools, 2);
}

#[test]
fn pool_is_kept_while_it_still_fits() {
    let mut harness = MockHarness::new();
    let stub = StubRenderable::new(1);
    let log = stub.log();
    harness.handle().add_renderable(Box::new(stub));
    harness.frame().unwrap();
    let pool = harness.renderer.descriptor_pool().unwrap().handle();

    harness.device.set_surface_extent(1024, 768);
    harness.handle().component_resized(1024, 768);
    harness.frame().unwrap();

    assert_eq!(harness.renderer.descriptor_pool().unwrap().handle(), pool);
    assert_eq!(log.lock().pools, 1);
}

#[test]
fn more_swap_chain_images_grow_the_pool() {
    let mut harness = MockHarness::new();
    let graph = TestGraph::ring(4);
    let icons = IconsRenderable::new();
    let stager = icons.stager(harness.renderer.atlas());
    harness.handle().add_renderable(Box::new(icons));
    harness.handle().submit(stager.rebuild_icons(&graph));
    harness.frame().unwrap();
    let before = harness.renderer.descriptor_pool().unwrap().handle();

    harness.device.set_image_count(4);
    harness.handle().component_resized(800, 600);
    assert!(harness.frame().unwrap().presented());

    assert_eq!(harness.renderer.swap_chain().unwrap().image_count(), 4);
    assert_ne!(harness.renderer.descriptor_pool().unwrap().handle(), before);
    assert_pool_covers_requirements(&harness);
    assert_eq!(harness.device.live_count(ObjectKind::DescriptorPool), 1);
    assert_eq!(harness.device.last_frame_draws()[0].vertex_count, 4);
    harness.check_violations().unwrap();
}

#[test]
fn icon_draws_bind_written_descriptor_sets() {
    let mut harness = MockHarness::new();
    let graph = TestGraph::ring(3);
    let icons = IconsRenderable::new();
    let stager = icons.stager(harness.renderer.atlas());
    harness.handle().add_renderable(Box::new(icons));
    harness.handle().submit(stager.rebuild_icons(&graph));
    harness.frame().unwrap();

    let draws = harness.device.last_frame_draws();
    assert_eq!(draws.len(), 1);
    let set = draws[0].descriptor_set.unwrap();
    assert!(harness.device.descriptor_writes(set) > 0);
    harness.check_violations().unwrap();
}
