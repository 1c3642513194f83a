use approx::assert_relative_eq;
use constellation_render::renderables::{AxesVertex, AXES_VERTEX_COUNT};
use constellation_render::{
    AxesRenderable, Camera, IconVertex, IconsRenderable, IconsStager, LinkStyle, LinkVertex,
    LinksStager, RenderCommand, Renderable, RenderableId, RenderableUpdate, VertexFlags,
    VisualChange, UNKNOWN_ICON_INDEX,
};
use constellation_test::{MockHarness, ObjectKind, TestGraph};
use glam::Vec3;

fn with_icons(harness: &MockHarness) -> IconsStager {
    let icons = IconsRenderable::new();
    let stager = icons.stager(harness.renderer.atlas());
    harness.handle().add_renderable(Box::new(icons));
    stager
}

fn expected_icons(harness: &MockHarness, graph: &TestGraph) -> Vec<u8> {
    let atlas = harness.renderer.atlas();
    let vertices: Vec<IconVertex> = (0..graph.vertices.len())
        .map(|v| IconVertex::from_access(graph, &atlas, v))
        .collect();
    bytemuck::cast_slice(&vertices).to_vec()
}

#[test]
fn staged_icons_reach_the_device_unchanged() {
    let mut harness = MockHarness::new();
    let mut graph = TestGraph::ring(5);
    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&graph));

    assert!(harness.frame().unwrap().presented());
    assert_eq!(
        harness.device.buffers_named("icon vertices"),
        vec![expected_icons(&harness, &graph)]
    );
    assert_eq!(harness.device.last_frame_draws()[0].vertex_count, 5);

    graph.vertices[2].colour = Vec3::new(1.0, 0.0, 0.0);
    graph.vertices[2].visibility = 0.5;
    harness
        .handle()
        .submit(stager.update_colours(&graph, &VisualChange::new(vec![2])));
    assert!(harness.frame().unwrap().presented());

    let buffers = harness.device.buffers_named("icon vertices");
    assert_eq!(buffers, vec![expected_icons(&harness, &graph)]);
    let vertices: &[IconVertex] = bytemuck::cast_slice(&buffers[0]);
    assert_eq!(vertices[2].background_colour, [1.0, 0.0, 0.0, 0.5]);
    harness.check_violations().unwrap();
}

#[test]
fn icon_changes_reach_the_device_and_new_counts_rebuild() {
    let mut harness = MockHarness::new();
    let mut graph = TestGraph::ring(3);
    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&graph));
    harness.frame().unwrap();

    graph.vertices[1].foreground = "cross".into();
    let command = stager.update_icons(&graph, &VisualChange::new(vec![1]));
    assert_eq!(
        command,
        RenderCommand::renderable(stager.target(), RenderableUpdate::VerticesChanged)
    );
    harness.handle().submit(command);
    assert!(harness.frame().unwrap().presented());

    let buffers = harness.device.buffers_named("icon vertices");
    assert_eq!(buffers, vec![expected_icons(&harness, &graph)]);
    let vertices: &[IconVertex] = bytemuck::cast_slice(&buffers[0]);
    let cross = harness.renderer.atlas().index_of("cross").unwrap();
    assert_eq!(vertices[1].data[0] & 0xffff, i32::try_from(cross).unwrap());

    let mut extra = graph.vertices[0].clone();
    extra.id = 3;
    extra.foreground = "diamond".into();
    graph.vertices.push(extra);
    let command = stager.update_icons(&graph, &VisualChange::new(vec![3]));
    assert_eq!(
        command,
        RenderCommand::renderable(
            stager.target(),
            RenderableUpdate::VerticesRebuilt { count: 4 }
        )
    );
    harness.handle().submit(command);
    assert!(harness.frame().unwrap().presented());

    assert_eq!(
        harness.device.buffers_named("icon vertices"),
        vec![expected_icons(&harness, &graph)]
    );
    assert_eq!(harness.device.buffers_named("icon flags"), vec![vec![0; 4]]);
    assert_eq!(harness.device.last_frame_draws()[0].vertex_count, 4);
    harness.check_violations().unwrap();
}

#[test]
fn rebuilt_flags_reach_the_device() {
    let mut harness = MockHarness::new();
    let mut graph = TestGraph::ring(4);
    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&graph));
    harness.frame().unwrap();

    graph.vertices[0].selected = true;
    graph.vertices[2].dimmed = true;
    graph.vertices[3].selected = true;
    graph.vertices[3].dimmed = true;
    let command = stager.rebuild_vertex_flags(&graph);
    assert_eq!(
        command,
        RenderCommand::renderable(stager.target(), RenderableUpdate::FlagsRebuilt)
    );
    harness.handle().submit(command);
    assert!(harness.frame().unwrap().presented());

    let expected = vec![
        VertexFlags::from_state(true, false).bits(),
        0,
        VertexFlags::from_state(false, true).bits(),
        VertexFlags::from_state(true, true).bits(),
    ];
    assert_eq!(harness.device.buffers_named("icon flags"), vec![expected]);
    // Vertex data is left alone
    assert_eq!(
        harness.device.buffers_named("icon vertices"),
        vec![expected_icons(&harness, &graph)]
    );
    harness.check_violations().unwrap();
}

#[test]
fn pipelines_survive_a_resize_but_not_a_format_change() {
    let mut harness = MockHarness::new();
    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&TestGraph::ring(3)));
    harness.frame().unwrap();
    let built = harness.device.pipelines_created();
    assert!(built > 0);

    harness.device.set_surface_extent(1024, 768);
    harness.handle().component_resized(1024, 768);
    assert!(harness.frame().unwrap().presented());
    assert_eq!(harness.device.pipelines_created(), built);

    harness.device.set_format(ash::vk::Format::R8G8B8A8_UNORM);
    harness.handle().component_moved();
    assert!(harness.frame().unwrap().presented());
    assert_eq!(harness.device.pipelines_created(), 2 * built);
    assert_eq!(
        harness.renderer.swap_chain().unwrap().format(),
        ash::vk::Format::R8G8B8A8_UNORM
    );
    harness.check_violations().unwrap();
}

#[test]
fn staged_positions_reach_the_device_unchanged() {
    let mut harness = MockHarness::new();
    let mut graph = TestGraph::ring(3);
    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&graph));
    harness.frame().unwrap();

    graph.vertices[1].position = Vec3::new(4.0, 5.0, 6.0);
    graph.vertices[1].radius = 2.0;
    harness
        .handle()
        .submit(stager.update_positions(&graph, &VisualChange::new(vec![1])));
    harness.frame().unwrap();

    let buffers = harness.device.buffers_named("icon positions");
    assert_eq!(buffers.len(), 1);
    let positions: &[f32] = bytemuck::cast_slice(&buffers[0]);
    assert_eq!(positions.len(), 3 * 8);
    assert_eq!(
        &positions[8..16],
        &[4.0, 5.0, 6.0, 2.0, 4.0, 5.0, 6.0, 2.0]
    );
    let p0 = graph.vertices[0].position;
    assert_eq!(&positions[0..4], &[p0.x, p0.y, p0.z, 1.0]);
}

#[test]
fn selection_flags_reach_the_device() {
    let mut harness = MockHarness::new();
    let mut graph = TestGraph::ring(4);
    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&graph));
    harness.frame().unwrap();
    assert_eq!(harness.device.buffers_named("icon flags"), vec![vec![0; 4]]);

    graph.vertices[3].selected = true;
    harness
        .handle()
        .submit(stager.update_vertex_flags(&graph, &VisualChange::new(vec![3])));
    harness.frame().unwrap();

    let flags = harness.device.buffers_named("icon flags");
    assert_eq!(flags[0][..3], [0, 0, 0]);
    assert_ne!(flags[0][3], 0);
}

#[test]
fn decorators_are_packed_into_the_second_lane() {
    let harness = MockHarness::new();
    let mut graph = TestGraph::ring(1);
    graph.vertices[0].north_west = Some("ring".into());
    graph.vertices[0].foreground = "no such icon".into();
    let atlas = harness.renderer.atlas();

    let vertex = IconVertex::from_access(&graph, &atlas, 0);

    let ring = atlas.index_of("ring").unwrap();
    let square = atlas.index_of("square").unwrap();
    assert_eq!(vertex.data[1] & 0xffff, i32::try_from(ring).unwrap());
    assert_eq!(vertex.data[0] & 0xffff, i32::try_from(UNKNOWN_ICON_INDEX).unwrap());
    assert_eq!(vertex.data[0] >> 16, i32::try_from(square).unwrap());
    assert_eq!(vertex.data[3], graph.vertices[0].id);
}

#[test]
fn atlas_indices_are_stable() {
    let mut harness = MockHarness::new();
    let atlas = harness.renderer.atlas();
    let circle = atlas.add_icon("circle");
    let square = atlas.add_icon("square");
    assert_ne!(circle, square);
    assert_eq!(atlas.add_icon("circle"), circle);

    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&TestGraph::ring(2)));
    harness.frame().unwrap();

    assert_eq!(atlas.index_of("circle"), Some(circle));
    assert_eq!(atlas.add_icon("square"), square);
    assert_eq!(harness.device.live_count(ObjectKind::SampledImage), 1);
}

#[test]
fn both_link_styles_share_icon_positions() {
    let mut harness = MockHarness::new();
    let graph = TestGraph::ring(5);
    let icons = with_icons(&harness);
    let links = LinksStager::new();
    let handle = harness.handle();
    handle.add_renderable(Box::new(links.renderable(LinkStyle::Perspective)));
    handle.add_renderable(Box::new(links.renderable(LinkStyle::Orthogonal)));
    handle.submit(icons.rebuild_icons(&graph));
    handle.submit_all(links.rebuild_links(&graph));

    assert!(harness.frame().unwrap().presented());

    let counts: Vec<u32> = harness
        .device
        .last_frame_draws()
        .iter()
        .map(|draw| draw.vertex_count)
        .collect();
    assert_eq!(counts, vec![5, 8, 8]);

    for name in ["perspective links", "orthogonal links"] {
        let buffers = harness.device.buffers_named(name);
        assert_eq!(buffers.len(), 1, "{name}");
        let vertices: &[LinkVertex] = bytemuck::cast_slice(&buffers[0]);
        assert_eq!(vertices.len(), 8);
        // Each end carries its own vertex index and the other end's
        assert_eq!(vertices[0].data[0], 0);
        assert_eq!(vertices[0].data[1], 1);
        assert_eq!(vertices[1].data[0], 1);
        assert_eq!(vertices[1].data[1], 0);
    }
    harness.check_violations().unwrap();
}

#[test]
fn links_without_icons_draw_nothing() {
    let mut harness = MockHarness::new();
    let graph = TestGraph::ring(3);
    let links = LinksStager::new();
    harness
        .handle()
        .add_renderable(Box::new(links.renderable(LinkStyle::Perspective)));
    harness.handle().submit_all(links.rebuild_links(&graph));

    harness.frame().unwrap();
    assert!(harness
        .device
        .frames()
        .iter()
        .all(|frame| frame.secondaries.is_empty()));
}

#[test]
fn link_changes_with_a_new_count_rebuild() {
    let mut graph = TestGraph::ring(4);
    let links = LinksStager::new();
    let renderable = links.renderable(LinkStyle::Orthogonal);
    let target = renderable.id();
    links.rebuild_links(&graph);

    graph.links[0].width = 3.0;
    assert_eq!(
        links.update_links(&graph, &VisualChange::new(vec![0])),
        vec![RenderCommand::renderable(target, RenderableUpdate::LinksChanged)]
    );

    graph.links.pop();
    assert_eq!(
        links.update_links(&graph, &VisualChange::new(vec![0])),
        vec![RenderCommand::renderable(
            target,
            RenderableUpdate::LinksRebuilt { count: 4 }
        )]
    );
}

#[test]
fn axes_draw_with_a_transform() {
    let mut harness = MockHarness::new();
    harness
        .handle()
        .add_renderable(Box::new(AxesRenderable::new()));

    assert!(harness.frame().unwrap().presented());

    let draws = harness.device.last_frame_draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].vertex_count, AXES_VERTEX_COUNT);
    assert_eq!(draws[0].push_constant_bytes, 64);
    assert_eq!(
        harness.device.buffers_named("axes vertices")[0].len(),
        AXES_VERTEX_COUNT as usize * std::mem::size_of::<AxesVertex>()
    );
}

#[test]
fn camera_updates_reach_the_view() {
    let mut harness = MockHarness::new();
    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&TestGraph::ring(3)));
    harness.frame().unwrap();

    let camera = Camera::new(Vec3::new(0.0, 3.0, 8.0), Vec3::ZERO, Vec3::Y);
    harness.handle().set_camera(camera.update());
    harness.handle().set_highlight_colour(Vec3::new(0.0, 1.0, 0.0));
    assert!(harness.frame().unwrap().presented());

    let view = harness.renderer.view();
    let expected = camera.view_matrix().to_cols_array();
    for (actual, expected) in view.model_view.to_cols_array().into_iter().zip(expected) {
        assert_relative_eq!(actual, expected, epsilon = 1e-6);
    }
    assert_eq!(view.highlight_colour, Vec3::new(0.0, 1.0, 0.0));
    harness.check_violations().unwrap();
}

#[test]
fn commands_for_unknown_renderables_are_dropped() {
    let mut harness = MockHarness::new();
    let stager = with_icons(&harness);
    harness.handle().submit(stager.rebuild_icons(&TestGraph::ring(2)));
    harness.handle().submit(RenderCommand::renderable(
        RenderableId::next(),
        RenderableUpdate::LinksChanged,
    ));

    assert!(harness.frame().unwrap().presented());
    harness.check_violations().unwrap();
}
