//! Viewer application implementation.

use glam::Vec3;
use tracing::info;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use constellation_app::{AppContext, Camera, GraphApp, WindowEvent};
use constellation_render::{
    AxesRenderable, IconsRenderable, IconsStager, LinkStyle, LinksStager, VisualAccess,
    VisualChange,
};

use crate::graph::{DemoGraph, GraphParams};

/// Orbit speed in radians per second.
const ORBIT_SPEED: f32 = 0.25;

/// Morph mix change per second while flattening.
const MORPH_SPEED: f32 = 1.5;

/// Viewer application state.
pub struct Viewer {
    graph: DemoGraph,
    icons: IconsStager,
    spine: LinksStager,
    chords: LinksStager,
    camera: Camera,
    paused: bool,
    /// Target morph mix: 0 for the sphere, 1 for the flattened layout.
    flatten: f32,
    selected: usize,
}

impl GraphApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let params = GraphParams::from_args();
        let graph = DemoGraph::generate(&params);

        let icons_renderable = IconsRenderable::new();
        let icons = icons_renderable.stager(ctx.atlas());
        let spine = LinksStager::new();
        let chords = LinksStager::new();

        ctx.add_renderable(Box::new(icons_renderable));
        ctx.add_renderable(Box::new(spine.renderable(LinkStyle::Perspective)));
        ctx.add_renderable(Box::new(chords.renderable(LinkStyle::Orthogonal)));
        ctx.add_renderable(Box::new(AxesRenderable::new()));

        let handle = ctx.handle();
        let view = graph.spine();
        handle.submit(icons.rebuild_icons(&view));
        handle.submit_all(spine.rebuild_links(&view));
        handle.submit_all(chords.rebuild_links(&graph.chords()));
        handle.set_background_colour(view.background_colour());
        handle.submit(icons.set_highlight_colour(&view));

        let camera = Camera::new(
            Vec3::new(0.0, params.radius * 0.5, params.radius * 3.0),
            Vec3::ZERO,
            Vec3::Y,
        );
        info!("Viewer ready: Space pauses, Tab selects, M flattens");

        Ok(Self {
            graph,
            icons,
            spine,
            chords,
            camera,
            paused: false,
            flatten: 0.0,
            selected: 0,
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) {
        let mut moved = false;
        if !self.paused {
            self.camera.orbit(Vec3::ZERO, ORBIT_SPEED * dt);
            moved = true;
        }

        let step = MORPH_SPEED * dt;
        let mix = self.camera.morph_mix;
        if (mix - self.flatten).abs() > f32::EPSILON {
            self.camera.morph_mix = if mix < self.flatten {
                (mix + step).min(self.flatten)
            } else {
                (mix - step).max(self.flatten)
            };
            moved = true;
        }

        if moved {
            ctx.handle().set_camera(self.camera.update());
        }
    }

    fn on_event(&mut self, ctx: &AppContext, event: &WindowEvent) -> bool {
        let WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state: ElementState::Pressed,
                    repeat: false,
                    ..
                },
            ..
        } = event
        else {
            return false;
        };

        match code {
            KeyCode::Space => {
                self.paused = !self.paused;
                info!("Orbit {}", if self.paused { "paused" } else { "resumed" });
            }
            KeyCode::KeyM => {
                self.flatten = 1.0 - self.flatten;
            }
            KeyCode::Tab => {
                self.selected = (self.selected + 1) % self.graph.vertex_count();
                self.select(ctx);
            }
            _ => return false,
        }
        true
    }
}

impl Viewer {
    fn select(&mut self, ctx: &AppContext) {
        let changed = self.graph.select(self.selected);
        let handle = ctx.handle();
        let spine = self.graph.spine();
        let chords = self.graph.chords();

        handle.submit(
            self.icons
                .update_vertex_flags(&spine, &VisualChange::new(changed)),
        );
        handle.submit_all(
            self.spine
                .update_links(&spine, &VisualChange::all(spine.link_count())),
        );
        handle.submit_all(
            self.chords
                .update_links(&chords, &VisualChange::all(chords.link_count())),
        );
        info!("Selected vertex {}", self.selected);
    }
}
