//! A small in-memory graph implementing [`VisualAccess`].

use constellation_render::{Decorator, VisualAccess};
use glam::Vec3;
use std::f32::consts::TAU;

/// One vertex and its visual attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct TestVertex {
    pub id: i32,
    pub position: Vec3,
    pub radius: f32,
    pub colour: Vec3,
    pub visibility: f32,
    pub selected: bool,
    pub dimmed: bool,
    pub foreground: String,
    pub background: String,
    pub north_west: Option<String>,
}

/// One link between two vertex indices.
#[derive(Debug, Clone, PartialEq)]
pub struct TestLink {
    pub id: i32,
    pub low: usize,
    pub high: usize,
    pub colour: Vec3,
    pub width: f32,
    pub selected: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TestGraph {
    pub vertices: Vec<TestVertex>,
    pub links: Vec<TestLink>,
    pub highlight: Vec3,
    pub background: Vec3,
}

impl TestGraph {
    /// `n` vertices on a unit circle, each linked to the next.
    pub fn ring(n: usize) -> Self {
        let vertices = (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let angle = TAU * i as f32 / n.max(1) as f32;
                TestVertex {
                    id: i32::try_from(i).unwrap_or(i32::MAX),
                    position: Vec3::new(angle.cos(), angle.sin(), 0.0),
                    radius: 1.0,
                    colour: Vec3::new(0.2, 0.4, 0.8),
                    visibility: 1.0,
                    selected: false,
                    dimmed: false,
                    foreground: "circle".into(),
                    background: "square".into(),
                    north_west: None,
                }
            })
            .collect();
        let links = (0..n.saturating_sub(1))
            .map(|i| TestLink {
                id: i32::try_from(i).unwrap_or(i32::MAX),
                low: i,
                high: i + 1,
                colour: Vec3::ONE,
                width: 1.0,
                selected: false,
            })
            .collect();
        Self {
            vertices,
            links,
            highlight: Vec3::X,
            background: Vec3::ZERO,
        }
    }
}

impl VisualAccess for TestGraph {
    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn vertex_id(&self, vertex: usize) -> i32 {
        self.vertices[vertex].id
    }

    fn position(&self, vertex: usize) -> Vec3 {
        self.vertices[vertex].position
    }

    fn radius(&self, vertex: usize) -> f32 {
        self.vertices[vertex].radius
    }

    fn vertex_colour(&self, vertex: usize) -> Vec3 {
        self.vertices[vertex].colour
    }

    fn vertex_visibility(&self, vertex: usize) -> f32 {
        self.vertices[vertex].visibility
    }

    fn vertex_selected(&self, vertex: usize) -> bool {
        self.vertices[vertex].selected
    }

    fn vertex_dimmed(&self, vertex: usize) -> bool {
        self.vertices[vertex].dimmed
    }

    fn foreground_icon(&self, vertex: usize) -> String {
        self.vertices[vertex].foreground.clone()
    }

    fn background_icon(&self, vertex: usize) -> String {
        self.vertices[vertex].background.clone()
    }

    fn decorator(&self, vertex: usize, decorator: Decorator) -> Option<String> {
        match decorator {
            Decorator::NorthWest => self.vertices[vertex].north_west.clone(),
            _ => None,
        }
    }

    fn link_count(&self) -> usize {
        self.links.len()
    }

    fn link_id(&self, link: usize) -> i32 {
        self.links[link].id
    }

    fn link_low_vertex(&self, link: usize) -> usize {
        self.links[link].low
    }

    fn link_high_vertex(&self, link: usize) -> usize {
        self.links[link].high
    }

    fn link_colour(&self, link: usize) -> Vec3 {
        self.links[link].colour
    }

    fn link_width(&self, link: usize) -> f32 {
        self.links[link].width
    }

    fn link_selected(&self, link: usize) -> bool {
        self.links[link].selected
    }

    fn link_dimmed(&self, _link: usize) -> bool {
        false
    }

    fn link_visibility(&self, _link: usize) -> f32 {
        1.0
    }

    fn highlight_colour(&self) -> Vec3 {
        self.highlight
    }

    fn background_colour(&self) -> Vec3 {
        self.background
    }
}
