//! Generated demo graph.

use constellation_render::{Decorator, VisualAccess};
use glam::Vec3;
use std::f32::consts::PI;
use tracing::info;

const SHAPES: [&str; 6] = ["circle", "square", "diamond", "triangle", "ring", "cross"];

/// Graph generation parameters.
#[derive(Debug, Clone)]
pub struct GraphParams {
    pub vertices: usize,
    pub chords: usize,
    pub radius: f32,
    pub seed: u64,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            vertices: 200,
            chords: 60,
            radius: 40.0,
            seed: 42,
        }
    }
}

impl GraphParams {
    /// Parse graph parameters from command line arguments.
    pub fn from_args() -> Self {
        let mut params = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            let consumed = match args[i].as_str() {
                "--vertices" => value
                    .and_then(|v| v.parse().ok())
                    .map(|v| params.vertices = v),
                "--chords" => value
                    .and_then(|v| v.parse().ok())
                    .map(|v| params.chords = v),
                "--seed" => value.and_then(|v| v.parse().ok()).map(|v| params.seed = v),
                _ => None,
            };
            i += if consumed.is_some() { 2 } else { 1 };
        }

        params
    }
}

struct Vertex {
    position: Vec3,
    colour: Vec3,
    foreground: &'static str,
    background: &'static str,
    north_east: Option<&'static str>,
    selected: bool,
}

struct Link {
    low: usize,
    high: usize,
    colour: Vec3,
    width: f32,
}

/// A vertex spiral along a sphere, a spine through it, and random chords.
pub struct DemoGraph {
    vertices: Vec<Vertex>,
    links: Vec<Link>,
    spine: Vec<usize>,
    chords: Vec<usize>,
}

/// SplitMix64.
fn hash(seed: u64, i: u64) -> u64 {
    let mut z = seed.wrapping_add(i.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[allow(clippy::cast_precision_loss)]
fn unit(seed: u64, i: u64) -> f32 {
    (hash(seed, i) >> 40) as f32 / (1u64 << 24) as f32
}

impl DemoGraph {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn generate(params: &GraphParams) -> Self {
        let n = params.vertices.max(2);
        let seed = params.seed;

        let vertices = (0..n)
            .map(|i| {
                // Fibonacci sphere
                let t = (i as f32 + 0.5) / n as f32;
                let inclination = (1.0 - 2.0 * t).acos();
                let azimuth = PI * (1.0 + 5f32.sqrt()) * i as f32;
                let position = Vec3::new(
                    inclination.sin() * azimuth.cos(),
                    inclination.sin() * azimuth.sin(),
                    inclination.cos(),
                ) * params.radius;
                let k = 3 * i as u64;
                let h = hash(seed, i as u64);
                Vertex {
                    position,
                    colour: Vec3::new(unit(seed, k), unit(seed, k + 1), unit(seed, k + 2)),
                    foreground: SHAPES[(h % SHAPES.len() as u64) as usize],
                    background: if h & 0x100 == 0 { "circle" } else { "square" },
                    north_east: (h % 7 == 0).then_some("cross"),
                    selected: false,
                }
            })
            .collect();

        let mut links: Vec<Link> = (0..n - 1)
            .map(|i| Link {
                low: i,
                high: i + 1,
                colour: Vec3::new(0.6, 0.6, 0.7),
                width: 1.0,
            })
            .collect();
        let spine = (0..links.len()).collect();

        let mut chords = Vec::with_capacity(params.chords);
        for c in 0..params.chords as u64 {
            let a = (hash(seed ^ 0xc0ffee, 2 * c) % n as u64) as usize;
            let b = (hash(seed ^ 0xc0ffee, 2 * c + 1) % n as u64) as usize;
            if a == b {
                continue;
            }
            chords.push(links.len());
            links.push(Link {
                low: a.min(b),
                high: a.max(b),
                colour: Vec3::new(0.9, 0.7, 0.2),
                width: 2.0,
            });
        }

        info!(
            "Generated graph: {} vertices, {} spine links, {} chords",
            n,
            n - 1,
            chords.len()
        );
        Self {
            vertices,
            links,
            spine,
            chords,
        }
    }

    /// The graph seen with only its spine links.
    pub fn spine(&self) -> LinkLayer<'_> {
        LinkLayer {
            graph: self,
            links: &self.spine,
        }
    }

    /// The graph seen with only its chords.
    pub fn chords(&self) -> LinkLayer<'_> {
        LinkLayer {
            graph: self,
            links: &self.chords,
        }
    }

    /// Move the selection to `vertex`, returning the vertices that changed.
    pub fn select(&mut self, vertex: usize) -> Vec<usize> {
        let mut changed: Vec<usize> = self
            .vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.selected)
            .map(|(i, _)| i)
            .collect();
        for &i in &changed {
            self.vertices[i].selected = false;
        }
        if let Some(v) = self.vertices.get_mut(vertex) {
            v.selected = true;
            changed.push(vertex);
        }
        changed
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}

/// A [`DemoGraph`] restricted to one set of links.
pub struct LinkLayer<'a> {
    graph: &'a DemoGraph,
    links: &'a [usize],
}

impl LinkLayer<'_> {
    fn link(&self, link: usize) -> &Link {
        &self.graph.links[self.links[link]]
    }

    fn vertex(&self, vertex: usize) -> &Vertex {
        &self.graph.vertices[vertex]
    }
}

impl VisualAccess for LinkLayer<'_> {
    fn vertex_count(&self) -> usize {
        self.graph.vertices.len()
    }

    fn vertex_id(&self, vertex: usize) -> i32 {
        i32::try_from(vertex).unwrap_or(i32::MAX)
    }

    fn position(&self, vertex: usize) -> Vec3 {
        self.vertex(vertex).position
    }

    fn alternate_position(&self, vertex: usize) -> Vec3 {
        // Flattened onto the XY plane
        self.vertex(vertex).position * Vec3::new(1.0, 1.0, 0.0)
    }

    fn radius(&self, _vertex: usize) -> f32 {
        1.0
    }

    fn vertex_colour(&self, vertex: usize) -> Vec3 {
        self.vertex(vertex).colour
    }

    fn vertex_visibility(&self, _vertex: usize) -> f32 {
        1.0
    }

    fn vertex_selected(&self, vertex: usize) -> bool {
        self.vertex(vertex).selected
    }

    fn vertex_dimmed(&self, _vertex: usize) -> bool {
        false
    }

    fn foreground_icon(&self, vertex: usize) -> String {
        self.vertex(vertex).foreground.to_owned()
    }

    fn background_icon(&self, vertex: usize) -> String {
        self.vertex(vertex).background.to_owned()
    }

    fn decorator(&self, vertex: usize, decorator: Decorator) -> Option<String> {
        match decorator {
            Decorator::NorthEast => self.vertex(vertex).north_east.map(str::to_owned),
            _ => None,
        }
    }

    fn link_count(&self) -> usize {
        self.links.len()
    }

    fn link_id(&self, link: usize) -> i32 {
        i32::try_from(self.links[link]).unwrap_or(i32::MAX)
    }

    fn link_low_vertex(&self, link: usize) -> usize {
        self.link(link).low
    }

    fn link_high_vertex(&self, link: usize) -> usize {
        self.link(link).high
    }

    fn link_colour(&self, link: usize) -> Vec3 {
        self.link(link).colour
    }

    fn link_width(&self, link: usize) -> f32 {
        self.link(link).width
    }

    fn link_selected(&self, link: usize) -> bool {
        let link = self.link(link);
        self.vertex(link.low).selected || self.vertex(link.high).selected
    }

    fn link_dimmed(&self, _link: usize) -> bool {
        false
    }

    fn link_visibility(&self, _link: usize) -> f32 {
        1.0
    }

    fn highlight_colour(&self) -> Vec3 {
        Vec3::new(1.0, 0.2, 0.2)
    }

    fn background_colour(&self) -> Vec3 {
        Vec3::new(0.02, 0.02, 0.05)
    }
}
