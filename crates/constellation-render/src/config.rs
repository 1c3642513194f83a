//! Renderer configuration.

use glam::Vec3;

/// Renderer configuration.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
    /// Initial clear colour.
    pub background_colour: Vec3,
    /// Initial colour of selected elements.
    pub highlight_colour: Vec3,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fov: 35f32.to_radians(),
            near: 1.0,
            far: 500_000.0,
            background_colour: Vec3::ZERO,
            highlight_colour: Vec3::new(1.0, 0.0, 0.0),
        }
    }
}

impl RendererConfig {
    /// Set the field of view in radians.
    #[must_use]
    pub fn with_fov(mut self, fov: f32) -> Self {
        self.fov = fov;
        self
    }

    /// Set the near and far planes.
    #[must_use]
    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    #[must_use]
    pub fn with_background_colour(mut self, colour: Vec3) -> Self {
        self.background_colour = colour;
        self
    }

    #[must_use]
    pub fn with_highlight_colour(mut self, colour: Vec3) -> Self {
        self.highlight_colour = colour;
        self
    }
}
