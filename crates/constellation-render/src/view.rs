//! View state shared by every renderable for one frame.

use crate::camera::CameraUpdate;
use crate::config::RendererConfig;
use ash::vk;
use glam::{Mat4, Vec3};

/// Camera, projection and scene colours as of the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub model_view: Mat4,
    pub projection: Mat4,
    /// Pixels per world unit at distance 1 from the eye.
    pub pixel_density: f32,
    pub morph_mix: f32,
    pub visibility_low: f32,
    pub visibility_high: f32,
    pub highlight_colour: Vec3,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub extent: vk::Extent2D,
}

impl ViewState {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            model_view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            pixel_density: 1.0,
            morph_mix: 0.0,
            visibility_low: 0.0,
            visibility_high: 1.0,
            highlight_colour: config.highlight_colour,
            fov: config.fov,
            near: config.near,
            far: config.far,
            extent: vk::Extent2D::default(),
        }
    }

    /// Take the camera's model-view and visibility window.
    ///
    /// A field of view change also recomputes the projection.
    pub fn apply_camera(&mut self, camera: &CameraUpdate) {
        self.model_view = camera.model_view;
        self.morph_mix = camera.morph_mix;
        self.visibility_low = camera.visibility_low;
        self.visibility_high = camera.visibility_high;
        if (camera.fov - self.fov).abs() > f32::EPSILON {
            self.fov = camera.fov;
            self.update_projection();
        }
    }

    /// Recompute the projection and pixel density for a new surface extent.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        self.extent = extent;
        self.update_projection();
    }

    fn update_projection(&mut self) {
        if self.extent.width == 0 || self.extent.height == 0 {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let (width, height) = (self.extent.width as f32, self.extent.height as f32);
        self.projection = vulkan_perspective(self.fov, width / height, self.near, self.far);
        self.pixel_density = height / (2.0 * (self.fov * 0.5).tan());
    }

    /// Highlight colour as the diagonal of a 4x4 matrix, the layout the
    /// geometry shaders multiply icon colours by.
    pub fn highlight_matrix(&self) -> Mat4 {
        Mat4::from_diagonal(self.highlight_colour.extend(1.0))
    }
}

/// Right-handed perspective projection with Vulkan's downward y axis.
pub fn vulkan_perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut projection = Mat4::perspective_rh(fov, aspect, near, far);
    projection.y_axis.y *= -1.0;
    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn resize_updates_pixel_density() {
        let config = RendererConfig::default().with_fov(90f32.to_radians());
        let mut view = ViewState::new(&config);
        view.resize(vk::Extent2D {
            width: 800,
            height: 600,
        });
        // tan(45deg) == 1, so density is half the height
        assert_relative_eq!(view.pixel_density, 300.0, epsilon = 1e-3);
    }

    #[test]
    fn zero_extent_keeps_previous_projection() {
        let mut view = ViewState::new(&RendererConfig::default());
        view.resize(vk::Extent2D {
            width: 640,
            height: 480,
        });
        let projection = view.projection;
        view.resize(vk::Extent2D::default());
        assert_eq!(view.projection, projection);
    }

    #[test]
    fn projection_flips_y() {
        let projection = vulkan_perspective(1.0, 1.0, 0.1, 100.0);
        let up = projection.project_point3(Vec3::new(0.0, 1.0, -5.0));
        assert!(up.y < 0.0);
    }
}
