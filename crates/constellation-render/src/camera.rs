//! Camera and the per-frame camera state sent to the renderer.

use glam::{Mat4, Vec3};

/// Camera for rendering the graph.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Blend between primary (0.0) and alternate (1.0) vertex positions.
    pub morph_mix: f32,
    /// Elements with visibility outside `[visibility_low, visibility_high]`
    /// are not drawn.
    pub visibility_low: f32,
    pub visibility_high: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 10.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: 35f32.to_radians(),
            morph_mix: 0.0,
            visibility_low: 0.0,
            visibility_high: 1.0,
        }
    }
}

impl Camera {
    /// Create a camera at `position` looking at `target`.
    pub fn new(position: Vec3, target: Vec3, up: Vec3) -> Self {
        Self {
            position,
            direction: (target - position).normalize(),
            up,
            ..Self::default()
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Look at a target position.
    pub fn look_at(&mut self, target: Vec3) {
        self.direction = (target - self.position).normalize();
    }

    /// Rotate the eye about `centre` by `angle` radians around the up axis.
    pub fn orbit(&mut self, centre: Vec3, angle: f32) {
        let rotation = glam::Quat::from_axis_angle(self.up.normalize(), angle);
        self.position = centre + rotation * (self.position - centre);
        self.look_at(centre);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    /// The camera state the renderer consumes.
    pub fn update(&self) -> CameraUpdate {
        CameraUpdate {
            model_view: self.view_matrix(),
            fov: self.fov,
            morph_mix: self.morph_mix,
            visibility_low: self.visibility_low,
            visibility_high: self.visibility_high,
        }
    }
}

/// Camera state for one frame.
///
/// The projection is not included; the renderer derives it from `fov` and the
/// swap chain extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraUpdate {
    pub model_view: Mat4,
    pub fov: f32,
    pub morph_mix: f32,
    pub visibility_low: f32,
    pub visibility_high: f32,
}

impl Default for CameraUpdate {
    fn default() -> Self {
        Camera::default().update()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn view_matrix_moves_eye_to_origin() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let eye = camera.view_matrix().transform_point3(camera.position);
        assert_relative_eq!(eye.length(), 0.0, epsilon = 1e-5);

        let target = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert_relative_eq!(target.z, -5.0, epsilon = 1e-5);
    }

    #[test]
    fn orbit_keeps_distance_to_centre() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        camera.orbit(Vec3::ZERO, std::f32::consts::FRAC_PI_2);
        assert_relative_eq!(camera.position.length(), 5.0, epsilon = 1e-4);
        assert_relative_eq!(camera.position.x, 5.0, epsilon = 1e-4);
        assert_relative_eq!(camera.direction.x, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn update_carries_visibility_window() {
        let camera = Camera {
            visibility_low: 0.25,
            visibility_high: 0.75,
            ..Camera::default()
        };
        let update = camera.update();
        assert_relative_eq!(update.visibility_low, 0.25);
        assert_relative_eq!(update.visibility_high, 0.75);
    }
}
