//! Orbit camera producing Vulkan-convention matrices.

use glam::{Mat4, Vec3};

/// Camera orbiting a target point at a fixed distance.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    /// Rotation around the world Y axis, in radians.
    pub yaw: f32,
    /// Elevation above the XZ plane, in radians.
    pub pitch: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 3.0,
            yaw: 0.0,
            pitch: 0.4,
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl OrbitCamera {
    /// Maximum pitch magnitude, just short of straight up or down.
    pub const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

    /// Camera position in world space.
    pub fn eye(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let offset = Vec3::new(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch);
        self.target + self.distance * offset
    }

    /// Rotate by the given yaw and pitch deltas, clamping pitch.
    pub fn orbit(&mut self, yaw: f32, pitch: f32) {
        self.yaw = (self.yaw + yaw) % std::f32::consts::TAU;
        self.pitch = (self.pitch + pitch).clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    /// Move closer or further, never closer than the near plane.
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance + delta).max(self.near * 2.0);
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    /// Perspective projection with Y pointing down in clip space.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let aspect = aspect.max(f32::EPSILON);
        let mut projection = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        projection.y_axis.y *= -1.0;
        projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn eye_sits_at_distance_from_target() {
        let camera = OrbitCamera {
            target: Vec3::new(1.0, 0.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            ..Default::default()
        };
        let eye = camera.eye();
        assert_relative_eq!(eye.x, 1.0);
        assert_relative_eq!(eye.y, 0.0);
        assert_relative_eq!(eye.z, 3.0);
    }

    #[test]
    fn target_projects_to_screen_center() {
        let camera = OrbitCamera::default();
        let clip = camera.projection(16.0 / 9.0) * camera.view() * camera.target.extend(1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
        let depth = clip.z / clip.w;
        assert!((0.0..=1.0).contains(&depth));
    }

    #[test]
    fn clip_space_y_points_down() {
        let camera = OrbitCamera {
            pitch: 0.0,
            ..Default::default()
        };
        let above = camera.target + Vec3::Y * 0.5;
        let clip = camera.projection(1.0) * camera.view() * above.extend(1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = OrbitCamera::default();
        camera.orbit(0.0, 10.0);
        assert_relative_eq!(camera.pitch, OrbitCamera::PITCH_LIMIT);
        camera.orbit(0.0, -20.0);
        assert_relative_eq!(camera.pitch, -OrbitCamera::PITCH_LIMIT);
    }

    #[test]
    fn zoom_stops_before_near_plane() {
        let mut camera = OrbitCamera::default();
        camera.zoom(-100.0);
        assert_relative_eq!(camera.distance, camera.near * 2.0);
    }
}
