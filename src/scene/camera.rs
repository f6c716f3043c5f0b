// Free-fly camera
//
// Angles are kept in degrees. Yaw -90 looks down -Z.

use glam::{Mat4, Vec3};

use crate::config::CameraConfig;
use crate::input::{Action, InputState};

pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 100.0;
const PITCH_LIMIT: f32 = 89.0;

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub speed: f32,
    pub turn_speed: f32,
    pub fov_y: f32,
}

impl Camera {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            position: Vec3::from(config.position),
            yaw: -90.0,
            pitch: 0.0,
            speed: config.speed,
            turn_speed: config.turn_speed,
            fov_y: config.fov_y,
        }
    }

    pub fn front(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.front().cross(Vec3::Y).normalize()
    }

    /// Apply held keys over `dt` seconds
    pub fn update(&mut self, input: &InputState, dt: f32) {
        self.yaw += input.axis(Action::YawRight, Action::YawLeft) * self.turn_speed * dt;
        self.pitch = (self.pitch + input.axis(Action::PitchUp, Action::PitchDown) * self.turn_speed * dt)
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);

        let step = self.speed * dt;
        self.position += self.front() * input.axis(Action::Forward, Action::Back) * step;
        self.position += self.right() * input.axis(Action::Right, Action::Left) * step;
        self.position += Vec3::Y * input.axis(Action::Up, Action::Down) * step;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front(), Vec3::Y)
    }

    /// Perspective projection with Y flipped for Vulkan clip space
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y.to_radians(), aspect, Z_NEAR, Z_FAR);
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::from_config(&CameraConfig::default())
    }

    #[test]
    fn default_camera_looks_down_negative_z() {
        let front = camera().front();
        assert!((front - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn forward_moves_along_view_direction() {
        let mut cam = camera();
        let mut input = InputState::default();
        input.press(Action::Forward);
        cam.update(&input, 1.0);
        assert!((cam.position - Vec3::new(0.0, 0.0, 3.0 - cam.speed)).length() < 1e-4);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = camera();
        let mut input = InputState::default();
        input.press(Action::PitchUp);
        for _ in 0..10 {
            cam.update(&input, 1.0);
        }
        assert_eq!(cam.pitch, PITCH_LIMIT);
    }

    #[test]
    fn projection_flips_y() {
        let cam = camera();
        let proj = cam.projection(1.0);
        let gl = Mat4::perspective_rh(cam.fov_y.to_radians(), 1.0, Z_NEAR, Z_FAR);
        assert_eq!(proj.y_axis.y, -gl.y_axis.y);
        assert_eq!(proj.x_axis.x, gl.x_axis.x);
    }

    #[test]
    fn origin_projects_to_screen_centre() {
        let cam = camera();
        let clip = cam.projection(4.0 / 3.0) * cam.view() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
