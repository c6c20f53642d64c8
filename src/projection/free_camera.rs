//! Orbit camera for the standard view
//!
//! Spherical coordinates around a target point in the Z-up world. At zero
//! yaw and pitch the camera sits behind the target looking along +Y, the
//! same forward direction the dome faces.

use glam::{Mat4, Vec3};

use super::camera::FAR;

/// Default orbit distance in world units
pub const DEFAULT_DISTANCE: f32 = 1500.0;
pub const MIN_DISTANCE: f32 = 100.0;
pub const MAX_DISTANCE: f32 = 5000.0;

/// Radians per pixel of mouse drag
pub const DRAG_SENSITIVITY: f32 = 0.005;

const PITCH_LIMIT: f32 = 1.4;

/// Orbit camera for the standard view
#[derive(Debug, Clone)]
pub struct FreeCamera {
    /// Horizontal angle in radians
    yaw: f32,
    /// Elevation in radians, clamped short of the poles
    pitch: f32,
    /// Distance from target point
    distance: f32,
    /// Point the camera orbits around
    target: Vec3,
    /// Aspect ratio (width/height) for projection
    aspect: f32,
    /// Field of view in radians
    fov: f32,
    near: f32,
    far: f32,
}

impl FreeCamera {
    pub fn new(aspect: f32) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: DEFAULT_DISTANCE,
            target: Vec3::ZERO,
            aspect,
            fov: 60f32.to_radians(),
            near: 1.0,
            far: FAR,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye_position(), self.target, Vec3::Z)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    /// Calculate camera position from spherical coordinates
    pub fn eye_position(&self) -> Vec3 {
        let x = self.distance * self.pitch.cos() * self.yaw.sin();
        let y = -self.distance * self.pitch.cos() * self.yaw.cos();
        let z = self.distance * self.pitch.sin();
        self.target + Vec3::new(x, y, z)
    }

    /// Orbit by a mouse drag delta in pixels
    pub fn on_mouse_drag(&mut self, delta: (f32, f32)) {
        self.yaw += delta.0 * DRAG_SENSITIVITY;
        self.pitch = (self.pitch + delta.1 * DRAG_SENSITIVITY).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Zoom by scroll lines; positive moves closer
    pub fn on_scroll(&mut self, delta: f32) {
        self.distance = (self.distance * (1.0 - delta * 0.1)).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn reset(&mut self) {
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.distance = DEFAULT_DISTANCE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_looks_forward() {
        let camera = FreeCamera::new(16.0 / 9.0);
        let eye = camera.eye_position();
        assert!((eye - Vec3::new(0.0, -DEFAULT_DISTANCE, 0.0)).length() < 1e-3);

        // Target projects to the view center
        let clip = camera.projection_matrix() * camera.view_matrix() * Vec3::ZERO.extend(1.0);
        assert!((clip.x / clip.w).abs() < 1e-4);
        assert!((clip.y / clip.w).abs() < 1e-4);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut camera = FreeCamera::new(1.0);
        for _ in 0..100 {
            camera.on_scroll(5.0);
        }
        assert_eq!(camera.distance(), MIN_DISTANCE);
        for _ in 0..100 {
            camera.on_scroll(-5.0);
        }
        assert_eq!(camera.distance(), MAX_DISTANCE);
    }

    #[test]
    fn test_drag_clamps_pitch() {
        let mut camera = FreeCamera::new(1.0);
        camera.on_mouse_drag((100.0, 10_000.0));
        assert!((camera.yaw() - 0.5).abs() < 1e-6);
        assert_eq!(camera.pitch(), PITCH_LIMIT);
        camera.reset();
        assert_eq!(camera.pitch(), 0.0);
        assert_eq!(camera.distance(), DEFAULT_DISTANCE);
    }
}
