//! Orientation quaternion and per-frame damping
//!
//! Pitch, yaw and roll are folded into one unit quaternion that rotates every
//! cube face uniformly. The quaternion is rebuilt from the control angles each
//! frame and SLERPed toward that target so abrupt input is smoothed.

use glam::{Mat4, Vec3, Vec4};

/// Angles below this are treated as identical orientations in [`Quaternion::slerp`].
const SLERP_EPSILON: f32 = 1e-6;

/// A rotation quaternion `{x, y, z, w}`.
///
/// All operations are pure and return a new value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians about `axis`.
    ///
    /// The axis is normalized first; a zero axis yields the identity.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize_or_zero();
        let (s, c) = (angle * 0.5).sin_cos();
        Self {
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
            w: if axis == Vec3::ZERO { 1.0 } else { c },
        }
    }

    /// Hamilton product `self * q` (applies `q` first, then `self`).
    pub fn multiply(&self, q: &Quaternion) -> Self {
        Self {
            w: self.w * q.w - self.x * q.x - self.y * q.y - self.z * q.z,
            x: self.w * q.x + self.x * q.w + self.y * q.z - self.z * q.y,
            y: self.w * q.y - self.x * q.z + self.y * q.w + self.z * q.x,
            z: self.w * q.z + self.x * q.y - self.y * q.x + self.z * q.w,
        }
    }

    pub fn dot(&self, q: &Quaternion) -> f32 {
        self.x * q.x + self.y * q.y + self.z * q.z + self.w * q.w
    }

    pub fn magnitude(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit-length copy. A zero quaternion is returned unchanged.
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag == 0.0 || !mag.is_finite() {
            return *self;
        }
        Self {
            x: self.x / mag,
            y: self.y / mag,
            z: self.z / mag,
            w: self.w / mag,
        }
    }

    fn negate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, -self.w)
    }

    /// Spherical interpolation from `self` toward `target` by `t`.
    ///
    /// Takes the shorter arc. When the two orientations are closer than
    /// [`SLERP_EPSILON`] radians the start value is returned as is.
    pub fn slerp(&self, target: &Quaternion, t: f32) -> Self {
        let mut end = *target;
        let mut cos_theta = self.dot(target);
        if cos_theta < 0.0 {
            end = end.negate();
            cos_theta = -cos_theta;
        }

        let theta = cos_theta.clamp(-1.0, 1.0).acos();
        if theta < SLERP_EPSILON {
            return *self;
        }

        let sin_theta = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin_theta;
        let b = (t * theta).sin() / sin_theta;

        Self {
            x: a * self.x + b * end.x,
            y: a * self.y + b * end.y,
            z: a * self.z + b * end.z,
            w: a * self.w + b * end.w,
        }
        .normalize()
    }

    /// Right-handed, column-major rotation matrix.
    pub fn to_rotation_matrix(&self) -> Mat4 {
        let Quaternion { x, y, z, w } = *self;
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);

        Mat4::from_cols(
            Vec4::new(1.0 - 2.0 * (yy + zz), 2.0 * (xy + wz), 2.0 * (xz - wy), 0.0),
            Vec4::new(2.0 * (xy - wz), 1.0 - 2.0 * (xx + zz), 2.0 * (yz + wx), 0.0),
            Vec4::new(2.0 * (xz + wy), 2.0 * (yz - wx), 1.0 - 2.0 * (xx + yy), 0.0),
            Vec4::W,
        )
    }

    /// Target orientation for the given control angles (radians).
    ///
    /// Composed as yaw (about Z) ∘ roll (about Y) ∘ pitch (about X).
    pub fn from_pitch_yaw_roll(pitch: f32, yaw: f32, roll: f32) -> Self {
        let q_pitch = Self::from_axis_angle(Vec3::X, pitch);
        let q_roll = Self::from_axis_angle(Vec3::Y, roll);
        let q_yaw = Self::from_axis_angle(Vec3::Z, yaw);
        q_yaw.multiply(&q_roll).multiply(&q_pitch).normalize()
    }
}

/// Current orientation plus the damping applied each frame.
#[derive(Debug, Clone)]
pub struct OrientationState {
    current: Quaternion,
    damping: f32,
}

impl Default for OrientationState {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl OrientationState {
    /// `damping` is the SLERP factor per frame; 1.0 snaps to the target.
    pub fn new(damping: f32) -> Self {
        Self {
            current: Quaternion::IDENTITY,
            damping: sanitize_damping(damping),
        }
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.damping = sanitize_damping(damping);
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    /// Advance one frame toward the orientation described by the angles.
    pub fn update(&mut self, pitch: f32, yaw: f32, roll: f32) -> Quaternion {
        let target = Quaternion::from_pitch_yaw_roll(pitch, yaw, roll);
        self.current = self.current.slerp(&target, self.damping);
        self.current
    }

    pub fn current(&self) -> Quaternion {
        self.current
    }

    pub fn matrix(&self) -> Mat4 {
        self.current.to_rotation_matrix()
    }
}

fn sanitize_damping(damping: f32) -> f32 {
    if damping.is_finite() {
        damping.clamp(0.0, 1.0)
    } else {
        1.0
    }
}
