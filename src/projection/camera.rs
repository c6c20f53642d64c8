//! Fixed camera table for cube-face capture
//!
//! Six view bases with the eye at the origin, one per cube face. The order
//! matches wgpu's cube array-layer convention (+X, −X, +Y, −Y, +Z, −Z), so
//! the face index doubles as the array layer the face is rendered into.

use glam::{Mat4, Vec3};

/// Near clipping plane for cube faces.
pub const NEAR: f32 = 0.01;

/// Far clipping plane for cube faces (dome scale, not physical scale).
pub const FAR: f32 = 10_000_000.0;

/// Vertical and horizontal field of view of a single cube face.
pub const FACE_FOV: f32 = std::f32::consts::FRAC_PI_2;

/// A fixed view basis for one cube face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraOrientation {
    /// Direction the face camera looks along
    pub look: Vec3,
    /// Up vector of the face camera
    pub up: Vec3,
}

impl CameraOrientation {
    /// View matrix for this face with the eye at the origin.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(Vec3::ZERO, self.look, self.up)
    }
}

/// The six cube-face view bases in array-layer order.
///
/// The up vectors follow the classic cube-map layout where texel row 0 of a
/// side face looks toward +Y. [`face_projection`] flips NDC Y so that wgpu's
/// top-left framebuffer origin lands those rows where cube sampling expects.
pub const CAMERA_TABLE: [CameraOrientation; 6] = [
    CameraOrientation { look: Vec3::new(1.0, 0.0, 0.0), up: Vec3::new(0.0, -1.0, 0.0) },
    CameraOrientation { look: Vec3::new(-1.0, 0.0, 0.0), up: Vec3::new(0.0, -1.0, 0.0) },
    CameraOrientation { look: Vec3::new(0.0, 1.0, 0.0), up: Vec3::new(0.0, 0.0, 1.0) },
    CameraOrientation { look: Vec3::new(0.0, -1.0, 0.0), up: Vec3::new(0.0, 0.0, -1.0) },
    CameraOrientation { look: Vec3::new(0.0, 0.0, 1.0), up: Vec3::new(0.0, -1.0, 0.0) },
    CameraOrientation { look: Vec3::new(0.0, 0.0, -1.0), up: Vec3::new(0.0, -1.0, 0.0) },
];

/// Look up the orientation of cube face `i`.
///
/// Indices wrap modulo six.
pub fn orientation(i: usize) -> CameraOrientation {
    CAMERA_TABLE[i % CAMERA_TABLE.len()]
}

/// Cube faces in array-layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// All faces in capture order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Array layer of this face in the cube texture.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Fixed view basis of this face.
    pub fn orientation(self) -> CameraOrientation {
        CAMERA_TABLE[self.index()]
    }

    /// Short label for GPU debug markers.
    pub fn label(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "+X",
            CubeFace::NegativeX => "-X",
            CubeFace::PositiveY => "+Y",
            CubeFace::NegativeY => "-Y",
            CubeFace::PositiveZ => "+Z",
            CubeFace::NegativeZ => "-Z",
        }
    }

    /// Face whose major axis dominates `dir`.
    ///
    /// Ties resolve in favor of X, then Y, matching GPU face selection.
    pub fn from_direction(dir: Vec3) -> CubeFace {
        let a = dir.abs();
        if a.x >= a.y && a.x >= a.z {
            if dir.x >= 0.0 { CubeFace::PositiveX } else { CubeFace::NegativeX }
        } else if a.y >= a.z {
            if dir.y >= 0.0 { CubeFace::PositiveY } else { CubeFace::NegativeY }
        } else if dir.z >= 0.0 {
            CubeFace::PositiveZ
        } else {
            CubeFace::NegativeZ
        }
    }
}

/// Projection shared by all cube faces.
///
/// 90° square frustum with NDC Y flipped. The flip reverses triangle winding,
/// so scene pipelines drawn into cube faces should not cull back faces.
pub fn face_projection() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * Mat4::perspective_rh(FACE_FOV, 1.0, NEAR, FAR)
}

/// View matrices of all six faces for a capture rotated by `rotation`.
///
/// Each face sees the world through `view_face * rotation`, so world
/// direction `d` lands at the centre of the face whose look vector is
/// `rotation * d`.
pub fn face_view_matrices(rotation: Mat4) -> [Mat4; 6] {
    std::array::from_fn(|i| CAMERA_TABLE[i].view_matrix() * rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::mapping::equirect_direction;
    use crate::projection::orientation::Quaternion;
    use std::f32::consts::FRAC_PI_2;

    /// Face whose centre pixel shows world direction `dir`.
    fn face_at_center(views: &[Mat4; 6], dir: Vec3) -> Option<CubeFace> {
        let proj = face_projection();
        CubeFace::ALL.into_iter().find(|face| {
            let clip = proj * views[face.index()] * (dir * 10.0).extend(1.0);
            clip.w > 0.0 && (clip.x / clip.w).abs() < 1e-4 && (clip.y / clip.w).abs() < 1e-4
        })
    }

    fn rotation(pitch: f32, yaw: f32, roll: f32) -> Mat4 {
        Quaternion::from_pitch_yaw_roll(pitch, yaw, roll).to_rotation_matrix()
    }

    const EPS: f32 = 1e-6;

    #[test]
    fn test_camera_table_is_orthonormal() {
        for (i, face) in CAMERA_TABLE.iter().enumerate() {
            assert!((face.look.length() - 1.0).abs() < EPS, "face {} look not unit", i);
            assert!((face.up.length() - 1.0).abs() < EPS, "face {} up not unit", i);
            assert!(face.look.dot(face.up).abs() < EPS, "face {} up not orthogonal", i);

            // Look must be an axis vector: exactly one non-zero component
            let non_zero = face.look.to_array().iter().filter(|c| c.abs() > EPS).count();
            assert_eq!(non_zero, 1, "face {} look is not axis aligned", i);
        }
    }

    #[test]
    fn test_face_order_matches_layers() {
        for face in CubeFace::ALL {
            let look = face.orientation().look;
            assert_eq!(CubeFace::from_direction(look), face);
            assert_eq!(orientation(face.index()), face.orientation());
        }
        assert_eq!(orientation(6), orientation(0));
    }

    #[test]
    fn test_face_projection_maps_look_to_center() {
        let proj = face_projection();
        for face in CubeFace::ALL {
            let view = face.orientation().view_matrix();
            let clip = proj * view * (face.orientation().look * 10.0).extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "{:?} -> {:?}", face, ndc);
        }
    }

    #[test]
    fn test_side_face_top_row_looks_up_the_y_axis() {
        // Row 0 (NDC y = +1) of the +X face sees +Y, as cube sampling expects
        let proj = face_projection();
        let view = CubeFace::PositiveX.orientation().view_matrix();
        let clip = proj * view * glam::Vec4::new(1.0, 0.9, 0.0, 1.0);
        assert!(clip.y / clip.w > 0.5);

        // Column 0 (NDC x = -1) of the +X face sees +Z
        let clip = proj * view * glam::Vec4::new(1.0, 0.0, 0.9, 1.0);
        assert!(clip.x / clip.w < -0.5);
    }

    #[test]
    fn test_identity_rotation_keeps_the_table() {
        let views = face_view_matrices(Mat4::IDENTITY);
        for face in CubeFace::ALL {
            assert_eq!(views[face.index()], face.orientation().view_matrix());
        }
        assert_eq!(face_at_center(&views, equirect_direction(0.5, 0.5)), Some(CubeFace::PositiveY));
        assert_eq!(face_at_center(&views, equirect_direction(0.75, 0.5)), Some(CubeFace::PositiveX));
    }

    #[test]
    fn test_yaw_turns_the_capture_about_z() {
        let rotation = rotation(0.0, FRAC_PI_2, 0.0);
        let views = face_view_matrices(rotation);

        // Panorama +X (u = 0.75) and back (u = 0) after a quarter turn
        let right = equirect_direction(0.75, 0.5);
        let back = equirect_direction(0.0, 0.5);
        assert_eq!(face_at_center(&views, right), Some(CubeFace::PositiveY));
        assert_eq!(face_at_center(&views, back), Some(CubeFace::PositiveX));

        // Rotating in view space instead spins each face about its own centre
        let swapped: [Mat4; 6] = std::array::from_fn(|i| rotation * CAMERA_TABLE[i].view_matrix());
        assert_eq!(face_at_center(&swapped, right), Some(CubeFace::PositiveX));

        for dir in [right, back, equirect_direction(0.5, 0.0)] {
            let expected = CubeFace::from_direction(rotation.transform_vector3(dir));
            assert_eq!(face_at_center(&views, dir), Some(expected), "{:?}", dir);
        }
    }

    #[test]
    fn test_pitch_tilts_the_capture_about_x() {
        let rotation = rotation(FRAC_PI_2, 0.0, 0.0);
        let views = face_view_matrices(rotation);

        let front = equirect_direction(0.5, 0.5);
        let nadir = equirect_direction(0.5, 1.0);
        assert_eq!(face_at_center(&views, front), Some(CubeFace::PositiveZ));
        assert_eq!(face_at_center(&views, nadir), Some(CubeFace::PositiveY));
    }
}
