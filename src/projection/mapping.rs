//! Direction and texture-coordinate mappings
//!
//! CPU versions of the math the reprojection shaders run per fragment. The
//! shaders in `shaders/` must stay in sync with these functions; tests pin the
//! geometric properties here without needing a GPU.
//!
//! World convention: +Z up, +Y forward, +X right.

use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// Upper bound accepted for the fisheye field of view (degrees).
pub const MAX_FOV_DEGREES: f32 = 360.0;

/// Clamp a fill size percentage to `[0, 100]`. Non-finite input maps to 100.
pub fn clamp_size_percentage(percentage: f32) -> f32 {
    if percentage.is_finite() {
        percentage.clamp(0.0, 100.0)
    } else {
        100.0
    }
}

/// Clamp a fisheye field of view to `[0, 360]` degrees. Non-finite input maps to 180.
pub fn clamp_fov_degrees(fov: f32) -> f32 {
    if fov.is_finite() {
        fov.clamp(0.0, MAX_FOV_DEGREES)
    } else {
        180.0
    }
}

/// Direction for panorama coordinate `(u, v)`.
///
/// `u = 0.5` faces +Y, `v = 0` is the zenith.
pub fn equirect_direction(u: f32, v: f32) -> Vec3 {
    let lon = (u - 0.5) * TAU;
    let lat = (0.5 - v) * PI;
    Vec3::new(lat.cos() * lon.sin(), lat.cos() * lon.cos(), lat.sin())
}

/// Panorama coordinate for a direction. Inverse of [`equirect_direction`].
pub fn direction_to_equirect(dir: Vec3) -> Vec2 {
    let dir = dir.normalize_or_zero();
    let lon = dir.x.atan2(dir.y);
    let lat = dir.z.clamp(-1.0, 1.0).asin();
    Vec2::new(lon / TAU + 0.5, 0.5 - lat / PI)
}

/// Direction for fisheye coordinate `(u, v)` under an equidistant mapping.
///
/// The zenith sits at the image center and the front (+Y) at the bottom
/// edge. Returns `None` outside the unit circle.
pub fn fisheye_direction(u: f32, v: f32, fov_degrees: f32) -> Option<Vec3> {
    let p = Vec2::new(2.0 * u - 1.0, 1.0 - 2.0 * v);
    let r = p.length();
    if r > 1.0 {
        return None;
    }
    if r < 1e-6 {
        return Some(Vec3::Z);
    }

    let theta = r * clamp_fov_degrees(fov_degrees).to_radians() * 0.5;
    let s = theta.sin();
    Some(Vec3::new(s * p.x / r, -s * p.y / r, theta.cos()))
}

/// Panorama coordinate sampled by fisheye pixel `(u, v)`.
pub fn fisheye_source_uv(u: f32, v: f32, fov_degrees: f32) -> Option<Vec2> {
    fisheye_direction(u, v, fov_degrees).map(direction_to_equirect)
}

/// Source coordinate read by the fill pass for output coordinate `uv`.
///
/// The source image is scaled by `size_percentage / 100` about the center.
/// Returns `None` where the output is transparent.
pub fn fill_source_uv(uv: Vec2, size_percentage: f32) -> Option<Vec2> {
    let scale = clamp_size_percentage(size_percentage) / 100.0;
    if scale <= 0.0 {
        return None;
    }
    let src = (uv - Vec2::splat(0.5)) / scale + Vec2::splat(0.5);
    if src.cmplt(Vec2::ZERO).any() || src.cmpgt(Vec2::ONE).any() {
        return None;
    }
    Some(src)
}

/// Direction for skybox cross coordinate `(u, v)`.
///
/// Layout is four columns by three rows. The middle row holds −X, +Y (front),
/// +X, −Y; +Z sits above the front cell and −Z below it. Cells outside the
/// cross return `None`.
pub fn skybox_direction(u: f32, v: f32) -> Option<Vec3> {
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
        return None;
    }
    let cu = u * 4.0;
    let cv = v * 3.0;
    let col = (cu.floor() as i32).min(3);
    let row = (cv.floor() as i32).min(2);
    let a = (cu - col as f32) * 2.0 - 1.0;
    let b = 1.0 - (cv - row as f32) * 2.0;

    let dir = match (row, col) {
        (0, 1) => Vec3::new(a, -b, 1.0),
        (1, 0) => Vec3::new(-1.0, a, b),
        (1, 1) => Vec3::new(a, 1.0, b),
        (1, 2) => Vec3::new(1.0, -a, b),
        (1, 3) => Vec3::new(-a, -1.0, b),
        (2, 1) => Vec3::new(a, b, -1.0),
        _ => return None,
    };
    Some(dir.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::camera::CubeFace;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_equirect_seam_is_continuous() {
        for i in 0..=32 {
            let v = i as f32 / 32.0;
            let left = equirect_direction(0.0, v);
            let right = equirect_direction(1.0, v);
            assert!(close(left, right), "seam mismatch at v={}: {:?} vs {:?}", v, left, right);
        }
    }

    #[test]
    fn test_equirect_axes() {
        assert!(close(equirect_direction(0.5, 0.5), Vec3::Y));
        assert!(close(equirect_direction(0.75, 0.5), Vec3::X));
        assert!(close(equirect_direction(0.25, 0.5), -Vec3::X));
        assert!(close(equirect_direction(0.5, 0.0), Vec3::Z));
        assert!(close(equirect_direction(0.5, 1.0), -Vec3::Z));
    }

    #[test]
    fn test_equirect_inverse() {
        for &(u, v) in &[(0.1, 0.3), (0.5, 0.5), (0.9, 0.8), (0.33, 0.66)] {
            let uv = direction_to_equirect(equirect_direction(u, v));
            assert!((uv.x - u).abs() < 1e-4 && (uv.y - v).abs() < 1e-4, "({}, {}) -> {:?}", u, v, uv);
        }
    }

    #[test]
    fn test_fisheye_center_is_zenith() {
        assert_eq!(fisheye_direction(0.5, 0.5, 180.0), Some(Vec3::Z));
    }

    #[test]
    fn test_fisheye_front_is_at_bottom() {
        // Bottom edge at 180° fov lands on the horizon, facing front
        let dir = fisheye_direction(0.5, 1.0, 180.0).unwrap_or(Vec3::ZERO);
        assert!(close(dir, Vec3::Y), "{:?}", dir);
        let dir = fisheye_direction(1.0, 0.5, 180.0).unwrap_or(Vec3::ZERO);
        assert!(close(dir, Vec3::X), "{:?}", dir);
    }

    #[test]
    fn test_fisheye_outside_circle_is_transparent() {
        assert!(fisheye_direction(0.0, 0.0, 210.0).is_none());
        assert!(fisheye_direction(1.0, 1.0, 210.0).is_none());
        assert!(fisheye_direction(0.5, 0.01, 210.0).is_some());
    }

    #[test]
    fn test_fisheye_is_equidistant() {
        // Radius scales linearly with the polar angle from the zenith
        let fov = 240.0_f32;
        for i in 1..10 {
            let r = i as f32 / 10.0;
            let dir = fisheye_direction(0.5 + r * 0.5, 0.5, fov).unwrap_or(Vec3::ZERO);
            let theta = dir.z.clamp(-1.0, 1.0).acos();
            assert!((theta - r * fov.to_radians() * 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_fill_half_size_halves_diameter() {
        let n = 512;
        let measure = |pct: f32| -> (usize, f32) {
            let mut count = 0;
            let mut sum = 0.0;
            for i in 0..n {
                let u = (i as f32 + 0.5) / n as f32;
                let uv = Vec2::new(u, 0.5);
                let visible = fill_source_uv(uv, pct)
                    .and_then(|src| fisheye_direction(src.x, src.y, 210.0))
                    .is_some();
                if visible {
                    count += 1;
                    sum += u;
                }
            }
            (count, sum / count.max(1) as f32)
        };

        let (full, full_center) = measure(100.0);
        let (half, half_center) = measure(50.0);
        assert_eq!(full, n);
        assert!((half as i32 - (n / 2) as i32).abs() <= 2, "half diameter {}", half);
        assert!((full_center - 0.5).abs() < 1e-3);
        assert!((half_center - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_fill_clamps_percentage() {
        assert_eq!(clamp_size_percentage(150.0), 100.0);
        assert_eq!(clamp_size_percentage(-3.0), 0.0);
        assert_eq!(clamp_size_percentage(f32::NAN), 100.0);
        assert!(fill_source_uv(Vec2::splat(0.5), 0.0).is_none());
        let src = fill_source_uv(Vec2::new(0.2, 0.7), 250.0).unwrap_or(Vec2::ZERO);
        assert!((src - Vec2::new(0.2, 0.7)).length() < 1e-6);
    }

    #[test]
    fn test_skybox_cells_match_faces() {
        let center = |col: f32, row: f32| ((col + 0.5) / 4.0, (row + 0.5) / 3.0);
        let cases = [
            ((1.0, 0.0), CubeFace::PositiveZ),
            ((0.0, 1.0), CubeFace::NegativeX),
            ((1.0, 1.0), CubeFace::PositiveY),
            ((2.0, 1.0), CubeFace::PositiveX),
            ((3.0, 1.0), CubeFace::NegativeY),
            ((1.0, 2.0), CubeFace::NegativeZ),
        ];
        for ((col, row), face) in cases {
            let (u, v) = center(col, row);
            let dir = skybox_direction(u, v).unwrap_or(Vec3::ZERO);
            assert_eq!(CubeFace::from_direction(dir), face, "cell ({}, {})", col, row);
        }

        let (u, v) = center(0.0, 0.0);
        assert!(skybox_direction(u, v).is_none());
        let (u, v) = center(3.0, 2.0);
        assert!(skybox_direction(u, v).is_none());
    }

    #[test]
    fn test_skybox_edges_are_continuous() {
        // Shared edge between front and top cells
        let front_top = skybox_direction(0.375, 1.0 / 3.0 + 1e-4).unwrap_or(Vec3::ZERO);
        let top_bottom = skybox_direction(0.375, 1.0 / 3.0 - 1e-4).unwrap_or(Vec3::ZERO);
        assert!((front_top - top_bottom).length() < 1e-2);

        // Shared edge between front and right cells
        let front_right = skybox_direction(0.5 - 1e-4, 0.5).unwrap_or(Vec3::ZERO);
        let right_left = skybox_direction(0.5 + 1e-4, 0.5).unwrap_or(Vec3::ZERO);
        assert!((front_right - right_left).length() < 1e-2);
    }
}
