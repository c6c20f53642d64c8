//! Embedded WGSL shaders
//!
//! Reprojection passes share the fullscreen-triangle vertex stage in
//! `fullscreen.wgsl`; [`fullscreen_pass`] prepends it to a fragment module.

use std::borrow::Cow;
use std::path::PathBuf;

/// Fullscreen triangle vertex stage and shared constants
pub const FULLSCREEN: &str = include_str!("fullscreen.wgsl");
/// Mip chain downsampling
pub const MIPMAP: &str = include_str!("mipmap.wgsl");
/// Cube map to equirectangular panorama
pub const EQUIRECT: &str = include_str!("equirect.wgsl");
/// Panorama to fisheye domemaster
pub const FISHEYE: &str = include_str!("fisheye.wgsl");
/// Fisheye size/fill pass
pub const FILL: &str = include_str!("fill.wgsl");
/// Cube map to cross-layout preview
pub const SKYBOX: &str = include_str!("skybox.wgsl");
/// Window presentation blit
pub const PRESENT: &str = include_str!("present.wgsl");
/// Demo sky sphere scene
pub const DEMO_SCENE: &str = include_str!("demo_scene.wgsl");

/// Get the path to the shaders directory in the source tree
pub fn shaders_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src").join("shaders")
}

/// Compose a fullscreen pass module from a fragment-only shader.
pub fn fullscreen_pass(fragment: &str) -> String {
    format!("{}\n{}", FULLSCREEN, fragment)
}

/// Build a shader module descriptor from WGSL source.
pub fn wgsl_descriptor<'a>(label: &'a str, source: &'a str) -> wgpu::ShaderModuleDescriptor<'a> {
    wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_shaders_define_entry_points() {
        for source in [MIPMAP, EQUIRECT, FISHEYE, FILL, SKYBOX, PRESENT] {
            assert!(source.contains("fn fs_main"));
            let composed = fullscreen_pass(source);
            assert!(composed.contains("fn vs_main"));
            assert!(composed.contains("fn fs_main"));
        }
        assert!(DEMO_SCENE.contains("fn vs_main") && DEMO_SCENE.contains("fn fs_main"));
    }

    #[test]
    fn test_shaders_dir_exists() {
        assert!(shaders_dir().join("fullscreen.wgsl").exists());
    }
}
