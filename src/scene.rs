//! Scene render callback
//!
//! The pipeline treats scene content as opaque: a [`SceneRenderer`] records
//! draw calls into a render pass the pipeline has already opened, once per
//! cube face and once for the standard view.

use crate::projection::camera::CubeFace;
use crate::projection::target::{TARGET_COLOR_FORMAT, TARGET_DEPTH_FORMAT};

/// Color format scene pipelines must target.
pub const SCENE_COLOR_FORMAT: wgpu::TextureFormat = TARGET_COLOR_FORMAT;

/// Depth format scene pipelines must target.
pub const SCENE_DEPTH_FORMAT: wgpu::TextureFormat = TARGET_DEPTH_FORMAT;

/// Everything a scene needs to draw one view.
///
/// The camera sits at the world origin looking along a cube axis (or along
/// the free camera's direction for the standard view), further rotated by
/// the current orientation. Scenes bind the camera uniform with
/// [`SceneView::bind_camera`].
pub struct SceneView<'a, 'pass> {
    pass: &'a mut wgpu::RenderPass<'pass>,
    camera_bind_group: &'a wgpu::BindGroup,
    camera_offset: u32,
    face: Option<CubeFace>,
    target_size: (u32, u32),
}

impl<'a, 'pass> SceneView<'a, 'pass> {
    pub(crate) fn new(
        pass: &'a mut wgpu::RenderPass<'pass>,
        camera_bind_group: &'a wgpu::BindGroup,
        camera_offset: u32,
        face: Option<CubeFace>,
        target_size: (u32, u32),
    ) -> Self {
        Self {
            pass,
            camera_bind_group,
            camera_offset,
            face,
            target_size,
        }
    }

    /// The open render pass to record into.
    pub fn pass(&mut self) -> &mut wgpu::RenderPass<'pass> {
        &mut *self.pass
    }

    /// Bind the camera uniform for this view at bind group `index`.
    pub fn bind_camera(&mut self, index: u32) {
        self.pass
            .set_bind_group(index, self.camera_bind_group, &[self.camera_offset]);
    }

    /// Cube face being drawn, or `None` for the standard view.
    pub fn face(&self) -> Option<CubeFace> {
        self.face
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }
}

/// External scene content.
pub trait SceneRenderer: Send {
    /// Background for a view. Transparent unless overridden.
    fn clear_color(&self, _face: Option<CubeFace>) -> wgpu::Color {
        wgpu::Color::TRANSPARENT
    }

    /// Upload per-frame data. Called once per frame before any view is drawn.
    fn prepare(&mut self, _device: &wgpu::Device, _queue: &wgpu::Queue) {}

    /// Record draws for one view.
    fn render(&mut self, view: &mut SceneView<'_, '_>);
}

/// Reborrow an optional scene for a single call.
pub(crate) fn reborrow<'s>(scene: &'s mut Option<&mut dyn SceneRenderer>) -> Option<&'s mut dyn SceneRenderer> {
    match scene {
        Some(scene) => {
            let scene: &'s mut dyn SceneRenderer = &mut **scene;
            Some(scene)
        }
        None => None,
    }
}

/// A scene that draws nothing and clears every view to one color.
#[derive(Debug, Clone, Copy)]
pub struct SolidColorScene {
    pub color: wgpu::Color,
}

impl SolidColorScene {
    pub fn new(color: wgpu::Color) -> Self {
        Self { color }
    }
}

impl SceneRenderer for SolidColorScene {
    fn clear_color(&self, _face: Option<CubeFace>) -> wgpu::Color {
        self.color
    }

    fn render(&mut self, _view: &mut SceneView<'_, '_>) {}
}

/// A scene that clears each cube face to its own color.
///
/// Useful for checking face orientation and seams of the reprojections.
#[derive(Debug, Clone, Copy)]
pub struct FaceColorScene {
    pub colors: [wgpu::Color; 6],
    pub standard: wgpu::Color,
}

impl Default for FaceColorScene {
    fn default() -> Self {
        Self {
            colors: [
                wgpu::Color { r: 1.0, g: 0.0, b: 0.0, a: 1.0 },
                wgpu::Color { r: 0.0, g: 1.0, b: 1.0, a: 1.0 },
                wgpu::Color { r: 0.0, g: 1.0, b: 0.0, a: 1.0 },
                wgpu::Color { r: 1.0, g: 0.0, b: 1.0, a: 1.0 },
                wgpu::Color { r: 0.0, g: 0.0, b: 1.0, a: 1.0 },
                wgpu::Color { r: 1.0, g: 1.0, b: 0.0, a: 1.0 },
            ],
            standard: wgpu::Color::BLACK,
        }
    }
}

impl SceneRenderer for FaceColorScene {
    fn clear_color(&self, face: Option<CubeFace>) -> wgpu::Color {
        match face {
            Some(face) => self.colors[face.index()],
            None => self.standard,
        }
    }

    fn render(&mut self, _view: &mut SceneView<'_, '_>) {}
}

/// Convert a clear color to RGBA8 bytes as stored in the targets.
pub fn color_to_rgba8(color: wgpu::Color) -> [u8; 4] {
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(color.r), channel(color.g), channel(color.b), channel(color.a)]
}
