//! Cube capture renderer
//!
//! Renders the scene six times per frame, once into each layer of a single
//! cube texture, through per-face attachment views. Every face shares one
//! orientation quaternion and one depth texture. The mip chain is generated
//! once after the sixth face.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use super::camera::{face_projection, face_view_matrices, CubeFace};
use super::controls::ControlSnapshot;
use super::mipmap::{mip_level_count, MipmapGenerator};
use super::orientation::{OrientationState, Quaternion};
use super::target::{GpuHandleLedger, TrackedTexture, TARGET_COLOR_FORMAT, TARGET_DEPTH_FORMAT};
use super::{allocation_scope, should_log_failure, PassOutcome};
use crate::scene::{SceneRenderer, SceneView};

/// Camera data visible to scene shaders (bind group slot, dynamic offset).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
}

impl CameraUniform {
    pub fn new(view: Mat4, proj: Mat4, eye: Vec4) -> Self {
        Self {
            view_proj: (proj * view).to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            eye: eye.to_array(),
        }
    }
}

/// Number of camera slots: six cube faces plus the standard view.
pub const CAMERA_SLOT_COUNT: usize = 7;

/// Slot used by the standard (free camera) view.
pub const STANDARD_CAMERA_SLOT: usize = 6;

/// Uniform buffer holding one [`CameraUniform`] per view, addressed with
/// dynamic offsets so a single bind group serves every face.
pub struct CameraSlots {
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    stride: u64,
}

impl CameraSlots {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_size = std::mem::size_of::<CameraUniform>() as u64;
        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = uniform_size.div_ceil(alignment) * alignment;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Slots"),
            size: stride * CAMERA_SLOT_COUNT as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(uniform_size),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(uniform_size),
                }),
            }],
        });

        Self {
            buffer,
            layout,
            bind_group,
            stride,
        }
    }

    /// Layout scene pipelines use for the camera bind group.
    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Dynamic offset of `slot`.
    pub fn offset(&self, slot: usize) -> u32 {
        (self.stride * slot as u64) as u32
    }

    pub fn write(&self, queue: &wgpu::Queue, slot: usize, uniform: &CameraUniform) {
        queue.write_buffer(&self.buffer, self.offset(slot) as u64, bytemuck::bytes_of(uniform));
    }
}

/// One cube texture with per-face attachment views and a shared depth buffer.
pub struct CubeTexture {
    cube_view: wgpu::TextureView,
    face_views: [wgpu::TextureView; 6],
    depth_view: wgpu::TextureView,
    color: TrackedTexture,
    _depth: TrackedTexture,
    resolution: u32,
    mip_level_count: u32,
}

impl CubeTexture {
    pub fn new(device: &wgpu::Device, resolution: u32, with_mips: bool, ledger: &Arc<GpuHandleLedger>) -> Self {
        let mip_level_count = if with_mips { mip_level_count(resolution) } else { 1 };

        let color = TrackedTexture::new(
            device,
            &wgpu::TextureDescriptor {
                label: Some("Cube Capture Texture"),
                size: wgpu::Extent3d {
                    width: resolution,
                    height: resolution,
                    depth_or_array_layers: 6,
                },
                mip_level_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_COLOR_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            },
            ledger,
        );

        let cube_view = color.texture().create_view(&wgpu::TextureViewDescriptor {
            label: Some("Cube Capture View"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });

        let face_views = std::array::from_fn(|i| {
            color.texture().create_view(&wgpu::TextureViewDescriptor {
                label: Some(&format!("Cube Face {}", CubeFace::ALL[i].label())),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_mip_level: 0,
                mip_level_count: Some(1),
                base_array_layer: i as u32,
                array_layer_count: Some(1),
                ..Default::default()
            })
        });

        let depth = TrackedTexture::new(
            device,
            &wgpu::TextureDescriptor {
                label: Some("Cube Capture Depth"),
                size: wgpu::Extent3d {
                    width: resolution,
                    height: resolution,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            },
            ledger,
        );
        let depth_view = depth.texture().create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            cube_view,
            face_views,
            depth_view,
            color,
            _depth: depth,
            resolution,
            mip_level_count,
        }
    }

    /// Cube view for sampling in reprojection shaders.
    pub fn cube_view(&self) -> &wgpu::TextureView {
        &self.cube_view
    }

    /// Mip 0 attachment view of one face.
    pub fn face_view(&self, face: CubeFace) -> &wgpu::TextureView {
        &self.face_views[face.index()]
    }

    pub fn texture(&self) -> &wgpu::Texture {
        self.color.texture()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }
}

/// Renders the scene into the cube texture each frame.
pub struct CubeCaptureRenderer {
    cube: Option<CubeTexture>,
    resolution: u32,
    mipmaps: Option<MipmapGenerator>,
    orientation: OrientationState,
    ledger: Arc<GpuHandleLedger>,
    allocation_failures: u64,
    /// Failures since the last successful allocation
    consecutive_failures: u64,
}

impl CubeCaptureRenderer {
    pub fn new(device: &wgpu::Device, resolution: u32, damping: f32, ledger: Arc<GpuHandleLedger>) -> Self {
        let mipmaps = match MipmapGenerator::new(device) {
            Ok(generator) => Some(generator),
            Err(e) => {
                tracing::error!("Cube capture: mipmap generation disabled: {}", e);
                None
            }
        };

        let mut renderer = Self {
            cube: None,
            resolution,
            mipmaps,
            orientation: OrientationState::new(damping),
            ledger,
            allocation_failures: 0,
            consecutive_failures: 0,
        };
        renderer.allocate(device);
        renderer
    }

    fn allocate(&mut self, device: &wgpu::Device) -> bool {
        let with_mips = self.mipmaps.is_some();
        let resolution = self.resolution;
        let ledger = Arc::clone(&self.ledger);

        match allocation_scope(device, "cube texture", || CubeTexture::new(device, resolution, with_mips, &ledger)) {
            Ok(cube) => {
                tracing::info!(
                    resolution,
                    mip_levels = cube.mip_level_count(),
                    "Cube capture: allocated {}x{} cube texture",
                    resolution,
                    resolution
                );
                self.consecutive_failures = 0;
                self.cube = Some(cube);
                true
            }
            Err(e) => {
                self.allocation_failures += 1;
                self.consecutive_failures += 1;
                if should_log_failure(self.consecutive_failures) {
                    tracing::warn!(
                        failures = self.consecutive_failures,
                        "Cube capture: {}; retrying next frame",
                        e
                    );
                }
                false
            }
        }
    }

    /// Release the current cube and allocate one at `resolution`.
    ///
    /// The old texture is destroyed before the new one is created.
    pub fn resize(&mut self, device: &wgpu::Device, resolution: u32) {
        if resolution == self.resolution && self.cube.is_some() {
            return;
        }
        self.cube = None;
        self.resolution = resolution;
        self.allocate(device);
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.orientation.set_damping(damping);
    }

    /// Render all six faces and rebuild the mip chain.
    ///
    /// Without a scene each face is only cleared to transparent.
    pub fn capture(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        camera: &CameraSlots,
        controls: &ControlSnapshot,
        mut scene: Option<&mut dyn SceneRenderer>,
    ) -> PassOutcome {
        self.orientation.update(controls.pitch, controls.yaw, controls.roll);

        if self.cube.is_none() && !self.allocate(device) {
            return PassOutcome::Skipped;
        }
        let Some(cube) = self.cube.as_ref() else {
            return PassOutcome::Skipped;
        };

        let views = face_view_matrices(self.orientation.matrix());
        let proj = face_projection();
        for face in CubeFace::ALL {
            camera.write(queue, face.index(), &CameraUniform::new(views[face.index()], proj, Vec4::W));
        }

        let size = cube.resolution() as f32;
        for face in CubeFace::ALL {
            let clear = scene
                .as_deref()
                .map(|s| s.clear_color(Some(face)))
                .unwrap_or(wgpu::Color::TRANSPARENT);

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(face.label()),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: cube.face_view(face),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &cube.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, size, size, 0.0, 1.0);

            if let Some(scene) = scene.as_deref_mut() {
                let mut view = SceneView::new(
                    &mut pass,
                    camera.bind_group(),
                    camera.offset(face.index()),
                    Some(face),
                    (cube.resolution(), cube.resolution()),
                );
                scene.render(&mut view);
            }
        }

        if let Some(mipmaps) = &self.mipmaps {
            mipmaps.generate(device, encoder, cube.texture(), 6, cube.mip_level_count());
        }

        PassOutcome::Rendered
    }

    /// The captured cube, if allocation has succeeded.
    pub fn cube(&self) -> Option<&CubeTexture> {
        self.cube.as_ref()
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn orientation(&self) -> Quaternion {
        self.orientation.current()
    }

    pub fn allocation_failures(&self) -> u64 {
        self.allocation_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_uniform_layout() {
        // Three mat4 and one vec4, matching the WGSL Camera struct
        assert_eq!(std::mem::size_of::<CameraUniform>(), 3 * 64 + 16);
    }

    #[test]
    fn test_camera_uniform_view_proj() {
        let view = CubeFace::PositiveY.orientation().view_matrix();
        let proj = face_projection();
        let uniform = CameraUniform::new(view, proj, Vec4::W);
        assert_eq!(uniform.view_proj, (proj * view).to_cols_array_2d());
        assert_eq!(uniform.eye, [0.0, 0.0, 0.0, 1.0]);
    }
}
