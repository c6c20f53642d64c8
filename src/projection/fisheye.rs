//! Panorama to fisheye domemaster (R x R)
//!
//! Two passes: the equidistant fisheye reprojection of the panorama into a
//! scratch target, then the fill pass that scales the circle about the
//! center by the size percentage into the output target.

use super::fullscreen::{linear_sampler, sampler_entry, texture_entry, uniform_entry, FullscreenPipeline};
use super::mapping::{clamp_fov_degrees, clamp_size_percentage};
use super::target::{RenderTarget, TARGET_COLOR_FORMAT};
use super::{PassOutcome, ProjectionError};
use crate::shaders;

/// Uniform block shared by the fisheye and fill shaders (one vec4).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PassParams {
    values: [f32; 4],
}

struct FisheyePasses {
    fisheye: FullscreenPipeline,
    fill: FullscreenPipeline,
    panorama_sampler: wgpu::Sampler,
    fill_sampler: wgpu::Sampler,
    fisheye_params: wgpu::Buffer,
    fill_params: wgpu::Buffer,
}

impl FisheyePasses {
    fn new(device: &wgpu::Device) -> Result<Self, ProjectionError> {
        let entries = [
            texture_entry(0, wgpu::TextureViewDimension::D2),
            sampler_entry(1),
            uniform_entry(2),
        ];
        let fisheye = FullscreenPipeline::new(device, "Fisheye Reprojection", shaders::FISHEYE, &entries, TARGET_COLOR_FORMAT)?;
        let fill = FullscreenPipeline::new(device, "Fisheye Fill", shaders::FILL, &entries, TARGET_COLOR_FORMAT)?;

        // Longitude wraps across the panorama seam
        let panorama_sampler = linear_sampler(
            device,
            "Fisheye Panorama Sampler",
            wgpu::AddressMode::Repeat,
            wgpu::AddressMode::ClampToEdge,
        );
        let fill_sampler = linear_sampler(
            device,
            "Fisheye Fill Sampler",
            wgpu::AddressMode::ClampToEdge,
            wgpu::AddressMode::ClampToEdge,
        );

        let params_buffer = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: std::mem::size_of::<PassParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Ok(Self {
            fisheye,
            fill,
            panorama_sampler,
            fill_sampler,
            fisheye_params: params_buffer("Fisheye Params"),
            fill_params: params_buffer("Fill Params"),
        })
    }
}

pub struct FisheyeReprojector {
    passes: Option<FisheyePasses>,
}

impl FisheyeReprojector {
    pub fn new(device: &wgpu::Device) -> Self {
        let passes = match FisheyePasses::new(device) {
            Ok(passes) => Some(passes),
            Err(e) => {
                tracing::error!("Fisheye reprojection disabled: {}", e);
                None
            }
        };
        Self { passes }
    }

    pub fn is_disabled(&self) -> bool {
        self.passes.is_none()
    }

    /// Reproject `panorama` into `scratch`, then fill `output` from it.
    ///
    /// `fov_degrees` is clamped to [0, 360] and `size_percentage` to [0, 100].
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        panorama: Option<&RenderTarget>,
        scratch: &RenderTarget,
        output: &RenderTarget,
        fov_degrees: f32,
        size_percentage: f32,
    ) -> PassOutcome {
        let Some(passes) = &self.passes else {
            return PassOutcome::Disabled;
        };
        let Some(panorama) = panorama else {
            return PassOutcome::Skipped;
        };

        let fov = clamp_fov_degrees(fov_degrees).to_radians();
        let scale = clamp_size_percentage(size_percentage) / 100.0;
        queue.write_buffer(
            &passes.fisheye_params,
            0,
            bytemuck::bytes_of(&PassParams { values: [fov, 0.0, 0.0, 0.0] }),
        );
        queue.write_buffer(
            &passes.fill_params,
            0,
            bytemuck::bytes_of(&PassParams { values: [scale, 0.0, 0.0, 0.0] }),
        );

        let fisheye_group = passes.fisheye.create_bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(panorama.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&passes.panorama_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: passes.fisheye_params.as_entire_binding(),
                },
            ],
        );
        passes.fisheye.draw(encoder, scratch.view(), &fisheye_group);

        let fill_group = passes.fill.create_bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(scratch.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&passes.fill_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: passes.fill_params.as_entire_binding(),
                },
            ],
        );
        passes.fill.draw(encoder, output.view(), &fill_group);

        PassOutcome::Rendered
    }
}
