//! Cube map to equirectangular panorama (2R x R)

use super::cube_capture::CubeTexture;
use super::fullscreen::{linear_sampler, sampler_entry, texture_entry, FullscreenPipeline};
use super::target::{RenderTarget, TARGET_COLOR_FORMAT};
use super::PassOutcome;
use crate::shaders;

pub struct EquirectReprojector {
    pass: Option<(FullscreenPipeline, wgpu::Sampler)>,
}

impl EquirectReprojector {
    pub fn new(device: &wgpu::Device) -> Self {
        let pass = match FullscreenPipeline::new(
            device,
            "Equirect Reprojection",
            shaders::EQUIRECT,
            &[texture_entry(0, wgpu::TextureViewDimension::Cube), sampler_entry(1)],
            TARGET_COLOR_FORMAT,
        ) {
            Ok(pipeline) => {
                let sampler = linear_sampler(
                    device,
                    "Equirect Cube Sampler",
                    wgpu::AddressMode::ClampToEdge,
                    wgpu::AddressMode::ClampToEdge,
                );
                Some((pipeline, sampler))
            }
            Err(e) => {
                tracing::error!("Equirect reprojection disabled: {}", e);
                None
            }
        };
        Self { pass }
    }

    pub fn is_disabled(&self) -> bool {
        self.pass.is_none()
    }

    /// Sample the cube along each panorama pixel's direction into `target`.
    pub fn render(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        cube: Option<&CubeTexture>,
        target: &RenderTarget,
    ) -> PassOutcome {
        let Some((pipeline, sampler)) = &self.pass else {
            return PassOutcome::Disabled;
        };
        let Some(cube) = cube else {
            return PassOutcome::Skipped;
        };

        let bind_group = pipeline.create_bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(cube.cube_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        );
        pipeline.draw(encoder, target.view(), &bind_group);
        PassOutcome::Rendered
    }
}
