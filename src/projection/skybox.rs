//! Cube map to cross-layout preview (2R x 3R/2)
//!
//! Preview only. Outputs never read this target, and a disabled skybox pass
//! leaves every other projection running.

use super::cube_capture::CubeTexture;
use super::fullscreen::{linear_sampler, sampler_entry, texture_entry, FullscreenPipeline};
use super::target::{RenderTarget, TARGET_COLOR_FORMAT};
use super::PassOutcome;
use crate::shaders;

pub struct SkyboxReprojector {
    pass: Option<(FullscreenPipeline, wgpu::Sampler)>,
}

impl SkyboxReprojector {
    pub fn new(device: &wgpu::Device) -> Self {
        let pass = FullscreenPipeline::new(
            device,
            "Skybox Preview",
            shaders::SKYBOX,
            &[texture_entry(0, wgpu::TextureViewDimension::Cube), sampler_entry(1)],
            TARGET_COLOR_FORMAT,
        )
        .map(|pipeline| {
            let sampler = linear_sampler(
                device,
                "Skybox Cube Sampler",
                wgpu::AddressMode::ClampToEdge,
                wgpu::AddressMode::ClampToEdge,
            );
            (pipeline, sampler)
        })
        .map_err(|e| tracing::warn!("Skybox preview disabled: {}", e))
        .ok();

        Self { pass }
    }

    pub fn is_disabled(&self) -> bool {
        self.pass.is_none()
    }

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
