//! Mip chain generation for the cube texture
//!
//! wgpu has no built-in mipmap generation, so each level is produced by a
//! linear-filtered blit from the level above, per array layer.

use super::fullscreen::{sampler_entry, texture_entry, FullscreenPipeline};
use super::target::TARGET_COLOR_FORMAT;
use super::ProjectionError;
use crate::shaders;

/// Number of mip levels for a square texture of side `size`: `floor(log2 size) + 1`.
pub fn mip_level_count(size: u32) -> u32 {
    32 - size.max(1).leading_zeros()
}

pub struct MipmapGenerator {
    blit: FullscreenPipeline,
    sampler: wgpu::Sampler,
}

impl MipmapGenerator {
    pub fn new(device: &wgpu::Device) -> Result<Self, ProjectionError> {
        let blit = FullscreenPipeline::new(
            device,
            "Mipmap Blit",
            shaders::MIPMAP,
            &[texture_entry(0, wgpu::TextureViewDimension::D2), sampler_entry(1)],
            TARGET_COLOR_FORMAT,
        )?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mipmap Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self { blit, sampler })
    }

    /// Fill mip levels `1..mip_count` of every layer from level 0.
    pub fn generate(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        layer_count: u32,
        mip_count: u32,
    ) {
        for layer in 0..layer_count {
            for mip in 1..mip_count {
                let src = level_view(texture, layer, mip - 1);
                let dst = level_view(texture, layer, mip);

                let bind_group = self.blit.create_bind_group(
                    device,
                    &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&src),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                );
                self.blit.draw(encoder, &dst, &bind_group);
            }
        }
    }
}

fn level_view(texture: &wgpu::Texture, layer: u32, mip: u32) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("Mip Level View"),
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_mip_level: mip,
        mip_level_count: Some(1),
        base_array_layer: layer,
        array_layer_count: Some(1),
        ..Default::default()
    })
}
