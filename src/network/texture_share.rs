//! GPU texture sharing (the zero-copy output path)
//!
//! A sharer receives the selected projection as a GPU texture each frame
//! and never goes through CPU readback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::transfer::TransportError;

/// Platform-agnostic texture sharing interface.
pub trait TextureSharer: Send {
    /// Name shown in logs and statistics.
    fn name(&self) -> &str;

    /// Publish the current frame of `texture`.
    ///
    /// Called on the render thread after the projection was encoded and
    /// before the encoder is submitted.
    fn publish_texture(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
    ) -> Result<(), TransportError>;

    /// Check if any receivers are connected.
    fn has_receivers(&self) -> bool {
        true
    }

    /// Frames published so far.
    fn frames_published(&self) -> u64;

    /// Stop sharing and release resources.
    fn stop(&mut self);

    /// Technology name for display.
    fn technology_name(&self) -> &'static str {
        platform_technology_name()
    }
}

/// Get the platform-specific technology name.
#[cfg(target_os = "macos")]
pub fn platform_technology_name() -> &'static str {
    "Syphon"
}

#[cfg(target_os = "windows")]
pub fn platform_technology_name() -> &'static str {
    "Spout"
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn platform_technology_name() -> &'static str {
    "Texture Share"
}

/// Read side of a [`GpuTextureMirror`] for consumers on the same device.
#[derive(Debug, Clone)]
pub struct MirrorHandle {
    texture: Arc<Mutex<Option<Arc<wgpu::Texture>>>>,
    frames: Arc<AtomicU64>,
}

impl MirrorHandle {
    /// The most recently published texture.
    pub fn texture(&self) -> Option<Arc<wgpu::Texture>> {
        self.texture.lock().clone()
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

/// Shares a projection with in-process consumers through a GPU-side copy.
pub struct GpuTextureMirror {
    name: String,
    handle: MirrorHandle,
    size: (u32, u32),
    active: bool,
}

impl GpuTextureMirror {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: MirrorHandle {
                texture: Arc::new(Mutex::new(None)),
                frames: Arc::new(AtomicU64::new(0)),
            },
            size: (0, 0),
            active: true,
        }
    }

    pub fn handle(&self) -> MirrorHandle {
        self.handle.clone()
    }

    fn ensure_texture(&mut self, device: &wgpu::Device, texture: &wgpu::Texture, width: u32, height: u32) -> Arc<wgpu::Texture> {
        if self.size == (width, height) {
            if let Some(existing) = self.handle.texture() {
                return existing;
            }
        }

        tracing::info!("{} '{}': sharing {}x{}", self.technology_name(), self.name, width, height);
        let mirror = Arc::new(device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Shared {}", self.name)),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture.format(),
            usage: wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        }));
        *self.handle.texture.lock() = Some(Arc::clone(&mirror));
        self.size = (width, height);
        mirror
    }
}

impl TextureSharer for GpuTextureMirror {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish_texture(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
    ) -> Result<(), TransportError> {
        if !self.active {
            return Err(TransportError::NotInitialized);
        }

        let mirror = self.ensure_texture(device, texture, width, height);
        encoder.copy_texture_to_texture(
            texture.as_image_copy(),
            mirror.as_image_copy(),
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.handle.frames.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn frames_published(&self) -> u64 {
        self.handle.frames()
    }

    fn stop(&mut self) {
        self.active = false;
        *self.handle.texture.lock() = None;
        self.size = (0, 0);
    }
}
