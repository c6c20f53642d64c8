//! GPU device setup
//!
//! `GpuContext` owns the instance, adapter, device and queue. It can be created
//! against a window (for the desktop viewer) or headless (for offline rendering
//! and tests). `WindowGpuContext` holds the per-window surface.

use std::sync::Arc;

use winit::window::Window;

#[derive(Debug, thiserror::Error)]
pub enum GpuInitError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

// ═══════════════════════════════════════════════════════════════════════════════
// GPU CONTEXT: shared GPU resources
// ═══════════════════════════════════════════════════════════════════════════════

pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a context whose adapter can present to `surface`.
    pub async fn for_surface(instance: wgpu::Instance, surface: &wgpu::Surface<'_>) -> Result<Self, GpuInitError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuInitError::NoAdapter)?;

        Self::with_adapter(instance, adapter).await
    }

    /// Create a context without any surface.
    pub async fn headless() -> Result<Self, GpuInitError> {
        let instance = create_instance();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuInitError::NoAdapter)?;

        Self::with_adapter(instance, adapter).await
    }

    /// Blocking wrapper around [`GpuContext::headless`].
    pub fn new_headless() -> Result<Self, GpuInitError> {
        pollster::block_on(Self::headless())
    }

    async fn with_adapter(instance: wgpu::Instance, adapter: wgpu::Adapter) -> Result<Self, GpuInitError> {
        let info = adapter.get_info();
        tracing::info!("Using GPU: {}", info.name);
        tracing::info!("Backend: {:?}", info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Domecast Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error: wgpu::Error| {
            tracing::error!("Uncaptured GPU error: {}", error);
        }));

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

pub fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// WINDOW GPU CONTEXT: per-window surface
// ═══════════════════════════════════════════════════════════════════════════════

pub struct WindowGpuContext {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

impl WindowGpuContext {
    /// Create the GPU context and the surface for `window` together.
    pub async fn create(window: Arc<Window>) -> Result<(GpuContext, Self), GpuInitError> {
        let size = window.inner_size();
        let instance = create_instance();
        let surface = instance.create_surface(window)?;
        let gpu = GpuContext::for_surface(instance, &surface).await?;

        let caps = surface.get_capabilities(&gpu.adapter);
        let format = preferred_surface_format(&caps.formats).ok_or(GpuInitError::NoSurfaceFormat)?;
        tracing::info!("Surface format: {:?}", format);

        // Frame pacing is done by the event loop
        let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };
        surface.configure(&gpu.device, &config);

        Ok((gpu, Self { surface, config }))
    }

    pub fn resize(&mut self, gpu: &GpuContext, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&gpu.device, &self.config);
        }
    }

    /// Reconfigure after the surface was lost or became outdated.
    pub fn reconfigure(&self, gpu: &GpuContext) {
        self.surface.configure(&gpu.device, &self.config);
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

/// Projection targets hold display-ready bytes, so a non-sRGB surface is
/// preferred to avoid a second encode on present.
pub fn preferred_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .find(|f| !f.is_srgb())
        .or_else(|| formats.first())
        .copied()
}
