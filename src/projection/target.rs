//! Render targets and GPU handle accounting
//!
//! Every texture the projection pipeline allocates is wrapped in a
//! [`TrackedTexture`] that reports creation and release to a shared
//! [`GpuHandleLedger`]. Dropping the wrapper destroys the GPU texture right
//! away, so replacing a target never keeps two generations alive at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Color format of every projection target.
pub const TARGET_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Depth format shared by cube faces and the standard view.
pub const TARGET_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Counts GPU handles created and released by the pipeline.
#[derive(Debug, Default)]
pub struct GpuHandleLedger {
    created: AtomicU64,
    released: AtomicU64,
    peak_live: AtomicU64,
}

impl GpuHandleLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record_created(&self) {
        let created = self.created.fetch_add(1, Ordering::AcqRel) + 1;
        let live = created.saturating_sub(self.released.load(Ordering::Acquire));
        self.peak_live.fetch_max(live, Ordering::AcqRel);
    }

    fn record_released(&self) {
        self.released.fetch_add(1, Ordering::AcqRel);
    }

    /// Total handles ever created.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }

    /// Total handles released.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }

    /// Handles currently alive.
    pub fn live(&self) -> u64 {
        self.created().saturating_sub(self.released())
    }

    /// Highest number of simultaneously live handles observed.
    pub fn peak_live(&self) -> u64 {
        self.peak_live.load(Ordering::Acquire)
    }
}

/// Proof of one live GPU handle. Releases itself exactly once on drop.
#[derive(Debug)]
pub struct HandleToken {
    ledger: Arc<GpuHandleLedger>,
}

impl HandleToken {
    pub fn new(ledger: &Arc<GpuHandleLedger>) -> Self {
        ledger.record_created();
        Self {
            ledger: Arc::clone(ledger),
        }
    }
}

impl Drop for HandleToken {
    fn drop(&mut self) {
        self.ledger.record_released();
    }
}

/// A texture whose lifetime is reported to the ledger.
#[derive(Debug)]
pub struct TrackedTexture {
    texture: wgpu::Texture,
    _token: HandleToken,
}

impl TrackedTexture {
    pub fn new(device: &wgpu::Device, desc: &wgpu::TextureDescriptor<'_>, ledger: &Arc<GpuHandleLedger>) -> Self {
        let texture = device.create_texture(desc);
        Self {
            texture,
            _token: HandleToken::new(ledger),
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

impl Drop for TrackedTexture {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// A 2D color target with an optional depth attachment.
#[derive(Debug)]
pub struct RenderTarget {
    // Views are declared before their textures so they drop first
    color_view: wgpu::TextureView,
    depth_view: Option<wgpu::TextureView>,
    color: TrackedTexture,
    depth: Option<TrackedTexture>,
    width: u32,
    height: u32,
}

impl RenderTarget {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        with_depth: bool,
        ledger: &Arc<GpuHandleLedger>,
    ) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let color = TrackedTexture::new(
            device,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
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
        let color_view = color.texture().create_view(&wgpu::TextureViewDescriptor::default());

        let depth = with_depth.then(|| {
            TrackedTexture::new(
                device,
                &wgpu::TextureDescriptor {
                    label: Some(&format!("{} Depth", label)),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: TARGET_DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                },
                ledger,
            )
        });
        let depth_view = depth
            .as_ref()
            .map(|d| d.texture().create_view(&wgpu::TextureViewDescriptor::default()));

        Self {
            color_view,
            depth_view,
            color,
            depth,
            width,
            height,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        self.color.texture()
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.color_view
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth_view.as_ref()
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Smallest and largest accepted cube resolution.
pub const MIN_RESOLUTION: u32 = 64;
pub const MAX_RESOLUTION: u32 = 8192;

/// Clamp a requested resolution and round it down to an even value so the
/// skybox cross divides into whole cells.
pub fn normalize_resolution(resolution: u32) -> u32 {
    resolution.clamp(MIN_RESOLUTION, MAX_RESOLUTION) & !1
}

/// Largest cube resolution whose `2R`-wide panorama and skybox fit within a
/// device's `max_texture_dimension_2d`.
pub fn max_resolution_for_limit(max_texture_dimension_2d: u32) -> u32 {
    (max_texture_dimension_2d / 2).clamp(MIN_RESOLUTION, MAX_RESOLUTION) & !1
}

/// [`normalize_resolution`], further capped at `max_resolution`.
pub fn clamp_resolution(resolution: u32, max_resolution: u32) -> u32 {
    normalize_resolution(resolution).min(max_resolution) & !1
}

/// Dimensions of every resolution-dependent target for cube resolution `R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDimensions {
    pub cube: u32,
    pub panorama: (u32, u32),
    pub fisheye: (u32, u32),
    pub skybox: (u32, u32),
}

impl TargetDimensions {
    pub fn for_resolution(resolution: u32) -> Self {
        let r = resolution;
        Self {
            cube: r,
            panorama: (2 * r, r),
            fisheye: (r, r),
            skybox: (2 * r, r * 3 / 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_counts_each_release_once() {
        let ledger = GpuHandleLedger::new();
        let tokens: Vec<HandleToken> = (0..5).map(|_| HandleToken::new(&ledger)).collect();
        assert_eq!(ledger.created(), 5);
        assert_eq!(ledger.live(), 5);

        drop(tokens);
        assert_eq!(ledger.released(), 5);
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_ledger_peak_when_released_before_recreate() {
        let ledger = GpuHandleLedger::new();
        let mut generation: Vec<HandleToken> = (0..4).map(|_| HandleToken::new(&ledger)).collect();

        // Release the old generation first, then allocate the new one
        generation.clear();
        generation.extend((0..4).map(|_| HandleToken::new(&ledger)));

        assert_eq!(ledger.live(), 4);
        assert_eq!(ledger.peak_live(), 4);
        assert_eq!(ledger.released(), 4);
    }

    #[test]
    fn test_target_dimensions() {
        let dims = TargetDimensions::for_resolution(1024);
        assert_eq!(dims.cube, 1024);
        assert_eq!(dims.panorama, (2048, 1024));
        assert_eq!(dims.fisheye, (1024, 1024));
        assert_eq!(dims.skybox, (2048, 1536));
    }

    #[test]
    fn test_normalize_resolution() {
        assert_eq!(normalize_resolution(1024), 1024);
        assert_eq!(normalize_resolution(1023), 1022);
        assert_eq!(normalize_resolution(1), MIN_RESOLUTION);
        assert_eq!(normalize_resolution(100_000), MAX_RESOLUTION);
    }

    #[test]
    fn test_max_resolution_follows_the_texture_limit() {
        // Common desktop limit: a 2R-wide target must stay within 8192
        assert_eq!(max_resolution_for_limit(8192), 4096);
        assert_eq!(max_resolution_for_limit(16384), MAX_RESOLUTION);
        assert_eq!(max_resolution_for_limit(32768), MAX_RESOLUTION);
        assert_eq!(max_resolution_for_limit(8190), 4094);
        assert_eq!(max_resolution_for_limit(8191), 4094);
        assert_eq!(max_resolution_for_limit(0), MIN_RESOLUTION);

        let max = max_resolution_for_limit(8192);
        let dims = TargetDimensions::for_resolution(max);
        assert!(dims.panorama.0 <= 8192 && dims.skybox.0 <= 8192 && dims.skybox.1 <= 8192);
    }

    #[test]
    fn test_clamp_resolution() {
        assert_eq!(clamp_resolution(8192, 4096), 4096);
        assert_eq!(clamp_resolution(1023, 4096), 1022);
        assert_eq!(clamp_resolution(10, 4096), MIN_RESOLUTION);
        assert_eq!(clamp_resolution(8192, MAX_RESOLUTION), MAX_RESOLUTION);
    }
}
