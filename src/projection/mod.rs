//! Projection rendering pipeline
//!
//! Cube capture of an opaque scene followed by GPU reprojection into the
//! panorama, fisheye domemaster and skybox cross targets.
//!
//! ```text
//! controls ─► orientation ─► cube capture ─► equirect ─► fisheye ─► fill
//!                                 │
//!                                 └────────► skybox preview
//! ```

pub mod camera;
pub mod controls;
pub mod cube_capture;
pub mod equirect;
pub mod fisheye;
pub mod free_camera;
pub mod fullscreen;
pub mod mapping;
pub mod mipmap;
pub mod orientation;
pub mod pipeline;
pub mod skybox;
pub mod standard;
pub mod target;

pub use camera::{CameraOrientation, CubeFace, CAMERA_TABLE};
pub use controls::{ControlSnapshot, ProjectionControls};
pub use cube_capture::{CameraSlots, CameraUniform, CubeCaptureRenderer, CubeTexture};
pub use orientation::{OrientationState, Quaternion};
pub use pipeline::{FrameReport, PipelineConfig, ProjectionPipeline, TargetSource};
pub use target::{GpuHandleLedger, RenderTarget, TargetDimensions};

use serde::{Deserialize, Serialize};

/// Which projection is displayed or transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ViewSelection {
    #[default]
    Fisheye,
    Equirectangular,
    Cubemap,
    Standard,
}

impl ViewSelection {
    pub const ALL: [ViewSelection; 4] = [
        ViewSelection::Fisheye,
        ViewSelection::Equirectangular,
        ViewSelection::Cubemap,
        ViewSelection::Standard,
    ];

    /// Next view in cycling order.
    pub fn next(self) -> Self {
        match self {
            ViewSelection::Fisheye => ViewSelection::Equirectangular,
            ViewSelection::Equirectangular => ViewSelection::Cubemap,
            ViewSelection::Cubemap => ViewSelection::Standard,
            ViewSelection::Standard => ViewSelection::Fisheye,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ViewSelection::Fisheye => "Fisheye",
            ViewSelection::Equirectangular => "Equirectangular",
            ViewSelection::Cubemap => "Cubemap",
            ViewSelection::Standard => "Standard",
        }
    }

    /// Whether outputs may receive this view. The skybox cross is a
    /// preview and is never read back.
    pub fn is_transferable(self) -> bool {
        !matches!(self, ViewSelection::Cubemap)
    }

    pub(crate) fn to_index(self) -> u8 {
        match self {
            ViewSelection::Fisheye => 0,
            ViewSelection::Equirectangular => 1,
            ViewSelection::Cubemap => 2,
            ViewSelection::Standard => 3,
        }
    }

    pub(crate) fn from_index(index: u8) -> Self {
        match index {
            1 => ViewSelection::Equirectangular,
            2 => ViewSelection::Cubemap,
            3 => ViewSelection::Standard,
            _ => ViewSelection::Fisheye,
        }
    }
}

/// Errors raised while building or running projection stages.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("GPU allocation failed for {label}: {source}")]
    Allocation {
        label: String,
        #[source]
        source: wgpu::Error,
    },
    #[error("shader compilation failed for {label}: {source}")]
    ShaderCompile {
        label: String,
        #[source]
        source: wgpu::Error,
    },
}

/// Result of running one projection stage for a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The stage wrote its target.
    Rendered,
    /// The stage had nothing to do this frame (missing input or allocation failure).
    Skipped,
    /// The stage is permanently disabled.
    Disabled,
}

/// Consecutive failures between repeated warnings.
pub(crate) const FAILURE_LOG_INTERVAL: u64 = 300;

/// Whether the `count`th consecutive failure should be logged.
pub(crate) fn should_log_failure(count: u64) -> bool {
    count == 1 || count % FAILURE_LOG_INTERVAL == 0
}

/// Run `f` inside wgpu error scopes and report allocation failures.
///
/// Out-of-memory and validation errors raised while `f` runs are returned
/// instead of reaching the device's uncaptured error handler.
pub(crate) fn allocation_scope<T>(
    device: &wgpu::Device,
    label: &str,
    f: impl FnOnce() -> T,
) -> Result<T, ProjectionError> {
    let value = scoped(device, f);
    match value {
        (value, None) => Ok(value),
        (_, Some(source)) => Err(ProjectionError::Allocation {
            label: label.to_string(),
            source,
        }),
    }
}

/// Like [`allocation_scope`] but reports a shader or pipeline failure.
pub(crate) fn shader_scope<T>(
    device: &wgpu::Device,
    label: &str,
    f: impl FnOnce() -> T,
) -> Result<T, ProjectionError> {
    match scoped(device, f) {
        (value, None) => Ok(value),
        (_, Some(source)) => Err(ProjectionError::ShaderCompile {
            label: label.to_string(),
            source,
        }),
    }
}

fn scoped<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (value, validation.or(out_of_memory))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_cycle_visits_every_view() {
        let mut view = ViewSelection::default();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(view);
            view = view.next();
        }
        assert_eq!(view, ViewSelection::Fisheye);
        assert_eq!(seen, ViewSelection::ALL.to_vec());
    }

    #[test]
    fn test_view_index_round_trip() {
        for view in ViewSelection::ALL {
            assert_eq!(ViewSelection::from_index(view.to_index()), view);
        }
        assert_eq!(ViewSelection::from_index(200), ViewSelection::Fisheye);
    }

    #[test]
    fn test_failure_warnings_are_rate_limited() {
        let logged: Vec<u64> = (1..=900).filter(|&n| should_log_failure(n)).collect();
        assert_eq!(logged, vec![1, 300, 600, 900]);
        assert!(!should_log_failure(0));
    }

    #[test]
    fn test_only_the_skybox_is_preview_only() {
        let transferable: Vec<_> = ViewSelection::ALL.into_iter().filter(|v| v.is_transferable()).collect();
        assert_eq!(
            transferable,
            vec![ViewSelection::Fisheye, ViewSelection::Equirectangular, ViewSelection::Standard]
        );
    }
}
