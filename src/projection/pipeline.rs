//! Per-frame orchestration of the projection stages
//!
//! ```text
//! pending resize ─► orientation ─► cube capture ─► equirect ─► fisheye + fill
//!                                       │
//!                                       ├────────► skybox (preview)
//! standard view ◄── free camera         │
//! ```
//!
//! Stages only run when a displayed or transferred view needs them. A failed
//! or disabled stage never stops the others.

use std::sync::Arc;

use super::controls::{ControlSnapshot, ProjectionControls};
use super::cube_capture::{CameraSlots, CubeCaptureRenderer};
use super::equirect::EquirectReprojector;
use super::fisheye::FisheyeReprojector;
use super::skybox::SkyboxReprojector;
use super::standard::{StandardViewRenderer, DEFAULT_STANDARD_SIZE};
use super::target::{
    clamp_resolution, max_resolution_for_limit, normalize_resolution, GpuHandleLedger, RenderTarget, TargetDimensions,
};
use super::{allocation_scope, should_log_failure, PassOutcome, ViewSelection};
use crate::scene::{reborrow, SceneRenderer};
use crate::telemetry::FrameProfiler;
use crate::transfer::OutputManager;

/// Default cube face resolution
pub const DEFAULT_RESOLUTION: u32 = 1024;

/// Provides the render target an output reads for a view.
///
/// Returns `None` when there is nothing valid to read this frame.
pub trait TargetSource {
    fn target(&self, view: ViewSelection) -> Option<&RenderTarget>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Cube face resolution R
    pub resolution: u32,
    /// Standard view size
    pub standard_size: (u32, u32),
    /// Orientation SLERP factor per frame (1.0 snaps to the target)
    pub damping: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            standard_size: DEFAULT_STANDARD_SIZE,
            damping: 1.0,
        }
    }
}

/// Which stages a set of views requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagePlan {
    pub capture: bool,
    pub equirect: bool,
    pub fisheye: bool,
    pub skybox: bool,
    pub standard: bool,
}

impl StagePlan {
    pub fn for_views(views: &[ViewSelection]) -> Self {
        let mut plan = Self::default();
        for view in views {
            match view {
                ViewSelection::Fisheye => {
                    plan.fisheye = true;
                    plan.equirect = true;
                    plan.capture = true;
                }
                ViewSelection::Equirectangular => {
                    plan.equirect = true;
                    plan.capture = true;
                }
                ViewSelection::Cubemap => {
                    plan.skybox = true;
                    plan.capture = true;
                }
                ViewSelection::Standard => plan.standard = true,
            }
        }
        plan
    }
}

/// Outcome of every stage for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub resolution: u32,
    pub controls: ControlSnapshot,
    pub capture: PassOutcome,
    pub equirect: PassOutcome,
    pub fisheye: PassOutcome,
    pub skybox: PassOutcome,
    pub standard: PassOutcome,
}

impl FrameReport {
    /// Outcome of the stage that writes `view`.
    pub fn outcome(&self, view: ViewSelection) -> &PassOutcome {
        match view {
            ViewSelection::Fisheye => &self.fisheye,
            ViewSelection::Equirectangular => &self.equirect,
            ViewSelection::Cubemap => &self.skybox,
            ViewSelection::Standard => &self.standard,
        }
    }

    /// Whether an output may read `view` after this frame.
    pub fn is_transferable(&self, view: ViewSelection) -> bool {
        view.is_transferable() && *self.outcome(view) == PassOutcome::Rendered
    }
}

/// Reprojection targets derived from the cube resolution.
struct ProjectionTargets {
    panorama: RenderTarget,
    fisheye_scratch: RenderTarget,
    fisheye: RenderTarget,
    skybox: RenderTarget,
}

impl ProjectionTargets {
    fn new(device: &wgpu::Device, resolution: u32, ledger: &Arc<GpuHandleLedger>) -> Self {
        let dims = TargetDimensions::for_resolution(resolution);
        Self {
            panorama: RenderTarget::new(device, "Equirect Panorama", dims.panorama.0, dims.panorama.1, false, ledger),
            fisheye_scratch: RenderTarget::new(device, "Fisheye Scratch", dims.fisheye.0, dims.fisheye.1, false, ledger),
            fisheye: RenderTarget::new(device, "Fisheye Domemaster", dims.fisheye.0, dims.fisheye.1, false, ledger),
            skybox: RenderTarget::new(device, "Skybox Preview", dims.skybox.0, dims.skybox.1, false, ledger),
        }
    }
}

pub struct ProjectionPipeline {
    controls: ProjectionControls,
    ledger: Arc<GpuHandleLedger>,
    camera: CameraSlots,
    capture: CubeCaptureRenderer,
    equirect: EquirectReprojector,
    fisheye: FisheyeReprojector,
    skybox: SkyboxReprojector,
    standard: StandardViewRenderer,
    targets: Option<ProjectionTargets>,
    resolution: u32,
    max_resolution: u32,
    /// Consecutive failed target allocations
    allocation_failures: u64,
    last_report: Option<FrameReport>,
    profiler: FrameProfiler,
    frame: u64,
}

impl ProjectionPipeline {
    pub fn new(device: &wgpu::Device, config: PipelineConfig, controls: ProjectionControls) -> Self {
        let ledger = GpuHandleLedger::new();
        let max_resolution = max_resolution_for_limit(device.limits().max_texture_dimension_2d);
        controls.set_max_resolution(max_resolution);
        let resolution = clamp_resolution(config.resolution, max_resolution);
        if resolution < normalize_resolution(config.resolution) {
            tracing::warn!(
                requested = config.resolution,
                resolution,
                "Cube resolution limited by the device's maximum texture size"
            );
        }

        let camera = CameraSlots::new(device);
        let capture = CubeCaptureRenderer::new(device, resolution, config.damping, Arc::clone(&ledger));
        let equirect = EquirectReprojector::new(device);
        let fisheye = FisheyeReprojector::new(device);
        let skybox = SkyboxReprojector::new(device);
        let standard = StandardViewRenderer::new(device, config.standard_size, Arc::clone(&ledger));

        let mut pipeline = Self {
            controls,
            ledger,
            camera,
            capture,
            equirect,
            fisheye,
            skybox,
            standard,
            targets: None,
            resolution,
            max_resolution,
            allocation_failures: 0,
            last_report: None,
            profiler: FrameProfiler::new(),
            frame: 0,
        };
        pipeline.allocate_targets(device);

        tracing::info!(
            resolution,
            standard_width = config.standard_size.0,
            standard_height = config.standard_size.1,
            "Projection pipeline ready"
        );
        pipeline
    }

    fn allocate_targets(&mut self, device: &wgpu::Device) -> bool {
        let resolution = self.resolution;
        let ledger = Arc::clone(&self.ledger);
        match allocation_scope(device, "projection targets", || {
            ProjectionTargets::new(device, resolution, &ledger)
        }) {
            Ok(targets) => {
                if self.allocation_failures > 0 {
                    tracing::info!(attempts = self.allocation_failures + 1, "Projection targets allocated");
                }
                self.allocation_failures = 0;
                self.targets = Some(targets);
                true
            }
            Err(e) => {
                self.allocation_failures += 1;
                if should_log_failure(self.allocation_failures) {
                    tracing::warn!(
                        failures = self.allocation_failures,
                        "Projection targets: {}; retrying next frame",
                        e
                    );
                }
                false
            }
        }
    }

    /// Apply a pending resolution change. Every old target is released
    /// before any new one is created.
    fn apply_pending_resize(&mut self, device: &wgpu::Device) {
        let Some(requested) = self.controls.take_pending_resize() else {
            return;
        };
        let resolution = clamp_resolution(requested, self.max_resolution);
        if resolution == self.resolution {
            return;
        }

        tracing::info!(from = self.resolution, to = resolution, "Resizing projection targets");
        self.targets = None;
        self.resolution = resolution;
        self.capture.resize(device, resolution);
        self.allocate_targets(device);
    }

    /// Encode every stage `views` needs into `encoder`.
    pub fn encode_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        mut scene: Option<&mut dyn SceneRenderer>,
        views: &[ViewSelection],
    ) -> FrameReport {
        self.profiler.begin_frame();
        self.apply_pending_resize(device);
        if self.targets.is_none() {
            self.allocate_targets(device);
        }

        let controls = self.controls.snapshot();
        let plan = StagePlan::for_views(views);

        if let Some(scene) = scene.as_deref_mut() {
            scene.prepare(device, queue);
        }

        let capture = if plan.capture {
            self.capture
                .capture(device, queue, encoder, &self.camera, &controls, reborrow(&mut scene))
        } else {
            PassOutcome::Skipped
        };
        let cube = match capture {
            PassOutcome::Rendered => self.capture.cube(),
            _ => None,
        };

        let mut report = FrameReport {
            frame: self.frame,
            resolution: self.resolution,
            controls,
            capture: capture.clone(),
            equirect: PassOutcome::Skipped,
            fisheye: PassOutcome::Skipped,
            skybox: PassOutcome::Skipped,
            standard: PassOutcome::Skipped,
        };

        if let Some(targets) = &self.targets {
            if plan.equirect {
                report.equirect = self.equirect.render(device, encoder, cube, &targets.panorama);
            }
            if plan.fisheye {
                let panorama = (report.equirect == PassOutcome::Rendered).then_some(&targets.panorama);
                report.fisheye = self.fisheye.render(
                    device,
                    queue,
                    encoder,
                    panorama,
                    &targets.fisheye_scratch,
                    &targets.fisheye,
                    controls.fov_degrees,
                    controls.size_percentage,
                );
            }
            if plan.skybox {
                report.skybox = self.skybox.render(device, encoder, cube, &targets.skybox);
            }
        }

        if plan.standard {
            report.standard = self
                .standard
                .render(device, queue, encoder, &self.camera, reborrow(&mut scene));
        }

        self.frame += 1;
        self.profiler.report_every(600);
        self.last_report = Some(report.clone());
        report
    }

    /// Render one frame for the display view and every active output,
    /// submit it, and run the transfer step.
    pub fn render_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: Option<&mut dyn SceneRenderer>,
        mut outputs: Option<&mut OutputManager>,
    ) -> FrameReport {
        let mut views = vec![self.controls.view()];
        if let Some(outputs) = outputs.as_deref() {
            views.extend(outputs.needed_views());
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Projection Frame"),
        });
        let report = self.encode_frame(device, queue, &mut encoder, scene, &views);

        if let Some(outputs) = outputs.as_deref_mut() {
            outputs.capture(device, &mut encoder, &*self);
        }
        queue.submit(std::iter::once(encoder.finish()));

        if let Some(outputs) = outputs {
            outputs.process(device);
        }
        report
    }

    pub fn controls(&self) -> &ProjectionControls {
        &self.controls
    }

    /// Bind group layout scenes use for the camera uniform.
    pub fn camera_layout(&self) -> &wgpu::BindGroupLayout {
        self.camera.layout()
    }

    pub fn ledger(&self) -> &Arc<GpuHandleLedger> {
        &self.ledger
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Largest cube resolution this device supports.
    pub fn max_resolution(&self) -> u32 {
        self.max_resolution
    }

    /// Report of the most recently encoded frame.
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Render target of any view, including the skybox preview, whether
    /// or not its stage ran this frame.
    pub fn display_target(&self, view: ViewSelection) -> Option<&RenderTarget> {
        match view {
            ViewSelection::Standard => self.standard.target(),
            _ => {
                let targets = self.targets.as_ref()?;
                Some(match view {
                    ViewSelection::Fisheye => &targets.fisheye,
                    ViewSelection::Equirectangular => &targets.panorama,
                    _ => &targets.skybox,
                })
            }
        }
    }

    pub fn profiler(&self) -> &FrameProfiler {
        &self.profiler
    }

    pub fn capture_renderer(&self) -> &CubeCaptureRenderer {
        &self.capture
    }

    pub fn standard_view(&self) -> &StandardViewRenderer {
        &self.standard
    }

    pub fn standard_view_mut(&mut self) -> &mut StandardViewRenderer {
        &mut self.standard
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.capture.set_damping(damping);
    }
}

/// Outputs only see targets written by the last frame. The skybox preview
/// and skipped or disabled stages yield nothing.
impl TargetSource for ProjectionPipeline {
    fn target(&self, view: ViewSelection) -> Option<&RenderTarget> {
        if !self.last_report.as_ref()?.is_transferable(view) {
            return None;
        }
        self.display_target(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_plan_fisheye_needs_the_chain() {
        let plan = StagePlan::for_views(&[ViewSelection::Fisheye]);
        assert!(plan.capture && plan.equirect && plan.fisheye);
        assert!(!plan.skybox && !plan.standard);
    }

    #[test]
    fn test_stage_plan_standard_skips_capture() {
        let plan = StagePlan::for_views(&[ViewSelection::Standard]);
        assert_eq!(
            plan,
            StagePlan {
                standard: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_stage_plan_union() {
        let plan = StagePlan::for_views(&[ViewSelection::Cubemap, ViewSelection::Equirectangular]);
        assert!(plan.capture && plan.equirect && plan.skybox);
        assert!(!plan.fisheye);
        assert_eq!(StagePlan::for_views(&[]), StagePlan::default());
    }

    fn report(outcome: PassOutcome) -> FrameReport {
        FrameReport {
            frame: 0,
            resolution: 64,
            controls: ControlSnapshot::default(),
            capture: PassOutcome::Rendered,
            equirect: outcome.clone(),
            fisheye: outcome.clone(),
            skybox: outcome.clone(),
            standard: outcome,
        }
    }

    #[test]
    fn test_outputs_read_only_rendered_targets() {
        let rendered = report(PassOutcome::Rendered);
        for view in ViewSelection::ALL {
            assert_eq!(rendered.is_transferable(view), view != ViewSelection::Cubemap, "{:?}", view);
        }

        for outcome in [PassOutcome::Skipped, PassOutcome::Disabled] {
            let report = report(outcome);
            assert!(ViewSelection::ALL.iter().all(|&view| !report.is_transferable(view)));
        }

        let mut mixed = report(PassOutcome::Rendered);
        mixed.fisheye = PassOutcome::Disabled;
        assert!(!mixed.is_transferable(ViewSelection::Fisheye));
        assert!(mixed.is_transferable(ViewSelection::Equirectangular));
        assert_eq!(mixed.outcome(ViewSelection::Fisheye), &PassOutcome::Disabled);
    }
}
