//! Standard (free camera) view of the scene
//!
//! A flat perspective render from the orbit camera into a `W x H` target,
//! selectable as a view and as an output source like the projections.

use std::sync::Arc;

use glam::Vec4;

use super::cube_capture::{CameraSlots, CameraUniform, STANDARD_CAMERA_SLOT};
use super::free_camera::FreeCamera;
use super::target::{GpuHandleLedger, RenderTarget};
use super::{allocation_scope, PassOutcome};
use crate::scene::{SceneRenderer, SceneView};

/// Default standard view size
pub const DEFAULT_STANDARD_SIZE: (u32, u32) = (1920, 1080);

pub struct StandardViewRenderer {
    camera: FreeCamera,
    target: Option<RenderTarget>,
    size: (u32, u32),
    ledger: Arc<GpuHandleLedger>,
}

impl StandardViewRenderer {
    pub fn new(device: &wgpu::Device, size: (u32, u32), ledger: Arc<GpuHandleLedger>) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        let mut renderer = Self {
            camera: FreeCamera::new(size.0 as f32 / size.1 as f32),
            target: None,
            size,
            ledger,
        };
        renderer.allocate(device);
        renderer
    }

    fn allocate(&mut self, device: &wgpu::Device) -> bool {
        let (width, height) = self.size;
        let ledger = Arc::clone(&self.ledger);
        match allocation_scope(device, "standard view", || {
            RenderTarget::new(device, "Standard View", width, height, true, &ledger)
        }) {
            Ok(target) => {
                self.target = Some(target);
                true
            }
            Err(e) => {
                tracing::warn!("Standard view: {}; retrying next frame", e);
                false
            }
        }
    }

    /// Change the target size. The old target is released first.
    pub fn resize(&mut self, device: &wgpu::Device, size: (u32, u32)) {
        let size = (size.0.max(1), size.1.max(1));
        if size == self.size && self.target.is_some() {
            return;
        }
        self.target = None;
        self.size = size;
        self.camera.set_aspect(size.0 as f32 / size.1 as f32);
        self.allocate(device);
    }

    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        camera: &CameraSlots,
        scene: Option<&mut dyn SceneRenderer>,
    ) -> PassOutcome {
        if self.target.is_none() && !self.allocate(device) {
            return PassOutcome::Skipped;
        }
        let Some(target) = self.target.as_ref() else {
            return PassOutcome::Skipped;
        };

        let eye = self.camera.eye_position();
        camera.write(
            queue,
            STANDARD_CAMERA_SLOT,
            &CameraUniform::new(
                self.camera.view_matrix(),
                self.camera.projection_matrix(),
                Vec4::new(eye.x, eye.y, eye.z, 1.0),
            ),
        );

        let clear = scene
            .as_deref()
            .map(|s| s.clear_color(None))
            .unwrap_or(wgpu::Color::TRANSPARENT);

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Standard View Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: target.depth_view().map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Some(scene) = scene {
            let mut view = SceneView::new(
                &mut pass,
                camera.bind_group(),
                camera.offset(STANDARD_CAMERA_SLOT),
                None,
                target.size(),
            );
            scene.render(&mut view);
        }

        PassOutcome::Rendered
    }

    pub fn camera(&self) -> &FreeCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut FreeCamera {
        &mut self.camera
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}
