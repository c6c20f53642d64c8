//! Domecast - Main Entry Point
//!
//! Opens a window showing the selected projection of the demo scene and
//! streams the configured outputs.
//!
//! Keys:
//! - M: cycle view (fisheye, equirectangular, cubemap, standard)
//! - P: toggle the fisheye preview
//! - Arrows: pitch / yaw, Q/E: roll
//! - +/-: fisheye field of view, [ / ]: fill size
//! - 1-4: cube resolution 512 / 1024 / 2048 / 4096
//! - Space: pause / resume outputs
//! - R: reset the standard camera, F11: fullscreen, Esc: quit

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use domecast::demo::DemoScene;
use domecast::gpu_context::{GpuContext, WindowGpuContext};
use domecast::projection::fullscreen::{linear_sampler, sampler_entry, texture_entry, FullscreenPipeline};
use domecast::scene::SceneRenderer;
use domecast::settings::DomeSettings;
use domecast::shaders;
use domecast::telemetry::{init_logging, LogConfig};
use domecast::transfer::OutputManager;
use domecast::{ProjectionControls, ProjectionPipeline, ViewSelection};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Domecast";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;

const ANGLE_STEP: f32 = 0.05;
const FOV_STEP: f32 = 5.0;
const SIZE_STEP: f32 = 5.0;
const PREVIEW_FRACTION: f32 = 0.25;
const PREVIEW_MARGIN: f32 = 16.0;
const STATS_INTERVAL: u64 = 600;

/// Largest `(x, y, w, h)` with the source aspect ratio centred in `dst`.
fn letterbox(src: (u32, u32), dst: (u32, u32)) -> (f32, f32, f32, f32) {
    let (sw, sh) = (src.0.max(1) as f32, src.1.max(1) as f32);
    let (dw, dh) = (dst.0.max(1) as f32, dst.1.max(1) as f32);
    let scale = (dw / sw).min(dh / sh);
    let (w, h) = (sw * scale, sh * scale);
    ((dw - w) * 0.5, (dh - h) * 0.5, w, h)
}

/// Square preview viewport in the bottom-right corner.
fn preview_viewport(dst: (u32, u32)) -> (f32, f32, f32, f32) {
    let (dw, dh) = (dst.0 as f32, dst.1 as f32);
    let size = (dw.min(dh) * PREVIEW_FRACTION).max(1.0);
    ((dw - size - PREVIEW_MARGIN).max(0.0), (dh - size - PREVIEW_MARGIN).max(0.0), size, size)
}

/// Blits projection targets to the window surface.
struct Presenter {
    pipeline: FullscreenPipeline,
    sampler: wgpu::Sampler,
}

impl Presenter {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> anyhow::Result<Self> {
        let pipeline = FullscreenPipeline::new(
            device,
            "Present",
            shaders::PRESENT,
            &[texture_entry(0, wgpu::TextureViewDimension::D2), sampler_entry(1)],
            format,
        )?;
        let sampler = linear_sampler(
            device,
            "Present Sampler",
            wgpu::AddressMode::ClampToEdge,
            wgpu::AddressMode::ClampToEdge,
        );
        Ok(Self { pipeline, sampler })
    }

    fn blit(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        target: &wgpu::TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
        viewport: (f32, f32, f32, f32),
    ) {
        let bind_group = self.pipeline.create_bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        );
        self.pipeline
            .draw_in_viewport(encoder, target, &bind_group, load, Some(viewport));
    }
}

/// Everything that exists once the window is up.
struct Viewer {
    window: Arc<Window>,
    gpu: GpuContext,
    surface: WindowGpuContext,
    pipeline: ProjectionPipeline,
    scene: DemoScene,
    outputs: OutputManager,
    presenter: Presenter,
    show_preview: bool,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
    frames: u64,
}

impl Viewer {
    fn new(window: Arc<Window>, settings: &DomeSettings) -> anyhow::Result<Self> {
        let (gpu, surface) =
            pollster::block_on(WindowGpuContext::create(window.clone())).context("GPU initialization failed")?;

        let controls = ProjectionControls::from_snapshot(&settings.control_snapshot());
        let pipeline = ProjectionPipeline::new(&gpu.device, settings.pipeline_config(), controls);
        let scene = DemoScene::new(&gpu.device, pipeline.camera_layout());
        let presenter = Presenter::new(&gpu.device, surface.format())?;

        let mut outputs = OutputManager::new();
        for config in &settings.outputs {
            let sink = match config.create_sink(settings.target_fps) {
                Ok(sink) => sink,
                Err(e) => {
                    tracing::warn!("Output '{}' not created: {}", config.name, e);
                    continue;
                }
            };
            match outputs.add_sink(config.view, sink) {
                Ok(id) => {
                    if !config.enabled {
                        outputs.set_enabled(id, false);
                    }
                    tracing::info!("Output '{}' streams the {} view", config.name, config.view.display_name());
                }
                Err(e) => tracing::warn!("Output '{}' not started: {}", config.name, e),
            }
        }

        let viewer = Self {
            window,
            gpu,
            surface,
            pipeline,
            scene,
            outputs,
            presenter,
            show_preview: false,
            dragging: false,
            last_cursor: None,
            frames: 0,
        };
        viewer.update_title();
        Ok(viewer)
    }

    fn controls(&self) -> &ProjectionControls {
        self.pipeline.controls()
    }

    fn update_title(&self) {
        let controls = self.controls().snapshot();
        let paused = if self.outputs.is_paused() { " (outputs paused)" } else { "" };
        self.window.set_title(&format!(
            "{} - {} - {:.0}° / {:.0}%{}",
            WINDOW_TITLE,
            controls.view.display_name(),
            controls.fov_degrees,
            controls.size_percentage,
            paused
        ));
    }

    fn handle_key(&mut self, key: KeyCode) {
        let controls = self.controls().clone();
        let snapshot = controls.snapshot();
        match key {
            KeyCode::KeyM => {
                controls.set_view(snapshot.view.next());
                tracing::info!("View: {}", snapshot.view.next().display_name());
            }
            KeyCode::KeyP => self.show_preview = !self.show_preview,
            KeyCode::ArrowUp => controls.set_pitch(snapshot.pitch + ANGLE_STEP),
            KeyCode::ArrowDown => controls.set_pitch(snapshot.pitch - ANGLE_STEP),
            KeyCode::ArrowLeft => controls.set_yaw(snapshot.yaw - ANGLE_STEP),
            KeyCode::ArrowRight => controls.set_yaw(snapshot.yaw + ANGLE_STEP),
            KeyCode::KeyQ => controls.set_roll(snapshot.roll - ANGLE_STEP),
            KeyCode::KeyE => controls.set_roll(snapshot.roll + ANGLE_STEP),
            KeyCode::Equal | KeyCode::NumpadAdd => controls.set_fov(snapshot.fov_degrees + FOV_STEP),
            KeyCode::Minus | KeyCode::NumpadSubtract => controls.set_fov(snapshot.fov_degrees - FOV_STEP),
            KeyCode::BracketRight => controls.set_size_percentage(snapshot.size_percentage + SIZE_STEP),
            KeyCode::BracketLeft => controls.set_size_percentage(snapshot.size_percentage - SIZE_STEP),
            KeyCode::Digit1 => controls.request_resize(512),
            KeyCode::Digit2 => controls.request_resize(1024),
            KeyCode::Digit3 => controls.request_resize(2048),
            KeyCode::Digit4 => controls.request_resize(4096),
            KeyCode::Space => {
                if self.outputs.is_paused() {
                    self.outputs.resume();
                } else {
                    self.outputs.pause();
                }
            }
            KeyCode::KeyR => self.pipeline.standard_view_mut().camera_mut().reset(),
            KeyCode::F11 => {
                if self.window.fullscreen().is_some() {
                    self.window.set_fullscreen(None);
                } else {
                    self.window
                        .set_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
                }
            }
            _ => return,
        }
        self.update_title();
    }

    fn on_cursor_moved(&mut self, position: (f64, f64)) {
        if self.dragging {
            if let Some((x, y)) = self.last_cursor {
                let delta = ((position.0 - x) as f32, (position.1 - y) as f32);
                self.pipeline.standard_view_mut().camera_mut().on_mouse_drag(delta);
            }
        }
        self.last_cursor = Some(position);
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let frame = self.surface.surface.get_current_texture()?;
        let surface_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let device = &self.gpu.device;
        let queue = &self.gpu.queue;

        let view = self.controls().view();
        let mut views = vec![view];
        if self.show_preview {
            views.push(ViewSelection::Fisheye);
        }
        views.extend(self.outputs.needed_views());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Domecast Frame"),
        });

        let scene: &mut dyn SceneRenderer = &mut self.scene;
        self.pipeline
            .encode_frame(device, queue, &mut encoder, Some(scene), &views);
        self.outputs.capture(device, &mut encoder, &self.pipeline);

        let surface_size = self.surface.size();
        match self.pipeline.display_target(view) {
            Some(target) => self.presenter.blit(
                device,
                &mut encoder,
                target.view(),
                &surface_view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                letterbox(target.size(), surface_size),
            ),
            None => clear(&mut encoder, &surface_view),
        }
        if self.show_preview && view != ViewSelection::Fisheye {
            if let Some(preview) = self.pipeline.display_target(ViewSelection::Fisheye) {
                self.presenter.blit(
                    device,
                    &mut encoder,
                    preview.view(),
                    &surface_view,
                    wgpu::LoadOp::Load,
                    preview_viewport(surface_size),
                );
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.outputs.process(device);

        self.frames += 1;
        if self.frames % STATS_INTERVAL == 0 {
            for stats in self.outputs.stats() {
                tracing::info!(
                    output = %stats.name,
                    view = stats.view.display_name(),
                    enabled = stats.enabled,
                    sent = stats.frames_sent,
                    dropped = stats.frames_dropped,
                    failed = stats.frames_failed,
                    last_send_ms = stats.last_send_ms,
                    "Output stats"
                );
            }
        }
        Ok(())
    }

    /// Persist the live controls and stop every output.
    fn shutdown(&mut self, settings: &mut DomeSettings) {
        settings.update_from(&self.controls().snapshot(), self.pipeline.resolution());
        if let Err(e) = settings.save() {
            tracing::warn!("Failed to save settings: {}", e);
        }
        self.outputs.shutdown();
    }
}

fn clear(encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

/// Application state machine
enum AppState {
    /// Initial state before window is created
    Uninitialized,
    Running(Box<Viewer>),
}

struct DomecastApp {
    state: AppState,
    settings: DomeSettings,
    next_redraw_at: Instant,
    error: Option<anyhow::Error>,
}

impl DomecastApp {
    fn new(settings: DomeSettings) -> Self {
        Self {
            state: AppState::Uninitialized,
            settings,
            next_redraw_at: Instant::now(),
            error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<Box<Viewer>> {
        let window_attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT));
        let window = Arc::new(event_loop.create_window(window_attributes)?);
        tracing::info!("Window created: {}x{}", window.inner_size().width, window.inner_size().height);

        Ok(Box::new(Viewer::new(window, &self.settings)?))
    }
}

impl ApplicationHandler for DomecastApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let AppState::Uninitialized = &self.state {
            match self.start(event_loop) {
                Ok(viewer) => {
                    tracing::info!("Domecast ready; press M to cycle views, Esc to exit");
                    self.state = AppState::Running(viewer);
                }
                Err(e) => {
                    self.error = Some(e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let AppState::Running(viewer) = &mut self.state else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested, exiting...");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if key_code == KeyCode::Escape {
                    tracing::info!("Escape pressed, exiting...");
                    event_loop.exit();
                } else {
                    viewer.handle_key(key_code);
                }
            }

            WindowEvent::Resized(physical_size) => {
                viewer.surface.resize(&viewer.gpu, physical_size);
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                viewer.dragging = state == ElementState::Pressed;
            }

            WindowEvent::CursorMoved { position, .. } => {
                viewer.on_cursor_moved((position.x, position.y));
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let amount = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / 40.0,
                };
                viewer.pipeline.standard_view_mut().camera_mut().on_scroll(amount);
            }

            WindowEvent::RedrawRequested => match viewer.render() {
                Ok(()) => {}
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    tracing::warn!("Surface lost, reconfiguring...");
                    viewer.surface.reconfigure(&viewer.gpu);
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    tracing::error!("Out of GPU memory!");
                    event_loop.exit();
                }
                Err(e) => {
                    tracing::warn!("Surface error: {:?}", e);
                }
            },

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let AppState::Running(viewer) = &mut self.state else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        // Drive redraws at the target frame rate
        let frame_duration = self.settings.frame_interval();
        let wake_early = Duration::from_micros(1000);
        let wake_at = self
            .next_redraw_at
            .checked_sub(wake_early)
            .unwrap_or(self.next_redraw_at);
        let now = Instant::now();

        if now >= wake_at {
            while Instant::now() < self.next_redraw_at {
                std::hint::spin_loop();
            }

            viewer.window.request_redraw();
            self.next_redraw_at += frame_duration;

            // Reset if too far behind
            let now_after = Instant::now();
            if now_after > self.next_redraw_at + frame_duration * 2 {
                self.next_redraw_at = now_after + frame_duration;
            }
        }

        event_loop.set_control_flow(ControlFlow::WaitUntil(wake_at));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let AppState::Running(viewer) = &mut self.state {
            viewer.shutdown(&mut self.settings);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let _log_guard = init_logging(&LogConfig::default()).map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("Domecast v{}", env!("CARGO_PKG_VERSION"));

    let settings = DomeSettings::load();
    tracing::info!(
        resolution = settings.resolution,
        fov = settings.fov,
        outputs = settings.outputs.len(),
        "Settings loaded"
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = DomecastApp::new(settings);
    event_loop.run_app(&mut app).context("Event loop error")?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_wide_source_in_square_window() {
        let (x, y, w, h) = letterbox((2048, 1024), (1000, 1000));
        assert_eq!((x, w), (0.0, 1000.0));
        assert_eq!((y, h), (250.0, 500.0));
    }

    #[test]
    fn test_letterbox_square_source_in_wide_window() {
        let (x, y, w, h) = letterbox((1024, 1024), (1600, 800));
        assert_eq!((x, y, w, h), (400.0, 0.0, 800.0, 800.0));
    }

    #[test]
    fn test_preview_sits_bottom_right() {
        let (x, y, w, h) = preview_viewport((1600, 800));
        assert_eq!((w, h), (200.0, 200.0));
        assert_eq!(x + w + PREVIEW_MARGIN, 1600.0);
        assert_eq!(y + h + PREVIEW_MARGIN, 800.0);
    }
}
