//! End-to-end GPU tests for the projection pipeline.
//!
//! Each test requests a headless adapter and returns early when none is
//! available, so the suite still passes on machines without a GPU.

use std::sync::Arc;

use domecast::gpu_context::GpuContext;
use domecast::network::GpuTextureMirror;
use domecast::projection::target::max_resolution_for_limit;
use domecast::projection::{PipelineConfig, ProjectionControls, ProjectionPipeline, TargetDimensions, TargetSource};
use domecast::scene::{color_to_rgba8, FaceColorScene, SceneRenderer, SolidColorScene};
use domecast::transfer::{FrameBuffer, FrameSink, OutputManager, TransportError};
use domecast::{PassOutcome, ViewSelection};
use parking_lot::Mutex;

const RESOLUTION: u32 = 128;

fn gpu() -> Option<GpuContext> {
    match GpuContext::new_headless() {
        Ok(gpu) => Some(gpu),
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            None
        }
    }
}

fn pipeline(gpu: &GpuContext, resolution: u32) -> (ProjectionPipeline, ProjectionControls) {
    let controls = ProjectionControls::new();
    let config = PipelineConfig {
        resolution,
        standard_size: (64, 32),
        damping: 1.0,
    };
    (ProjectionPipeline::new(&gpu.device, config, controls.clone()), controls)
}

/// Copy a 2D RGBA8 texture into tightly packed rows.
fn read_texture(gpu: &GpuContext, texture: &wgpu::Texture) -> Vec<u8> {
    let size = texture.size();
    let row_bytes = size.width * 4;
    let padded = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Test Readback"),
        size: padded as u64 * size.height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(size.height),
            },
        },
        wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    slice.map_async(wgpu::MapMode::Read, |_| {});
    let _ = gpu.device.poll(wgpu::Maintain::Wait);

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((row_bytes * size.height) as usize);
    for row in mapped.chunks(padded as usize) {
        pixels.extend_from_slice(&row[..row_bytes as usize]);
    }
    drop(mapped);
    buffer.unmap();
    pixels
}

fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

fn assert_close(actual: [u8; 4], expected: [u8; 4], what: &str) {
    let close = actual.iter().zip(expected).all(|(a, e)| a.abs_diff(e) <= 2);
    assert!(close, "{}: expected {:?}, got {:?}", what, expected, actual);
}

fn render(pipeline: &mut ProjectionPipeline, gpu: &GpuContext, scene: &mut dyn SceneRenderer) {
    pipeline.render_frame(&gpu.device, &gpu.queue, Some(scene), None);
    let _ = gpu.device.poll(wgpu::Maintain::Wait);
}

#[test]
fn test_resize_releases_every_old_handle() {
    let Some(gpu) = gpu() else { return };
    let (mut pipeline, controls) = pipeline(&gpu, RESOLUTION);
    let ledger = Arc::clone(pipeline.ledger());

    let report = pipeline.render_frame(&gpu.device, &gpu.queue, None, None);
    assert_eq!(report.capture, PassOutcome::Rendered);
    let live = ledger.live();
    let released = ledger.released();
    let peak = ledger.peak_live();

    controls.request_resize(2 * RESOLUTION);
    let report = pipeline.render_frame(&gpu.device, &gpu.queue, None, None);
    assert_eq!(report.resolution, 2 * RESOLUTION);
    assert_eq!(pipeline.resolution(), 2 * RESOLUTION);

    // Cube colour + depth and the four reprojection targets
    assert_eq!(ledger.released() - released, 6);
    assert_eq!(ledger.live(), live);
    assert_eq!(ledger.peak_live(), peak);

    let dims = TargetDimensions::for_resolution(2 * RESOLUTION);
    assert_eq!(pipeline.display_target(ViewSelection::Fisheye).map(|t| t.size()), Some(dims.fisheye));
    assert_eq!(
        pipeline.display_target(ViewSelection::Equirectangular).map(|t| t.size()),
        Some(dims.panorama)
    );
    assert_eq!(pipeline.display_target(ViewSelection::Cubemap).map(|t| t.size()), Some(dims.skybox));

    // Outputs see the fisheye that was rendered, never the skybox preview
    assert!(TargetSource::target(&pipeline, ViewSelection::Fisheye).is_some());
    assert!(TargetSource::target(&pipeline, ViewSelection::Cubemap).is_none());
    assert_eq!(pipeline.capture_renderer().resolution(), 2 * RESOLUTION);

    // Requesting the current resolution again is a no-op
    controls.request_resize(2 * RESOLUTION);
    pipeline.render_frame(&gpu.device, &gpu.queue, None, None);
    assert_eq!(ledger.released() - released, 6);
}

#[test]
fn test_equirect_faces_and_seam() {
    let Some(gpu) = gpu() else { return };
    let (mut pipeline, controls) = pipeline(&gpu, RESOLUTION);
    controls.set_view(ViewSelection::Equirectangular);

    let mut scene = FaceColorScene::default();
    render(&mut pipeline, &gpu, &mut scene);

    let target = pipeline
        .display_target(ViewSelection::Equirectangular)
        .expect("panorama target");
    let (width, height) = target.size();
    assert_eq!((width, height), (2 * RESOLUTION, RESOLUTION));
    let pixels = read_texture(&gpu, target.texture());

    let face = |i: usize| color_to_rgba8(scene.colors[i]);
    let mid = height / 2;

    // The wrap column on both edges looks backwards (-Y)
    let left = pixel(&pixels, width, 0, mid);
    let right = pixel(&pixels, width, width - 1, mid);
    assert_close(left, face(3), "left edge");
    assert_close(right, face(3), "right edge");
    assert_close(left, right, "seam");

    assert_close(pixel(&pixels, width, width / 2, mid), face(2), "front (+Y)");
    assert_close(pixel(&pixels, width, width / 4, mid), face(1), "left (-X)");
    assert_close(pixel(&pixels, width, 3 * width / 4, mid), face(0), "right (+X)");
    assert_close(pixel(&pixels, width, width / 2, 0), face(4), "zenith (+Z)");
    assert_close(pixel(&pixels, width, width / 2, height - 1), face(5), "nadir (-Z)");
}

#[test]
fn test_fill_half_size_halves_the_circle() {
    let Some(gpu) = gpu() else { return };
    let (mut pipeline, controls) = pipeline(&gpu, RESOLUTION);
    controls.set_view(ViewSelection::Fisheye);
    controls.set_fov(180.0);

    let mut scene = FaceColorScene::default();
    let center = RESOLUTION / 2;

    render(&mut pipeline, &gpu, &mut scene);
    let full = read_texture(&gpu, pipeline.display_target(ViewSelection::Fisheye).expect("fisheye").texture());
    assert_close(pixel(&full, RESOLUTION, center, center), color_to_rgba8(scene.colors[4]), "zenith");
    assert_close(
        pixel(&full, RESOLUTION, center, RESOLUTION - 8),
        color_to_rgba8(scene.colors[2]),
        "front at the bottom",
    );
    assert_eq!(pixel(&full, RESOLUTION, center, center + 40)[3], 255);
    assert_eq!(pixel(&full, RESOLUTION, 2, 2)[3], 0, "corner outside the circle");

    controls.set_size_percentage(50.0);
    render(&mut pipeline, &gpu, &mut scene);
    let half = read_texture(&gpu, pipeline.display_target(ViewSelection::Fisheye).expect("fisheye").texture());

    // Diameter R/2, still centred
    assert_close(pixel(&half, RESOLUTION, center, center), color_to_rgba8(scene.colors[4]), "zenith");
    assert_eq!(pixel(&half, RESOLUTION, center, center + 24)[3], 255);
    assert_eq!(pixel(&half, RESOLUTION, center - 24, center)[3], 255);
    assert_eq!(pixel(&half, RESOLUTION, center, center + 40)[3], 0);
    assert_eq!(pixel(&half, RESOLUTION, center + 40, center)[3], 0);
    assert_eq!(pixel(&half, RESOLUTION, center - 40, center)[3], 0);
}

/// Frames observed by a test sink.
#[derive(Default)]
struct Recorded {
    frames: Vec<(u64, u32, u32, Vec<u8>)>,
}

struct RecordingSink {
    recorded: Arc<Mutex<Recorded>>,
}

impl FrameSink for RecordingSink {
    fn name(&self) -> &str {
        "recorder"
    }

    fn send(&mut self, frame: &FrameBuffer) -> Result<(), TransportError> {
        self.recorded
            .lock()
            .frames
            .push((frame.sequence, frame.width, frame.height, frame.data.clone()));
        Ok(())
    }
}

#[test]
fn test_solid_color_reaches_the_sink() {
    let Some(gpu) = gpu() else { return };
    let (mut pipeline, _controls) = pipeline(&gpu, RESOLUTION);

    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let mut outputs = OutputManager::new();
    outputs
        .add_sink(
            ViewSelection::Equirectangular,
            Box::new(RecordingSink {
                recorded: Arc::clone(&recorded),
            }),
        )
        .expect("sink worker");

    let red = wgpu::Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    let mut scene = SolidColorScene::new(red);
    for _ in 0..8 {
        pipeline.render_frame(&gpu.device, &gpu.queue, Some(&mut scene), Some(&mut outputs));
        let _ = gpu.device.poll(wgpu::Maintain::Wait);
    }
    outputs.process(&gpu.device);
    outputs.shutdown();

    // The displayed fisheye is red inside the circle and transparent outside
    let fisheye = read_texture(&gpu, pipeline.display_target(ViewSelection::Fisheye).expect("fisheye").texture());
    let radius = RESOLUTION as f32 / 2.0;
    for y in 0..RESOLUTION {
        for x in 0..RESOLUTION {
            let dx = x as f32 + 0.5 - radius;
            let dy = y as f32 + 0.5 - radius;
            let r = (dx * dx + dy * dy).sqrt() / radius;
            let p = pixel(&fisheye, RESOLUTION, x, y);
            if r < 0.95 {
                assert_eq!(p, [255, 0, 0, 255], "inside at ({}, {})", x, y);
            } else if r > 1.05 {
                assert_eq!(p, [0, 0, 0, 0], "outside at ({}, {})", x, y);
            }
        }
    }

    let recorded = recorded.lock();
    assert!(!recorded.frames.is_empty(), "no frame reached the sink");

    let mut last_sequence = None;
    for (sequence, width, height, data) in &recorded.frames {
        assert_eq!((*width, *height), (2 * RESOLUTION, RESOLUTION));
        assert_eq!(data.len(), (width * height * 4) as usize);
        assert!(data.chunks_exact(4).all(|p| p == [255, 0, 0, 255]), "frame {} is not solid red", sequence);
        if let Some(last) = last_sequence {
            assert!(*sequence > last, "frames out of order");
        }
        last_sequence = Some(*sequence);
    }
}

#[test]
fn test_texture_mirror_receives_the_fisheye() {
    let Some(gpu) = gpu() else { return };
    let (mut pipeline, _controls) = pipeline(&gpu, RESOLUTION);

    let mirror = GpuTextureMirror::new("preview");
    let handle = mirror.handle();
    let mut outputs = OutputManager::new();
    outputs
        .add_texture_sharer(ViewSelection::Fisheye, Box::new(mirror))
        .expect("texture output");

    let mut scene = SolidColorScene::new(wgpu::Color {
        r: 0.0,
        g: 0.0,
        b: 1.0,
        a: 1.0,
    });
    pipeline.render_frame(&gpu.device, &gpu.queue, Some(&mut scene), Some(&mut outputs));
    let _ = gpu.device.poll(wgpu::Maintain::Wait);

    assert_eq!(handle.frames(), 1);
    let texture = handle.texture().expect("mirror texture");
    assert_eq!((texture.width(), texture.height()), (RESOLUTION, RESOLUTION));

    let pixels = read_texture(&gpu, &texture);
    let center = RESOLUTION / 2;
    assert_eq!(pixel(&pixels, RESOLUTION, center, center), [0, 0, 255, 255]);
    outputs.shutdown();
}

#[test]
fn test_device_limit_reaches_the_controls() {
    let Some(gpu) = gpu() else { return };
    let max = max_resolution_for_limit(gpu.device.limits().max_texture_dimension_2d);
    let (pipeline, controls) = pipeline(&gpu, RESOLUTION);

    assert_eq!(pipeline.max_resolution(), max);
    assert_eq!(controls.max_resolution(), max);
    assert!(TargetDimensions::for_resolution(max).skybox.0 <= gpu.device.limits().max_texture_dimension_2d);

    controls.request_resize(100_000);
    assert_eq!(controls.take_pending_resize(), Some(max));
}

#[test]
fn test_resize_counts_in_flight_readbacks_as_dropped() {
    let Some(gpu) = gpu() else { return };
    let (mut pipeline, controls) = pipeline(&gpu, RESOLUTION);

    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let mut outputs = OutputManager::new();
    outputs
        .add_sink(
            ViewSelection::Fisheye,
            Box::new(RecordingSink {
                recorded: Arc::clone(&recorded),
            }),
        )
        .expect("sink worker");

    // Readbacks stay in flight until `process` runs
    let frame = |pipeline: &mut ProjectionPipeline, outputs: &mut OutputManager| {
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        pipeline.encode_frame(&gpu.device, &gpu.queue, &mut encoder, None, &[ViewSelection::Fisheye]);
        outputs.capture(&gpu.device, &mut encoder, &*pipeline);
        gpu.queue.submit(std::iter::once(encoder.finish()));
    };

    frame(&mut pipeline, &mut outputs);
    frame(&mut pipeline, &mut outputs);
    assert_eq!(outputs.stats()[0].frames_dropped, 0);

    controls.request_resize(2 * RESOLUTION);
    frame(&mut pipeline, &mut outputs);
    assert_eq!(outputs.stats()[0].frames_dropped, 2);

    outputs.shutdown();
    assert!(recorded.lock().frames.is_empty());
}
