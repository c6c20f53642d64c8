//! Built-in demo scene
//!
//! A large sphere around the origin shaded with a latitude/longitude grid,
//! a horizon split and coloured markers on the +X, +Y and +Z axes. Used by
//! the binary when no other scene is supplied, and handy for checking
//! orientation and seams by eye.

use std::f32::consts::{PI, TAU};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::projection::shader_scope;
use crate::scene::{SceneRenderer, SceneView, SCENE_COLOR_FORMAT, SCENE_DEPTH_FORMAT};
use crate::shaders;

/// Radius of the sky sphere in world units.
pub const SKY_RADIUS: f32 = 50_000.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SkyVertex {
    pub position: [f32; 3],
}

impl SkyVertex {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::SIZE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

pub struct SphereMesh {
    pub vertices: Vec<SkyVertex>,
    pub indices: Vec<u32>,
}

impl SphereMesh {
    /// UV sphere around the origin with Z as the polar axis.
    pub fn uv_sphere(radius: f32, rings: u32, segments: u32) -> Self {
        let rings = rings.max(2);
        let segments = segments.max(3);
        let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
        let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

        for ring in 0..=rings {
            let polar = ring as f32 / rings as f32 * PI;
            let z = polar.cos();
            let r = polar.sin();
            for segment in 0..=segments {
                let azimuth = segment as f32 / segments as f32 * TAU;
                vertices.push(SkyVertex {
                    position: [r * azimuth.cos() * radius, r * azimuth.sin() * radius, z * radius],
                });
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        Self { vertices, indices }
    }
}

/// GPU resources for the sky sphere.
struct DemoGpu {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

pub struct DemoScene {
    gpu: Option<DemoGpu>,
}

impl DemoScene {
    /// Build the scene for the camera layout of the pipeline that draws it.
    ///
    /// If the shader fails to build the scene draws nothing and only the
    /// clear colour is visible.
    pub fn new(device: &wgpu::Device, camera_layout: &wgpu::BindGroupLayout) -> Self {
        let gpu = match shader_scope(device, "demo scene", || Self::create_gpu(device, camera_layout)) {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                tracing::error!("Demo scene disabled: {}", e);
                None
            }
        };
        Self { gpu }
    }

    fn create_gpu(device: &wgpu::Device, camera_layout: &wgpu::BindGroupLayout) -> DemoGpu {
        let shader = device.create_shader_module(shaders::wgsl_descriptor("Demo Scene Shader", shaders::DEMO_SCENE));

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Demo Scene Pipeline Layout"),
            bind_group_layouts: &[camera_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Demo Scene Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[SkyVertex::buffer_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SCENE_COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // Seen from inside, and cube faces flip Y
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SCENE_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let mesh = SphereMesh::uv_sphere(SKY_RADIUS, 48, 96);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Demo Sky Vertices"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Demo Sky Indices"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        DemoGpu {
            pipeline,
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gpu.is_some()
    }
}

impl SceneRenderer for DemoScene {
    fn clear_color(&self, _face: Option<crate::projection::CubeFace>) -> wgpu::Color {
        wgpu::Color::BLACK
    }

    fn render(&mut self, view: &mut SceneView<'_, '_>) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        view.bind_camera(0);
        let pass = view.pass();
        pass.set_pipeline(&gpu.pipeline);
        pass.set_vertex_buffer(0, gpu.vertex_buffer.slice(..));
        pass.set_index_buffer(gpu.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..gpu.index_count, 0, 0..1);
    }
}
