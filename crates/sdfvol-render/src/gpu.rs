//! wgpu backend for the intersection coordinator.
//!
//! [`IntersectionRenderer`] owns the pipelines, the per-draw uniform ring and
//! the depth-texture pool for the lifetime of the app. Each camera hook wraps
//! it in an [`IntersectionFrame`] that records into the host's encoder.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use sdfvol_core::constants::DEPTH_CLEAR_VALUE;

use crate::backend::{
    BackendError, DepthDraw, IntersectionBackend, OverlayDraw, RenderResources,
};
use crate::mesh::MeshData;
use crate::texture_pool::TexturePool;

/// Dynamic-offset stride for per-draw uniforms. 256 is the portable minimum
/// `min_uniform_buffer_offset_alignment`.
const UNIFORM_STRIDE: u64 = 256;

/// Format of the captured view-space distance.
pub const DEPTH_CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Depth buffer used while capturing, so the nearest surface wins.
const DEPTH_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub struct WgpuResources;

impl RenderResources for WgpuResources {
    type Mesh = GpuMesh;
    type Material = GpuMaterial;
    type DepthTexture = DepthTarget;
}

/// Depth-capture draw uniforms (192 bytes, matches DrawUniforms in
/// depth_capture.wgsl).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniforms {
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
}

/// Overlay draw uniforms (240 bytes, matches OverlayUniforms in
/// intersection_overlay.wgsl).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct OverlayUniforms {
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    base_color: [f32; 4],
    intersection_color: [f32; 4],
    intersection_distance: f32,
    _padding: [f32; 3],
}

/// Vertex and index buffers for one light volume mesh.
pub struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    pub fn new(device: &wgpu::Device, label: &str, data: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
        }
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MaterialKind {
    DepthCapture,
    IntersectionOverlay,
}

/// A pipeline the coordinator can be configured with. Obtain one from
/// [`IntersectionRenderer::depth_material`] or
/// [`IntersectionRenderer::intersection_material`].
#[derive(Clone)]
pub struct GpuMaterial {
    pipeline: Arc<wgpu::RenderPipeline>,
    kind: MaterialKind,
}

/// Camera-sized R32Float capture target plus its depth buffer.
pub struct DepthTarget {
    width: u32,
    height: u32,
    _color: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    sample_bind_group: wgpu::BindGroup,
}

impl DepthTarget {
    fn new(device: &wgpu::Device, sample_bgl: &wgpu::BindGroupLayout, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("light-volume-depth-capture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_CAPTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("light-volume-depth-buffer"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_BUFFER_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        let sample_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light-volume-depth-sample-bg"),
            layout: sample_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&color_view),
            }],
        });
        Self {
            width,
            height,
            _color: color,
            color_view,
            _depth: depth,
            depth_view,
            sample_bind_group,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.color_view
    }
}

/// Hands out fixed-stride slot offsets until the submission that uses them
/// has been queued.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SlotCursor {
    next: u32,
    slots: u32,
}

impl SlotCursor {
    fn new(slots: u32) -> Self {
        Self {
            next: 0,
            slots: slots.max(1),
        }
    }

    /// Byte offset of the next free slot, or `None` once the ring is full.
    fn claim(&mut self) -> Option<u64> {
        if self.next >= self.slots {
            return None;
        }
        let offset = self.next as u64 * UNIFORM_STRIDE;
        self.next += 1;
        Some(offset)
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}

/// A uniform buffer carved into fixed-stride slots, bound with a dynamic offset.
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    cursor: SlotCursor,
}

impl UniformRing {
    fn new(
        device: &wgpu::Device,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        element_size: u64,
        slots: u32,
    ) -> Self {
        let cursor = SlotCursor::new(slots);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: UNIFORM_STRIDE * cursor.slots as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(element_size),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            cursor,
        }
    }

    fn claim(&mut self) -> Result<u64, BackendError> {
        self.cursor
            .claim()
            .ok_or(BackendError::UniformSlotsExhausted {
                capacity: self.cursor.slots,
            })
    }
}

fn uniform_bgl(device: &wgpu::Device, label: &str, element_size: u64) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(element_size),
            },
            count: None,
        }],
    })
}

const VERTEX_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 12,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    }],
};

/// Long-lived GPU state for light volume intersection rendering.
///
/// Uniform slots are claimed across every [`IntersectionFrame`] recorded
/// for one queue submission, so several cameras can share one encoder.
/// The host calls [`IntersectionRenderer::begin_submission`] once before
/// recording each submission's hooks.
pub struct IntersectionRenderer {
    depth_pipeline: Arc<wgpu::RenderPipeline>,
    overlay_pipeline: Arc<wgpu::RenderPipeline>,
    depth_sample_bgl: wgpu::BindGroupLayout,
    depth_uniforms: UniformRing,
    overlay_uniforms: UniformRing,
    pool: TexturePool<DepthTarget>,
}

impl IntersectionRenderer {
    /// `max_light_volumes` sizes the uniform ring: one depth slot per volume
    /// and one overlay slot per ordered pair, for each of the
    /// `cameras_per_submission` cameras recorded before a submit.
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        max_light_volumes: u32,
        cameras_per_submission: u32,
    ) -> Self {
        // Inject constants (single source of truth from Rust)
        // Captured distances at or above half the clear value count as uncovered.
        let constants_preamble =
            format!("const DEPTH_UNCOVERED: f32 = {:e};\n", DEPTH_CLEAR_VALUE * 0.5);
        let depth_wgsl = include_str!("../../../shaders/render/depth_capture.wgsl");
        let overlay_wgsl = include_str!("../../../shaders/render/intersection_overlay.wgsl");
        let overlay_source = format!("{constants_preamble}\n{overlay_wgsl}");

        let depth_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("depth-capture-shader"),
            source: wgpu::ShaderSource::Wgsl(depth_wgsl.into()),
        });
        let overlay_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("intersection-overlay-shader"),
            source: wgpu::ShaderSource::Wgsl(overlay_source.into()),
        });

        let draw_size = std::mem::size_of::<DrawUniforms>() as u64;
        let overlay_size = std::mem::size_of::<OverlayUniforms>() as u64;
        let draw_bgl = uniform_bgl(device, "depth-capture-uniform-bgl", draw_size);
        let overlay_bgl = uniform_bgl(device, "intersection-overlay-uniform-bgl", overlay_size);
        let depth_sample_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("light-volume-depth-sample-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let max = max_light_volumes.max(1);
        let cameras = cameras_per_submission.max(1);
        let depth_uniforms = UniformRing::new(
            device,
            "depth-capture-uniforms",
            &draw_bgl,
            draw_size,
            max * cameras,
        );
        let overlay_uniforms = UniformRing::new(
            device,
            "intersection-overlay-uniforms",
            &overlay_bgl,
            overlay_size,
            max * max.saturating_sub(1).max(1) * cameras,
        );

        // -- Depth capture pipeline --
        let depth_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("depth-capture-pipeline-layout"),
            bind_group_layouts: &[&draw_bgl],
            push_constant_ranges: &[],
        });
        let depth_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("depth-capture-pipeline"),
            layout: Some(&depth_layout),
            vertex: wgpu::VertexState {
                module: &depth_module,
                entry_point: Some("vs_main"),
                buffers: &[VERTEX_LAYOUT],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_BUFFER_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &depth_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: DEPTH_CAPTURE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        });

        // -- Overlay pipeline --
        let overlay_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("intersection-overlay-pipeline-layout"),
            bind_group_layouts: &[&overlay_bgl, &depth_sample_bgl],
            push_constant_ranges: &[],
        });
        let overlay_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("intersection-overlay-pipeline"),
            layout: Some(&overlay_layout),
            vertex: wgpu::VertexState {
                module: &overlay_module,
                entry_point: Some("vs_main"),
                buffers: &[VERTEX_LAYOUT],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &overlay_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        });

        log::info!(
            "IntersectionRenderer: {} depth slots, {} overlay slots",
            depth_uniforms.cursor.slots,
            overlay_uniforms.cursor.slots
        );

        Self {
            depth_pipeline: Arc::new(depth_pipeline),
            overlay_pipeline: Arc::new(overlay_pipeline),
            depth_sample_bgl,
            depth_uniforms,
            overlay_uniforms,
            pool: TexturePool::new(),
        }
    }

    pub fn depth_material(&self) -> GpuMaterial {
        GpuMaterial {
            pipeline: Arc::clone(&self.depth_pipeline),
            kind: MaterialKind::DepthCapture,
        }
    }

    pub fn intersection_material(&self) -> GpuMaterial {
        GpuMaterial {
            pipeline: Arc::clone(&self.overlay_pipeline),
            kind: MaterialKind::IntersectionOverlay,
        }
    }

    /// Depth textures currently handed out.
    pub fn outstanding_textures(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn textures_created(&self) -> usize {
        self.pool.created()
    }

    /// Drop pooled textures that no longer match the surface size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pool.retain_size(width, height);
    }

    /// Make every uniform slot available again. Call once per queue
    /// submission, before recording its first hook; writes from the previous
    /// submission must already have been submitted.
    pub fn begin_submission(&mut self) {
        self.depth_uniforms.cursor.reset();
        self.overlay_uniforms.cursor.reset();
    }

    /// Start recording one camera hook into `encoder`. Overlay draws
    /// composite onto `color_target`. Slots claimed here stay reserved until
    /// the next [`IntersectionRenderer::begin_submission`].
    pub fn frame<'a>(
        &'a mut self,
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        encoder: &'a mut wgpu::CommandEncoder,
        color_target: &'a wgpu::TextureView,
    ) -> IntersectionFrame<'a> {
        IntersectionFrame {
            renderer: self,
            device,
            queue,
            encoder,
            color_target,
        }
    }
}

/// One camera hook's worth of recording.
pub struct IntersectionFrame<'a> {
    renderer: &'a mut IntersectionRenderer,
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    color_target: &'a wgpu::TextureView,
}

impl IntersectionBackend<WgpuResources> for IntersectionFrame<'_> {
    fn acquire_depth_texture(&mut self, width: u32, height: u32) -> DepthTarget {
        let device = self.device;
        let renderer = &mut *self.renderer;
        let layout = &renderer.depth_sample_bgl;
        renderer
            .pool
            .acquire(width, height, |w, h| DepthTarget::new(device, layout, w, h))
    }

    fn render_depth(&mut self, draw: DepthDraw<'_, WgpuResources>) -> Result<(), BackendError> {
        if draw.material.kind != MaterialKind::DepthCapture {
            return Err(BackendError::WrongMaterial {
                expected: "depth capture",
            });
        }
        let offset = self.renderer.depth_uniforms.claim()?;
        let ring = &self.renderer.depth_uniforms;

        let uniforms = DrawUniforms {
            view: draw.camera.view.to_cols_array_2d(),
            proj: draw.camera.projection.to_cols_array_2d(),
            model: draw.model.to_cols_array_2d(),
        };
        self.queue
            .write_buffer(&ring.buffer, offset, bytemuck::bytes_of(&uniforms));

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("light-volume-depth-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &draw.target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: draw.clear_depth as f64,
                        g: 0.0,
                        b: 0.0,
                        a: 0.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &draw.target.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.insert_debug_marker(draw.volume);
        pass.set_pipeline(&draw.material.pipeline);
        pass.set_bind_group(0, &ring.bind_group, &[offset as u32]);
        draw.mesh.draw(&mut pass);
        Ok(())
    }

    fn draw_overlay(&mut self, draw: OverlayDraw<'_, WgpuResources>) -> Result<(), BackendError> {
        if draw.material.kind != MaterialKind::IntersectionOverlay {
            return Err(BackendError::WrongMaterial {
                expected: "intersection overlay",
            });
        }
        let offset = self.renderer.overlay_uniforms.claim()?;
        let ring = &self.renderer.overlay_uniforms;

        let uniforms = OverlayUniforms {
            view: draw.camera.view.to_cols_array_2d(),
            proj: draw.camera.projection.to_cols_array_2d(),
            model: draw.model.to_cols_array_2d(),
            base_color: draw.params.base_color,
            intersection_color: draw.params.intersection_color,
            intersection_distance: draw.params.intersection_distance,
            _padding: [0.0; 3],
        };
        self.queue
            .write_buffer(&ring.buffer, offset, bytemuck::bytes_of(&uniforms));

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("light-volume-overlay-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.color_target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.insert_debug_marker(&format!("{} x {}", draw.volume, draw.other));
        pass.set_pipeline(&draw.material.pipeline);
        pass.set_bind_group(0, &ring.bind_group, &[offset as u32]);
        pass.set_bind_group(1, &draw.other_depth.sample_bind_group, &[]);
        draw.mesh.draw(&mut pass);
        Ok(())
    }

    fn release_depth_texture(&mut self, texture: DepthTarget) {
        self.renderer
            .pool
            .release(texture.width, texture.height, texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<DrawUniforms>(), 192);
        assert_eq!(std::mem::size_of::<OverlayUniforms>(), 240);
        assert!(std::mem::size_of::<OverlayUniforms>() as u64 <= UNIFORM_STRIDE);
    }

    #[test]
    fn test_slots_stay_claimed_across_cameras_until_submission() {
        let mut cursor = SlotCursor::new(4);
        // Two cameras recorded into one submission get disjoint offsets.
        let first: Vec<_> = (0..2).map(|_| cursor.claim()).collect();
        let second: Vec<_> = (0..2).map(|_| cursor.claim()).collect();
        assert_eq!(first, vec![Some(0), Some(UNIFORM_STRIDE)]);
        assert_eq!(second, vec![Some(2 * UNIFORM_STRIDE), Some(3 * UNIFORM_STRIDE)]);
        assert_eq!(cursor.claim(), None);

        cursor.reset();
        assert_eq!(cursor.claim(), Some(0));
    }

    #[test]
    fn test_slot_cursor_has_at_least_one_slot() {
        let mut cursor = SlotCursor::new(0);
        assert_eq!(cursor.claim(), Some(0));
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn test_vertex_stride_matches_mesh_positions() {
        assert_eq!(
            VERTEX_LAYOUT.array_stride,
            std::mem::size_of::<[f32; 3]>() as u64
        );
    }
}
