use std::collections::HashMap;

use crate::assets::PixelBuffer;
use crate::error::{RenderError, Result};
use crate::paint::Color;

use super::backend::{Backend, DrawCall, ProgramId, RenderTarget, TextureId};
use super::program::{attrib, binding, ProgramSource};

/// Format of every texture the backend creates.
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn premul_alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: component, alpha: component }
}

// ── vertex streams ────────────────────────────────────────────────────────

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![attrib::POSITION => Float32x2];
const UV_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![attrib::UV => Float32x2];
const INDEX_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![attrib::TEXTURE_INDEX => Float32];
const ALPHA_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![attrib::ALPHA => Float32];

fn stream_layout(components: u64, attributes: &'static [wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: components * std::mem::size_of::<f32>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes,
    }
}

/// A growable vertex buffer for one attribute stream.
struct Stream {
    label: &'static str,
    buffer: Option<wgpu::Buffer>,
    capacity: u64,
}

impl Stream {
    const fn new(label: &'static str) -> Self {
        Self { label, buffer: None, capacity: 0 }
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[f32]) {
        let bytes = std::mem::size_of_val(data) as u64;
        if self.buffer.is_none() || bytes > self.capacity {
            let capacity = bytes.next_power_of_two().max(1024);
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(self.label),
                size: capacity,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
            self.capacity = capacity;
        }
        if let Some(buffer) = &self.buffer {
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
        }
    }
}

// ── resources ─────────────────────────────────────────────────────────────

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct Program {
    slot_count: usize,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    /// One pipeline per target format, built on first use.
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

/// [`Backend`] on a wgpu device.
///
/// Every operation records and submits its own command buffer, so queue
/// writes and draws are observed in call order. Textures hold premultiplied
/// color; uploads and readbacks convert from and to straight alpha.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    screen_format: wgpu::TextureFormat,
    screen: Option<wgpu::TextureView>,
    textures: HashMap<TextureId, GpuTexture>,
    next_texture: u32,
    programs: Vec<Program>,
    sampler: wgpu::Sampler,
    projection_ubo: wgpu::Buffer,
    streams: [Stream; 4],
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, screen_format: wgpu::TextureFormat) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mosaic batch sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let projection_ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mosaic projection ubo"),
            size: std::mem::size_of::<[[f32; 4]; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            device,
            queue,
            screen_format,
            screen: None,
            textures: HashMap::new(),
            next_texture: 1,
            programs: Vec::new(),
            sampler,
            projection_ubo,
            streams: [
                Stream::new("mosaic position vbo"),
                Stream::new("mosaic uv vbo"),
                Stream::new("mosaic texture index vbo"),
                Stream::new("mosaic alpha vbo"),
            ],
        }
    }

    /// Sets the view `RenderTarget::Screen` draws into for the current frame.
    pub fn set_screen(&mut self, view: Option<wgpu::TextureView>) {
        self.screen = view;
    }

    pub fn set_screen_format(&mut self, format: wgpu::TextureFormat) {
        self.screen_format = format;
    }

    fn target_view(&self, target: RenderTarget) -> Result<(&wgpu::TextureView, wgpu::TextureFormat)> {
        match target {
            RenderTarget::Screen => self
                .screen
                .as_ref()
                .map(|v| (v, self.screen_format))
                .ok_or_else(|| RenderError::Backend("no screen view bound for this frame".into())),
            RenderTarget::Texture(id) => self
                .textures
                .get(&id)
                .map(|t| (&t.view, TEXTURE_FORMAT))
                .ok_or_else(|| RenderError::Backend(format!("unknown texture {id:?}"))),
        }
    }

    fn ensure_pipeline(&mut self, program: ProgramId, format: wgpu::TextureFormat) -> Result<()> {
        let Some(p) = self.programs.get_mut(program.0 as usize) else {
            return Err(RenderError::Backend(format!("unknown program {program:?}")));
        };
        if p.pipelines.contains_key(&format) {
            return Ok(());
        }

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("mosaic batch pipeline"),
            layout: Some(&p.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &p.module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[
                    stream_layout(2, &POSITION_ATTRS),
                    stream_layout(2, &UV_ATTRS),
                    stream_layout(1, &INDEX_ATTRS),
                    stream_layout(1, &ALPHA_ATTRS),
                ],
            },
            fragment: Some(wgpu::FragmentState {
                module: &p.module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(premul_alpha_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        log::debug!("batch pipeline for {} slots, {format:?}", p.slot_count);
        p.pipelines.insert(format, pipeline);
        Ok(())
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) -> wgpu::SubmissionIndex {
        self.queue.submit(std::iter::once(encoder.finish()))
    }
}

impl Backend for WgpuBackend {
    fn max_texture_units(&self) -> usize {
        self.device.limits().max_sampled_textures_per_shader_stage as usize
    }

    fn premultiplied_textures(&self) -> bool {
        true
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        source.validate()?;

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mosaic batch shader"),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
        });

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: binding::PROJECTION,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<[[f32; 4]; 4]>() as u64),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: binding::SAMPLER,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        entries.extend((0..source.slot_count).map(|i| wgpu::BindGroupLayoutEntry {
            binding: binding::FIRST_TEXTURE + i as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }));

        let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mosaic batch bgl"),
            entries: &entries,
        });
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mosaic batch pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        self.programs.push(Program {
            slot_count: source.slot_count,
            module,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
        });
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId> {
        let (width, height) = (width.max(1), height.max(1));
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(RenderError::Backend(format!("texture {width}x{height} exceeds device limit {limit}")));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mosaic texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(id, GpuTexture { texture, view, width, height });
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, pixels: &PixelBuffer) -> Result<()> {
        let t = self
            .textures
            .get(&texture)
            .ok_or_else(|| RenderError::Backend(format!("unknown texture {texture:?}")))?;
        if (t.width, t.height) != (pixels.width(), pixels.height()) {
            return Err(RenderError::Backend(format!(
                "texture {texture:?} is {}x{}, got {}x{}",
                t.width,
                t.height,
                pixels.width(),
                pixels.height()
            )));
        }

        let mut data = pixels.data().to_vec();
        for px in data.chunks_exact_mut(4) {
            let a = px[3] as u16;
            for c in &mut px[..3] {
                *c = ((*c as u16 * a + 127) / 255) as u8;
            }
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &t.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * t.width),
                rows_per_image: Some(t.height),
            },
            wgpu::Extent3d { width: t.width, height: t.height, depth_or_array_layers: 1 },
        );
        Ok(())
    }

    fn read_texture(&mut self, texture: TextureId) -> Result<PixelBuffer> {
        let t = self
            .textures
            .get(&texture)
            .ok_or_else(|| RenderError::Backend(format!("unknown texture {texture:?}")))?;
        let (width, height) = (t.width, t.height);
        let unpadded = 4 * width;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mosaic readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("mosaic readback encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &t.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        let index = self.submit(encoder);

        let slice = buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        self.device
            .poll(wgpu::PollType::Wait { submission_index: Some(index), timeout: None })
            .map_err(|e| RenderError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| RenderError::Readback(e.to_string()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        let mut data = Vec::with_capacity((unpadded * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded as usize) {
                data.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        for px in data.chunks_exact_mut(4) {
            let a = px[3] as u16;
            if a == 0 {
                px.copy_from_slice(&[0; 4]);
                continue;
            }
            for c in &mut px[..3] {
                *c = ((*c as u16 * 255 + a / 2) / a).min(255) as u8;
            }
        }
        PixelBuffer::from_rgba(width, height, data)
            .ok_or_else(|| RenderError::Readback(format!("texture {texture:?} returned a short buffer")))
    }

    fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(t) = self.textures.remove(&texture) {
            t.texture.destroy();
        }
    }

    fn clear(&mut self, target: RenderTarget, color: Color) -> Result<()> {
        let (view, _) = self.target_view(target)?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("mosaic clear encoder") });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mosaic clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(color.to_wgpu()), store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }
        self.submit(encoder);
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let n = call.vertex_count as usize;
        if n == 0 {
            return Ok(());
        }
        let (_, format) = self.target_view(call.target)?;
        self.ensure_pipeline(call.program, format)?;

        let [positions, uvs, indices, alphas] = &mut self.streams;
        positions.upload(&self.device, &self.queue, &call.positions[..n * 2]);
        uvs.upload(&self.device, &self.queue, &call.uvs[..n * 2]);
        indices.upload(&self.device, &self.queue, &call.indices[..n]);
        alphas.upload(&self.device, &self.queue, &call.alphas[..n]);
        self.queue.write_buffer(&self.projection_ubo, 0, bytemuck::bytes_of(&call.projection));

        let (view, format) = self.target_view(call.target)?;
        let Some(program) = self.programs.get(call.program.0 as usize) else {
            return Err(RenderError::Backend(format!("unknown program {:?}", call.program)));
        };
        let Some(pipeline) = program.pipelines.get(&format) else {
            return Err(RenderError::Backend(format!("no pipeline for {format:?}")));
        };

        let mut entries = vec![
            wgpu::BindGroupEntry { binding: binding::PROJECTION, resource: self.projection_ubo.as_entire_binding() },
            wgpu::BindGroupEntry { binding: binding::SAMPLER, resource: wgpu::BindingResource::Sampler(&self.sampler) },
        ];
        for i in 0..program.slot_count {
            let id = call.textures.get(i).or_else(|| call.textures.first()).copied();
            let Some(t) = id.and_then(|id| self.textures.get(&id)) else {
                return Err(RenderError::Backend(format!("texture for slot {i} is missing")));
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding::FIRST_TEXTURE + i as u32,
                resource: wgpu::BindingResource::TextureView(&t.view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mosaic batch bind group"),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let buffers: Vec<&wgpu::Buffer> = self.streams.iter().filter_map(|s| s.buffer.as_ref()).collect();
        let [pos_vbo, uv_vbo, index_vbo, alpha_vbo] = buffers[..] else {
            return Err(RenderError::Backend("vertex streams were not allocated".into()));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("mosaic batch encoder") });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mosaic batch pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.set_vertex_buffer(0, pos_vbo.slice(..));
            rpass.set_vertex_buffer(1, uv_vbo.slice(..));
            rpass.set_vertex_buffer(2, index_vbo.slice(..));
            rpass.set_vertex_buffer(3, alpha_vbo.slice(..));
            rpass.draw(0..call.vertex_count, 0..1);
        }
        self.submit(encoder);
        Ok(())
    }
}
