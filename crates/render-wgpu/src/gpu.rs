use std::collections::HashMap;
use std::num::NonZeroU64;

use portal_common::{BufferId, ProgramId, TextureId, VertexArrayId, Viewport};
use portal_render::{
    BufferUsage, ClearState, DrawCall, DrawRange, GraphicsDevice, LinkedProgram, ProgramInterface,
    RenderError, SamplerConfig, TextureImage, VertexArrayDesc, VertexLayout,
};
use wgpu::util::DeviceExt;

use crate::convert;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct GpuVertexArray {
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    layout: VertexLayout,
}

struct GpuProgram {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    interface: ProgramInterface,
    group_layouts: Vec<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    layout: VertexLayout,
    depth: bool,
}

#[derive(Debug, Clone, Copy)]
struct UniformSpan {
    group: u32,
    binding: u32,
    offset: u64,
    size: u64,
}

struct PendingDraw {
    key: PipelineKey,
    vertex_array: VertexArrayId,
    range: DrawRange,
    uniforms: Vec<UniformSpan>,
    textures: Vec<Option<TextureId>>,
}

/// Draws recorded since `begin_frame`. Uniform bytes for every draw share one
/// arena, each block at an offset the adapter accepts for uniform bindings.
struct Frame {
    clear: ClearState,
    arena: Vec<u8>,
    draws: Vec<PendingDraw>,
}

impl Frame {
    fn new(clear: ClearState) -> Self {
        Self {
            clear,
            arena: Vec::new(),
            draws: Vec::new(),
        }
    }
}

/// [`GraphicsDevice`] on wgpu. Draws are recorded during the frame and
/// encoded into a single render pass at `present`.
pub struct WgpuDevice {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    uniform_alignment: u64,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    vertex_arrays: HashMap<VertexArrayId, GpuVertexArray>,
    textures: HashMap<TextureId, GpuTexture>,
    programs: HashMap<ProgramId, GpuProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    /// 1x1 white, sampled by any slot whose unit has nothing bound.
    fallback: GpuTexture,
    frame: Frame,
}

impl WgpuDevice {
    /// Create a surface for `target`, pick an adapter and open a device.
    pub fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        viewport: Viewport,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::creation("surface", e))?;

        let options = wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        };
        let Some(adapter) = pollster::block_on(instance.request_adapter(&options)) else {
            return Err(RenderError::creation("adapter", "no compatible adapter"));
        };

        let descriptor = wgpu::DeviceDescriptor {
            label: Some("portal_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
        };
        let requested = pollster::block_on(adapter.request_device(&descriptor, None));
        let (device, queue) = requested.map_err(|e| RenderError::creation("device", e))?;

        let caps = surface.get_capabilities(&adapter);
        let srgb = caps.formats.iter().find(|f| f.is_srgb());
        let Some(&format) = srgb.or(caps.formats.first()) else {
            return Err(RenderError::creation("surface", "no surface formats"));
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: viewport.width.max(1),
            height: viewport.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = create_depth_texture(&device, config.width, config.height);
        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let white = SamplerConfig::default();
        let fallback = upload_texture(&device, &queue, "white 1x1", 1, 1, &[255; 4], &white);

        let backend = adapter.get_info().backend;
        tracing::info!("GPU initialized with {backend:?} backend ({format:?})");

        Ok(Self {
            surface,
            device,
            queue,
            config,
            depth_view,
            uniform_alignment,
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            fallback,
            frame: Frame::new(ClearState::default()),
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn build_pipeline(&self, key: &PipelineKey) -> Option<wgpu::RenderPipeline> {
        let program = self.programs.get(&key.program)?;
        let attributes = convert::vertex_attributes(&key.layout);
        let buffers = [wgpu::VertexBufferLayout {
            array_stride: key.layout.stride as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let (program_id, stride) = (key.program, key.layout.stride);
        tracing::debug!("building pipeline for {program_id} (stride {stride})");

        Some(self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("portal_pipeline"),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some(program.interface.vertex_entry.as_str()),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Some(program.interface.fragment_entry.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: key.depth.then(|| wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        }))
    }

    /// One bind group per group index the program addresses.
    fn bind_groups(
        &self,
        draw: &PendingDraw,
        arena: Option<&wgpu::Buffer>,
    ) -> Option<Vec<wgpu::BindGroup>> {
        let program = self.programs.get(&draw.key.program)?;
        let mut groups = Vec::with_capacity(program.group_layouts.len());
        for (group, layout) in program.group_layouts.iter().enumerate() {
            let group = group as u32;
            let mut entries = Vec::new();
            for span in draw.uniforms.iter().filter(|s| s.group == group) {
                entries.push(wgpu::BindGroupEntry {
                    binding: span.binding,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: arena?,
                        offset: span.offset,
                        size: NonZeroU64::new(span.size),
                    }),
                });
            }
            for (slot, texture) in program.interface.texture_slots.iter().zip(&draw.textures) {
                if slot.group != group {
                    continue;
                }
                let gpu = texture
                    .and_then(|id| self.textures.get(&id))
                    .unwrap_or(&self.fallback);
                entries.push(wgpu::BindGroupEntry {
                    binding: slot.binding,
                    resource: wgpu::BindingResource::TextureView(&gpu.view),
                });
                if let Some(sampler_binding) = slot.sampler_binding {
                    entries.push(wgpu::BindGroupEntry {
                        binding: sampler_binding,
                        resource: wgpu::BindingResource::Sampler(&gpu.sampler),
                    });
                }
            }
            groups.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("portal_draw_bind_group"),
                layout,
                entries: &entries,
            }));
        }
        Some(groups)
    }
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
    sampler: &SamplerConfig,
) -> GpuTexture {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&convert::sampler_descriptor(sampler));
    GpuTexture {
        texture,
        view,
        sampler,
    }
}

fn group_layout_entries(
    interface: &ProgramInterface,
    group: u32,
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::new();
    let uniforms = &interface.uniform_buffers;
    for uniform in uniforms.iter().filter(|u| u.group == group) {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: uniform.binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(uniform.size as u64),
            },
            count: None,
        });
    }
    for slot in interface.texture_slots.iter().filter(|t| t.group == group) {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot.binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        if let Some(binding) = slot.sampler_binding {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
    }
    entries
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(
        &mut self,
        id: BufferId,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<(), RenderError> {
        let usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        };
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("portal_buffer"),
            contents,
            usage,
        });
        self.buffers.insert(id, buffer);
        Ok(())
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(&id) {
            buffer.destroy();
        }
    }

    fn create_vertex_array(
        &mut self,
        id: VertexArrayId,
        desc: &VertexArrayDesc<'_>,
    ) -> Result<(), RenderError> {
        self.vertex_arrays.insert(
            id,
            GpuVertexArray {
                vertex_buffer: desc.vertex_buffer,
                index_buffer: desc.index_buffer,
                layout: desc.layout.clone(),
            },
        );
        Ok(())
    }

    fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        self.vertex_arrays.remove(&id);
    }

    fn create_texture(
        &mut self,
        id: TextureId,
        image: &TextureImage,
        sampler: &SamplerConfig,
    ) -> Result<(), RenderError> {
        let rgba = image.to_rgba8();
        let texture = upload_texture(
            &self.device,
            &self.queue,
            "portal_texture",
            image.width(),
            image.height(),
            &rgba,
            sampler,
        );
        self.textures.insert(id, texture);
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if let Some(gpu) = self.textures.remove(&id) {
            gpu.texture.destroy();
        }
    }

    fn create_program(
        &mut self,
        id: ProgramId,
        program: &LinkedProgram,
    ) -> Result<(), RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("portal_vertex_stage"),
            source: wgpu::ShaderSource::Wgsl(program.vertex_source.as_str().into()),
        });
        let fragment = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("portal_fragment_stage"),
            source: wgpu::ShaderSource::Wgsl(program.fragment_source.as_str().into()),
        });
        let group_layouts: Vec<wgpu::BindGroupLayout> = (0..program.interface.group_count())
            .map(|group| {
                self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("portal_bind_group_layout"),
                    entries: &group_layout_entries(&program.interface, group),
                })
            })
            .collect();
        let layout_refs: Vec<&wgpu::BindGroupLayout> = group_layouts.iter().collect();
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("portal_pipeline_layout"),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::creation("shader program", err));
        }

        self.programs.insert(
            id,
            GpuProgram {
                vertex,
                fragment,
                interface: program.interface.clone(),
                group_layouts,
                pipeline_layout,
            },
        );
        Ok(())
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
        self.pipelines.retain(|key, _| key.program != id);
    }

    fn resize(&mut self, viewport: Viewport) {
        self.config.width = viewport.width.max(1);
        self.config.height = viewport.height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_texture(&self.device, self.config.width, self.config.height);
    }

    fn begin_frame(&mut self, clear: &ClearState) {
        self.frame = Frame::new(*clear);
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        let Some(va) = self.vertex_arrays.get(&call.vertex_array) else {
            tracing::error!("draw references unknown {}", call.vertex_array);
            return;
        };
        let key = PipelineKey {
            program: call.program,
            layout: va.layout.clone(),
            depth: self.frame.clear.depth,
        };

        let mut uniforms = Vec::with_capacity(call.uniforms.len());
        for block in call.uniforms {
            let arena = &mut self.frame.arena;
            let offset = convert::align_up(arena.len() as u64, self.uniform_alignment);
            arena.resize(offset as usize, 0);
            arena.extend_from_slice(&block.bytes);
            uniforms.push(UniformSpan {
                group: block.group,
                binding: block.binding,
                offset,
                size: block.bytes.len() as u64,
            });
        }

        self.frame.draws.push(PendingDraw {
            key,
            vertex_array: call.vertex_array,
            range: call.range,
            uniforms,
            textures: call.textures.to_vec(),
        });
    }

    fn present(&mut self) -> Result<(), RenderError> {
        let clear = self.frame.clear;
        let frame = std::mem::replace(&mut self.frame, Frame::new(clear));

        let output = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::warn!("surface lost or outdated; reconfiguring and skipping frame");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timed out; skipping frame");
                return Ok(());
            }
            Err(e) => return Err(RenderError::creation("frame", e)),
        };
        let target = output.texture.create_view(&Default::default());

        for draw in &frame.draws {
            if !self.pipelines.contains_key(&draw.key) {
                if let Some(pipeline) = self.build_pipeline(&draw.key) {
                    self.pipelines.insert(draw.key.clone(), pipeline);
                }
            }
        }

        let arena = (!frame.arena.is_empty()).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("portal_uniform_arena"),
                contents: &frame.arena,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });
        let bind_groups: Vec<Option<Vec<wgpu::BindGroup>>> = frame
            .draws
            .iter()
            .map(|draw| self.bind_groups(draw, arena.as_ref()))
            .collect();

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("portal_encoder"),
        });
        {
            let [r, g, b, a] = frame.clear.color.map(f64::from);
            let depth = frame.clear.depth.then(|| wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("portal_main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth,
                ..Default::default()
            });

            for (draw, groups) in frame.draws.iter().zip(&bind_groups) {
                let pipeline = self.pipelines.get(&draw.key);
                let va = self.vertex_arrays.get(&draw.vertex_array);
                let (Some(pipeline), Some(groups), Some(va)) = (pipeline, groups, va) else {
                    tracing::error!("skipping draw of {}: state incomplete", draw.vertex_array);
                    continue;
                };
                let Some(vertex_buffer) = self.buffers.get(&va.vertex_buffer) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                for (index, group) in groups.iter().enumerate() {
                    pass.set_bind_group(index as u32, group, &[]);
                }
                pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                match draw.range {
                    DrawRange::Arrays { first, count } => pass.draw(first..first + count, 0..1),
                    DrawRange::Indexed { count } => {
                        let index_buffer = va.index_buffer.and_then(|id| self.buffers.get(&id));
                        let Some(index_buffer) = index_buffer else {
                            continue;
                        };
                        pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..count, 0, 0..1);
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
