//! wgpu implementation of the resource manager seam
//!
//! Programs get explicit bind-group layouts built from their declared
//! bindings. Each dispatch packs the program's uniforms into a fresh buffer,
//! builds a bind group from the current slot table and records its own
//! compute pass; wgpu orders passes, so `memory_barrier` has nothing to do.
//! Draws are queued between `begin_draw_pass`/`end_draw_pass` and replayed
//! in one render pass into an owned colour + depth target.

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use super::{
    validate_shader_entry_point, workgroup_count, BindingKind, BindingState, BoundResource,
    BufferHandle, ComputeShaderDesc, DrawTarget, FieldFormat, GpuBackend, GpuError, GpuResult,
    PolygonMode, ProgramInfo, RenderShaderDesc, ResolvedBinding, ShaderBinding, ShaderHandle,
    TextureHandle, TextureSpec, UniformValue, WrapMode,
};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const MIP_SHADER_TEMPLATE: &str = include_str!("../shaders/compute/mip_downsample.wgsl");

enum Pipeline {
    Compute(wgpu::ComputePipeline),
    Render(wgpu::RenderPipeline),
}

struct Program {
    pipeline: Pipeline,
    layout: wgpu::BindGroupLayout,
}

struct GpuTexture {
    texture: wgpu::Texture,
    sampled_view: wgpu::TextureView,
}

struct PendingDraw {
    program: usize,
    bind_group: wgpu::BindGroup,
    index_buffer: usize,
    index_count: u32,
}

struct MipPipeline {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

struct DrawSurface {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    state: BindingState,
    programs: Vec<Program>,
    textures: Vec<GpuTexture>,
    buffers: Vec<wgpu::Buffer>,
    samplers: FxHashMap<WrapMode, wgpu::Sampler>,
    mip_pipelines: FxHashMap<FieldFormat, MipPipeline>,
    surface: DrawSurface,
    encoder: Option<wgpu::CommandEncoder>,
    pending_draws: Option<(DrawTarget, Vec<PendingDraw>)>,
    device_errors: Arc<Mutex<Vec<String>>>,
    wireframe: bool,
}

impl WgpuBackend {
    /// Features the terrain cannot run without.
    pub fn required_features() -> wgpu::Features {
        // Read-write r32float storage images for blending height procedures
        wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES
    }

    /// Wrap an existing device. `target_size` sizes the owned draw target.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        target_size: (u32, u32),
    ) -> GpuResult<Self> {
        let features = device.features();
        if !features.contains(Self::required_features()) {
            return Err(GpuError::MissingFeature(format!(
                "{:?}",
                Self::required_features()
            )));
        }
        let wireframe = features.contains(wgpu::Features::POLYGON_MODE_LINE);
        if !wireframe {
            log::warn!("[WgpuBackend::new] POLYGON_MODE_LINE unavailable, wireframe draws will be filled");
        }

        let device_errors = Arc::new(Mutex::new(Vec::new()));
        let sink = device_errors.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            log::error!("[WgpuBackend] Uncaptured GPU error: {:?}", error);
            if let Ok(mut errors) = sink.lock() {
                errors.push(error.to_string());
            }
        }));

        let surface = create_draw_surface(&device, target_size);

        let mut samplers = FxHashMap::default();
        for wrap in [WrapMode::Repeat, WrapMode::MirroredRepeat, WrapMode::ClampToEdge] {
            samplers.insert(wrap, create_sampler(&device, wrap));
        }

        let mut mip_pipelines = FxHashMap::default();
        for format in [FieldFormat::R32Float, FieldFormat::Rgba8Unorm] {
            mip_pipelines.insert(format, create_mip_pipeline(&device, format));
        }

        log::info!(
            "[WgpuBackend::new] Ready with {}x{} draw target (wireframe: {})",
            target_size.0,
            target_size.1,
            wireframe
        );

        Ok(Self {
            device,
            queue,
            state: BindingState::default(),
            programs: Vec::new(),
            textures: Vec::new(),
            buffers: Vec::new(),
            samplers,
            mip_pipelines,
            surface,
            encoder: None,
            pending_draws: None,
            device_errors,
            wireframe,
        })
    }

    /// Create a device without a window.
    pub fn new_headless(target_size: (u32, u32)) -> GpuResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(GpuError::AdapterNotFound)?;

        let adapter_features = adapter.features();
        if !adapter_features.contains(Self::required_features()) {
            return Err(GpuError::MissingFeature(format!(
                "{:?} on adapter {}",
                Self::required_features(),
                adapter.get_info().name
            )));
        }
        let optional = adapter_features & wgpu::Features::POLYGON_MODE_LINE;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Hearth Terrain Device"),
                required_features: Self::required_features() | optional,
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        log::info!(
            "[WgpuBackend::new_headless] Using adapter {}",
            adapter.get_info().name
        );
        Self::new(Arc::new(device), Arc::new(queue), target_size)
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Colour target the draw pass renders into.
    pub fn color_target(&self) -> &wgpu::Texture {
        &self.surface.color
    }

    /// Underlying wgpu texture for a handle, for interop such as previews.
    pub fn raw_texture(&self, texture: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures.get(texture.index()).map(|t| &t.texture)
    }

    /// Blocking copy of a storage buffer back to the CPU. Debug tooling
    /// only; nothing in the per-frame path reads back.
    #[cfg(feature = "native")]
    pub fn read_buffer_f32(&mut self, buffer: BufferHandle) -> GpuResult<Vec<f32>> {
        self.state.check_buffer(buffer)?;
        self.flush()?;

        let source = &self.buffers[buffer.index()];
        let size = source.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let values = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, f32>(&data).to_vec()
        };
        staging.unmap();
        Ok(values)
    }

    fn take_device_errors(&self) -> Option<String> {
        let mut errors = self.device_errors.lock().ok()?;
        if errors.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut *errors).join("; "))
        }
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Terrain Frame Encoder"),
            })
        })
    }

    fn create_bind_group(
        &self,
        program: usize,
        label: &str,
        resolved: &[ResolvedBinding],
        uniform_buffer: Option<&wgpu::Buffer>,
    ) -> wgpu::BindGroup {
        // Views must outlive the descriptor that borrows them
        let views: Vec<Option<wgpu::TextureView>> = resolved
            .iter()
            .map(|(_, resource)| match resource {
                Some(BoundResource::Image { texture, layer }) => {
                    Some(single_layer_view(&self.textures[texture.index()].texture, *layer, 0))
                }
                _ => None,
            })
            .collect();

        let mut entries = Vec::with_capacity(resolved.len() + 1);
        if let Some(buffer) = uniform_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            });
        }
        for ((binding, resource), view) in resolved.iter().zip(views.iter()) {
            let resource = match (binding.kind, resource) {
                (BindingKind::Sampler { wrap }, _) => {
                    wgpu::BindingResource::Sampler(&self.samplers[&wrap])
                }
                (_, Some(BoundResource::Texture(texture))) => {
                    wgpu::BindingResource::TextureView(&self.textures[texture.index()].sampled_view)
                }
                (_, Some(BoundResource::Image { .. })) => match view {
                    Some(view) => wgpu::BindingResource::TextureView(view),
                    None => continue,
                },
                (_, Some(BoundResource::Buffer(buffer))) => {
                    self.buffers[buffer.index()].as_entire_binding()
                }
                (_, None) => continue,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource,
            });
        }

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.programs[program].layout,
            entries: &entries,
        })
    }

    fn uniform_buffer(&self, shader: ShaderHandle) -> GpuResult<Option<wgpu::Buffer>> {
        let program = self.state.program(shader)?;
        let layout = program.uniforms();
        if layout.is_empty() {
            return Ok(None);
        }
        let bytes = layout.pack(self.state.uniform_values(shader));
        Ok(Some(self.device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some(program.label()),
                contents: &bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            },
        )))
    }
}

impl GpuBackend for WgpuBackend {
    fn create_compute_shader(&mut self, desc: &ComputeShaderDesc) -> GpuResult<ShaderHandle> {
        validate_shader_entry_point(desc.label, desc.source, desc.entry_point, "@compute")?;

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(desc.source)),
        });
        let layout = create_layout(
            &self.device,
            desc.label,
            !desc.uniforms.is_empty(),
            &desc.bindings,
            wgpu::ShaderStages::COMPUTE,
        );
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: desc.entry_point,
            });

        if let Some(errors) = self.take_device_errors() {
            return Err(GpuError::ShaderValidation {
                label: desc.label.to_string(),
                reason: errors,
            });
        }

        log::debug!("[WgpuBackend] Compute pipeline {} created", desc.label);
        self.programs.push(Program {
            pipeline: Pipeline::Compute(pipeline),
            layout,
        });
        Ok(self.state.add_program(ProgramInfo::Compute(desc.clone())))
    }

    fn create_render_shader(&mut self, desc: &RenderShaderDesc) -> GpuResult<ShaderHandle> {
        validate_shader_entry_point(desc.label, desc.source, desc.vertex_entry, "@vertex")?;
        validate_shader_entry_point(desc.label, desc.source, desc.fragment_entry, "@fragment")?;

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(desc.source)),
        });
        let layout = create_layout(
            &self.device,
            desc.label,
            !desc.uniforms.is_empty(),
            &desc.bindings,
            wgpu::ShaderStages::VERTEX_FRAGMENT,
        );
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });

        let polygon_mode = match desc.polygon_mode {
            PolygonMode::Line if self.wireframe => wgpu::PolygonMode::Line,
            _ => wgpu::PolygonMode::Fill,
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: desc.vertex_entry,
                    buffers: &[],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: desc.fragment_entry,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    polygon_mode,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        if let Some(errors) = self.take_device_errors() {
            return Err(GpuError::ShaderValidation {
                label: desc.label.to_string(),
                reason: errors,
            });
        }

        log::debug!("[WgpuBackend] Render pipeline {} created", desc.label);
        self.programs.push(Program {
            pipeline: Pipeline::Render(pipeline),
            layout,
        });
        Ok(self.state.add_program(ProgramInfo::Render(desc.clone())))
    }

    fn create_texture(&mut self, spec: &TextureSpec) -> GpuResult<TextureHandle> {
        if spec.resolution == 0 || spec.layers == 0 {
            return Err(GpuError::AllocationFailed {
                label: spec.label.clone(),
                reason: "empty extent".to_string(),
            });
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&spec.label),
            size: wgpu::Extent3d {
                width: spec.resolution,
                height: spec.resolution,
                depth_or_array_layers: spec.layers,
            },
            mip_level_count: spec.mip_level_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(spec.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let sampled_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&spec.label),
            dimension: Some(if spec.array {
                wgpu::TextureViewDimension::D2Array
            } else {
                wgpu::TextureViewDimension::D2
            }),
            ..Default::default()
        });

        if let Some(errors) = self.take_device_errors() {
            return Err(GpuError::AllocationFailed {
                label: spec.label.clone(),
                reason: errors,
            });
        }

        log::debug!(
            "[WgpuBackend] Texture {} {}x{}x{} ({:?}, {} mips)",
            spec.label,
            spec.resolution,
            spec.resolution,
            spec.layers,
            spec.format,
            spec.mip_level_count()
        );
        self.textures.push(GpuTexture {
            texture,
            sampled_view,
        });
        Ok(self.state.add_texture(spec.clone()))
    }

    fn create_storage_buffer(&mut self, label: &str, len: usize) -> GpuResult<BufferHandle> {
        if len == 0 {
            return Err(GpuError::AllocationFailed {
                label: label.to_string(),
                reason: "zero-length storage buffer".to_string(),
            });
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (len * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.buffers.push(buffer);
        Ok(self.state.add_buffer(label))
    }

    fn create_index_buffer(&mut self, label: &str, indices: &[u32]) -> GpuResult<BufferHandle> {
        // wgpu rejects empty buffers; a ring with no cells still gets a handle
        let padded = [0u32; 3];
        let contents: &[u32] = if indices.is_empty() { &padded } else { indices };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(contents),
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            });
        self.buffers.push(buffer);
        Ok(self.state.add_buffer(label))
    }

    fn bind_shader(&mut self, shader: ShaderHandle) -> GpuResult<()> {
        self.state.bind(shader)
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> GpuResult<()> {
        self.state.set_uniform(name, value)
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureHandle) {
        self.state.bind_slot(slot, BoundResource::Texture(texture));
    }

    fn bind_image(&mut self, slot: u32, texture: TextureHandle, layer: u32) {
        self.state
            .bind_slot(slot, BoundResource::Image { texture, layer });
    }

    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.state.bind_slot(slot, BoundResource::Buffer(buffer));
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> GpuResult<()> {
        let shader = self.state.bound()?;
        let ProgramInfo::Compute(desc) = self.state.program(shader)? else {
            return Err(GpuError::WrongProgramKind {
                shader: self.state.program(shader)?.label().to_string(),
                expected: "compute",
            });
        };
        let label = desc.label;
        let groups = workgroup_count([x, y, z], desc.workgroup_size);
        if groups.contains(&0) {
            return Ok(());
        }

        let resolved = self.state.resolve(shader)?;
        let uniforms = self.uniform_buffer(shader)?;
        let bind_group = self.create_bind_group(shader.index(), label, &resolved, uniforms.as_ref());

        let Pipeline::Compute(_) = &self.programs[shader.index()].pipeline else {
            return Err(GpuError::WrongProgramKind {
                shader: label.to_string(),
                expected: "compute",
            });
        };

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Terrain Frame Encoder"),
            })
        });
        if let Pipeline::Compute(pipeline) = &self.programs[shader.index()].pipeline {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
        }

        log::trace!(
            "[WgpuBackend] Dispatch {} ({}x{}x{} groups)",
            label,
            groups[0],
            groups[1],
            groups[2]
        );
        Ok(())
    }

    fn memory_barrier(&mut self) {}

    fn generate_mipmaps(&mut self, texture: TextureHandle, layer: u32) -> GpuResult<()> {
        let spec = self.state.texture(texture)?.clone();
        if layer >= spec.layers {
            return Err(GpuError::LayerOutOfRange {
                label: spec.label,
                layer,
                layers: spec.layers,
            });
        }

        let mip_pipeline = &self.mip_pipelines[&spec.format];
        let raw = &self.textures[texture.index()].texture;
        let mut bind_groups = Vec::new();
        for mip in 1..spec.mip_level_count() {
            let src = single_layer_view(raw, layer, mip - 1);
            let dst = single_layer_view(raw, layer, mip);
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Mip Downsample"),
                layout: &mip_pipeline.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&dst),
                    },
                ],
            });
            let size = (spec.resolution >> mip).max(1);
            bind_groups.push((bind_group, size));
        }

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Terrain Frame Encoder"),
            })
        });
        for (bind_group, size) in &bind_groups {
            let groups = workgroup_count([*size, *size, 1], [8, 8, 1]);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Mip Downsample"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&mip_pipeline.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups[0], groups[1], 1);
        }
        Ok(())
    }

    fn begin_draw_pass(&mut self, target: &DrawTarget) -> GpuResult<()> {
        self.pending_draws = Some((*target, Vec::new()));
        Ok(())
    }

    fn draw_indexed(&mut self, index_buffer: BufferHandle, index_count: u32) -> GpuResult<()> {
        if self.pending_draws.is_none() {
            return Err(GpuError::NoDrawPass);
        }
        self.state.check_buffer(index_buffer)?;
        let shader = self.state.bound()?;
        let program = self.state.program(shader)?;
        let label = program.label();
        if !matches!(program, ProgramInfo::Render(_)) {
            return Err(GpuError::WrongProgramKind {
                shader: label.to_string(),
                expected: "render",
            });
        }

        let resolved = self.state.resolve(shader)?;
        let uniforms = self.uniform_buffer(shader)?;
        let bind_group = self.create_bind_group(shader.index(), label, &resolved, uniforms.as_ref());

        if let Some((_, draws)) = self.pending_draws.as_mut() {
            draws.push(PendingDraw {
                program: shader.index(),
                bind_group,
                index_buffer: index_buffer.index(),
                index_count,
            });
        }
        Ok(())
    }

    fn end_draw_pass(&mut self) -> GpuResult<()> {
        let (target, draws) = self.pending_draws.take().ok_or(GpuError::NoDrawPass)?;
        let [r, g, b, a] = target.clear_color;

        self.encoder();
        let WgpuBackend {
            encoder,
            programs,
            buffers,
            surface,
            ..
        } = self;
        let Some(encoder) = encoder.as_mut() else {
            return Ok(());
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Terrain Draw Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &surface.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &surface.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &draws {
            let Pipeline::Render(pipeline) = &programs[draw.program].pipeline else {
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &draw.bind_group, &[]);
            pass.set_index_buffer(buffers[draw.index_buffer].slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count, 0, 0..1);
        }
        drop(pass);

        log::trace!("[WgpuBackend] Draw pass with {} draws", draws.len());
        Ok(())
    }

    fn flush(&mut self) -> GpuResult<()> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
        match self.take_device_errors() {
            Some(errors) => Err(GpuError::Validation(errors)),
            None => Ok(()),
        }
    }

    fn supports_wireframe(&self) -> bool {
        self.wireframe
    }
}

fn texture_format(format: FieldFormat) -> wgpu::TextureFormat {
    match format {
        FieldFormat::R32Float => wgpu::TextureFormat::R32Float,
        FieldFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

fn create_sampler(device: &wgpu::Device, wrap: WrapMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Field Sampler"),
        address_mode_u: address_mode(wrap),
        address_mode_v: address_mode(wrap),
        address_mode_w: address_mode(wrap),
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

fn single_layer_view(texture: &wgpu::Texture, layer: u32, mip: u32) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("Field Layer View"),
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_mip_level: mip,
        mip_level_count: Some(1),
        base_array_layer: layer,
        array_layer_count: Some(1),
        ..Default::default()
    })
}

fn binding_type(kind: BindingKind) -> wgpu::BindingType {
    match kind {
        BindingKind::Texture { format, array } => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float {
                filterable: format.filterable(),
            },
            view_dimension: if array {
                wgpu::TextureViewDimension::D2Array
            } else {
                wgpu::TextureViewDimension::D2
            },
            multisampled: false,
        },
        BindingKind::StorageImage { format, read_write } => wgpu::BindingType::StorageTexture {
            access: if read_write {
                wgpu::StorageTextureAccess::ReadWrite
            } else {
                wgpu::StorageTextureAccess::WriteOnly
            },
            format: texture_format(format),
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        BindingKind::StorageBuffer { read_only } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindingKind::Sampler { .. } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        }
    }
}

fn create_layout(
    device: &wgpu::Device,
    label: &str,
    has_uniforms: bool,
    bindings: &[ShaderBinding],
    visibility: wgpu::ShaderStages,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(bindings.len() + 1);
    if has_uniforms {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }
    for binding in bindings {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: binding.binding,
            visibility,
            ty: binding_type(binding.kind),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

fn create_mip_pipeline(device: &wgpu::Device, format: FieldFormat) -> MipPipeline {
    let source = MIP_SHADER_TEMPLATE.replace("FIELD_FORMAT", format.wgsl_name());
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Mip Downsample"),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Mip Downsample"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: binding_type(BindingKind::StorageImage {
                    format,
                    read_write: false,
                }),
                count: None,
            },
        ],
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Mip Downsample"),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("Mip Downsample"),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: "main",
    });
    MipPipeline { pipeline, layout }
}

fn create_draw_surface(device: &wgpu::Device, size: (u32, u32)) -> DrawSurface {
    let extent = wgpu::Extent3d {
        width: size.0.max(1),
        height: size.1.max(1),
        depth_or_array_layers: 1,
    };
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Terrain Color Target"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Terrain Depth Target"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
    DrawSurface {
        color,
        color_view,
        depth_view,
    }
}
