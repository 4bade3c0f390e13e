//! Headless backend that validates calls and keeps a command log
//!
//! Every call is checked exactly as the wgpu backend checks it (handles,
//! bindings, uniform names and types), then appended to an in-memory log.
//! Nothing executes; tools that want results replay the log themselves.

use rustc_hash::FxHashMap;

use super::{
    validate_shader_entry_point, workgroup_count, BindingState, BoundResource, BufferHandle,
    ComputeShaderDesc, DrawTarget, GpuBackend, GpuError, GpuResult, ProgramInfo,
    RenderShaderDesc, ShaderHandle, TextureHandle, TextureSpec, UniformValue,
};

/// One recorded compute dispatch with a snapshot of its inputs
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub shader: ShaderHandle,
    pub label: &'static str,
    pub invocations: [u32; 3],
    pub workgroups: [u32; 3],
    pub uniforms: FxHashMap<String, UniformValue>,
    pub resources: Vec<(u32, BoundResource)>,
}

impl DispatchRecord {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    pub fn resource(&self, slot: u32) -> Option<BoundResource> {
        self.resources
            .iter()
            .find(|(binding, _)| *binding == slot)
            .map(|(_, resource)| *resource)
    }

    /// Layer written through the storage image in `slot`, if any.
    pub fn image_layer(&self, slot: u32) -> Option<(TextureHandle, u32)> {
        match self.resource(slot)? {
            BoundResource::Image { texture, layer } => Some((texture, layer)),
            _ => None,
        }
    }
}

/// One recorded indexed draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub shader: ShaderHandle,
    pub label: &'static str,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    pub uniforms: FxHashMap<String, UniformValue>,
}

impl DrawRecord {
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    Dispatch(DispatchRecord),
    Barrier,
    GenerateMips { texture: TextureHandle, layer: u32 },
    BeginDrawPass(DrawTarget),
    Draw(DrawRecord),
    EndDrawPass,
    Flush,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    state: BindingState,
    buffer_lengths: Vec<usize>,
    commands: Vec<GpuCommand>,
    in_draw_pass: bool,
    wireframe: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            wireframe: true,
            ..Default::default()
        }
    }

    /// Backend that reports no line-mode rasterization.
    pub fn without_wireframe() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn dispatches(&self) -> impl Iterator<Item = &DispatchRecord> {
        self.commands.iter().filter_map(|command| match command {
            GpuCommand::Dispatch(record) => Some(record),
            _ => None,
        })
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches().count()
    }

    pub fn dispatches_of<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a DispatchRecord> {
        self.dispatches().filter(move |record| record.label == label)
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.commands.iter().filter_map(|command| match command {
            GpuCommand::Draw(record) => Some(record),
            _ => None,
        })
    }

    pub fn mip_regenerations(&self) -> Vec<(TextureHandle, u32)> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::GenerateMips { texture, layer } => Some((*texture, *layer)),
                _ => None,
            })
            .collect()
    }

    pub fn barrier_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, GpuCommand::Barrier))
            .count()
    }

    pub fn texture_spec(&self, texture: TextureHandle) -> Option<&TextureSpec> {
        self.state.textures.get(texture.index())
    }

    pub fn buffer_len(&self, buffer: BufferHandle) -> Option<usize> {
        self.buffer_lengths.get(buffer.index()).copied()
    }

    pub fn buffer_label(&self, buffer: BufferHandle) -> Option<&str> {
        self.state.buffer_labels.get(buffer.index()).map(String::as_str)
    }
}

impl GpuBackend for RecordingBackend {
    fn create_compute_shader(&mut self, desc: &ComputeShaderDesc) -> GpuResult<ShaderHandle> {
        validate_shader_entry_point(desc.label, desc.source, desc.entry_point, "@compute")?;
        log::trace!("[RecordingBackend] Compute shader {}", desc.label);
        Ok(self.state.add_program(ProgramInfo::Compute(desc.clone())))
    }

    fn create_render_shader(&mut self, desc: &RenderShaderDesc) -> GpuResult<ShaderHandle> {
        validate_shader_entry_point(desc.label, desc.source, desc.vertex_entry, "@vertex")?;
        validate_shader_entry_point(desc.label, desc.source, desc.fragment_entry, "@fragment")?;
        log::trace!("[RecordingBackend] Render shader {}", desc.label);
        Ok(self.state.add_program(ProgramInfo::Render(desc.clone())))
    }

    fn create_texture(&mut self, spec: &TextureSpec) -> GpuResult<TextureHandle> {
        if spec.resolution == 0 || spec.layers == 0 {
            return Err(GpuError::AllocationFailed {
                label: spec.label.clone(),
                reason: format!(
                    "empty extent {}x{}x{}",
                    spec.resolution, spec.resolution, spec.layers
                ),
            });
        }
        Ok(self.state.add_texture(spec.clone()))
    }

    fn create_storage_buffer(&mut self, label: &str, len: usize) -> GpuResult<BufferHandle> {
        if len == 0 {
            return Err(GpuError::AllocationFailed {
                label: label.to_string(),
                reason: "zero-length storage buffer".to_string(),
            });
        }
        self.buffer_lengths.push(len);
        Ok(self.state.add_buffer(label))
    }

    fn create_index_buffer(&mut self, label: &str, indices: &[u32]) -> GpuResult<BufferHandle> {
        self.buffer_lengths.push(indices.len());
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
        let workgroups = workgroup_count([x, y, z], desc.workgroup_size);
        let resources = self
            .state
            .resolve(shader)?
            .into_iter()
            .filter_map(|(binding, resource)| resource.map(|r| (binding.binding, r)))
            .collect();

        self.commands.push(GpuCommand::Dispatch(DispatchRecord {
            shader,
            label,
            invocations: [x, y, z],
            workgroups,
            uniforms: self.state.uniform_values(shader).clone(),
            resources,
        }));
        Ok(())
    }

    fn memory_barrier(&mut self) {
        self.commands.push(GpuCommand::Barrier);
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle, layer: u32) -> GpuResult<()> {
        let spec = self.state.texture(texture)?;
        if layer >= spec.layers {
            return Err(GpuError::LayerOutOfRange {
                label: spec.label.clone(),
                layer,
                layers: spec.layers,
            });
        }
        if spec.mip_level_count() > 1 {
            self.commands
                .push(GpuCommand::GenerateMips { texture, layer });
        }
        Ok(())
    }

    fn begin_draw_pass(&mut self, target: &DrawTarget) -> GpuResult<()> {
        self.in_draw_pass = true;
        self.commands.push(GpuCommand::BeginDrawPass(*target));
        Ok(())
    }

    fn draw_indexed(&mut self, index_buffer: BufferHandle, index_count: u32) -> GpuResult<()> {
        if !self.in_draw_pass {
            return Err(GpuError::NoDrawPass);
        }
        self.state.check_buffer(index_buffer)?;
        let shader = self.state.bound()?;
        let ProgramInfo::Render(desc) = self.state.program(shader)? else {
            return Err(GpuError::WrongProgramKind {
                shader: self.state.program(shader)?.label().to_string(),
                expected: "render",
            });
        };
        let label = desc.label;
        self.state.resolve(shader)?;

        self.commands.push(GpuCommand::Draw(DrawRecord {
            shader,
            label,
            index_buffer,
            index_count,
            uniforms: self.state.uniform_values(shader).clone(),
        }));
        Ok(())
    }

    fn end_draw_pass(&mut self) -> GpuResult<()> {
        if !self.in_draw_pass {
            return Err(GpuError::NoDrawPass);
        }
        self.in_draw_pass = false;
        self.commands.push(GpuCommand::EndDrawPass);
        Ok(())
    }

    fn flush(&mut self) -> GpuResult<()> {
        self.commands.push(GpuCommand::Flush);
        Ok(())
    }

    fn supports_wireframe(&self) -> bool {
        self.wireframe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{
        BindingKind, FieldFormat, ShaderBinding, UniformLayout, UniformType,
    };

    const SOURCE: &str = "@compute @workgroup_size(8, 8, 1)\nfn main() {}\n";

    fn test_shader() -> ComputeShaderDesc {
        ComputeShaderDesc {
            label: "test",
            source: SOURCE,
            entry_point: "main",
            workgroup_size: [8, 8, 1],
            uniforms: UniformLayout::new(&[("uValue", UniformType::Float)]),
            bindings: vec![ShaderBinding::new(
                1,
                BindingKind::StorageImage {
                    format: FieldFormat::R32Float,
                    read_write: true,
                },
            )],
        }
    }

    #[test]
    fn test_dispatch_records_uniforms_and_image() {
        let mut backend = RecordingBackend::new();
        let shader = backend.create_compute_shader(&test_shader()).unwrap();
        let texture = backend
            .create_texture(&TextureSpec::array("t", 64, 3, FieldFormat::R32Float, false))
            .unwrap();

        backend.bind_shader(shader).unwrap();
        backend.set_uniform("uValue", UniformValue::Float(0.5)).unwrap();
        backend.bind_image(1, texture, 2);
        backend.dispatch(64, 64, 1).unwrap();

        let record = backend.dispatches().next().unwrap();
        assert_eq!(record.workgroups, [8, 8, 1]);
        assert_eq!(record.uniform("uValue"), Some(UniformValue::Float(0.5)));
        assert_eq!(record.image_layer(1), Some((texture, 2)));
    }

    #[test]
    fn test_unknown_uniform_is_rejected() {
        let mut backend = RecordingBackend::new();
        let shader = backend.create_compute_shader(&test_shader()).unwrap();
        backend.bind_shader(shader).unwrap();
        assert!(matches!(
            backend.set_uniform("uMissing", UniformValue::Float(1.0)),
            Err(GpuError::UnknownUniform { .. })
        ));
        assert!(matches!(
            backend.set_uniform("uValue", UniformValue::Int(1)),
            Err(GpuError::UniformTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_dispatch_without_binding_fails() {
        let mut backend = RecordingBackend::new();
        let shader = backend.create_compute_shader(&test_shader()).unwrap();
        backend.bind_shader(shader).unwrap();
        assert!(matches!(
            backend.dispatch(8, 8, 1),
            Err(GpuError::BindingMismatch { .. })
        ));
    }

    #[test]
    fn test_layer_out_of_range() {
        let mut backend = RecordingBackend::new();
        let shader = backend.create_compute_shader(&test_shader()).unwrap();
        let texture = backend
            .create_texture(&TextureSpec::array("t", 64, 2, FieldFormat::R32Float, false))
            .unwrap();
        backend.bind_shader(shader).unwrap();
        backend.bind_image(1, texture, 2);
        assert!(matches!(
            backend.dispatch(8, 8, 1),
            Err(GpuError::LayerOutOfRange { .. })
        ));
    }

    #[test]
    fn test_draw_outside_pass_fails() {
        let mut backend = RecordingBackend::new();
        let buffer = backend.create_index_buffer("i", &[0, 1, 2]).unwrap();
        assert!(matches!(
            backend.draw_indexed(buffer, 3),
            Err(GpuError::NoDrawPass)
        ));
    }

    #[test]
    fn test_mips_skipped_for_single_level_textures() {
        let mut backend = RecordingBackend::new();
        let flat = backend
            .create_texture(&TextureSpec::plane("s", 64, FieldFormat::Rgba8Unorm, false))
            .unwrap();
        let mipped = backend
            .create_texture(&TextureSpec::plane("n", 64, FieldFormat::Rgba8Unorm, true))
            .unwrap();
        backend.generate_mipmaps(flat, 0).unwrap();
        backend.generate_mipmaps(mipped, 0).unwrap();
        assert_eq!(backend.mip_regenerations(), vec![(mipped, 0)]);
    }
}
