//! GPU resource manager seam
//!
//! Terrain stages never touch a graphics API directly. They request shaders,
//! textures and buffers from a [`GpuBackend`] and get back opaque handles,
//! then drive the backend the way a GL-style state machine is driven:
//! bind a shader, set uniforms by name, bind resources to slots, dispatch.
//!
//! Two backends ship with the crate:
//! - [`WgpuBackend`] records real work on a wgpu device.
//! - [`RecordingBackend`] validates every call the same way and keeps a
//!   command log, which is what headless tools and the test-suite inspect.

pub mod recording;
pub mod shaders;
pub mod uniforms;
pub mod wgpu_backend;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use recording::{DispatchRecord, DrawRecord, GpuCommand, RecordingBackend};
pub use uniforms::{UniformLayout, UniformType, UniformValue};
pub use wgpu_backend::WgpuBackend;

/// GPU-level failures
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    AdapterNotFound,

    #[error("Device request failed: {0}")]
    DeviceRequest(String),

    #[error("Device lacks required feature: {0}")]
    MissingFeature(String),

    #[error("Invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    #[error("No shader bound")]
    NoShaderBound,

    #[error("Shader {label} failed validation: {reason}")]
    ShaderValidation { label: String, reason: String },

    #[error("Shader {shader} has no uniform named {name}")]
    UnknownUniform { shader: String, name: String },

    #[error("Uniform {name} of shader {shader} expects {expected:?}, got {found:?}")]
    UniformTypeMismatch {
        shader: String,
        name: String,
        expected: UniformType,
        found: UniformType,
    },

    #[error("Shader {shader} binding {binding}: expected {expected}, found {found}")]
    BindingMismatch {
        shader: String,
        binding: u32,
        expected: String,
        found: String,
    },

    #[error("Shader {shader} is not a {expected} program")]
    WrongProgramKind {
        shader: String,
        expected: &'static str,
    },

    #[error("Layer {layer} out of range for texture {label} with {layers} layers")]
    LayerOutOfRange {
        label: String,
        layer: u32,
        layers: u32,
    },

    #[error("Draw call issued outside a draw pass")]
    NoDrawPass,

    #[error("Allocation of {label} failed: {reason}")]
    AllocationFailed { label: String, reason: String },

    #[error("Device reported validation errors: {0}")]
    Validation(String),

    #[error("Buffer readback failed: {0}")]
    Readback(String),
}

pub type GpuResult<T> = Result<T, GpuError>;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            pub fn id(self) -> u32 {
                self.0
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle_type!(
    /// Compute or render program
    ShaderHandle
);
handle_type!(
    /// 2D texture or texture array
    TextureHandle
);
handle_type!(
    /// Index buffer or `f32` storage buffer
    BufferHandle
);

/// Texel formats fields are stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldFormat {
    /// Heights. Read-write as a storage image, not filterable.
    R32Float,
    /// Normals, shadows, weights, albedo, roughness.
    Rgba8Unorm,
}

impl FieldFormat {
    pub fn filterable(self) -> bool {
        matches!(self, FieldFormat::Rgba8Unorm)
    }

    pub fn wgsl_name(self) -> &'static str {
        match self {
            FieldFormat::R32Float => "r32float",
            FieldFormat::Rgba8Unorm => "rgba8unorm",
        }
    }
}

/// Sampler addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

/// Allocation request for a field texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSpec {
    pub label: String,
    pub resolution: u32,
    pub layers: u32,
    /// Bound as `texture_2d_array` rather than `texture_2d`.
    pub array: bool,
    pub format: FieldFormat,
    pub mipmapped: bool,
}

impl TextureSpec {
    pub fn plane(label: &str, resolution: u32, format: FieldFormat, mipmapped: bool) -> Self {
        Self {
            label: label.to_string(),
            resolution,
            layers: 1,
            array: false,
            format,
            mipmapped,
        }
    }

    pub fn array(
        label: &str,
        resolution: u32,
        layers: u32,
        format: FieldFormat,
        mipmapped: bool,
    ) -> Self {
        Self {
            label: label.to_string(),
            resolution,
            layers,
            array: true,
            format,
            mipmapped,
        }
    }

    /// Full chain down to 1x1 when mipmapped.
    pub fn mip_level_count(&self) -> u32 {
        if self.mipmapped {
            32 - self.resolution.max(1).leading_zeros()
        } else {
            1
        }
    }
}

/// What a shader expects at a binding of group 0. Binding 0 is reserved for
/// the uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Texture { format: FieldFormat, array: bool },
    StorageImage { format: FieldFormat, read_write: bool },
    StorageBuffer { read_only: bool },
    /// Linear filtering sampler owned by the backend.
    Sampler { wrap: WrapMode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderBinding {
    pub binding: u32,
    pub kind: BindingKind,
}

impl ShaderBinding {
    pub const fn new(binding: u32, kind: BindingKind) -> Self {
        Self { binding, kind }
    }
}

#[derive(Debug, Clone)]
pub struct ComputeShaderDesc {
    pub label: &'static str,
    pub source: &'static str,
    pub entry_point: &'static str,
    pub workgroup_size: [u32; 3],
    pub uniforms: UniformLayout,
    pub bindings: Vec<ShaderBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
}

#[derive(Debug, Clone)]
pub struct RenderShaderDesc {
    pub label: &'static str,
    pub source: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
    pub polygon_mode: PolygonMode,
    pub uniforms: UniformLayout,
    pub bindings: Vec<ShaderBinding>,
}

/// Clear state for a draw pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawTarget {
    pub clear_color: [f32; 4],
}

/// Resource attached to a binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundResource {
    Texture(TextureHandle),
    Image { texture: TextureHandle, layer: u32 },
    Buffer(BufferHandle),
}

impl BoundResource {
    fn describe(&self) -> String {
        match self {
            BoundResource::Texture(t) => format!("texture {}", t.id()),
            BoundResource::Image { texture, layer } => {
                format!("image {} layer {}", texture.id(), layer)
            }
            BoundResource::Buffer(b) => format!("buffer {}", b.id()),
        }
    }
}

/// The resource-manager and command-stream interface terrain stages drive
pub trait GpuBackend {
    fn create_compute_shader(&mut self, desc: &ComputeShaderDesc) -> GpuResult<ShaderHandle>;
    fn create_render_shader(&mut self, desc: &RenderShaderDesc) -> GpuResult<ShaderHandle>;
    fn create_texture(&mut self, spec: &TextureSpec) -> GpuResult<TextureHandle>;
    /// Zero-initialised buffer of `len` `f32` values.
    fn create_storage_buffer(&mut self, label: &str, len: usize) -> GpuResult<BufferHandle>;
    fn create_index_buffer(&mut self, label: &str, indices: &[u32]) -> GpuResult<BufferHandle>;

    fn bind_shader(&mut self, shader: ShaderHandle) -> GpuResult<()>;
    /// Applies to the bound shader and persists until changed.
    fn set_uniform(&mut self, name: &str, value: UniformValue) -> GpuResult<()>;
    fn bind_texture(&mut self, slot: u32, texture: TextureHandle);
    /// Writable mip 0 of one layer.
    fn bind_image(&mut self, slot: u32, texture: TextureHandle, layer: u32);
    fn bind_storage_buffer(&mut self, slot: u32, buffer: BufferHandle);

    /// Arguments are invocation counts; the backend rounds up to workgroups.
    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> GpuResult<()>;
    /// Orders earlier writes before later reads.
    fn memory_barrier(&mut self);
    fn generate_mipmaps(&mut self, texture: TextureHandle, layer: u32) -> GpuResult<()>;

    fn begin_draw_pass(&mut self, target: &DrawTarget) -> GpuResult<()>;
    fn draw_indexed(&mut self, index_buffer: BufferHandle, index_count: u32) -> GpuResult<()>;
    fn end_draw_pass(&mut self) -> GpuResult<()>;

    /// Submit everything recorded so far.
    fn flush(&mut self) -> GpuResult<()>;

    fn supports_wireframe(&self) -> bool {
        true
    }
}

/// Rounds invocation extents up to whole workgroups.
pub fn workgroup_count(invocations: [u32; 3], workgroup_size: [u32; 3]) -> [u32; 3] {
    [
        invocations[0].div_ceil(workgroup_size[0].max(1)),
        invocations[1].div_ceil(workgroup_size[1].max(1)),
        invocations[2].div_ceil(workgroup_size[2].max(1)),
    ]
}

/// Check an entry point exists and carries the expected stage attribute.
pub fn validate_shader_entry_point(
    label: &str,
    source: &str,
    entry_point: &str,
    stage_attribute: &str,
) -> GpuResult<()> {
    let fn_pattern = format!("fn {}(", entry_point);
    let lines: Vec<&str> = source.lines().collect();
    let Some(line_index) = lines.iter().position(|line| line.contains(&fn_pattern)) else {
        return Err(GpuError::ShaderValidation {
            label: label.to_string(),
            reason: format!(
                "entry point '{}' not found. Available functions: {}",
                entry_point,
                extract_function_names(source).join(", ")
            ),
        });
    };

    // Walk back over attributes and comments looking for the stage marker
    let mut has_stage_attribute = lines[line_index].contains(stage_attribute);
    for prev_line in lines[..line_index].iter().rev() {
        let prev_line = prev_line.trim();
        if prev_line.is_empty() || prev_line.starts_with("//") {
            continue;
        }
        if prev_line.contains(stage_attribute) {
            has_stage_attribute = true;
            break;
        }
        if !prev_line.starts_with('@') {
            break;
        }
    }

    if !has_stage_attribute {
        return Err(GpuError::ShaderValidation {
            label: label.to_string(),
            reason: format!(
                "entry point '{}' found but missing {} annotation",
                entry_point, stage_attribute
            ),
        });
    }

    log::trace!(
        "[validate_shader_entry_point] {}: '{}' carries {}",
        label,
        entry_point,
        stage_attribute
    );
    Ok(())
}

/// Extract function names from shader source for diagnostics
fn extract_function_names(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let rest = trimmed.strip_prefix("fn ")?;
            let end = rest.find('(')?;
            let name = rest[..end].trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Program metadata both backends validate against
#[derive(Debug, Clone)]
pub(crate) enum ProgramInfo {
    Compute(ComputeShaderDesc),
    Render(RenderShaderDesc),
}

impl ProgramInfo {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            ProgramInfo::Compute(desc) => desc.label,
            ProgramInfo::Render(desc) => desc.label,
        }
    }

    pub(crate) fn uniforms(&self) -> &UniformLayout {
        match self {
            ProgramInfo::Compute(desc) => &desc.uniforms,
            ProgramInfo::Render(desc) => &desc.uniforms,
        }
    }

    pub(crate) fn bindings(&self) -> &[ShaderBinding] {
        match self {
            ProgramInfo::Compute(desc) => &desc.bindings,
            ProgramInfo::Render(desc) => &desc.bindings,
        }
    }
}

/// GL-style binding state shared by the backends: one bound program,
/// per-program uniform values, and a global slot table.
#[derive(Debug, Default)]
pub(crate) struct BindingState {
    pub(crate) programs: Vec<ProgramInfo>,
    pub(crate) textures: Vec<TextureSpec>,
    pub(crate) buffer_labels: Vec<String>,
    bound: Option<ShaderHandle>,
    uniform_values: Vec<FxHashMap<String, UniformValue>>,
    slots: FxHashMap<u32, BoundResource>,
}

/// A declared binding resolved to what is bound in its slot. Samplers
/// resolve to `None`.
pub(crate) type ResolvedBinding = (ShaderBinding, Option<BoundResource>);

impl BindingState {
    pub(crate) fn add_program(&mut self, info: ProgramInfo) -> ShaderHandle {
        self.programs.push(info);
        self.uniform_values.push(FxHashMap::default());
        ShaderHandle::from_index(self.programs.len() - 1)
    }

    pub(crate) fn add_texture(&mut self, spec: TextureSpec) -> TextureHandle {
        self.textures.push(spec);
        TextureHandle::from_index(self.textures.len() - 1)
    }

    pub(crate) fn add_buffer(&mut self, label: &str) -> BufferHandle {
        self.buffer_labels.push(label.to_string());
        BufferHandle::from_index(self.buffer_labels.len() - 1)
    }

    pub(crate) fn program(&self, shader: ShaderHandle) -> GpuResult<&ProgramInfo> {
        self.programs
            .get(shader.index())
            .ok_or(GpuError::InvalidHandle {
                kind: "shader",
                id: shader.id(),
            })
    }

    pub(crate) fn texture(&self, texture: TextureHandle) -> GpuResult<&TextureSpec> {
        self.textures
            .get(texture.index())
            .ok_or(GpuError::InvalidHandle {
                kind: "texture",
                id: texture.id(),
            })
    }

    pub(crate) fn check_buffer(&self, buffer: BufferHandle) -> GpuResult<()> {
        if buffer.index() < self.buffer_labels.len() {
            Ok(())
        } else {
            Err(GpuError::InvalidHandle {
                kind: "buffer",
                id: buffer.id(),
            })
        }
    }

    pub(crate) fn bind(&mut self, shader: ShaderHandle) -> GpuResult<()> {
        self.program(shader)?;
        self.bound = Some(shader);
        Ok(())
    }

    pub(crate) fn bound(&self) -> GpuResult<ShaderHandle> {
        self.bound.ok_or(GpuError::NoShaderBound)
    }

    pub(crate) fn set_uniform(&mut self, name: &str, value: UniformValue) -> GpuResult<()> {
        let shader = self.bound()?;
        let program = self.program(shader)?;
        let expected = program
            .uniforms()
            .field_type(name)
            .ok_or_else(|| GpuError::UnknownUniform {
                shader: program.label().to_string(),
                name: name.to_string(),
            })?;
        if expected != value.ty() {
            return Err(GpuError::UniformTypeMismatch {
                shader: program.label().to_string(),
                name: name.to_string(),
                expected,
                found: value.ty(),
            });
        }
        self.uniform_values[shader.index()].insert(name.to_string(), value);
        Ok(())
    }

    pub(crate) fn uniform_values(&self, shader: ShaderHandle) -> &FxHashMap<String, UniformValue> {
        &self.uniform_values[shader.index()]
    }

    pub(crate) fn bind_slot(&mut self, slot: u32, resource: BoundResource) {
        self.slots.insert(slot, resource);
    }

    /// Match every declared binding of the bound program against the slot
    /// table, checking handle validity, layer range and resource kind.
    pub(crate) fn resolve(&self, shader: ShaderHandle) -> GpuResult<Vec<ResolvedBinding>> {
        let program = self.program(shader)?;
        let mut resolved = Vec::with_capacity(program.bindings().len());

        for binding in program.bindings() {
            if let BindingKind::Sampler { .. } = binding.kind {
                resolved.push((*binding, None));
                continue;
            }

            let mismatch = |found: String| GpuError::BindingMismatch {
                shader: program.label().to_string(),
                binding: binding.binding,
                expected: format!("{:?}", binding.kind),
                found,
            };

            let resource = *self
                .slots
                .get(&binding.binding)
                .ok_or_else(|| mismatch("nothing bound".to_string()))?;

            match (binding.kind, resource) {
                (BindingKind::Texture { format, array }, BoundResource::Texture(texture)) => {
                    let spec = self.texture(texture)?;
                    if spec.format != format || spec.array != array {
                        return Err(mismatch(format!(
                            "{} ({:?}, array={})",
                            spec.label, spec.format, spec.array
                        )));
                    }
                }
                (
                    BindingKind::StorageImage { format, .. },
                    BoundResource::Image { texture, layer },
                ) => {
                    let spec = self.texture(texture)?;
                    if spec.format != format {
                        return Err(mismatch(format!("{} ({:?})", spec.label, spec.format)));
                    }
                    if layer >= spec.layers {
                        return Err(GpuError::LayerOutOfRange {
                            label: spec.label.clone(),
                            layer,
                            layers: spec.layers,
                        });
                    }
                }
                (BindingKind::StorageBuffer { .. }, BoundResource::Buffer(buffer)) => {
                    self.check_buffer(buffer)?;
                }
                (_, other) => return Err(mismatch(other.describe())),
            }
            resolved.push((*binding, Some(resource)));
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count_rounds_up() {
        assert_eq!(workgroup_count([17, 1, 1], [8, 8, 1]), [3, 1, 1]);
        assert_eq!(workgroup_count([64, 64, 1], [8, 8, 1]), [8, 8, 1]);
        assert_eq!(workgroup_count([0, 5, 1], [8, 8, 1]), [0, 1, 1]);
    }

    #[test]
    fn test_mip_level_count() {
        assert_eq!(
            TextureSpec::plane("h", 4096, FieldFormat::R32Float, true).mip_level_count(),
            13
        );
        assert_eq!(
            TextureSpec::plane("h", 1000, FieldFormat::R32Float, true).mip_level_count(),
            10
        );
        assert_eq!(
            TextureSpec::plane("s", 2048, FieldFormat::Rgba8Unorm, false).mip_level_count(),
            1
        );
    }

    #[test]
    fn test_entry_point_validation() {
        let source = "@group(0) @binding(0) var<uniform> p: Params;\n\n@compute @workgroup_size(8, 8, 1)\nfn main(@builtin(global_invocation_id) id: vec3<u32>) {}\n";
        assert!(validate_shader_entry_point("t", source, "main", "@compute").is_ok());
        assert!(validate_shader_entry_point("t", source, "other", "@compute").is_err());
        assert!(validate_shader_entry_point("t", source, "main", "@vertex").is_err());
    }

    #[test]
    fn test_extract_function_names() {
        let names = extract_function_names("fn a() {}\n  fn b_c(x: f32) -> f32 { return x; }\n");
        assert_eq!(names, vec!["a".to_string(), "b_c".to_string()]);
    }
}
