//! Named uniforms packed into WGSL uniform-block layout
//!
//! Each program declares its uniform block as an ordered list of
//! `(name, type)` pairs mirroring the WGSL `struct Params` it reads. Offsets
//! follow WGSL host-shareable layout: scalars align to 4, `vec2` to 8,
//! `vec3`/`vec4`/`mat4x4` to 16, and the block size rounds up to 16.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformType {
    Int,
    UInt,
    Float,
    Vec2,
    IVec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    pub fn size(self) -> usize {
        match self {
            UniformType::Int | UniformType::UInt | UniformType::Float => 4,
            UniformType::Vec2 | UniformType::IVec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat4 => 64,
        }
    }

    pub fn align(self) -> usize {
        match self {
            UniformType::Int | UniformType::UInt | UniformType::Float => 4,
            UniformType::Vec2 | UniformType::IVec2 => 8,
            UniformType::Vec3 | UniformType::Vec4 | UniformType::Mat4 => 16,
        }
    }

    /// Spelling of the type inside a WGSL struct.
    pub fn wgsl_name(self) -> &'static str {
        match self {
            UniformType::Int => "i32",
            UniformType::UInt => "u32",
            UniformType::Float => "f32",
            UniformType::Vec2 => "vec2<f32>",
            UniformType::IVec2 => "vec2<i32>",
            UniformType::Vec3 => "vec3<f32>",
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Mat4 => "mat4x4<f32>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2([f32; 2]),
    IVec2([i32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::UInt(_) => UniformType::UInt,
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::IVec2(_) => UniformType::IVec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    fn write_to(&self, out: &mut [u8]) {
        match self {
            UniformValue::Int(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::UInt(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Vec2(v) => out.copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::IVec2(v) => out.copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Vec3(v) => out.copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Vec4(v) => out.copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Mat4(v) => out.copy_from_slice(bytemuck::cast_slice(v)),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            UniformValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ivec2(&self) -> Option<[i32; 2]> {
        match self {
            UniformValue::IVec2(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformField {
    pub name: &'static str,
    pub ty: UniformType,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    size: usize,
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

impl UniformLayout {
    pub fn new(fields: &[(&'static str, UniformType)]) -> Self {
        let mut offset = 0;
        let mut packed = Vec::with_capacity(fields.len());
        for &(name, ty) in fields {
            offset = round_up(offset, ty.align());
            packed.push(UniformField { name, ty, offset });
            offset += ty.size();
        }
        Self {
            fields: packed,
            size: if offset == 0 { 0 } else { round_up(offset, 16) },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Block size in bytes, zero when the program takes no uniforms.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn field_type(&self, name: &str) -> Option<UniformType> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.ty)
    }

    /// Unset fields stay zero. Values are type-checked when they are set,
    /// so packing cannot fail.
    pub fn pack(&self, values: &FxHashMap<String, UniformValue>) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size];
        for field in &self.fields {
            if let Some(value) = values.get(field.name) {
                if value.ty() == field.ty {
                    value.write_to(&mut bytes[field.offset..field.offset + field.ty.size()]);
                }
            }
        }
        bytes
    }
}
