//! Program descriptors for every terrain shader
//!
//! Each descriptor pairs a WGSL source with the uniform block layout and the
//! resource bindings the source declares. The layouts list uniforms in the
//! exact order of the WGSL `struct Params`.

use super::{
    BindingKind, ComputeShaderDesc, FieldFormat, PolygonMode, RenderShaderDesc, ShaderBinding,
    UniformLayout, UniformType, WrapMode,
};

/// Binding slots of group 0. Slot 0 is always the uniform block.
pub mod slots {
    pub const DISPLACE_HEIGHTMAP: u32 = 1;
    pub const DISPLACE_HEIGHTS: u32 = 2;

    pub const MAP_HEIGHT_INPUT: u32 = 1;
    pub const MAP_FIELD_OUTPUT: u32 = 2;
    pub const MATERIAL_MAP_NORMAL_INPUT: u32 = 2;
    pub const MATERIAL_MAP_OUTPUT: u32 = 3;

    pub const PROCEDURE_OUTPUT: u32 = 1;
    pub const PROCEDURE_HEIGHT_INPUT: u32 = 2;

    pub const MATERIAL_NORMAL_HEIGHT_INPUT: u32 = 1;
    pub const MATERIAL_NORMAL_OUTPUT: u32 = 2;

    pub const TERRAIN_HEIGHTS: u32 = 1;
    pub const TERRAIN_HEIGHTMAP: u32 = 2;
    pub const TERRAIN_NORMAL: u32 = 3;
    pub const TERRAIN_SHADOW: u32 = 4;
    pub const TERRAIN_MATERIAL_MAP: u32 = 5;
    pub const TERRAIN_ALBEDO: u32 = 6;
    pub const TERRAIN_MATERIAL_NORMAL: u32 = 7;
    pub const TERRAIN_ROUGHNESS: u32 = 8;
    pub const TERRAIN_FIELD_SAMPLER: u32 = 9;
    pub const TERRAIN_MATERIAL_SAMPLER: u32 = 10;
}

const WORKGROUP: [u32; 3] = [8, 8, 1];

const DISPLACE_SOURCE: &str = concat!(
    include_str!("../shaders/common/heightmap.wgsl"),
    include_str!("../shaders/compute/displace.wgsl")
);
const MAP_NORMAL_SOURCE: &str = concat!(
    include_str!("../shaders/common/heightmap.wgsl"),
    include_str!("../shaders/compute/map_normal.wgsl")
);
const SHADOW_SOURCE: &str = concat!(
    include_str!("../shaders/common/heightmap.wgsl"),
    include_str!("../shaders/compute/shadow.wgsl")
);
const MATERIAL_MAP_SOURCE: &str = concat!(
    include_str!("../shaders/common/heightmap.wgsl"),
    include_str!("../shaders/compute/material_map.wgsl")
);
const HEIGHT_CONST_SOURCE: &str = concat!(
    include_str!("../shaders/common/procedure.wgsl"),
    include_str!("../shaders/compute/height_const.wgsl")
);
const HEIGHT_FBM_SOURCE: &str = concat!(
    include_str!("../shaders/common/procedure.wgsl"),
    include_str!("../shaders/compute/height_fbm.wgsl")
);
const HEIGHT_VORONOI_SOURCE: &str = concat!(
    include_str!("../shaders/common/procedure.wgsl"),
    include_str!("../shaders/compute/height_voronoi.wgsl")
);
const ALBEDO_CONST_SOURCE: &str = include_str!("../shaders/compute/albedo_const.wgsl");
const ALBEDO_RAMP_SOURCE: &str = include_str!("../shaders/compute/albedo_ramp.wgsl");
const ROUGHNESS_CONST_SOURCE: &str = include_str!("../shaders/compute/roughness_const.wgsl");
const ROUGHNESS_RAMP_SOURCE: &str = include_str!("../shaders/compute/roughness_ramp.wgsl");
const MATERIAL_NORMAL_SOURCE: &str = include_str!("../shaders/compute/material_normal.wgsl");
const TERRAIN_SOURCE: &str = concat!(
    include_str!("../shaders/common/heightmap.wgsl"),
    include_str!("../shaders/rendering/terrain.wgsl")
);

fn compute(
    label: &'static str,
    source: &'static str,
    uniforms: &[(&'static str, UniformType)],
    bindings: Vec<ShaderBinding>,
) -> ComputeShaderDesc {
    ComputeShaderDesc {
        label,
        source,
        entry_point: "main",
        workgroup_size: WORKGROUP,
        uniforms: UniformLayout::new(uniforms),
        bindings,
    }
}

fn texture(binding: u32, format: FieldFormat) -> ShaderBinding {
    ShaderBinding::new(binding, BindingKind::Texture { format, array: false })
}

fn texture_array(binding: u32, format: FieldFormat) -> ShaderBinding {
    ShaderBinding::new(binding, BindingKind::Texture { format, array: true })
}

fn image(binding: u32, format: FieldFormat, read_write: bool) -> ShaderBinding {
    ShaderBinding::new(binding, BindingKind::StorageImage { format, read_write })
}

pub fn displace_shader() -> ComputeShaderDesc {
    use UniformType::*;
    compute(
        "Clipmap Displace",
        DISPLACE_SOURCE,
        &[
            ("uRegionOrigin", IVec2),
            ("uRegionSize", IVec2),
            ("uScaleXZ", Float),
            ("uScaleY", Float),
            ("uCellSize", Float),
            ("uGridSize", Int),
        ],
        vec![
            texture(slots::DISPLACE_HEIGHTMAP, FieldFormat::R32Float),
            ShaderBinding::new(
                slots::DISPLACE_HEIGHTS,
                BindingKind::StorageBuffer { read_only: false },
            ),
        ],
    )
}

pub fn map_normal_shader() -> ComputeShaderDesc {
    use UniformType::*;
    compute(
        "Map Normal",
        MAP_NORMAL_SOURCE,
        &[
            ("uResolution", Int),
            ("uScaleXZ", Float),
            ("uScaleY", Float),
            ("uAOSamples", Int),
            ("uAORadius", Float),
        ],
        vec![
            texture(slots::MAP_HEIGHT_INPUT, FieldFormat::R32Float),
            image(slots::MAP_FIELD_OUTPUT, FieldFormat::Rgba8Unorm, false),
        ],
    )
}

pub fn shadow_shader() -> ComputeShaderDesc {
    use UniformType::*;
    compute(
        "Map Shadow",
        SHADOW_SOURCE,
        &[
            ("uSunDir", Vec3),
            ("uResolution", Int),
            ("uScaleXZ", Float),
            ("uScaleY", Float),
            ("uMinT", Float),
            ("uMaxT", Float),
            ("uSteps", Int),
            ("uMipBias", Float),
        ],
        vec![
            texture(slots::MAP_HEIGHT_INPUT, FieldFormat::R32Float),
            image(slots::MAP_FIELD_OUTPUT, FieldFormat::Rgba8Unorm, false),
        ],
    )
}

pub fn material_map_shader() -> ComputeShaderDesc {
    use UniformType::*;
    compute(
        "Material Map",
        MATERIAL_MAP_SOURCE,
        &[
            ("uResolution", Int),
            ("uSlopeLow", Float),
            ("uSlopeHigh", Float),
            ("uHeightLow", Float),
            ("uHeightHigh", Float),
            ("uBlend", Float),
        ],
        vec![
            texture(slots::MAP_HEIGHT_INPUT, FieldFormat::R32Float),
            texture(slots::MATERIAL_MAP_NORMAL_INPUT, FieldFormat::Rgba8Unorm),
            image(slots::MATERIAL_MAP_OUTPUT, FieldFormat::Rgba8Unorm, false),
        ],
    )
}

fn height_procedure(
    label: &'static str,
    source: &'static str,
    uniforms: &[(&'static str, UniformType)],
) -> ComputeShaderDesc {
    compute(
        label,
        source,
        uniforms,
        vec![image(slots::PROCEDURE_OUTPUT, FieldFormat::R32Float, true)],
    )
}

pub fn height_const_shader() -> ComputeShaderDesc {
    use UniformType::*;
    height_procedure(
        "Height Const Value",
        HEIGHT_CONST_SOURCE,
        &[
            ("uResolution", Int),
            ("uLayer", Int),
            ("uValue", Float),
            ("uBlendMode", Int),
            ("uWeight", Float),
        ],
    )
}

pub fn height_fbm_shader() -> ComputeShaderDesc {
    use UniformType::*;
    height_procedure(
        "Height FBM",
        HEIGHT_FBM_SOURCE,
        &[
            ("uResolution", Int),
            ("uLayer", Int),
            ("uOctaves", Int),
            ("uScale", Int),
            ("uRoughness", Float),
            ("uOffset", Vec2),
            ("uBlendMode", Int),
            ("uWeight", Float),
        ],
    )
}

pub fn height_voronoi_shader() -> ComputeShaderDesc {
    use UniformType::*;
    height_procedure(
        "Height Voronoi",
        HEIGHT_VORONOI_SOURCE,
        &[
            ("uResolution", Int),
            ("uLayer", Int),
            ("uScale", Int),
            ("uRandomness", Float),
            ("uVoronoiType", Int),
            ("uBlendMode", Int),
            ("uWeight", Float),
        ],
    )
}

/// Albedo and roughness procedures write one layer and may read the
/// material height array.
fn surface_procedure(
    label: &'static str,
    source: &'static str,
    uniforms: &[(&'static str, UniformType)],
) -> ComputeShaderDesc {
    compute(
        label,
        source,
        uniforms,
        vec![
            image(slots::PROCEDURE_OUTPUT, FieldFormat::Rgba8Unorm, false),
            texture_array(slots::PROCEDURE_HEIGHT_INPUT, FieldFormat::R32Float),
        ],
    )
}

pub fn albedo_const_shader() -> ComputeShaderDesc {
    use UniformType::*;
    surface_procedure(
        "Const Albedo",
        ALBEDO_CONST_SOURCE,
        &[("uResolution", Int), ("uLayer", Int), ("uColor", Vec3)],
    )
}

pub fn albedo_ramp_shader() -> ComputeShaderDesc {
    use UniformType::*;
    surface_procedure(
        "Albedo Ramp",
        ALBEDO_RAMP_SOURCE,
        &[
            ("uResolution", Int),
            ("uLayer", Int),
            ("uEdge1", Float),
            ("uEdge2", Float),
            ("uColor1", Vec3),
            ("uColor2", Vec3),
        ],
    )
}

pub fn roughness_const_shader() -> ComputeShaderDesc {
    use UniformType::*;
    surface_procedure(
        "Const Roughness",
        ROUGHNESS_CONST_SOURCE,
        &[("uResolution", Int), ("uLayer", Int), ("uValue", Float)],
    )
}

pub fn roughness_ramp_shader() -> ComputeShaderDesc {
    use UniformType::*;
    surface_procedure(
        "Roughness Ramp",
        ROUGHNESS_RAMP_SOURCE,
        &[
            ("uResolution", Int),
            ("uLayer", Int),
            ("uEdge1", Float),
            ("uEdge2", Float),
            ("uValue1", Float),
            ("uValue2", Float),
        ],
    )
}

pub fn material_normal_shader() -> ComputeShaderDesc {
    use UniformType::*;
    compute(
        "Material Normal",
        MATERIAL_NORMAL_SOURCE,
        &[
            ("uResolution", Int),
            ("uLayer", Int),
            ("uStrength", Float),
            ("uSpread", Float),
            ("uContrast", Float),
        ],
        vec![
            texture_array(slots::MATERIAL_NORMAL_HEIGHT_INPUT, FieldFormat::R32Float),
            image(slots::MATERIAL_NORMAL_OUTPUT, FieldFormat::Rgba8Unorm, false),
        ],
    )
}

/// Which vertex entry a terrain program uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerrainVertexStage {
    Grid,
    Fill,
}

pub fn terrain_uniforms() -> UniformLayout {
    use UniformType::*;
    UniformLayout::new(&[
        ("uMVP", Mat4),
        ("uCameraPos", Vec3),
        ("uScaleXZ", Float),
        ("uLightDir", Vec3),
        ("uScaleY", Float),
        ("uSunColor", Vec3),
        ("uSunStrength", Float),
        ("uSkyColor", Vec3),
        ("uSkyDiffuse", Float),
        ("uSkySpecular", Float),
        ("uReflected", Float),
        ("uTilingFactor", Float),
        ("uNormalStrength", Float),
        ("uShadows", Int),
        ("uMaterials", Int),
        ("uFog", Int),
        ("uFixTiling", Int),
        ("uOrigin", IVec2),
        ("uClampMin", IVec2),
        ("uClampMax", IVec2),
        ("uHoleMin", IVec2),
        ("uHoleMax", IVec2),
        ("uLattice", IVec2),
        ("uGridSize", Int),
        ("uCellSize", Float),
        ("uWireColor", Vec3),
        ("uMaterialLayers", Int),
        ("uFillAxis", Int),
    ])
}

/// Grid programs read the toroidal height buffer, fill programs the
/// heightmap. Shaded programs add every field the fragment stage samples.
pub fn terrain_shader(
    stage: TerrainVertexStage,
    wireframe: bool,
    material_wrap: WrapMode,
) -> RenderShaderDesc {
    let mut bindings = match stage {
        TerrainVertexStage::Grid => vec![
            ShaderBinding::new(
                slots::TERRAIN_HEIGHTS,
                BindingKind::StorageBuffer { read_only: true },
            ),
            texture(slots::TERRAIN_HEIGHTMAP, FieldFormat::R32Float),
        ],
        TerrainVertexStage::Fill => vec![texture(slots::TERRAIN_HEIGHTMAP, FieldFormat::R32Float)],
    };

    if !wireframe {
        bindings.extend([
            texture(slots::TERRAIN_NORMAL, FieldFormat::Rgba8Unorm),
            texture(slots::TERRAIN_SHADOW, FieldFormat::Rgba8Unorm),
            texture(slots::TERRAIN_MATERIAL_MAP, FieldFormat::Rgba8Unorm),
            texture_array(slots::TERRAIN_ALBEDO, FieldFormat::Rgba8Unorm),
            texture_array(slots::TERRAIN_MATERIAL_NORMAL, FieldFormat::Rgba8Unorm),
            texture_array(slots::TERRAIN_ROUGHNESS, FieldFormat::Rgba8Unorm),
            ShaderBinding::new(
                slots::TERRAIN_FIELD_SAMPLER,
                BindingKind::Sampler {
                    wrap: WrapMode::ClampToEdge,
                },
            ),
            ShaderBinding::new(
                slots::TERRAIN_MATERIAL_SAMPLER,
                BindingKind::Sampler {
                    wrap: material_wrap,
                },
            ),
        ]);
    }

    let (label, vertex_entry) = match (stage, wireframe) {
        (TerrainVertexStage::Grid, false) => ("Terrain Grid Shaded", "vs_grid"),
        (TerrainVertexStage::Fill, false) => ("Terrain Fill Shaded", "vs_fill"),
        (TerrainVertexStage::Grid, true) => ("Terrain Grid Wireframe", "vs_grid"),
        (TerrainVertexStage::Fill, true) => ("Terrain Fill Wireframe", "vs_fill"),
    };

    RenderShaderDesc {
        label,
        source: TERRAIN_SOURCE,
        vertex_entry,
        fragment_entry: if wireframe {
            "fs_wireframe"
        } else {
            "fs_shaded"
        },
        polygon_mode: if wireframe {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        },
        uniforms: terrain_uniforms(),
        bindings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::validate_shader_entry_point;

    /// `(name, type)` pairs of the `struct Params` block in a WGSL source
    fn wgsl_params(source: &str) -> Vec<(String, String)> {
        let start = source
            .find("struct Params {")
            .expect("source declares struct Params");
        let body = &source[start + "struct Params {".len()..];
        let end = body.find('}').expect("struct Params is closed");
        body[..end]
            .lines()
            .filter_map(|line| {
                let line = line.trim().trim_end_matches(',');
                let (name, ty) = line.split_once(':')?;
                Some((name.trim().to_string(), ty.trim().to_string()))
            })
            .collect()
    }

    fn layout_params(layout: &UniformLayout) -> Vec<(String, String)> {
        layout
            .fields()
            .iter()
            .map(|f| (f.name.to_string(), f.ty.wgsl_name().to_string()))
            .collect()
    }

    fn all_compute_shaders() -> Vec<ComputeShaderDesc> {
        vec![
            displace_shader(),
            map_normal_shader(),
            shadow_shader(),
            material_map_shader(),
            height_const_shader(),
            height_fbm_shader(),
            height_voronoi_shader(),
            albedo_const_shader(),
            albedo_ramp_shader(),
            roughness_const_shader(),
            roughness_ramp_shader(),
            material_normal_shader(),
        ]
    }

    #[test]
    fn test_compute_layouts_match_wgsl_params() {
        for desc in all_compute_shaders() {
            assert_eq!(
                layout_params(&desc.uniforms),
                wgsl_params(desc.source),
                "uniform layout of {} disagrees with its WGSL",
                desc.label
            );
        }
    }

    #[test]
    fn test_terrain_layout_matches_wgsl_params() {
        let desc = terrain_shader(TerrainVertexStage::Grid, false, WrapMode::Repeat);
        assert_eq!(layout_params(&desc.uniforms), wgsl_params(desc.source));
        assert_eq!(desc.uniforms.size(), 256);
    }

    #[test]
    fn test_declared_bindings_appear_in_source() {
        for desc in all_compute_shaders() {
            for binding in &desc.bindings {
                let marker = format!("@binding({})", binding.binding);
                assert!(
                    desc.source.contains(&marker),
                    "{} declares binding {} missing from WGSL",
                    desc.label,
                    binding.binding
                );
            }
        }
    }

    #[test]
    fn test_entry_points_exist() {
        for desc in all_compute_shaders() {
            assert!(validate_shader_entry_point(desc.label, desc.source, "main", "@compute").is_ok());
        }
        for stage in [TerrainVertexStage::Grid, TerrainVertexStage::Fill] {
            for wireframe in [false, true] {
                let desc = terrain_shader(stage, wireframe, WrapMode::Repeat);
                assert!(validate_shader_entry_point(
                    desc.label,
                    desc.source,
                    desc.vertex_entry,
                    "@vertex"
                )
                .is_ok());
                assert!(validate_shader_entry_point(
                    desc.label,
                    desc.source,
                    desc.fragment_entry,
                    "@fragment"
                )
                .is_ok());
            }
        }
    }

    #[test]
    fn test_ring_stitch_reads_neighbours_through_footprint_check() {
        assert!(TERRAIN_SOURCE.contains("fn ring_height("));
        assert!(TERRAIN_SOURCE.contains("ring_height(lattice - dir)"));
        assert!(TERRAIN_SOURCE.contains("ring_height(lattice + dir)"));
    }

    #[test]
    fn test_wireframe_programs_bind_only_geometry_inputs() {
        let grid = terrain_shader(TerrainVertexStage::Grid, true, WrapMode::Repeat);
        // Ring heights, plus the heightmap for stitch neighbours past the ring
        assert_eq!(grid.bindings.len(), 2);
        assert!(grid
            .bindings
            .contains(&texture(slots::TERRAIN_HEIGHTMAP, FieldFormat::R32Float)));
        assert_eq!(grid.polygon_mode, PolygonMode::Line);

        let fill = terrain_shader(TerrainVertexStage::Fill, false, WrapMode::MirroredRepeat);
        // Heightmap, six shading fields, two samplers
        assert_eq!(fill.bindings.len(), 9);
        assert!(fill.bindings.contains(&ShaderBinding::new(
            slots::TERRAIN_MATERIAL_SAMPLER,
            BindingKind::Sampler {
                wrap: WrapMode::MirroredRepeat
            }
        )));
    }
}
