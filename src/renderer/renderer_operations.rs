//! Renderer Operations - Pure DOP functions
//!
//! All renderer logic that does not touch the GPU: culling, draw order and
//! the per-tile uniform sets.

use cgmath::{Matrix4, Vector3};

use super::renderer_data::{DrawItem, DrawKind, ShadingSettings, SkyLighting};
use crate::camera::CameraView;
use crate::clipmap::{FillAxis, FillTile, GridTile};
use crate::fields::MapSettings;
use crate::gpu::UniformValue;

/// Maps OpenGL clip depth `[-1, 1]` to wgpu's `[0, 1]`.
#[rustfmt::skip]
pub fn opengl_to_wgpu_matrix() -> Matrix4<f32> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 0.5, 0.0,
        0.0, 0.0, 0.5, 1.0,
    )
}

pub fn terrain_mvp(camera: &dyn CameraView) -> [[f32; 4]; 4] {
    (opengl_to_wgpu_matrix() * camera.view_projection_matrix()).into()
}

/// A tile that survived culling, in submission order
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedDraw {
    Grid(GridTile),
    Fill(FillTile),
}

impl PlannedDraw {
    pub fn item(&self) -> DrawItem {
        match self {
            PlannedDraw::Grid(grid) => DrawItem {
                kind: DrawKind::Grid { level: grid.level },
                index_count: grid.mesh.index_count,
            },
            PlannedDraw::Fill(fill) => DrawItem {
                kind: DrawKind::Fill {
                    level: fill.placement.level,
                    side: fill.placement.side,
                },
                index_count: fill.mesh.index_count,
            },
        }
    }
}

/// Rings that pass the frustum test followed by every fill strip, both
/// finest first. Returns the plan and the levels of the culled rings.
pub fn plan_draws(
    grids: impl Iterator<Item = GridTile>,
    fills: impl Iterator<Item = FillTile>,
    camera: &dyn CameraView,
    height_scale: f32,
) -> (Vec<PlannedDraw>, Vec<u32>) {
    let mut planned = Vec::new();
    let mut culled = Vec::new();

    for grid in grids {
        if camera.is_in_frustum(&grid.bounding_box, height_scale) {
            planned.push(PlannedDraw::Grid(grid));
        } else {
            culled.push(grid.level);
        }
    }
    // Fills are never culled so a seam cannot open next to a visible ring
    planned.extend(fills.map(PlannedDraw::Fill));

    (planned, culled)
}

pub fn grid_uniforms(grid: &GridTile) -> [(&'static str, UniformValue); 5] {
    [
        ("uOrigin", UniformValue::IVec2([grid.origin.x, grid.origin.y])),
        ("uCellSize", UniformValue::Float(grid.cell_size)),
        ("uHoleMin", UniformValue::IVec2([grid.stitch.min.x, grid.stitch.min.y])),
        ("uHoleMax", UniformValue::IVec2([grid.stitch.max.x, grid.stitch.max.y])),
        ("uFillAxis", UniformValue::Int(0)),
    ]
}

pub fn fill_uniforms(fill: &FillTile) -> [(&'static str, UniformValue); 7] {
    let placement = &fill.placement;
    let axis = match placement.axis {
        FillAxis::AcrossX => 0,
        FillAxis::AcrossZ => 1,
    };
    [
        ("uLattice", UniformValue::IVec2([placement.start.x, placement.start.y])),
        ("uClampMin", UniformValue::IVec2([placement.clamp.min.x, placement.clamp.min.y])),
        ("uClampMax", UniformValue::IVec2([placement.clamp.max.x, placement.clamp.max.y])),
        ("uHoleMin", UniformValue::IVec2([placement.hole.min.x, placement.hole.min.y])),
        ("uHoleMax", UniformValue::IVec2([placement.hole.max.x, placement.hole.max.y])),
        ("uCellSize", UniformValue::Float(fill.cell_size)),
        ("uFillAxis", UniformValue::Int(axis)),
    ]
}

/// Uniforms shared by every tile of one pass.
pub fn pass_uniforms(
    camera: &dyn CameraView,
    grid_size: u32,
    material_layers: u32,
    map: &MapSettings,
    shading: &ShadingSettings,
    sky: &SkyLighting,
) -> Vec<(&'static str, UniformValue)> {
    let eye = camera.position();
    let sun: Vector3<f32> = map.sun.direction();
    let flag = |on: bool| UniformValue::Int(on as i32);

    vec![
        ("uMVP", UniformValue::Mat4(terrain_mvp(camera))),
        ("uCameraPos", UniformValue::Vec3([eye.x, eye.y, eye.z])),
        ("uScaleXZ", UniformValue::Float(map.scale.scale_xz)),
        ("uScaleY", UniformValue::Float(map.scale.scale_y)),
        ("uLightDir", UniformValue::Vec3(sun.into())),
        ("uSunColor", UniformValue::Vec3(sky.sun_color)),
        ("uSunStrength", UniformValue::Float(shading.sun_strength)),
        ("uSkyColor", UniformValue::Vec3(sky.sky_color)),
        ("uSkyDiffuse", UniformValue::Float(shading.sky_diffuse)),
        ("uSkySpecular", UniformValue::Float(shading.sky_specular)),
        ("uReflected", UniformValue::Float(shading.reflected)),
        ("uTilingFactor", UniformValue::Float(shading.tiling_factor)),
        ("uNormalStrength", UniformValue::Float(shading.normal_strength)),
        // Shadows need the stage to be running as well
        ("uShadows", flag(shading.shadows && map.shadow.enabled)),
        ("uMaterials", flag(shading.materials)),
        ("uFog", flag(shading.fog)),
        ("uFixTiling", flag(shading.fix_tiling)),
        ("uGridSize", UniformValue::Int(grid_size as i32)),
        ("uWireColor", UniformValue::Vec3(shading.wire_color)),
        ("uMaterialLayers", UniformValue::Int(material_layers as i32)),
    ]
}
