//! Renderer Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in renderer_operations.rs

use serde::{Deserialize, Serialize};

use crate::clipmap::FillSide;

/// How the terrain is drawn this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    Shaded,
    Wireframe,
}

/// Lighting and material toggles of the shaded pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadingSettings {
    pub sun_strength: f32,
    pub sky_diffuse: f32,
    pub sky_specular: f32,
    pub reflected: f32,
    pub shadows: bool,
    pub materials: bool,
    pub fog: bool,
    pub fix_tiling: bool,
    pub tiling_factor: f32,
    pub normal_strength: f32,
    pub clear_color: [f32; 3],
    pub wire_color: [f32; 3],
}

impl Default for ShadingSettings {
    fn default() -> Self {
        Self {
            sun_strength: 2.0,
            sky_diffuse: 0.15,
            sky_specular: 0.5,
            reflected: 0.1,
            shadows: true,
            materials: true,
            fog: true,
            fix_tiling: true,
            tiling_factor: 32.0,
            normal_strength: 0.5,
            clear_color: [0.55, 0.7, 0.9],
            wire_color: [0.9, 0.9, 0.9],
        }
    }
}

/// Sky colours supplied by whatever renders the sky
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyLighting {
    pub sun_color: [f32; 3],
    pub sky_color: [f32; 3],
}

impl Default for SkyLighting {
    fn default() -> Self {
        Self {
            sun_color: [1.0, 0.95, 0.85],
            sky_color: [0.55, 0.7, 0.9],
        }
    }
}

/// Which tile a draw call submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawKind {
    Grid { level: u32 },
    Fill { level: u32, side: FillSide },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    pub kind: DrawKind,
    pub index_count: u32,
}

/// Everything one render call submitted, in submission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawList {
    pub mode: RenderMode,
    /// False when wireframe programs had to fall back to filled triangles.
    pub line_polygons: bool,
    pub items: Vec<DrawItem>,
    /// Levels whose ring failed the frustum test.
    pub culled_grids: Vec<u32>,
}
