//! Built-in procedures for the map and material editors

use super::procedure::{ParamKind, ParamSpec, ProcedureDef};
use crate::gpu::shaders;

pub const BLEND_REPLACE: i32 = 0;
pub const BLEND_AVERAGE: i32 = 1;
pub const BLEND_ADD: i32 = 2;
pub const BLEND_SUBTRACT: i32 = 3;

const BLEND_MODES: &[(&str, i32)] = &[
    ("Replace", BLEND_REPLACE),
    ("Average", BLEND_AVERAGE),
    ("Add", BLEND_ADD),
    ("Subtract", BLEND_SUBTRACT),
];

const VORONOI_TYPES: &[(&str, i32)] = &[("F1", 0), ("F2", 1), ("F2_F1", 2)];

fn blend_params(default_mode: i32) -> [ParamSpec; 2] {
    [
        ParamSpec::new(
            "uBlendMode",
            "Blend Mode",
            ParamKind::Enum {
                options: BLEND_MODES,
                default: default_mode,
            },
        ),
        ParamSpec::new(
            "uWeight",
            "Weight",
            ParamKind::Float {
                min: 0.0,
                max: 1.0,
                default: 1.0,
            },
        ),
    ]
}

fn unit_float(uniform: &'static str, label: &'static str, default: f32) -> ParamSpec {
    ParamSpec::new(
        uniform,
        label,
        ParamKind::Float {
            min: 0.0,
            max: 1.0,
            default,
        },
    )
}

fn color(uniform: &'static str, label: &'static str, default: f32) -> ParamSpec {
    ParamSpec::new(
        uniform,
        label,
        ParamKind::Color {
            default: [default; 3],
        },
    )
}

/// Terrain-scale FBM for the map heightfield
pub fn height_fbm() -> ProcedureDef {
    let mut params = vec![
        ParamSpec::new(
            "uOctaves",
            "Octaves",
            ParamKind::Int {
                min: 1,
                max: 16,
                default: 8,
            },
        ),
        ParamSpec::new(
            "uScale",
            "Scale",
            ParamKind::Int {
                min: 1,
                max: 64,
                default: 4,
            },
        ),
        unit_float("uRoughness", "Roughness", 0.5),
        ParamSpec::new(
            "uOffset",
            "Offset",
            ParamKind::Vec2 {
                min: -10.0,
                max: 10.0,
                default: [0.0, 0.0],
            },
        ),
    ];
    params.extend(blend_params(BLEND_REPLACE));
    ProcedureDef {
        name: "FBM",
        shader: shaders::height_fbm_shader(),
        params,
    }
}

pub fn height_const() -> ProcedureDef {
    let mut params = vec![unit_float("uValue", "Value", 0.0)];
    params.extend(blend_params(BLEND_REPLACE));
    ProcedureDef {
        name: "Const Value",
        shader: shaders::height_const_shader(),
        params,
    }
}

/// Material-scale FBM: one period per tile by default
pub fn material_fbm() -> ProcedureDef {
    let mut def = height_fbm();
    def.params[1] = ParamSpec::new(
        "uScale",
        "Scale",
        ParamKind::Int {
            min: 0,
            max: 100,
            default: 1,
        },
    );
    def
}

pub fn height_voronoi() -> ProcedureDef {
    let mut params = vec![
        ParamSpec::new(
            "uScale",
            "Scale",
            ParamKind::Int {
                min: 0,
                max: 100,
                default: 1,
            },
        ),
        unit_float("uRandomness", "Randomness", 1.0),
        ParamSpec::new(
            "uVoronoiType",
            "Type",
            ParamKind::Enum {
                options: VORONOI_TYPES,
                default: 0,
            },
        ),
    ];
    params.extend(blend_params(BLEND_REPLACE));
    ProcedureDef {
        name: "Voronoi",
        shader: shaders::height_voronoi_shader(),
        params,
    }
}

pub fn albedo_const() -> ProcedureDef {
    ProcedureDef {
        name: "Const Albedo",
        shader: shaders::albedo_const_shader(),
        params: vec![color("uColor", "Albedo", 0.005)],
    }
}

pub fn albedo_ramp() -> ProcedureDef {
    ProcedureDef {
        name: "Albedo Ramp",
        shader: shaders::albedo_ramp_shader(),
        params: vec![
            unit_float("uEdge1", "Edge 1", 0.0),
            unit_float("uEdge2", "Edge 2", 1.0),
            color("uColor1", "Albedo 1", 0.0),
            color("uColor2", "Albedo 2", 1.0),
        ],
    }
}

fn roughness(uniform: &'static str, label: &'static str, default: f32) -> ParamSpec {
    ParamSpec::new(
        uniform,
        label,
        ParamKind::Float {
            min: 0.003,
            max: 1.0,
            default,
        },
    )
}

pub fn roughness_const() -> ProcedureDef {
    ProcedureDef {
        name: "Const Roughness",
        shader: shaders::roughness_const_shader(),
        params: vec![roughness("uValue", "Roughness", 0.7)],
    }
}

pub fn roughness_ramp() -> ProcedureDef {
    ProcedureDef {
        name: "Roughness Ramp",
        shader: shaders::roughness_ramp_shader(),
        params: vec![
            unit_float("uEdge1", "Edge 1", 0.0),
            unit_float("uEdge2", "Edge 2", 1.0),
            roughness("uValue1", "Value 1", 0.003),
            roughness("uValue2", "Value 2", 1.0),
        ],
    }
}

/// Registered with the map's height editor, in menu order
pub fn map_height_procedures() -> Vec<ProcedureDef> {
    vec![height_fbm(), height_voronoi(), height_const()]
}

pub fn material_height_procedures() -> Vec<ProcedureDef> {
    vec![height_const(), material_fbm(), height_voronoi()]
}

pub fn albedo_procedures() -> Vec<ProcedureDef> {
    vec![albedo_const(), albedo_ramp()]
}

pub fn roughness_procedures() -> Vec<ProcedureDef> {
    vec![roughness_const(), roughness_ramp()]
}
