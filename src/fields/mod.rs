//! Procedural field generation
//!
//! - dirty.rs: dirty sets and the fixed stage dependency graph
//! - procedure.rs / procedure_library.rs: procedure chains that write a bound image
//! - map_generator.rs: heightmap, normal map, shadow map, material weights
//! - material_generator.rs: per-layer material arrays

pub mod dirty;
pub mod map_generator;
pub mod material_generator;
pub mod procedure;
pub mod procedure_library;

pub use dirty::{DependencyTracker, FieldFlags, LayerDirtySet, LayerStage, LAYER_STAGES, MAP_STAGE_ORDER};
pub use map_generator::{
    AoSettings, MapFields, MapGenerator, MapSettings, MapUpdateReport, MaterialMapSettings,
    ScaleSettings, ShadowSettings, SunSettings,
};
pub use material_generator::{
    MaterialAoSettings, MaterialFields, MaterialGenerator, MaterialUpdateReport,
};
pub use procedure::{FieldEditor, ParamKind, ParamSpec, ProcedureDef, ProcedureInstance, ProcedureStack};

/// Read-only handles to every generated field. Held by the renderer and
/// any preview tooling; only the generators write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldHandles {
    pub map: MapFields,
    pub materials: MaterialFields,
}
