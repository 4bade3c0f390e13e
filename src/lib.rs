// Hearth Terrain - clipmap terrain with GPU-generated fields
//
// Data-oriented layout, as in the rest of Hearth:
// - *_data.rs modules hold plain data
// - *_operations.rs modules hold pure functions over that data
// - stateful owners (Clipmap, generators, TerrainRenderer) drive the GPU
//   through the GpuBackend seam and hand out read-only handles
//
// For new code, start from terrain_system::TerrainSystem.

// Core modules
pub mod config;
pub mod error;

// Math and camera
pub mod camera;
pub mod math;

// GPU seam and shaders
pub mod gpu;

// Terrain
pub mod clipmap;
pub mod edits;
pub mod fields;
pub mod persistence;
pub mod renderer;
pub mod terrain_system;

pub use camera::{CameraConfig, CameraData, CameraView, FlightInput, FlyCamera};
pub use clipmap::{Clipmap, ComputeStats, FillTile, GridTile};
pub use config::TerrainConfig;
pub use edits::{EditEffects, MaterialEditor, ProcedureEdit, TerrainEdit};
pub use error::{OptionExt, TerrainError, TerrainResult};
pub use fields::{
    FieldEditor, FieldFlags, FieldHandles, LayerStage, MapFields, MapGenerator, MapSettings,
    MaterialAoSettings, MaterialFields, MaterialGenerator,
};
pub use gpu::{GpuBackend, GpuError, GpuResult, RecordingBackend, WgpuBackend};
pub use math::Aabb;
pub use renderer::{DrawList, RenderMode, ShadingSettings, SkyLighting, TerrainRenderer};
pub use terrain_system::{FrameReport, TerrainSystem};

// Re-export commonly used external types
pub use cgmath;
pub use wgpu;
