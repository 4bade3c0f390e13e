/// Renderer Module - Data-Oriented Programming (DOP) style
///
/// - renderer_data.rs: Pure data structures with NO methods
/// - renderer_operations.rs: Culling, draw order and uniform sets
/// - terrain_renderer.rs: Displacement and draw submission

pub mod renderer_data;
pub mod renderer_operations;
pub mod terrain_renderer;

pub use renderer_data::{DrawItem, DrawKind, DrawList, RenderMode, ShadingSettings, SkyLighting};
pub use renderer_operations::{
    fill_uniforms, grid_uniforms, opengl_to_wgpu_matrix, pass_uniforms, plan_draws, terrain_mvp,
    PlannedDraw,
};
pub use terrain_renderer::TerrainRenderer;
