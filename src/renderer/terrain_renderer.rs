//! Terrain drawing: clipmap displacement plus the shaded and wireframe passes

use super::renderer_data::{DrawList, RenderMode, ShadingSettings, SkyLighting};
use super::renderer_operations::{fill_uniforms, grid_uniforms, pass_uniforms, plan_draws, PlannedDraw};
use crate::camera::CameraView;
use crate::clipmap::{Clipmap, ComputeStats};
use crate::config::TerrainConfig;
use crate::error::TerrainResult;
use crate::fields::{FieldHandles, MapSettings, ScaleSettings};
use crate::gpu::shaders::{self, slots, TerrainVertexStage};
use crate::gpu::{
    DrawTarget, GpuBackend, PolygonMode, ShaderHandle, UniformValue, WrapMode,
};

#[derive(Debug, Clone, Copy)]
struct TerrainPrograms {
    displace: ShaderHandle,
    grid_shaded: ShaderHandle,
    fill_shaded: ShaderHandle,
    grid_wireframe: ShaderHandle,
    fill_wireframe: ShaderHandle,
    line_polygons: bool,
}

impl TerrainPrograms {
    fn for_mode(&self, mode: RenderMode) -> (ShaderHandle, ShaderHandle) {
        match mode {
            RenderMode::Shaded => (self.grid_shaded, self.fill_shaded),
            RenderMode::Wireframe => (self.grid_wireframe, self.fill_wireframe),
        }
    }
}

/// Owns the clipmap and draws it with read-only handles to the fields.
#[derive(Debug)]
pub struct TerrainRenderer {
    clipmap: Clipmap,
    fields: FieldHandles,
    material_layers: u32,
    material_wrap: WrapMode,
    shading: ShadingSettings,
    full_update_requested: bool,
    programs: Option<TerrainPrograms>,
}

impl TerrainRenderer {
    pub fn new(config: &TerrainConfig, fields: FieldHandles) -> TerrainResult<Self> {
        Ok(Self {
            clipmap: Clipmap::new(config.subdivisions, config.lod_levels, config.base_cell_size)?,
            fields,
            material_layers: config.material_layers,
            material_wrap: config.material_wrap,
            shading: ShadingSettings::default(),
            full_update_requested: true,
            programs: None,
        })
    }

    /// Allocate the clipmap meshes and build every terrain program. The
    /// first `update` afterwards runs in full.
    pub fn init(&mut self, backend: &mut dyn GpuBackend) -> TerrainResult<()> {
        self.clipmap.init(backend)?;

        let line_polygons = backend.supports_wireframe();
        if !line_polygons {
            log::warn!(
                "[TerrainRenderer::init] Line polygon mode unsupported, wireframe draws filled triangles"
            );
        }
        let mut wireframe = |stage| {
            let mut desc = shaders::terrain_shader(stage, true, self.material_wrap);
            if !line_polygons {
                desc.polygon_mode = PolygonMode::Fill;
            }
            backend.create_render_shader(&desc)
        };
        let grid_wireframe = wireframe(TerrainVertexStage::Grid)?;
        let fill_wireframe = wireframe(TerrainVertexStage::Fill)?;

        self.programs = Some(TerrainPrograms {
            displace: backend.create_compute_shader(&shaders::displace_shader())?,
            grid_shaded: backend.create_render_shader(&shaders::terrain_shader(
                TerrainVertexStage::Grid,
                false,
                self.material_wrap,
            ))?,
            fill_shaded: backend.create_render_shader(&shaders::terrain_shader(
                TerrainVertexStage::Fill,
                false,
                self.material_wrap,
            ))?,
            grid_wireframe,
            fill_wireframe,
            line_polygons,
        });
        self.full_update_requested = true;

        log::info!(
            "[TerrainRenderer::init] {} levels of {}x{} vertices",
            self.clipmap.levels(),
            self.clipmap.subdivisions(),
            self.clipmap.subdivisions()
        );
        Ok(())
    }

    fn programs(&self) -> TerrainPrograms {
        match self.programs {
            Some(programs) => programs,
            None => {
                log::error!("[TerrainRenderer] Used before init");
                panic!("[TerrainRenderer] Used before init: no programs built");
            }
        }
    }

    pub fn clipmap(&self) -> &Clipmap {
        &self.clipmap
    }

    pub fn fields(&self) -> FieldHandles {
        self.fields
    }

    pub fn shading(&self) -> &ShadingSettings {
        &self.shading
    }

    pub fn set_shading(&mut self, shading: ShadingSettings) {
        self.shading = shading;
    }

    /// Re-displace every level on the next update.
    pub fn request_full_update(&mut self) {
        self.full_update_requested = true;
    }

    pub fn full_update_pending(&self) -> bool {
        self.full_update_requested
    }

    /// Displace the vertices exposed since the last update, or all of them
    /// after a full-update request.
    pub fn update(
        &mut self,
        backend: &mut dyn GpuBackend,
        camera: &dyn CameraView,
        scale: &ScaleSettings,
    ) -> TerrainResult<ComputeStats> {
        let programs = self.programs();

        backend.bind_shader(programs.displace)?;
        backend.set_uniform("uScaleXZ", UniformValue::Float(scale.scale_xz))?;
        backend.set_uniform("uScaleY", UniformValue::Float(scale.scale_y))?;
        backend.bind_texture(slots::DISPLACE_HEIGHTMAP, self.fields.map.heightmap);

        let previous = if self.full_update_requested {
            None
        } else {
            camera.previous_position_xz()
        };
        let stats = self.clipmap.run_compute(
            backend,
            programs.displace,
            slots::DISPLACE_HEIGHTS,
            camera.position_xz(),
            previous,
        )?;
        self.full_update_requested = false;
        Ok(stats)
    }

    /// Draw visible rings and every fill strip, finest first, then submit.
    pub fn render(
        &mut self,
        backend: &mut dyn GpuBackend,
        camera: &dyn CameraView,
        map: &MapSettings,
        mode: RenderMode,
        sky: &SkyLighting,
    ) -> TerrainResult<DrawList> {
        let programs = self.programs();
        let (grid_shader, fill_shader) = programs.for_mode(mode);

        let (planned, culled_grids) = plan_draws(
            self.clipmap.grids(),
            self.clipmap.fills(),
            camera,
            map.scale.scale_y,
        );

        let shared = pass_uniforms(
            camera,
            self.clipmap.subdivisions(),
            self.material_layers,
            map,
            &self.shading,
            sky,
        );
        for shader in [grid_shader, fill_shader] {
            backend.bind_shader(shader)?;
            for (name, value) in &shared {
                backend.set_uniform(name, *value)?;
            }
        }
        if mode == RenderMode::Shaded {
            self.bind_shading_fields(backend);
        }
        backend.bind_texture(slots::TERRAIN_HEIGHTMAP, self.fields.map.heightmap);

        let [r, g, b] = self.shading.clear_color;
        backend.begin_draw_pass(&DrawTarget {
            clear_color: [r, g, b, 1.0],
        })?;

        let mut items = Vec::with_capacity(planned.len());
        for draw in &planned {
            match draw {
                PlannedDraw::Grid(grid) => {
                    backend.bind_shader(grid_shader)?;
                    for (name, value) in grid_uniforms(grid) {
                        backend.set_uniform(name, value)?;
                    }
                    backend.bind_storage_buffer(slots::TERRAIN_HEIGHTS, grid.height_buffer);
                    backend.draw_indexed(grid.mesh.index_buffer, grid.mesh.index_count)?;
                }
                PlannedDraw::Fill(fill) => {
                    backend.bind_shader(fill_shader)?;
                    for (name, value) in fill_uniforms(fill) {
                        backend.set_uniform(name, value)?;
                    }
                    backend.draw_indexed(fill.mesh.index_buffer, fill.mesh.index_count)?;
                }
            }
            items.push(draw.item());
        }

        backend.end_draw_pass()?;
        backend.flush()?;

        log::trace!(
            "[TerrainRenderer::render] {:?}: {} draws, {} rings culled",
            mode,
            items.len(),
            culled_grids.len()
        );
        Ok(DrawList {
            mode,
            line_polygons: mode == RenderMode::Shaded || programs.line_polygons,
            items,
            culled_grids,
        })
    }

    fn bind_shading_fields(&self, backend: &mut dyn GpuBackend) {
        let map = self.fields.map;
        let materials = self.fields.materials;
        backend.bind_texture(slots::TERRAIN_NORMAL, map.normal_map);
        backend.bind_texture(slots::TERRAIN_SHADOW, map.shadow_map);
        backend.bind_texture(slots::TERRAIN_MATERIAL_MAP, map.material_map);
        backend.bind_texture(slots::TERRAIN_ALBEDO, materials.albedo);
        backend.bind_texture(slots::TERRAIN_MATERIAL_NORMAL, materials.normal);
        backend.bind_texture(slots::TERRAIN_ROUGHNESS, materials.roughness);
    }
}
