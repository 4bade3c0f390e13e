//! Composition root
//!
//! `TerrainSystem` owns every stage. Generators write their fields, the
//! renderer reads them through the handles it was built with, and nothing
//! else holds a reference to a sibling stage.

use std::path::Path;

use serde_json::Value;

use crate::camera::CameraView;
use crate::clipmap::ComputeStats;
use crate::config::TerrainConfig;
use crate::edits::{collect_effects, settings_after, EditEffects, ProcedureEdit, TerrainEdit};
use crate::error::TerrainResult;
use crate::fields::{
    FieldEditor, FieldFlags, FieldHandles, LayerStage, MapGenerator, MapSettings, MapUpdateReport,
    MaterialGenerator, MaterialUpdateReport, ProcedureStack,
};
use crate::gpu::GpuBackend;
use crate::persistence::{self, MAP_SECTION, MATERIALS_SECTION};
use crate::renderer::{DrawList, RenderMode, SkyLighting, TerrainRenderer};

/// GPU work done by one `update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub map: MapUpdateReport,
    pub materials: MaterialUpdateReport,
    pub displacement: ComputeStats,
}

impl FrameReport {
    pub fn total_dispatches(&self) -> u32 {
        self.map.dispatches + self.materials.dispatches + self.displacement.dispatches
    }
}

pub struct TerrainSystem {
    config: TerrainConfig,
    map: MapGenerator,
    materials: MaterialGenerator,
    renderer: TerrainRenderer,
}

impl TerrainSystem {
    /// Validate `config` and initialize every stage. Any failure here is
    /// fatal: there is no terrain without its fields.
    pub fn new(backend: &mut dyn GpuBackend, config: TerrainConfig) -> TerrainResult<Self> {
        Self::with_settings(backend, config, MapSettings::default())
    }

    pub fn with_settings(
        backend: &mut dyn GpuBackend,
        config: TerrainConfig,
        settings: MapSettings,
    ) -> TerrainResult<Self> {
        config.validate()?;

        let mut map = MapGenerator::new(settings);
        map.init(backend, &config)?;
        let mut materials = MaterialGenerator::new(config.material_layers as usize);
        materials.init(backend, &config)?;

        let handles = FieldHandles {
            map: map.fields(),
            materials: materials.fields(),
        };
        let mut renderer = TerrainRenderer::new(&config, handles)?;
        renderer.init(backend)?;

        log::info!(
            "[TerrainSystem::new] Clipmap {}x{} over {} levels, {} material layers",
            config.subdivisions,
            config.subdivisions,
            config.lod_levels,
            config.material_layers
        );
        Ok(Self {
            config,
            map,
            materials,
            renderer,
        })
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn map(&self) -> &MapGenerator {
        &self.map
    }

    pub fn materials(&self) -> &MaterialGenerator {
        &self.materials
    }

    pub fn renderer(&self) -> &TerrainRenderer {
        &self.renderer
    }

    /// For shading settings. Field handles cannot be swapped.
    pub fn renderer_mut(&mut self) -> &mut TerrainRenderer {
        &mut self.renderer
    }

    pub fn fields(&self) -> FieldHandles {
        self.renderer.fields()
    }

    /// What `edits` would invalidate, without applying them.
    pub fn preview_edits(&self, edits: &[TerrainEdit]) -> EditEffects {
        collect_effects(self.map.settings(), edits)
    }

    /// Apply a batch of edits and mark what they invalidate. Edits that
    /// leave a value unchanged mark nothing. On error the edits before the
    /// failing one stay applied and marked.
    pub fn apply_edits(&mut self, edits: &[TerrainEdit]) -> TerrainResult<EditEffects> {
        let mut settings = *self.map.settings();
        let mut effects = EditEffects::default();

        let result = edits
            .iter()
            .try_for_each(|edit| self.apply_edit(edit, &mut settings, &mut effects));

        effects.merge_settings(self.map.apply_settings(settings));
        self.commit(&effects)?;
        result?;

        if !effects.is_empty() {
            log::debug!(
                "[TerrainSystem::apply_edits] {} edits: map {:?}, {} layer marks, geometry={}",
                edits.len(),
                effects.map,
                effects.layers.len(),
                effects.geometry
            );
        }
        Ok(effects)
    }

    fn apply_edit(
        &mut self,
        edit: &TerrainEdit,
        settings: &mut MapSettings,
        effects: &mut EditEffects,
    ) -> TerrainResult<()> {
        match edit {
            TerrainEdit::Scale(_)
            | TerrainEdit::Shadow(_)
            | TerrainEdit::Ao(_)
            | TerrainEdit::MaterialMap(_)
            | TerrainEdit::Sun(_) => *settings = settings_after(settings, edit),
            TerrainEdit::HeightProcedure(procedure_edit) => {
                if apply_procedure_edit(self.map.height_editor_mut(), 0, procedure_edit)? {
                    effects.map |= FieldFlags::HEIGHT;
                    effects.geometry = true;
                }
            }
            TerrainEdit::MaterialProcedure {
                editor,
                layer,
                edit: procedure_edit,
            } => {
                if apply_procedure_edit(self.materials.editor_mut(*editor), *layer, procedure_edit)? {
                    effects.mark_layer(*layer, editor.stage());
                }
            }
            TerrainEdit::MaterialAo(ao) => {
                if self.materials.set_ao(*ao) {
                    effects.mark_every_layer(LayerStage::Normal);
                }
            }
            TerrainEdit::RequestFullUpdate => effects.full_update = true,
        }
        Ok(())
    }

    fn commit(&mut self, effects: &EditEffects) -> TerrainResult<()> {
        self.map.mark_dirty(effects.map);
        for (layer, stage) in &effects.layers {
            self.materials.mark_layer(*layer, *stage)?;
        }
        for stage in &effects.every_layer {
            self.materials.mark_stage(*stage);
        }
        if effects.full_update {
            self.renderer.request_full_update();
        }
        Ok(())
    }

    /// Map stages, then material layers, then clipmap displacement.
    /// Displacement runs in full when heights or scale changed.
    pub fn update(
        &mut self,
        backend: &mut dyn GpuBackend,
        camera: &dyn CameraView,
    ) -> TerrainResult<FrameReport> {
        let map = self.map.update(backend)?;
        let materials = self.materials.update(backend)?;

        if self.map.take_geometry_update() {
            self.renderer.request_full_update();
        }
        let displacement = self
            .renderer
            .update(backend, camera, &self.map.settings().scale)?;

        let report = FrameReport {
            map,
            materials,
            displacement,
        };
        if report.total_dispatches() > 0 {
            log::debug!(
                "[TerrainSystem::update] map {:?}, {} layer stages, {} displacement dispatches{}",
                report.map.updated,
                report.materials.updated.len(),
                report.displacement.dispatches,
                if report.displacement.full { " (full)" } else { "" }
            );
        }
        Ok(report)
    }

    pub fn render(
        &mut self,
        backend: &mut dyn GpuBackend,
        camera: &dyn CameraView,
        mode: RenderMode,
        sky: &SkyLighting,
    ) -> TerrainResult<DrawList> {
        self.renderer
            .render(backend, camera, self.map.settings(), mode, sky)
    }

    pub fn to_document(&self) -> TerrainResult<Value> {
        persistence::build_document(&self.map, &self.materials)
    }

    /// Load both sections. Every stage and layer is recomputed and the
    /// clipmap re-displaced on the next update.
    pub fn apply_document(&mut self, document: &Value) -> TerrainResult<()> {
        if let Some(map) = persistence::section(document, MAP_SECTION) {
            self.map.deserialize(map)?;
        }
        if let Some(materials) = persistence::section(document, MATERIALS_SECTION) {
            self.materials.deserialize(materials)?;
        }
        self.renderer.request_full_update();
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> TerrainResult<()> {
        persistence::save_document(path, &self.to_document()?)
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> TerrainResult<()> {
        let document = persistence::load_document(path)?;
        self.apply_document(&document)
    }
}

/// Returns whether the chain changed.
fn apply_procedure_edit(
    editor: &mut ProcedureStack,
    layer: usize,
    edit: &ProcedureEdit,
) -> TerrainResult<bool> {
    match edit {
        ProcedureEdit::Add { procedure } => {
            editor.add_instance(layer, procedure)?;
            Ok(true)
        }
        ProcedureEdit::Remove { index } => {
            editor.remove_instance(layer, *index)?;
            Ok(true)
        }
        ProcedureEdit::SetParameter {
            index,
            uniform,
            value,
        } => editor.set_parameter(layer, *index, uniform, *value),
    }
}
