//! Per-layer material texture arrays
//!
//! Every material layer owns one slice in four arrays: height (R32F),
//! normal with cavity AO, albedo and roughness. Three procedure editors
//! write the height, albedo and roughness slices; the normal slice is
//! derived from the height slice.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::dirty::{LayerDirtySet, LayerStage, LAYER_STAGES};
use super::procedure::{FieldEditor, ProcedureStack};
use super::procedure_library::{albedo_procedures, material_height_procedures, roughness_procedures};
use crate::config::{validate_resolution, TerrainConfig};
use crate::edits::MaterialEditor;
use crate::error::{TerrainError, TerrainResult};
use crate::gpu::shaders::{self, slots};
use crate::gpu::{FieldFormat, GpuBackend, ShaderHandle, TextureHandle, TextureSpec, UniformValue};

/// Cavity occlusion baked into the normal slice alpha
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialAoSettings {
    pub strength: f32,
    pub spread: f32,
    pub contrast: f32,
}

impl Default for MaterialAoSettings {
    fn default() -> Self {
        Self {
            strength: 0.5,
            spread: 2.0,
            contrast: 1.0,
        }
    }
}

/// Read-only handles to the material arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialFields {
    pub height: TextureHandle,
    pub normal: TextureHandle,
    pub albedo: TextureHandle,
    pub roughness: TextureHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialUpdateReport {
    /// `(stage, layer)` in the order they ran.
    pub updated: Vec<(LayerStage, usize)>,
    pub dispatches: u32,
}

#[derive(Debug)]
struct MaterialResources {
    fields: MaterialFields,
    resolution: u32,
    normal_shader: ShaderHandle,
}

#[derive(Debug)]
pub struct MaterialGenerator {
    layers: usize,
    ao: MaterialAoSettings,
    dirty: LayerDirtySet,
    height_editor: ProcedureStack,
    albedo_editor: ProcedureStack,
    roughness_editor: ProcedureStack,
    resources: Option<MaterialResources>,
}

impl MaterialGenerator {
    pub fn new(layers: usize) -> Self {
        Self {
            layers,
            ao: MaterialAoSettings::default(),
            dirty: LayerDirtySet::new(layers),
            height_editor: ProcedureStack::new("Height", layers),
            albedo_editor: ProcedureStack::new("Albedo", layers),
            roughness_editor: ProcedureStack::new("Roughness", layers),
            resources: None,
        }
    }

    pub fn init(&mut self, backend: &mut dyn GpuBackend, config: &TerrainConfig) -> TerrainResult<()> {
        validate_resolution("material_resolution", config.material_resolution)?;
        if config.material_layers as usize != self.layers {
            return Err(TerrainError::invalid_config(
                "material_layers",
                config.material_layers,
                format!("generator was built for {} layers", self.layers),
            ));
        }
        let res = config.material_resolution;
        let layers = self.layers as u32;

        let fields = MaterialFields {
            height: backend.create_texture(&TextureSpec::array(
                "Material Height",
                res,
                layers,
                FieldFormat::R32Float,
                false,
            ))?,
            normal: backend.create_texture(&TextureSpec::array(
                "Material Normal",
                res,
                layers,
                FieldFormat::Rgba8Unorm,
                true,
            ))?,
            albedo: backend.create_texture(&TextureSpec::array(
                "Material Albedo",
                res,
                layers,
                FieldFormat::Rgba8Unorm,
                true,
            ))?,
            roughness: backend.create_texture(&TextureSpec::array(
                "Material Roughness",
                res,
                layers,
                FieldFormat::Rgba8Unorm,
                true,
            ))?,
        };
        let normal_shader = backend.create_compute_shader(&shaders::material_normal_shader())?;

        for def in material_height_procedures() {
            self.height_editor.register_procedure(backend, def)?;
        }
        for def in albedo_procedures() {
            self.albedo_editor.register_procedure(backend, def)?;
        }
        for def in roughness_procedures() {
            self.roughness_editor.register_procedure(backend, def)?;
        }
        for layer in 0..self.layers {
            for (editor, initial) in [
                (&mut self.height_editor, "Const Value"),
                (&mut self.albedo_editor, "Const Albedo"),
                (&mut self.roughness_editor, "Const Roughness"),
            ] {
                if editor.instances(layer).is_empty() {
                    editor.add_instance(layer, initial)?;
                }
            }
        }

        self.resources = Some(MaterialResources {
            fields,
            resolution: res,
            normal_shader,
        });
        self.dirty.mark_all();

        log::info!(
            "[MaterialGenerator::init] {} layers at {}x{}",
            self.layers,
            res,
            res
        );
        Ok(())
    }

    fn resources(&self) -> &MaterialResources {
        match self.resources.as_ref() {
            Some(resources) => resources,
            None => {
                log::error!("[MaterialGenerator] Layers used before init");
                panic!("[MaterialGenerator] Layers used before init: nothing allocated");
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    pub fn fields(&self) -> MaterialFields {
        self.resources().fields
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    pub fn ao(&self) -> MaterialAoSettings {
        self.ao
    }

    pub fn dirty(&self) -> &LayerDirtySet {
        &self.dirty
    }

    pub fn editor(&self, editor: MaterialEditor) -> &ProcedureStack {
        match editor {
            MaterialEditor::Height => &self.height_editor,
            MaterialEditor::Albedo => &self.albedo_editor,
            MaterialEditor::Roughness => &self.roughness_editor,
        }
    }

    /// Edits through this handle must be followed by a `mark_layer` for
    /// the editor's stage.
    pub fn editor_mut(&mut self, editor: MaterialEditor) -> &mut ProcedureStack {
        match editor {
            MaterialEditor::Height => &mut self.height_editor,
            MaterialEditor::Albedo => &mut self.albedo_editor,
            MaterialEditor::Roughness => &mut self.roughness_editor,
        }
    }

    pub fn mark_layer(&mut self, layer: usize, stage: LayerStage) -> TerrainResult<()> {
        self.dirty.mark(layer, stage)
    }

    pub fn mark_stage(&mut self, stage: LayerStage) {
        self.dirty.mark_stage(stage);
    }

    /// Returns whether anything changed. A change re-derives every normal
    /// slice.
    pub fn set_ao(&mut self, ao: MaterialAoSettings) -> bool {
        if ao == self.ao {
            return false;
        }
        self.ao = ao;
        self.dirty.mark_stage(LayerStage::Normal);
        true
    }

    /// Recompute exactly the dirty (stage, layer) pairs, stage by stage.
    pub fn update(&mut self, backend: &mut dyn GpuBackend) -> TerrainResult<MaterialUpdateReport> {
        if self.dirty.is_clean() {
            return Ok(MaterialUpdateReport::default());
        }

        let resources = self.resources();
        let mut report = MaterialUpdateReport::default();
        for stage in LAYER_STAGES {
            for layer in self.dirty.dirty_layers(stage) {
                report.dispatches += match stage {
                    LayerStage::Height => self.update_height(backend, resources, layer)?,
                    LayerStage::Normal => self.update_normal(backend, resources, layer)?,
                    LayerStage::Albedo => self.update_albedo(backend, resources, layer)?,
                };
                report.updated.push((stage, layer));
            }
        }

        for (stage, layer) in &report.updated {
            self.dirty.clear(*layer, *stage);
        }
        log::debug!(
            "[MaterialGenerator::update] {} layer stages, {} dispatches",
            report.updated.len(),
            report.dispatches
        );
        Ok(report)
    }

    fn update_height(
        &self,
        backend: &mut dyn GpuBackend,
        resources: &MaterialResources,
        layer: usize,
    ) -> TerrainResult<u32> {
        backend.bind_image(slots::PROCEDURE_OUTPUT, resources.fields.height, layer as u32);
        self.height_editor.dispatch(backend, layer, resources.resolution)
    }

    fn update_normal(
        &self,
        backend: &mut dyn GpuBackend,
        resources: &MaterialResources,
        layer: usize,
    ) -> TerrainResult<u32> {
        let res = resources.resolution;
        backend.bind_shader(resources.normal_shader)?;
        backend.set_uniform("uResolution", UniformValue::Int(res as i32))?;
        backend.set_uniform("uLayer", UniformValue::Int(layer as i32))?;
        backend.set_uniform("uStrength", UniformValue::Float(self.ao.strength))?;
        backend.set_uniform("uSpread", UniformValue::Float(self.ao.spread))?;
        backend.set_uniform("uContrast", UniformValue::Float(self.ao.contrast))?;
        backend.bind_texture(slots::MATERIAL_NORMAL_HEIGHT_INPUT, resources.fields.height);
        backend.bind_image(slots::MATERIAL_NORMAL_OUTPUT, resources.fields.normal, layer as u32);
        backend.dispatch(res, res, 1)?;
        backend.memory_barrier();
        backend.generate_mipmaps(resources.fields.normal, layer as u32)?;
        Ok(1)
    }

    /// Albedo and roughness both sample the height slice.
    fn update_albedo(
        &self,
        backend: &mut dyn GpuBackend,
        resources: &MaterialResources,
        layer: usize,
    ) -> TerrainResult<u32> {
        let res = resources.resolution;
        let fields = resources.fields;
        backend.bind_texture(slots::PROCEDURE_HEIGHT_INPUT, fields.height);

        backend.bind_image(slots::PROCEDURE_OUTPUT, fields.albedo, layer as u32);
        let mut dispatches = self.albedo_editor.dispatch(backend, layer, res)?;
        backend.generate_mipmaps(fields.albedo, layer as u32)?;

        backend.bind_image(slots::PROCEDURE_OUTPUT, fields.roughness, layer as u32);
        dispatches += self.roughness_editor.dispatch(backend, layer, res)?;
        backend.generate_mipmaps(fields.roughness, layer as u32)?;
        Ok(dispatches)
    }

    pub fn serialize(&self, out: &mut Map<String, Value>) -> TerrainResult<()> {
        let ao = serde_json::to_value(self.ao).map_err(|e| TerrainError::SerializationError {
            context: "Materials.AO".to_string(),
            error: e.to_string(),
        })?;
        out.insert("AO".to_string(), ao);
        for editor in [&self.height_editor, &self.albedo_editor, &self.roughness_editor] {
            out.insert(editor.name().to_string(), editor.serialize());
        }
        Ok(())
    }

    /// Load AO settings and editor chains, then recompute every layer.
    pub fn deserialize(&mut self, input: &Value) -> TerrainResult<()> {
        if let Some(ao) = input.get("AO") {
            self.ao = serde_json::from_value(ao.clone()).map_err(|e| {
                TerrainError::DeserializationError {
                    context: "Materials.AO".to_string(),
                    error: e.to_string(),
                }
            })?;
        }
        for editor in [
            &mut self.height_editor,
            &mut self.albedo_editor,
            &mut self.roughness_editor,
        ] {
            if let Some(chains) = input.get(editor.name()) {
                editor.deserialize(chains)?;
            }
        }
        self.dirty.mark_all();
        log::info!("[MaterialGenerator::deserialize] Loaded {} layers, all dirty", self.layers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingBackend;

    fn config(layers: u32) -> TerrainConfig {
        TerrainConfig {
            material_resolution: 32,
            material_layers: layers,
            ..TerrainConfig::default()
        }
    }

    fn generator(backend: &mut RecordingBackend, layers: usize) -> MaterialGenerator {
        let mut materials = MaterialGenerator::new(layers);
        materials.init(backend, &config(layers as u32)).unwrap();
        materials
    }

    #[test]
    fn test_init_computes_every_layer() {
        let mut backend = RecordingBackend::new();
        let mut materials = generator(&mut backend, 3);
        backend.clear_commands();

        let report = materials.update(&mut backend).unwrap();
        assert_eq!(report.updated.len(), 9);
        // height, normal, albedo + roughness per layer
        assert_eq!(report.dispatches, 3 * 4);
        assert!(materials.dirty().is_clean());

        // stage-major order
        let stages: Vec<LayerStage> = report.updated.iter().map(|(s, _)| *s).collect();
        assert_eq!(&stages[..3], &[LayerStage::Height; 3]);
        assert_eq!(&stages[6..], &[LayerStage::Albedo; 3]);
    }

    #[test]
    fn test_albedo_edit_touches_one_slice() {
        let mut backend = RecordingBackend::new();
        let mut materials = generator(&mut backend, 4);
        materials.update(&mut backend).unwrap();
        backend.clear_commands();

        materials
            .editor_mut(MaterialEditor::Albedo)
            .set_parameter(2, 0, "uColor", UniformValue::Vec3([0.2, 0.3, 0.4]))
            .unwrap();
        materials.mark_layer(2, LayerStage::Albedo).unwrap();
        let report = materials.update(&mut backend).unwrap();
        assert_eq!(report.updated, vec![(LayerStage::Albedo, 2)]);

        let fields = materials.fields();
        let albedo = backend.dispatches_of("Const Albedo").next().unwrap();
        assert_eq!(albedo.image_layer(slots::PROCEDURE_OUTPUT), Some((fields.albedo, 2)));
        assert_eq!(albedo.uniform("uColor"), Some(UniformValue::Vec3([0.2, 0.3, 0.4])));
        let roughness = backend.dispatches_of("Const Roughness").next().unwrap();
        assert_eq!(roughness.image_layer(slots::PROCEDURE_OUTPUT), Some((fields.roughness, 2)));
        assert_eq!(
            backend.mip_regenerations(),
            vec![(fields.albedo, 2), (fields.roughness, 2)]
        );
    }

    #[test]
    fn test_height_edit_rebuilds_dependents_of_layer() {
        let mut backend = RecordingBackend::new();
        let mut materials = generator(&mut backend, 2);
        materials.update(&mut backend).unwrap();
        backend.clear_commands();

        materials.mark_layer(1, LayerStage::Height).unwrap();
        let report = materials.update(&mut backend).unwrap();
        assert_eq!(
            report.updated,
            vec![
                (LayerStage::Height, 1),
                (LayerStage::Normal, 1),
                (LayerStage::Albedo, 1)
            ]
        );
        let normal = backend.dispatches_of("Material Normal").next().unwrap();
        assert_eq!(normal.uniform("uLayer"), Some(UniformValue::Int(1)));
    }

    #[test]
    fn test_ao_change_marks_every_normal() {
        let mut backend = RecordingBackend::new();
        let mut materials = generator(&mut backend, 3);
        materials.update(&mut backend).unwrap();

        assert!(!materials.set_ao(materials.ao()));
        assert!(materials.set_ao(MaterialAoSettings {
            contrast: 2.0,
            ..MaterialAoSettings::default()
        }));
        assert_eq!(materials.dirty().dirty_layers(LayerStage::Normal), vec![0, 1, 2]);
        assert!(materials.dirty().dirty_layers(LayerStage::Albedo).is_empty());
    }

    #[test]
    fn test_idle_update_dispatches_nothing() {
        let mut backend = RecordingBackend::new();
        let mut materials = generator(&mut backend, 2);
        materials.update(&mut backend).unwrap();
        backend.clear_commands();
        let report = materials.update(&mut backend).unwrap();
        assert_eq!(report, MaterialUpdateReport::default());
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_slices_are_arrays_with_expected_formats() {
        let mut backend = RecordingBackend::new();
        let materials = generator(&mut backend, 3);
        let fields = materials.fields();

        let height = backend.texture_spec(fields.height).unwrap();
        assert!(height.array);
        assert_eq!(height.layers, 3);
        assert_eq!(height.format, FieldFormat::R32Float);
        assert!(!height.mipmapped);

        for texture in [fields.normal, fields.albedo, fields.roughness] {
            let spec = backend.texture_spec(texture).unwrap();
            assert_eq!((spec.resolution, spec.layers), (32, 3));
            assert_eq!(spec.format, FieldFormat::Rgba8Unorm);
            assert!(spec.mipmapped);
        }
    }

    #[test]
    fn test_layer_count_must_match_config() {
        let mut backend = RecordingBackend::new();
        let mut materials = MaterialGenerator::new(2);
        assert!(materials.init(&mut backend, &config(3)).is_err());
    }

    #[test]
    fn test_serialize_round_trip_marks_all_layers() {
        let mut backend = RecordingBackend::new();
        let mut materials = generator(&mut backend, 2);
        materials
            .editor_mut(MaterialEditor::Height)
            .add_instance(1, "Voronoi")
            .unwrap();
        materials.update(&mut backend).unwrap();

        let mut document = Map::new();
        materials.serialize(&mut document).unwrap();
        let keys: Vec<&str> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["AO", "Height", "Albedo", "Roughness"]);

        let mut loaded = generator(&mut backend, 2);
        loaded.update(&mut backend).unwrap();
        loaded.deserialize(&Value::Object(document)).unwrap();
        assert_eq!(loaded.editor(MaterialEditor::Height).instances(1).len(), 2);
        for stage in LAYER_STAGES {
            assert_eq!(loaded.dirty().dirty_layers(stage), vec![0, 1]);
        }
    }
}
