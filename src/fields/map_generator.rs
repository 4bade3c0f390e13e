//! Map-scale fields: heightmap, normal map, shadow map and material weights
//!
//! Stages run in dependency order over whatever the tracker holds when
//! `update` starts. Every stage ends with a barrier so the next one can
//! sample its output, and mipmapped fields rebuild their chain before the
//! stage counts as done.

use cgmath::Vector3;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::dirty::{DependencyTracker, FieldFlags};
use super::procedure::{FieldEditor, ProcedureStack};
use super::procedure_library::map_height_procedures;
use crate::config::{validate_resolution, TerrainConfig};
use crate::edits::{diff_map_settings, SettingsDiff};
use crate::error::{TerrainError, TerrainResult};
use crate::gpu::shaders::{self, slots};
use crate::gpu::{FieldFormat, GpuBackend, ShaderHandle, TextureHandle, TextureSpec, UniformValue};

/// Terrain spans `[-scale_xz, scale_xz]` horizontally and `[0, scale_y]`
/// vertically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSettings {
    pub scale_xz: f32,
    pub scale_y: f32,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            scale_xz: 400.0,
            scale_y: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub enabled: bool,
    pub min_t: f32,
    pub max_t: f32,
    pub steps: i32,
    pub mip_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_t: 0.01,
            max_t: 1.0,
            steps: 64,
            mip_bias: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AoSettings {
    pub samples: i32,
    pub radius: f32,
}

impl Default for AoSettings {
    fn default() -> Self {
        Self {
            samples: 8,
            radius: 0.01,
        }
    }
}

/// Thresholds for the four material weights. Slope is `1 - normal.y`,
/// height is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialMapSettings {
    pub slope_low: f32,
    pub slope_high: f32,
    pub height_low: f32,
    pub height_high: f32,
    pub blend: f32,
}

impl Default for MaterialMapSettings {
    fn default() -> Self {
        Self {
            slope_low: 0.25,
            slope_high: 0.45,
            height_low: 0.35,
            height_high: 0.75,
            blend: 0.05,
        }
    }
}

/// Sun position: `theta` from zenith, `phi` around the vertical axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunSettings {
    pub theta: f32,
    pub phi: f32,
}

impl Default for SunSettings {
    fn default() -> Self {
        Self {
            theta: 0.8,
            phi: 0.6,
        }
    }
}

impl SunSettings {
    /// Unit vector pointing at the sun.
    pub fn direction(&self) -> Vector3<f32> {
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        Vector3::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    pub scale: ScaleSettings,
    pub shadow: ShadowSettings,
    pub ao: AoSettings,
    pub material_map: MaterialMapSettings,
    pub sun: SunSettings,
}

/// Read-only handles to the map fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapFields {
    pub heightmap: TextureHandle,
    pub normal_map: TextureHandle,
    pub shadow_map: TextureHandle,
    pub material_map: TextureHandle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapUpdateReport {
    pub updated: FieldFlags,
    pub dispatches: u32,
}

#[derive(Debug)]
struct MapResources {
    fields: MapFields,
    height_resolution: u32,
    shadow_resolution: u32,
    normal_shader: ShaderHandle,
    shadow_shader: ShaderHandle,
    material_map_shader: ShaderHandle,
}

#[derive(Debug)]
pub struct MapGenerator {
    settings: MapSettings,
    tracker: DependencyTracker,
    height_editor: ProcedureStack,
    geometry_dirty: bool,
    resources: Option<MapResources>,
}

impl MapGenerator {
    pub fn new(settings: MapSettings) -> Self {
        Self {
            tracker: DependencyTracker::new(settings.shadow.enabled),
            settings,
            height_editor: ProcedureStack::new("Height", 1),
            geometry_dirty: false,
            resources: None,
        }
    }

    /// Allocate the fields, build the stage programs and register the height
    /// procedures. Everything starts dirty.
    pub fn init(&mut self, backend: &mut dyn GpuBackend, config: &TerrainConfig) -> TerrainResult<()> {
        validate_resolution("height_resolution", config.height_resolution)?;
        validate_resolution("shadow_resolution", config.shadow_resolution)?;
        let res = config.height_resolution;
        let shadow_res = config.shadow_resolution;

        let fields = MapFields {
            heightmap: backend.create_texture(&TextureSpec::plane(
                "Map Heightmap",
                res,
                FieldFormat::R32Float,
                true,
            ))?,
            normal_map: backend.create_texture(&TextureSpec::plane(
                "Map Normal",
                res,
                FieldFormat::Rgba8Unorm,
                true,
            ))?,
            shadow_map: backend.create_texture(&TextureSpec::plane(
                "Map Shadow",
                shadow_res,
                FieldFormat::Rgba8Unorm,
                false,
            ))?,
            material_map: backend.create_texture(&TextureSpec::plane(
                "Map Material Weights",
                res,
                FieldFormat::Rgba8Unorm,
                true,
            ))?,
        };

        let normal_shader = backend.create_compute_shader(&shaders::map_normal_shader())?;
        let shadow_shader = backend.create_compute_shader(&shaders::shadow_shader())?;
        let material_map_shader = backend.create_compute_shader(&shaders::material_map_shader())?;

        for def in map_height_procedures() {
            self.height_editor.register_procedure(backend, def)?;
        }
        if self.height_editor.instances(0).is_empty() {
            self.height_editor.add_instance(0, "FBM")?;
        }

        self.resources = Some(MapResources {
            fields,
            height_resolution: res,
            shadow_resolution: shadow_res,
            normal_shader,
            shadow_shader,
            material_map_shader,
        });
        self.mark_dirty(FieldFlags::all());

        log::info!(
            "[MapGenerator::init] Heightmap {}x{}, shadow map {}x{}, {} height procedures",
            res,
            res,
            shadow_res,
            shadow_res,
            self.height_editor.registered().count()
        );
        Ok(())
    }

    fn resources(&self) -> &MapResources {
        match self.resources.as_ref() {
            Some(resources) => resources,
            None => {
                log::error!("[MapGenerator] Fields used before init");
                panic!("[MapGenerator] Fields used before init: nothing allocated");
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    pub fn fields(&self) -> MapFields {
        self.resources().fields
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    pub fn height_editor(&self) -> &ProcedureStack {
        &self.height_editor
    }

    /// Edits through this handle must be followed by
    /// `mark_dirty(FieldFlags::HEIGHT)`.
    pub fn height_editor_mut(&mut self) -> &mut ProcedureStack {
        &mut self.height_editor
    }

    /// Mark fields and their dependents. A height change also owes the
    /// clipmap a full displacement.
    pub fn mark_dirty(&mut self, flags: FieldFlags) {
        if flags.contains(FieldFlags::HEIGHT) {
            self.geometry_dirty = true;
        }
        self.tracker.mark_dirty(flags);
    }

    /// Replace the settings and mark whatever the change invalidates.
    pub fn apply_settings(&mut self, settings: MapSettings) -> SettingsDiff {
        let diff = diff_map_settings(&self.settings, &settings);
        self.settings = settings;

        if let Some(enabled) = diff.shadows_enabled {
            self.tracker.set_shadows_enabled(enabled);
        }
        self.tracker.mark_dirty(diff.flags);
        self.geometry_dirty |= diff.geometry;

        if !diff.is_empty() {
            log::debug!(
                "[MapGenerator::apply_settings] Marked {:?}, geometry={}",
                diff.flags,
                diff.geometry
            );
        }
        diff
    }

    /// True when heights or scale changed since the last displacement.
    pub fn geometry_should_update(&self) -> bool {
        self.geometry_dirty
    }

    /// Read and reset the geometry flag.
    pub fn take_geometry_update(&mut self) -> bool {
        std::mem::take(&mut self.geometry_dirty)
    }

    /// Recompute exactly the dirty stages, in dependency order.
    pub fn update(&mut self, backend: &mut dyn GpuBackend) -> TerrainResult<MapUpdateReport> {
        let scheduled = self.tracker.scheduled();
        if scheduled.is_empty() {
            return Ok(MapUpdateReport::default());
        }

        let resources = self.resources();
        let mut report = MapUpdateReport::default();
        for stage in scheduled {
            report.dispatches += if stage == FieldFlags::HEIGHT {
                self.update_height(backend, resources)?
            } else if stage == FieldFlags::NORMAL {
                self.update_normal(backend, resources)?
            } else if stage == FieldFlags::SHADOW {
                self.update_shadow(backend, resources)?
            } else {
                self.update_material_map(backend, resources)?
            };
            report.updated |= stage;
        }

        self.tracker.clear(report.updated);
        log::debug!(
            "[MapGenerator::update] Recomputed {:?} with {} dispatches",
            report.updated,
            report.dispatches
        );
        Ok(report)
    }

    fn update_height(
        &self,
        backend: &mut dyn GpuBackend,
        resources: &MapResources,
    ) -> TerrainResult<u32> {
        let heightmap = resources.fields.heightmap;
        backend.bind_image(slots::PROCEDURE_OUTPUT, heightmap, 0);
        let dispatches = self
            .height_editor
            .dispatch(backend, 0, resources.height_resolution)?;
        if dispatches == 0 {
            log::warn!("[MapGenerator::update_height] Height chain is empty, heightmap keeps its contents");
        }
        backend.generate_mipmaps(heightmap, 0)?;
        Ok(dispatches)
    }

    fn update_normal(
        &self,
        backend: &mut dyn GpuBackend,
        resources: &MapResources,
    ) -> TerrainResult<u32> {
        let res = resources.height_resolution;
        let scale = self.settings.scale;
        let ao = self.settings.ao;

        backend.bind_shader(resources.normal_shader)?;
        backend.set_uniform("uResolution", UniformValue::Int(res as i32))?;
        backend.set_uniform("uScaleXZ", UniformValue::Float(scale.scale_xz))?;
        backend.set_uniform("uScaleY", UniformValue::Float(scale.scale_y))?;
        backend.set_uniform("uAOSamples", UniformValue::Int(ao.samples))?;
        backend.set_uniform("uAORadius", UniformValue::Float(ao.radius))?;
        backend.bind_texture(slots::MAP_HEIGHT_INPUT, resources.fields.heightmap);
        backend.bind_image(slots::MAP_FIELD_OUTPUT, resources.fields.normal_map, 0);
        backend.dispatch(res, res, 1)?;
        backend.memory_barrier();
        backend.generate_mipmaps(resources.fields.normal_map, 0)?;
        Ok(1)
    }

    fn update_shadow(
        &self,
        backend: &mut dyn GpuBackend,
        resources: &MapResources,
    ) -> TerrainResult<u32> {
        let res = resources.shadow_resolution;
        let scale = self.settings.scale;
        let shadow = self.settings.shadow;
        let sun = self.settings.sun.direction();

        backend.bind_shader(resources.shadow_shader)?;
        backend.set_uniform("uSunDir", UniformValue::Vec3(sun.into()))?;
        backend.set_uniform("uResolution", UniformValue::Int(res as i32))?;
        backend.set_uniform("uScaleXZ", UniformValue::Float(scale.scale_xz))?;
        backend.set_uniform("uScaleY", UniformValue::Float(scale.scale_y))?;
        backend.set_uniform("uMinT", UniformValue::Float(shadow.min_t))?;
        backend.set_uniform("uMaxT", UniformValue::Float(shadow.max_t))?;
        backend.set_uniform("uSteps", UniformValue::Int(shadow.steps))?;
        backend.set_uniform("uMipBias", UniformValue::Float(shadow.mip_bias))?;
        backend.bind_texture(slots::MAP_HEIGHT_INPUT, resources.fields.heightmap);
        backend.bind_image(slots::MAP_FIELD_OUTPUT, resources.fields.shadow_map, 0);
        backend.dispatch(res, res, 1)?;
        backend.memory_barrier();
        Ok(1)
    }

    fn update_material_map(
        &self,
        backend: &mut dyn GpuBackend,
        resources: &MapResources,
    ) -> TerrainResult<u32> {
        let res = resources.height_resolution;
        let m = self.settings.material_map;

        backend.bind_shader(resources.material_map_shader)?;
        backend.set_uniform("uResolution", UniformValue::Int(res as i32))?;
        backend.set_uniform("uSlopeLow", UniformValue::Float(m.slope_low))?;
        backend.set_uniform("uSlopeHigh", UniformValue::Float(m.slope_high))?;
        backend.set_uniform("uHeightLow", UniformValue::Float(m.height_low))?;
        backend.set_uniform("uHeightHigh", UniformValue::Float(m.height_high))?;
        backend.set_uniform("uBlend", UniformValue::Float(m.blend))?;
        backend.bind_texture(slots::MAP_HEIGHT_INPUT, resources.fields.heightmap);
        backend.bind_texture(slots::MATERIAL_MAP_NORMAL_INPUT, resources.fields.normal_map);
        backend.bind_image(slots::MATERIAL_MAP_OUTPUT, resources.fields.material_map, 0);
        backend.dispatch(res, res, 1)?;
        backend.memory_barrier();
        backend.generate_mipmaps(resources.fields.material_map, 0)?;
        Ok(1)
    }

    pub fn serialize(&self, out: &mut Map<String, Value>) -> TerrainResult<()> {
        let to_value = |value: serde_json::Result<Value>| {
            value.map_err(|e| TerrainError::SerializationError {
                context: "Map".to_string(),
                error: e.to_string(),
            })
        };
        out.insert("Scale".to_string(), to_value(serde_json::to_value(self.settings.scale))?);
        out.insert("Shadows".to_string(), to_value(serde_json::to_value(self.settings.shadow))?);
        out.insert("AO".to_string(), to_value(serde_json::to_value(self.settings.ao))?);
        out.insert(
            "MaterialMap".to_string(),
            to_value(serde_json::to_value(self.settings.material_map))?,
        );
        out.insert("Sun".to_string(), to_value(serde_json::to_value(self.settings.sun))?);
        out.insert(self.height_editor.name().to_string(), self.height_editor.serialize());
        Ok(())
    }

    /// Load settings and the height chain. Sections missing from `input`
    /// keep their current values. Every stage is recomputed afterwards.
    pub fn deserialize(&mut self, input: &Value) -> TerrainResult<()> {
        fn section<T: serde::de::DeserializeOwned>(
            input: &Value,
            key: &str,
            current: T,
        ) -> TerrainResult<T> {
            match input.get(key) {
                Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                    TerrainError::DeserializationError {
                        context: format!("Map.{}", key),
                        error: e.to_string(),
                    }
                }),
                None => Ok(current),
            }
        }

        let settings = MapSettings {
            scale: section(input, "Scale", self.settings.scale)?,
            shadow: section(input, "Shadows", self.settings.shadow)?,
            ao: section(input, "AO", self.settings.ao)?,
            material_map: section(input, "MaterialMap", self.settings.material_map)?,
            sun: section(input, "Sun", self.settings.sun)?,
        };
        if let Some(chain) = input.get(self.height_editor.name()) {
            self.height_editor.deserialize(chain)?;
        }

        self.settings = settings;
        self.tracker.set_shadows_enabled(settings.shadow.enabled);
        self.mark_dirty(FieldFlags::all());
        log::info!("[MapGenerator::deserialize] Loaded map settings, all stages dirty");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCommand, RecordingBackend};

    fn small_config() -> TerrainConfig {
        TerrainConfig {
            height_resolution: 64,
            shadow_resolution: 32,
            ..TerrainConfig::default()
        }
    }

    fn generator(backend: &mut RecordingBackend) -> MapGenerator {
        let mut map = MapGenerator::new(MapSettings::default());
        map.init(backend, &small_config()).unwrap();
        map
    }

    fn labels(backend: &RecordingBackend) -> Vec<&'static str> {
        backend.dispatches().map(|d| d.label).collect()
    }

    #[test]
    fn test_first_update_runs_every_stage_in_order() {
        let mut backend = RecordingBackend::new();
        let mut map = generator(&mut backend);
        backend.clear_commands();

        let report = map.update(&mut backend).unwrap();
        assert_eq!(report.updated, FieldFlags::all());
        assert_eq!(
            labels(&backend),
            vec!["Height FBM", "Map Normal", "Map Shadow", "Material Map"]
        );
        assert!(map.tracker().is_clean());

        let fields = map.fields();
        assert_eq!(
            backend.mip_regenerations(),
            vec![(fields.heightmap, 0), (fields.normal_map, 0), (fields.material_map, 0)]
        );
    }

    #[test]
    fn test_second_update_is_idle() {
        let mut backend = RecordingBackend::new();
        let mut map = generator(&mut backend);
        map.update(&mut backend).unwrap();
        backend.clear_commands();

        let report = map.update(&mut backend).unwrap();
        assert_eq!(report.dispatches, 0);
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn test_every_stage_ends_with_barrier_before_next_reads() {
        let mut backend = RecordingBackend::new();
        let mut map = generator(&mut backend);
        backend.clear_commands();
        map.update(&mut backend).unwrap();

        let commands = backend.commands();
        for (i, command) in commands.iter().enumerate() {
            if let GpuCommand::Dispatch(_) = command {
                assert_eq!(commands.get(i + 1), Some(&GpuCommand::Barrier));
            }
        }
    }

    #[test]
    fn test_ao_change_recomputes_normal_and_weights_only() {
        let mut backend = RecordingBackend::new();
        let mut map = generator(&mut backend);
        map.update(&mut backend).unwrap();
        map.take_geometry_update();
        backend.clear_commands();

        let mut settings = *map.settings();
        settings.ao.samples = 16;
        map.apply_settings(settings);
        assert!(!map.geometry_should_update());

        map.update(&mut backend).unwrap();
        assert_eq!(labels(&backend), vec!["Map Normal", "Material Map"]);
        let normal = backend.dispatches().next().unwrap();
        assert_eq!(normal.uniform("uAOSamples"), Some(UniformValue::Int(16)));
    }

    #[test]
    fn test_sun_change_recomputes_shadow_only() {
        let mut backend = RecordingBackend::new();
        let mut map = generator(&mut backend);
        map.update(&mut backend).unwrap();
        map.take_geometry_update();
        backend.clear_commands();

        let mut settings = *map.settings();
        settings.sun.phi += 0.5;
        map.apply_settings(settings);
        map.update(&mut backend).unwrap();
        assert_eq!(labels(&backend), vec!["Map Shadow"]);
        assert!(!map.geometry_should_update());
    }

    #[test]
    fn test_disabled_shadows_skip_stage() {
        let mut backend = RecordingBackend::new();
        let mut settings = MapSettings::default();
        settings.shadow.enabled = false;
        let mut map = MapGenerator::new(settings);
        map.init(&mut backend, &small_config()).unwrap();
        backend.clear_commands();

        map.update(&mut backend).unwrap();
        assert!(!labels(&backend).contains(&"Map Shadow"));

        settings.shadow.enabled = true;
        map.apply_settings(settings);
        backend.clear_commands();
        map.update(&mut backend).unwrap();
        assert_eq!(labels(&backend), vec!["Map Shadow"]);
    }

    #[test]
    fn test_scale_change_requests_geometry() {
        let mut backend = RecordingBackend::new();
        let mut map = generator(&mut backend);
        map.update(&mut backend).unwrap();
        assert!(map.take_geometry_update());
        assert!(!map.geometry_should_update());

        let mut settings = *map.settings();
        settings.scale.scale_y = 50.0;
        map.apply_settings(settings);
        assert!(map.geometry_should_update());
        assert!(map.tracker().is_dirty(FieldFlags::NORMAL));
        assert!(map.tracker().is_dirty(FieldFlags::SHADOW));
        assert!(!map.tracker().is_dirty(FieldFlags::HEIGHT));
    }

    #[test]
    fn test_height_edit_marks_closure() {
        let mut backend = RecordingBackend::new();
        let mut map = generator(&mut backend);
        map.update(&mut backend).unwrap();
        map.take_geometry_update();

        map.height_editor_mut()
            .set_parameter(0, 0, "uOctaves", UniformValue::Int(4))
            .unwrap();
        map.mark_dirty(FieldFlags::HEIGHT);
        assert_eq!(map.tracker().dirty(), FieldFlags::all());
        assert!(map.geometry_should_update());

        map.update(&mut backend).unwrap();
        assert!(map.tracker().is_clean());
    }

    #[test]
    fn test_sun_direction_is_unit() {
        let sun = SunSettings {
            theta: 0.0,
            phi: 1.0,
        };
        let d = sun.direction();
        assert!((d.y - 1.0).abs() < 1e-6);
        let d = SunSettings::default().direction();
        assert!(((d.x * d.x + d.y * d.y + d.z * d.z) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_serialize_then_deserialize_marks_everything() {
        let mut backend = RecordingBackend::new();
        let mut map = generator(&mut backend);
        let mut settings = *map.settings();
        settings.scale.scale_xz = 250.0;
        map.apply_settings(settings);
        map.update(&mut backend).unwrap();

        let mut document = Map::new();
        map.serialize(&mut document).unwrap();
        let keys: Vec<&str> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Scale", "Shadows", "AO", "MaterialMap", "Sun", "Height"]);

        let mut loaded = generator(&mut backend);
        loaded.update(&mut backend).unwrap();
        loaded.deserialize(&Value::Object(document)).unwrap();
        assert_eq!(loaded.settings().scale.scale_xz, 250.0);
        assert_eq!(loaded.tracker().dirty(), FieldFlags::all());
        assert!(loaded.geometry_should_update());
    }

    #[test]
    #[should_panic(expected = "before init")]
    fn test_update_before_init_panics() {
        let mut backend = RecordingBackend::new();
        let mut map = MapGenerator::new(MapSettings::default());
        map.mark_dirty(FieldFlags::HEIGHT);
        let _ = map.update(&mut backend);
    }
}
