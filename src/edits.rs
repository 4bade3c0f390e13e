//! Edits and the dirty sets they produce
//!
//! UI input arrives as `TerrainEdit` values. Working out what an edit
//! invalidates is pure: nothing here touches the GPU or mutates a stage.
//! `TerrainSystem::apply_edits` applies the edits and hands the resulting
//! `EditEffects` to the generators.

use serde::{Deserialize, Serialize};

use crate::fields::dirty::{FieldFlags, LayerStage};
use crate::fields::map_generator::{
    AoSettings, MapSettings, MaterialMapSettings, ScaleSettings, ShadowSettings, SunSettings,
};
use crate::fields::material_generator::MaterialAoSettings;
use crate::gpu::UniformValue;

/// Which material editor a procedure edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialEditor {
    Height,
    Albedo,
    Roughness,
}

impl MaterialEditor {
    /// Stage a change to this editor invalidates. Roughness shares the
    /// albedo stage.
    pub fn stage(self) -> LayerStage {
        match self {
            MaterialEditor::Height => LayerStage::Height,
            MaterialEditor::Albedo | MaterialEditor::Roughness => LayerStage::Albedo,
        }
    }
}

/// Change to one procedure chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcedureEdit {
    Add { procedure: String },
    Remove { index: usize },
    SetParameter {
        index: usize,
        uniform: String,
        value: UniformValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TerrainEdit {
    Scale(ScaleSettings),
    Shadow(ShadowSettings),
    Ao(AoSettings),
    MaterialMap(MaterialMapSettings),
    Sun(SunSettings),
    HeightProcedure(ProcedureEdit),
    MaterialProcedure {
        editor: MaterialEditor,
        layer: usize,
        edit: ProcedureEdit,
    },
    MaterialAo(MaterialAoSettings),
    /// Re-displace every clipmap level on the next update.
    RequestFullUpdate,
}

/// What a map settings change invalidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsDiff {
    pub flags: FieldFlags,
    /// Displaced vertices are stale.
    pub geometry: bool,
    /// Shadow stage switched on or off.
    pub shadows_enabled: Option<bool>,
}

impl SettingsDiff {
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && !self.geometry && self.shadows_enabled.is_none()
    }
}

pub fn diff_map_settings(old: &MapSettings, new: &MapSettings) -> SettingsDiff {
    let mut diff = SettingsDiff::default();

    if old.scale != new.scale {
        diff.flags |= FieldFlags::NORMAL | FieldFlags::SHADOW;
        diff.geometry = true;
    }
    if old.shadow.enabled != new.shadow.enabled {
        diff.shadows_enabled = Some(new.shadow.enabled);
    }
    let old_shadow = ShadowSettings {
        enabled: new.shadow.enabled,
        ..old.shadow
    };
    if old_shadow != new.shadow || old.sun != new.sun {
        diff.flags |= FieldFlags::SHADOW;
    }
    if old.ao != new.ao {
        diff.flags |= FieldFlags::NORMAL;
    }
    if old.material_map != new.material_map {
        diff.flags |= FieldFlags::MATERIAL;
    }
    diff
}

/// Everything a batch of edits invalidates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditEffects {
    pub map: FieldFlags,
    pub shadows_enabled: Option<bool>,
    /// Single-layer marks, in edit order.
    pub layers: Vec<(usize, LayerStage)>,
    /// Stages owed on every layer.
    pub every_layer: Vec<LayerStage>,
    pub geometry: bool,
    pub full_update: bool,
}

impl EditEffects {
    pub fn is_empty(&self) -> bool {
        *self == EditEffects::default()
    }

    pub(crate) fn merge_settings(&mut self, diff: SettingsDiff) {
        self.map |= diff.flags;
        self.geometry |= diff.geometry;
        if diff.shadows_enabled.is_some() {
            self.shadows_enabled = diff.shadows_enabled;
        }
    }

    pub(crate) fn mark_layer(&mut self, layer: usize, stage: LayerStage) {
        if !self.layers.contains(&(layer, stage)) {
            self.layers.push((layer, stage));
        }
    }

    pub(crate) fn mark_every_layer(&mut self, stage: LayerStage) {
        if !self.every_layer.contains(&stage) {
            self.every_layer.push(stage);
        }
    }
}

/// Settings after `edit`, for the settings edits.
pub fn settings_after(current: &MapSettings, edit: &TerrainEdit) -> MapSettings {
    let mut next = *current;
    match edit {
        TerrainEdit::Scale(scale) => next.scale = *scale,
        TerrainEdit::Shadow(shadow) => next.shadow = *shadow,
        TerrainEdit::Ao(ao) => next.ao = *ao,
        TerrainEdit::MaterialMap(material_map) => next.material_map = *material_map,
        TerrainEdit::Sun(sun) => next.sun = *sun,
        _ => {}
    }
    next
}

/// Fold a batch of edits into one set of effects. Settings edits are
/// compared against the settings they replace, so re-sending the current
/// value costs nothing. Procedure edits are assumed to change something;
/// the caller drops the ones that did not.
pub fn collect_effects(current: &MapSettings, edits: &[TerrainEdit]) -> EditEffects {
    let mut effects = EditEffects::default();
    let mut settings = *current;

    for edit in edits {
        match edit {
            TerrainEdit::Scale(_)
            | TerrainEdit::Shadow(_)
            | TerrainEdit::Ao(_)
            | TerrainEdit::MaterialMap(_)
            | TerrainEdit::Sun(_) => {
                let next = settings_after(&settings, edit);
                effects.merge_settings(diff_map_settings(&settings, &next));
                settings = next;
            }
            TerrainEdit::HeightProcedure(_) => {
                effects.map |= FieldFlags::HEIGHT;
                effects.geometry = true;
            }
            TerrainEdit::MaterialProcedure { editor, layer, .. } => {
                effects.mark_layer(*layer, editor.stage());
            }
            TerrainEdit::MaterialAo(_) => effects.mark_every_layer(LayerStage::Normal),
            TerrainEdit::RequestFullUpdate => effects.full_update = true,
        }
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_change_marks_normal_shadow_and_geometry() {
        let old = MapSettings::default();
        let mut new = old;
        new.scale.scale_y = 10.0;
        let diff = diff_map_settings(&old, &new);
        assert_eq!(diff.flags, FieldFlags::NORMAL | FieldFlags::SHADOW);
        assert!(diff.geometry);
        assert_eq!(diff.shadows_enabled, None);
    }

    #[test]
    fn test_toggle_shadows_only_reports_toggle() {
        let old = MapSettings::default();
        let mut new = old;
        new.shadow.enabled = false;
        let diff = diff_map_settings(&old, &new);
        assert_eq!(diff.shadows_enabled, Some(false));
        assert!(diff.flags.is_empty());
    }

    #[test]
    fn test_unchanged_settings_are_free() {
        let settings = MapSettings::default();
        assert!(diff_map_settings(&settings, &settings).is_empty());
        let effects = collect_effects(
            &settings,
            &[TerrainEdit::Ao(settings.ao), TerrainEdit::Sun(settings.sun)],
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn test_edits_coalesce() {
        let settings = MapSettings::default();
        let mut sun = settings.sun;
        sun.theta = 0.2;
        let edit = ProcedureEdit::SetParameter {
            index: 0,
            uniform: "uColor".to_string(),
            value: UniformValue::Vec3([0.5, 0.4, 0.3]),
        };
        let effects = collect_effects(
            &settings,
            &[
                TerrainEdit::Sun(sun),
                TerrainEdit::MaterialProcedure {
                    editor: MaterialEditor::Albedo,
                    layer: 1,
                    edit: edit.clone(),
                },
                TerrainEdit::MaterialProcedure {
                    editor: MaterialEditor::Roughness,
                    layer: 1,
                    edit,
                },
                TerrainEdit::Sun(sun),
            ],
        );
        assert_eq!(effects.map, FieldFlags::SHADOW);
        assert_eq!(effects.layers, vec![(1, LayerStage::Albedo)]);
        assert!(!effects.geometry);
    }

    #[test]
    fn test_height_procedure_edit_needs_geometry() {
        let effects = collect_effects(
            &MapSettings::default(),
            &[TerrainEdit::HeightProcedure(ProcedureEdit::Add {
                procedure: "Voronoi".to_string(),
            })],
        );
        assert_eq!(effects.map, FieldFlags::HEIGHT);
        assert!(effects.geometry);
    }

    #[test]
    fn test_material_ao_marks_every_layer_normal() {
        let effects = collect_effects(
            &MapSettings::default(),
            &[TerrainEdit::MaterialAo(MaterialAoSettings::default())],
        );
        assert_eq!(effects.every_layer, vec![LayerStage::Normal]);
        assert!(effects.map.is_empty());
    }
}
