//! Dirty tracking for generated fields
//!
//! Map fields share one `FieldFlags` set with a fixed dependency graph.
//! Material fields are per layer, one bit vector per layer stage, so editing
//! one layer never recomputes its neighbours.

use bit_vec::BitVec;
use bitflags::bitflags;

use crate::error::{TerrainError, TerrainResult};

bitflags! {
    /// Map-level fields
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct FieldFlags: u8 {
        const HEIGHT = 1 << 0;
        const NORMAL = 1 << 1;
        const SHADOW = 1 << 2;
        const MATERIAL = 1 << 3;
    }
}

/// Order the map stages run in
pub const MAP_STAGE_ORDER: [FieldFlags; 4] = [
    FieldFlags::HEIGHT,
    FieldFlags::NORMAL,
    FieldFlags::SHADOW,
    FieldFlags::MATERIAL,
];

impl FieldFlags {
    /// `self` plus every field causally downstream of it.
    pub fn closure(self, shadows_enabled: bool) -> Self {
        let mut flags = self;
        if flags.contains(FieldFlags::HEIGHT) {
            flags |= FieldFlags::NORMAL | FieldFlags::MATERIAL;
            if shadows_enabled {
                flags |= FieldFlags::SHADOW;
            }
        }
        // Material weights read the slope from the normal map
        if flags.contains(FieldFlags::NORMAL) {
            flags |= FieldFlags::MATERIAL;
        }
        if !shadows_enabled {
            flags.remove(FieldFlags::SHADOW);
        }
        flags
    }
}

/// Dirty set for the map stages
#[derive(Debug, Clone)]
pub struct DependencyTracker {
    dirty: FieldFlags,
    shadows_enabled: bool,
}

impl DependencyTracker {
    pub fn new(shadows_enabled: bool) -> Self {
        Self {
            dirty: FieldFlags::empty(),
            shadows_enabled,
        }
    }

    /// Mark `flags` and everything downstream of them.
    pub fn mark_dirty(&mut self, flags: FieldFlags) {
        self.dirty |= flags.closure(self.shadows_enabled);
    }

    pub fn mark_all(&mut self) {
        self.mark_dirty(FieldFlags::all());
    }

    pub fn is_dirty(&self, flag: FieldFlags) -> bool {
        self.dirty.intersects(flag)
    }

    pub fn dirty(&self) -> FieldFlags {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }

    pub fn shadows_enabled(&self) -> bool {
        self.shadows_enabled
    }

    /// Disabling drops a pending shadow recompute, enabling schedules one.
    pub fn set_shadows_enabled(&mut self, enabled: bool) {
        if enabled == self.shadows_enabled {
            return;
        }
        self.shadows_enabled = enabled;
        if enabled {
            self.dirty |= FieldFlags::SHADOW;
        } else {
            self.dirty.remove(FieldFlags::SHADOW);
        }
    }

    /// Stages owed this update, in dependency order.
    pub fn scheduled(&self) -> Vec<FieldFlags> {
        MAP_STAGE_ORDER
            .iter()
            .copied()
            .filter(|stage| self.dirty.contains(*stage))
            .collect()
    }

    /// Clear the stages an update has finished dispatching. Bits marked
    /// since `completed` was taken survive.
    pub fn clear(&mut self, completed: FieldFlags) {
        self.dirty.remove(completed);
    }
}

/// Per-layer material stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerStage {
    Height,
    Normal,
    Albedo,
}

pub const LAYER_STAGES: [LayerStage; 3] = [LayerStage::Height, LayerStage::Normal, LayerStage::Albedo];

impl LayerStage {
    fn index(self) -> usize {
        match self {
            LayerStage::Height => 0,
            LayerStage::Normal => 1,
            LayerStage::Albedo => 2,
        }
    }
}

/// One dirty bit per (stage, layer)
#[derive(Debug, Clone)]
pub struct LayerDirtySet {
    layers: usize,
    stages: [BitVec; 3],
}

impl LayerDirtySet {
    pub fn new(layers: usize) -> Self {
        Self {
            layers,
            stages: [
                BitVec::from_elem(layers, false),
                BitVec::from_elem(layers, false),
                BitVec::from_elem(layers, false),
            ],
        }
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    /// Mark one layer's stage. A height change also owes the stages that
    /// sample it.
    pub fn mark(&mut self, layer: usize, stage: LayerStage) -> TerrainResult<()> {
        if layer >= self.layers {
            return Err(TerrainError::LayerOutOfRange {
                layer,
                layers: self.layers,
            });
        }
        self.stages[stage.index()].set(layer, true);
        if stage == LayerStage::Height {
            self.stages[LayerStage::Normal.index()].set(layer, true);
            self.stages[LayerStage::Albedo.index()].set(layer, true);
        }
        Ok(())
    }

    /// Mark `stage` (and its dependents) on every layer.
    pub fn mark_stage(&mut self, stage: LayerStage) {
        for layer in 0..self.layers {
            self.stages[stage.index()].set(layer, true);
            if stage == LayerStage::Height {
                self.stages[LayerStage::Normal.index()].set(layer, true);
                self.stages[LayerStage::Albedo.index()].set(layer, true);
            }
        }
    }

    pub fn mark_all(&mut self) {
        for bits in &mut self.stages {
            bits.set_all();
        }
    }

    pub fn is_dirty(&self, layer: usize, stage: LayerStage) -> bool {
        self.stages[stage.index()].get(layer).unwrap_or(false)
    }

    pub fn dirty_layers(&self, stage: LayerStage) -> Vec<usize> {
        self.stages[stage.index()]
            .iter()
            .enumerate()
            .filter_map(|(layer, dirty)| if dirty { Some(layer) } else { None })
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.stages.iter().all(|bits| bits.none())
    }

    pub fn clear(&mut self, layer: usize, stage: LayerStage) {
        if layer < self.layers {
            self.stages[stage.index()].set(layer, false);
        }
    }

    pub fn clear_all(&mut self) {
        for bits in &mut self.stages {
            bits.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_closure_with_shadows() {
        let closure = FieldFlags::HEIGHT.closure(true);
        assert_eq!(closure, FieldFlags::all());
    }

    #[test]
    fn test_height_closure_without_shadows() {
        let closure = FieldFlags::HEIGHT.closure(false);
        assert!(closure.contains(FieldFlags::NORMAL | FieldFlags::MATERIAL));
        assert!(!closure.contains(FieldFlags::SHADOW));
    }

    #[test]
    fn test_normal_marks_material_weights() {
        assert_eq!(
            FieldFlags::NORMAL.closure(true),
            FieldFlags::NORMAL | FieldFlags::MATERIAL
        );
        assert_eq!(FieldFlags::MATERIAL.closure(true), FieldFlags::MATERIAL);
    }

    #[test]
    fn test_downstream_marks_do_not_reach_height() {
        let mut tracker = DependencyTracker::new(true);
        tracker.mark_dirty(FieldFlags::NORMAL);
        assert!(!tracker.is_dirty(FieldFlags::HEIGHT));
        assert!(!tracker.is_dirty(FieldFlags::SHADOW));
        assert_eq!(tracker.scheduled(), vec![FieldFlags::NORMAL, FieldFlags::MATERIAL]);
    }

    #[test]
    fn test_scheduled_follows_dependency_order() {
        let mut tracker = DependencyTracker::new(true);
        tracker.mark_dirty(FieldFlags::SHADOW);
        tracker.mark_dirty(FieldFlags::HEIGHT);
        assert_eq!(tracker.scheduled(), MAP_STAGE_ORDER.to_vec());
    }

    #[test]
    fn test_clear_keeps_newer_marks() {
        let mut tracker = DependencyTracker::new(true);
        tracker.mark_dirty(FieldFlags::NORMAL);
        let taken = tracker.dirty();
        tracker.mark_dirty(FieldFlags::SHADOW);
        tracker.clear(taken);
        assert_eq!(tracker.dirty(), FieldFlags::SHADOW);
    }

    #[test]
    fn test_toggling_shadows() {
        let mut tracker = DependencyTracker::new(false);
        tracker.mark_dirty(FieldFlags::SHADOW);
        assert!(tracker.is_clean());

        tracker.set_shadows_enabled(true);
        assert_eq!(tracker.dirty(), FieldFlags::SHADOW);

        tracker.set_shadows_enabled(false);
        assert!(tracker.is_clean());
    }

    #[test]
    fn test_layer_height_marks_dependents_of_that_layer_only() {
        let mut set = LayerDirtySet::new(4);
        set.mark(2, LayerStage::Height).unwrap();
        for stage in LAYER_STAGES {
            assert_eq!(set.dirty_layers(stage), vec![2]);
        }
    }

    #[test]
    fn test_layer_albedo_mark_is_isolated() {
        let mut set = LayerDirtySet::new(4);
        set.mark(1, LayerStage::Albedo).unwrap();
        assert!(set.is_dirty(1, LayerStage::Albedo));
        assert!(!set.is_dirty(1, LayerStage::Normal));
        assert!(!set.is_dirty(0, LayerStage::Albedo));
    }

    #[test]
    fn test_layer_out_of_range() {
        let mut set = LayerDirtySet::new(2);
        assert!(matches!(
            set.mark(2, LayerStage::Height),
            Err(TerrainError::LayerOutOfRange { layer: 2, layers: 2 })
        ));
    }

    #[test]
    fn test_mark_stage_and_clear_all() {
        let mut set = LayerDirtySet::new(3);
        set.mark_stage(LayerStage::Normal);
        assert_eq!(set.dirty_layers(LayerStage::Normal), vec![0, 1, 2]);
        assert!(set.dirty_layers(LayerStage::Height).is_empty());

        set.mark_all();
        set.clear(0, LayerStage::Height);
        assert!(!set.is_dirty(0, LayerStage::Height));
        set.clear_all();
        assert!(set.is_clean());
    }
}
