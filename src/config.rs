//! Terrain start settings
//!
//! Everything here is fixed for the lifetime of a `TerrainSystem`. Changing
//! any of it means building a new system: fields are never resized at runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TerrainError, TerrainResult};
use crate::gpu::WrapMode;

/// Largest texture edge any field may request.
pub const MAX_FIELD_RESOLUTION: u32 = 16384;

/// Largest ring edge in vertices. Ring index counts are `(N - 1)^2 * 6`
/// and must stay within `u32`.
pub const MAX_SUBDIVISIONS: u32 = 4097;

/// Upper bound on clipmap levels; cell sizes are `base * 2^level`.
pub const MAX_LOD_LEVELS: u32 = 16;

/// Upper bound on material texture array layers.
pub const MAX_MATERIAL_LAYERS: u32 = 32;

/// Start-up configuration for the terrain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Vertices per clipmap ring edge (N). Must be odd.
    pub subdivisions: u32,
    /// Number of clipmap levels (L).
    pub lod_levels: u32,
    /// World-space cell size of level 0.
    pub base_cell_size: f32,
    pub height_resolution: u32,
    pub shadow_resolution: u32,
    pub material_resolution: u32,
    pub material_layers: u32,
    pub material_wrap: WrapMode,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            subdivisions: 65,
            lod_levels: 7,
            base_cell_size: 0.25,
            height_resolution: 4096,
            shadow_resolution: 2048,
            material_resolution: 1024,
            material_layers: 4,
            material_wrap: WrapMode::Repeat,
        }
    }
}

impl TerrainConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> TerrainResult<Self> {
        let config: TerrainConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> TerrainResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TerrainError::IoError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        log::info!("[TerrainConfig::load] Loading {}", path.display());
        Self::from_toml_str(&text)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> TerrainResult<()> {
        validate_clipmap_shape(self.subdivisions, self.lod_levels)?;

        if !self.base_cell_size.is_finite() || self.base_cell_size <= 0.0 {
            return Err(TerrainError::invalid_config(
                "base_cell_size",
                self.base_cell_size,
                "must be a positive finite number",
            ));
        }

        for (field, value) in [
            ("height_resolution", self.height_resolution),
            ("shadow_resolution", self.shadow_resolution),
            ("material_resolution", self.material_resolution),
        ] {
            validate_resolution(field, value)?;
        }

        if self.material_layers == 0 || self.material_layers > MAX_MATERIAL_LAYERS {
            return Err(TerrainError::invalid_config(
                "material_layers",
                self.material_layers,
                format!("must be in 1..={}", MAX_MATERIAL_LAYERS),
            ));
        }

        log::info!(
            "[TerrainConfig] Validation: N={}, L={}, outer extent={} world units",
            self.subdivisions,
            self.lod_levels,
            self.outer_extent()
        );
        Ok(())
    }

    /// World-space edge length covered by the coarsest ring.
    pub fn outer_extent(&self) -> f32 {
        let coarsest = self.base_cell_size * (1u64 << self.lod_levels.saturating_sub(1)) as f32;
        (self.subdivisions.saturating_sub(1)) as f32 * coarsest
    }
}

/// Shape rules shared by the config and `Clipmap::new`.
pub fn validate_clipmap_shape(subdivisions: u32, levels: u32) -> TerrainResult<()> {
    if subdivisions < 3 {
        return Err(TerrainError::invalid_config(
            "subdivisions",
            subdivisions,
            "must be at least 3",
        ));
    }
    if subdivisions % 2 == 0 {
        return Err(TerrainError::invalid_config(
            "subdivisions",
            subdivisions,
            "must be odd so every ring has a centre vertex",
        ));
    }
    if subdivisions > MAX_SUBDIVISIONS {
        return Err(TerrainError::invalid_config(
            "subdivisions",
            subdivisions,
            format!("exceeds maximum of {}", MAX_SUBDIVISIONS),
        ));
    }
    if levels == 0 || levels > MAX_LOD_LEVELS {
        return Err(TerrainError::invalid_config(
            "lod_levels",
            levels,
            format!("must be in 1..={}", MAX_LOD_LEVELS),
        ));
    }
    Ok(())
}

/// A field edge length must be non-zero and within device limits.
pub fn validate_resolution(field: &str, value: u32) -> TerrainResult<()> {
    if value == 0 {
        return Err(TerrainError::invalid_config(field, value, "cannot be 0"));
    }
    if value > MAX_FIELD_RESOLUTION {
        return Err(TerrainError::invalid_config(
            field,
            value,
            format!("exceeds maximum of {}", MAX_FIELD_RESOLUTION),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TerrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_even_subdivisions_rejected() {
        let config = TerrainConfig {
            subdivisions: 64,
            ..Default::default()
        };
        match config.validate() {
            Err(TerrainError::InvalidConfig { field, .. }) => assert_eq!(field, "subdivisions"),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_limits() {
        assert!(validate_clipmap_shape(1, 4).is_err());
        assert!(validate_clipmap_shape(3, 1).is_ok());
        assert!(validate_clipmap_shape(17, 0).is_err());
        assert!(validate_clipmap_shape(17, MAX_LOD_LEVELS + 1).is_err());
    }

    #[test]
    fn test_subdivisions_upper_bound() {
        assert!(validate_clipmap_shape(MAX_SUBDIVISIONS, 4).is_ok());
        assert!(validate_clipmap_shape(MAX_SUBDIVISIONS + 2, 4).is_err());
        assert!(validate_clipmap_shape(u32::MAX, 4).is_err());

        let cells = (MAX_SUBDIVISIONS - 1) as u64;
        assert!(cells * cells * 6 <= u32::MAX as u64);

        let config = TerrainConfig {
            subdivisions: 65537,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let config = TerrainConfig {
            shadow_resolution: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = TerrainConfig::from_toml_str(
            "subdivisions = 17\nlod_levels = 5\nmaterial_wrap = \"ClampToEdge\"\n",
        )
        .expect("valid toml");
        assert_eq!(config.subdivisions, 17);
        assert_eq!(config.lod_levels, 5);
        assert_eq!(config.material_wrap, WrapMode::ClampToEdge);
        assert_eq!(config.height_resolution, 4096);
    }

    #[test]
    fn test_from_toml_rejects_invalid_shape() {
        assert!(TerrainConfig::from_toml_str("subdivisions = 18").is_err());
    }

    #[test]
    fn test_outer_extent() {
        let config = TerrainConfig {
            subdivisions: 17,
            lod_levels: 3,
            base_cell_size: 1.0,
            ..Default::default()
        };
        assert_eq!(config.outer_extent(), 64.0);
    }
}
