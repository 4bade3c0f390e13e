//! Error handling for Hearth Terrain
//!
//! One error type covers configuration, GPU resource and persistence
//! failures. Invariant violations (dispatching into a field that was never
//! allocated, updating a stage before `init`) are not represented here: they
//! assert, because a terrain rendered from stale data is worse than a crash.

use std::error::Error as StdError;
use std::fmt;

use crate::gpu::GpuError;

/// Main error type for Hearth Terrain
#[derive(Debug)]
pub enum TerrainError {
    // Configuration Errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    // Resource Errors
    Gpu(GpuError),
    ResourceNotFound {
        resource_type: String,
        id: String,
    },

    // Procedure Errors
    UnknownProcedure {
        editor: String,
        name: String,
    },
    LayerOutOfRange {
        layer: usize,
        layers: usize,
    },
    InvalidParameter {
        procedure: String,
        uniform: String,
        reason: String,
    },

    // Persistence Errors
    IoError {
        path: String,
        error: String,
    },
    SerializationError {
        context: String,
        error: String,
    },
    DeserializationError {
        context: String,
        error: String,
    },
}

impl fmt::Display for TerrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerrainError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(
                f,
                "Invalid configuration for {}: '{}' ({})",
                field, value, reason
            ),
            TerrainError::Gpu(error) => write!(f, "GPU error: {}", error),
            TerrainError::ResourceNotFound { resource_type, id } => {
                write!(f, "{} not found: {}", resource_type, id)
            }
            TerrainError::UnknownProcedure { editor, name } => {
                write!(f, "Editor '{}' has no procedure named '{}'", editor, name)
            }
            TerrainError::LayerOutOfRange { layer, layers } => write!(
                f,
                "Layer {} out of range (editor has {} layers)",
                layer, layers
            ),
            TerrainError::InvalidParameter {
                procedure,
                uniform,
                reason,
            } => write!(
                f,
                "Invalid parameter {} for procedure {}: {}",
                uniform, procedure, reason
            ),
            TerrainError::IoError { path, error } => {
                write!(f, "IO error at {}: {}", path, error)
            }
            TerrainError::SerializationError { context, error } => {
                write!(f, "Serialization failed in {}: {}", context, error)
            }
            TerrainError::DeserializationError { context, error } => {
                write!(f, "Deserialization failed in {}: {}", context, error)
            }
        }
    }
}

impl StdError for TerrainError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TerrainError::Gpu(error) => Some(error),
            _ => None,
        }
    }
}

/// Type alias for Results in Hearth Terrain
pub type TerrainResult<T> = Result<T, TerrainError>;

impl TerrainError {
    /// Shorthand for a configuration error on a single field.
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        TerrainError::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

// Conversion traits for common error types

impl From<GpuError> for TerrainError {
    fn from(error: GpuError) -> Self {
        TerrainError::Gpu(error)
    }
}

impl From<std::io::Error> for TerrainError {
    fn from(error: std::io::Error) -> Self {
        TerrainError::IoError {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for TerrainError {
    fn from(error: serde_json::Error) -> Self {
        TerrainError::DeserializationError {
            context: "json".to_string(),
            error: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for TerrainError {
    fn from(error: toml::de::Error) -> Self {
        TerrainError::DeserializationError {
            context: "toml".to_string(),
            error: error.to_string(),
        }
    }
}

/// Lookup helpers for optional results
pub trait OptionExt<T> {
    fn ok_or_not_found(self, resource_type: &str, id: impl fmt::Display) -> TerrainResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource_type: &str, id: impl fmt::Display) -> TerrainResult<T> {
        self.ok_or_else(|| TerrainError::ResourceNotFound {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TerrainError::invalid_config("subdivisions", 16, "must be odd");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for subdivisions: '16' (must be odd)"
        );
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_not_found("Texture", 7);
        match result {
            Err(TerrainError::ResourceNotFound { resource_type, id }) => {
                assert_eq!(resource_type, "Texture");
                assert_eq!(id, "7");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_toml_error_is_deserialization() {
        let err = TerrainError::from(toml::from_str::<toml::Value>("= 3").unwrap_err());
        match err {
            TerrainError::DeserializationError { context, .. } => assert_eq!(context, "toml"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_gpu_error_is_source() {
        let err = TerrainError::from(GpuError::InvalidHandle {
            kind: "texture",
            id: 3,
        });
        assert!(err.source().is_some());
    }
}
