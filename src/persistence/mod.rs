//! Terrain documents on disk
//!
//! A document is one JSON object with a `"Map"` and a `"Materials"`
//! section. Keys keep insertion order (`serde_json` with `preserve_order`),
//! so saved files diff cleanly. Each stage fills and reads its own section.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{TerrainError, TerrainResult};
use crate::fields::{MapGenerator, MaterialGenerator};

pub const MAP_SECTION: &str = "Map";
pub const MATERIALS_SECTION: &str = "Materials";

/// Collect both stage sections into one document.
pub fn build_document(map: &MapGenerator, materials: &MaterialGenerator) -> TerrainResult<Value> {
    let mut map_section = Map::new();
    map.serialize(&mut map_section)?;
    let mut materials_section = Map::new();
    materials.serialize(&mut materials_section)?;

    let mut document = Map::new();
    document.insert(MAP_SECTION.to_string(), Value::Object(map_section));
    document.insert(MATERIALS_SECTION.to_string(), Value::Object(materials_section));
    Ok(Value::Object(document))
}

/// Section `key` of a document, if present.
pub fn section<'a>(document: &'a Value, key: &str) -> Option<&'a Value> {
    document.as_object().and_then(|object| object.get(key))
}

/// Write `document` as pretty JSON. The file is written next to `path`
/// and renamed over it, so a failed save leaves the old file intact.
pub fn save_document(path: impl AsRef<Path>, document: &Value) -> TerrainResult<()> {
    let path = path.as_ref();
    let io_error = |error: std::io::Error| TerrainError::IoError {
        path: path.display().to_string(),
        error: error.to_string(),
    };

    let text = serde_json::to_string_pretty(document).map_err(|e| TerrainError::SerializationError {
        context: path.display().to_string(),
        error: e.to_string(),
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text).map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)?;

    log::info!("[persistence::save_document] Saved {}", path.display());
    Ok(())
}

/// Read a document written by [`save_document`]. The root must be an object.
pub fn load_document(path: impl AsRef<Path>) -> TerrainResult<Value> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| TerrainError::IoError {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let document: Value =
        serde_json::from_str(&text).map_err(|e| TerrainError::DeserializationError {
            context: path.display().to_string(),
            error: e.to_string(),
        })?;

    if !document.is_object() {
        return Err(TerrainError::DeserializationError {
            context: path.display().to_string(),
            error: "document root is not an object".to_string(),
        });
    }
    log::info!("[persistence::load_document] Loaded {}", path.display());
    Ok(document)
}
