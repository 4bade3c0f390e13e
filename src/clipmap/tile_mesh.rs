//! Index-only tile topology
//!
//! Tiles carry no vertex data. Indices address logical lattice positions
//! and the vertex stage turns them into world positions, so the buffers are
//! built once and never change.

use super::clipmap_data::FillSide;
use crate::gpu::{BufferHandle, GpuBackend};
use crate::error::TerrainResult;

/// Vertices across a fill strip
pub const FILL_WIDTH_VERTICES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    Grid { level: u32 },
    Fill { level: u32, side: FillSide },
}

/// GPU-resident index buffer for one ring or strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileMesh {
    pub kind: TileKind,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

fn push_quad(indices: &mut Vec<u32>, v00: u32, v10: u32, v01: u32, v11: u32) {
    indices.extend_from_slice(&[v00, v01, v10, v10, v01, v11]);
}

/// Two triangles per cell of an `n x n` vertex lattice, row-major
/// (`index = j * n + i`). Cells inside `hole` (`(start, width)` in cells)
/// are left out.
pub fn grid_indices(subdivisions: u32, hole: Option<(u32, u32)>) -> Vec<u32> {
    let n = subdivisions;
    let cells = n.saturating_sub(1);
    let in_hole = |c: u32| match hole {
        Some((start, width)) => c >= start && c < start + width,
        None => false,
    };

    let mut indices = Vec::with_capacity((cells * cells * 6) as usize);
    for j in 0..cells {
        for i in 0..cells {
            if in_hole(i) && in_hole(j) {
                continue;
            }
            let v00 = j * n + i;
            push_quad(&mut indices, v00, v00 + 1, v00 + n, v00 + n + 1);
        }
    }
    indices
}

/// Strip two cells wide and `length` cells long (`index = along * 3 + across`).
pub fn fill_indices(length: u32) -> Vec<u32> {
    let w = FILL_WIDTH_VERTICES;
    let mut indices = Vec::with_capacity((length * (w - 1) * 6) as usize);
    for along in 0..length {
        for across in 0..w - 1 {
            let v00 = along * w + across;
            push_quad(&mut indices, v00, v00 + 1, v00 + w, v00 + w + 1);
        }
    }
    indices
}

pub fn tile_label(kind: TileKind) -> String {
    match kind {
        TileKind::Grid { level } => format!("Clipmap Grid L{}", level),
        TileKind::Fill { level, side } => format!("Clipmap Fill L{} {:?}", level, side),
    }
}

/// Upload indices and wrap the handle.
pub fn create_tile_mesh(
    backend: &mut dyn GpuBackend,
    kind: TileKind,
    indices: &[u32],
) -> TerrainResult<TileMesh> {
    let index_buffer = backend.create_index_buffer(&tile_label(kind), indices)?;
    Ok(TileMesh {
        kind,
        index_buffer,
        index_count: indices.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipmap::clipmap_operations::ring_hole;
    use crate::gpu::RecordingBackend;

    #[test]
    fn test_full_grid_index_count() {
        let indices = grid_indices(17, None);
        assert_eq!(indices.len(), 16 * 16 * 6);
        assert!(indices.iter().all(|&i| i < 17 * 17));
    }

    #[test]
    fn test_ring_skips_hole_cells() {
        let (a, h) = ring_hole(17);
        let indices = grid_indices(17, Some((a as u32, h as u32)));
        assert_eq!(indices.len(), (16 * 16 - 9 * 9) * 6);

        // No triangle touches a vertex strictly inside the hole
        let inside = |v: u32| {
            let (i, j) = (v % 17, v / 17);
            i > 4 && i < 13 && j > 4 && j < 13
        };
        assert!(indices.iter().all(|&v| !inside(v)));
    }

    #[test]
    fn test_fill_strip_topology() {
        let indices = fill_indices(18);
        assert_eq!(indices.len(), 18 * 2 * 6);
        assert_eq!(*indices.iter().max().unwrap(), 18 * 3 + 2);
    }

    #[test]
    fn test_create_tile_mesh_uploads_indices() {
        let mut backend = RecordingBackend::new();
        let kind = TileKind::Fill {
            level: 2,
            side: FillSide::PosZ,
        };
        let mesh = create_tile_mesh(&mut backend, kind, &fill_indices(4)).unwrap();
        assert_eq!(mesh.index_count, 48);
        assert_eq!(backend.buffer_len(mesh.index_buffer), Some(48));
        assert_eq!(backend.buffer_label(mesh.index_buffer), Some("Clipmap Fill L2 PosZ"));
    }
}
