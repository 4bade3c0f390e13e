//! Clipmap Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in clipmap_operations.rs
//!
//! Lattice coordinates are integers in units of a level's cell size. A level
//! with `N` subdivisions covers the `N x N` lattice points starting at its
//! origin.

use cgmath::Vector2;

/// Side of the coarser level's hole a fill strip covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillSide {
    NegX,
    PosX,
    NegZ,
    PosZ,
}

pub const FILL_SIDES: [FillSide; 4] = [FillSide::NegX, FillSide::PosX, FillSide::NegZ, FillSide::PosZ];

/// Orientation of a fill strip mesh: which axis the 3-vertex width runs along
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillAxis {
    /// Width along X, length along Z.
    AcrossX,
    /// Width along Z, length along X.
    AcrossZ,
}

/// Toroidal state of one level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelState {
    pub level: u32,
    /// Snapped origin for the current camera position.
    pub origin: Vector2<i32>,
    /// Origin the height buffer was last displaced at. `None` until the
    /// first displacement.
    pub displaced_origin: Option<Vector2<i32>>,
}

/// Rectangle of lattice points: `size.x` columns by `size.y` rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeRegion {
    pub origin: Vector2<i32>,
    pub size: Vector2<i32>,
}

/// Inclusive lattice rectangle `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeRect {
    pub min: Vector2<i32>,
    pub max: Vector2<i32>,
}

/// Where a ring reads the height of a lattice point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightSource {
    /// The ring's own displaced height buffer.
    Displaced,
    /// Bilinear heightmap sample, for points the ring does not cover.
    Heightmap,
}

/// Where one fill strip sits this frame, in the finer level's lattice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillPlacement {
    /// Finer of the two levels the strip stitches.
    pub level: u32,
    pub side: FillSide,
    pub axis: FillAxis,
    /// Lattice position of mesh vertex (0, 0).
    pub start: Vector2<i32>,
    /// Vertices are clamped into this rectangle. Zero-width sides collapse.
    pub clamp: LatticeRect,
    /// Edge of the coarser level's hole, where T-junctions are stitched.
    pub hole: LatticeRect,
}

/// Work done by one `run_compute` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputeStats {
    pub full: bool,
    pub dispatches: u32,
    pub levels_touched: u32,
    /// Lattice points displaced across all levels.
    pub vertices: u64,
}
