/// Clipmap Module - Data-Oriented Programming (DOP) style
///
/// - clipmap_data.rs: Pure data structures with NO methods
/// - clipmap_operations.rs: Pure functions for snapping, strips and fills
/// - tile_mesh.rs: Static index topology for rings and fill strips
///
/// `Clipmap` owns the GPU side: one index buffer per ring and strip, and one
/// toroidal height buffer per level. Heights of world lattice point `g` live
/// in slot `(g.x mod N, g.z mod N)`, so a camera move only re-displaces the
/// lattice points that entered a level's footprint.

pub mod clipmap_data;
pub mod clipmap_operations;
pub mod tile_mesh;

use cgmath::Vector2;

use crate::config::validate_clipmap_shape;
use crate::error::{TerrainError, TerrainResult};
use crate::gpu::{BufferHandle, GpuBackend, ShaderHandle, UniformValue};
use crate::math::Aabb;

pub use clipmap_data::{
    ComputeStats, FillAxis, FillPlacement, FillSide, HeightSource, LatticeRect, LatticeRegion,
    LevelState, FILL_SIDES,
};
pub use clipmap_operations::{
    coarse_hole_in_fine_units, empty_rect, fill_bounding_box, fill_length, fill_placements,
    fill_width, grid_bounding_box, half_extent, level_cell_size, level_footprint, level_origin,
    plan_level_update, rect_cell_area, region_vertex_count, ring_hole, ring_height_source,
    snap_to_cell, stitch_direction,
};
pub use tile_mesh::{
    create_tile_mesh, fill_indices, grid_indices, TileKind, TileMesh, FILL_WIDTH_VERTICES,
};

/// Ring of one level as the renderer sees it this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridTile {
    pub mesh: TileMesh,
    pub level: u32,
    pub origin: Vector2<i32>,
    pub cell_size: f32,
    pub height_buffer: BufferHandle,
    /// Hole of the next coarser level in this level's lattice. Matches no
    /// point for the coarsest level.
    pub stitch: LatticeRect,
    pub bounding_box: Aabb,
}

/// Fill strip as the renderer sees it this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillTile {
    pub mesh: TileMesh,
    pub placement: FillPlacement,
    pub cell_size: f32,
    pub bounding_box: Aabb,
}

#[derive(Debug)]
struct ClipmapResources {
    grids: Vec<TileMesh>,
    /// `level * 4 + side`, sides in `FILL_SIDES` order.
    fills: Vec<TileMesh>,
    height_buffers: Vec<BufferHandle>,
}

#[derive(Debug)]
pub struct Clipmap {
    subdivisions: u32,
    levels: u32,
    base_cell_size: f32,
    states: Vec<LevelState>,
    resources: Option<ClipmapResources>,
}

impl Clipmap {
    /// Validate the shape. GPU resources are allocated by [`Clipmap::init`].
    pub fn new(subdivisions: u32, levels: u32, base_cell_size: f32) -> TerrainResult<Self> {
        validate_clipmap_shape(subdivisions, levels)?;
        if !base_cell_size.is_finite() || base_cell_size <= 0.0 {
            return Err(TerrainError::invalid_config(
                "base_cell_size",
                base_cell_size,
                "must be a positive finite number",
            ));
        }

        let origin = Vector2::new(0.0, 0.0);
        let states = (0..levels)
            .map(|level| LevelState {
                level,
                origin: level_origin(origin, base_cell_size, level, subdivisions),
                displaced_origin: None,
            })
            .collect();

        Ok(Self {
            subdivisions,
            levels,
            base_cell_size,
            states,
            resources: None,
        })
    }

    /// Allocate every ring, fill strip and height buffer. Topology is final
    /// after this call.
    pub fn init(&mut self, backend: &mut dyn GpuBackend) -> TerrainResult<()> {
        let n = self.subdivisions;
        let (a, h) = ring_hole(n);
        let full_grid = grid_indices(n, None);
        let ring = grid_indices(n, Some((a as u32, h as u32)));

        let mut grids = Vec::with_capacity(self.levels as usize);
        let mut height_buffers = Vec::with_capacity(self.levels as usize);
        for level in 0..self.levels {
            let indices = if level == 0 { &full_grid } else { &ring };
            grids.push(create_tile_mesh(backend, TileKind::Grid { level }, indices)?);
            height_buffers.push(
                backend.create_storage_buffer(
                    &format!("Clipmap Heights L{}", level),
                    (n * n) as usize,
                )?,
            );
        }

        let long_strip = fill_indices(fill_length(FillSide::NegX, n));
        let short_strip = fill_indices(fill_length(FillSide::NegZ, n));
        let mut fills = Vec::with_capacity(4 * (self.levels as usize - 1));
        for level in 0..self.levels - 1 {
            for side in FILL_SIDES {
                let indices = match side {
                    FillSide::NegX | FillSide::PosX => &long_strip,
                    FillSide::NegZ | FillSide::PosZ => &short_strip,
                };
                fills.push(create_tile_mesh(backend, TileKind::Fill { level, side }, indices)?);
            }
        }

        log::info!(
            "[Clipmap::init] {} levels of {}x{} vertices, {} fill strips, base cell {}",
            self.levels,
            n,
            n,
            fills.len(),
            self.base_cell_size
        );

        for state in &mut self.states {
            state.displaced_origin = None;
        }
        self.resources = Some(ClipmapResources {
            grids,
            fills,
            height_buffers,
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    fn resources(&self) -> &ClipmapResources {
        match self.resources.as_ref() {
            Some(resources) => resources,
            None => {
                log::error!("[Clipmap] Used before init");
                panic!("[Clipmap] Used before init: no GPU resources allocated");
            }
        }
    }

    /// Displace the vertices the camera move exposed.
    ///
    /// `previous = None` selects full mode: every level is re-displaced.
    /// Otherwise each level is compared against the origin it was last
    /// displaced at and only newly exposed strips are dispatched. The
    /// displacement shader must already be bound to its heightmap and carry
    /// the current scale uniforms; `binding_slot` receives each level's
    /// height buffer.
    pub fn run_compute(
        &mut self,
        backend: &mut dyn GpuBackend,
        displace: ShaderHandle,
        binding_slot: u32,
        current: Vector2<f32>,
        previous: Option<Vector2<f32>>,
    ) -> TerrainResult<ComputeStats> {
        let n = self.subdivisions;
        let full = previous.is_none();
        let height_buffers = self.resources().height_buffers.clone();

        backend.bind_shader(displace)?;
        backend.set_uniform("uGridSize", UniformValue::Int(n as i32))?;

        let mut stats = ComputeStats {
            full,
            ..Default::default()
        };

        for state in &mut self.states {
            let level = state.level;
            let origin = level_origin(current, self.base_cell_size, level, n);
            state.origin = origin;

            let displaced = if full { None } else { state.displaced_origin };
            let regions = plan_level_update(displaced, origin, n);
            if regions.is_empty() {
                continue;
            }

            backend.bind_storage_buffer(binding_slot, height_buffers[level as usize]);
            backend.set_uniform(
                "uCellSize",
                UniformValue::Float(level_cell_size(self.base_cell_size, level)),
            )?;
            for region in &regions {
                backend.set_uniform("uRegionOrigin", UniformValue::IVec2([region.origin.x, region.origin.y]))?;
                backend.set_uniform("uRegionSize", UniformValue::IVec2([region.size.x, region.size.y]))?;
                backend.dispatch(region.size.x as u32, region.size.y as u32, 1)?;
                stats.dispatches += 1;
                stats.vertices += region_vertex_count(region);
            }
            log::trace!(
                "[Clipmap::run_compute] Level {} origin {:?} -> {:?}: {} region(s)",
                level,
                displaced,
                origin,
                regions.len()
            );

            state.displaced_origin = Some(origin);
            stats.levels_touched += 1;
        }

        if stats.dispatches > 0 {
            backend.memory_barrier();
        }

        if full {
            log::debug!(
                "[Clipmap::run_compute] Full update: {} dispatches, {} vertices",
                stats.dispatches,
                stats.vertices
            );
        } else if let Some(previous) = previous {
            log::trace!(
                "[Clipmap::run_compute] Camera moved {:?}: {} dispatches over {} levels",
                current - previous,
                stats.dispatches,
                stats.levels_touched
            );
        }
        Ok(stats)
    }

    /// Rings, finest first. Restartable and read-only.
    pub fn grids(&self) -> impl Iterator<Item = GridTile> + '_ {
        let resources = self.resources();
        resources.grids.iter().enumerate().map(move |(index, mesh)| {
            let state = &self.states[index];
            let cell_size = level_cell_size(self.base_cell_size, state.level);
            let stitch = match self.states.get(index + 1) {
                Some(coarser) => coarse_hole_in_fine_units(coarser.origin, self.subdivisions),
                None => empty_rect(),
            };
            GridTile {
                mesh: *mesh,
                level: state.level,
                origin: state.origin,
                cell_size,
                height_buffer: resources.height_buffers[index],
                stitch,
                bounding_box: grid_bounding_box(state.origin, self.subdivisions, cell_size),
            }
        })
    }

    /// Fill strips, finest boundary first. Restartable and read-only.
    pub fn fills(&self) -> impl Iterator<Item = FillTile> + '_ {
        let resources = self.resources();
        resources.fills.chunks(4).enumerate().flat_map(move |(level, meshes)| {
            let fine = &self.states[level];
            let coarse = &self.states[level + 1];
            let cell_size = level_cell_size(self.base_cell_size, fine.level);
            let placements =
                fill_placements(fine.level, fine.origin, coarse.origin, self.subdivisions);
            meshes
                .iter()
                .zip(placements)
                .map(move |(mesh, placement)| FillTile {
                    mesh: *mesh,
                    placement,
                    cell_size,
                    bounding_box: fill_bounding_box(&placement, cell_size),
                })
        })
    }

    pub fn subdivisions(&self) -> u32 {
        self.subdivisions
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn base_cell_size(&self) -> f32 {
        self.base_cell_size
    }

    pub fn level_state(&self, level: u32) -> Option<&LevelState> {
        self.states.get(level as usize)
    }

    pub fn height_buffer(&self, level: u32) -> Option<BufferHandle> {
        self.resources
            .as_ref()
            .and_then(|r| r.height_buffers.get(level as usize).copied())
    }
}
