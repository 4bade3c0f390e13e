//! Clipmap Operations - Pure DOP Functions
//!
//! Snapping, toroidal strip planning, ring holes and fill placement.
//! All functions are pure: take data, return results, no side effects.

use cgmath::Vector2;

use super::clipmap_data::{
    FillAxis, FillPlacement, FillSide, HeightSource, LatticeRect, LatticeRegion, FILL_SIDES,
};
use crate::math::{aabb_from_lattice_rect, Aabb};

/// World size of one cell at `level`. Each level doubles the previous.
pub fn level_cell_size(base_cell_size: f32, level: u32) -> f32 {
    base_cell_size * 2f32.powi(level as i32)
}

/// `m = (N - 1) / 2`, the number of cells from the centre to an edge.
pub fn half_extent(subdivisions: u32) -> i32 {
    ((subdivisions - 1) / 2) as i32
}

/// Hole of a ring in its own logical cells: starts at `a` and is `h` cells
/// wide. The finer level plus its fill strips covers exactly this hole.
pub fn ring_hole(subdivisions: u32) -> (i32, i32) {
    let m = half_extent(subdivisions);
    (m / 2, m + 1)
}

/// Cell containing `position`. Negative coordinates floor toward -inf.
pub fn snap_to_cell(position: Vector2<f32>, cell_size: f32) -> Vector2<i32> {
    Vector2::new(
        (position.x / cell_size).floor() as i32,
        (position.y / cell_size).floor() as i32,
    )
}

/// Origin of `level` so that the camera cell sits at the lattice centre.
pub fn level_origin(
    camera_xz: Vector2<f32>,
    base_cell_size: f32,
    level: u32,
    subdivisions: u32,
) -> Vector2<i32> {
    let m = half_extent(subdivisions);
    let cell = snap_to_cell(camera_xz, level_cell_size(base_cell_size, level));
    Vector2::new(cell.x - m, cell.y - m)
}

/// All lattice points of a level.
pub fn level_footprint(origin: Vector2<i32>, subdivisions: u32) -> LatticeRect {
    let span = subdivisions as i32 - 1;
    LatticeRect {
        min: origin,
        max: Vector2::new(origin.x + span, origin.y + span),
    }
}

/// Hole of the coarser level expressed in the finer level's lattice.
pub fn coarse_hole_in_fine_units(coarse_origin: Vector2<i32>, subdivisions: u32) -> LatticeRect {
    let (a, h) = ring_hole(subdivisions);
    LatticeRect {
        min: Vector2::new(2 * (coarse_origin.x + a), 2 * (coarse_origin.y + a)),
        max: Vector2::new(
            2 * (coarse_origin.x + a + h),
            2 * (coarse_origin.y + a + h),
        ),
    }
}

/// Lattice points a level must re-displace when its origin moves from
/// `displaced` to `current`.
///
/// An unknown previous origin or a jump of a full width on either axis
/// re-displaces the whole level. Otherwise the points that entered the
/// footprint form an X strip over all rows and a Z strip over the columns
/// the X strip left out, so a diagonal corner is displaced once.
pub fn plan_level_update(
    displaced: Option<Vector2<i32>>,
    current: Vector2<i32>,
    subdivisions: u32,
) -> Vec<LatticeRegion> {
    let n = subdivisions as i32;
    let full = LatticeRegion {
        origin: current,
        size: Vector2::new(n, n),
    };

    let Some(previous) = displaced else {
        return vec![full];
    };

    let dx = current.x - previous.x;
    let dz = current.y - previous.y;
    if dx == 0 && dz == 0 {
        return Vec::new();
    }
    if dx.abs() >= n || dz.abs() >= n {
        return vec![full];
    }

    let mut regions = Vec::with_capacity(2);

    // Columns whose x left the old footprint, all rows
    if dx != 0 {
        let x0 = if dx > 0 { current.x + n - dx } else { current.x };
        regions.push(LatticeRegion {
            origin: Vector2::new(x0, current.y),
            size: Vector2::new(dx.abs(), n),
        });
    }

    // Rows whose z left the old footprint, remaining columns only
    if dz != 0 {
        let z0 = if dz > 0 { current.y + n - dz } else { current.y };
        let x0 = if dx < 0 { current.x - dx } else { current.x };
        regions.push(LatticeRegion {
            origin: Vector2::new(x0, z0),
            size: Vector2::new(n - dx.abs(), dz.abs()),
        });
    }

    regions
}

pub fn region_vertex_count(region: &LatticeRegion) -> u64 {
    region.size.x.max(0) as u64 * region.size.y.max(0) as u64
}

/// Cells along a fill strip. X-side strips include the hole corners.
pub fn fill_length(side: FillSide, subdivisions: u32) -> u32 {
    match side {
        FillSide::NegX | FillSide::PosX => subdivisions + 1,
        FillSide::NegZ | FillSide::PosZ => subdivisions - 1,
    }
}

/// The four strips between level `level` (origin `fine_origin`) and the
/// hole of level `level + 1` (origin `coarse_origin`), in fine units.
pub fn fill_placements(
    level: u32,
    fine_origin: Vector2<i32>,
    coarse_origin: Vector2<i32>,
    subdivisions: u32,
) -> [FillPlacement; 4] {
    let hole = coarse_hole_in_fine_units(coarse_origin, subdivisions);
    let fine = level_footprint(fine_origin, subdivisions);
    let (o, e) = (fine.min, fine.max);
    let (h0, h1) = (hole.min, hole.max);

    FILL_SIDES.map(|side| {
        let (axis, start, clamp) = match side {
            FillSide::NegX => (
                FillAxis::AcrossX,
                h0,
                LatticeRect {
                    min: h0,
                    max: Vector2::new(o.x, h1.y),
                },
            ),
            FillSide::PosX => (
                FillAxis::AcrossX,
                Vector2::new(e.x, h0.y),
                LatticeRect {
                    min: Vector2::new(e.x, h0.y),
                    max: h1,
                },
            ),
            FillSide::NegZ => (
                FillAxis::AcrossZ,
                Vector2::new(o.x, h0.y),
                LatticeRect {
                    min: Vector2::new(o.x, h0.y),
                    max: Vector2::new(e.x, o.y),
                },
            ),
            FillSide::PosZ => (
                FillAxis::AcrossZ,
                Vector2::new(o.x, e.y),
                LatticeRect {
                    min: Vector2::new(o.x, e.y),
                    max: Vector2::new(e.x, h1.y),
                },
            ),
        };
        FillPlacement {
            level,
            side,
            axis,
            start,
            clamp,
            hole,
        }
    })
}

/// Width of a strip across its axis, 0 to 2 cells.
pub fn fill_width(placement: &FillPlacement) -> i32 {
    match placement.axis {
        FillAxis::AcrossX => placement.clamp.max.x - placement.clamp.min.x,
        FillAxis::AcrossZ => placement.clamp.max.y - placement.clamp.min.y,
    }
}

pub fn rect_cell_area(rect: &LatticeRect) -> i64 {
    (rect.max.x - rect.min.x).max(0) as i64 * (rect.max.y - rect.min.y).max(0) as i64
}

pub fn grid_bounding_box(origin: Vector2<i32>, subdivisions: u32, cell_size: f32) -> Aabb {
    let footprint = level_footprint(origin, subdivisions);
    aabb_from_lattice_rect(footprint.min, footprint.max, cell_size)
}

pub fn fill_bounding_box(placement: &FillPlacement, cell_size: f32) -> Aabb {
    aabb_from_lattice_rect(placement.clamp.min, placement.clamp.max, cell_size)
}

/// Rectangle that matches no lattice point, used where a level has no
/// coarser neighbour to stitch against.
pub fn empty_rect() -> LatticeRect {
    LatticeRect {
        min: Vector2::new(1, 1),
        max: Vector2::new(0, 0),
    }
}

/// Axis along which a ring vertex is averaged to match the coarser ring.
///
/// Vertices on an edge of `hole` at an odd coordinate along that edge sit
/// between two coarse vertices; they take the mean of `p - dir` and
/// `p + dir`. Every other vertex returns zero and keeps its own height.
pub fn stitch_direction(p: Vector2<i32>, hole: &LatticeRect) -> Vector2<i32> {
    let in_x = p.x >= hole.min.x && p.x <= hole.max.x;
    let in_z = p.y >= hole.min.y && p.y <= hole.max.y;
    let on_x_edge = p.x == hole.min.x || p.x == hole.max.x;
    let on_z_edge = p.y == hole.min.y || p.y == hole.max.y;
    if on_x_edge && in_z && (p.y & 1) != 0 {
        return Vector2::new(0, 1);
    }
    if on_z_edge && in_x && (p.x & 1) != 0 {
        return Vector2::new(1, 0);
    }
    Vector2::new(0, 0)
}

/// Which buffer a ring with `footprint` reads for lattice point `p`.
/// Points outside the footprint have no slot of their own in the torus.
pub fn ring_height_source(p: Vector2<i32>, footprint: &LatticeRect) -> HeightSource {
    let inside = p.x >= footprint.min.x
        && p.y >= footprint.min.y
        && p.x <= footprint.max.x
        && p.y <= footprint.max.y;
    if inside {
        HeightSource::Displaced
    } else {
        HeightSource::Heightmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashSet;

    fn points(regions: &[LatticeRegion]) -> Vec<(i32, i32)> {
        regions
            .iter()
            .flat_map(|r| {
                (0..r.size.y).flat_map(move |j| {
                    (0..r.size.x).map(move |i| (r.origin.x + i, r.origin.y + j))
                })
            })
            .collect()
    }

    fn overlap_area(a: &LatticeRect, b: &LatticeRect) -> i64 {
        let w = (a.max.x.min(b.max.x) - a.min.x.max(b.min.x)).max(0) as i64;
        let h = (a.max.y.min(b.max.y) - a.min.y.max(b.min.y)).max(0) as i64;
        w * h
    }

    fn contains(outer: &LatticeRect, inner: &LatticeRect) -> bool {
        inner.min.x >= outer.min.x
            && inner.min.y >= outer.min.y
            && inner.max.x <= outer.max.x
            && inner.max.y <= outer.max.y
    }

    #[test]
    fn test_level_cell_size_doubles() {
        assert_eq!(level_cell_size(0.25, 0), 0.25);
        assert_eq!(level_cell_size(0.25, 3), 2.0);
    }

    #[test]
    fn test_ring_hole_for_17() {
        assert_eq!(half_extent(17), 8);
        assert_eq!(ring_hole(17), (4, 9));
        assert_eq!(ring_hole(3), (0, 2));
    }

    #[test]
    fn test_level_origin_snaps_to_cells() {
        let origin = level_origin(Vector2::new(0.0, 0.0), 1.0, 0, 17);
        assert_eq!(origin, Vector2::new(-8, -8));
        assert_eq!(level_origin(Vector2::new(0.99, 0.5), 1.0, 0, 17), origin);
        assert_eq!(
            level_origin(Vector2::new(1.0, 0.0), 1.0, 0, 17),
            Vector2::new(-7, -8)
        );
        assert_eq!(
            level_origin(Vector2::new(-0.1, 0.0), 1.0, 0, 17),
            Vector2::new(-9, -8)
        );
        // Level 2 cells are 4 units wide
        assert_eq!(
            level_origin(Vector2::new(3.9, 4.0), 1.0, 2, 17),
            Vector2::new(-8, -7)
        );
    }

    #[test]
    fn test_first_update_is_full() {
        let current = Vector2::new(-8, -8);
        let plan = plan_level_update(None, current, 17);
        assert_eq!(
            plan,
            vec![LatticeRegion {
                origin: current,
                size: Vector2::new(17, 17)
            }]
        );
    }

    #[test]
    fn test_no_movement_plans_nothing() {
        let origin = Vector2::new(3, -2);
        assert!(plan_level_update(Some(origin), origin, 17).is_empty());
    }

    #[test]
    fn test_single_cell_step_plans_one_column() {
        let previous = Vector2::new(-8, -8);
        let current = Vector2::new(-7, -8);
        let plan = plan_level_update(Some(previous), current, 17);
        assert_eq!(
            plan,
            vec![LatticeRegion {
                origin: Vector2::new(-7 + 16, -8),
                size: Vector2::new(1, 17)
            }]
        );

        let back = plan_level_update(Some(current), previous, 17);
        assert_eq!(back[0].origin, Vector2::new(-8, -8));
        assert_eq!(back[0].size, Vector2::new(1, 17));
    }

    #[test]
    fn test_diagonal_step_dispatches_corner_once() {
        let n = 17u32;
        let previous = Vector2::new(0, 0);
        let current = Vector2::new(2, -3);
        let plan = plan_level_update(Some(previous), current, n);
        assert_eq!(plan.len(), 2);

        let updated = points(&plan);
        let unique: HashSet<_> = updated.iter().copied().collect();
        assert_eq!(unique.len(), updated.len(), "no point displaced twice");

        // Exactly the points of the new footprint missing from the old one
        let old = level_footprint(previous, n);
        let new = level_footprint(current, n);
        let mut expected = HashSet::new();
        for z in new.min.y..=new.max.y {
            for x in new.min.x..=new.max.x {
                let inside_old = x >= old.min.x && x <= old.max.x && z >= old.min.y && z <= old.max.y;
                if !inside_old {
                    expected.insert((x, z));
                }
            }
        }
        assert_eq!(unique, expected);
    }

    #[test]
    fn test_jump_of_full_width_is_full() {
        let plan = plan_level_update(Some(Vector2::new(0, 0)), Vector2::new(0, 17), 17);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].size, Vector2::new(17, 17));

        let plan = plan_level_update(Some(Vector2::new(0, 0)), Vector2::new(-16, 5), 17);
        assert_eq!(plan.iter().map(region_vertex_count).sum::<u64>(), 16 * 17 + 5);
    }

    #[test]
    fn test_fill_strip_widths_sum_to_two() {
        for n in [3u32, 5, 17, 19, 65] {
            for cam in [-7.3f32, -1.0, -0.2, 0.0, 0.6, 1.0, 2.4, 13.9] {
                let camera = Vector2::new(cam, -cam * 0.7);
                let fine = level_origin(camera, 1.0, 0, n);
                let coarse = level_origin(camera, 1.0, 1, n);
                let fills = fill_placements(0, fine, coarse, n);
                let widths: Vec<i32> = fills.iter().map(fill_width).collect();
                assert_eq!(widths[0] + widths[1], 2, "x widths for n={} cam={}", n, cam);
                assert_eq!(widths[2] + widths[3], 2, "z widths for n={} cam={}", n, cam);
                assert!(widths.iter().all(|w| (0..=2).contains(w)));
            }
        }
    }

    #[test]
    fn test_fill_lengths_match_placements() {
        let n = 17;
        let fills = fill_placements(0, Vector2::new(-8, -8), Vector2::new(-4, -4), n);
        for fill in &fills {
            let length = match fill.axis {
                FillAxis::AcrossX => fill.clamp.max.y - fill.clamp.min.y,
                FillAxis::AcrossZ => fill.clamp.max.x - fill.clamp.min.x,
            };
            assert_eq!(length as u32, fill_length(fill.side, n));
        }
    }

    #[test]
    fn test_coverage_has_no_gap_or_overlap() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..500 {
            let n = [3u32, 5, 9, 17, 19, 33][rng.gen_range(0..6)];
            let levels = rng.gen_range(2..6u32);
            let base = [0.25f32, 1.0, 3.0][rng.gen_range(0..3)];
            let camera = Vector2::new(rng.gen_range(-5000.0..5000.0), rng.gen_range(-5000.0..5000.0));

            for level in 0..levels - 1 {
                let fine_origin = level_origin(camera, base, level, n);
                let coarse_origin = level_origin(camera, base, level + 1, n);
                let fine = level_footprint(fine_origin, n);
                let fills = fill_placements(level, fine_origin, coarse_origin, n);
                let hole = fills[0].hole;

                // Hole sits inside the coarser ring, on even fine coordinates
                let coarse = level_footprint(coarse_origin, n);
                let coarse_in_fine = LatticeRect {
                    min: coarse.min * 2,
                    max: coarse.max * 2,
                };
                assert!(contains(&coarse_in_fine, &hole));
                assert_eq!(hole.min.x.rem_euclid(2), 0);
                assert_eq!(hole.max.y.rem_euclid(2), 0);

                // Finer ring and strips tile the hole exactly
                let mut pieces = vec![fine];
                pieces.extend(fills.iter().map(|f| f.clamp));
                for piece in &pieces {
                    assert!(contains(&hole, piece), "piece {:?} escapes hole {:?}", piece, hole);
                }
                let area: i64 = pieces.iter().map(rect_cell_area).sum();
                assert_eq!(area, rect_cell_area(&hole));
                for i in 0..pieces.len() {
                    for j in i + 1..pieces.len() {
                        assert_eq!(overlap_area(&pieces[i], &pieces[j]), 0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_stitch_neighbours_past_the_ring_use_heightmap() {
        // Camera just right of the origin: the fine ring starts one cell
        // inside the coarse hole on x, flush with it on z.
        let camera = Vector2::new(1.5, 0.5);
        let fine = level_footprint(level_origin(camera, 1.0, 0, 17), 17);
        let hole = coarse_hole_in_fine_units(level_origin(camera, 1.0, 1, 17), 17);
        assert_eq!(fine.min, Vector2::new(-7, -8));
        assert_eq!(hole.min, Vector2::new(-8, -8));
        assert_eq!(hole.max, Vector2::new(10, 10));

        let corner = Vector2::new(-7, -8);
        let dir = stitch_direction(corner, &hole);
        assert_eq!(dir, Vector2::new(1, 0));
        assert_eq!(ring_height_source(corner - dir, &fine), HeightSource::Heightmap);
        assert_eq!(ring_height_source(corner + dir, &fine), HeightSource::Displaced);

        let far = Vector2::new(9, -8);
        let dir = stitch_direction(far, &hole);
        assert_eq!(ring_height_source(far + dir, &fine), HeightSource::Heightmap);
    }

    #[test]
    fn test_stitched_vertices_average_coarse_lattice_points() {
        let mut rng = StdRng::seed_from_u64(0xed6e);
        let mut from_heightmap = 0;
        for _ in 0..300 {
            let n = [3u32, 5, 9, 17, 33][rng.gen_range(0..5)];
            let levels = rng.gen_range(2..6u32);
            let base = [0.25f32, 1.0, 3.0][rng.gen_range(0..3)];
            let camera = Vector2::new(rng.gen_range(-5000.0..5000.0), rng.gen_range(-5000.0..5000.0));

            for level in 0..levels - 1 {
                let fine = level_footprint(level_origin(camera, base, level, n), n);
                let hole = coarse_hole_in_fine_units(level_origin(camera, base, level + 1, n), n);
                for z in fine.min.y..=fine.max.y {
                    for x in fine.min.x..=fine.max.x {
                        let p = Vector2::new(x, z);
                        let dir = stitch_direction(p, &hole);
                        if dir == Vector2::new(0, 0) {
                            continue;
                        }
                        for neighbour in [p - dir, p + dir] {
                            // Both ends are coarse vertices on the same hole edge
                            assert_eq!(stitch_direction(neighbour, &hole), Vector2::new(0, 0));
                            assert_eq!((neighbour.x * dir.x + neighbour.y * dir.y).rem_euclid(2), 0);
                            assert!(neighbour.x >= hole.min.x && neighbour.x <= hole.max.x);
                            assert!(neighbour.y >= hole.min.y && neighbour.y <= hole.max.y);

                            let point = LatticeRect {
                                min: neighbour,
                                max: neighbour,
                            };
                            match ring_height_source(neighbour, &fine) {
                                HeightSource::Displaced => assert!(contains(&fine, &point)),
                                HeightSource::Heightmap => {
                                    assert!(!contains(&fine, &point));
                                    from_heightmap += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
        assert!(from_heightmap > 0);
    }

    #[test]
    fn test_empty_rect_contains_nothing() {
        let rect = empty_rect();
        assert!(rect.min.x > rect.max.x);
        assert_eq!(rect_cell_area(&rect), 0);
    }
}
