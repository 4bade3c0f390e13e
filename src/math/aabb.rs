/// Data-Oriented Axis-Aligned Bounding Box System
///
/// Pure functions for terrain bounds - no methods, just data transformations.
/// Terrain boxes carry a normalized height range in `y`; callers scale it by
/// the current height scale right before a frustum test.

use cgmath::{Point3, Vector2};

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

/// Create new AABB from min/max points
pub fn create_aabb(min: Point3<f32>, max: Point3<f32>) -> Aabb {
    Aabb { min, max }
}

/// Box over an integer lattice rectangle `[min, max]` (inclusive vertex
/// coordinates) with the given cell size. Height spans the normalized
/// range `[0, 1]`.
pub fn aabb_from_lattice_rect(min: Vector2<i32>, max: Vector2<i32>, cell_size: f32) -> Aabb {
    Aabb {
        min: Point3::new(min.x as f32 * cell_size, 0.0, min.y as f32 * cell_size),
        max: Point3::new(max.x as f32 * cell_size, 1.0, max.y as f32 * cell_size),
    }
}

/// Scale the normalized height range of a terrain box into world units.
pub fn aabb_scale_height(aabb: &Aabb, height_scale: f32) -> Aabb {
    let (lo, hi) = if height_scale >= 0.0 {
        (aabb.min.y * height_scale, aabb.max.y * height_scale)
    } else {
        (aabb.max.y * height_scale, aabb.min.y * height_scale)
    };
    Aabb {
        min: Point3::new(aabb.min.x, lo, aabb.min.z),
        max: Point3::new(aabb.max.x, hi, aabb.max.z),
    }
}

/// Test if two AABBs intersect
pub fn aabb_intersects(aabb1: &Aabb, aabb2: &Aabb) -> bool {
    aabb1.min.x <= aabb2.max.x && aabb1.max.x >= aabb2.min.x &&
    aabb1.min.y <= aabb2.max.y && aabb1.max.y >= aabb2.min.y &&
    aabb1.min.z <= aabb2.max.z && aabb1.max.z >= aabb2.min.z
}

/// Test if AABB contains a point
pub fn aabb_contains_point(aabb: &Aabb, point: Point3<f32>) -> bool {
    point.x >= aabb.min.x && point.x <= aabb.max.x &&
    point.y >= aabb.min.y && point.y <= aabb.max.y &&
    point.z >= aabb.min.z && point.z <= aabb.max.z
}

/// XZ footprint area; zero for collapsed fill strips.
pub fn aabb_footprint_area(aabb: &Aabb) -> f32 {
    (aabb.max.x - aabb.min.x).max(0.0) * (aabb.max.z - aabb.min.z).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_rect_box() {
        let aabb = aabb_from_lattice_rect(Vector2::new(-8, -8), Vector2::new(8, 8), 0.5);
        assert_eq!(aabb.min, Point3::new(-4.0, 0.0, -4.0));
        assert_eq!(aabb.max, Point3::new(4.0, 1.0, 4.0));
        assert_eq!(aabb_footprint_area(&aabb), 64.0);
    }

    #[test]
    fn test_scale_height() {
        let aabb = aabb_from_lattice_rect(Vector2::new(0, 0), Vector2::new(1, 1), 1.0);
        let scaled = aabb_scale_height(&aabb, 100.0);
        assert_eq!(scaled.min.y, 0.0);
        assert_eq!(scaled.max.y, 100.0);

        let flipped = aabb_scale_height(&aabb, -2.0);
        assert_eq!(flipped.min.y, -2.0);
        assert_eq!(flipped.max.y, 0.0);
    }

    #[test]
    fn test_intersects_and_contains() {
        let a = create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 2.0));
        let b = create_aabb(Point3::new(1.0, 1.0, 1.0), Point3::new(3.0, 3.0, 3.0));
        let c = create_aabb(Point3::new(5.0, 5.0, 5.0), Point3::new(6.0, 6.0, 6.0));
        assert!(aabb_intersects(&a, &b));
        assert!(!aabb_intersects(&a, &c));
        assert!(aabb_contains_point(&a, Point3::new(1.0, 1.0, 1.0)));
        assert!(!aabb_contains_point(&a, Point3::new(3.0, 1.0, 1.0)));
    }
}
