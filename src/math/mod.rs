//! Bounding volumes and frustum tests used for ring culling

pub mod aabb;
pub mod frustum;

pub use aabb::{
    aabb_contains_point, aabb_footprint_area, aabb_from_lattice_rect, aabb_intersects, aabb_scale_height, create_aabb,
    Aabb,
};
pub use frustum::{extract_frustum_planes, frustum_intersects_aabb, Frustum};
