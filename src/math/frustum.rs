//! View frustum extraction and box classification
//!
//! Planes are pulled straight out of a combined view-projection matrix
//! (Gribb-Hartmann). The matrix uses the OpenGL clip convention produced by
//! `cgmath::perspective`, so the near plane is `row3 + row2`.

use cgmath::{Matrix4, Vector4};

use super::aabb::Aabb;

/// Six inward-facing planes: left, right, top, bottom, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Vector4<f32>; 6],
}

impl Frustum {
    pub fn from_view_projection(view_projection: &Matrix4<f32>) -> Self {
        Self {
            planes: extract_frustum_planes(view_projection),
        }
    }
}

/// Extract frustum planes from view-projection matrix
pub fn extract_frustum_planes(vp: &Matrix4<f32>) -> [Vector4<f32>; 6] {
    let m = vp;

    [
        // Left plane
        Vector4::new(m.x.w + m.x.x, m.y.w + m.y.x, m.z.w + m.z.x, m.w.w + m.w.x).normalize_plane(),
        // Right plane
        Vector4::new(m.x.w - m.x.x, m.y.w - m.y.x, m.z.w - m.z.x, m.w.w - m.w.x).normalize_plane(),
        // Top plane
        Vector4::new(m.x.w - m.x.y, m.y.w - m.y.y, m.z.w - m.z.y, m.w.w - m.w.y).normalize_plane(),
        // Bottom plane
        Vector4::new(m.x.w + m.x.y, m.y.w + m.y.y, m.z.w + m.z.y, m.w.w + m.w.y).normalize_plane(),
        // Near plane
        Vector4::new(m.x.w + m.x.z, m.y.w + m.y.z, m.z.w + m.z.z, m.w.w + m.w.z).normalize_plane(),
        // Far plane
        Vector4::new(m.x.w - m.x.z, m.y.w - m.y.z, m.z.w - m.z.z, m.w.w - m.w.z).normalize_plane(),
    ]
}

/// Conservative test: false only when the box lies entirely outside one
/// plane. Uses the corner furthest along each plane normal.
pub fn frustum_intersects_aabb(frustum: &Frustum, aabb: &Aabb) -> bool {
    frustum.planes.iter().all(|plane| {
        let px = if plane.x >= 0.0 { aabb.max.x } else { aabb.min.x };
        let py = if plane.y >= 0.0 { aabb.max.y } else { aabb.min.y };
        let pz = if plane.z >= 0.0 { aabb.max.z } else { aabb.min.z };
        plane.x * px + plane.y * py + plane.z * pz + plane.w >= 0.0
    })
}

/// Normalize plane equation
trait NormalizePlane {
    fn normalize_plane(self) -> Self;
}

impl NormalizePlane for Vector4<f32> {
    fn normalize_plane(self) -> Self {
        let length = (self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if length > 0.0 {
            self / length
        } else {
            self
        }
    }
}
