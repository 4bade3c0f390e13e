/// Camera Module - Data-Oriented Programming (DOP) style
///
/// - camera_data.rs: Pure data structures with NO methods
/// - camera_operations.rs: Pure functions that operate on data
///
/// The terrain only talks to cameras through `CameraView`. `FlyCamera` is the
/// implementation shipped with the crate.

pub mod camera_data;
pub mod camera_operations;

use cgmath::{Matrix4, Point3, Vector2};

use crate::math::{aabb_scale_height, frustum_intersects_aabb, Aabb, Frustum};

// Re-export data structures
pub use camera_data::{CameraConfig, CameraData, FlightInput};

// Re-export all operations
pub use camera_operations::{
    camera_from_config, fly, ground_position, projection_matrix, resize, strafe_direction,
    translate_ground, view_direction, view_matrix, view_projection_matrix,
};

/// What the clipmap and renderer need from a camera
pub trait CameraView {
    /// Ground-plane position this frame.
    fn position_xz(&self) -> Vector2<f32>;

    /// Ground-plane position at the previous frame, `None` before the first.
    fn previous_position_xz(&self) -> Option<Vector2<f32>>;

    /// Terrain boxes store normalized height; `height_scale` maps it to world units.
    fn is_in_frustum(&self, bounding_box: &Aabb, height_scale: f32) -> bool;

    fn view_projection_matrix(&self) -> Matrix4<f32>;

    /// Eye position for lighting and fog.
    fn position(&self) -> Point3<f32>;
}

/// Free-flying camera that remembers where it was last frame
#[derive(Debug, Clone)]
pub struct FlyCamera {
    data: CameraData,
    previous_xz: Option<Vector2<f32>>,
    frustum: Frustum,
}

impl FlyCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self::from_data(camera_from_config(config))
    }

    pub fn from_data(data: CameraData) -> Self {
        let frustum = Frustum::from_view_projection(&view_projection_matrix(&data));
        Self {
            data,
            previous_xz: None,
            frustum,
        }
    }

    pub fn data(&self) -> &CameraData {
        &self.data
    }

    /// Replace the camera state. The position before the call becomes the
    /// previous position.
    pub fn set_data(&mut self, data: CameraData) {
        self.previous_xz = Some(ground_position(&self.data));
        self.data = data;
        self.frustum = Frustum::from_view_projection(&view_projection_matrix(&self.data));
    }

    /// Apply one frame of input.
    pub fn advance(&mut self, input: &FlightInput, delta_time: f32) {
        let next = fly(&self.data, input, delta_time);
        self.set_data(next);
    }

    /// Match the projection to a new target size. Does not count as a move.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.data = resize(&self.data, width, height);
        self.frustum = Frustum::from_view_projection(&view_projection_matrix(&self.data));
    }

    /// Forget the previous position so the next clipmap update runs in full.
    pub fn reset_history(&mut self) {
        self.previous_xz = None;
    }
}

impl CameraView for FlyCamera {
    fn position_xz(&self) -> Vector2<f32> {
        ground_position(&self.data)
    }

    fn previous_position_xz(&self) -> Option<Vector2<f32>> {
        self.previous_xz
    }

    fn is_in_frustum(&self, bounding_box: &Aabb, height_scale: f32) -> bool {
        frustum_intersects_aabb(&self.frustum, &aabb_scale_height(bounding_box, height_scale))
    }

    fn view_projection_matrix(&self) -> Matrix4<f32> {
        view_projection_matrix(&self.data)
    }

    fn position(&self) -> Point3<f32> {
        self.data.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::aabb_from_lattice_rect;
    use cgmath::Point3;

    #[test]
    fn test_previous_position_tracks_last_frame() {
        let mut camera = FlyCamera::from_data(CameraData::default());
        assert_eq!(camera.previous_position_xz(), None);

        let moved = translate_ground(camera.data(), Vector2::new(3.0, 4.0));
        camera.set_data(moved);
        assert_eq!(camera.previous_position_xz(), Some(Vector2::new(0.0, 0.0)));
        assert_eq!(camera.position_xz(), Vector2::new(3.0, 4.0));

        camera.reset_history();
        assert_eq!(camera.previous_position_xz(), None);
    }

    #[test]
    fn test_resize_is_not_a_move() {
        let mut camera = FlyCamera::from_data(CameraData::default());
        camera.resize(1000, 500);
        assert_eq!(camera.data().aspect, 2.0);
        assert_eq!(camera.previous_position_xz(), None);
    }

    #[test]
    fn test_terrain_box_behind_camera_is_culled() {
        // Yaw 0 looks down +X.
        let camera = FlyCamera::from_data(CameraData {
            position: Point3::new(0.0, 10.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            ..Default::default()
        });
        let ahead = aabb_from_lattice_rect(Vector2::new(20, -4), Vector2::new(28, 4), 1.0);
        let behind = aabb_from_lattice_rect(Vector2::new(-28, -4), Vector2::new(-20, 4), 1.0);
        assert!(camera.is_in_frustum(&ahead, 20.0));
        assert!(!camera.is_in_frustum(&behind, 20.0));
    }
}
