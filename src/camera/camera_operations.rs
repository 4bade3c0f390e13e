//! Camera Operations - pure functions over `CameraData`
//!
//! Every function takes camera data and returns new data or a derived
//! value. Matrices use OpenGL clip depth; the renderer converts.

use super::camera_data::{CameraConfig, CameraData, FlightInput};
use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector2, Vector3};

/// Pitch stays this far short of vertical so the view basis never degenerates.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

pub fn camera_from_config(config: &CameraConfig) -> CameraData {
    let [x, y, z] = config.start_position;
    CameraData {
        position: Point3::new(x, y, z),
        yaw: config.start_yaw_degrees.to_radians(),
        pitch: config
            .start_pitch_degrees
            .to_radians()
            .clamp(-PITCH_LIMIT, PITCH_LIMIT),
        fov_y: config.fov_y_degrees.to_radians(),
        aspect: config.aspect,
        z_near: config.z_near,
        z_far: config.z_far,
        speed: config.speed,
    }
}

/// Unit view direction for a heading and pitch.
pub fn view_direction(yaw: f32, pitch: f32) -> Vector3<f32> {
    Vector3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
}

/// Horizontal unit vector to the right of the heading.
pub fn strafe_direction(yaw: f32) -> Vector3<f32> {
    Vector3::new(-yaw.sin(), 0.0, yaw.cos())
}

pub fn view_matrix(camera: &CameraData) -> Matrix4<f32> {
    let target = camera.position + view_direction(camera.yaw, camera.pitch);
    Matrix4::look_at_rh(camera.position, target, Vector3::unit_y())
}

pub fn projection_matrix(camera: &CameraData) -> Matrix4<f32> {
    cgmath::perspective(Rad(camera.fov_y), camera.aspect, camera.z_near, camera.z_far)
}

pub fn view_projection_matrix(camera: &CameraData) -> Matrix4<f32> {
    projection_matrix(camera) * view_matrix(camera)
}

/// Position over the ground plane, the point the clipmap rings centre on.
pub fn ground_position(camera: &CameraData) -> Vector2<f32> {
    Vector2::new(camera.position.x, camera.position.z)
}

/// Slide over the ground plane without changing height or heading.
pub fn translate_ground(camera: &CameraData, delta: Vector2<f32>) -> CameraData {
    let mut next = *camera;
    next.position.x += delta.x;
    next.position.z += delta.y;
    next
}

/// New aspect ratio for a target size. A zero height is treated as one.
pub fn resize(camera: &CameraData, width: u32, height: u32) -> CameraData {
    CameraData {
        aspect: width as f32 / height.max(1) as f32,
        ..*camera
    }
}

/// Advance one frame: turn first, then move along the new heading.
pub fn fly(camera: &CameraData, input: &FlightInput, delta_time: f32) -> CameraData {
    let yaw = camera.yaw + input.turn;
    let pitch = (camera.pitch + input.tilt).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    let step = camera.speed * delta_time;

    let motion = view_direction(yaw, pitch) * input.forward
        + strafe_direction(yaw) * input.strafe
        + Vector3::unit_y() * input.climb;

    CameraData {
        position: camera.position + motion * step,
        yaw,
        pitch,
        ..*camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_strafe_is_right_of_view() {
        for yaw in [0.0_f32, 0.7, 2.5, -1.2] {
            let view = view_direction(yaw, 0.0);
            let right = strafe_direction(yaw);
            assert!(close(view.dot(right), 0.0));
            // Right-handed, Y up: view x right points down.
            assert!(view.cross(right).y < -0.99);
        }
    }

    #[test]
    fn test_translate_ground_keeps_height() {
        let camera = CameraData {
            position: Point3::new(1.0, 30.0, 2.0),
            ..Default::default()
        };
        let moved = translate_ground(&camera, Vector2::new(0.5, -1.0));
        assert_eq!(moved.position, Point3::new(1.5, 30.0, 1.0));
        assert_eq!(ground_position(&moved), Vector2::new(1.5, 1.0));
    }

    #[test]
    fn test_fly_clamps_pitch() {
        let input = FlightInput {
            tilt: 10.0,
            ..Default::default()
        };
        let camera = fly(&CameraData::default(), &input, 0.0);
        assert!(camera.pitch < std::f32::consts::FRAC_PI_2);
        assert!(view_matrix(&camera).x.x.is_finite());
    }

    #[test]
    fn test_fly_turns_before_moving() {
        let camera = CameraData {
            position: Point3::new(0.0, 0.0, 0.0),
            speed: 2.0,
            ..Default::default()
        };
        let input = FlightInput {
            forward: 1.0,
            turn: std::f32::consts::FRAC_PI_2,
            ..Default::default()
        };
        let moved = fly(&camera, &input, 0.5);
        assert!(close(moved.position.x, 0.0));
        assert!(close(moved.position.z, 1.0));
    }

    #[test]
    fn test_config_degrees_become_radians() {
        let camera = camera_from_config(&CameraConfig {
            start_yaw_degrees: 90.0,
            start_pitch_degrees: -120.0,
            ..Default::default()
        });
        assert!(close(camera.yaw, std::f32::consts::FRAC_PI_2));
        assert!(close(camera.pitch, -PITCH_LIMIT));
        assert_eq!(camera.position, Point3::new(0.0, 60.0, 0.0));
    }

    #[test]
    fn test_resize_ignores_zero_height() {
        let camera = resize(&CameraData::default(), 800, 0);
        assert_eq!(camera.aspect, 800.0);
    }
}
