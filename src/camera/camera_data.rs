//! Camera Data - Pure DOP
//!
//! NO METHODS. Just data.
//! Flight and projection math lives in camera_operations.rs

use cgmath::Point3;
use serde::{Deserialize, Serialize};

/// Camera state for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    /// Eye position in world units. Terrain heights are `[0, scale_y]`.
    pub position: Point3<f32>,
    /// Heading around +Y in radians. Zero looks down +X.
    pub yaw: f32,
    /// Radians above the horizon, clamped short of straight up/down.
    pub pitch: f32,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// World units per second at full input.
    pub speed: f32,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 60.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            z_near: 0.1,
            z_far: 20000.0,
            speed: 40.0,
        }
    }
}

/// One frame of flight input, each axis in `[-1, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlightInput {
    /// Along the view direction.
    pub forward: f32,
    /// Sideways, positive to the right.
    pub strafe: f32,
    /// Straight up in world space.
    pub climb: f32,
    /// Yaw change in radians, applied before moving.
    pub turn: f32,
    /// Pitch change in radians, applied before moving.
    pub tilt: f32,
}

/// Where a camera starts. Loadable from TOML next to `TerrainConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub start_position: [f32; 3],
    pub start_yaw_degrees: f32,
    pub start_pitch_degrees: f32,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            start_position: [0.0, 60.0, 0.0],
            start_yaw_degrees: 0.0,
            start_pitch_degrees: -20.0,
            fov_y_degrees: 60.0,
            aspect: 16.0 / 9.0,
            z_near: 0.1,
            z_far: 20000.0,
            speed: 40.0,
        }
    }
}
