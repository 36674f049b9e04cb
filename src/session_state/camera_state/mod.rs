//! # Camera State
//!
//! The camera the host moves around, its projection, and the per-frame [`CameraView`] that
//! visibility queries run against.

use cgmath::Point3;

pub mod camera;
pub mod frustum;

use camera::{Camera, Projection};
use frustum::Frustum;

/// Camera data needed to pick and order visible chunks for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// Camera position in world space.
    pub position: Point3<f32>,
    /// View frustum in world space.
    pub frustum: Frustum,
}

impl CameraView {
    /// The view of `camera` through `projection`.
    pub fn new(camera: &Camera, projection: &Projection) -> Self {
        Self {
            position: camera.position,
            frustum: Frustum::from_matrix(projection.calc_matrix() * camera.calc_matrix()),
        }
    }
}
