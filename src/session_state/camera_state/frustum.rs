//! View-frustum culling against axis-aligned boxes.
//!
//! Planes are extracted from the combined view-projection matrix (Gribb and Hartmann) for
//! WGPU's 0..1 clip depth, so the near plane is the third row alone.

use cgmath::{InnerSpace, Matrix, Matrix4, Point3, Vector3, Vector4};

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f32>,
    /// Maximum corner.
    pub max: Point3<f32>,
}

impl Aabb {
    /// Creates a box from its corners.
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }
}

/// A plane `normal · p + distance = 0` with the normal pointing into the frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Plane {
    normal: Vector3<f32>,
    distance: f32,
}

impl Plane {
    fn from_row(row: Vector4<f32>) -> Self {
        let normal = row.truncate();
        let length = normal.magnitude();
        if length > f32::EPSILON {
            Self {
                normal: normal / length,
                distance: row.w / length,
            }
        } else {
            Self {
                normal,
                distance: row.w,
            }
        }
    }

    fn signed_distance(&self, p: Point3<f32>) -> f32 {
        self.normal.x * p.x + self.normal.y * p.y + self.normal.z * p.z + self.distance
    }
}

/// Six inward-facing planes: left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum of a view-projection matrix.
    pub fn from_matrix(view_projection: Matrix4<f32>) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);
        Self {
            planes: [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(Plane::from_row),
        }
    }

    /// Whether any part of `aabb` may be inside the frustum.
    ///
    /// Conservative: boxes near a frustum corner can pass while being outside.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let positive = Point3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.signed_distance(positive) >= 0.0
        })
    }

    /// Whether `p` is inside the frustum.
    pub fn contains_point(&self, p: Point3<f32>) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(p) >= 0.0)
    }
}
