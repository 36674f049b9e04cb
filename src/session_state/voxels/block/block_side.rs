//! # Block Side Module
//!
//! The six faces of a voxel block, their outward normals and the chunk-neighbour offsets
//! they imply.

use cgmath::Vector3;

/// Represents the six faces of a voxel block.
///
/// The discriminants index per-face tables (texture layers, neighbour slots).
/// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BlockSide {
    /// Faces negative X.
    FRONT = 0,

    /// Faces positive X.
    BACK = 1,

    /// Faces negative Y.
    BOTTOM = 2,

    /// Faces positive Y.
    TOP = 3,

    /// Faces negative Z.
    LEFT = 4,

    /// Faces positive Z.
    RIGHT = 5,
}

impl BlockSide {
    /// Returns all six faces in discriminant order.
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::FRONT,
            BlockSide::BACK,
            BlockSide::BOTTOM,
            BlockSide::TOP,
            BlockSide::LEFT,
            BlockSide::RIGHT,
        ]
    }

    /// Axis the face is perpendicular to (0 = X, 1 = Y, 2 = Z).
    pub fn axis(self) -> usize {
        self as usize / 2
    }

    /// Whether the outward normal points along the positive axis.
    pub fn is_positive(self) -> bool {
        self as usize % 2 == 1
    }

    /// Unit outward normal.
    pub fn normal(self) -> Vector3<i32> {
        let sign = if self.is_positive() { 1 } else { -1 };
        let mut normal = Vector3::new(0, 0, 0);
        normal[self.axis()] = sign;
        normal
    }

    /// The face pointing the other way.
    pub fn opposite(self) -> BlockSide {
        BlockSide::all()[self as usize ^ 1]
    }
}
