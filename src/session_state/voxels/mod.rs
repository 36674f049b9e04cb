//! # Voxels Module
//!
//! World data: blocks, chunks, the chunk store that streams them in and out, terrain
//! generation and chunk persistence.

use cgmath::Point3;

pub mod block;
pub mod chunk;
pub mod chunk_store;
pub mod generation;
pub mod persistence;

/// Integer coordinate of a chunk, in chunk units.
pub type ChunkCoord = Point3<i32>;

/// Chebyshev distance between two chunk coordinates, in chunks.
pub fn chunk_distance(a: ChunkCoord, b: ChunkCoord) -> u32 {
    a.x.abs_diff(b.x)
        .max(a.y.abs_diff(b.y))
        .max(a.z.abs_diff(b.z))
}

/// Orders coordinates by squared distance from `center`, then lexicographically.
///
/// The distance is computed in `u128` so coordinates at opposite ends of the `i32` range
/// still compare.
pub fn nearest_first_key(center: ChunkCoord, coord: ChunkCoord) -> (u128, i32, i32, i32) {
    let square = |a: i32, b: i32| u128::from(a.abs_diff(b)).pow(2);
    (
        square(coord.x, center.x) + square(coord.y, center.y) + square(coord.z, center.z),
        coord.x,
        coord.y,
        coord.z,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances_span_the_whole_coordinate_range() {
        let low = Point3::new(i32::MIN, 0, 0);
        let high = Point3::new(i32::MAX, 0, 0);
        assert_eq!(chunk_distance(low, high), u32::MAX);
        assert!(nearest_first_key(high, Point3::new(2, 0, 0)) < nearest_first_key(high, low));
    }

    #[test]
    fn ties_break_lexicographically() {
        let center = Point3::new(0, 0, 0);
        assert!(
            nearest_first_key(center, Point3::new(-1, 0, 0))
                < nearest_first_key(center, Point3::new(0, 0, 1))
        );
    }
}
