//! # Visibility
//!
//! Picks the uploaded chunks that can appear in the current frame and orders them for
//! drawing.

use std::cmp::Ordering;

use cgmath::{MetricSpace, Point3};

use crate::session_state::camera_state::{frustum::Aabb, CameraView};
use crate::session_state::voxels::{chunk::CHUNK_DIMENSION, chunk_store::ChunkStore, ChunkCoord};

/// A chunk picked for drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleChunk {
    /// Chunk coordinate.
    pub coord: ChunkCoord,
    /// Squared distance from the camera to the chunk centre.
    pub distance_squared: f32,
    /// Quads in the chunk's uploaded mesh.
    pub quad_count: u32,
}

/// Visible chunks, nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibleSet {
    chunks: Vec<VisibleChunk>,
}

impl VisibleSet {
    /// Chunks in draw order, nearest first.
    pub fn chunks(&self) -> &[VisibleChunk] {
        &self.chunks
    }

    /// Coordinates in draw order.
    pub fn coords(&self) -> impl DoubleEndedIterator<Item = ChunkCoord> + '_ {
        self.chunks.iter().map(|chunk| chunk.coord)
    }

    /// Number of visible chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Quads across all visible chunks.
    pub fn quad_count(&self) -> u64 {
        self.chunks.iter().map(|chunk| u64::from(chunk.quad_count)).sum()
    }
}

/// World-space bounds of a chunk.
pub fn chunk_aabb(coord: ChunkCoord) -> Aabb {
    let size = CHUNK_DIMENSION as f32;
    let min = Point3::new(coord.x as f32 * size, coord.y as f32 * size, coord.z as f32 * size);
    Aabb::new(min, Point3::new(min.x + size, min.y + size, min.z + size))
}

/// World-space centre of a chunk.
pub fn chunk_center(coord: ChunkCoord) -> Point3<f32> {
    let size = CHUNK_DIMENSION as f32;
    Point3::new(
        (coord.x as f32 + 0.5) * size,
        (coord.y as f32 + 0.5) * size,
        (coord.z as f32 + 0.5) * size,
    )
}

/// Frustum culling and ordering of uploaded chunks.
pub struct VisibilitySet;

impl VisibilitySet {
    /// Collects the loaded chunks with a non-empty uploaded mesh whose bounds intersect the
    /// view frustum, ordered by distance to the camera with ties broken by coordinate.
    ///
    /// The result depends only on the view and the store, never on iteration order.
    pub fn compute(view: &CameraView, store: &ChunkStore) -> VisibleSet {
        let mut chunks: Vec<VisibleChunk> = store
            .chunks()
            .filter(|chunk| chunk.is_loaded() && chunk.mesh_quad_count() > 0)
            .filter(|chunk| view.frustum.intersects_aabb(&chunk_aabb(chunk.coord())))
            .map(|chunk| VisibleChunk {
                coord: chunk.coord(),
                distance_squared: view.position.distance2(chunk_center(chunk.coord())),
                quad_count: chunk.mesh_quad_count(),
            })
            .collect();
        chunks.sort_by(draw_order);
        VisibleSet { chunks }
    }
}

fn draw_order(a: &VisibleChunk, b: &VisibleChunk) -> Ordering {
    a.distance_squared
        .total_cmp(&b.distance_squared)
        .then_with(|| (a.coord.x, a.coord.y, a.coord.z).cmp(&(b.coord.x, b.coord.y, b.coord.z)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationMethod, GenerationOptions, SessionOptions};
    use crate::session_state::camera_state::camera::{Camera, Projection};
    use crate::session_state::rendering::backend::BufferHandle;
    use crate::session_state::rendering::upload_scheduler::ChunkGpuMesh;
    use crate::session_state::voxels::{
        generation::TerrainGenerator, persistence::MemoryPersistence,
    };
    use cgmath::Deg;

    fn visible(coord: ChunkCoord, distance_squared: f32) -> VisibleChunk {
        VisibleChunk {
            coord,
            distance_squared,
            quad_count: 1,
        }
    }

    #[test]
    fn equal_distances_order_by_coordinate() {
        let mut chunks = vec![
            visible(Point3::new(0, 0, 1), 4.0),
            visible(Point3::new(0, 0, -1), 4.0),
            visible(Point3::new(-1, 0, 0), 4.0),
            visible(Point3::new(5, 5, 5), 1.0),
        ];
        chunks.sort_by(draw_order);
        let order: Vec<ChunkCoord> = chunks.iter().map(|c| c.coord).collect();
        assert_eq!(
            order,
            vec![
                Point3::new(5, 5, 5),
                Point3::new(-1, 0, 0),
                Point3::new(0, 0, -1),
                Point3::new(0, 0, 1),
            ]
        );
    }

    fn store_with_meshes(loaded: &[ChunkCoord], meshed: &[ChunkCoord]) -> ChunkStore {
        let options = SessionOptions::default();
        let generator = TerrainGenerator::new(&GenerationOptions {
            method: GenerationMethod::Empty,
            ..GenerationOptions::default()
        });
        let mut store = ChunkStore::new(
            &options,
            Box::new(MemoryPersistence::new()),
            Box::new(generator),
        );
        for coord in loaded {
            store.request(*coord);
        }
        store.tick(|_, _| {}).unwrap();
        for (raw, coord) in meshed.iter().enumerate() {
            store.get_mut(*coord).unwrap().gpu_mesh = Some(ChunkGpuMesh {
                handle: BufferHandle::new(raw as u64 + 1),
                generation: 1,
                quad_count: 2,
                opaque_index_count: 12,
                index_count: 12,
                quad_capacity: 16,
            });
        }
        store
    }

    #[test]
    fn only_meshed_chunks_in_front_of_the_camera_are_visible() {
        let behind = Point3::new(-2, 0, 0);
        let unmeshed = Point3::new(1, 0, 0);
        let near = Point3::new(2, 0, 0);
        let far = Point3::new(4, 0, 0);
        let store = store_with_meshes(&[behind, unmeshed, near, far], &[behind, near, far]);

        let camera = Camera::new(Point3::new(8.0, 8.0, 8.0), Deg(0.0), Deg(0.0));
        let projection = Projection::new(1280, 720, Deg(70.0), 0.1, 500.0);
        let view = CameraView::new(&camera, &projection);

        let visible = VisibilitySet::compute(&view, &store);
        assert_eq!(visible.coords().collect::<Vec<_>>(), vec![near, far]);
        assert_eq!(visible.quad_count(), 4);

        let turned = Camera::new(Point3::new(8.0, 8.0, 8.0), Deg(180.0), Deg(0.0));
        let visible = VisibilitySet::compute(&CameraView::new(&turned, &projection), &store);
        assert_eq!(visible.coords().collect::<Vec<_>>(), vec![behind]);
    }

    #[test]
    fn chunk_bounds_cover_sixteen_blocks() {
        let aabb = chunk_aabb(Point3::new(-1, 0, 2));
        assert_eq!(aabb.min, Point3::new(-16.0, 0.0, 32.0));
        assert_eq!(aabb.max, Point3::new(0.0, 16.0, 48.0));
        assert_eq!(chunk_center(Point3::new(-1, 0, 2)), Point3::new(-8.0, 8.0, 40.0));
    }
}
