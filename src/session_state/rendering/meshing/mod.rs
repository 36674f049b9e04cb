//! # Meshing Module
//!
//! Turns a chunk's voxel grid into a [`MeshBatch`] of visible block faces.
//!
//! ## Face Culling
//!
//! A face is emitted when the cell it looks into is not opaque. Faces between two cells of
//! the same transparent block type (water against water, glass against glass) are skipped
//! so that volumes of one material render as a single surface.
//!
//! ## Chunk Borders
//!
//! Faces on the chunk border look into the adjacent chunk, so a build needs all six face
//! neighbours. When one is missing the build is [`BuildOutcome::Deferred`] and the chunk is
//! retried once the neighbour has loaded, rather than guessing at the border.
//!
//! ## Lighting
//!
//! With flat lighting every vertex of a face takes the light stored in the cell the face
//! looks into. Smooth lighting averages light over the open cells touching each corner and
//! adds ambient occlusion from the solid ones.

mod face;
pub mod mesh_batch;

use cgmath::Point3;

use crate::session_state::voxels::{
    block::{block_side::BlockSide, Voxel},
    chunk::{ChunkData, CHUNK_DIMENSION},
    ChunkCoord,
};

pub use face::AO_NONE;
pub use mesh_batch::MeshBatch;

/// A chunk and its six face neighbours, addressed in the chunk's local coordinates.
pub(crate) struct Neighborhood<'a> {
    center: &'a ChunkData,
    neighbors: [&'a ChunkData; 6],
}

impl Neighborhood<'_> {
    /// The chunk holding a local position one cell beyond the chunk at most, and the cell
    /// inside it.
    ///
    /// # Returns
    /// `None` for positions outside the chunk on more than one axis, which belong to edge
    /// or corner neighbours that are not part of the neighbourhood.
    fn locate(&self, p: Point3<i32>) -> Option<(&ChunkData, [usize; 3])> {
        let mut outside = None;
        let mut local = [0usize; 3];
        for axis in 0..3 {
            let c = p[axis];
            if !(0..CHUNK_DIMENSION).contains(&c) {
                if outside.is_some() || !(-1..=CHUNK_DIMENSION).contains(&c) {
                    return None;
                }
                outside = Some(axis * 2 + usize::from(c >= CHUNK_DIMENSION));
            }
            local[axis] = c.rem_euclid(CHUNK_DIMENSION) as usize;
        }
        let data = match outside {
            None => self.center,
            Some(side) => self.neighbors[side],
        };
        Some((data, local))
    }

    /// Voxel at a local position, see [`Neighborhood::locate`].
    pub(crate) fn voxel(&self, p: Point3<i32>) -> Option<Voxel> {
        self.locate(p)
            .map(|(data, [x, y, z])| data.get(x, y, z))
    }

    /// Whether a local position holds an opaque block. Positions outside the
    /// neighbourhood are open.
    pub(crate) fn is_opaque(&self, p: Point3<i32>) -> bool {
        self.locate(p)
            .is_some_and(|(data, [x, y, z])| data.is_opaque(x, y, z))
    }
}

/// Result of a mesh build.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    /// The mesh was built.
    Built(MeshBatch),
    /// Face neighbours were not loaded; the chunk must be rebuilt once they are.
    Deferred {
        /// Sides whose neighbour was missing.
        missing: Vec<BlockSide>,
    },
    /// The build panicked on its worker; the chunk must be rebuilt.
    Failed,
}

/// Builds chunk meshes. Stateless apart from its options, so workers each hold a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshBuilder {
    /// Average light per corner and add ambient occlusion.
    pub smooth_lighting: bool,
}

impl MeshBuilder {
    /// Creates a builder.
    pub fn new(smooth_lighting: bool) -> Self {
        Self { smooth_lighting }
    }

    /// Builds the mesh of a chunk.
    ///
    /// # Arguments
    /// * `coord` - Coordinate of the chunk
    /// * `generation` - Chunk generation the data was read at, carried into the batch
    /// * `center` - The chunk's voxel data
    /// * `neighbors` - Face neighbours indexed by [`BlockSide`]
    ///
    /// # Returns
    /// The finished batch, or the sides whose neighbour is missing. Building is a pure
    /// function of its inputs.
    pub fn build(
        &self,
        coord: ChunkCoord,
        generation: u64,
        center: &ChunkData,
        neighbors: [Option<&ChunkData>; 6],
    ) -> BuildOutcome {
        let missing: Vec<BlockSide> = BlockSide::all()
            .into_iter()
            .filter(|side| neighbors[*side as usize].is_none())
            .collect();
        let [Some(n0), Some(n1), Some(n2), Some(n3), Some(n4), Some(n5)] = neighbors else {
            return BuildOutcome::Deferred { missing };
        };

        let hood = Neighborhood {
            center,
            neighbors: [n0, n1, n2, n3, n4, n5],
        };
        let origin = coord * CHUNK_DIMENSION;

        let mut vertices = Vec::new();
        let mut opaque_indices = Vec::new();
        let mut translucent_indices = Vec::new();

        if !center.is_empty() {
            for z in 0..CHUNK_DIMENSION {
                for y in 0..CHUNK_DIMENSION {
                    for x in 0..CHUNK_DIMENSION {
                        let cell = Point3::new(x, y, z);
                        let voxel = center.get(x as usize, y as usize, z as usize);
                        if !voxel.is_solid() {
                            continue;
                        }
                        let block_type = voxel.block_type();

                        for side in BlockSide::all() {
                            let front_cell = cell + side.normal();
                            if hood.is_opaque(front_cell) {
                                continue;
                            }
                            let Some(front) = hood.voxel(front_cell) else {
                                continue;
                            };
                            if block_type.is_transparent() && front.block == voxel.block {
                                continue;
                            }

                            let (quad, indices) = face::build_face(
                                &hood,
                                cell,
                                origin,
                                side,
                                block_type,
                                front,
                                self.smooth_lighting,
                                vertices.len() as u32,
                            );
                            vertices.extend_from_slice(&quad);
                            if block_type.is_opaque() {
                                opaque_indices.extend_from_slice(&indices);
                            } else {
                                translucent_indices.extend_from_slice(&indices);
                            }
                        }
                    }
                }
            }
        }

        BuildOutcome::Built(MeshBatch::new(
            coord,
            generation,
            vertices,
            opaque_indices,
            translucent_indices,
        ))
    }
}
