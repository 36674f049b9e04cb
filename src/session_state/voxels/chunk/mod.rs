//! # Chunk Module
//!
//! A chunk is a 16x16x16 cuboid of voxels, the unit of loading, meshing and drawing.
//!
//! ## Storage
//!
//! [`ChunkData`] keeps a dense voxel grid in row-major order (x fastest, then y, then z)
//! next to a bit vector holding one opacity bit per cell. The mesher culls faces against
//! the opacity bits instead of decoding the neighbouring voxel.
//!
//! [`Chunk`] is the store's record for a loaded chunk: the shared voxel data plus the
//! main-thread bookkeeping (generation, dirty flag, uploaded mesh).

use bitvec::prelude::BitVec;
use cgmath::Point3;

use crate::core::MtResource;
use crate::session_state::rendering::upload_scheduler::ChunkGpuMesh;

use super::block::{block_type::BlockType, Voxel};
use super::ChunkCoord;

pub mod chunk_creation;

/// The dimension (width, height, depth) of a chunk in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The number of blocks in a single 2D plane of a chunk (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of blocks in a chunk (CHUNK_DIMENSION³).
pub const CHUNK_SIZE: i32 = CHUNK_PLANE_SIZE * CHUNK_DIMENSION;

/// Index of a local cell in the dense grid.
#[inline]
pub fn local_index(x: usize, y: usize, z: usize) -> usize {
    x + CHUNK_DIMENSION as usize * y + CHUNK_PLANE_SIZE as usize * z
}

/// Chunk containing the world block position.
pub fn chunk_of_block(block: Point3<i32>) -> ChunkCoord {
    Point3::new(
        block.x.div_euclid(CHUNK_DIMENSION),
        block.y.div_euclid(CHUNK_DIMENSION),
        block.z.div_euclid(CHUNK_DIMENSION),
    )
}

/// Position of the world block inside its chunk.
pub fn local_of_block(block: Point3<i32>) -> Point3<usize> {
    Point3::new(
        block.x.rem_euclid(CHUNK_DIMENSION) as usize,
        block.y.rem_euclid(CHUNK_DIMENSION) as usize,
        block.z.rem_euclid(CHUNK_DIMENSION) as usize,
    )
}

/// The voxel grid of one chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkData {
    voxels: Vec<Voxel>,
    /// One bit per cell, set when the cell's block is opaque.
    opaque: BitVec,
    /// Number of non-air cells.
    solid_count: u32,
}

impl ChunkData {
    /// A chunk where every cell holds `voxel`.
    pub fn filled(voxel: Voxel) -> Self {
        let opaque = voxel.is_opaque();
        Self {
            voxels: vec![voxel; CHUNK_SIZE as usize],
            opaque: BitVec::repeat(opaque, CHUNK_SIZE as usize),
            solid_count: if voxel.is_solid() { CHUNK_SIZE as u32 } else { 0 },
        }
    }

    /// A chunk of unlit air.
    pub fn empty() -> Self {
        Self::filled(Voxel::AIR)
    }

    /// Builds chunk data from a full grid of voxels.
    ///
    /// # Returns
    /// `None` if the grid has the wrong length or holds an unknown block id.
    pub fn from_voxels(voxels: Vec<Voxel>) -> Option<Self> {
        if voxels.len() != CHUNK_SIZE as usize {
            return None;
        }
        let mut opaque = BitVec::with_capacity(voxels.len());
        let mut solid_count = 0;
        for voxel in &voxels {
            let block_type = BlockType::from_id(voxel.block)?;
            opaque.push(block_type.is_opaque());
            if block_type.is_solid() {
                solid_count += 1;
            }
        }
        Some(Self {
            voxels,
            opaque,
            solid_count,
        })
    }

    /// The voxel at a local cell.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Voxel {
        self.voxels[local_index(x, y, z)]
    }

    /// Whether the local cell holds an opaque block.
    #[inline]
    pub fn is_opaque(&self, x: usize, y: usize, z: usize) -> bool {
        self.opaque[local_index(x, y, z)]
    }

    /// Replaces the voxel at a local cell, keeping the opacity bits and solid count current.
    pub fn set(&mut self, x: usize, y: usize, z: usize, voxel: Voxel) {
        let index = local_index(x, y, z);
        let previous = self.voxels[index];
        if previous.is_solid() {
            self.solid_count -= 1;
        }
        if voxel.is_solid() {
            self.solid_count += 1;
        }
        self.voxels[index] = voxel;
        self.opaque.set(index, voxel.is_opaque());
    }

    /// Whether every cell is air.
    pub fn is_empty(&self) -> bool {
        self.solid_count == 0
    }

    /// Number of non-air cells.
    pub fn solid_count(&self) -> u32 {
        self.solid_count
    }

    /// The dense grid, in [`local_index`] order.
    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }
}

/// A loaded chunk as tracked by the chunk store.
///
/// The voxel data is shared with mesh workers; everything else is touched only by the main
/// thread. The chunk exclusively owns its uploaded mesh, and unloading always hands that mesh
/// to the upload scheduler before the chunk is dropped.
#[derive(Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    data: MtResource<ChunkData>,
    pub(crate) generation: u64,
    pub(crate) dirty: bool,
    pub(crate) modified: bool,
    pub(crate) loaded: bool,
    pub(crate) gpu_mesh: Option<ChunkGpuMesh>,
}

impl Chunk {
    pub(crate) fn new(coord: ChunkCoord, data: ChunkData, generation: u64) -> Self {
        Self {
            coord,
            data: MtResource::new(data),
            generation,
            dirty: true,
            modified: false,
            loaded: true,
            gpu_mesh: None,
        }
    }

    /// Chunk coordinate.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Shared handle to the voxel grid.
    pub fn data(&self) -> &MtResource<ChunkData> {
        &self.data
    }

    /// Generation of the chunk's current block state.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the uploaded mesh is stale.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether blocks were edited since load.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Whether the chunk is still part of the store.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The uploaded mesh, if any.
    pub fn gpu_mesh(&self) -> Option<&ChunkGpuMesh> {
        self.gpu_mesh.as_ref()
    }

    /// Quads in the uploaded mesh.
    pub fn mesh_quad_count(&self) -> u32 {
        self.gpu_mesh.as_ref().map_or(0, |mesh| mesh.quad_count)
    }
}
