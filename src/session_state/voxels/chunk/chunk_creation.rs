//! # Chunk Creation Module
//!
//! Sequential construction of [`ChunkData`]. Generators visit cells in storage order
//! (x fastest, then y, then z) and push one voxel per cell; the builder keeps the opacity
//! bits and the solid count in step with the voxel grid as it goes.

use bitvec::vec::BitVec;

use crate::session_state::voxels::block::Voxel;

use super::{ChunkData, CHUNK_SIZE};

/// Builds a [`ChunkData`] one cell at a time in storage order.
pub struct ChunkCreationIterator {
    voxels: Vec<Voxel>,
    opaque: BitVec,
    solid_count: u32,
}

impl ChunkCreationIterator {
    /// Starts an empty chunk.
    pub fn new() -> Self {
        ChunkCreationIterator {
            voxels: Vec::with_capacity(CHUNK_SIZE as usize),
            opaque: BitVec::with_capacity(CHUNK_SIZE as usize),
            solid_count: 0,
        }
    }

    /// Appends the voxel for the next cell.
    ///
    /// Pushing more than a chunk's worth of cells is ignored.
    pub fn push_voxel(&mut self, voxel: Voxel) {
        if self.voxels.len() == CHUNK_SIZE as usize {
            log::warn!("Chunk builder received more than {} cells", CHUNK_SIZE);
            return;
        }
        self.opaque.push(voxel.is_opaque());
        if voxel.is_solid() {
            self.solid_count += 1;
        }
        self.voxels.push(voxel);
    }

    /// Finishes the chunk. Cells that were never pushed are air.
    pub fn return_chunk(mut self) -> ChunkData {
        while self.voxels.len() < CHUNK_SIZE as usize {
            self.push_voxel(Voxel::AIR);
        }
        ChunkData {
            voxels: self.voxels,
            opaque: self.opaque,
            solid_count: self.solid_count,
        }
    }
}

impl Default for ChunkCreationIterator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_state::voxels::block::block_type::BlockType;

    #[test]
    fn pushes_fill_storage_order() {
        let mut cci = ChunkCreationIterator::new();
        cci.push_voxel(Voxel::new(BlockType::STONE));
        cci.push_voxel(Voxel::AIR);
        cci.push_voxel(Voxel::new(BlockType::GLASS));
        let data = cci.return_chunk();

        assert_eq!(data.get(0, 0, 0).block_type(), BlockType::STONE);
        assert_eq!(data.get(2, 0, 0).block_type(), BlockType::GLASS);
        assert_eq!(data.get(15, 15, 15), Voxel::AIR);
        assert_eq!(data.solid_count(), 2);
        assert_eq!(data, {
            let mut expected = ChunkData::empty();
            expected.set(0, 0, 0, Voxel::new(BlockType::STONE));
            expected.set(2, 0, 0, Voxel::new(BlockType::GLASS));
            expected
        });
    }
}
