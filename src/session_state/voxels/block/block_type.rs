//! # Block Type Module
//!
//! The kinds of blocks a voxel can hold and the material properties the mesher needs:
//! solidity, transparency and the texture-array layer of each face.

use num_derive::FromPrimitive;

use super::{block_side::BlockSide, BlockTypeSize};

/// Enumerates all block types. The discriminant is the id stored in each voxel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BlockType {
    /// Empty space. Non-solid and transparent.
    AIR = 0,

    /// Plain dirt.
    DIRT = 1,

    /// Grass-topped dirt with distinct top, side and bottom textures.
    GRASS = 2,

    /// Bark on the sides, rings on the caps.
    WOOD = 3,

    /// A plain white block, mostly used for testing.
    WHITE = 4,

    /// Stone.
    STONE = 5,

    /// Clear glass. Solid but transparent.
    GLASS = 6,

    /// Foliage. Solid but transparent.
    LEAVES = 7,

    /// Still water. Solid for meshing purposes but transparent.
    WATER = 8,
}

/// Texture-array layer per face, in [`BlockSide`] order: front, back, bottom, top, left, right.
static BLOCK_TYPE_TO_TEXTURE_LAYERS: [[u32; 6]; 9] = [
    [0, 0, 0, 0, 0, 0],       // AIR (never meshed)
    [1, 1, 1, 1, 1, 1],       // DIRT
    [2, 2, 1, 3, 2, 2],       // GRASS
    [5, 5, 6, 6, 5, 5],       // WOOD
    [4, 4, 4, 4, 4, 4],       // WHITE
    [7, 7, 7, 7, 7, 7],       // STONE
    [8, 8, 8, 8, 8, 8],       // GLASS
    [9, 9, 9, 9, 9, 9],       // LEAVES
    [10, 10, 10, 10, 10, 10], // WATER
];

impl BlockType {
    /// Looks up the block type for a stored id.
    ///
    /// # Returns
    /// `None` when `id` does not name a block type.
    pub fn from_id(id: BlockTypeSize) -> Option<Self> {
        num::FromPrimitive::from_u8(id)
    }

    /// The id stored in voxels.
    pub fn id(self) -> BlockTypeSize {
        self as BlockTypeSize
    }

    /// Whether the block occupies its cell. Only air does not.
    pub fn is_solid(self) -> bool {
        self != BlockType::AIR
    }

    /// Whether light and sight pass through the block.
    pub fn is_transparent(self) -> bool {
        matches!(
            self,
            BlockType::AIR | BlockType::GLASS | BlockType::LEAVES | BlockType::WATER
        )
    }

    /// Solid and not transparent: hides the faces of any block behind it.
    pub fn is_opaque(self) -> bool {
        self.is_solid() && !self.is_transparent()
    }

    /// Texture-array layer used for `side` of this block.
    pub fn texture_layer(self, side: BlockSide) -> u32 {
        BLOCK_TYPE_TO_TEXTURE_LAYERS[self as usize][side as usize]
    }

    /// Picks a solid, opaque surface material from `rng`.
    pub fn random_ground(rng: &mut fastrand::Rng) -> Self {
        match rng.u8(0..4) {
            0 => BlockType::STONE,
            1 => BlockType::WOOD,
            _ => BlockType::DIRT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_from_id() {
        for id in 0..=8u8 {
            let block_type = BlockType::from_id(id).unwrap();
            assert_eq!(block_type.id(), id);
        }
        assert_eq!(BlockType::from_id(9), None);
    }

    #[test]
    fn material_classes() {
        assert!(!BlockType::AIR.is_solid());
        assert!(BlockType::AIR.is_transparent());
        assert!(BlockType::STONE.is_opaque());
        assert!(BlockType::GLASS.is_solid());
        assert!(!BlockType::GLASS.is_opaque());
    }

    #[test]
    fn grass_uses_distinct_cap_textures() {
        let top = BlockType::GRASS.texture_layer(BlockSide::TOP);
        let bottom = BlockType::GRASS.texture_layer(BlockSide::BOTTOM);
        let side = BlockType::GRASS.texture_layer(BlockSide::FRONT);
        assert_ne!(top, side);
        assert_eq!(bottom, BlockType::DIRT.texture_layer(BlockSide::TOP));
    }
}
