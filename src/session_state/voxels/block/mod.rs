//! # Block Module
//!
//! Block types, block faces and the per-cell [`Voxel`] record stored in chunks.

use block_type::BlockType;

pub mod block_side;
pub mod block_type;

/// The underlying integer type used to store block type ids.
pub type BlockTypeSize = u8;

/// Highest block-light or sky-light level.
pub const MAX_LIGHT: u8 = 15;

/// One cell of a chunk: a block id and its stored light.
///
/// # Memory Layout
/// `light` packs block-light in the low nibble and sky-light in the high nibble, so a voxel
/// is two bytes and a chunk's grid can be copied or serialized as plain bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Voxel {
    /// Block type id.
    pub block: BlockTypeSize,
    /// Packed light levels.
    pub light: u8,
}

impl Voxel {
    /// Unlit air.
    pub const AIR: Voxel = Voxel { block: 0, light: 0 };

    /// A voxel of `block_type` with no stored light.
    pub fn new(block_type: BlockType) -> Self {
        Voxel {
            block: block_type.id(),
            light: 0,
        }
    }

    /// A voxel of `block_type` with the given light levels, each clamped to [`MAX_LIGHT`].
    pub fn lit(block_type: BlockType, block_light: u8, sky_light: u8) -> Self {
        Voxel {
            block: block_type.id(),
            light: (sky_light.min(MAX_LIGHT) << 4) | block_light.min(MAX_LIGHT),
        }
    }

    /// The block type. Ids are validated when chunk data is built, so an unknown id can only
    /// come from a hand-built voxel and reads as air.
    pub fn block_type(self) -> BlockType {
        BlockType::from_id(self.block).unwrap_or(BlockType::AIR)
    }

    /// Light emitted by nearby blocks.
    pub fn block_light(self) -> u8 {
        self.light & 0x0F
    }

    /// Light from the sky.
    pub fn sky_light(self) -> u8 {
        self.light >> 4
    }

    /// The brighter of the two light channels.
    pub fn light_level(self) -> u8 {
        self.block_light().max(self.sky_light())
    }

    /// Copy of this voxel with new sky-light.
    pub fn with_sky_light(self, sky_light: u8) -> Self {
        Voxel {
            block: self.block,
            light: (sky_light.min(MAX_LIGHT) << 4) | self.block_light(),
        }
    }

    /// Whether the block hides faces behind it.
    pub fn is_opaque(self) -> bool {
        self.block_type().is_opaque()
    }

    /// Whether the cell holds anything but air.
    pub fn is_solid(self) -> bool {
        self.block_type().is_solid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_channels_are_packed_independently() {
        let voxel = Voxel::lit(BlockType::AIR, 3, 12);
        assert_eq!(voxel.block_light(), 3);
        assert_eq!(voxel.sky_light(), 12);
        assert_eq!(voxel.light_level(), 12);

        let dimmed = voxel.with_sky_light(1);
        assert_eq!(dimmed.block_light(), 3);
        assert_eq!(dimmed.light_level(), 3);
    }

    #[test]
    fn light_is_clamped() {
        let voxel = Voxel::lit(BlockType::GLASS, 200, 99);
        assert_eq!(voxel.block_light(), MAX_LIGHT);
        assert_eq!(voxel.sky_light(), MAX_LIGHT);
    }

    #[test]
    fn voxel_is_two_plain_bytes() {
        let voxels = [Voxel::new(BlockType::STONE), Voxel::lit(BlockType::AIR, 1, 2)];
        let bytes: &[u8] = bytemuck::cast_slice(&voxels);
        assert_eq!(bytes, &[5, 0, 0, 0x21]);
    }
}
