//! # Terrain Generation
//!
//! Chunks that have never been saved, or whose saved record is corrupt, are generated.
//! Generation is deterministic for a given method, seed and coordinate, so a chunk that is
//! unloaded without edits comes back identical.
//!
//! Stored sky-light is filled per column from the top of the chunk down to the first opaque
//! block. Light does not propagate between chunks.

use cgmath::Point3;
use noise::{NoiseFn, Perlin};

use crate::config::{GenerationMethod, GenerationOptions};
use crate::error::GenerationError;

use super::block::{block_type::BlockType, Voxel, MAX_LIGHT};
use super::chunk::{chunk_creation::ChunkCreationIterator, ChunkData, CHUNK_DIMENSION};
use super::ChunkCoord;

/// Threshold above which Perlin noise is considered solid for terrain generation.
pub const PERLIN_POSITIVE_THRESHOLD: f64 = 0.2;
/// Threshold below which Perlin noise is considered solid for terrain generation.
pub const PERLIN_NEGATIVE_THRESHOLD: f64 = -0.2;
/// Scaling factor applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;

/// Produces block data for chunks with no saved record.
pub trait ChunkGenerator: Send {
    /// Generates the chunk at `coord`.
    fn generate(&self, coord: ChunkCoord) -> Result<ChunkData, GenerationError>;
}

/// The built-in generators, selected by [`GenerationMethod`].
pub struct TerrainGenerator {
    method: GenerationMethod,
    seed: u32,
    surface_height: i32,
    perlin: Perlin,
}

impl TerrainGenerator {
    /// Creates a generator from the session's generation options.
    pub fn new(options: &GenerationOptions) -> Self {
        Self {
            method: options.method,
            seed: options.seed,
            surface_height: options.surface_height,
            perlin: Perlin::new(options.seed),
        }
    }

    /// World position of the chunk's minimum corner block, if representable.
    fn block_origin(coord: ChunkCoord) -> Result<Point3<i32>, GenerationError> {
        let axis = |c: i32| {
            c.checked_mul(CHUNK_DIMENSION)
                .filter(|origin| origin.checked_add(CHUNK_DIMENSION - 1).is_some())
        };
        match (axis(coord.x), axis(coord.y), axis(coord.z)) {
            (Some(x), Some(y), Some(z)) => Ok(Point3::new(x, y, z)),
            _ => Err(GenerationError::OutOfRange(coord)),
        }
    }

    /// Per-chunk random stream so block variety does not depend on load order.
    fn chunk_rng(&self, coord: ChunkCoord) -> fastrand::Rng {
        let seed = (coord.x as i64 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (coord.y as i64 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
            ^ (coord.z as i64 as u64).wrapping_mul(0x1656_67B1_9E37_79F9)
            ^ u64::from(self.seed);
        fastrand::Rng::with_seed(seed)
    }

    fn perlin(&self, coord: ChunkCoord, origin: Point3<i32>) -> ChunkData {
        let mut rng = self.chunk_rng(coord);
        let mut cci = ChunkCreationIterator::new();

        for k in 0..CHUNK_DIMENSION {
            for j in 0..CHUNK_DIMENSION {
                for i in 0..CHUNK_DIMENSION {
                    let sample = self.perlin.get([
                        f64::from(origin.x + i) * PERLIN_SCALE_FACTOR,
                        f64::from(origin.y + j) * PERLIN_SCALE_FACTOR,
                        f64::from(origin.z + k) * PERLIN_SCALE_FACTOR,
                    ]);
                    if (PERLIN_NEGATIVE_THRESHOLD..=PERLIN_POSITIVE_THRESHOLD).contains(&sample) {
                        cci.push_voxel(Voxel::AIR);
                    } else {
                        cci.push_voxel(Voxel::new(BlockType::random_ground(&mut rng)));
                    }
                }
            }
        }

        let mut data = cci.return_chunk();
        Self::grow_grass(&mut data);
        data
    }

    fn flat(&self, origin: Point3<i32>) -> ChunkData {
        let mut cci = ChunkCreationIterator::new();
        for _k in 0..CHUNK_DIMENSION {
            for j in 0..CHUNK_DIMENSION {
                let depth = self.surface_height - (origin.y + j);
                let voxel = match depth {
                    d if d <= 0 => Voxel::AIR,
                    1 => Voxel::new(BlockType::GRASS),
                    2..=4 => Voxel::new(BlockType::DIRT),
                    _ => Voxel::new(BlockType::STONE),
                };
                for _i in 0..CHUNK_DIMENSION {
                    cci.push_voxel(voxel);
                }
            }
        }
        cci.return_chunk()
    }

    fn checkerboard() -> ChunkData {
        let mut cci = ChunkCreationIterator::new();
        for k in 0..CHUNK_DIMENSION {
            for j in 0..CHUNK_DIMENSION {
                for i in 0..CHUNK_DIMENSION {
                    if (i + j + k) % 2 == 0 {
                        cci.push_voxel(Voxel::new(BlockType::DIRT));
                    } else {
                        cci.push_voxel(Voxel::AIR);
                    }
                }
            }
        }
        cci.return_chunk()
    }

    /// Turns dirt with air directly above it (inside the chunk) into grass.
    fn grow_grass(data: &mut ChunkData) {
        let d = CHUNK_DIMENSION as usize;
        for z in 0..d {
            for x in 0..d {
                for y in 0..d - 1 {
                    if data.get(x, y, z).block_type() == BlockType::DIRT
                        && !data.get(x, y + 1, z).is_solid()
                    {
                        data.set(x, y, z, Voxel::new(BlockType::GRASS));
                    }
                }
            }
        }
    }

    /// Full sky-light above the first opaque block of each column, darkness below it.
    fn fill_sky_light(data: &mut ChunkData) {
        let d = CHUNK_DIMENSION as usize;
        for z in 0..d {
            for x in 0..d {
                let mut sky = MAX_LIGHT;
                for y in (0..d).rev() {
                    let voxel = data.get(x, y, z);
                    if voxel.is_opaque() {
                        sky = 0;
                    }
                    data.set(x, y, z, voxel.with_sky_light(sky));
                }
            }
        }
    }
}

impl ChunkGenerator for TerrainGenerator {
    fn generate(&self, coord: ChunkCoord) -> Result<ChunkData, GenerationError> {
        let origin = Self::block_origin(coord)?;
        let mut data = match self.method {
            GenerationMethod::Perlin => self.perlin(coord, origin),
            GenerationMethod::Checkerboard => Self::checkerboard(),
            GenerationMethod::Solid => ChunkData::filled(Voxel::new(BlockType::DIRT)),
            GenerationMethod::Flat => self.flat(origin),
            GenerationMethod::Empty => ChunkData::empty(),
        };
        Self::fill_sky_light(&mut data);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(method: GenerationMethod) -> TerrainGenerator {
        TerrainGenerator::new(&GenerationOptions {
            method,
            seed: 7,
            surface_height: 4,
        })
    }

    #[test]
    fn perlin_generation_is_deterministic() {
        let generator = generator(GenerationMethod::Perlin);
        let coord = Point3::new(3, -1, 2);
        assert_eq!(
            generator.generate(coord).unwrap(),
            generator.generate(coord).unwrap()
        );
    }

    #[test]
    fn flat_surface_sits_at_the_configured_height() {
        let data = generator(GenerationMethod::Flat)
            .generate(Point3::new(0, 0, 0))
            .unwrap();

        assert_eq!(data.get(5, 3, 5).block_type(), BlockType::GRASS);
        assert_eq!(data.get(5, 2, 5).block_type(), BlockType::DIRT);
        assert_eq!(data.get(5, 4, 5).block_type(), BlockType::AIR);
        assert_eq!(data.get(5, 4, 5).sky_light(), MAX_LIGHT);
        assert_eq!(data.get(5, 2, 5).sky_light(), 0);
    }

    #[test]
    fn chunks_below_a_flat_surface_are_solid() {
        let data = generator(GenerationMethod::Flat)
            .generate(Point3::new(0, -2, 0))
            .unwrap();
        assert_eq!(data.solid_count(), CHUNK_DIMENSION.pow(3) as u32);
    }

    #[test]
    fn empty_chunks_are_fully_sky_lit() {
        let data = generator(GenerationMethod::Empty)
            .generate(Point3::new(0, 0, 0))
            .unwrap();
        assert!(data.is_empty());
        assert_eq!(data.get(0, 0, 0).sky_light(), MAX_LIGHT);
    }

    #[test]
    fn checkerboard_alternates() {
        let data = generator(GenerationMethod::Checkerboard)
            .generate(Point3::new(0, 0, 0))
            .unwrap();
        assert!(data.get(0, 0, 0).is_solid());
        assert!(!data.get(1, 0, 0).is_solid());
        assert!(!data.get(0, 1, 0).is_solid());
        assert!(data.get(1, 1, 0).is_solid());
    }

    #[test]
    fn coordinates_beyond_i32_blocks_fail() {
        let err = generator(GenerationMethod::Solid)
            .generate(Point3::new(i32::MAX / 8, 0, 0))
            .unwrap_err();
        assert!(matches!(err, GenerationError::OutOfRange(_)));
    }
}
