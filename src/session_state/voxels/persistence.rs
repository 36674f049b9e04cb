//! # Chunk Persistence
//!
//! The chunk store loads chunks through [`ChunkPersistence`] before falling back to
//! generation, and saves edited chunks back when they are unloaded or when the session shuts
//! down. Records are JSON documents holding the block ids and packed light of every cell.

use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

use super::block::Voxel;
use super::chunk::ChunkData;
use super::ChunkCoord;

/// Version written into every record.
pub const CHUNK_RECORD_VERSION: u32 = 1;

/// World save storage.
pub trait ChunkPersistence: Send {
    /// Loads a saved chunk.
    ///
    /// # Returns
    /// - `Ok(Some(data))` for a saved chunk
    /// - `Ok(None)` when the chunk was never saved
    /// - `Err(PersistenceError::Unavailable)` when storage could not be read (retried later)
    /// - `Err(PersistenceError::Corrupt)` when the record cannot be decoded
    fn load_chunk(&mut self, coord: ChunkCoord) -> Result<Option<ChunkData>, PersistenceError>;

    /// Saves a chunk, replacing any earlier record.
    fn save_chunk(&mut self, coord: ChunkCoord, data: &ChunkData) -> Result<(), PersistenceError>;
}

/// Serialized form of one chunk.
#[derive(Debug, Serialize, Deserialize)]
struct ChunkRecord {
    version: u32,
    blocks: Vec<u8>,
    light: Vec<u8>,
}

impl ChunkRecord {
    fn from_data(data: &ChunkData) -> Self {
        Self {
            version: CHUNK_RECORD_VERSION,
            blocks: data.voxels().iter().map(|voxel| voxel.block).collect(),
            light: data.voxels().iter().map(|voxel| voxel.light).collect(),
        }
    }

    fn into_data(self, coord: ChunkCoord) -> Result<ChunkData, PersistenceError> {
        let corrupt = |reason: String| PersistenceError::Corrupt { coord, reason };
        if self.version != CHUNK_RECORD_VERSION {
            return Err(corrupt(format!("unsupported record version {}", self.version)));
        }
        if self.blocks.len() != self.light.len() {
            return Err(corrupt(format!(
                "{} block ids but {} light values",
                self.blocks.len(),
                self.light.len()
            )));
        }
        let voxels = self
            .blocks
            .into_iter()
            .zip(self.light)
            .map(|(block, light)| Voxel { block, light })
            .collect();
        ChunkData::from_voxels(voxels)
            .ok_or_else(|| corrupt("wrong cell count or unknown block id".to_string()))
    }
}

fn encode(data: &ChunkData) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(&ChunkRecord::from_data(data))
        .map_err(|err| PersistenceError::Unavailable(err.into()))
}

fn decode(coord: ChunkCoord, bytes: &[u8]) -> Result<ChunkData, PersistenceError> {
    let record: ChunkRecord =
        serde_json::from_slice(bytes).map_err(|err| PersistenceError::Corrupt {
            coord,
            reason: err.to_string(),
        })?;
    record.into_data(coord)
}

/// Keeps encoded records in memory. Used for sessions without a world directory and in tests.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    records: HashMap<ChunkCoord, Vec<u8>>,
}

impl MemoryPersistence {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes as the record for `coord`.
    pub fn insert_raw(&mut self, coord: ChunkCoord, bytes: Vec<u8>) {
        self.records.insert(coord, bytes);
    }

    /// Whether a record exists for `coord`.
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.records.contains_key(&coord)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been saved.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ChunkPersistence for MemoryPersistence {
    fn load_chunk(&mut self, coord: ChunkCoord) -> Result<Option<ChunkData>, PersistenceError> {
        self.records
            .get(&coord)
            .map(|bytes| decode(coord, bytes))
            .transpose()
    }

    fn save_chunk(&mut self, coord: ChunkCoord, data: &ChunkData) -> Result<(), PersistenceError> {
        let bytes = encode(data)?;
        self.records.insert(coord, bytes);
        Ok(())
    }
}

/// One JSON file per chunk under a world directory.
#[derive(Debug)]
pub struct DiskPersistence {
    root: PathBuf,
}

impl DiskPersistence {
    /// Stores chunks under `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// World directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.root
            .join(format!("c.{}.{}.{}.json", coord.x, coord.y, coord.z))
    }
}

impl ChunkPersistence for DiskPersistence {
    fn load_chunk(&mut self, coord: ChunkCoord) -> Result<Option<ChunkData>, PersistenceError> {
        match fs::read(self.chunk_path(coord)) {
            Ok(bytes) => decode(coord, &bytes).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save_chunk(&mut self, coord: ChunkCoord, data: &ChunkData) -> Result<(), PersistenceError> {
        let path = self.chunk_path(coord);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, encode(data)?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }
}
