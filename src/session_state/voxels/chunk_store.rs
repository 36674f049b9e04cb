//! # Chunk Store
//!
//! Owns every loaded chunk and streams chunks in and out as the session requests and
//! releases coordinates.
//!
//! ## Lifecycle
//!
//! 1. `request` marks a coordinate as wanted. Nothing is loaded until the next `tick`.
//! 2. `tick` loads (or generates) wanted chunks, nearest to the camera chunk first, and
//!    reports every dirty chunk so the session can schedule mesh builds.
//! 3. `release` marks a coordinate as no longer wanted. The chunk stays resident while it is
//!    within the retention margin of the camera chunk, so walking back and forth across a
//!    chunk border does not reload and remesh the same chunks.
//! 4. A later `tick` unloads released chunks outside the margin (or beyond the retained
//!    chunk cap), handing their GPU mesh to the upload scheduler and saving edited data.
//!
//! ## Generations
//!
//! Every change to what a chunk's mesh would look like stamps the chunk with a fresh value
//! from a store-wide counter: loading it, editing one of its blocks, and loading or editing
//! a face-adjacent neighbour. Mesh results carry the generation they were built from, and
//! anything that no longer matches is thrown away.

use std::collections::{HashMap, HashSet};

use cgmath::Point3;
use log::{debug, error, trace, warn};
use lru::LruCache;

use crate::config::SessionOptions;
use crate::core::MtResource;
use crate::error::{PersistenceError, SessionError};
use crate::session_state::rendering::upload_scheduler::ChunkGpuMesh;

use super::block::{block_side::BlockSide, block_type::BlockType, Voxel};
use super::chunk::{chunk_of_block, local_of_block, Chunk, ChunkData, CHUNK_DIMENSION};
use super::generation::ChunkGenerator;
use super::persistence::ChunkPersistence;
use super::{chunk_distance, nearest_first_key, ChunkCoord};

/// What a [`ChunkStore::tick`] did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Chunks loaded or generated this tick.
    pub loaded: Vec<ChunkCoord>,
    /// Chunks unloaded this tick.
    pub unloaded: Vec<ChunkCoord>,
    /// Coordinates whose load failed transiently; they are retried next tick.
    pub retried: Vec<ChunkCoord>,
    /// Coordinates whose saved record was corrupt and which were generated fresh.
    pub recovered: Vec<(ChunkCoord, PersistenceError)>,
    /// Dirty loaded chunks, nearest to the camera chunk first.
    pub needs_mesh: Vec<ChunkCoord>,
}

/// The mapping from chunk coordinate to loaded chunk.
pub struct ChunkStore {
    chunks: HashMap<ChunkCoord, Chunk>,
    wanted: HashSet<ChunkCoord>,
    /// Loaded chunks that are no longer wanted, least recently released first.
    released: LruCache<ChunkCoord, ()>,
    center: ChunkCoord,
    last_generation: u64,
    retention_margin: u32,
    max_retained: usize,
    max_loads_per_tick: usize,
    persistence: Box<dyn ChunkPersistence>,
    generator: Box<dyn ChunkGenerator>,
}

impl ChunkStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `options` - Supplies the retention margin, retained chunk cap and load budget
    /// * `persistence` - Where chunks are loaded from and saved to
    /// * `generator` - Produces chunks that were never saved
    pub fn new(
        options: &SessionOptions,
        persistence: Box<dyn ChunkPersistence>,
        generator: Box<dyn ChunkGenerator>,
    ) -> Self {
        Self {
            chunks: HashMap::new(),
            wanted: HashSet::new(),
            released: LruCache::unbounded(),
            center: Point3::new(0, 0, 0),
            last_generation: 0,
            retention_margin: options.chunk_retention_margin.max(0).unsigned_abs(),
            max_retained: options.max_retained_chunks,
            max_loads_per_tick: options.max_loads_per_tick,
            persistence,
            generator,
        }
    }

    /// Marks `coord` as wanted. Requesting a wanted coordinate does nothing.
    pub fn request(&mut self, coord: ChunkCoord) {
        self.wanted.insert(coord);
        self.released.pop(&coord);
    }

    /// Marks `coord` as no longer wanted.
    ///
    /// A coordinate that was never loaded is forgotten outright, so it is never loaded,
    /// meshed or uploaded.
    pub fn release(&mut self, coord: ChunkCoord) {
        if self.wanted.remove(&coord) && self.chunks.contains_key(&coord) {
            self.released.put(coord, ());
        }
    }

    /// Sets the camera chunk used for load order and retention.
    pub fn set_center(&mut self, center: ChunkCoord) {
        self.center = center;
    }

    /// The camera chunk.
    pub fn center(&self) -> ChunkCoord {
        self.center
    }

    /// Unloads released chunks, loads wanted ones, and reports chunks needing a mesh build.
    ///
    /// # Arguments
    /// * `on_unload` - Receives each unloaded chunk's GPU mesh before the chunk is dropped
    ///
    /// # Errors
    /// [`SessionError::Generation`] when a chunk cannot be generated. Load failures are not
    /// errors: transient ones are retried next tick and corrupt records are regenerated.
    pub fn tick(
        &mut self,
        mut on_unload: impl FnMut(ChunkCoord, Option<ChunkGpuMesh>),
    ) -> Result<TickReport, SessionError> {
        let mut report = TickReport::default();
        self.unload_released(&mut on_unload, &mut report);
        self.load_wanted(&mut report)?;
        report.needs_mesh = self.dirty_coords();
        Ok(report)
    }

    fn unload_released(
        &mut self,
        on_unload: &mut impl FnMut(ChunkCoord, Option<ChunkGpuMesh>),
        report: &mut TickReport,
    ) {
        let center = self.center;
        let margin = self.retention_margin;
        let beyond_margin: Vec<ChunkCoord> = self
            .released
            .iter()
            .map(|(coord, _)| *coord)
            .filter(|coord| chunk_distance(*coord, center) > margin)
            .collect();

        for coord in beyond_margin {
            self.released.pop(&coord);
            self.unload(coord, on_unload, report);
        }

        while self.released.len() > self.max_retained {
            match self.released.pop_lru() {
                Some((coord, ())) => self.unload(coord, on_unload, report),
                None => break,
            }
        }
    }

    fn unload(
        &mut self,
        coord: ChunkCoord,
        on_unload: &mut impl FnMut(ChunkCoord, Option<ChunkGpuMesh>),
        report: &mut TickReport,
    ) {
        let Some(mut chunk) = self.chunks.remove(&coord) else {
            return;
        };
        chunk.loaded = false;
        on_unload(coord, chunk.gpu_mesh.take());

        if chunk.modified {
            if let Err(err) = self.persistence.save_chunk(coord, &chunk.data().get()) {
                error!("Failed to save chunk {:?} on unload: {}", coord, err);
            }
        }
        trace!("Unloaded chunk {:?}", coord);
        report.unloaded.push(coord);
    }

    fn load_wanted(&mut self, report: &mut TickReport) -> Result<(), SessionError> {
        let mut pending: Vec<ChunkCoord> = self
            .wanted
            .iter()
            .filter(|coord| !self.chunks.contains_key(coord))
            .copied()
            .collect();
        let center = self.center;
        pending.sort_by_key(|coord| nearest_first_key(center, *coord));

        for coord in pending.into_iter().take(self.max_loads_per_tick) {
            let (data, modified) = match self.persistence.load_chunk(coord) {
                Ok(Some(data)) => (data, false),
                Ok(None) => (self.generate(coord)?, false),
                Err(PersistenceError::Unavailable(err)) => {
                    debug!("Chunk {:?} could not be loaded, retrying: {}", coord, err);
                    report.retried.push(coord);
                    continue;
                }
                Err(err @ PersistenceError::Corrupt { .. }) => {
                    warn!("{}; generating chunk {:?} fresh", err, coord);
                    report.recovered.push((coord, err));
                    (self.generate(coord)?, true)
                }
            };
            self.insert_loaded(coord, data, modified);
            report.loaded.push(coord);
        }
        Ok(())
    }

    fn generate(&self, coord: ChunkCoord) -> Result<ChunkData, SessionError> {
        self.generator
            .generate(coord)
            .map_err(|source| SessionError::Generation { coord, source })
    }

    fn insert_loaded(&mut self, coord: ChunkCoord, data: ChunkData, modified: bool) {
        self.last_generation += 1;
        let mut chunk = Chunk::new(coord, data, self.last_generation);
        chunk.modified = modified;
        self.chunks.insert(coord, chunk);

        for side in BlockSide::all() {
            self.mark_dirty(coord + side.normal());
        }
    }

    /// Gives a loaded chunk a fresh generation and marks it dirty.
    ///
    /// # Returns
    /// `false` if the chunk is not loaded.
    pub fn mark_dirty(&mut self, coord: ChunkCoord) -> bool {
        match self.chunks.get_mut(&coord) {
            Some(chunk) => {
                self.last_generation += 1;
                chunk.generation = self.last_generation;
                chunk.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Replaces the voxel at a world block position.
    ///
    /// The owning chunk gets a new generation and is marked dirty and modified. When the cell
    /// lies on a chunk face, the chunk across that face is marked dirty too, since its mesh
    /// culls faces against this cell.
    ///
    /// # Returns
    /// `false` if the owning chunk is not loaded or the voxel holds an unknown block id.
    #[must_use]
    pub fn set_block(&mut self, block: Point3<i32>, voxel: Voxel) -> bool {
        if BlockType::from_id(voxel.block).is_none() {
            warn!("Refusing edit at {:?}: unknown block id {}", block, voxel.block);
            return false;
        }
        let coord = chunk_of_block(block);
        let local = local_of_block(block);
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };

        chunk.data().get_mut().set(local.x, local.y, local.z, voxel);
        chunk.modified = true;
        self.mark_dirty(coord);

        let last = CHUNK_DIMENSION as usize - 1;
        let cell = [local.x, local.y, local.z];
        for side in BlockSide::all() {
            let on_face = if side.is_positive() {
                cell[side.axis()] == last
            } else {
                cell[side.axis()] == 0
            };
            if on_face {
                self.mark_dirty(coord + side.normal());
            }
        }
        true
    }

    /// The voxel at a world block position, if its chunk is loaded.
    pub fn voxel_at(&self, block: Point3<i32>) -> Option<Voxel> {
        let local = local_of_block(block);
        self.chunks
            .get(&chunk_of_block(block))
            .map(|chunk| chunk.data().get().get(local.x, local.y, local.z))
    }

    /// Dirty chunks, nearest to the camera chunk first.
    pub fn dirty_coords(&self) -> Vec<ChunkCoord> {
        let mut dirty: Vec<ChunkCoord> = self
            .chunks
            .values()
            .filter(|chunk| chunk.dirty)
            .map(Chunk::coord)
            .collect();
        let center = self.center;
        dirty.sort_by_key(|coord| nearest_first_key(center, *coord));
        dirty
    }

    /// Shared data of the six face-adjacent chunks, in [`BlockSide`] order.
    pub fn neighbor_data(&self, coord: ChunkCoord) -> [Option<MtResource<ChunkData>>; 6] {
        BlockSide::all().map(|side| {
            self.chunks
                .get(&(coord + side.normal()))
                .map(|chunk| chunk.data().clone())
        })
    }

    /// Clears the dirty flag once a build for the chunk's current generation is scheduled.
    pub(crate) fn mark_dispatched(&mut self, coord: ChunkCoord) {
        if let Some(chunk) = self.chunks.get_mut(&coord) {
            chunk.dirty = false;
        }
    }

    /// Marks the chunk dirty again without changing its generation.
    pub(crate) fn mark_for_rebuild(&mut self, coord: ChunkCoord) {
        if let Some(chunk) = self.chunks.get_mut(&coord) {
            chunk.dirty = true;
        }
    }

    /// Whether a mesh built from `generation` still describes the loaded chunk.
    pub fn accepts_generation(&self, coord: ChunkCoord, generation: u64) -> bool {
        self.chunks
            .get(&coord)
            .is_some_and(|chunk| chunk.loaded && chunk.generation == generation)
    }

    /// Saves every chunk edited since it was loaded or last saved.
    ///
    /// # Returns
    /// The number of chunks saved. Failures are logged and the chunk stays modified.
    pub fn save_all(&mut self) -> usize {
        let mut saved = 0;
        for (coord, chunk) in self.chunks.iter_mut().filter(|(_, chunk)| chunk.modified) {
            let result = self.persistence.save_chunk(*coord, &chunk.data().get());
            match result {
                Ok(()) => {
                    chunk.modified = false;
                    saved += 1;
                }
                Err(err) => error!("Failed to save chunk {:?}: {}", coord, err),
            }
        }
        saved
    }

    /// Takes every uploaded mesh out of the store.
    pub(crate) fn take_all_meshes(&mut self) -> Vec<(ChunkCoord, ChunkGpuMesh)> {
        self.chunks
            .iter_mut()
            .filter_map(|(coord, chunk)| chunk.gpu_mesh.take().map(|mesh| (*coord, mesh)))
            .collect()
    }

    /// The loaded chunk at `coord`.
    pub fn get(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    pub(crate) fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        self.chunks.get_mut(&coord)
    }

    /// Every loaded chunk, in no particular order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Number of loaded chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk is loaded.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether `coord` is currently wanted.
    pub fn is_wanted(&self, coord: ChunkCoord) -> bool {
        self.wanted.contains(&coord)
    }

    /// Wanted coordinates that are not loaded yet.
    pub fn pending_load_count(&self) -> usize {
        self.wanted
            .iter()
            .filter(|coord| !self.chunks.contains_key(coord))
            .count()
    }

    /// Released chunks still resident.
    pub fn retained_count(&self) -> usize {
        self.released.len()
    }

    /// Loaded chunks whose mesh is stale.
    pub fn dirty_count(&self) -> usize {
        self.chunks.values().filter(|chunk| chunk.dirty).count()
    }
}
