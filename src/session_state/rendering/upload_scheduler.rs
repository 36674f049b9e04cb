//! # Upload Scheduler
//!
//! Moves finished mesh batches from the workers to GPU buffers, a bounded number per tick,
//! and releases buffers when chunks unload.
//!
//! ## Queue Semantics
//!
//! The pending queue holds at most one batch per chunk. Submitting a newer generation for
//! a chunk that is already queued replaces the older batch in place, so the chunk keeps its
//! position in the FIFO order. When the queue is full the batch is rejected and the caller
//! marks the chunk for a rebuild.
//!
//! ## Buffer Reuse
//!
//! Each chunk owns one vertex/index buffer pair sized for a power-of-two number of quads.
//! A new mesh that fits is written into the existing pair; a larger one frees it and
//! allocates a bigger pair.

use std::collections::VecDeque;

use log::{debug, trace};

use crate::error::{BackendError, SessionError};
use crate::session_state::rendering::backend::{BufferHandle, BufferLayout, DrawRegion, RenderBackend};
use crate::session_state::rendering::meshing::MeshBatch;
use crate::session_state::rendering::vertex::VERTEX_SIZE;
use crate::session_state::voxels::{chunk::Chunk, chunk_store::ChunkStore, ChunkCoord};

/// Smallest quad capacity allocated for a chunk.
pub const MIN_QUAD_CAPACITY: u32 = 16;

/// Vertices per quad.
pub const VERTICES_PER_QUAD: u64 = 4;

/// Indices per quad.
pub const INDICES_PER_QUAD: u64 = 6;

/// The GPU mesh owned by a loaded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGpuMesh {
    /// Buffer pair holding the mesh.
    pub handle: BufferHandle,
    /// Chunk generation the mesh was built from.
    pub generation: u64,
    /// Quads in the mesh.
    pub quad_count: u32,
    /// Indices of opaque quads, at the start of the index buffer.
    pub opaque_index_count: u32,
    /// All indices.
    pub index_count: u32,
    /// Quads the buffer pair can hold.
    pub quad_capacity: u32,
}

impl ChunkGpuMesh {
    /// Index range of the opaque quads, if any.
    pub fn opaque_region(&self) -> Option<DrawRegion> {
        (self.opaque_index_count > 0).then_some(DrawRegion {
            first_index: 0,
            index_count: self.opaque_index_count,
        })
    }

    /// Index range of the translucent quads, if any.
    pub fn translucent_region(&self) -> Option<DrawRegion> {
        (self.index_count > self.opaque_index_count).then_some(DrawRegion {
            first_index: self.opaque_index_count,
            index_count: self.index_count - self.opaque_index_count,
        })
    }
}

/// Buffer sizes for `quad_capacity` quads.
pub fn layout_for(quad_capacity: u32) -> BufferLayout {
    let quads = u64::from(quad_capacity);
    BufferLayout {
        vertex_bytes: quads * VERTICES_PER_QUAD * VERTEX_SIZE as u64,
        index_bytes: quads * INDICES_PER_QUAD * std::mem::size_of::<u32>() as u64,
    }
}

/// What [`UploadScheduler::submit`] did with a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Appended to the queue.
    Queued,
    /// Replaced an older pending batch for the same chunk, keeping its place in the queue.
    Replaced,
    /// Dropped because a newer batch for the chunk is already pending.
    Superseded,
    /// Dropped because the queue is full.
    Rejected,
}

/// Bounded queue of mesh batches waiting for upload.
#[derive(Debug)]
pub struct UploadScheduler {
    pending: VecDeque<MeshBatch>,
    capacity: usize,
    uploads_per_tick: usize,
    discarded: usize,
}

impl UploadScheduler {
    /// Creates a scheduler.
    ///
    /// # Arguments
    /// * `capacity` - Maximum pending batches
    /// * `uploads_per_tick` - Batches uploaded by each [`UploadScheduler::drain`]
    pub fn new(capacity: usize, uploads_per_tick: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            uploads_per_tick,
            discarded: 0,
        }
    }

    /// Queues a finished batch for upload.
    pub fn submit(&mut self, batch: MeshBatch) -> SubmitOutcome {
        if let Some(queued) = self.pending.iter_mut().find(|b| b.coord() == batch.coord()) {
            if queued.generation() >= batch.generation() {
                self.discarded += 1;
                return SubmitOutcome::Superseded;
            }
            *queued = batch;
            self.discarded += 1;
            return SubmitOutcome::Replaced;
        }
        if self.pending.len() >= self.capacity {
            return SubmitOutcome::Rejected;
        }
        self.pending.push_back(batch);
        SubmitOutcome::Queued
    }

    /// Uploads the oldest pending batch that still matches its chunk.
    ///
    /// Batches whose chunk has unloaded or moved on to a newer generation are discarded on
    /// the way.
    ///
    /// # Returns
    /// The uploaded quad count, or `None` when nothing applicable was pending.
    ///
    /// # Errors
    /// [`SessionError::Resource`] when the backend cannot allocate or write the buffer.
    pub fn drain_one(
        &mut self,
        store: &mut ChunkStore,
        backend: &mut impl RenderBackend,
    ) -> Result<Option<u32>, SessionError> {
        while let Some(batch) = self.pending.pop_front() {
            let coord = batch.coord();
            if !store.accepts_generation(coord, batch.generation()) {
                trace!("Discarding stale mesh for {:?} (generation {})", coord, batch.generation());
                self.discarded += 1;
                continue;
            }
            let Some(chunk) = store.get_mut(coord) else {
                continue;
            };
            upload(chunk, &batch, backend).map_err(|source| SessionError::Resource {
                coord: Some(coord),
                source,
            })?;
            return Ok(Some(batch.quad_count()));
        }
        Ok(None)
    }

    /// Performs up to the per-tick upload budget.
    ///
    /// # Returns
    /// The number of batches uploaded.
    pub fn drain(
        &mut self,
        store: &mut ChunkStore,
        backend: &mut impl RenderBackend,
    ) -> Result<usize, SessionError> {
        let mut uploaded = 0;
        while uploaded < self.uploads_per_tick {
            match self.drain_one(store, backend)? {
                Some(_) => uploaded += 1,
                None => break,
            }
        }
        Ok(uploaded)
    }

    /// Drops pending batches for `coord` and frees its buffer immediately.
    pub fn release(
        &mut self,
        coord: ChunkCoord,
        store: &mut ChunkStore,
        backend: &mut impl RenderBackend,
    ) {
        let mesh = store.get_mut(coord).and_then(|chunk| chunk.gpu_mesh.take());
        self.release_mesh(backend, coord, mesh);
    }

    /// Unload hook: drops pending batches for `coord` and frees `mesh`.
    pub fn release_mesh(
        &mut self,
        backend: &mut impl RenderBackend,
        coord: ChunkCoord,
        mesh: Option<ChunkGpuMesh>,
    ) {
        let before = self.pending.len();
        self.pending.retain(|batch| batch.coord() != coord);
        self.discarded += before - self.pending.len();
        if let Some(mesh) = mesh {
            backend.free_buffer(mesh.handle);
            trace!("Freed mesh buffer {:?} of {:?}", mesh.handle, coord);
        }
    }

    /// Drops every pending batch and frees every chunk buffer in the store.
    ///
    /// # Returns
    /// The number of buffers freed.
    pub fn release_all(&mut self, store: &mut ChunkStore, backend: &mut impl RenderBackend) -> usize {
        self.pending.clear();
        let meshes = store.take_all_meshes();
        for (_, mesh) in &meshes {
            backend.free_buffer(mesh.handle);
        }
        debug!("Released {} chunk buffers", meshes.len());
        meshes.len()
    }

    /// Batches waiting for upload.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a batch for `coord` is pending.
    pub fn is_pending(&self, coord: ChunkCoord) -> bool {
        self.pending.iter().any(|batch| batch.coord() == coord)
    }

    /// Maximum pending batches.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns and resets the number of batches dropped as stale or superseded.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }
}

/// Writes `batch` into the chunk's buffer pair, reallocating when it does not fit.
fn upload(
    chunk: &mut Chunk,
    batch: &MeshBatch,
    backend: &mut impl RenderBackend,
) -> Result<(), BackendError> {
    let quads = batch.quad_count();
    if quads == 0 {
        if let Some(old) = chunk.gpu_mesh.take() {
            backend.free_buffer(old.handle);
        }
        return Ok(());
    }

    let reusable = chunk
        .gpu_mesh
        .as_ref()
        .filter(|mesh| mesh.quad_capacity >= quads)
        .map(|mesh| (mesh.handle, mesh.quad_capacity));
    let (handle, quad_capacity) = match reusable {
        Some(existing) => existing,
        None => {
            if let Some(old) = chunk.gpu_mesh.take() {
                backend.free_buffer(old.handle);
            }
            let quad_capacity = quads.max(MIN_QUAD_CAPACITY).next_power_of_two();
            (backend.allocate_buffer(layout_for(quad_capacity))?, quad_capacity)
        }
    };

    chunk.gpu_mesh = Some(ChunkGpuMesh {
        handle,
        generation: batch.generation(),
        quad_count: quads,
        opaque_index_count: batch.opaque_index_count(),
        index_count: batch.indices().len() as u32,
        quad_capacity,
    });
    backend.update_buffer(handle, batch.vertex_bytes(), batch.index_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationMethod, GenerationOptions, SessionOptions};
    use crate::session_state::rendering::backend::HeadlessBackend;
    use crate::session_state::rendering::vertex::Vertex;
    use crate::session_state::voxels::{generation::TerrainGenerator, persistence::MemoryPersistence};
    use bytemuck::Zeroable;
    use cgmath::Point3;

    const A: ChunkCoord = Point3 { x: 0, y: 0, z: 0 };
    const B: ChunkCoord = Point3 { x: 1, y: 0, z: 0 };

    fn store_with(coords: &[ChunkCoord]) -> ChunkStore {
        let generator = TerrainGenerator::new(&GenerationOptions {
            method: GenerationMethod::Empty,
            ..GenerationOptions::default()
        });
        let mut store = ChunkStore::new(
            &SessionOptions::default(),
            Box::new(MemoryPersistence::new()),
            Box::new(generator),
        );
        for coord in coords {
            store.request(*coord);
        }
        store.tick(|_, _| {}).unwrap();
        store
    }

    fn batch(coord: ChunkCoord, generation: u64, quads: u32) -> MeshBatch {
        let vertices = vec![Vertex::zeroed(); quads as usize * 4];
        let indices = (0..quads).flat_map(|q| {
            let base = q * 4;
            [base, base + 1, base + 2, base, base + 2, base + 3]
        });
        MeshBatch::new(coord, generation, vertices, indices.collect(), Vec::new())
    }

    fn current(store: &ChunkStore, coord: ChunkCoord, quads: u32) -> MeshBatch {
        batch(coord, store.get(coord).unwrap().generation(), quads)
    }

    #[test]
    fn newer_generation_replaces_pending_batch_in_place() {
        let mut scheduler = UploadScheduler::new(4, 1);
        assert_eq!(scheduler.submit(batch(A, 1, 1)), SubmitOutcome::Queued);
        assert_eq!(scheduler.submit(batch(B, 2, 1)), SubmitOutcome::Queued);
        assert_eq!(scheduler.submit(batch(A, 3, 1)), SubmitOutcome::Replaced);
        assert_eq!(scheduler.submit(batch(A, 2, 1)), SubmitOutcome::Superseded);

        assert_eq!(scheduler.pending_count(), 2);
        assert_eq!(scheduler.pending[0].coord(), A);
        assert_eq!(scheduler.pending[0].generation(), 3);
        assert_eq!(scheduler.take_discarded(), 2);
    }

    #[test]
    fn full_queue_rejects_new_chunks() {
        let mut scheduler = UploadScheduler::new(1, 1);
        assert_eq!(scheduler.submit(batch(A, 1, 1)), SubmitOutcome::Queued);
        assert_eq!(scheduler.submit(batch(B, 1, 1)), SubmitOutcome::Rejected);
        assert_eq!(scheduler.submit(batch(A, 2, 1)), SubmitOutcome::Replaced);
    }

    #[test]
    fn stale_batches_are_skipped() {
        let mut store = store_with(&[A]);
        let mut backend = HeadlessBackend::new();
        let mut scheduler = UploadScheduler::new(8, 4);
        let generation = store.get(A).unwrap().generation();

        scheduler.submit(batch(B, 1, 2));
        scheduler.submit(batch(A, generation + 100, 2));
        assert_eq!(scheduler.drain_one(&mut store, &mut backend).unwrap(), None);
        assert_eq!(scheduler.take_discarded(), 2);
        assert_eq!(backend.live_buffer_count(), 0);

        scheduler.submit(batch(A, generation, 3));
        assert_eq!(scheduler.drain_one(&mut store, &mut backend).unwrap(), Some(3));
        let mesh = store.get(A).unwrap().gpu_mesh().unwrap().clone();
        assert_eq!(mesh.generation, generation);
        assert_eq!(mesh.quad_count, 3);
        assert_eq!(mesh.quad_capacity, MIN_QUAD_CAPACITY);
        assert_eq!(mesh.index_count, 18);
        assert_eq!(backend.buffer(mesh.handle).unwrap().layout, layout_for(16));
    }

    #[test]
    fn buffers_are_reused_until_outgrown() {
        let mut store = store_with(&[A]);
        let mut backend = HeadlessBackend::new();
        let mut scheduler = UploadScheduler::new(8, 4);

        scheduler.submit(current(&store, A, 10));
        scheduler.drain(&mut store, &mut backend).unwrap();
        let first = store.get(A).unwrap().gpu_mesh().unwrap().handle;

        assert!(store.mark_dirty(A));
        scheduler.submit(current(&store, A, 16));
        scheduler.drain(&mut store, &mut backend).unwrap();
        assert_eq!(store.get(A).unwrap().gpu_mesh().unwrap().handle, first);
        assert_eq!(backend.buffer(first).unwrap().times_written, 2);

        assert!(store.mark_dirty(A));
        scheduler.submit(current(&store, A, 17));
        scheduler.drain(&mut store, &mut backend).unwrap();
        let grown = store.get(A).unwrap().gpu_mesh().unwrap().clone();
        assert_ne!(grown.handle, first);
        assert_eq!(grown.quad_capacity, 32);
        assert!(backend.buffer(first).is_none());
        assert_eq!(backend.live_buffer_count(), 1);
    }

    #[test]
    fn empty_mesh_frees_the_buffer() {
        let mut store = store_with(&[A]);
        let mut backend = HeadlessBackend::new();
        let mut scheduler = UploadScheduler::new(8, 4);

        scheduler.submit(current(&store, A, 4));
        scheduler.drain(&mut store, &mut backend).unwrap();
        assert_eq!(backend.live_buffer_count(), 1);

        assert!(store.mark_dirty(A));
        scheduler.submit(current(&store, A, 0));
        assert_eq!(scheduler.drain_one(&mut store, &mut backend).unwrap(), Some(0));
        assert!(store.get(A).unwrap().gpu_mesh().is_none());
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn drain_respects_the_per_tick_budget() {
        let mut store = store_with(&[A, B]);
        let mut backend = HeadlessBackend::new();
        let mut scheduler = UploadScheduler::new(8, 1);

        scheduler.submit(current(&store, B, 1));
        scheduler.submit(current(&store, A, 1));
        assert_eq!(scheduler.drain(&mut store, &mut backend).unwrap(), 1);
        assert!(store.get(B).unwrap().gpu_mesh().is_some());
        assert!(scheduler.is_pending(A));
        assert_eq!(scheduler.drain(&mut store, &mut backend).unwrap(), 1);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn allocation_failure_is_a_resource_error() {
        let mut store = store_with(&[A]);
        let mut backend = HeadlessBackend::with_memory_budget(64);
        let mut scheduler = UploadScheduler::new(8, 4);

        scheduler.submit(current(&store, A, 1));
        match scheduler.drain(&mut store, &mut backend) {
            Err(SessionError::Resource { coord, source }) => {
                assert_eq!(coord, Some(A));
                assert!(matches!(source, BackendError::AllocationFailed { .. }));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn release_frees_buffer_and_drops_pending_batches() {
        let mut store = store_with(&[A]);
        let mut backend = HeadlessBackend::new();
        let mut scheduler = UploadScheduler::new(8, 4);

        scheduler.submit(current(&store, A, 2));
        scheduler.drain(&mut store, &mut backend).unwrap();
        assert!(store.mark_dirty(A));
        scheduler.submit(current(&store, A, 2));

        scheduler.release(A, &mut store, &mut backend);
        assert_eq!(backend.live_buffer_count(), 0);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(store.get(A).unwrap().gpu_mesh().is_none());
    }

    #[test]
    fn translucent_region_follows_opaque_region() {
        let mesh = ChunkGpuMesh {
            handle: BufferHandle::new(1),
            generation: 1,
            quad_count: 3,
            opaque_index_count: 12,
            index_count: 18,
            quad_capacity: 16,
        };
        assert_eq!(
            mesh.opaque_region(),
            Some(DrawRegion {
                first_index: 0,
                index_count: 12
            })
        );
        assert_eq!(
            mesh.translucent_region(),
            Some(DrawRegion {
                first_index: 12,
                index_count: 6
            })
        );
    }
}
