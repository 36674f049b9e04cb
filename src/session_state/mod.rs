//! # Session State Module
//!
//! The streaming and frame pacing core of a voxel-world client.
//!
//! ## Key Components
//!
//! * `SessionState` - Owns every subsystem and runs the per-tick pipeline
//! * `voxels` - Chunk data, terrain generation, persistence and the chunk store
//! * `rendering` - Meshing, uploads, visibility, frame sync and the renderer backend
//! * `camera_state` - Camera, projection and frustum
//! * `task_management` - The worker pool mesh builds run on
//!
//! ## Per-Tick Pipeline
//!
//! 1. Request the cube of chunks within the render distance of the camera chunk and release
//!    the ones that left it
//! 2. Unload released chunks outside the retention margin and load wanted ones
//! 3. Collect finished mesh builds, discarding stale generations
//! 4. Dispatch builds for dirty chunks whose six neighbours are loaded
//! 5. Upload a bounded number of finished meshes
//!
//! [`SessionState::render`] then draws the visible chunks and applies the frame-ahead bound.

use std::collections::HashSet;

use cgmath::{Deg, Point3};
use log::{debug, error, info, trace, warn};
use web_time::Duration;

use crate::config::SessionOptions;
use crate::error::SessionError;

pub mod camera_state;
pub mod rendering;
pub mod task_management;
pub mod voxels;

use camera_state::{
    camera::{Camera, Projection},
    CameraView,
};
use rendering::{
    backend::RenderBackend,
    frame_sync::FrameSyncGate,
    meshing::{BuildOutcome, MeshBuilder},
    tasks::mesh_build_task::{MeshBuildResult, MeshBuildTask},
    upload_scheduler::{SubmitOutcome, UploadScheduler, VERTICES_PER_QUAD},
    vertex::VERTEX_SIZE,
    visibility::{VisibilitySet, VisibleSet},
};
use task_management::TaskManager;
use voxels::{
    block::Voxel,
    chunk_store::ChunkStore,
    generation::{ChunkGenerator, TerrainGenerator},
    persistence::ChunkPersistence,
    ChunkCoord,
};

/// Vertical field of view of the default projection.
const DEFAULT_FOVY_DEGREES: f32 = 70.0;

/// Counters for the most recent tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Chunks loaded or generated.
    pub loaded: usize,
    /// Chunks unloaded.
    pub unloaded: usize,
    /// Corrupt chunks regenerated.
    pub recovered: usize,
    /// Mesh builds dispatched.
    pub dispatched: usize,
    /// Mesh builds deferred for missing neighbours.
    pub deferred: usize,
    /// Mesh builds that panicked and were rescheduled.
    pub failed: usize,
    /// Meshes uploaded.
    pub uploaded: usize,
    /// Mesh results and batches dropped as stale or superseded.
    pub discarded: usize,
}

/// A snapshot of the session for debug readouts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionStats {
    /// Loaded chunks.
    pub chunk_count: usize,
    /// Chunks drawn by the last frame.
    pub visible_chunk_count: usize,
    /// Quads across all uploaded meshes.
    pub total_quads: u64,
    /// Quads drawn by the last frame.
    pub visible_quads: u64,
    /// Meshes waiting for upload.
    pub pending_uploads: usize,
    /// Mesh builds running or queued on the workers.
    pub builds_in_flight: usize,
    /// Chunks whose mesh is stale.
    pub dirty_chunks: usize,
    /// Mesh builds dispatched since the session started.
    pub chunk_update_counter: u64,
    /// Frames submitted but not yet waited on.
    pub fences_in_flight: usize,
    /// Vertex data held by uploaded meshes, in MiB.
    pub vertex_mib: f64,
    /// Time accumulated by [`SessionState::tick`].
    pub elapsed: Duration,
    /// Counters of the most recent tick.
    pub last_tick: TickStats,
}

/// The state of one client session: the chunk store, the mesh pipeline, and the renderer
/// backend they feed.
///
/// Dropping the session runs [`SessionState::shutdown`].
pub struct SessionState<B: RenderBackend> {
    options: SessionOptions,
    backend: B,
    store: ChunkStore,
    builder: MeshBuilder,
    task_manager: TaskManager<MeshBuildResult>,
    uploads: UploadScheduler,
    frame_sync: FrameSyncGate,
    projection: Projection,
    view: Option<CameraView>,
    region_center: Option<ChunkCoord>,
    region: HashSet<ChunkCoord>,
    chunk_update_counter: u64,
    last_tick: TickStats,
    last_visible: (usize, u64),
    elapsed: Duration,
    shut_down: bool,
}

impl<B: RenderBackend> SessionState<B> {
    /// Creates a session that generates unsaved chunks with the configured terrain.
    ///
    /// # Errors
    /// [`SessionError::Config`] for invalid options, [`SessionError::Worker`] when the
    /// mesh workers cannot be started.
    pub fn new(
        options: SessionOptions,
        backend: B,
        persistence: Box<dyn ChunkPersistence>,
    ) -> Result<Self, SessionError> {
        let generator = TerrainGenerator::new(&options.generation);
        Self::with_generator(options, backend, persistence, Box::new(generator))
    }

    /// Creates a session with a custom chunk generator.
    pub fn with_generator(
        options: SessionOptions,
        backend: B,
        persistence: Box<dyn ChunkPersistence>,
        generator: Box<dyn ChunkGenerator>,
    ) -> Result<Self, SessionError> {
        options.validate()?;

        let workers = options.resolved_mesh_workers();
        let task_manager = TaskManager::new(workers).map_err(SessionError::Worker)?;
        let zfar = ((options.render_distance + 2) * 2 * voxels::chunk::CHUNK_DIMENSION) as f32;
        info!(
            "Starting session: {} mesh workers, render distance {}, {} frames ahead{}",
            workers,
            options.render_distance,
            options.max_frames_ahead,
            if options.eager_sync { " (eager sync)" } else { "" }
        );

        Ok(Self {
            store: ChunkStore::new(&options, persistence, generator),
            builder: MeshBuilder::new(options.smooth_lighting),
            task_manager,
            uploads: UploadScheduler::new(options.max_pending_uploads, options.uploads_per_tick),
            frame_sync: FrameSyncGate::new(options.eager_sync),
            projection: Projection::new(1280, 720, Deg(DEFAULT_FOVY_DEGREES), 0.1, zfar),
            view: None,
            region_center: None,
            region: HashSet::new(),
            chunk_update_counter: 0,
            last_tick: TickStats::default(),
            last_visible: (0, 0),
            elapsed: Duration::ZERO,
            shut_down: false,
            options,
            backend,
        })
    }

    /// Advances streaming, meshing and uploads by one tick.
    ///
    /// # Arguments
    /// * `dt` - Time since the previous tick
    /// * `camera` - The camera to stream around and to render from
    ///
    /// # Errors
    /// [`SessionError::Generation`] or [`SessionError::Resource`]; both leave the session
    /// unusable apart from [`SessionState::shutdown`].
    pub fn tick(&mut self, dt: Duration, camera: &Camera) -> Result<TickStats, SessionError> {
        self.elapsed += dt;
        self.view = Some(CameraView::new(camera, &self.projection));
        self.update_region(camera.chunk_coord());

        let mut stats = TickStats::default();
        let Self {
            store,
            uploads,
            backend,
            ..
        } = self;
        let report = store.tick(|coord, mesh| uploads.release_mesh(backend, coord, mesh))?;
        stats.loaded = report.loaded.len();
        stats.unloaded = report.unloaded.len();
        stats.recovered = report.recovered.len();

        self.collect_mesh_results(&mut stats);
        self.dispatch_mesh_builds(&mut stats);
        self.task_manager.process_queued_tasks();

        stats.uploaded = self.uploads.drain(&mut self.store, &mut self.backend)?;
        stats.discarded += self.uploads.take_discarded();

        if stats != TickStats::default() {
            trace!("Tick: {:?}", stats);
        }
        self.last_tick = stats;
        Ok(stats)
    }

    /// Requests the cube of chunks around `center` and releases chunks that left it.
    fn update_region(&mut self, center: ChunkCoord) {
        if self.region_center == Some(center) {
            return;
        }
        self.region_center = Some(center);
        self.store.set_center(center);

        let r = self.options.render_distance;
        let mut region = HashSet::new();
        for x in -r..=r {
            for y in -r..=r {
                for z in -r..=r {
                    region.insert(Point3::new(center.x + x, center.y + y, center.z + z));
                }
            }
        }
        for coord in self.region.difference(&region) {
            self.store.release(*coord);
        }
        for coord in region.difference(&self.region) {
            self.store.request(*coord);
        }
        debug!("Camera entered chunk {:?}", center);
        self.region = region;
    }

    fn collect_mesh_results(&mut self, stats: &mut TickStats) {
        for result in self.task_manager.collect_completed() {
            let coord = result.coord;
            if !self.store.accepts_generation(coord, result.generation) {
                stats.discarded += 1;
                continue;
            }
            match result.outcome {
                BuildOutcome::Deferred { missing } => {
                    debug!("Mesh for {:?} deferred, missing {:?}", coord, missing);
                    self.store.mark_for_rebuild(coord);
                    stats.deferred += 1;
                }
                BuildOutcome::Failed => {
                    warn!("Mesh build for {:?} failed, rebuilding", coord);
                    self.store.mark_for_rebuild(coord);
                    stats.failed += 1;
                }
                BuildOutcome::Built(batch) => match self.uploads.submit(batch) {
                    SubmitOutcome::Rejected => {
                        debug!("Upload queue full, rebuilding {:?} later", coord);
                        self.store.mark_for_rebuild(coord);
                    }
                    SubmitOutcome::Queued | SubmitOutcome::Replaced | SubmitOutcome::Superseded => {}
                },
            }
        }
    }

    fn dispatch_mesh_builds(&mut self, stats: &mut TickStats) {
        for coord in self.store.dirty_coords() {
            if self.builds_in_flight() + self.uploads.pending_count() >= self.uploads.capacity() {
                break;
            }
            let neighbors = self.store.neighbor_data(coord);
            if neighbors.iter().any(Option::is_none) {
                continue;
            }
            let Some(chunk) = self.store.get(coord) else {
                continue;
            };
            let task = MeshBuildTask::new(
                coord,
                chunk.generation(),
                chunk.data().clone(),
                neighbors,
                self.builder,
            );
            self.task_manager.publish_task(Box::new(task));
            self.store.mark_dispatched(coord);
            self.chunk_update_counter += 1;
            stats.dispatched += 1;
        }
    }

    /// Draws the visible chunks of the view from the last tick and bounds frames in flight.
    ///
    /// Opaque geometry is drawn nearest first, translucent geometry farthest first.
    ///
    /// # Returns
    /// The chunks drawn, nearest first.
    pub fn render(&mut self) -> Result<VisibleSet, SessionError> {
        let visible = match &self.view {
            Some(view) => VisibilitySet::compute(view, &self.store),
            None => VisibleSet::default(),
        };

        for coord in visible.coords() {
            if let Some(mesh) = self.store.get(coord).and_then(|chunk| chunk.gpu_mesh()) {
                if let Some(region) = mesh.opaque_region() {
                    self.backend.draw_indexed(mesh.handle, region);
                }
            }
        }
        for coord in visible.coords().rev() {
            if let Some(mesh) = self.store.get(coord).and_then(|chunk| chunk.gpu_mesh()) {
                if let Some(region) = mesh.translucent_region() {
                    self.backend.draw_indexed(mesh.handle, region);
                }
            }
        }

        self.frame_sync
            .on_frame_submitted(&mut self.backend)
            .map_err(SessionError::resource)?;
        self.frame_sync
            .enforce_bound(&mut self.backend, self.options.max_frames_ahead)
            .map_err(SessionError::resource)?;

        self.last_visible = (visible.len(), visible.quad_count());
        Ok(visible)
    }

    /// Replaces the voxel at a world block position.
    ///
    /// # Returns
    /// `false` if the block's chunk is not loaded.
    pub fn set_block(&mut self, block: Point3<i32>, voxel: Voxel) -> bool {
        self.store.set_block(block, voxel)
    }

    /// The voxel at a world block position, if its chunk is loaded.
    pub fn voxel_at(&self, block: Point3<i32>) -> Option<Voxel> {
        self.store.voxel_at(block)
    }

    /// Updates the projection for a resized render target.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.resize(width, height);
    }

    /// Current counters.
    pub fn stats(&self) -> SessionStats {
        let total_quads: u64 = self
            .store
            .chunks()
            .map(|chunk| u64::from(chunk.mesh_quad_count()))
            .sum();
        let vertex_bytes = total_quads * VERTICES_PER_QUAD * VERTEX_SIZE as u64;
        SessionStats {
            chunk_count: self.store.len(),
            visible_chunk_count: self.last_visible.0,
            total_quads,
            visible_quads: self.last_visible.1,
            pending_uploads: self.uploads.pending_count(),
            builds_in_flight: self.builds_in_flight(),
            dirty_chunks: self.store.dirty_count(),
            chunk_update_counter: self.chunk_update_counter,
            fences_in_flight: self.frame_sync.in_flight_count(),
            vertex_mib: vertex_bytes as f64 / (1024.0 * 1024.0),
            elapsed: self.elapsed,
            last_tick: self.last_tick,
        }
    }

    fn builds_in_flight(&self) -> usize {
        self.task_manager.in_flight_count() + self.task_manager.queued_count()
    }

    /// Whether streaming has settled: nothing left to load, build or upload.
    ///
    /// Dirty chunks that are missing a neighbour cannot be built and do not count.
    pub fn is_idle(&self) -> bool {
        self.store.pending_load_count() == 0
            && self.builds_in_flight() == 0
            && self.uploads.pending_count() == 0
            && self
                .store
                .dirty_coords()
                .into_iter()
                .all(|coord| self.store.neighbor_data(coord).iter().any(Option::is_none))
    }

    /// Retires all fences, frees every chunk buffer, saves edited chunks and stops the
    /// workers. Later calls do nothing.
    ///
    /// # Errors
    /// The first fence wait failure; every other step still runs.
    pub fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let fences = self.frame_sync.teardown(&mut self.backend);
        self.task_manager.shutdown();
        let freed = self.uploads.release_all(&mut self.store, &mut self.backend);
        let saved = self.store.save_all();
        info!("Session shut down: {} buffers released, {} chunks saved", freed, saved);
        fences.map_err(SessionError::resource)
    }

    /// The chunk store.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// The renderer backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The renderer backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The options the session was created with.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}

impl<B: RenderBackend> Drop for SessionState<B> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            error!("Session shutdown failed: {}", err);
        }
    }
}
