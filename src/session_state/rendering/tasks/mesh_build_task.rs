//! Task for building chunk meshes on a worker thread.
//!
//! The task holds shared handles to the chunk's voxel data and its six face neighbours.
//! Each handle is read-locked for the duration of the build, so an edit on the session
//! thread either lands before the build reads it or bumps the generation afterwards, and
//! the stale result is discarded.

use crate::{
    core::MtResource,
    session_state::{
        rendering::meshing::{BuildOutcome, MeshBuilder},
        task_management::task::Task,
        voxels::{chunk::ChunkData, ChunkCoord},
    },
};

/// Builds the mesh of one chunk generation.
pub struct MeshBuildTask {
    coord: ChunkCoord,
    generation: u64,
    center: MtResource<ChunkData>,
    neighbors: [Option<MtResource<ChunkData>>; 6],
    builder: MeshBuilder,
}

/// Output of a [`MeshBuildTask`], delivered back on the session thread.
#[derive(Debug)]
pub struct MeshBuildResult {
    /// Chunk the build was for.
    pub coord: ChunkCoord,
    /// Chunk generation the build read.
    pub generation: u64,
    /// The built mesh, the missing neighbours, or [`BuildOutcome::Failed`] when the build
    /// panicked.
    pub outcome: BuildOutcome,
}

impl MeshBuildTask {
    /// Creates a mesh build task.
    ///
    /// # Arguments
    /// * `coord` - The chunk to build
    /// * `generation` - The chunk's generation at dispatch
    /// * `center` - The chunk's voxel data
    /// * `neighbors` - Face neighbours indexed by block side, `None` where not loaded
    /// * `builder` - Mesher options
    pub fn new(
        coord: ChunkCoord,
        generation: u64,
        center: MtResource<ChunkData>,
        neighbors: [Option<MtResource<ChunkData>>; 6],
        builder: MeshBuilder,
    ) -> Self {
        Self {
            coord,
            generation,
            center,
            neighbors,
            builder,
        }
    }
}

impl Task for MeshBuildTask {
    type Output = MeshBuildResult;

    fn process(&self) -> MeshBuildResult {
        let center = self.center.get();
        let guards: Vec<_> = self
            .neighbors
            .iter()
            .map(|neighbor| neighbor.as_ref().map(MtResource::get))
            .collect();
        let neighbors: [Option<&ChunkData>; 6] = std::array::from_fn(|i| guards[i].as_deref());

        let outcome = self.builder.build(self.coord, self.generation, &center, neighbors);
        MeshBuildResult {
            coord: self.coord,
            generation: self.generation,
            outcome,
        }
    }

    fn on_panic(&self) -> Option<MeshBuildResult> {
        Some(MeshBuildResult {
            coord: self.coord,
            generation: self.generation,
            outcome: BuildOutcome::Failed,
        })
    }
}
