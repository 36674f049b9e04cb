//! # Session Options
//!
//! Every tunable that affects the streaming and frame pacing core. Options are read from a
//! JSON document whose keys use camelCase (`maxFramesAhead`, `uploadsPerTick`, ...). Missing
//! keys fall back to [`SessionOptions::default`].

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Options consumed by [`crate::session_state::SessionState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionOptions {
    /// Frames the CPU may queue ahead of the GPU before blocking.
    pub max_frames_ahead: usize,
    /// Wait for full GPU completion after every frame instead of bounding the backlog.
    pub eager_sync: bool,
    /// Mesh uploads performed per tick.
    pub uploads_per_tick: usize,
    /// Chebyshev chunk distance within which released chunks stay resident.
    pub chunk_retention_margin: i32,
    /// Average light over the cells touching each vertex and add ambient occlusion.
    pub smooth_lighting: bool,
    /// Radius, in chunks, of the cube requested around the camera chunk.
    pub render_distance: i32,
    /// Capacity of the pending upload queue.
    pub max_pending_uploads: usize,
    /// Chunks loaded or generated per tick.
    pub max_loads_per_tick: usize,
    /// Released chunks kept resident at most, regardless of distance.
    pub max_retained_chunks: usize,
    /// Mesh worker threads; 0 picks one less than the available parallelism.
    pub mesh_workers: usize,
    /// Terrain used for chunks that have never been saved.
    pub generation: GenerationOptions,
    /// Directory for saved chunks. Chunks live in memory only when unset.
    pub world_dir: Option<PathBuf>,
    /// Renderer backend used by the headless runner.
    pub backend: BackendKind,
}

/// Terrain generator selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationOptions {
    /// Generation method.
    pub method: GenerationMethod,
    /// Noise seed.
    pub seed: u32,
    /// World height of the surface for [`GenerationMethod::Flat`].
    pub surface_height: i32,
}

/// The method used to generate new chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMethod {
    /// 3D Perlin noise terrain with caves and overhangs.
    Perlin,
    /// Alternating solid and air cells.
    Checkerboard,
    /// Every cell solid.
    Solid,
    /// Solid below `surfaceHeight`, air above.
    Flat,
    /// Every cell air.
    Empty,
}

/// Renderer backend selection for [`crate::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CPU-side bookkeeping only.
    Headless,
    /// A wgpu device without a surface.
    Wgpu,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_frames_ahead: 3,
            eager_sync: false,
            uploads_per_tick: 4,
            chunk_retention_margin: 2,
            smooth_lighting: false,
            render_distance: 3,
            max_pending_uploads: 256,
            max_loads_per_tick: 32,
            max_retained_chunks: 512,
            mesh_workers: 0,
            generation: GenerationOptions::default(),
            world_dir: None,
            backend: BackendKind::Headless,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            method: GenerationMethod::Perlin,
            seed: 0,
            surface_height: 0,
        }
    }
}

impl SessionOptions {
    /// Parses and validates options from a JSON document.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let options: SessionOptions = serde_json::from_str(document)?;
        options.validate()?;
        Ok(options)
    }

    /// Reads, parses and validates options from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&document)
    }

    /// Rejects values the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uploads_per_tick == 0 {
            return Err(ConfigError::Invalid {
                option: "uploadsPerTick",
                reason: "must be at least 1",
            });
        }
        if self.max_pending_uploads == 0 {
            return Err(ConfigError::Invalid {
                option: "maxPendingUploads",
                reason: "must be at least 1",
            });
        }
        if self.max_loads_per_tick == 0 {
            return Err(ConfigError::Invalid {
                option: "maxLoadsPerTick",
                reason: "must be at least 1",
            });
        }
        if self.chunk_retention_margin < 0 {
            return Err(ConfigError::Invalid {
                option: "chunkRetentionMargin",
                reason: "must not be negative",
            });
        }
        if self.render_distance < 0 {
            return Err(ConfigError::Invalid {
                option: "renderDistance",
                reason: "must not be negative",
            });
        }
        Ok(())
    }

    /// Number of mesh workers to spawn.
    pub fn resolved_mesh_workers(&self) -> usize {
        if self.mesh_workers > 0 {
            return self.mesh_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}
