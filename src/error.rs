//! # Error Types
//!
//! Errors surfaced by the session core. Only [`SessionError`] reaches the session host; the
//! other enums describe failures of the collaborators the core talks to (renderer backend,
//! persistence, terrain generation, configuration) and are wrapped by it when fatal.
//!
//! ## Taxonomy
//!
//! * Transient failures (load misses, neighbours not yet loaded) never become errors here.
//!   They are retried on a later tick.
//! * Resource failures (GPU allocation) are fatal: [`SessionError::Resource`].
//! * Data failures (corrupt persisted chunk) are reported per coordinate through
//!   [`crate::session_state::voxels::chunk_store::TickReport`] and the chunk is generated fresh.
//! * Stale mesh generations are discarded silently.

use std::path::PathBuf;

use thiserror::Error;

use crate::session_state::rendering::backend::{BufferHandle, FenceHandle};
use crate::session_state::voxels::ChunkCoord;

/// Fatal errors returned to the session host.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A GPU resource operation failed; continued operation is undefined.
    #[error("GPU resource failure for chunk {coord:?}: {source}")]
    Resource {
        /// Chunk whose upload triggered the failure, if any.
        coord: Option<ChunkCoord>,
        /// Backend failure.
        #[source]
        source: BackendError,
    },

    /// Terrain generation failed, leaving the world in an unusable state.
    #[error("terrain generation failed for chunk {coord:?}: {source}")]
    Generation {
        /// Chunk that could not be generated.
        coord: ChunkCoord,
        /// Generator failure.
        #[source]
        source: GenerationError,
    },

    /// Session options could not be loaded or are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The chunk storage could not be opened.
    #[error("chunk storage could not be opened: {0}")]
    Storage(#[from] PersistenceError),

    /// The mesh worker pool could not be started.
    #[error("failed to start mesh workers: {0}")]
    Worker(#[source] std::io::Error),
}

impl SessionError {
    /// Wraps a backend failure that is not tied to a particular chunk.
    pub fn resource(source: BackendError) -> Self {
        SessionError::Resource {
            coord: None,
            source,
        }
    }
}

/// Failures reported by a [`crate::session_state::rendering::backend::RenderBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not provide the requested amount of GPU memory.
    #[error("failed to allocate {requested} bytes ({available} available)")]
    AllocationFailed {
        /// Bytes requested.
        requested: u64,
        /// Bytes still available to the backend.
        available: u64,
    },

    /// The handle does not name a live buffer.
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),

    /// The handle does not name a live fence.
    #[error("unknown fence {0:?}")]
    UnknownFence(FenceHandle),

    /// A write would exceed the buffer's allocated size.
    #[error("write of {requested} bytes exceeds capacity {capacity} of {handle:?}")]
    OutOfBounds {
        /// Target buffer.
        handle: BufferHandle,
        /// Bytes written.
        requested: u64,
        /// Bytes allocated.
        capacity: u64,
    },

    /// The underlying graphics device reported an error.
    #[error("device error: {0}")]
    Device(String),
}

/// Failures reported by a [`crate::session_state::voxels::persistence::ChunkPersistence`].
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Storage could not be reached; the load is retried later.
    #[error("chunk storage unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The stored record exists but cannot be decoded.
    #[error("corrupt chunk record for {coord:?}: {reason}")]
    Corrupt {
        /// Coordinate of the corrupt record.
        coord: ChunkCoord,
        /// What was wrong with it.
        reason: String,
    },
}

/// Failures of a [`crate::session_state::voxels::generation::ChunkGenerator`].
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The chunk lies outside the representable block coordinate range.
    #[error("chunk {0:?} is outside the representable world")]
    OutOfRange(ChunkCoord),

    /// Generator-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Failures while loading or validating [`crate::config::SessionOptions`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The options file could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        /// File that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The options document is not valid JSON for [`crate::config::SessionOptions`].
    #[error("invalid options document: {0}")]
    Parse(#[from] serde_json::Error),

    /// An option holds an unusable value.
    #[error("option `{option}` is invalid: {reason}")]
    Invalid {
        /// Name of the offending option.
        option: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}
