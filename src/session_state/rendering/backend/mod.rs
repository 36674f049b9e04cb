//! # Renderer Backend
//!
//! The narrow GPU contract the session core drives: buffers for chunk meshes, fences for
//! frame pacing, and indexed draws of a region of a chunk's index buffer. Everything else
//! about rendering (pipelines, textures, overlays, presentation) belongs to the host.
//!
//! Every method is called from the main thread only.

use crate::error::BackendError;

pub mod headless;
pub mod wgpu_backend;

pub use headless::HeadlessBackend;
pub use wgpu_backend::WgpuBackend;

/// Opaque name of a GPU buffer pair (vertices and indices) owned by one chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u64);

impl BufferHandle {
    /// Wraps a backend-specific id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The backend-specific id.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque GPU-completion token for one submitted frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceHandle(u64);

impl FenceHandle {
    /// Wraps a backend-specific id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The backend-specific id.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Sizes of a buffer pair to allocate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferLayout {
    /// Bytes reserved for vertices.
    pub vertex_bytes: u64,
    /// Bytes reserved for `u32` indices.
    pub index_bytes: u64,
}

impl BufferLayout {
    /// Total bytes of the pair.
    pub fn total_bytes(&self) -> u64 {
        self.vertex_bytes + self.index_bytes
    }
}

/// A contiguous range of a buffer's indices to draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawRegion {
    /// First index to draw.
    pub first_index: u32,
    /// Number of indices to draw.
    pub index_count: u32,
}

/// GPU operations used by the streaming core.
pub trait RenderBackend {
    /// Allocates a vertex/index buffer pair.
    ///
    /// # Errors
    /// [`BackendError::AllocationFailed`] when the memory cannot be provided.
    fn allocate_buffer(&mut self, layout: BufferLayout) -> Result<BufferHandle, BackendError>;

    /// Overwrites the start of a buffer pair with new vertex and index data.
    fn update_buffer(
        &mut self,
        handle: BufferHandle,
        vertices: &[u8],
        indices: &[u8],
    ) -> Result<(), BackendError>;

    /// Releases a buffer pair. Unknown handles are ignored.
    fn free_buffer(&mut self, handle: BufferHandle);

    /// Inserts a completion token after all work submitted so far.
    fn create_fence(&mut self) -> Result<FenceHandle, BackendError>;

    /// Blocks until the GPU has passed `fence`.
    fn wait_fence(&mut self, fence: FenceHandle) -> Result<(), BackendError>;

    /// Destroys a fence. Unknown fences are ignored.
    fn delete_fence(&mut self, fence: FenceHandle);

    /// Draws `region` of the buffer pair's indices.
    fn draw_indexed(&mut self, handle: BufferHandle, region: DrawRegion);
}
