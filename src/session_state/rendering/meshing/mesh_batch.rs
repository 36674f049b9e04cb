//! Mesh batches: the vertex and index payload of one chunk generation.

use bytemuck::cast_slice;

use crate::session_state::rendering::vertex::Vertex;
use crate::session_state::voxels::ChunkCoord;

/// A finished chunk mesh, tagged with the chunk generation it was built from.
///
/// The index buffer lists opaque quads first and translucent quads after them, so the
/// renderer can draw the two groups in separate passes.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshBatch {
    coord: ChunkCoord,
    generation: u64,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    opaque_index_count: u32,
}

impl MeshBatch {
    pub(crate) fn new(
        coord: ChunkCoord,
        generation: u64,
        vertices: Vec<Vertex>,
        mut opaque_indices: Vec<u32>,
        translucent_indices: Vec<u32>,
    ) -> Self {
        let opaque_index_count = opaque_indices.len() as u32;
        opaque_indices.extend(translucent_indices);
        Self {
            coord,
            generation,
            vertices,
            indices: opaque_indices,
            opaque_index_count,
        }
    }

    /// Chunk the mesh belongs to.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Chunk generation the mesh was built from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Vertices, four per quad.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Indices, six per quad.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of quads.
    pub fn quad_count(&self) -> u32 {
        (self.vertices.len() / 4) as u32
    }

    /// Indices belonging to opaque quads, at the start of the index buffer.
    pub fn opaque_index_count(&self) -> u32 {
        self.opaque_index_count
    }

    /// Indices belonging to translucent quads, after the opaque ones.
    pub fn translucent_index_count(&self) -> u32 {
        self.indices.len() as u32 - self.opaque_index_count
    }

    /// Whether the mesh has no quads.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex data as bytes for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        cast_slice(&self.vertices)
    }

    /// Index data as bytes for upload.
    pub fn index_bytes(&self) -> &[u8] {
        cast_slice(&self.indices)
    }
}
