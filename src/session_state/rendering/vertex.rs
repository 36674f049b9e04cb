//! Vertex data structures and layouts for chunk meshes.

use cgmath::Point3;

/// A vertex of a chunk mesh.
///
/// # Memory Layout
/// - Position: 3x i32 (12 bytes)
/// - Texture Layer: u32 (4 bytes)
/// - Texture Coordinates: [f32; 2] (8 bytes)
/// - Shading: [u8; 4] (4 bytes)
///
/// Total size: 28 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in world block units.
    pub position: [i32; 3],
    /// Layer of the block texture array.
    pub texture_layer: u32,
    /// UV texture coordinates (0.0 or 1.0 at quad corners).
    pub tex_coords: [f32; 2],
    /// Block-light (0-15), sky-light (0-15), ambient occlusion (0-3), face side.
    pub shading: [u8; 4],
}

/// Byte size of one [`Vertex`].
pub const VERTEX_SIZE: usize = std::mem::size_of::<Vertex>();

impl Vertex {
    /// Creates a vertex.
    ///
    /// # Arguments
    /// * `pos` - Position in world block units
    /// * `texture_layer` - Layer of the block texture array
    /// * `u`, `v` - Texture coordinates at this corner
    /// * `shading` - Block-light, sky-light, ambient occlusion and face side
    pub fn new(pos: Point3<i32>, texture_layer: u32, u: u8, v: u8, shading: [u8; 4]) -> Self {
        Vertex {
            position: [pos.x, pos.y, pos.z],
            texture_layer,
            tex_coords: [f32::from(u), f32::from(v)],
            shading,
        }
    }

    /// Block-light at this vertex.
    pub fn block_light(&self) -> u8 {
        self.shading[0]
    }

    /// Sky-light at this vertex.
    pub fn sky_light(&self) -> u8 {
        self.shading[1]
    }

    /// Ambient occlusion at this vertex, 3 meaning unoccluded.
    pub fn ambient_occlusion(&self) -> u8 {
        self.shading[2]
    }

    /// Returns the vertex buffer layout for the chunk pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position (vec3<i32>)
    /// - `location = 1`: texture_layer (u32)
    /// - `location = 2`: tex_coords (vec2<f32>)
    /// - `location = 3`: shading (vec4<u32>, from four u8)
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
            0 => Sint32x3,
            1 => Uint32,
            2 => Float32x2,
            3 => Uint8x4,
        ];
        wgpu::VertexBufferLayout {
            array_stride: VERTEX_SIZE as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_28_bytes() {
        assert_eq!(VERTEX_SIZE, 28);
    }

    #[test]
    fn layout_matches_the_struct() {
        let layout = Vertex::desc();
        assert_eq!(layout.array_stride, VERTEX_SIZE as u64);
        let offsets: Vec<u64> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 16, 24]);
    }
}
