//! Quad generation for a single visible block face.
//!
//! A face perpendicular to axis `a` spans the two other axes `u = (a + 1) % 3` and
//! `v = (a + 2) % 3`. Corners are listed counter-clockwise as seen from outside the block,
//! which for a positive normal is (0,0), (1,0), (1,1), (0,1) in (u, v) and the reverse
//! cycle for a negative one.

use cgmath::{EuclideanSpace, Point3, Vector3};

use crate::session_state::rendering::vertex::Vertex;
use crate::session_state::voxels::block::{block_side::BlockSide, block_type::BlockType, Voxel};

use super::Neighborhood;

const POSITIVE_CORNERS: [(i32, i32); 4] = [(0, 0), (1, 0), (1, 1), (0, 1)];
const NEGATIVE_CORNERS: [(i32, i32); 4] = [(0, 0), (0, 1), (1, 1), (1, 0)];

/// Unoccluded ambient occlusion value.
pub const AO_NONE: u8 = 3;

fn unit(axis: usize) -> Vector3<i32> {
    let mut unit = Vector3::new(0, 0, 0);
    unit[axis] = 1;
    unit
}

/// Light and occlusion at one corner of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CornerLight {
    block_light: u8,
    sky_light: u8,
    ao: u8,
}

impl CornerLight {
    fn flat(front: Voxel) -> Self {
        Self {
            block_light: front.block_light(),
            sky_light: front.sky_light(),
            ao: AO_NONE,
        }
    }

    /// Averages light over the open cells touching the corner on the face's outward side.
    ///
    /// `front` is the cell the face looks into, `side_u` and `side_v` the cells next to it
    /// towards the corner, and `diagonal` the cell across the corner. Cells outside the
    /// loaded neighbourhood are treated as open but contribute no light.
    fn smooth(
        front: Voxel,
        side_u: Option<Voxel>,
        side_v: Option<Voxel>,
        diagonal: Option<Voxel>,
    ) -> Self {
        let opaque = |cell: Option<Voxel>| cell.is_some_and(Voxel::is_opaque);
        let (u_opaque, v_opaque) = (opaque(side_u), opaque(side_v));
        let ao = if u_opaque && v_opaque {
            0
        } else {
            AO_NONE - u8::from(u_opaque) - u8::from(v_opaque) - u8::from(opaque(diagonal))
        };

        // The diagonal cell cannot leak light past two opaque sides.
        let diagonal = if u_opaque && v_opaque { None } else { diagonal };
        let (mut block_sum, mut sky_sum, mut count) = (0u16, 0u16, 0u16);
        for cell in [Some(front), side_u, side_v, diagonal].into_iter().flatten() {
            if !cell.is_opaque() {
                block_sum += u16::from(cell.block_light());
                sky_sum += u16::from(cell.sky_light());
                count += 1;
            }
        }
        let average = |sum: u16| ((sum + count / 2) / count) as u8;

        Self {
            block_light: average(block_sum),
            sky_light: average(sky_sum),
            ao,
        }
    }
}

/// Builds the four vertices of a visible face and the six indices of its two triangles.
///
/// # Arguments
/// * `hood` - The chunk and its face neighbours
/// * `cell` - Local position of the block
/// * `origin` - World position of the chunk's minimum corner
/// * `side` - The face to build
/// * `block_type` - The block's type, for its texture layer
/// * `front` - The voxel the face looks into
/// * `smooth_lighting` - Per-corner averaged light and ambient occlusion when set
/// * `base` - Index of the first of the four vertices in the batch
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_face(
    hood: &Neighborhood<'_>,
    cell: Point3<i32>,
    origin: Point3<i32>,
    side: BlockSide,
    block_type: BlockType,
    front: Voxel,
    smooth_lighting: bool,
    base: u32,
) -> ([Vertex; 4], [u32; 6]) {
    let axis = side.axis();
    let (u_axis, v_axis) = ((axis + 1) % 3, (axis + 2) % 3);
    let (u_unit, v_unit) = (unit(u_axis), unit(v_axis));
    let corners = if side.is_positive() {
        POSITIVE_CORNERS
    } else {
        NEGATIVE_CORNERS
    };
    let plane_offset = if side.is_positive() {
        unit(axis)
    } else {
        Vector3::new(0, 0, 0)
    };
    let front_cell = cell + side.normal();
    let texture_layer = block_type.texture_layer(side);

    let mut vertices = [Vertex::new(origin, 0, 0, 0, [0; 4]); 4];
    let mut ao = [AO_NONE; 4];
    for (i, (du, dv)) in corners.into_iter().enumerate() {
        let light = if smooth_lighting {
            let step_u = u_unit * (2 * du - 1);
            let step_v = v_unit * (2 * dv - 1);
            CornerLight::smooth(
                front,
                hood.voxel(front_cell + step_u),
                hood.voxel(front_cell + step_v),
                hood.voxel(front_cell + step_u + step_v),
            )
        } else {
            CornerLight::flat(front)
        };
        ao[i] = light.ao;

        let position = origin + cell.to_vec() + plane_offset + u_unit * du + v_unit * dv;
        vertices[i] = Vertex::new(
            position,
            texture_layer,
            du as u8,
            dv as u8,
            [light.block_light, light.sky_light, light.ao, side as u8],
        );
    }

    // Split along the diagonal with more light so occlusion gradients stay symmetric.
    let indices = if u16::from(ao[0]) + u16::from(ao[2]) >= u16::from(ao[1]) + u16::from(ao[3]) {
        [base, base + 1, base + 2, base, base + 2, base + 3]
    } else {
        [base + 1, base + 2, base + 3, base + 1, base + 3, base]
    };
    (vertices, indices)
}
