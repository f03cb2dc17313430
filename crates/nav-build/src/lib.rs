//! Navigation mesh generation
//!
//! Turns a triangle soup into a polygon mesh and a detail mesh in a fixed pipeline:
//! rasterize into a [`Heightfield`], filter it, compact it into a [`CompactHeightfield`],
//! erode, partition into regions, trace [`ContourSet`] outlines, polygonize into a
//! [`PolyMesh`] and finally sample heights into a [`PolyMeshDetail`].

mod compact_heightfield;
mod config;
mod context;
mod contour;
mod detail_mesh;
mod heightfield;
mod polymesh;
mod rasterization;
mod regions;
mod triangle_utils;

pub use compact_heightfield::{CompactCell, CompactHeightfield, CompactSpan};
pub use config::NavBuildConfig;
pub use context::{BuildContext, LogEntry, LogLevel, TimerCategory};
pub use contour::{Contour, ContourSet};
pub use detail_mesh::PolyMeshDetail;
pub use heightfield::{Heightfield, Span};
pub use polymesh::PolyMesh;
pub use rasterization::{mark_walkable_triangles, rasterize_triangle, rasterize_triangles};

/// Area id of spans and polygons that cannot be walked on
pub const NULL_AREA: u8 = 0;
/// Default area id of walkable spans and polygons
pub const WALKABLE_AREA: u8 = 63;

/// Marker for a missing neighbour in a compact span connection
pub const NOT_CONNECTED: u32 = 0x3f;
/// Region id bit marking the tile border regions
pub const BORDER_REG: u16 = 0x8000;
/// Region id assigned to polygons merged from several regions
pub const MULTIPLE_REGS: u16 = 0;
/// Marks unused polygon vertex and neighbour slots
pub const MESH_NULL_IDX: u16 = 0xffff;
/// Neighbour flag marking a polygon edge that lies on the tile border
pub const EXT_LINK: u16 = 0x8000;

/// Maximum height value of a span
pub const SPAN_MAX_HEIGHT: i32 = 0xffff;

/// Offset along x for a direction (0 = -x, 1 = +z, 2 = +x, 3 = -z)
#[inline]
pub fn dir_offset_x(dir: usize) -> i32 {
    const OFFSET: [i32; 4] = [-1, 0, 1, 0];
    OFFSET[dir & 3]
}

/// Offset along z for a direction (0 = -x, 1 = +z, 2 = +x, 3 = -z)
#[inline]
pub fn dir_offset_z(dir: usize) -> i32 {
    const OFFSET: [i32; 4] = [0, 1, 0, -1];
    OFFSET[dir & 3]
}

/// Direction for a unit offset, the inverse of [`dir_offset_x`] / [`dir_offset_z`]
#[inline]
pub fn dir_for_offset(x: i32, z: i32) -> Option<usize> {
    match (x, z) {
        (-1, 0) => Some(0),
        (0, 1) => Some(1),
        (1, 0) => Some(2),
        (0, -1) => Some(3),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_offsets_round_trip() {
        for dir in 0..4 {
            let found = dir_for_offset(dir_offset_x(dir), dir_offset_z(dir));
            assert_eq!(found, Some(dir));
        }
        assert_eq!(dir_for_offset(1, 1), None);
    }
}
