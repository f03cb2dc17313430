//! Runtime navigation mesh
//!
//! Tiles produced by the generation pipeline are serialized with [`create_tile_data`],
//! loaded into a [`NavMesh`] which links neighbouring tiles together, and queried with a
//! [`NavMeshQuery`]: nearest polygon lookup, A* over the polygon graph, string pulling
//! and raycasts.

mod nav_mesh;
mod node_pool;
mod poly_ref;
mod query;
mod status;
mod tile_data;

#[cfg(test)]
mod multi_tile_tests;
#[cfg(test)]
mod test_tiles;

pub use nav_mesh::{Link, MeshTile, NavMesh, NULL_LINK};
pub use poly_ref::{PolyRef, RefEncoding, TileRef};
pub use query::{
    NavMeshQuery, PathResult, QueryFilter, RaycastHit, StraightPath, StraightPathFlags,
    StraightPathPoint,
};
pub use status::Status;
pub use tile_data::{
    create_tile_data, BVNode, OffMeshConnection, Poly, PolyDetail, PolyType, TileCreateParams,
    TileData, TileHeader, NAVMESH_MAGIC, NAVMESH_VERSION,
};

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Neighbour flag marking an edge that may connect to an adjacent tile
pub const EXT_LINK: u16 = 0x8000;

/// Side value of a link between polygons of the same tile
pub const LINK_SIDE_INTERNAL: u8 = 0xff;

/// Number of polygon area ids
pub const MAX_AREAS: usize = 64;

bitflags::bitflags! {
    /// User flags of a polygon, matched against a [`QueryFilter`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PolyFlags: u16 {
        /// Ground that can be walked on
        const WALK = 0x01;
        const SWIM = 0x02;
        const DOOR = 0x04;
        const JUMP = 0x08;
        const DISABLED = 0x10;

        const _ = !0;
    }
}

/// Layout of the tile grid and the reference capacity of a [`NavMesh`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavMeshParams {
    /// World position of the corner of tile (0, 0)
    pub origin: Vec3,
    /// Tile extent along x
    pub tile_width: f32,
    /// Tile extent along z
    pub tile_height: f32,
    /// Number of tiles that can be loaded at once
    pub max_tiles: u32,
    /// Number of polygons a single tile may carry
    pub max_polys: u32,
}

/// Tile direction of a side (0 = +x, 2 = +z, 4 = -x, 6 = -z, odd values are diagonals)
#[inline]
pub(crate) fn side_offset(side: u8) -> (i32, i32) {
    match side & 7 {
        0 => (1, 0),
        1 => (1, 1),
        2 => (0, 1),
        3 => (-1, 1),
        4 => (-1, 0),
        5 => (-1, -1),
        6 => (0, -1),
        _ => (1, -1),
    }
}

#[inline]
pub(crate) fn opposite_side(side: u8) -> u8 {
    (side + 4) & 7
}

/// Two bit edge flags of edge `edge` of a packed detail triangle
#[inline]
pub(crate) fn detail_tri_edge_flags(flags: u8, edge: usize) -> u8 {
    (flags >> (edge * 2)) & 0x3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sides() {
        for side in 0..8u8 {
            let (dx, dz) = side_offset(side);
            let (ox, oz) = side_offset(opposite_side(side));
            assert_eq!((dx + ox, dz + oz), (0, 0));
        }
    }

    #[test]
    fn test_poly_flags_keep_unknown_bits() {
        let flags = PolyFlags::from_bits_retain(0x8001);
        assert!(flags.contains(PolyFlags::WALK));
        assert_eq!(flags.bits(), 0x8001);
        assert_eq!(PolyFlags::all().bits(), 0xffff);
    }
}
