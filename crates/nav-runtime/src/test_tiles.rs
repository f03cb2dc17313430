//! Hand made tiles for the runtime tests: square grids of unit quads

use glam::Vec3;

use crate::tile_data::{build_bv_tree, fan_detail_meshes};
use crate::{PolyFlags, Poly, TileData, TileHeader, EXT_LINK};

pub const WALKABLE_AREA: u8 = 63;

/// A tile of `nx * nz` square polygons of size `cell`, all walkable
pub fn grid_tile(tx: i32, ty: i32, nx: usize, nz: usize, cell: f32) -> TileData {
    grid_tile_masked(tx, ty, nx, nz, cell, |_, _| true)
}

/// A tile of `nx * nz` cells where only cells accepted by `walkable` get a polygon
///
/// The tile covers `[tx * nx * cell, (tx + 1) * nx * cell]` along x and the same along z
/// for `ty`, so neighbouring tiles line up in a mesh with that tile size.
pub fn grid_tile_masked(
    tx: i32,
    ty: i32,
    nx: usize,
    nz: usize,
    cell: f32,
    walkable: impl Fn(usize, usize) -> bool,
) -> TileData {
    let width = nx as f32 * cell;
    let depth = nz as f32 * cell;
    let origin = Vec3::new(tx as f32 * width, 0.0, ty as f32 * depth);

    let mut verts = Vec::with_capacity((nx + 1) * (nz + 1));
    for k in 0..=nz {
        for i in 0..=nx {
            verts.push(origin + Vec3::new(i as f32 * cell, 0.0, k as f32 * cell));
        }
    }
    let vi = |i: usize, k: usize| (k * (nx + 1) + i) as u16;

    let mut index = vec![None; nx * nz];
    let mut count = 0u16;
    for k in 0..nz {
        for i in 0..nx {
            if walkable(i, k) {
                index[k * nx + i] = Some(count);
                count += 1;
            }
        }
    }
    let nei = |i: i64, k: i64, border: u16| -> u16 {
        if i < 0 || k < 0 || i >= nx as i64 || k >= nz as i64 {
            return EXT_LINK | border;
        }
        index[k as usize * nx + i as usize].map_or(0, |p| p + 1)
    };

    let mut polys = Vec::new();
    let mut portal_count = 0;
    for k in 0..nz {
        for i in 0..nx {
            if index[k * nx + i].is_none() {
                continue;
            }
            let (ii, kk) = (i as i64, k as i64);
            let mut poly = Poly {
                flags: PolyFlags::WALK,
                vert_count: 4,
                ..Poly::default()
            };
            poly.set_area(WALKABLE_AREA);
            poly.verts[..4].copy_from_slice(&[vi(i, k), vi(i, k + 1), vi(i + 1, k + 1), vi(i + 1, k)]);
            poly.neis[..4].copy_from_slice(&[
                nei(ii - 1, kk, 4),
                nei(ii, kk + 1, 2),
                nei(ii + 1, kk, 0),
                nei(ii, kk - 1, 6),
            ]);
            portal_count += poly.neis[..4].iter().filter(|&&n| n & EXT_LINK != 0).count();
            polys.push(poly);
        }
    }

    let (detail_meshes, detail_verts, detail_tris) = fan_detail_meshes(&polys);
    let mut tile = TileData {
        header: TileHeader {
            x: tx,
            y: ty,
            layer: 0,
            user_id: 0,
            poly_count: polys.len(),
            vert_count: verts.len(),
            max_link_count: polys.len() * 4 + portal_count * 2,
            detail_mesh_count: detail_meshes.len(),
            detail_vert_count: detail_verts.len(),
            detail_tri_count: detail_tris.len(),
            bv_node_count: 0,
            off_mesh_con_count: 0,
            off_mesh_base: polys.len(),
            walkable_height: 2.0,
            walkable_radius: 0.5,
            walkable_climb: 0.5,
            bmin: origin,
            bmax: origin + Vec3::new(width, 1.0, depth),
            bv_quant_factor: 1.0 / cell,
        },
        verts,
        polys,
        detail_meshes,
        detail_verts,
        detail_tris,
        bv_tree: Vec::new(),
        off_mesh_cons: Vec::new(),
    };
    tile.bv_tree = build_bv_tree(&tile);
    tile.header.bv_node_count = tile.bv_tree.len();
    tile
}

/// Serialized [`grid_tile`]
pub fn grid_tile_bytes(tx: i32, ty: i32, nx: usize, nz: usize, cell: f32) -> Vec<u8> {
    grid_tile(tx, ty, nx, nz, cell)
        .to_bytes()
        .expect("grid tile serializes")
}
