//! Tiled navigation mesh
//!
//! Tiles live in a fixed number of slots. A slot's salt is bumped whenever its tile is
//! removed, which invalidates every polygon reference handed out for the old tile.
//! Polygons are connected through per-tile link lists: internal links follow the
//! polygon neighbours, external links are found by matching portal edges of adjacent
//! tiles.

use std::collections::HashMap;

use glam::Vec3;
use nav_common::{
    closest_height_point_triangle, dist_point_segment_sqr_2d, overlap_bounds,
    overlap_quant_bounds, point_in_polygon, calc_bounds, Error, Result,
};

use crate::tile_data::{Poly, PolyType, TileData, TileHeader};
use crate::{
    detail_tri_edge_flags, opposite_side, side_offset, NavMeshParams, PolyFlags, PolyRef,
    QueryFilter, RefEncoding, Status, TileRef, EXT_LINK, LINK_SIDE_INTERNAL,
};

/// End of a link list
pub const NULL_LINK: u32 = 0xffff_ffff;

const DETAIL_EDGE_BOUNDARY: u8 = 0x1;
const MAX_CONNECTIONS_PER_EDGE: usize = 4;

/// Directed connection from a polygon edge to a neighbouring polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub poly_ref: PolyRef,
    /// Next link of the same polygon
    pub next: u32,
    /// Edge of the owning polygon
    pub edge: u8,
    /// Tile side for external links, [`LINK_SIDE_INTERNAL`] otherwise
    pub side: u8,
    /// Start of the shared portal along the edge, in 1/255 of its length
    pub bmin: u8,
    /// End of the shared portal along the edge, in 1/255 of its length
    pub bmax: u8,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            poly_ref: PolyRef::NULL,
            next: NULL_LINK,
            edge: 0,
            side: 0,
            bmin: 0,
            bmax: 0,
        }
    }
}

/// A tile loaded into a [`NavMesh`]
#[derive(Debug, Clone)]
pub struct MeshTile {
    salt: u32,
    index: usize,
    data: TileData,
    links: Vec<Link>,
    links_free_list: u32,
    raw: Vec<u8>,
}

impl MeshTile {
    fn new(index: usize, salt: u32, mut data: TileData, raw: Vec<u8>) -> Self {
        let count = data.header.max_link_count;
        let links = (0..count)
            .map(|i| Link {
                next: if i + 1 < count { (i + 1) as u32 } else { NULL_LINK },
                ..Link::default()
            })
            .collect();
        for poly in &mut data.polys {
            poly.first_link = NULL_LINK;
        }
        Self {
            salt,
            index,
            data,
            links,
            links_free_list: if count > 0 { 0 } else { NULL_LINK },
            raw,
        }
    }

    pub fn header(&self) -> &TileHeader {
        &self.data.header
    }

    pub fn data(&self) -> &TileData {
        &self.data
    }

    /// The bytes the tile was loaded from
    pub fn raw_data(&self) -> &[u8] {
        &self.raw
    }

    pub fn salt(&self) -> u32 {
        self.salt
    }

    /// Links of polygon `poly_index`, most recently added first
    pub fn poly_links(&self, poly_index: usize) -> PolyLinks<'_> {
        PolyLinks {
            links: &self.links,
            next: self.data.polys[poly_index].first_link,
        }
    }

    fn alloc_link(&mut self) -> Option<u32> {
        if self.links_free_list == NULL_LINK {
            return None;
        }
        let idx = self.links_free_list;
        self.links_free_list = self.links[idx as usize].next;
        Some(idx)
    }

    fn free_link(&mut self, idx: u32) {
        self.links[idx as usize].next = self.links_free_list;
        self.links_free_list = idx;
    }

    fn push_link(&mut self, poly_index: usize, mut link: Link) -> bool {
        let Some(idx) = self.alloc_link() else {
            return false;
        };
        link.next = self.data.polys[poly_index].first_link;
        self.links[idx as usize] = link;
        self.data.polys[poly_index].first_link = idx;
        true
    }
}

/// Iterator over a polygon's link list
pub struct PolyLinks<'a> {
    links: &'a [Link],
    next: u32,
}

impl<'a> Iterator for PolyLinks<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<&'a Link> {
        if self.next == NULL_LINK {
            return None;
        }
        let link = self.links.get(self.next as usize)?;
        self.next = link.next;
        Some(link)
    }
}

#[derive(Debug)]
struct TileSlot {
    salt: u32,
    tile: Option<MeshTile>,
}

/// Index of loaded tiles addressed by salted references
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    encoding: RefEncoding,
    slots: Vec<TileSlot>,
    free_slots: Vec<usize>,
    lookup: HashMap<(i32, i32), Vec<usize>>,
}

fn status_error(status: Status, message: impl std::fmt::Display) -> Error {
    Error::TileData(format!("{}: {}", status, message))
}

impl NavMesh {
    /// Creates an empty mesh
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if !(params.tile_width > 0.0 && params.tile_height > 0.0)
            || !params.tile_width.is_finite()
            || !params.tile_height.is_finite()
            || !nav_common::vfinite(params.origin)
        {
            return Err(Error::InvalidSettings(format!(
                "tile size {}x{} must be positive",
                params.tile_width, params.tile_height
            )));
        }
        let encoding = RefEncoding::for_capacity(params.max_tiles, params.max_polys).map_err(
            |status| {
                Error::InvalidSettings(format!(
                    "{}: {} tiles of {} polygons do not fit a reference",
                    status, params.max_tiles, params.max_polys
                ))
            },
        )?;
        log::debug!(
            "navmesh capacity: {} tiles, {} polys per tile, {} salt bits",
            params.max_tiles,
            encoding.max_polys(),
            encoding.salt_bits
        );
        Ok(Self {
            params,
            encoding,
            slots: Vec::new(),
            free_slots: Vec::new(),
            lookup: HashMap::new(),
        })
    }

    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    pub fn encoding(&self) -> &RefEncoding {
        &self.encoding
    }

    pub fn max_tiles(&self) -> usize {
        self.params.max_tiles as usize
    }

    /// Number of loaded tiles
    pub fn tile_count(&self) -> usize {
        self.slots.iter().filter(|s| s.tile.is_some()).count()
    }

    /// Loaded tiles in slot order
    pub fn tiles(&self) -> impl Iterator<Item = &MeshTile> {
        self.slots.iter().filter_map(|s| s.tile.as_ref())
    }

    /// Parses `data`, inserts the tile and links it with its neighbours
    ///
    /// Fails without touching the mesh if the data is invalid, the tile has more
    /// polygons than a reference can address, the coordinate is taken or every slot is
    /// in use.
    pub fn add_tile(&mut self, data: &[u8]) -> Result<TileRef> {
        let tile_data = TileData::from_bytes(data)?;
        let header = &tile_data.header;
        if header.poly_count > self.encoding.max_polys() {
            return Err(status_error(
                Status::FAILURE | Status::OUT_OF_MEMORY,
                format!(
                    "tile has {} polygons, at most {} fit",
                    header.poly_count,
                    self.encoding.max_polys()
                ),
            ));
        }
        let (x, y, layer) = (header.x, header.y, header.layer);
        if self.tile_at(x, y, layer).is_some() {
            return Err(status_error(
                Status::FAILURE | Status::ALREADY_OCCUPIED,
                format!("tile ({}, {}, {})", x, y, layer),
            ));
        }

        let index = match self.free_slots.pop() {
            Some(index) => index,
            None if self.slots.len() < self.max_tiles() => {
                self.slots.push(TileSlot { salt: 1, tile: None });
                self.slots.len() - 1
            }
            None => {
                return Err(status_error(
                    Status::FAILURE | Status::OUT_OF_MEMORY,
                    format!("all {} tile slots are in use", self.max_tiles()),
                ));
            }
        };

        let salt = self.slots[index].salt;
        let mut tile = MeshTile::new(index, salt, tile_data, data.to_vec());
        self.connect_int_links(&mut tile);
        self.slots[index].tile = Some(tile);

        let column: Vec<usize> = self.column(x, y).to_vec();
        self.lookup.entry((x, y)).or_default().push(index);

        // Layers stacked in the same column.
        for other in column {
            self.connect_ext_links(index, other, None);
            self.connect_ext_links(other, index, None);
        }
        for side in 0..8u8 {
            let (dx, dy) = side_offset(side);
            let neighbours: Vec<usize> = self.column(x + dx, y + dy).to_vec();
            for nei in neighbours {
                self.connect_ext_links(index, nei, Some(side));
                self.connect_ext_links(nei, index, Some(opposite_side(side)));
            }
        }

        let tile_ref = self.encoding.encode(salt, index as u32, 0);
        log::debug!("added tile ({}, {}, {}) as {:#x}", x, y, layer, tile_ref.id());
        Ok(TileRef::new(tile_ref.id()))
    }

    /// Removes a tile, returning the bytes it was loaded from
    pub fn remove_tile(&mut self, tile_ref: TileRef) -> Result<Vec<u8>> {
        let (salt, index, _) = self.encoding.decode(tile_ref.base_poly_ref());
        let index = index as usize;
        let (x, y) = match self.slots.get(index) {
            Some(TileSlot {
                salt: slot_salt,
                tile: Some(tile),
            }) if *slot_salt == salt => (tile.header().x, tile.header().y),
            _ => {
                return Err(status_error(
                    Status::FAILURE | Status::INVALID_PARAM,
                    format!("no tile for reference {:#x}", tile_ref.id()),
                ));
            }
        };

        if let Some(column) = self.lookup.get_mut(&(x, y)) {
            column.retain(|&i| i != index);
            if column.is_empty() {
                self.lookup.remove(&(x, y));
            }
        }

        let mut neighbours: Vec<usize> = self.column(x, y).to_vec();
        for side in 0..8u8 {
            let (dx, dy) = side_offset(side);
            neighbours.extend_from_slice(self.column(x + dx, y + dy));
        }
        for nei in neighbours {
            self.unconnect_links(nei, index);
        }

        let slot = &mut self.slots[index];
        let tile = slot.tile.take();
        slot.salt = (slot.salt + 1) & self.encoding.salt_mask();
        if slot.salt == 0 {
            slot.salt = 1;
        }
        self.free_slots.push(index);
        log::debug!("removed tile ({}, {}) {:#x}", x, y, tile_ref.id());
        Ok(tile.map(|t| t.raw).unwrap_or_default())
    }

    fn column(&self, x: i32, y: i32) -> &[usize] {
        self.lookup.get(&(x, y)).map_or(&[], |v| v.as_slice())
    }

    /// Tiles of every layer at a tile coordinate
    pub fn tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        self.column(x, y)
            .iter()
            .filter_map(|&i| self.slots[i].tile.as_ref())
            .collect()
    }

    pub fn tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.tiles_at(x, y)
            .into_iter()
            .find(|t| t.header().layer == layer)
    }

    pub fn tile_ref_at(&self, x: i32, y: i32, layer: i32) -> Option<TileRef> {
        self.tile_at(x, y, layer).map(|t| self.tile_ref(t))
    }

    pub fn tile_ref(&self, tile: &MeshTile) -> TileRef {
        TileRef::new(self.encoding.encode(tile.salt, tile.index as u32, 0).id())
    }

    pub fn tile_by_ref(&self, tile_ref: TileRef) -> Option<&MeshTile> {
        let (salt, index, _) = self.encoding.decode(tile_ref.base_poly_ref());
        let slot = self.slots.get(index as usize)?;
        if slot.salt != salt {
            return None;
        }
        slot.tile.as_ref()
    }

    /// Reference of polygon zero of `tile`
    pub fn poly_ref_base(&self, tile: &MeshTile) -> PolyRef {
        self.encoding.encode(tile.salt, tile.index as u32, 0)
    }

    pub fn poly_ref(&self, tile: &MeshTile, poly_index: usize) -> PolyRef {
        self.encoding.encode(tile.salt, tile.index as u32, poly_index as u32)
    }

    /// Tile coordinate containing a world position
    pub fn calc_tile_loc(&self, pos: Vec3) -> (i32, i32) {
        let x = ((pos.x - self.params.origin.x) / self.params.tile_width).floor() as i32;
        let y = ((pos.z - self.params.origin.z) / self.params.tile_height).floor() as i32;
        (x, y)
    }

    /// Resolves a polygon reference, checking the salt
    pub fn tile_and_poly_by_ref(&self, r: PolyRef) -> Result<(&MeshTile, &Poly)> {
        let (salt, it, ip) = self.encoding.decode(r);
        let tile = self
            .slots
            .get(it as usize)
            .filter(|s| s.salt == salt)
            .and_then(|s| s.tile.as_ref());
        match tile.and_then(|t| t.data.polys.get(ip as usize).map(|p| (t, p))) {
            Some(found) if !r.is_null() => Ok(found),
            _ => Err(Error::Query(format!(
                "{}: polygon reference {:#x}",
                Status::FAILURE | Status::INVALID_PARAM,
                r.id()
            ))),
        }
    }

    pub fn is_valid_poly_ref(&self, r: PolyRef) -> bool {
        self.tile_and_poly_by_ref(r).is_ok()
    }

    fn poly_mut(&mut self, r: PolyRef) -> Result<&mut Poly> {
        let (salt, it, ip) = self.encoding.decode(r);
        self.slots
            .get_mut(it as usize)
            .filter(|s| s.salt == salt)
            .and_then(|s| s.tile.as_mut())
            .and_then(|t| t.data.polys.get_mut(ip as usize))
            .ok_or_else(|| Error::Query(format!("polygon reference {:#x}", r.id())))
    }

    pub fn poly_flags(&self, r: PolyRef) -> Result<PolyFlags> {
        Ok(self.tile_and_poly_by_ref(r)?.1.flags)
    }

    pub fn set_poly_flags(&mut self, r: PolyRef, flags: PolyFlags) -> Result<()> {
        self.poly_mut(r)?.flags = flags;
        Ok(())
    }

    pub fn poly_area(&self, r: PolyRef) -> Result<u8> {
        Ok(self.tile_and_poly_by_ref(r)?.1.area())
    }

    pub fn set_poly_area(&mut self, r: PolyRef, area: u8) -> Result<()> {
        self.poly_mut(r)?.set_area(area);
        Ok(())
    }

    fn connect_int_links(&self, tile: &mut MeshTile) {
        let base = self.poly_ref_base(tile);
        for i in 0..tile.data.polys.len() {
            let poly = &tile.data.polys[i];
            if poly.poly_type() == PolyType::OffMeshConnection {
                continue;
            }
            let nv = poly.vert_count as usize;
            let neis = poly.neis;
            // Walk edges backwards so the list comes out in edge order.
            for j in (0..nv).rev() {
                let nei = neis[j];
                if nei == 0 || nei & EXT_LINK != 0 {
                    continue;
                }
                let link = Link {
                    poly_ref: PolyRef::new(base.id() | (nei - 1) as u32),
                    edge: j as u8,
                    side: LINK_SIDE_INTERNAL,
                    ..Link::default()
                };
                if !tile.push_link(i, link) {
                    log::warn!("tile link pool exhausted while linking polygon {}", i);
                }
            }
        }
    }

    /// Links portal edges of tile `from` facing `side` to polygons of tile `to`
    ///
    /// With no side, every portal edge is tried.
    fn connect_ext_links(&mut self, from: usize, to: usize, side: Option<u8>) {
        let mut new_links = Vec::new();
        {
            let (Some(tile), Some(target)) = (
                self.slots[from].tile.as_ref(),
                self.slots[to].tile.as_ref(),
            ) else {
                return;
            };
            for (i, poly) in tile.data.polys.iter().enumerate() {
                let nv = poly.vert_count as usize;
                for j in 0..nv {
                    if poly.neis[j] & EXT_LINK == 0 {
                        continue;
                    }
                    let dir = (poly.neis[j] & 0xff) as u8;
                    if side.is_some_and(|s| s != dir) {
                        continue;
                    }
                    let va = tile.data.verts[poly.verts[j] as usize];
                    let vb = tile.data.verts[poly.verts[(j + 1) % nv] as usize];
                    for (poly_ref, amin, amax) in
                        self.find_connecting_polys(va, vb, target, opposite_side(dir))
                    {
                        let (lo, hi) = if dir == 0 || dir == 4 {
                            (va.z, vb.z)
                        } else {
                            (va.x, vb.x)
                        };
                        let mut tmin = (amin - lo) / (hi - lo);
                        let mut tmax = (amax - lo) / (hi - lo);
                        if tmin > tmax {
                            std::mem::swap(&mut tmin, &mut tmax);
                        }
                        new_links.push((
                            i,
                            Link {
                                poly_ref,
                                edge: j as u8,
                                side: dir,
                                bmin: (tmin.clamp(0.0, 1.0) * 255.0).round() as u8,
                                bmax: (tmax.clamp(0.0, 1.0) * 255.0).round() as u8,
                                ..Link::default()
                            },
                        ));
                    }
                }
            }
        }

        if let Some(tile) = self.slots[from].tile.as_mut() {
            for (i, link) in new_links {
                if !tile.push_link(i, link) {
                    log::warn!("tile link pool exhausted while connecting tiles");
                    break;
                }
            }
        }
    }

    /// Polygons of `tile` with a portal edge on `side` that overlaps the segment
    /// `va -> vb`, with the overlap range along the edge
    fn find_connecting_polys(
        &self,
        va: Vec3,
        vb: Vec3,
        tile: &MeshTile,
        side: u8,
    ) -> Vec<(PolyRef, f32, f32)> {
        let (amin, amax) = calc_slab_end_points(va, vb, side);
        let apos = slab_coord(va, side);
        let marker = EXT_LINK | side as u16;
        let climb = tile.header().walkable_climb;

        let mut found = Vec::new();
        for (i, poly) in tile.data.polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            for j in 0..nv {
                if poly.neis[j] != marker {
                    continue;
                }
                let vc = tile.data.verts[poly.verts[j] as usize];
                let vd = tile.data.verts[poly.verts[(j + 1) % nv] as usize];
                if (apos - slab_coord(vc, side)).abs() > 0.01 {
                    continue;
                }
                let (bmin, bmax) = calc_slab_end_points(vc, vd, side);
                if !overlap_slabs(amin, amax, bmin, bmax, 0.01, climb) {
                    continue;
                }
                if found.len() < MAX_CONNECTIONS_PER_EDGE {
                    found.push((
                        self.poly_ref(tile, i),
                        amin[0].max(bmin[0]),
                        amax[0].min(bmax[0]),
                    ));
                }
                break;
            }
        }
        found
    }

    /// Drops the links of tile `tile` that point into the tile in slot `target`
    fn unconnect_links(&mut self, tile: usize, target: usize) {
        let encoding = self.encoding;
        let Some(tile) = self.slots[tile].tile.as_mut() else {
            return;
        };
        for i in 0..tile.data.polys.len() {
            let mut prev = NULL_LINK;
            let mut j = tile.data.polys[i].first_link;
            while j != NULL_LINK {
                let link = tile.links[j as usize];
                if encoding.decode_tile(link.poly_ref) as usize == target {
                    if prev == NULL_LINK {
                        tile.data.polys[i].first_link = link.next;
                    } else {
                        tile.links[prev as usize].next = link.next;
                    }
                    tile.free_link(j);
                } else {
                    prev = j;
                }
                j = link.next;
            }
        }
    }

    /// Polygons of a tile whose bounds overlap the box `qmin..qmax`
    pub fn query_polygons_in_tile(
        &self,
        tile: &MeshTile,
        qmin: Vec3,
        qmax: Vec3,
        filter: &QueryFilter,
    ) -> Vec<PolyRef> {
        let data = &tile.data;
        let mut polys = Vec::new();
        if !data.bv_tree.is_empty() {
            let h = &data.header;
            let q = h.bv_quant_factor;
            let lo = (qmin.clamp(h.bmin, h.bmax) - h.bmin) * q;
            let hi = (qmax.clamp(h.bmin, h.bmax) - h.bmin) * q;
            let bmin = [lo.x, lo.y, lo.z].map(|v| (v as u16) & 0xfffe);
            let bmax = [hi.x, hi.y, hi.z].map(|v| ((v + 1.0) as u16) | 1);

            let mut i = 0;
            while i < data.bv_tree.len() {
                let node = &data.bv_tree[i];
                let overlap = overlap_quant_bounds(&bmin, &bmax, &node.bmin, &node.bmax);
                let leaf = node.i >= 0;
                if leaf && overlap {
                    if let Some(poly) = data.polys.get(node.i as usize) {
                        if filter.pass_filter(poly) {
                            polys.push(self.poly_ref(tile, node.i as usize));
                        }
                    }
                }
                if overlap || leaf {
                    i += 1;
                } else {
                    i += node.i.unsigned_abs() as usize;
                }
            }
        } else {
            for (i, poly) in data.polys.iter().enumerate() {
                if poly.poly_type() == PolyType::OffMeshConnection || !filter.pass_filter(poly) {
                    continue;
                }
                let Some((bmin, bmax)) = calc_bounds(&data.poly_vertices(poly)) else {
                    continue;
                };
                if overlap_bounds(qmin, qmax, bmin, bmax) {
                    polys.push(self.poly_ref(tile, i));
                }
            }
        }
        polys
    }

    /// Height of the detail surface of a polygon at `pos`, if `pos` lies over it
    pub fn poly_height(&self, tile: &MeshTile, poly_index: usize, pos: Vec3) -> Option<f32> {
        let data = &tile.data;
        let poly = &data.polys[poly_index];
        if poly.poly_type() == PolyType::OffMeshConnection {
            return None;
        }
        if !point_in_polygon(pos, &data.poly_vertices(poly)) {
            return None;
        }
        for t in data.detail_triangles(poly_index) {
            let [a, b, c] = [t[0], t[1], t[2]].map(|k| data.detail_vertex(poly_index, k));
            if let Some(h) = closest_height_point_triangle(pos, a, b, c) {
                return Some(h);
            }
        }
        // On an edge shared by two detail triangles, numerically outside both.
        Some(closest_point_on_detail_edges(data, poly_index, pos, false).y)
    }

    /// Closest point on a polygon to `pos` and whether `pos` lies over the polygon
    pub fn closest_point_on_poly(&self, r: PolyRef, pos: Vec3) -> Result<(Vec3, bool)> {
        let (tile, _) = self.tile_and_poly_by_ref(r)?;
        let ip = self.encoding.decode_poly(r) as usize;
        if let Some(h) = self.poly_height(tile, ip, pos) {
            return Ok((Vec3::new(pos.x, h, pos.z), true));
        }
        Ok((closest_point_on_detail_edges(&tile.data, ip, pos, true), false))
    }
}

/// Closest point to `pos` on the detail edges of a polygon
fn closest_point_on_detail_edges(
    data: &TileData,
    poly_index: usize,
    pos: Vec3,
    only_boundary: bool,
) -> Vec3 {
    let mut dmin = f32::MAX;
    let mut best = None;
    for t in data.detail_triangles(poly_index) {
        let v = [t[0], t[1], t[2]].map(|k| data.detail_vertex(poly_index, k));
        let mut j = 2;
        for k in 0..3 {
            let boundary = detail_tri_edge_flags(t[3], j) & DETAIL_EDGE_BOUNDARY != 0;
            // Inner edges are shared by two triangles, visit them once.
            if boundary || (!only_boundary && t[j] < t[k]) {
                let (d, s) = dist_point_segment_sqr_2d(pos, v[j], v[k]);
                if d < dmin {
                    dmin = d;
                    best = Some(v[j].lerp(v[k], s));
                }
            }
            j = k;
        }
    }
    best.unwrap_or(pos)
}

fn slab_coord(v: Vec3, side: u8) -> f32 {
    if side == 0 || side == 4 {
        v.x
    } else {
        v.z
    }
}

/// Portal edge end points as `(along, height)` pairs ordered along the edge
fn calc_slab_end_points(va: Vec3, vb: Vec3, side: u8) -> ([f32; 2], [f32; 2]) {
    if side == 0 || side == 4 {
        if va.z < vb.z {
            ([va.z, va.y], [vb.z, vb.y])
        } else {
            ([vb.z, vb.y], [va.z, va.y])
        }
    } else if va.x < vb.x {
        ([va.x, va.y], [vb.x, vb.y])
    } else {
        ([vb.x, vb.y], [va.x, va.y])
    }
}

fn overlap_slabs(amin: [f32; 2], amax: [f32; 2], bmin: [f32; 2], bmax: [f32; 2], px: f32, py: f32) -> bool {
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]);
    let bk = bmin[1] - bd * bmin[0];
    let dmin = (bd * minx + bk) - (ad * minx + ak);
    let dmax = (bd * maxx + bk) - (ad * maxx + ak);

    // Crossing segments always overlap.
    if dmin * dmax < 0.0 {
        return true;
    }
    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_tiles::{grid_tile, grid_tile_bytes};

    fn params(tile_size: f32) -> NavMeshParams {
        NavMeshParams {
            origin: Vec3::ZERO,
            tile_width: tile_size,
            tile_height: tile_size,
            max_tiles: 16,
            max_polys: 64,
        }
    }

    #[test]
    fn test_rejects_bad_params() {
        let mut p = params(4.0);
        p.tile_width = 0.0;
        assert!(NavMesh::new(p).is_err());
        let mut p = params(4.0);
        p.max_tiles = 1 << 20;
        p.max_polys = 1 << 10;
        assert!(NavMesh::new(p).is_err());
    }

    #[test]
    fn test_internal_links() {
        let mut mesh = NavMesh::new(params(2.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 2, 1, 1.0)).unwrap();
        let tile = mesh.tile_at(0, 0, 0).unwrap();
        let links: Vec<&Link> = tile.poly_links(0).collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].edge, 2);
        assert_eq!(links[0].side, LINK_SIDE_INTERNAL);
        assert_eq!(links[0].poly_ref, mesh.poly_ref(tile, 1));
    }

    #[test]
    fn test_external_links_follow_neighbours() {
        let mut mesh = NavMesh::new(params(2.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 2, 2, 1.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(1, 0, 2, 2, 1.0)).unwrap();

        let left = mesh.tile_at(0, 0, 0).unwrap();
        let right = mesh.tile_at(1, 0, 0).unwrap();
        // Polygon 1 of the left tile sits on its +x border.
        let ext: Vec<&Link> = left.poly_links(1).filter(|l| l.side == 0).collect();
        assert_eq!(ext.len(), 1);
        assert_eq!(ext[0].poly_ref, mesh.poly_ref(right, 0));
        assert_eq!((ext[0].bmin, ext[0].bmax), (0, 255));

        let back: Vec<&Link> = right.poly_links(0).filter(|l| l.side == 4).collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].poly_ref, mesh.poly_ref(left, 1));
    }

    #[test]
    fn test_remove_tile_unlinks_and_invalidates() {
        let mut mesh = NavMesh::new(params(2.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 2, 2, 1.0)).unwrap();
        let right_ref = mesh.add_tile(&grid_tile_bytes(1, 0, 2, 2, 1.0)).unwrap();
        let right_poly = mesh.poly_ref(mesh.tile_by_ref(right_ref).unwrap(), 0);
        assert!(mesh.is_valid_poly_ref(right_poly));

        let raw = mesh.remove_tile(right_ref).unwrap();
        assert_eq!(raw, grid_tile_bytes(1, 0, 2, 2, 1.0));
        assert_eq!(mesh.tile_count(), 1);
        assert!(!mesh.is_valid_poly_ref(right_poly));
        assert!(mesh.tile_by_ref(right_ref).is_none());
        assert!(mesh.remove_tile(right_ref).is_err());

        let left = mesh.tile_at(0, 0, 0).unwrap();
        assert!(left.poly_links(1).all(|l| l.side == LINK_SIDE_INTERNAL));

        // The slot is reused with a new salt.
        let again = mesh.add_tile(&grid_tile_bytes(1, 0, 2, 2, 1.0)).unwrap();
        assert_ne!(again, right_ref);
        assert!(!mesh.is_valid_poly_ref(right_poly));
    }

    #[test]
    fn test_occupied_coordinate_is_rejected() {
        let mut mesh = NavMesh::new(params(2.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 2, 2, 1.0)).unwrap();
        let err = mesh.add_tile(&grid_tile_bytes(0, 0, 2, 2, 1.0)).unwrap_err();
        assert!(err.to_string().contains("already occupied"));
        assert_eq!(mesh.tile_count(), 1);
    }

    #[test]
    fn test_slot_capacity() {
        let mut p = params(1.0);
        p.max_tiles = 2;
        let mut mesh = NavMesh::new(p).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 1, 1, 1.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(5, 5, 1, 1, 1.0)).unwrap();
        assert!(mesh.add_tile(&grid_tile_bytes(9, 9, 1, 1, 1.0)).is_err());
        assert_eq!(mesh.tile_count(), 2);
    }

    #[test]
    fn test_too_many_polys_for_reference() {
        let mut p = params(8.0);
        p.max_polys = 16;
        let mut mesh = NavMesh::new(p).unwrap();
        assert!(mesh.add_tile(&grid_tile_bytes(0, 0, 8, 8, 1.0)).is_err());
        assert_eq!(mesh.tile_count(), 0);
    }

    #[test]
    fn test_query_polygons_with_bv_tree() {
        let mut mesh = NavMesh::new(params(4.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 4, 4, 1.0)).unwrap();
        let tile = mesh.tile_at(0, 0, 0).unwrap();
        let filter = QueryFilter::default();
        let found = mesh.query_polygons_in_tile(
            tile,
            Vec3::new(0.2, -1.0, 0.2),
            Vec3::new(0.4, 1.0, 0.4),
            &filter,
        );
        assert!(found.contains(&mesh.poly_ref(tile, 0)));
        assert!(!found.contains(&mesh.poly_ref(tile, 15)));

        let all = mesh.query_polygons_in_tile(
            tile,
            Vec3::new(-10.0, -10.0, -10.0),
            Vec3::new(10.0, 10.0, 10.0),
            &filter,
        );
        assert_eq!(all.len(), 16);
    }

    #[test]
    fn test_closest_point_on_poly() {
        let mut mesh = NavMesh::new(params(2.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 2, 2, 1.0)).unwrap();
        let tile = mesh.tile_at(0, 0, 0).unwrap();
        let r = mesh.poly_ref(tile, 0);

        let (p, over) = mesh.closest_point_on_poly(r, Vec3::new(0.5, 3.0, 0.5)).unwrap();
        assert!(over);
        assert!((p - Vec3::new(0.5, 0.0, 0.5)).length() < 1e-5);

        let (p, over) = mesh.closest_point_on_poly(r, Vec3::new(-1.0, 0.0, 0.5)).unwrap();
        assert!(!over);
        assert!((p - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-5);
    }

    #[test]
    fn test_poly_flags_and_area() {
        let mut mesh = NavMesh::new(params(2.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 1, 1, 2.0)).unwrap();
        let r = mesh.poly_ref(mesh.tile_at(0, 0, 0).unwrap(), 0);
        assert_eq!(mesh.poly_flags(r).unwrap(), PolyFlags::WALK);
        mesh.set_poly_flags(r, PolyFlags::DISABLED).unwrap();
        mesh.set_poly_area(r, 7).unwrap();
        assert_eq!(mesh.poly_flags(r).unwrap(), PolyFlags::DISABLED);
        assert_eq!(mesh.poly_area(r).unwrap(), 7);
        assert!(mesh.poly_flags(PolyRef::NULL).is_err());
    }

    #[test]
    fn test_tile_loc() {
        let mesh = NavMesh::new(params(9.6)).unwrap();
        assert_eq!(mesh.calc_tile_loc(Vec3::new(1.0, 0.0, 1.0)), (0, 0));
        assert_eq!(mesh.calc_tile_loc(Vec3::new(-0.1, 0.0, 10.0)), (-1, 1));
    }

    #[test]
    fn test_overlap_slabs() {
        assert!(overlap_slabs([0.0, 0.0], [2.0, 0.0], [1.0, 0.0], [3.0, 0.0], 0.01, 0.5));
        assert!(!overlap_slabs([0.0, 0.0], [1.0, 0.0], [1.0, 0.0], [3.0, 0.0], 0.01, 0.5));
        // Too far apart vertically.
        assert!(!overlap_slabs([0.0, 0.0], [2.0, 0.0], [0.0, 5.0], [2.0, 5.0], 0.01, 0.5));
    }

    #[test]
    fn test_grid_tile_matches_header() {
        let tile = grid_tile(0, 0, 3, 3, 1.0);
        assert_eq!(tile.header.poly_count, 9);
        assert_eq!(tile.header.detail_mesh_count, 9);
    }
}
