//! Tile data: creation from a polygon mesh and the little-endian binary layout
//!
//! A serialized tile is a header followed by these sections, each padded to four bytes:
//! vertices, polygons, link space, detail meshes, detail vertices, detail triangles, BV
//! tree nodes and off-mesh connections. The link space is reserved in the data but
//! links are only built once the tile is added to a [`NavMesh`](crate::NavMesh).

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use nav_build::{PolyMesh, PolyMeshDetail, MESH_NULL_IDX};
use nav_common::{align4, calc_bounds, Error, Result, MAX_VERTS_PER_POLY};

use crate::{PolyFlags, Status, EXT_LINK, NULL_LINK};

/// Magic number at the start of every tile ('DNAV')
pub const NAVMESH_MAGIC: u32 =
    ((b'D' as u32) << 24) | ((b'N' as u32) << 16) | ((b'A' as u32) << 8) | (b'V' as u32);

/// Version of the binary tile layout
pub const NAVMESH_VERSION: u32 = 7;

const HEADER_SIZE: usize = 100;
const VERT_SIZE: usize = 12;
const POLY_SIZE: usize = 32;
const LINK_SIZE: usize = 12;
const POLY_DETAIL_SIZE: usize = 12;
const DETAIL_TRI_SIZE: usize = 4;
const BV_NODE_SIZE: usize = 16;
const OFF_MESH_CON_SIZE: usize = 36;

/// Kind of a polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolyType {
    /// Regular polygon on the walkable surface
    #[default]
    Ground = 0,
    /// Two point connection between surfaces
    OffMeshConnection = 1,
}

/// Tile header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileHeader {
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: usize,
    pub vert_count: usize,
    pub max_link_count: usize,
    pub detail_mesh_count: usize,
    pub detail_vert_count: usize,
    pub detail_tri_count: usize,
    pub bv_node_count: usize,
    pub off_mesh_con_count: usize,
    /// Index of the first off-mesh connection polygon
    pub off_mesh_base: usize,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    /// Scale from world units to BV tree units
    pub bv_quant_factor: f32,
}

impl TileHeader {
    /// Size in bytes of the tile described by this header
    pub fn data_size(&self) -> usize {
        align4(HEADER_SIZE)
            + align4(VERT_SIZE * self.vert_count)
            + align4(POLY_SIZE * self.poly_count)
            + align4(LINK_SIZE * self.max_link_count)
            + align4(POLY_DETAIL_SIZE * self.detail_mesh_count)
            + align4(VERT_SIZE * self.detail_vert_count)
            + align4(DETAIL_TRI_SIZE * self.detail_tri_count)
            + align4(BV_NODE_SIZE * self.bv_node_count)
            + align4(OFF_MESH_CON_SIZE * self.off_mesh_con_count)
    }
}

/// Polygon of a tile
#[derive(Debug, Clone, PartialEq)]
pub struct Poly {
    /// Head of the polygon's link list, only meaningful once the tile is loaded
    pub first_link: u32,
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per edge: 0 for a wall, `index + 1` for an internal neighbour, or
    /// [`EXT_LINK`] plus a side for an edge on the tile border
    pub neis: [u16; MAX_VERTS_PER_POLY],
    pub flags: PolyFlags,
    pub vert_count: u8,
    pub(crate) area_and_type: u8,
}

impl Default for Poly {
    fn default() -> Self {
        Self {
            first_link: NULL_LINK,
            verts: [0; MAX_VERTS_PER_POLY],
            neis: [0; MAX_VERTS_PER_POLY],
            flags: PolyFlags::empty(),
            vert_count: 0,
            area_and_type: 0,
        }
    }
}

impl Poly {
    pub fn area(&self) -> u8 {
        self.area_and_type & 0x3f
    }

    pub fn set_area(&mut self, area: u8) {
        self.area_and_type = (self.area_and_type & 0xc0) | (area & 0x3f);
    }

    pub fn poly_type(&self) -> PolyType {
        if self.area_and_type >> 6 == PolyType::OffMeshConnection as u8 {
            PolyType::OffMeshConnection
        } else {
            PolyType::Ground
        }
    }

    pub fn set_type(&mut self, poly_type: PolyType) {
        self.area_and_type = (self.area_and_type & 0x3f) | ((poly_type as u8) << 6);
    }

    /// Vertex indices in use
    pub fn vert_indices(&self) -> &[u16] {
        &self.verts[..self.vert_count as usize]
    }
}

/// Detail submesh of a polygon
///
/// Triangle indices below the polygon's vertex count refer to polygon vertices, the
/// rest to `detail_verts[vert_base + index - poly.vert_count]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolyDetail {
    pub vert_base: u32,
    pub tri_base: u32,
    pub vert_count: u8,
    pub tri_count: u8,
}

/// Bounding volume tree node in quantized tile units
///
/// Leaf nodes carry the polygon index in `i`; internal nodes carry the negated number
/// of nodes to skip to leave the subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BVNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    pub i: i32,
}

/// Off-mesh connection record
///
/// The generation pipeline never emits these, the section exists so tiles from other
/// sources keep their layout.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OffMeshConnection {
    pub pos: [Vec3; 2],
    pub rad: f32,
    pub poly: u16,
    pub flags: u8,
    pub side: u8,
    pub user_id: u32,
}

/// A tile's geometry in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileData {
    pub header: TileHeader,
    pub verts: Vec<Vec3>,
    pub polys: Vec<Poly>,
    pub detail_meshes: Vec<PolyDetail>,
    pub detail_verts: Vec<Vec3>,
    pub detail_tris: Vec<[u8; 4]>,
    pub bv_tree: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
}

/// Inputs for creating a tile from the generation pipeline's output
#[derive(Debug, Clone, Copy)]
pub struct TileCreateParams<'a> {
    pub mesh: &'a PolyMesh,
    /// Without a detail mesh every polygon gets a flat triangle fan
    pub detail: Option<&'a PolyMeshDetail>,
    /// Agent height in world units
    pub walkable_height: f32,
    /// Agent radius in world units
    pub walkable_radius: f32,
    /// Agent climb in world units
    pub walkable_climb: f32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    pub user_id: u32,
    pub build_bv_tree: bool,
}

/// Builds and serializes a tile
pub fn create_tile_data(params: &TileCreateParams<'_>) -> Result<Vec<u8>> {
    TileData::from_create_params(params)?.to_bytes()
}

fn invalid(status: Status, message: impl AsRef<str>) -> Error {
    Error::TileData(format!("{}: {}", status, message.as_ref()))
}

impl TileData {
    /// Builds a tile from a polygon mesh and its optional detail mesh
    pub fn from_create_params(params: &TileCreateParams<'_>) -> Result<Self> {
        let mesh = params.mesh;
        let nvp = mesh.nvp;
        let fail = Status::FAILURE | Status::INVALID_PARAM;
        if !(3..=MAX_VERTS_PER_POLY).contains(&nvp) {
            return Err(invalid(fail, format!("{} vertices per polygon", nvp)));
        }
        if mesh.npolys == 0 {
            return Err(invalid(fail, "polygon mesh is empty"));
        }
        if mesh.verts.len() >= MESH_NULL_IDX as usize {
            return Err(invalid(fail, format!("{} vertices", mesh.verts.len())));
        }
        if let Some(detail) = params.detail {
            if detail.meshes.len() != mesh.npolys {
                return Err(invalid(
                    fail,
                    format!(
                        "{} detail submeshes for {} polygons",
                        detail.meshes.len(),
                        mesh.npolys
                    ),
                ));
            }
        }

        let mut edge_count = 0;
        let mut portal_count = 0;
        for i in 0..mesh.npolys {
            for &nei in mesh.poly_neighbours(i) {
                edge_count += 1;
                if nei & EXT_LINK != 0 && nei & 0xf != 0xf {
                    portal_count += 1;
                }
            }
        }

        let verts: Vec<Vec3> = (0..mesh.verts.len()).map(|i| mesh.vertex_position(i)).collect();
        let polys = (0..mesh.npolys).map(|i| tile_poly(mesh, i)).collect::<Vec<_>>();

        let (detail_meshes, detail_verts, detail_tris) = match params.detail {
            Some(detail) => copy_detail_meshes(&polys, detail)?,
            None => fan_detail_meshes(&polys),
        };

        let mut header = TileHeader {
            x: params.tile_x,
            y: params.tile_y,
            layer: params.tile_layer,
            user_id: params.user_id,
            poly_count: polys.len(),
            vert_count: verts.len(),
            max_link_count: edge_count + portal_count * 2,
            detail_mesh_count: detail_meshes.len(),
            detail_vert_count: detail_verts.len(),
            detail_tri_count: detail_tris.len(),
            bv_node_count: 0,
            off_mesh_con_count: 0,
            off_mesh_base: polys.len(),
            walkable_height: params.walkable_height,
            walkable_radius: params.walkable_radius,
            walkable_climb: params.walkable_climb,
            bmin: mesh.bmin,
            bmax: mesh.bmax,
            bv_quant_factor: 1.0 / mesh.cs,
        };

        let mut tile = TileData {
            header: header.clone(),
            verts,
            polys,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_tree: Vec::new(),
            off_mesh_cons: Vec::new(),
        };
        if params.build_bv_tree {
            tile.bv_tree = build_bv_tree(&tile);
        }
        header.bv_node_count = tile.bv_tree.len();
        tile.header = header;
        Ok(tile)
    }

    /// World positions of a polygon's vertices
    pub fn poly_vertices(&self, poly: &Poly) -> Vec<Vec3> {
        poly.vert_indices()
            .iter()
            .map(|&v| self.verts[v as usize])
            .collect()
    }

    /// Vertex `index` of the detail submesh of polygon `poly_index`
    pub fn detail_vertex(&self, poly_index: usize, index: u8) -> Vec3 {
        let poly = &self.polys[poly_index];
        if index < poly.vert_count {
            self.verts[poly.verts[index as usize] as usize]
        } else {
            let pd = &self.detail_meshes[poly_index];
            self.detail_verts[pd.vert_base as usize + (index - poly.vert_count) as usize]
        }
    }

    /// Detail triangles of polygon `poly_index`
    pub fn detail_triangles(&self, poly_index: usize) -> &[[u8; 4]] {
        let pd = &self.detail_meshes[poly_index];
        let base = pd.tri_base as usize;
        &self.detail_tris[base..base + pd.tri_count as usize]
    }

    /// Parses a serialized tile
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(invalid(
                Status::FAILURE | Status::INVALID_PARAM,
                format!("{} bytes is shorter than a tile header", data.len()),
            ));
        }
        let mut r = Cursor::new(data);
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != NAVMESH_MAGIC {
            return Err(invalid(
                Status::FAILURE | Status::WRONG_MAGIC,
                format!("magic {:#010x}", magic),
            ));
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != NAVMESH_VERSION {
            return Err(invalid(
                Status::FAILURE | Status::WRONG_VERSION,
                format!("version {}", version),
            ));
        }
        let header = read_header(&mut r)?;
        let size = header.data_size();
        if data.len() < size {
            return Err(invalid(
                Status::FAILURE | Status::INVALID_PARAM,
                format!("tile needs {} bytes, got {}", size, data.len()),
            ));
        }

        let verts = read_section(&mut r, header.vert_count, VERT_SIZE, |r| read_vec3(r))?;
        let polys = read_section(&mut r, header.poly_count, POLY_SIZE, read_poly)?;
        skip_section(&mut r, header.max_link_count, LINK_SIZE);
        let detail_meshes =
            read_section(&mut r, header.detail_mesh_count, POLY_DETAIL_SIZE, read_poly_detail)?;
        let detail_verts =
            read_section(&mut r, header.detail_vert_count, VERT_SIZE, |r| read_vec3(r))?;
        let detail_tris = read_section(&mut r, header.detail_tri_count, DETAIL_TRI_SIZE, |r| {
            let mut t = [0u8; 4];
            r.read_exact(&mut t)?;
            Ok(t)
        })?;
        let bv_tree = read_section(&mut r, header.bv_node_count, BV_NODE_SIZE, read_bv_node)?;
        let off_mesh_cons = read_section(
            &mut r,
            header.off_mesh_con_count,
            OFF_MESH_CON_SIZE,
            read_off_mesh_connection,
        )?;

        let tile = TileData {
            header,
            verts,
            polys,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_tree,
            off_mesh_cons,
        };
        tile.validate()?;
        Ok(tile)
    }

    /// Serializes the tile
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let h = &self.header;
        let counts_match = h.vert_count == self.verts.len()
            && h.poly_count == self.polys.len()
            && h.detail_mesh_count == self.detail_meshes.len()
            && h.detail_vert_count == self.detail_verts.len()
            && h.detail_tri_count == self.detail_tris.len()
            && h.bv_node_count == self.bv_tree.len()
            && h.off_mesh_con_count == self.off_mesh_cons.len();
        if !counts_match {
            return Err(invalid(
                Status::FAILURE | Status::INVALID_PARAM,
                "header counts do not match the tile contents",
            ));
        }

        let mut w = Vec::with_capacity(h.data_size());
        write_header(&mut w, h)?;
        for v in &self.verts {
            write_vec3(&mut w, *v)?;
        }
        pad4(&mut w);
        for p in &self.polys {
            // Links are rebuilt on load.
            w.write_u32::<LittleEndian>(NULL_LINK)?;
            for v in p.verts {
                w.write_u16::<LittleEndian>(v)?;
            }
            for n in p.neis {
                w.write_u16::<LittleEndian>(n)?;
            }
            w.write_u16::<LittleEndian>(p.flags.bits())?;
            w.write_u8(p.vert_count)?;
            w.write_u8(p.area_and_type)?;
        }
        pad4(&mut w);
        w.resize(w.len() + LINK_SIZE * h.max_link_count, 0);
        pad4(&mut w);
        for pd in &self.detail_meshes {
            w.write_u32::<LittleEndian>(pd.vert_base)?;
            w.write_u32::<LittleEndian>(pd.tri_base)?;
            w.write_u8(pd.vert_count)?;
            w.write_u8(pd.tri_count)?;
            w.write_u16::<LittleEndian>(0)?;
        }
        pad4(&mut w);
        for v in &self.detail_verts {
            write_vec3(&mut w, *v)?;
        }
        pad4(&mut w);
        for t in &self.detail_tris {
            w.write_all(t)?;
        }
        pad4(&mut w);
        for node in &self.bv_tree {
            for v in node.bmin {
                w.write_u16::<LittleEndian>(v)?;
            }
            for v in node.bmax {
                w.write_u16::<LittleEndian>(v)?;
            }
            w.write_i32::<LittleEndian>(node.i)?;
        }
        pad4(&mut w);
        for con in &self.off_mesh_cons {
            write_vec3(&mut w, con.pos[0])?;
            write_vec3(&mut w, con.pos[1])?;
            w.write_f32::<LittleEndian>(con.rad)?;
            w.write_u16::<LittleEndian>(con.poly)?;
            w.write_u8(con.flags)?;
            w.write_u8(con.side)?;
            w.write_u32::<LittleEndian>(con.user_id)?;
        }
        pad4(&mut w);
        Ok(w)
    }

    /// Checks every index in the tile so that queries never read out of bounds
    fn validate(&self) -> Result<()> {
        let fail = Status::FAILURE | Status::INVALID_PARAM;
        for (i, poly) in self.polys.iter().enumerate() {
            let nv = poly.vert_count as usize;
            if !(3..=MAX_VERTS_PER_POLY).contains(&nv) {
                return Err(invalid(fail, format!("polygon {} has {} vertices", i, nv)));
            }
            if poly.vert_indices().iter().any(|&v| v as usize >= self.verts.len()) {
                return Err(invalid(fail, format!("polygon {} vertex out of range", i)));
            }
            let bad_nei = poly.neis[..nv]
                .iter()
                .any(|&n| n != 0 && n & EXT_LINK == 0 && n as usize > self.polys.len());
            if bad_nei {
                return Err(invalid(fail, format!("polygon {} neighbour out of range", i)));
            }
        }
        if self.detail_meshes.len() != self.polys.len() {
            return Err(invalid(fail, "detail submesh count differs from polygon count"));
        }
        for (i, pd) in self.detail_meshes.iter().enumerate() {
            let vert_end = pd.vert_base as usize + pd.vert_count as usize;
            let tri_end = pd.tri_base as usize + pd.tri_count as usize;
            if vert_end > self.detail_verts.len() || tri_end > self.detail_tris.len() {
                return Err(invalid(fail, format!("detail submesh {} out of range", i)));
            }
            let nv = self.polys[i].vert_count as usize + pd.vert_count as usize;
            let bad_tri = self.detail_tris[pd.tri_base as usize..tri_end]
                .iter()
                .any(|t| t[..3].iter().any(|&k| k as usize >= nv));
            if bad_tri {
                return Err(invalid(fail, format!("detail submesh {} index out of range", i)));
            }
        }
        let bad_node = self
            .bv_tree
            .iter()
            .any(|n| n.i >= 0 && n.i as usize >= self.polys.len());
        if bad_node {
            return Err(invalid(fail, "BV tree leaf out of range"));
        }
        // Escape offsets must stay inside the tree.
        let bad_escape = self.bv_tree.iter().enumerate().any(|(k, n)| {
            n.i < 0 && k + n.i.unsigned_abs() as usize > self.bv_tree.len()
        });
        if bad_escape {
            return Err(invalid(fail, "BV tree escape out of range"));
        }
        Ok(())
    }
}

fn tile_poly(mesh: &PolyMesh, i: usize) -> Poly {
    let mut p = Poly {
        flags: PolyFlags::from_bits_retain(mesh.flags[i]),
        ..Poly::default()
    };
    p.set_area(mesh.areas[i]);
    p.set_type(PolyType::Ground);
    let neis = mesh.poly_neighbours(i);
    for (j, &v) in mesh.poly_verts(i).iter().enumerate() {
        p.verts[j] = v;
        let nei = neis[j];
        p.neis[j] = if nei & EXT_LINK != 0 {
            // Border edges have no neighbour, portals map onto tile sides.
            match nei & 0xf {
                0 => EXT_LINK | 4,
                1 => EXT_LINK | 2,
                2 => EXT_LINK,
                3 => EXT_LINK | 6,
                _ => 0,
            }
        } else {
            nei + 1
        };
        p.vert_count += 1;
    }
    p
}

type DetailSections = (Vec<PolyDetail>, Vec<Vec3>, Vec<[u8; 4]>);

fn copy_detail_meshes(polys: &[Poly], detail: &PolyMeshDetail) -> Result<DetailSections> {
    let mut meshes = Vec::with_capacity(polys.len());
    let mut verts = Vec::new();
    for (poly, m) in polys.iter().zip(&detail.meshes) {
        let [vb, ndv, tb, ntris] = m.map(|v| v as usize);
        let nv = poly.vert_count as usize;
        let extra = ndv.saturating_sub(nv);
        if extra > u8::MAX as usize || ntris > u8::MAX as usize {
            return Err(invalid(
                Status::FAILURE | Status::INVALID_PARAM,
                format!("detail submesh with {} vertices and {} triangles", ndv, ntris),
            ));
        }
        meshes.push(PolyDetail {
            vert_base: verts.len() as u32,
            tri_base: tb as u32,
            vert_count: extra as u8,
            tri_count: ntris as u8,
        });
        // The polygon's own vertices come first and are not stored twice.
        verts.extend_from_slice(&detail.verts[vb + nv.min(ndv)..vb + ndv]);
    }
    Ok((meshes, verts, detail.tris.clone()))
}

pub(crate) fn fan_detail_meshes(polys: &[Poly]) -> DetailSections {
    let mut meshes = Vec::with_capacity(polys.len());
    let mut tris = Vec::new();
    for poly in polys {
        let nv = poly.vert_count;
        meshes.push(PolyDetail {
            vert_base: 0,
            tri_base: tris.len() as u32,
            vert_count: 0,
            tri_count: nv - 2,
        });
        for j in 2..nv {
            let mut flags = 1 << 2;
            if j == 2 {
                flags |= 1;
            }
            if j == nv - 1 {
                flags |= 1 << 4;
            }
            tris.push([0, j - 1, j, flags]);
        }
    }
    (meshes, Vec::new(), tris)
}

#[derive(Clone, Copy)]
struct BVItem {
    bmin: [u16; 3],
    bmax: [u16; 3],
    i: i32,
}

fn quantize(v: f32) -> u16 {
    (v as i32).clamp(0, 0xffff) as u16
}

pub(crate) fn build_bv_tree(tile: &TileData) -> Vec<BVNode> {
    let q = tile.header.bv_quant_factor;
    let origin = tile.header.bmin;
    let mut items: Vec<BVItem> = Vec::with_capacity(tile.polys.len());
    for (i, poly) in tile.polys.iter().enumerate() {
        let mut points = tile.poly_vertices(poly);
        if let Some(pd) = tile.detail_meshes.get(i) {
            let base = pd.vert_base as usize;
            points.extend_from_slice(&tile.detail_verts[base..base + pd.vert_count as usize]);
        }
        let Some((bmin, bmax)) = calc_bounds(&points) else {
            continue;
        };
        let lo = (bmin - origin) * q;
        let hi = (bmax - origin) * q;
        items.push(BVItem {
            bmin: [quantize(lo.x.floor()), quantize(lo.y.floor()), quantize(lo.z.floor())],
            bmax: [quantize(hi.x.ceil()), quantize(hi.y.ceil()), quantize(hi.z.ceil())],
            i: i as i32,
        });
    }

    let mut nodes = Vec::with_capacity(items.len() * 2);
    if !items.is_empty() {
        subdivide(&mut items, &mut nodes);
    }
    nodes
}

fn subdivide(items: &mut [BVItem], nodes: &mut Vec<BVNode>) {
    let icur = nodes.len();
    nodes.push(BVNode::default());

    if let [item] = items {
        nodes[icur] = BVNode {
            bmin: item.bmin,
            bmax: item.bmax,
            i: item.i,
        };
        return;
    }

    let mut bmin = items[0].bmin;
    let mut bmax = items[0].bmax;
    for it in items.iter().skip(1) {
        for k in 0..3 {
            bmin[k] = bmin[k].min(it.bmin[k]);
            bmax[k] = bmax[k].max(it.bmax[k]);
        }
    }

    let extent = [0, 1, 2].map(|k| bmax[k] as i32 - bmin[k] as i32);
    let mut axis = 0;
    if extent[1] > extent[axis] {
        axis = 1;
    }
    if extent[2] > extent[axis] {
        axis = 2;
    }
    items.sort_by_key(|it| it.bmin[axis]);

    let split = items.len() / 2;
    let (left, right) = items.split_at_mut(split);
    subdivide(left, nodes);
    subdivide(right, nodes);

    let escape = (nodes.len() - icur) as i32;
    nodes[icur] = BVNode {
        bmin,
        bmax,
        i: -escape,
    };
}

fn pad4(w: &mut Vec<u8>) {
    let len = align4(w.len());
    w.resize(len, 0);
}

fn write_vec3<W: Write>(w: &mut W, v: Vec3) -> std::io::Result<()> {
    w.write_f32::<LittleEndian>(v.x)?;
    w.write_f32::<LittleEndian>(v.y)?;
    w.write_f32::<LittleEndian>(v.z)
}

fn read_vec3<R: Read>(r: &mut R) -> std::io::Result<Vec3> {
    Ok(Vec3::new(
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
        r.read_f32::<LittleEndian>()?,
    ))
}

fn write_count<W: Write>(w: &mut W, count: usize) -> Result<()> {
    let count = i32::try_from(count).map_err(|_| {
        invalid(Status::FAILURE | Status::INVALID_PARAM, format!("count {}", count))
    })?;
    w.write_i32::<LittleEndian>(count)?;
    Ok(())
}

fn write_header<W: Write>(w: &mut W, h: &TileHeader) -> Result<()> {
    w.write_u32::<LittleEndian>(NAVMESH_MAGIC)?;
    w.write_u32::<LittleEndian>(NAVMESH_VERSION)?;
    w.write_i32::<LittleEndian>(h.x)?;
    w.write_i32::<LittleEndian>(h.y)?;
    w.write_i32::<LittleEndian>(h.layer)?;
    w.write_u32::<LittleEndian>(h.user_id)?;
    for count in [
        h.poly_count,
        h.vert_count,
        h.max_link_count,
        h.detail_mesh_count,
        h.detail_vert_count,
        h.detail_tri_count,
        h.bv_node_count,
        h.off_mesh_con_count,
        h.off_mesh_base,
    ] {
        write_count(w, count)?;
    }
    w.write_f32::<LittleEndian>(h.walkable_height)?;
    w.write_f32::<LittleEndian>(h.walkable_radius)?;
    w.write_f32::<LittleEndian>(h.walkable_climb)?;
    write_vec3(w, h.bmin)?;
    write_vec3(w, h.bmax)?;
    w.write_f32::<LittleEndian>(h.bv_quant_factor)?;
    Ok(())
}

/// Reads the header fields following magic and version
fn read_header<R: Read>(r: &mut R) -> Result<TileHeader> {
    let x = r.read_i32::<LittleEndian>()?;
    let y = r.read_i32::<LittleEndian>()?;
    let layer = r.read_i32::<LittleEndian>()?;
    let user_id = r.read_u32::<LittleEndian>()?;
    let mut counts = [0usize; 9];
    for count in counts.iter_mut() {
        let v = r.read_i32::<LittleEndian>()?;
        *count = usize::try_from(v).map_err(|_| {
            invalid(Status::FAILURE | Status::INVALID_PARAM, format!("negative count {}", v))
        })?;
    }
    let [poly_count, vert_count, max_link_count, detail_mesh_count, detail_vert_count, detail_tri_count, bv_node_count, off_mesh_con_count, off_mesh_base] =
        counts;
    Ok(TileHeader {
        x,
        y,
        layer,
        user_id,
        poly_count,
        vert_count,
        max_link_count,
        detail_mesh_count,
        detail_vert_count,
        detail_tri_count,
        bv_node_count,
        off_mesh_con_count,
        off_mesh_base,
        walkable_height: r.read_f32::<LittleEndian>()?,
        walkable_radius: r.read_f32::<LittleEndian>()?,
        walkable_climb: r.read_f32::<LittleEndian>()?,
        bmin: read_vec3(r)?,
        bmax: read_vec3(r)?,
        bv_quant_factor: r.read_f32::<LittleEndian>()?,
    })
}

fn read_section<T>(
    r: &mut Cursor<&[u8]>,
    count: usize,
    item_size: usize,
    mut read: impl FnMut(&mut Cursor<&[u8]>) -> std::io::Result<T>,
) -> Result<Vec<T>> {
    let start = r.position();
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read(r)?);
    }
    r.set_position(start + align4(item_size * count) as u64);
    Ok(items)
}

fn skip_section(r: &mut Cursor<&[u8]>, count: usize, item_size: usize) {
    let pos = r.position() + align4(item_size * count) as u64;
    r.set_position(pos);
}

fn read_poly(r: &mut Cursor<&[u8]>) -> std::io::Result<Poly> {
    let _first_link = r.read_u32::<LittleEndian>()?;
    let mut verts = [0u16; MAX_VERTS_PER_POLY];
    r.read_u16_into::<LittleEndian>(&mut verts)?;
    let mut neis = [0u16; MAX_VERTS_PER_POLY];
    r.read_u16_into::<LittleEndian>(&mut neis)?;
    let flags = PolyFlags::from_bits_retain(r.read_u16::<LittleEndian>()?);
    let vert_count = r.read_u8()?;
    let area_and_type = r.read_u8()?;
    Ok(Poly {
        first_link: NULL_LINK,
        verts,
        neis,
        flags,
        vert_count,
        area_and_type,
    })
}

fn read_poly_detail(r: &mut Cursor<&[u8]>) -> std::io::Result<PolyDetail> {
    let pd = PolyDetail {
        vert_base: r.read_u32::<LittleEndian>()?,
        tri_base: r.read_u32::<LittleEndian>()?,
        vert_count: r.read_u8()?,
        tri_count: r.read_u8()?,
    };
    let _pad = r.read_u16::<LittleEndian>()?;
    Ok(pd)
}

fn read_bv_node(r: &mut Cursor<&[u8]>) -> std::io::Result<BVNode> {
    let mut bmin = [0u16; 3];
    r.read_u16_into::<LittleEndian>(&mut bmin)?;
    let mut bmax = [0u16; 3];
    r.read_u16_into::<LittleEndian>(&mut bmax)?;
    Ok(BVNode {
        bmin,
        bmax,
        i: r.read_i32::<LittleEndian>()?,
    })
}

fn read_off_mesh_connection(r: &mut Cursor<&[u8]>) -> std::io::Result<OffMeshConnection> {
    Ok(OffMeshConnection {
        pos: [read_vec3(r)?, read_vec3(r)?],
        rad: r.read_f32::<LittleEndian>()?,
        poly: r.read_u16::<LittleEndian>()?,
        flags: r.read_u8()?,
        side: r.read_u8()?,
        user_id: r.read_u32::<LittleEndian>()?,
    })
}
