//! Convex polygon mesh built from region contours
//!
//! Each contour is triangulated by ear clipping and the triangles are greedily merged
//! back into convex polygons of at most `nvp` vertices. Vertices flagged as lying on the
//! tile border are removed afterwards, polygon adjacency is computed and edges on the
//! tile bounds are marked as portals to the neighbouring tiles.

use std::collections::HashMap;

use glam::Vec3;
use nav_common::{Error, Result, MAX_VERTS_PER_POLY};

use crate::contour::{ContourSet, BORDER_VERTEX};
use crate::triangle_utils::{
    area2, intersect, intersect_prop, left, left_on, next, prev, vequal_xz,
};
use crate::{EXT_LINK, MESH_NULL_IDX, MULTIPLE_REGS};

const CAN_REMOVE: u32 = 0x8000_0000;
const INDEX_MASK: u32 = 0x0fff_ffff;

/// Polygon mesh of one tile
///
/// Vertex coordinates are in cells relative to `bmin`. Polygon `i` occupies
/// `polys[i * 2 * nvp..(i + 1) * 2 * nvp]`: the first `nvp` entries are vertex indices,
/// the next `nvp` the neighbour across each edge. Unused slots hold [`MESH_NULL_IDX`],
/// and neighbours with the [`EXT_LINK`] bit set are portals whose low bits give the
/// direction of the adjacent tile.
#[derive(Debug, Clone)]
pub struct PolyMesh {
    pub verts: Vec<[u16; 3]>,
    pub polys: Vec<u16>,
    pub regs: Vec<u16>,
    pub flags: Vec<u16>,
    pub areas: Vec<u8>,
    pub npolys: usize,
    pub nvp: usize,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub border_size: i32,
    pub max_edge_error: f32,
}

/// Per-contour working polygon before padding
type WorkPoly = Vec<u16>;

impl PolyMesh {
    /// Polygonizes every contour of `cset` into convex polygons of at most `nvp` vertices
    pub fn build(cset: &ContourSet, nvp: usize) -> Result<Self> {
        if !(3..=MAX_VERTS_PER_POLY).contains(&nvp) {
            return Err(Error::NavMeshGeneration(format!(
                "vertices per polygon must be in 3..={}, got {}",
                MAX_VERTS_PER_POLY, nvp
            )));
        }

        let max_vertices: usize = cset
            .contours
            .iter()
            .filter(|c| c.verts.len() >= 3)
            .map(|c| c.verts.len())
            .sum();
        if max_vertices >= 0xfffe {
            return Err(Error::NavMeshGeneration(format!(
                "too many vertices ({})",
                max_vertices
            )));
        }

        let mut verts: Vec<[u16; 3]> = Vec::with_capacity(max_vertices);
        let mut vert_flags: Vec<bool> = Vec::with_capacity(max_vertices);
        let mut vert_lookup: HashMap<(u16, u16), Vec<u16>> = HashMap::new();
        let mut polys: Vec<WorkPoly> = Vec::new();
        let mut regs: Vec<u16> = Vec::new();
        let mut areas: Vec<u8> = Vec::new();

        for (ci, contour) in cset.contours.iter().enumerate() {
            if contour.verts.len() < 3 {
                continue;
            }

            let mut indices: Vec<u32> = (0..contour.verts.len() as u32).collect();
            let (tris, complete) = triangulate(&contour.verts, &mut indices);
            if !complete {
                log::warn!("bad triangulation of contour {}", ci);
            }

            let mut mapped = Vec::with_capacity(contour.verts.len());
            for v in &contour.verts {
                let idx = add_vertex(
                    v[0] as u16,
                    v[1] as u16,
                    v[2] as u16,
                    &mut verts,
                    &mut vert_lookup,
                );
                if idx as usize == vert_flags.len() {
                    vert_flags.push(false);
                }
                if v[3] & BORDER_VERTEX != 0 {
                    vert_flags[idx as usize] = true;
                }
                mapped.push(idx);
            }

            let mut cont_polys: Vec<WorkPoly> = tris
                .iter()
                .filter(|t| t[0] != t[1] && t[0] != t[2] && t[1] != t[2])
                .map(|t| vec![mapped[t[0]], mapped[t[1]], mapped[t[2]]])
                .collect();
            if cont_polys.is_empty() {
                continue;
            }

            if nvp > 3 {
                merge_polys(&mut cont_polys, &verts, nvp, |_, _| {});
            }

            for p in cont_polys {
                polys.push(p);
                regs.push(contour.reg);
                areas.push(contour.area);
            }
        }

        // Drop the vertices on the tile border that only exist to follow it.
        let mut i = 0;
        while i < verts.len() {
            if vert_flags[i] && can_remove_vertex(&polys, i as u16) {
                remove_vertex(&mut polys, &mut regs, &mut areas, &mut verts, i as u16, nvp)?;
                vert_flags.remove(i);
            } else {
                i += 1;
            }
        }

        if verts.len() > 0xffff {
            return Err(Error::NavMeshGeneration(format!(
                "too many vertices ({})",
                verts.len()
            )));
        }
        if polys.len() > 0xfffe {
            return Err(Error::NavMeshGeneration(format!(
                "too many polygons ({})",
                polys.len()
            )));
        }

        let npolys = polys.len();
        let mut flat = vec![MESH_NULL_IDX; npolys * nvp * 2];
        for (pi, p) in polys.iter().enumerate() {
            flat[pi * nvp * 2..pi * nvp * 2 + p.len()].copy_from_slice(p);
        }
        build_mesh_adjacency(&mut flat, npolys, verts.len(), nvp);

        let mut mesh = PolyMesh {
            verts,
            polys: flat,
            regs,
            flags: vec![0; npolys],
            areas,
            npolys,
            nvp,
            bmin: cset.bmin,
            bmax: cset.bmax,
            cs: cset.cs,
            ch: cset.ch,
            border_size: cset.border_size,
            max_edge_error: cset.max_error,
        };
        if mesh.border_size > 0 {
            mesh.mark_portal_edges(cset.width, cset.height);
        }
        Ok(mesh)
    }

    /// Vertex and neighbour slots of polygon `i`
    #[inline]
    pub fn poly(&self, i: usize) -> &[u16] {
        &self.polys[i * self.nvp * 2..(i + 1) * self.nvp * 2]
    }

    /// Vertex indices of polygon `i`, without the unused slots
    pub fn poly_verts(&self, i: usize) -> &[u16] {
        let p = &self.poly(i)[..self.nvp];
        let n = p.iter().take_while(|&&v| v != MESH_NULL_IDX).count();
        &p[..n]
    }

    /// Neighbour slots of polygon `i`, one per edge
    pub fn poly_neighbours(&self, i: usize) -> &[u16] {
        let n = self.poly_verts(i).len();
        &self.poly(i)[self.nvp..self.nvp + n]
    }

    /// World position of vertex `i`
    pub fn vertex_position(&self, i: usize) -> Vec3 {
        let v = self.verts[i];
        self.bmin + Vec3::new(v[0] as f32 * self.cs, v[1] as f32 * self.ch, v[2] as f32 * self.cs)
    }

    fn mark_portal_edges(&mut self, w: i32, h: i32) {
        let nvp = self.nvp;
        for pi in 0..self.npolys {
            let nv = self.poly_verts(pi).len();
            let base = pi * nvp * 2;
            for j in 0..nv {
                if self.polys[base + nvp + j] != MESH_NULL_IDX {
                    continue;
                }
                let nj = if j + 1 >= nv { 0 } else { j + 1 };
                let va = self.verts[self.polys[base + j] as usize];
                let vb = self.verts[self.polys[base + nj] as usize];
                let (ax, az, bx, bz) = (va[0] as i32, va[2] as i32, vb[0] as i32, vb[2] as i32);
                let dir = if ax == 0 && bx == 0 {
                    Some(0)
                } else if az == h && bz == h {
                    Some(1)
                } else if ax == w && bx == w {
                    Some(2)
                } else if az == 0 && bz == 0 {
                    Some(3)
                } else {
                    None
                };
                if let Some(dir) = dir {
                    self.polys[base + nvp + j] = EXT_LINK | dir;
                }
            }
        }
    }
}

fn add_vertex(
    x: u16,
    y: u16,
    z: u16,
    verts: &mut Vec<[u16; 3]>,
    lookup: &mut HashMap<(u16, u16), Vec<u16>>,
) -> u16 {
    let bucket = lookup.entry((x, z)).or_default();
    if let Some(&i) = bucket
        .iter()
        .find(|&&i| (verts[i as usize][1] as i32 - y as i32).abs() <= 2)
    {
        return i;
    }
    let i = verts.len() as u16;
    verts.push([x, y, z]);
    bucket.push(i);
    i
}

fn vert_at<'a>(verts: &'a [[i32; 4]], indices: &[u32], i: usize) -> &'a [i32; 4] {
    &verts[(indices[i] & INDEX_MASK) as usize]
}

fn in_cone(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32]) -> bool {
    let n = indices.len();
    let pi = vert_at(verts, indices, i);
    let pj = vert_at(verts, indices, j);
    let pi1 = vert_at(verts, indices, next(i, n));
    let pin1 = vert_at(verts, indices, prev(i, n));

    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

fn in_cone_loose(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32]) -> bool {
    let n = indices.len();
    let pi = vert_at(verts, indices, i);
    let pj = vert_at(verts, indices, j);
    let pi1 = vert_at(verts, indices, next(i, n));
    let pin1 = vert_at(verts, indices, prev(i, n));

    if left_on(pin1, pi, pi1) {
        return left_on(pi, pj, pin1) && left_on(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// True if the segment `i j` crosses no polygon edge, ignoring edges incident to it
fn diagonalie(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32], strict: bool) -> bool {
    let n = indices.len();
    let d0 = vert_at(verts, indices, i);
    let d1 = vert_at(verts, indices, j);
    for k in 0..n {
        let k1 = next(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vert_at(verts, indices, k);
        let p1 = vert_at(verts, indices, k1);
        if vequal_xz(d0, p0) || vequal_xz(d1, p0) || vequal_xz(d0, p1) || vequal_xz(d1, p1) {
            continue;
        }
        let crosses = if strict {
            intersect(d0, d1, p0, p1)
        } else {
            intersect_prop(d0, d1, p0, p1)
        };
        if crosses {
            return false;
        }
    }
    true
}

fn diagonal(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32]) -> bool {
    in_cone(i, j, verts, indices) && diagonalie(i, j, verts, indices, true)
}

fn diagonal_loose(i: usize, j: usize, verts: &[[i32; 4]], indices: &[u32]) -> bool {
    in_cone_loose(i, j, verts, indices) && diagonalie(i, j, verts, indices, false)
}

/// Ear-clipping triangulation of the simple polygon `indices` into `verts`
///
/// Returns the triangles as positions into the original `indices`, and whether the
/// polygon was fully triangulated. A partial result is returned when the outline is
/// self-overlapping beyond what the loose diagonal test can recover.
fn triangulate(verts: &[[i32; 4]], indices: &mut Vec<u32>) -> (Vec<[usize; 3]>, bool) {
    let mut tris = Vec::with_capacity(indices.len().saturating_sub(2));
    if indices.len() < 3 {
        return (tris, false);
    }

    // The high bit marks vertices whose ear can be clipped.
    let n = indices.len();
    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, verts, indices) {
            indices[i1] |= CAN_REMOVE;
        }
    }

    let ear_len = |indices: &[u32], i: usize, far: usize| {
        let p0 = vert_at(verts, indices, i);
        let p2 = vert_at(verts, indices, far);
        let dx = p2[0] - p0[0];
        let dz = p2[2] - p0[2];
        dx * dx + dz * dz
    };

    while indices.len() > 3 {
        let n = indices.len();
        let mut best: Option<(i32, usize)> = None;
        for i in 0..n {
            let i1 = next(i, n);
            if indices[i1] & CAN_REMOVE != 0 {
                let len = ear_len(indices, i, next(i1, n));
                if best.map_or(true, |(l, _)| len < l) {
                    best = Some((len, i));
                }
            }
        }

        if best.is_none() {
            // Overlapping segments; retry with a looser diagonal test.
            for i in 0..n {
                let i1 = next(i, n);
                let i2 = next(i1, n);
                if diagonal_loose(i, i2, verts, indices) {
                    let len = ear_len(indices, i, next(i2, n));
                    if best.map_or(true, |(l, _)| len < l) {
                        best = Some((len, i));
                    }
                }
            }
        }

        let Some((_, i)) = best else {
            return (tris, false);
        };

        let i1 = next(i, n);
        let i2 = next(i1, n);
        tris.push([
            (indices[i] & INDEX_MASK) as usize,
            (indices[i1] & INDEX_MASK) as usize,
            (indices[i2] & INDEX_MASK) as usize,
        ]);

        indices.remove(i1);
        let n = indices.len();
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = prev(i1, n);

        if diagonal(prev(i, n), i1, verts, indices) {
            indices[i] |= CAN_REMOVE;
        } else {
            indices[i] &= INDEX_MASK;
        }
        if diagonal(i, next(i1, n), verts, indices) {
            indices[i1] |= CAN_REMOVE;
        } else {
            indices[i1] &= INDEX_MASK;
        }
    }

    tris.push([
        (indices[0] & INDEX_MASK) as usize,
        (indices[1] & INDEX_MASK) as usize,
        (indices[2] & INDEX_MASK) as usize,
    ]);
    (tris, true)
}

#[inline]
fn uleft(a: &[u16; 3], b: &[u16; 3], c: &[u16; 3]) -> bool {
    let a = [a[0] as i32, a[1] as i32, a[2] as i32];
    let b = [b[0] as i32, b[1] as i32, b[2] as i32];
    let c = [c[0] as i32, c[1] as i32, c[2] as i32];
    area2(&a, &b, &c) < 0
}

/// Squared length of the shared edge if `pa` and `pb` can merge into a convex polygon
/// of at most `nvp` vertices, with the shared edge index in each
fn poly_merge_value(pa: &[u16], pb: &[u16], verts: &[[u16; 3]], nvp: usize) -> Option<(i32, usize, usize)> {
    let na = pa.len();
    let nb = pb.len();
    if na + nb - 2 > nvp {
        return None;
    }

    let mut shared = None;
    for i in 0..na {
        let (mut va0, mut va1) = (pa[i], pa[(i + 1) % na]);
        if va0 > va1 {
            std::mem::swap(&mut va0, &mut va1);
        }
        for j in 0..nb {
            let (mut vb0, mut vb1) = (pb[j], pb[(j + 1) % nb]);
            if vb0 > vb1 {
                std::mem::swap(&mut vb0, &mut vb1);
            }
            if va0 == vb0 && va1 == vb1 {
                shared = Some((i, j));
                break;
            }
        }
    }
    let (ea, eb) = shared?;

    let v = |i: u16| &verts[i as usize];
    if !uleft(v(pa[(ea + na - 1) % na]), v(pa[ea]), v(pb[(eb + 2) % nb])) {
        return None;
    }
    if !uleft(v(pb[(eb + nb - 1) % nb]), v(pb[eb]), v(pa[(ea + 2) % na])) {
        return None;
    }

    let a = v(pa[ea]);
    let b = v(pa[(ea + 1) % na]);
    let dx = a[0] as i32 - b[0] as i32;
    let dz = a[2] as i32 - b[2] as i32;
    Some((dx * dx + dz * dz, ea, eb))
}

fn merge_poly_verts(pa: &[u16], pb: &[u16], ea: usize, eb: usize) -> WorkPoly {
    let na = pa.len();
    let nb = pb.len();
    let mut merged = Vec::with_capacity(na + nb - 2);
    merged.extend((0..na - 1).map(|i| pa[(ea + 1 + i) % na]));
    merged.extend((0..nb - 1).map(|i| pb[(eb + 1 + i) % nb]));
    merged
}

/// Greedily merges polygon pairs along their longest shared edge
///
/// `on_merge(a, b)` is called before polygon `b` is merged into `a` and replaced by the
/// last polygon.
fn merge_polys(
    polys: &mut Vec<WorkPoly>,
    verts: &[[u16; 3]],
    nvp: usize,
    mut on_merge: impl FnMut(usize, usize),
) {
    loop {
        let mut best: Option<(i32, usize, usize, usize, usize)> = None;
        for j in 0..polys.len() {
            for k in j + 1..polys.len() {
                if let Some((value, ea, eb)) = poly_merge_value(&polys[j], &polys[k], verts, nvp) {
                    if best.map_or(value > 0, |b| value > b.0) {
                        best = Some((value, j, k, ea, eb));
                    }
                }
            }
        }
        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };
        on_merge(pa, pb);
        polys[pa] = merge_poly_verts(&polys[pa], &polys[pb], ea, eb);
        polys.swap_remove(pb);
    }
}

fn can_remove_vertex(polys: &[WorkPoly], rem: u16) -> bool {
    let mut remaining_edges = 0;
    for p in polys {
        let removed = p.iter().filter(|&&v| v == rem).count();
        if removed > 0 {
            remaining_edges += p.len() as i32 - (removed as i32 + 1);
        }
    }
    // A lone triangle tip cannot be removed.
    if remaining_edges <= 2 {
        return false;
    }

    // Edges touching the vertex, with how many polygons share each.
    let mut edges: Vec<(u16, u32)> = Vec::new();
    for p in polys {
        let nv = p.len();
        for j in 0..nv {
            let k = prev(j, nv);
            if p[j] != rem && p[k] != rem {
                continue;
            }
            let other = if p[j] == rem { p[k] } else { p[j] };
            match edges.iter_mut().find(|e| e.0 == other) {
                Some(e) => e.1 += 1,
                None => edges.push((other, 1)),
            }
        }
    }

    // More than two open edges means the vertex joins non-adjacent polygons.
    edges.iter().filter(|e| e.1 < 2).count() <= 2
}

fn remove_vertex(
    polys: &mut Vec<WorkPoly>,
    regs: &mut Vec<u16>,
    areas: &mut Vec<u8>,
    verts: &mut Vec<[u16; 3]>,
    rem: u16,
    nvp: usize,
) -> Result<()> {
    // Collect the outline of the hole left by the polygons using the vertex.
    let mut edges: Vec<[u32; 4]> = Vec::new();
    let mut i = 0;
    while i < polys.len() {
        if !polys[i].contains(&rem) {
            i += 1;
            continue;
        }
        let p = &polys[i];
        let nv = p.len();
        for j in 0..nv {
            let k = prev(j, nv);
            if p[j] != rem && p[k] != rem {
                edges.push([p[k] as u32, p[j] as u32, regs[i] as u32, areas[i] as u32]);
            }
        }
        polys.swap_remove(i);
        regs.swap_remove(i);
        areas.swap_remove(i);
    }

    verts.remove(rem as usize);
    for p in polys.iter_mut() {
        for v in p.iter_mut().filter(|v| **v > rem) {
            *v -= 1;
        }
    }
    for e in edges.iter_mut() {
        for v in e[..2].iter_mut().filter(|v| **v > rem as u32) {
            *v -= 1;
        }
    }
    if edges.is_empty() {
        return Ok(());
    }

    let first = edges.swap_remove(0);
    let mut hole = std::collections::VecDeque::from([first[0]]);
    let mut hole_regs = std::collections::VecDeque::from([first[2]]);
    let mut hole_areas = std::collections::VecDeque::from([first[3]]);
    hole.push_back(first[1]);
    hole_regs.push_back(first[2]);
    hole_areas.push_back(first[3]);

    while !edges.is_empty() {
        let mut matched = false;
        let mut i = 0;
        while i < edges.len() {
            let [ea, eb, r, a] = edges[i];
            let added = if hole.front() == Some(&eb) {
                hole.push_front(ea);
                hole_regs.push_front(r);
                hole_areas.push_front(a);
                true
            } else if hole.back() == Some(&ea) {
                hole.push_back(eb);
                hole_regs.push_back(r);
                hole_areas.push_back(a);
                true
            } else {
                false
            };
            if added {
                edges.swap_remove(i);
                matched = true;
            } else {
                i += 1;
            }
        }
        if !matched {
            break;
        }
    }

    // A closed loop repeats its first vertex at the end.
    if hole.len() > 1 && hole.front() == hole.back() {
        hole.pop_back();
        hole_regs.pop_back();
        hole_areas.pop_back();
    }

    let hole: Vec<u32> = hole.into();
    let hole_regs: Vec<u32> = hole_regs.into();
    let hole_areas: Vec<u32> = hole_areas.into();

    let tverts: Vec<[i32; 4]> = hole
        .iter()
        .map(|&h| {
            let v = verts[h as usize];
            [v[0] as i32, v[1] as i32, v[2] as i32, 0]
        })
        .collect();
    let mut tindices: Vec<u32> = (0..hole.len() as u32).collect();
    let (tris, complete) = triangulate(&tverts, &mut tindices);
    if !complete {
        log::warn!("bad triangulation while removing vertex {}", rem);
    }

    let mut new_polys: Vec<WorkPoly> = Vec::with_capacity(tris.len());
    let mut new_regs: Vec<u16> = Vec::with_capacity(tris.len());
    let mut new_areas: Vec<u8> = Vec::with_capacity(tris.len());
    for t in tris.iter().filter(|t| t[0] != t[1] && t[0] != t[2] && t[1] != t[2]) {
        new_polys.push(vec![hole[t[0]] as u16, hole[t[1]] as u16, hole[t[2]] as u16]);
        let reg = if hole_regs[t[0]] != hole_regs[t[1]] || hole_regs[t[1]] != hole_regs[t[2]] {
            MULTIPLE_REGS
        } else {
            hole_regs[t[0]] as u16
        };
        new_regs.push(reg);
        new_areas.push(hole_areas[t[0]] as u8);
    }
    if new_polys.is_empty() {
        return Ok(());
    }

    if nvp > 3 {
        merge_polys(&mut new_polys, verts, nvp, |pa, pb| {
            if new_regs[pa] != new_regs[pb] {
                new_regs[pa] = MULTIPLE_REGS;
            }
            let last = new_regs.len() - 1;
            new_regs.swap(pb, last);
            new_regs.pop();
            new_areas.swap(pb, last);
            new_areas.pop();
        });
    }

    if polys.len() + new_polys.len() > 0xfffe {
        return Err(Error::NavMeshGeneration(
            "too many polygons while removing a border vertex".to_string(),
        ));
    }
    polys.extend(new_polys);
    regs.extend(new_regs);
    areas.extend(new_areas);
    Ok(())
}

struct MeshEdge {
    vert: [u16; 2],
    poly: [u16; 2],
    poly_edge: [u16; 2],
}

/// Fills the neighbour slots of every polygon edge shared by two polygons
fn build_mesh_adjacency(polys: &mut [u16], npolys: usize, nverts: usize, nvp: usize) {
    let edge_end = |p: &[u16], j: usize| {
        if j + 1 >= nvp || p[j + 1] == MESH_NULL_IDX {
            p[0]
        } else {
            p[j + 1]
        }
    };

    let mut edges: Vec<MeshEdge> = Vec::with_capacity(npolys * nvp);
    let mut first_edge: Vec<Vec<usize>> = vec![Vec::new(); nverts];
    for i in 0..npolys {
        let p = &polys[i * nvp * 2..i * nvp * 2 + nvp];
        for j in 0..nvp {
            if p[j] == MESH_NULL_IDX {
                break;
            }
            let v0 = p[j];
            let v1 = edge_end(p, j);
            if v0 < v1 {
                first_edge[v0 as usize].push(edges.len());
                edges.push(MeshEdge {
                    vert: [v0, v1],
                    poly: [i as u16, i as u16],
                    poly_edge: [j as u16, 0],
                });
            }
        }
    }

    for i in 0..npolys {
        let p = &polys[i * nvp * 2..i * nvp * 2 + nvp];
        for j in 0..nvp {
            if p[j] == MESH_NULL_IDX {
                break;
            }
            let v0 = p[j];
            let v1 = edge_end(p, j);
            if v0 > v1 {
                if let Some(&e) = first_edge[v1 as usize].iter().find(|&&e| {
                    let edge = &edges[e];
                    edge.vert[1] == v0 && edge.poly[0] == edge.poly[1]
                }) {
                    edges[e].poly[1] = i as u16;
                    edges[e].poly_edge[1] = j as u16;
                }
            }
        }
    }

    for e in edges.iter().filter(|e| e.poly[0] != e.poly[1]) {
        polys[e.poly[0] as usize * nvp * 2 + nvp + e.poly_edge[0] as usize] = e.poly[1];
        polys[e.poly[1] as usize * nvp * 2 + nvp + e.poly_edge[1] as usize] = e.poly[0];
    }
}
