//! Height detail for the polygon mesh
//!
//! Every polygon gets a small triangle mesh that follows the surface of the compact
//! heightfield more closely than the flat polygon. Polygon edges are sampled first, in a
//! canonical order so that neighbouring polygons share the same edge vertices, then
//! interior samples are added where the surface deviates most from the current
//! triangulation.

use std::collections::VecDeque;

use glam::Vec3;
use nav_common::{dist_2d, Result};

use crate::compact_heightfield::CompactHeightfield;
use crate::polymesh::PolyMesh;
use crate::triangle_utils::{next, prev};
use crate::{dir_for_offset, dir_offset_x, dir_offset_z, MULTIPLE_REGS};

const MAX_VERTS: usize = 127;
const MAX_TRIS: usize = 255;
const MAX_VERTS_PER_EDGE: usize = 32;
const UNSET_HEIGHT: u16 = 0xffff;

const EV_UNDEF: i32 = -1;
const EV_HULL: i32 = -2;

/// Detail triangle edge flag: the edge lies on the polygon boundary
pub const DETAIL_EDGE_BOUNDARY: u8 = 0x1;

/// Detail triangle meshes, one submesh per polygon
///
/// `meshes[i]` is `[vert_base, vert_count, tri_base, tri_count]` for polygon `i`. The
/// first vertices of each submesh are the polygon's own vertices. Vertices are in world
/// units. Triangles index the submesh vertices, and their fourth byte packs two bits of
/// edge flags per edge.
#[derive(Debug, Clone, Default)]
pub struct PolyMeshDetail {
    pub meshes: Vec<[u32; 4]>,
    pub verts: Vec<Vec3>,
    pub tris: Vec<[u8; 4]>,
}

struct HeightPatch {
    data: Vec<u16>,
    xmin: i32,
    zmin: i32,
    width: i32,
    height: i32,
}

impl PolyMeshDetail {
    /// Builds the detail submesh of every polygon in `mesh`
    ///
    /// `sample_dist` is the interior sampling spacing in world units (0 disables
    /// sampling) and `sample_max_error` the tolerated height error in world units.
    pub fn build(
        mesh: &PolyMesh,
        chf: &CompactHeightfield,
        sample_dist: f32,
        sample_max_error: f32,
    ) -> Result<Self> {
        let mut dmesh = PolyMeshDetail::default();
        if mesh.verts.is_empty() || mesh.npolys == 0 {
            return Ok(dmesh);
        }

        let cs = mesh.cs;
        let ch = mesh.ch;
        let orig = mesh.bmin;
        let border_size = mesh.border_size;
        let height_search_radius = (mesh.max_edge_error.ceil() as i32).max(1);

        // Patch bounds per polygon, grown by one cell.
        let bounds: Vec<[i32; 4]> = (0..mesh.npolys)
            .map(|i| {
                let mut b = [chf.width, 0, chf.height, 0];
                for &vi in mesh.poly_verts(i) {
                    let v = mesh.verts[vi as usize];
                    b[0] = b[0].min(v[0] as i32);
                    b[1] = b[1].max(v[0] as i32);
                    b[2] = b[2].min(v[2] as i32);
                    b[3] = b[3].max(v[2] as i32);
                }
                [
                    (b[0] - 1).max(0),
                    (b[1] + 1).min(chf.width),
                    (b[2] - 1).max(0),
                    (b[3] + 1).min(chf.height),
                ]
            })
            .collect();

        dmesh.meshes.reserve(mesh.npolys);
        for i in 0..mesh.npolys {
            let pverts = mesh.poly_verts(i);
            let poly: Vec<Vec3> = pverts
                .iter()
                .map(|&vi| {
                    let v = mesh.verts[vi as usize];
                    Vec3::new(v[0] as f32 * cs, v[1] as f32 * ch, v[2] as f32 * cs)
                })
                .collect();

            let [xmin, xmax, zmin, zmax] = bounds[i];
            let mut hp = HeightPatch {
                data: Vec::new(),
                xmin,
                zmin,
                width: (xmax - xmin).max(0),
                height: (zmax - zmin).max(0),
            };
            get_height_data(chf, pverts, mesh, border_size, &mut hp, mesh.regs[i]);

            let (mut verts, tris) = build_poly_detail(
                &poly,
                sample_dist,
                sample_max_error,
                height_search_radius,
                chf,
                &hp,
            );

            for v in verts.iter_mut() {
                *v += orig + Vec3::new(0.0, chf.ch, 0.0);
            }
            let poly_world: Vec<Vec3> = poly.iter().map(|&p| p + orig).collect();

            dmesh.meshes.push([
                dmesh.verts.len() as u32,
                verts.len() as u32,
                dmesh.tris.len() as u32,
                tris.len() as u32,
            ]);
            for t in &tris {
                let flags = tri_flags(
                    verts[t[0] as usize],
                    verts[t[1] as usize],
                    verts[t[2] as usize],
                    &poly_world,
                );
                dmesh.tris.push([t[0] as u8, t[1] as u8, t[2] as u8, flags]);
            }
            dmesh.verts.extend(verts);
        }

        Ok(dmesh)
    }

    /// Vertices of submesh `i`
    pub fn submesh_verts(&self, i: usize) -> &[Vec3] {
        let m = self.meshes[i];
        &self.verts[m[0] as usize..(m[0] + m[1]) as usize]
    }

    /// Triangles of submesh `i`
    pub fn submesh_tris(&self, i: usize) -> &[[u8; 4]] {
        let m = self.meshes[i];
        &self.tris[m[2] as usize..(m[2] + m[3]) as usize]
    }
}

fn edge_flag(va: Vec3, vb: Vec3, poly: &[Vec3]) -> u8 {
    const THR_SQR: f32 = 0.001 * 0.001;
    let n = poly.len();
    for i in 0..n {
        let j = prev(i, n);
        if dist_pt_seg_2d_sqr(va, poly[j], poly[i]) < THR_SQR
            && dist_pt_seg_2d_sqr(vb, poly[j], poly[i]) < THR_SQR
        {
            return DETAIL_EDGE_BOUNDARY;
        }
    }
    0
}

fn tri_flags(va: Vec3, vb: Vec3, vc: Vec3, poly: &[Vec3]) -> u8 {
    edge_flag(va, vb, poly) | (edge_flag(vb, vc, poly) << 2) | (edge_flag(vc, va, poly) << 4)
}

fn dist_pt_seg_sqr(pt: Vec3, p: Vec3, q: Vec3) -> f32 {
    let pq = q - p;
    let d = pq.length_squared();
    let mut t = pq.dot(pt - p);
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    (p + pq * t - pt).length_squared()
}

fn dist_pt_seg_2d_sqr(pt: Vec3, p: Vec3, q: Vec3) -> f32 {
    let pqx = q.x - p.x;
    let pqz = q.z - p.z;
    let dx = pt.x - p.x;
    let dz = pt.z - p.z;
    let d = pqx * pqx + pqz * pqz;
    let mut t = pqx * dx + pqz * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    let dx = p.x + t * pqx - pt.x;
    let dz = p.z + t * pqz - pt.z;
    dx * dx + dz * dz
}

#[inline]
fn cross_2d(p1: Vec3, p2: Vec3, p3: Vec3) -> f32 {
    let u1 = p2.x - p1.x;
    let v1 = p2.z - p1.z;
    let u2 = p3.x - p1.x;
    let v2 = p3.z - p1.z;
    u1 * v2 - v1 * u2
}

/// Circumcircle of the triangle in the xz plane, `None` for degenerate triangles
fn circum_circle(p1: Vec3, p2: Vec3, p3: Vec3) -> Option<(Vec3, f32)> {
    const EPS: f32 = 1e-6;
    // Relative to p1 for precision.
    let v2 = p2 - p1;
    let v3 = p3 - p1;
    let cp = cross_2d(Vec3::ZERO, v2, v3);
    if cp.abs() <= EPS {
        return None;
    }
    let v2_sq = v2.x * v2.x + v2.z * v2.z;
    let v3_sq = v3.x * v3.x + v3.z * v3.z;
    let c = Vec3::new(
        (v2_sq * v3.z - v3_sq * v2.z) / (2.0 * cp),
        0.0,
        (v3_sq * v2.x - v2_sq * v3.x) / (2.0 * cp),
    );
    let r = dist_2d(c, Vec3::ZERO);
    Some((c + p1, r))
}

fn dist_pt_tri(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPS: f32 = 1e-4;
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;
    let dot2 = |u: Vec3, v: Vec3| u.x * v.x + u.z * v.z;
    let dot00 = dot2(v0, v0);
    let dot01 = dot2(v0, v1);
    let dot02 = dot2(v0, v2);
    let dot11 = dot2(v1, v1);
    let dot12 = dot2(v1, v2);

    let inv_denom = 1.0 / (dot00 * dot11 - dot01 * dot01);
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        let y = a.y + v0.y * u + v1.y * v;
        return Some((y - p.y).abs());
    }
    None
}

fn dist_to_tri_mesh(p: Vec3, verts: &[Vec3], tris: &[[i32; 4]]) -> Option<f32> {
    tris.iter()
        .filter_map(|t| {
            dist_pt_tri(
                p,
                verts[t[0] as usize],
                verts[t[1] as usize],
                verts[t[2] as usize],
            )
        })
        .min_by(|a, b| a.total_cmp(b))
}

/// Signed squared distance to the polygon outline, negative inside
fn dist_to_poly(verts: &[Vec3], p: Vec3) -> f32 {
    let n = verts.len();
    let mut dmin = f32::MAX;
    let mut inside = false;
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[prev(i, n)];
        if ((vi.z > p.z) != (vj.z > p.z))
            && (p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        dmin = dmin.min(dist_pt_seg_2d_sqr(p, vj, vi));
    }
    if inside {
        -dmin
    } else {
        dmin
    }
}

fn poly_min_extent(verts: &[Vec3]) -> f32 {
    let n = verts.len();
    let mut min_dist = f32::MAX;
    for i in 0..n {
        let ni = next(i, n);
        let max_edge_dist = (0..n)
            .filter(|&j| j != i && j != ni)
            .map(|j| dist_pt_seg_2d_sqr(verts[j], verts[i], verts[ni]))
            .fold(0.0f32, f32::max);
        min_dist = min_dist.min(max_edge_dist);
    }
    min_dist.sqrt()
}

fn jitter_x(i: usize) -> f32 {
    (((i as u32).wrapping_mul(0x8da6_b343) & 0xffff) as f32 / 65535.0 * 2.0) - 1.0
}

fn jitter_z(i: usize) -> f32 {
    (((i as u32).wrapping_mul(0xd816_3841) & 0xffff) as f32 / 65535.0 * 2.0) - 1.0
}

/// Surface height in cells under `(fx, fz)`, searching outward in rings when the patch
/// has no data at that cell
fn get_height(fx: f32, fy: f32, fz: f32, ics: f32, ch: f32, radius: i32, hp: &HeightPatch) -> u16 {
    if hp.width <= 0 || hp.height <= 0 {
        return 0;
    }
    let ix = ((fx * ics + 0.01).floor() as i32 - hp.xmin).clamp(0, hp.width - 1);
    let iz = ((fz * ics + 0.01).floor() as i32 - hp.zmin).clamp(0, hp.height - 1);
    let mut h = hp.data[(ix + iz * hp.width) as usize];
    if h != UNSET_HEIGHT {
        return h;
    }

    // Spiral outward and keep the closest height of the first ring that has any.
    let (mut x, mut z, mut dx, mut dz) = (1, 0, 1, 0);
    let max_size = radius * 2 + 1;
    let max_iter = max_size * max_size - 1;
    let mut next_ring_iter_start = 8;
    let mut next_ring_iters = 16;
    let mut dmin = f32::MAX;
    for i in 0..max_iter {
        let nx = ix + x;
        let nz = iz + z;
        if nx >= 0 && nz >= 0 && nx < hp.width && nz < hp.height {
            let nh = hp.data[(nx + nz * hp.width) as usize];
            if nh != UNSET_HEIGHT {
                let d = (nh as f32 * ch - fy).abs();
                if d < dmin {
                    h = nh;
                    dmin = d;
                }
            }
        }

        if i + 1 == next_ring_iter_start {
            if h != UNSET_HEIGHT {
                break;
            }
            next_ring_iter_start += next_ring_iters;
            next_ring_iters += 8;
        }

        if x == z || (x < 0 && x == -z) || (x > 0 && x == 1 - z) {
            let tmp = dx;
            dx = -dz;
            dz = tmp;
        }
        x += dx;
        z += dz;
    }
    h
}

/// Fills the height patch of a polygon from the spans of its region
///
/// Heights of cells outside the region are flood filled from the region border so the
/// samples never jump to an overlapping floor.
fn get_height_data(
    chf: &CompactHeightfield,
    poly: &[u16],
    mesh: &PolyMesh,
    bs: i32,
    hp: &mut HeightPatch,
    region: u16,
) {
    hp.data.clear();
    hp.data.resize((hp.width * hp.height) as usize, UNSET_HEIGHT);

    let mut queue: VecDeque<(i32, i32, usize)> = VecDeque::new();
    let mut empty = true;

    // Polygons merged from several regions could overlap their own region.
    if region != MULTIPLE_REGS {
        for hz in 0..hp.height {
            let z = hp.zmin + hz + bs;
            for hx in 0..hp.width {
                let x = hp.xmin + hx + bs;
                if x >= chf.width || z >= chf.height {
                    continue;
                }
                for i in chf.cell_spans(x, z) {
                    let s = chf.spans[i];
                    if s.reg != region {
                        continue;
                    }
                    hp.data[(hx + hz * hp.width) as usize] = s.y;
                    empty = false;

                    let border = (0..4).any(|dir| {
                        chf.neighbour(x, z, i, dir)
                            .is_some_and(|(_, _, ai)| chf.spans[ai].reg != region)
                    });
                    if border {
                        queue.push_back((x, z, i));
                    }
                    break;
                }
            }
        }
    }

    if empty {
        seed_with_poly_center(chf, poly, mesh, bs, hp, &mut queue);
    }

    while let Some((cx, cz, ci)) = queue.pop_front() {
        for dir in 0..4 {
            let Some((ax, az, ai)) = chf.neighbour(cx, cz, ci, dir) else {
                continue;
            };
            let hx = ax - hp.xmin - bs;
            let hz = az - hp.zmin - bs;
            if hx < 0 || hz < 0 || hx >= hp.width || hz >= hp.height {
                continue;
            }
            let idx = (hx + hz * hp.width) as usize;
            if hp.data[idx] != UNSET_HEIGHT {
                continue;
            }
            hp.data[idx] = chf.spans[ai].y;
            queue.push_back((ax, az, ai));
        }
    }
}

/// Walks from the span nearest a polygon vertex to the polygon centre and seeds the
/// height flood fill there
fn seed_with_poly_center(
    chf: &CompactHeightfield,
    poly: &[u16],
    mesh: &PolyMesh,
    bs: i32,
    hp: &mut HeightPatch,
    queue: &mut VecDeque<(i32, i32, usize)>,
) {
    const OFFSET: [(i32, i32); 9] = [
        (0, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
    ];

    let mut start: Option<(i32, i32, usize)> = None;
    let mut dmin = UNSET_HEIGHT as i32;
    'search: for &pv in poly {
        let v = mesh.verts[pv as usize];
        for &(ox, oz) in &OFFSET {
            let ax = v[0] as i32 + ox;
            let ay = v[1] as i32;
            let az = v[2] as i32 + oz;
            if ax < hp.xmin || ax >= hp.xmin + hp.width || az < hp.zmin || az >= hp.zmin + hp.height {
                continue;
            }
            if ax + bs >= chf.width || az + bs >= chf.height {
                continue;
            }
            for i in chf.cell_spans(ax + bs, az + bs) {
                let d = (ay - chf.spans[i].y as i32).abs();
                if d < dmin {
                    start = Some((ax, az, i));
                    dmin = d;
                }
                if dmin == 0 {
                    break 'search;
                }
            }
        }
    }
    let Some(start) = start else {
        return;
    };

    let n = poly.len() as i32;
    let (mut pcx, mut pcz) = (0, 0);
    for &pv in poly {
        let v = mesh.verts[pv as usize];
        pcx += v[0] as i32;
        pcz += v[2] as i32;
    }
    pcx /= n;
    pcz /= n;

    // Depth first so that dead ends left by simplification can be backtracked.
    hp.data.fill(0);
    let mut stack = vec![start];
    let mut dirs = [0usize, 1, 2, 3];
    let mut current = start;
    loop {
        let Some((cx, cz, ci)) = stack.pop() else {
            log::warn!("walk towards polygon center failed to reach center");
            break;
        };
        current = (cx, cz, ci);
        if cx == pcx && cz == pcz {
            break;
        }

        let direct = if cx == pcx {
            dir_for_offset(0, if pcz > cz { 1 } else { -1 })
        } else {
            dir_for_offset(if pcx > cx { 1 } else { -1 }, 0)
        }
        .unwrap_or(0);

        // The direct direction goes last so it is popped first.
        dirs.swap(direct, 3);
        let span = chf.spans[ci];
        for &dir in &dirs {
            let con = span.con(dir);
            if con == crate::NOT_CONNECTED {
                continue;
            }
            let nx = cx + dir_offset_x(dir);
            let nz = cz + dir_offset_z(dir);
            let hpx = nx - hp.xmin;
            let hpz = nz - hp.zmin;
            if hpx < 0 || hpx >= hp.width || hpz < 0 || hpz >= hp.height {
                continue;
            }
            let idx = (hpx + hpz * hp.width) as usize;
            if hp.data[idx] != 0 {
                continue;
            }
            hp.data[idx] = 1;
            let ni = chf.cell_spans(nx + bs, nz + bs).start + con as usize;
            stack.push((nx, nz, ni));
        }
        dirs.swap(direct, 3);
    }

    let (cx, cz, ci) = current;
    queue.clear();
    queue.push_back((cx + bs, cz + bs, ci));
    hp.data.fill(UNSET_HEIGHT);
    hp.data[((cx - hp.xmin) + (cz - hp.zmin) * hp.width) as usize] = chf.spans[ci].y;
}

/// Fan-like triangulation of the hull that prefers short perimeters
fn triangulate_hull(verts: &[Vec3], hull: &[usize], nin: usize) -> Vec<[i32; 4]> {
    let nhull = hull.len();
    let mut tris = Vec::new();
    if nhull < 3 {
        return tris;
    }

    let (mut start, mut left, mut right) = (0, 1, nhull - 1);
    let mut dmin = f32::MAX;
    for i in 0..nhull {
        // Ears have an original polygon vertex in the middle.
        if hull[i] >= nin {
            continue;
        }
        let pi = prev(i, nhull);
        let ni = next(i, nhull);
        let pv = verts[hull[pi]];
        let cv = verts[hull[i]];
        let nv = verts[hull[ni]];
        let d = dist_2d(pv, cv) + dist_2d(cv, nv) + dist_2d(nv, pv);
        if d < dmin {
            start = i;
            left = ni;
            right = pi;
            dmin = d;
        }
    }

    tris.push([hull[start] as i32, hull[left] as i32, hull[right] as i32, 0]);

    while next(left, nhull) != right {
        let nleft = next(left, nhull);
        let nright = prev(right, nhull);

        let cvleft = verts[hull[left]];
        let nvleft = verts[hull[nleft]];
        let cvright = verts[hull[right]];
        let nvright = verts[hull[nright]];
        let dleft = dist_2d(cvleft, nvleft) + dist_2d(nvleft, cvright);
        let dright = dist_2d(cvright, nvright) + dist_2d(cvleft, nvright);

        if dleft < dright {
            tris.push([hull[left] as i32, hull[nleft] as i32, hull[right] as i32, 0]);
            left = nleft;
        } else {
            tris.push([hull[left] as i32, hull[nright] as i32, hull[right] as i32, 0]);
            right = nright;
        }
    }
    tris
}

fn find_edge(edges: &[[i32; 4]], s: i32, t: i32) -> Option<usize> {
    edges
        .iter()
        .position(|e| (e[0] == s && e[1] == t) || (e[0] == t && e[1] == s))
}

fn add_edge(edges: &mut Vec<[i32; 4]>, max_edges: usize, s: i32, t: i32, l: i32, r: i32) {
    if edges.len() >= max_edges {
        log::error!("too many edges in detail triangulation ({})", edges.len());
        return;
    }
    if find_edge(edges, s, t).is_none() {
        edges.push([s, t, l, r]);
    }
}

fn update_left_face(e: &mut [i32; 4], s: i32, t: i32, f: i32) {
    if e[0] == s && e[1] == t && e[2] == EV_UNDEF {
        e[2] = f;
    } else if e[1] == s && e[0] == t && e[3] == EV_UNDEF {
        e[3] = f;
    }
}

fn overlap_seg_seg_2d(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> bool {
    let a1 = cross_2d(a, b, d);
    let a2 = cross_2d(a, b, c);
    if a1 * a2 < 0.0 {
        let a3 = cross_2d(c, d, a);
        let a4 = a3 + a2 - a1;
        if a3 * a4 < 0.0 {
            return true;
        }
    }
    false
}

fn overlap_edges(pts: &[Vec3], edges: &[[i32; 4]], s1: i32, t1: i32) -> bool {
    edges.iter().any(|e| {
        let (s0, t0) = (e[0], e[1]);
        if s0 == s1 || s0 == t1 || t0 == s1 || t0 == t1 {
            return false;
        }
        overlap_seg_seg_2d(
            pts[s0 as usize],
            pts[t0 as usize],
            pts[s1 as usize],
            pts[t1 as usize],
        )
    })
}

fn complete_facet(pts: &[Vec3], edges: &mut Vec<[i32; 4]>, max_edges: usize, nfaces: &mut i32, e: usize) {
    const EPS: f32 = 1e-5;
    const TOL: f32 = 0.001;

    let edge = edges[e];
    let (s, t) = if edge[2] == EV_UNDEF {
        (edge[0], edge[1])
    } else if edge[3] == EV_UNDEF {
        (edge[1], edge[0])
    } else {
        return;
    };

    // Best point on the left of the edge.
    let npts = pts.len() as i32;
    let mut pt = npts;
    let mut c = Vec3::ZERO;
    let mut r = -1.0f32;
    let ps = pts[s as usize];
    let ptt = pts[t as usize];
    for u in 0..npts {
        if u == s || u == t {
            continue;
        }
        let pu = pts[u as usize];
        if cross_2d(ps, ptt, pu) <= EPS {
            continue;
        }
        if r < 0.0 {
            pt = u;
            (c, r) = circum_circle(ps, ptt, pu).unwrap_or((ps, 0.0));
            continue;
        }
        let d = dist_2d(c, pu);
        if d > r * (1.0 + TOL) {
            continue;
        } else if d >= r * (1.0 - TOL) {
            // On the circle, only accept when no existing edge is crossed.
            if overlap_edges(pts, edges, s, u) || overlap_edges(pts, edges, t, u) {
                continue;
            }
        }
        pt = u;
        (c, r) = circum_circle(ps, ptt, pu).unwrap_or((ps, 0.0));
    }

    if pt < npts {
        update_left_face(&mut edges[e], s, t, *nfaces);

        match find_edge(edges, pt, s) {
            None => add_edge(edges, max_edges, pt, s, *nfaces, EV_UNDEF),
            Some(ei) => update_left_face(&mut edges[ei], pt, s, *nfaces),
        }
        match find_edge(edges, t, pt) {
            None => add_edge(edges, max_edges, t, pt, *nfaces, EV_UNDEF),
            Some(ei) => update_left_face(&mut edges[ei], t, pt, *nfaces),
        }
        *nfaces += 1;
    } else {
        update_left_face(&mut edges[e], s, t, EV_HULL);
    }
}

/// Delaunay triangulation of `pts` constrained to the given hull
fn delaunay_hull(pts: &[Vec3], hull: &[usize]) -> Vec<[i32; 4]> {
    let max_edges = pts.len() * 10;
    let mut edges: Vec<[i32; 4]> = Vec::with_capacity(max_edges);
    let mut nfaces = 0;

    let nhull = hull.len();
    for i in 0..nhull {
        let j = prev(i, nhull);
        add_edge(&mut edges, max_edges, hull[j] as i32, hull[i] as i32, EV_HULL, EV_UNDEF);
    }

    let mut current = 0;
    while current < edges.len() {
        if edges[current][2] == EV_UNDEF {
            complete_facet(pts, &mut edges, max_edges, &mut nfaces, current);
        }
        if edges[current][3] == EV_UNDEF {
            complete_facet(pts, &mut edges, max_edges, &mut nfaces, current);
        }
        current += 1;
    }

    let mut tris = vec![[-1i32, -1, -1, 0]; nfaces as usize];
    for e in &edges {
        if e[3] >= 0 {
            let t = &mut tris[e[3] as usize];
            if t[0] == -1 {
                t[0] = e[0];
                t[1] = e[1];
            } else if t[0] == e[1] {
                t[2] = e[0];
            } else if t[1] == e[0] {
                t[2] = e[1];
            }
        }
        if e[2] >= 0 {
            let t = &mut tris[e[2] as usize];
            if t[0] == -1 {
                t[0] = e[1];
                t[1] = e[0];
            } else if t[0] == e[0] {
                t[2] = e[1];
            } else if t[1] == e[1] {
                t[2] = e[0];
            }
        }
    }

    tris.retain(|t| {
        let dangling = t[0] == -1 || t[1] == -1 || t[2] == -1;
        if dangling {
            log::warn!("removing dangling detail face [{}, {}, {}]", t[0], t[1], t[2]);
        }
        !dangling
    });
    tris
}

/// Builds the detail vertices and triangles of one polygon, in patch-local coordinates
fn build_poly_detail(
    poly: &[Vec3],
    sample_dist: f32,
    sample_max_error: f32,
    height_search_radius: i32,
    chf: &CompactHeightfield,
    hp: &HeightPatch,
) -> (Vec<Vec3>, Vec<[i32; 4]>) {
    let nin = poly.len();
    let mut verts: Vec<Vec3> = poly.to_vec();
    let mut hull: Vec<usize> = Vec::with_capacity(MAX_VERTS);

    let cs = chf.cs;
    let ics = 1.0 / cs;
    let min_extent = poly_min_extent(&verts);

    // Sample the edges in lexicographic order so both neighbours agree on them.
    if sample_dist > 0.0 {
        let mut edge = [Vec3::ZERO; MAX_VERTS_PER_EDGE + 1];
        for i in 0..nin {
            let j = prev(i, nin);
            let (mut vj, mut vi) = (poly[j], poly[i]);
            let swapped = if (vj.x - vi.x).abs() < 1e-6 {
                vj.z > vi.z
            } else {
                vj.x > vi.x
            };
            if swapped {
                std::mem::swap(&mut vj, &mut vi);
            }

            let delta = vi - vj;
            let d = (delta.x * delta.x + delta.z * delta.z).sqrt();
            let mut nn = 1 + (d / sample_dist).floor() as usize;
            if nn >= MAX_VERTS_PER_EDGE {
                nn = MAX_VERTS_PER_EDGE - 1;
            }
            if verts.len() + nn >= MAX_VERTS {
                nn = MAX_VERTS.saturating_sub(1 + verts.len());
            }

            for (k, pos) in edge.iter_mut().enumerate().take(nn + 1) {
                let u = if nn == 0 { 0.0 } else { k as f32 / nn as f32 };
                let mut p = vj + delta * u;
                p.y = get_height(p.x, p.y, p.z, ics, chf.ch, height_search_radius, hp) as f32 * chf.ch;
                *pos = p;
            }

            let mut idx: Vec<usize> = vec![0, nn];
            let mut k = 0;
            while k + 1 < idx.len() {
                let a = idx[k];
                let b = idx[k + 1];
                let va = edge[a];
                let vb = edge[b];
                let mut maxd = 0.0;
                let mut maxi = None;
                for (m, &pm) in edge.iter().enumerate().take(b).skip(a + 1) {
                    let dev = dist_pt_seg_sqr(pm, va, vb);
                    if dev > maxd {
                        maxd = dev;
                        maxi = Some(m);
                    }
                }
                match maxi {
                    Some(m) if maxd > sample_max_error * sample_max_error => idx.insert(k + 1, m),
                    _ => k += 1,
                }
            }

            hull.push(j);
            let inner = &idx[1..idx.len() - 1];
            let ordered: Vec<usize> = if swapped {
                inner.iter().rev().copied().collect()
            } else {
                inner.to_vec()
            };
            for m in ordered {
                verts.push(edge[m]);
                hull.push(verts.len() - 1);
            }
        }
    } else {
        hull.extend((0..nin).map(|i| prev(i, nin)));
    }

    // Slivers get no interior samples.
    if min_extent < sample_dist * 2.0 {
        let tris = triangulate_hull(&verts, &hull, nin);
        return (verts, tris);
    }

    let mut tris = triangulate_hull(&verts, &hull, nin);
    if tris.is_empty() {
        log::warn!("could not triangulate detail polygon ({} verts)", verts.len());
        return (verts, tris);
    }

    if sample_dist > 0.0 {
        let (bmin, bmax) = poly
            .iter()
            .skip(1)
            .fold((poly[0], poly[0]), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let x0 = (bmin.x / sample_dist).floor() as i32;
        let x1 = (bmax.x / sample_dist).ceil() as i32;
        let z0 = (bmin.z / sample_dist).floor() as i32;
        let z1 = (bmax.z / sample_dist).ceil() as i32;

        // (x, height, z, added)
        let mut samples: Vec<(i32, u16, i32, bool)> = Vec::new();
        for z in z0..z1 {
            for x in x0..x1 {
                let pt = Vec3::new(
                    x as f32 * sample_dist,
                    (bmax.y + bmin.y) * 0.5,
                    z as f32 * sample_dist,
                );
                // Keep away from the edges.
                if dist_to_poly(poly, pt) > -sample_dist / 2.0 {
                    continue;
                }
                let h = get_height(pt.x, pt.y, pt.z, ics, chf.ch, height_search_radius, hp);
                samples.push((x, h, z, false));
            }
        }

        // Add the worst sample until the surface is within tolerance.
        for _ in 0..samples.len() {
            if verts.len() >= MAX_VERTS {
                break;
            }

            let mut best: Option<(f32, usize, Vec3)> = None;
            for (i, s) in samples.iter().enumerate() {
                if s.3 {
                    continue;
                }
                // Jitter breaks up the symmetry of the grid.
                let pt = Vec3::new(
                    s.0 as f32 * sample_dist + jitter_x(i) * cs * 0.1,
                    s.1 as f32 * chf.ch,
                    s.2 as f32 * sample_dist + jitter_z(i) * cs * 0.1,
                );
                let Some(d) = dist_to_tri_mesh(pt, &verts, &tris) else {
                    continue;
                };
                if best.map_or(d > 0.0, |b| d > b.0) {
                    best = Some((d, i, pt));
                }
            }

            let Some((bestd, besti, bestpt)) = best else {
                break;
            };
            if bestd <= sample_max_error {
                break;
            }
            samples[besti].3 = true;
            verts.push(bestpt);

            // TODO: insert the new point incrementally instead of rebuilding the triangulation.
            tris = delaunay_hull(&verts, &hull);
        }
    }

    if tris.len() > MAX_TRIS {
        log::error!(
            "shrinking detail triangle count from {} to max {}",
            tris.len(),
            MAX_TRIS
        );
        tris.truncate(MAX_TRIS);
    }
    (verts, tris)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::ContourSet;
    use crate::heightfield::Heightfield;
    use crate::WALKABLE_AREA;

    fn pipeline(size: i32, height_at: impl Fn(i32, i32) -> u16) -> (PolyMesh, CompactHeightfield) {
        let mut hf = Heightfield::new(
            size,
            size,
            Vec3::ZERO,
            Vec3::new(size as f32, 20.0, size as f32),
            1.0,
            0.5,
        )
        .unwrap();
        for z in 0..size {
            for x in 0..size {
                let h = height_at(x, z);
                hf.add_span(x, z, 0, h, WALKABLE_AREA, 1).unwrap();
            }
        }
        let mut chf = CompactHeightfield::build(&hf, 2, 2).unwrap();
        chf.build_distance_field();
        chf.build_regions(0, 2, 20).unwrap();
        let cset = ContourSet::build(&chf, 1.3, 0).unwrap();
        let mesh = PolyMesh::build(&cset, 6).unwrap();
        (mesh, chf)
    }

    #[test]
    fn test_flat_polygon_detail() {
        let (mesh, chf) = pipeline(10, |_, _| 2);
        let dmesh = PolyMeshDetail::build(&mesh, &chf, 6.0, 1.0).unwrap();
        assert_eq!(dmesh.meshes.len(), mesh.npolys);

        for i in 0..mesh.npolys {
            let nv = mesh.poly_verts(i).len();
            let verts = dmesh.submesh_verts(i);
            assert!(verts.len() >= nv);
            // Leading vertices are the polygon's own.
            for (j, &vi) in mesh.poly_verts(i).iter().enumerate() {
                let p = mesh.vertex_position(vi as usize);
                assert!((verts[j].x - p.x).abs() < 1e-4);
                assert!((verts[j].z - p.z).abs() < 1e-4);
            }
            let tris = dmesh.submesh_tris(i);
            assert!(!tris.is_empty());
            for t in tris {
                assert!((t[0] as usize) < verts.len());
                assert!((t[1] as usize) < verts.len());
                assert!((t[2] as usize) < verts.len());
            }
            // Every outline edge appears as a boundary edge of some triangle.
            let boundary_edges: usize = tris
                .iter()
                .map(|t| (0..3).filter(|k| (t[3] >> (k * 2)) & 0x3 != 0).count())
                .sum();
            assert!(boundary_edges >= nv);
        }
    }

    #[test]
    fn test_detail_follows_slope() {
        // Ramp rising one cell height every two cells along x.
        let (mesh, chf) = pipeline(12, |x, _| 2 + (x / 2) as u16);
        let dmesh = PolyMeshDetail::build(&mesh, &chf, 2.0, 0.25).unwrap();
        let (ymin, ymax) = dmesh
            .verts
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.y), hi.max(v.y)));
        assert!(ymax - ymin > 1.0);
    }

    #[test]
    fn test_empty_mesh_gives_empty_detail() {
        let (mut mesh, chf) = pipeline(4, |_, _| 2);
        mesh.verts.clear();
        mesh.npolys = 0;
        let dmesh = PolyMeshDetail::build(&mesh, &chf, 6.0, 1.0).unwrap();
        assert!(dmesh.meshes.is_empty());
        assert!(dmesh.verts.is_empty());
    }

    #[test]
    fn test_delaunay_square_with_centre() {
        let pts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(2.0, 1.0, 2.1),
        ];
        let hull = vec![3, 0, 1, 2];
        let tris = delaunay_hull(&pts, &hull);
        assert_eq!(tris.len(), 4);
        assert!(tris.iter().all(|t| t[..3].contains(&4)));
    }

    #[test]
    fn test_triangulate_hull_covers_polygon() {
        let pts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 4.0),
            Vec3::new(4.0, 0.0, 0.0),
        ];
        let hull = vec![3, 0, 1, 2];
        let tris = triangulate_hull(&pts, &hull, 4);
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn test_min_extent() {
        let square = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 3.0),
            Vec3::new(3.0, 0.0, 3.0),
            Vec3::new(3.0, 0.0, 0.0),
        ];
        assert!((poly_min_extent(&square) - 3.0).abs() < 1e-5);
    }
}
