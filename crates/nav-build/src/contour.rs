//! Region outline tracing and simplification
//!
//! Every region of the compact heightfield is walked along its boundary to produce a raw
//! contour with one vertex per cell corner. The raw contour is then simplified with a
//! Douglas-Peucker style pass, long wall edges are split, and holes are stitched into
//! their enclosing outline so that each region ends up as a single simple polygon.

use glam::Vec3;
use nav_common::Result;

use crate::compact_heightfield::CompactHeightfield;
use crate::triangle_utils::{distance_pt_seg_sqr, intersect, left, left_on, next, prev, vequal_xz};
use crate::BORDER_REG;

/// Contour vertex flag: the vertex sits on the tile border and can be removed later
pub const BORDER_VERTEX: i32 = 0x10000;
/// Contour vertex flag: the edge separates two different area types
pub const AREA_BORDER: i32 = 0x20000;
/// Mask of the neighbour region id stored in a contour vertex
pub const CONTOUR_REG_MASK: i32 = 0xffff;

const MAX_CONTOUR_WALK: usize = 40_000;

/// Outline of a single region
///
/// Vertices are `[x, y, z, flags]` in cell units relative to the contour set origin.
/// The low 16 bits of `flags` hold the region on the other side of the edge starting at
/// the vertex.
#[derive(Debug, Clone, Default)]
pub struct Contour {
    pub verts: Vec<[i32; 4]>,
    pub raw_verts: Vec<[i32; 4]>,
    pub reg: u16,
    pub area: u8,
}

impl Contour {
    /// Twice the signed xz area, positive for outlines and negative for holes
    fn signed_area(&self) -> i32 {
        signed_area(&self.verts)
    }
}

fn signed_area(verts: &[[i32; 4]]) -> i32 {
    let n = verts.len();
    let mut area = 0;
    for i in 0..n {
        let vi = &verts[i];
        let vj = &verts[prev(i, n)];
        area += vi[0] * vj[2] - vj[0] * vi[2];
    }
    (area + 1) / 2
}

/// Simplified region outlines of one tile
#[derive(Debug, Clone)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    /// Width in cells, without the border
    pub width: i32,
    /// Height in cells, without the border
    pub height: i32,
    pub border_size: i32,
    pub max_error: f32,
}

impl ContourSet {
    /// Traces and simplifies the outline of every region in `chf`
    ///
    /// `max_error` is the largest distance in cells a simplified edge may deviate from the
    /// raw outline, and wall edges longer than `max_edge_len` cells are split (0 disables).
    pub fn build(chf: &CompactHeightfield, max_error: f32, max_edge_len: i32) -> Result<Self> {
        let w = chf.width;
        let h = chf.height;
        let border_size = chf.border_size;

        let mut bmin = chf.bmin;
        let mut bmax = chf.bmax;
        if border_size > 0 {
            let pad = border_size as f32 * chf.cs;
            bmin.x += pad;
            bmin.z += pad;
            bmax.x -= pad;
            bmax.z -= pad;
        }

        let mut cset = ContourSet {
            contours: Vec::new(),
            bmin,
            bmax,
            cs: chf.cs,
            ch: chf.ch,
            width: w - border_size * 2,
            height: h - border_size * 2,
            border_size,
            max_error,
        };

        // One bit per direction where the neighbour belongs to another region.
        let mut flags = vec![0u8; chf.span_count];
        for z in 0..h {
            for x in 0..w {
                for i in chf.cell_spans(x, z) {
                    let reg = chf.spans[i].reg;
                    if reg == 0 || reg & BORDER_REG != 0 {
                        continue;
                    }
                    let mut same = 0u8;
                    for dir in 0..4 {
                        let r = chf.neighbour(x, z, i, dir).map_or(0, |(_, _, ai)| chf.spans[ai].reg);
                        if r == reg {
                            same |= 1 << dir;
                        }
                    }
                    flags[i] = same ^ 0xf;
                }
            }
        }

        let mut raw = Vec::with_capacity(256);
        let mut simplified = Vec::with_capacity(64);
        for z in 0..h {
            for x in 0..w {
                for i in chf.cell_spans(x, z) {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let reg = chf.spans[i].reg;
                    if reg == 0 || reg & BORDER_REG != 0 {
                        continue;
                    }

                    raw.clear();
                    simplified.clear();
                    walk_contour(chf, x, z, i, &mut flags, &mut raw);
                    simplify_contour(&raw, &mut simplified, max_error, max_edge_len);
                    remove_degenerate_segments(&mut simplified);

                    if simplified.len() < 3 {
                        continue;
                    }

                    let unpad = |v: &[i32; 4]| [v[0] - border_size, v[1], v[2] - border_size, v[3]];
                    cset.contours.push(Contour {
                        verts: simplified.iter().map(unpad).collect(),
                        raw_verts: raw.iter().map(unpad).collect(),
                        reg,
                        area: chf.areas[i],
                    });
                }
            }
        }

        merge_holes(&mut cset.contours, chf.max_regions);
        Ok(cset)
    }
}

/// Height of the cell corner clockwise of edge `dir`, and whether the corner lies on
/// the tile border between two interior cells
fn corner_height(chf: &CompactHeightfield, x: i32, z: i32, i: usize, dir: usize) -> (i32, bool) {
    let dirp = (dir + 1) & 3;
    let tag = |ai: usize| chf.spans[ai].reg as u32 | ((chf.areas[ai] as u32) << 16);

    let mut ch = chf.spans[i].y as i32;
    let mut regs = [0u32; 4];
    regs[0] = tag(i);

    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, dir) {
        ch = ch.max(chf.spans[ai].y as i32);
        regs[1] = tag(ai);
        if let Some((_, _, ai2)) = chf.neighbour(ax, az, ai, dirp) {
            ch = ch.max(chf.spans[ai2].y as i32);
            regs[2] = tag(ai2);
        }
    }
    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, dirp) {
        ch = ch.max(chf.spans[ai].y as i32);
        regs[3] = tag(ai);
        if let Some((_, _, ai2)) = chf.neighbour(ax, az, ai, dir) {
            ch = ch.max(chf.spans[ai2].y as i32);
            regs[2] = tag(ai2);
        }
    }

    let border = BORDER_REG as u32;
    let is_border_vertex = (0..4).any(|j| {
        let a = regs[j];
        let b = regs[(j + 1) & 3];
        let c = regs[(j + 2) & 3];
        let d = regs[(j + 3) & 3];
        let two_same_exts = (a & b & border) != 0 && a == b;
        let two_ints = ((c | d) & border) == 0;
        let ints_same_area = (c >> 16) == (d >> 16);
        let no_zeros = a != 0 && b != 0 && c != 0 && d != 0;
        two_same_exts && two_ints && ints_same_area && no_zeros
    });

    (ch, is_border_vertex)
}

fn walk_contour(
    chf: &CompactHeightfield,
    mut x: i32,
    mut z: i32,
    mut i: usize,
    flags: &mut [u8],
    points: &mut Vec<[i32; 4]>,
) {
    let mut dir = 0;
    while flags[i] & (1 << dir) == 0 {
        dir += 1;
    }
    let start_dir = dir;
    let start_i = i;
    let area = chf.areas[i];

    for _ in 0..MAX_CONTOUR_WALK {
        if flags[i] & (1 << dir) != 0 {
            let (py, is_border_vertex) = corner_height(chf, x, z, i, dir);
            let (mut px, mut pz) = (x, z);
            match dir {
                0 => pz += 1,
                1 => {
                    px += 1;
                    pz += 1;
                }
                2 => px += 1,
                _ => {}
            }

            let mut r = 0;
            let mut is_area_border = false;
            if let Some((_, _, ai)) = chf.neighbour(x, z, i, dir) {
                r = chf.spans[ai].reg as i32;
                is_area_border = area != chf.areas[ai];
            }
            if is_border_vertex {
                r |= BORDER_VERTEX;
            }
            if is_area_border {
                r |= AREA_BORDER;
            }
            points.push([px, py, pz, r]);

            flags[i] &= !(1 << dir);
            dir = (dir + 1) & 3;
        } else {
            let Some((nx, nz, ni)) = chf.neighbour(x, z, i, dir) else {
                return;
            };
            x = nx;
            z = nz;
            i = ni;
            dir = (dir + 3) & 3;
        }

        if start_i == i && start_dir == dir {
            break;
        }
    }
}

fn simplify_contour(points: &[[i32; 4]], simplified: &mut Vec<[i32; 4]>, max_error: f32, max_edge_len: i32) {
    let pn = points.len();
    if pn == 0 {
        return;
    }

    let has_connections = points.iter().any(|p| p[3] & CONTOUR_REG_MASK != 0);
    if has_connections {
        // Keep every point where the neighbouring region changes.
        for i in 0..pn {
            let ii = (i + 1) % pn;
            let different_regs = (points[i][3] & CONTOUR_REG_MASK) != (points[ii][3] & CONTOUR_REG_MASK);
            let area_borders = (points[i][3] & AREA_BORDER) != (points[ii][3] & AREA_BORDER);
            if different_regs || area_borders {
                simplified.push([points[i][0], points[i][1], points[i][2], i as i32]);
            }
        }
    }

    if simplified.is_empty() {
        // Seed with the lower-left and upper-right points.
        let mut ll = 0;
        let mut ur = 0;
        for (i, p) in points.iter().enumerate() {
            let l = &points[ll];
            if p[0] < l[0] || (p[0] == l[0] && p[2] < l[2]) {
                ll = i;
            }
            let u = &points[ur];
            if p[0] > u[0] || (p[0] == u[0] && p[2] > u[2]) {
                ur = i;
            }
        }
        simplified.push([points[ll][0], points[ll][1], points[ll][2], ll as i32]);
        simplified.push([points[ur][0], points[ur][1], points[ur][2], ur as i32]);
    }

    // Insert the furthest raw point until the outline is within tolerance.
    let max_error_sqr = max_error * max_error;
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();
        let (mut ax, mut az, ai) = (simplified[i][0], simplified[i][2], simplified[i][3] as usize);
        let (mut bx, mut bz, bi) = (simplified[ii][0], simplified[ii][2], simplified[ii][3] as usize);

        // Walk in lexicographic order so opposite edges simplify the same way.
        let (mut ci, cinc, endi) = if bx > ax || (bx == ax && bz > az) {
            ((ai + 1) % pn, 1, bi)
        } else {
            std::mem::swap(&mut ax, &mut bx);
            std::mem::swap(&mut az, &mut bz);
            ((bi + pn - 1) % pn, pn - 1, ai)
        };

        let mut max_d = 0.0;
        let mut max_i = None;
        if points[ci][3] & CONTOUR_REG_MASK == 0 || points[ci][3] & AREA_BORDER != 0 {
            while ci != endi {
                let d = distance_pt_seg_sqr(points[ci][0], points[ci][2], ax, az, bx, bz);
                if d > max_d {
                    max_d = d;
                    max_i = Some(ci);
                }
                ci = (ci + cinc) % pn;
            }
        }

        match max_i {
            Some(m) if max_d > max_error_sqr => {
                simplified.insert(i + 1, [points[m][0], points[m][1], points[m][2], m as i32]);
            }
            _ => i += 1,
        }
    }

    // Split long wall edges.
    if max_edge_len > 0 {
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();
            let (ax, az, ai) = (simplified[i][0], simplified[i][2], simplified[i][3] as usize);
            let (bx, bz, bi) = (simplified[ii][0], simplified[ii][2], simplified[ii][3] as usize);

            let ci = (ai + 1) % pn;
            let mut max_i = None;
            if points[ci][3] & CONTOUR_REG_MASK == 0 {
                let dx = bx - ax;
                let dz = bz - az;
                if dx * dx + dz * dz > max_edge_len * max_edge_len {
                    let n = if bi < ai { bi + pn - ai } else { bi - ai };
                    if n > 1 {
                        max_i = Some(if bx > ax || (bx == ax && bz > az) {
                            (ai + n / 2) % pn
                        } else {
                            (ai + (n + 1) / 2) % pn
                        });
                    }
                }
            }

            match max_i {
                Some(m) => {
                    simplified.insert(i + 1, [points[m][0], points[m][1], points[m][2], m as i32]);
                }
                None => i += 1,
            }
        }
    }

    // The neighbour region comes from the next raw point, the border flag from the current.
    for v in simplified.iter_mut() {
        let bi = v[3] as usize;
        let ai = (bi + 1) % pn;
        v[3] = (points[ai][3] & (CONTOUR_REG_MASK | AREA_BORDER)) | (points[bi][3] & BORDER_VERTEX);
    }
}

fn remove_degenerate_segments(simplified: &mut Vec<[i32; 4]>) {
    let mut i = 0;
    while simplified.len() > 1 && i < simplified.len() {
        let ni = next(i, simplified.len());
        if vequal_xz(&simplified[i], &simplified[ni]) {
            simplified.remove(i);
        } else {
            i += 1;
        }
    }
}

/// True if `pj` lies inside the cone formed at vertex `i` of the polygon
fn in_cone(i: usize, verts: &[[i32; 4]], pj: &[i32; 4]) -> bool {
    let n = verts.len();
    let pi = &verts[i];
    let pi1 = &verts[next(i, n)];
    let pin1 = &verts[prev(i, n)];

    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// True if segment `d0 d1` crosses any edge of `verts` not incident to vertex `skip`
fn intersect_seg_contour(d0: &[i32; 4], d1: &[i32; 4], skip: Option<usize>, verts: &[[i32; 4]]) -> bool {
    let n = verts.len();
    for k in 0..n {
        let k1 = next(k, n);
        if skip == Some(k) || skip == Some(k1) {
            continue;
        }
        let p0 = &verts[k];
        let p1 = &verts[k1];
        if vequal_xz(d0, p0) || vequal_xz(d1, p0) || vequal_xz(d0, p1) || vequal_xz(d1, p1) {
            continue;
        }
        if intersect(d0, d1, p0, p1) {
            return true;
        }
    }
    false
}

/// Splices `hole` into `outline` through the diagonal `outline[ia]` to `hole[ib]`
fn merge_contours(outline: &[[i32; 4]], hole: &[[i32; 4]], ia: usize, ib: usize) -> Vec<[i32; 4]> {
    let na = outline.len();
    let nb = hole.len();
    let mut verts = Vec::with_capacity(na + nb + 2);
    verts.extend((0..=na).map(|i| outline[(ia + i) % na]));
    verts.extend((0..=nb).map(|i| hole[(ib + i) % nb]));
    verts
}

fn leftmost_vertex(verts: &[[i32; 4]]) -> (i32, i32, usize) {
    let mut best = (verts[0][0], verts[0][2], 0);
    for (i, v) in verts.iter().enumerate().skip(1) {
        if v[0] < best.0 || (v[0] == best.0 && v[2] < best.1) {
            best = (v[0], v[2], i);
        }
    }
    best
}

fn merge_holes(contours: &mut Vec<Contour>, max_regions: u16) {
    let holes: Vec<usize> = (0..contours.len())
        .filter(|&i| contours[i].signed_area() < 0)
        .collect();
    if holes.is_empty() {
        return;
    }

    let nregions = max_regions as usize + 1;
    let mut outlines: Vec<Option<usize>> = vec![None; nregions];
    let mut region_holes: Vec<Vec<usize>> = vec![Vec::new(); nregions];
    for (i, contour) in contours.iter().enumerate() {
        let reg = contour.reg as usize;
        if reg >= nregions {
            continue;
        }
        if holes.contains(&i) {
            region_holes[reg].push(i);
        } else if outlines[reg].is_some() {
            log::warn!("multiple outlines for region {}", reg);
        } else {
            outlines[reg] = Some(i);
        }
    }

    for (reg, hole_ids) in region_holes.iter_mut().enumerate() {
        if hole_ids.is_empty() {
            continue;
        }
        let Some(outline_id) = outlines[reg] else {
            log::warn!("missing outline for region {}", reg);
            continue;
        };

        // Merge from left to right.
        let mut sorted: Vec<(i32, i32, usize, usize)> = hole_ids
            .iter()
            .map(|&h| {
                let (minx, minz, leftmost) = leftmost_vertex(&contours[h].verts);
                (minx, minz, leftmost, h)
            })
            .collect();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        for (hi, &(_, _, leftmost, hole_id)) in sorted.iter().enumerate() {
            let hole = contours[hole_id].verts.clone();
            let outline = &contours[outline_id].verts;

            let mut found = None;
            let mut best_vertex = leftmost;
            for _ in 0..hole.len() {
                let corner = &hole[best_vertex];
                let mut diags: Vec<(usize, i32)> = (0..outline.len())
                    .filter(|&j| in_cone(j, outline, corner))
                    .map(|j| {
                        let dx = outline[j][0] - corner[0];
                        let dz = outline[j][2] - corner[2];
                        (j, dx * dx + dz * dz)
                    })
                    .collect();
                diags.sort_by_key(|d| d.1);

                found = diags.iter().map(|d| d.0).find(|&j| {
                    let pt = &outline[j];
                    !intersect_seg_contour(pt, corner, Some(j), outline)
                        && sorted[hi..]
                            .iter()
                            .all(|h| !intersect_seg_contour(pt, corner, None, &contours[h.3].verts))
                });
                if found.is_some() {
                    break;
                }
                best_vertex = (best_vertex + 1) % hole.len();
            }

            match found {
                Some(index) => {
                    let merged = merge_contours(&contours[outline_id].verts, &hole, index, best_vertex);
                    contours[outline_id].verts = merged;
                    contours[hole_id].verts.clear();
                }
                None => log::warn!("failed to find merge points for a hole in region {}", reg),
            }
        }
    }

    contours.retain(|c| c.verts.len() >= 3);
}
