//! Geometric predicates on the xz-plane used by mesh generation and polygon queries
//!
//! All "2D" functions ignore the y component. Polygons are given as vertex slices in
//! the winding order produced by the polygon mesh builder.

use crate::math::perp_2d;
use glam::Vec3;

/// Signed area of the triangle on the xz-plane (doubled)
///
/// Positive when `c` lies to the right of the segment `a -> b` when viewed from above.
#[inline]
pub fn tri_area_2d(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let acx = c.x - a.x;
    let acz = c.z - a.z;
    acx * abz - abx * acz
}

/// Checks whether two axis-aligned bounding boxes overlap
#[inline]
pub fn overlap_bounds(amin: Vec3, amax: Vec3, bmin: Vec3, bmax: Vec3) -> bool {
    amin.x <= bmax.x
        && amax.x >= bmin.x
        && amin.y <= bmax.y
        && amax.y >= bmin.y
        && amin.z <= bmax.z
        && amax.z >= bmin.z
}

/// Checks whether two quantized bounding boxes overlap
#[inline]
pub fn overlap_quant_bounds(amin: &[u16; 3], amax: &[u16; 3], bmin: &[u16; 3], bmax: &[u16; 3]) -> bool {
    amin[0] <= bmax[0]
        && amax[0] >= bmin[0]
        && amin[1] <= bmax[1]
        && amax[1] >= bmin[1]
        && amin[2] <= bmax[2]
        && amax[2] >= bmin[2]
}

/// Squared distance from `pt` to the segment `p -> q` on the xz-plane
///
/// Returns the distance and the parameter of the closest point along the segment.
pub fn dist_point_segment_sqr_2d(pt: Vec3, p: Vec3, q: Vec3) -> (f32, f32) {
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
    (dx * dx + dz * dz, t)
}

/// Even-odd point in polygon test on the xz-plane
pub fn point_in_polygon(pt: Vec3, verts: &[Vec3]) -> bool {
    let n = verts.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.z > pt.z) != (vj.z > pt.z))
            && (pt.x < (vj.x - vi.x) * (pt.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distances from `pt` to every edge of the polygon
///
/// Edge `i` runs from `verts[i]` to `verts[i + 1]`. Returns whether the point is inside
/// the polygon together with `(distance², t)` per edge.
pub fn distance_pt_poly_edges_sqr(pt: Vec3, verts: &[Vec3]) -> (bool, Vec<(f32, f32)>) {
    let n = verts.len();
    let mut edges = vec![(0.0, 0.0); n];
    let mut inside = false;
    for i in 0..n {
        let j = (i + n - 1) % n;
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.z > pt.z) != (vj.z > pt.z))
            && (pt.x < (vj.x - vi.x) * (pt.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        edges[j] = dist_point_segment_sqr_2d(pt, vj, vi);
    }
    (inside, edges)
}

/// Result of clipping a segment against a convex polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPolyHit {
    /// Parameter where the segment enters the polygon
    pub tmin: f32,
    /// Parameter where the segment leaves the polygon
    pub tmax: f32,
    /// Edge through which the segment enters, if it starts outside
    pub seg_min: Option<usize>,
    /// Edge through which the segment leaves, if it ends outside
    pub seg_max: Option<usize>,
}

/// Clips the segment `p0 -> p1` against a convex polygon on the xz-plane
///
/// Returns `None` when the segment does not intersect the polygon.
pub fn intersect_segment_poly_2d(p0: Vec3, p1: Vec3, verts: &[Vec3]) -> Option<SegmentPolyHit> {
    const EPS: f32 = 0.000_000_01;

    let n = verts.len();
    let mut hit = SegmentPolyHit {
        tmin: 0.0,
        tmax: 1.0,
        seg_min: None,
        seg_max: None,
    };
    let dir = p1 - p0;

    for i in 0..n {
        let j = (i + n - 1) % n;
        let edge = verts[i] - verts[j];
        let diff = p0 - verts[j];
        let num = perp_2d(edge, diff);
        let den = perp_2d(dir, edge);
        if den.abs() < EPS {
            // Parallel to the edge: outside if on the wrong side.
            if num < 0.0 {
                return None;
            }
            continue;
        }
        let t = num / den;
        if den < 0.0 {
            if t > hit.tmin {
                hit.tmin = t;
                hit.seg_min = Some(j);
                if hit.tmin > hit.tmax {
                    return None;
                }
            }
        } else if t < hit.tmax {
            hit.tmax = t;
            hit.seg_max = Some(j);
            if hit.tmax < hit.tmin {
                return None;
            }
        }
    }

    Some(hit)
}

/// Height of the triangle at the xz location of `p`, if `p` projects inside it
pub fn closest_height_point_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPS: f32 = 1e-6;

    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;

    let mut denom = v0.x * v1.z - v0.z * v1.x;
    if denom.abs() < EPS {
        return None;
    }

    let mut u = v1.z * v2.x - v1.x * v2.z;
    let mut v = v0.x * v2.z - v0.z * v2.x;
    if denom < 0.0 {
        denom = -denom;
        u = -u;
        v = -v;
    }

    if u >= 0.0 && v >= 0.0 && (u + v) <= denom {
        Some(a.y + (v0.y * u + v1.y * v) / denom)
    } else {
        None
    }
}

/// Closest point on a 3D triangle to `p`
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}
