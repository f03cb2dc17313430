//! Triangle rasterization into a solid heightfield
//!
//! Each triangle is clipped row by row and then cell by cell with a convex polygon
//! splitter; the vertical extent of every clipped piece becomes a span.

use glam::Vec3;
use nav_common::{overlap_bounds, Result};

use crate::heightfield::Heightfield;
use crate::{NULL_AREA, SPAN_MAX_HEIGHT, WALKABLE_AREA};

/// Assigns [`WALKABLE_AREA`] to triangles whose slope is at most `walkable_slope_angle`
/// degrees, and [`NULL_AREA`] to the rest
///
/// The test uses the magnitude of the normal's y component so that either winding of
/// the input triangles is accepted. Degenerate triangles are not walkable.
pub fn mark_walkable_triangles(walkable_slope_angle: f32, verts: &[Vec3], tris: &[i32]) -> Vec<u8> {
    let walkable_thr = walkable_slope_angle.to_radians().cos();
    tris.chunks_exact(3)
        .map(|t| {
            let v0 = verts[t[0] as usize];
            let v1 = verts[t[1] as usize];
            let v2 = verts[t[2] as usize];
            let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
            if normal.y.abs() > walkable_thr {
                WALKABLE_AREA
            } else {
                NULL_AREA
            }
        })
        .collect()
}

/// Splits a convex polygon along `axis = offset`
///
/// Returns the part below the line and the part above it. Vertices on the line go to
/// both halves.
fn divide_poly(input: &[Vec3], offset: f32, axis: usize) -> (Vec<Vec3>, Vec<Vec3>) {
    let mut below = Vec::with_capacity(input.len() + 2);
    let mut above = Vec::with_capacity(input.len() + 2);
    let d: Vec<f32> = input.iter().map(|v| offset - v[axis]).collect();

    let n = input.len();
    for i in 0..n {
        let j = (i + n - 1) % n;
        let in_a = d[j] >= 0.0;
        let in_b = d[i] >= 0.0;
        if in_a != in_b {
            let s = d[j] / (d[j] - d[i]);
            let p = input[j] + (input[i] - input[j]) * s;
            below.push(p);
            above.push(p);
            if d[i] > 0.0 {
                below.push(input[i]);
            } else if d[i] < 0.0 {
                above.push(input[i]);
            }
        } else {
            if d[i] >= 0.0 {
                below.push(input[i]);
                if d[i] != 0.0 {
                    continue;
                }
            }
            above.push(input[i]);
        }
    }
    (below, above)
}

/// Rasterizes one triangle into the heightfield
pub fn rasterize_triangle(
    hf: &mut Heightfield,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    area: u8,
    flag_merge_threshold: i32,
) -> Result<()> {
    let bmin = hf.bmin;
    let bmax = hf.bmax;
    let ics = 1.0 / hf.cs;
    let ich = 1.0 / hf.ch;
    let by = bmax.y - bmin.y;
    let w = hf.width;
    let h = hf.height;

    let tmin = v0.min(v1).min(v2);
    let tmax = v0.max(v1).max(v2);
    if !overlap_bounds(bmin, bmax, tmin, tmax) {
        return Ok(());
    }

    let z0 = (((tmin.z - bmin.z) * ics) as i32).clamp(-1, h - 1);
    let z1 = (((tmax.z - bmin.z) * ics) as i32).clamp(0, h - 1);

    let mut remaining = vec![v0, v1, v2];
    for z in z0..=z1 {
        let cz = bmin.z + z as f32 * hf.cs;
        let (row, rest) = divide_poly(&remaining, cz + hf.cs, 2);
        remaining = rest;
        if row.len() < 3 || z < 0 {
            continue;
        }

        let (min_x, max_x) = row
            .iter()
            .fold((row[0].x, row[0].x), |(lo, hi), v| (lo.min(v.x), hi.max(v.x)));
        let x0 = ((min_x - bmin.x) * ics) as i32;
        let x1 = ((max_x - bmin.x) * ics) as i32;
        if x1 < 0 || x0 >= w {
            continue;
        }
        let x0 = x0.clamp(-1, w - 1);
        let x1 = x1.clamp(0, w - 1);

        let mut row_rest = row;
        for x in x0..=x1 {
            let cx = bmin.x + x as f32 * hf.cs;
            let (cell, rest) = divide_poly(&row_rest, cx + hf.cs, 0);
            row_rest = rest;
            if cell.len() < 3 || x < 0 {
                continue;
            }

            let (mut smin, mut smax) = cell
                .iter()
                .fold((cell[0].y, cell[0].y), |(lo, hi), v| (lo.min(v.y), hi.max(v.y)));
            smin -= bmin.y;
            smax -= bmin.y;
            if smax < 0.0 || smin > by {
                continue;
            }
            smin = smin.max(0.0);
            smax = smax.min(by);

            let ismin = ((smin * ich).floor() as i32).clamp(0, SPAN_MAX_HEIGHT);
            let ismax = ((smax * ich).ceil() as i32).clamp(ismin + 1, SPAN_MAX_HEIGHT);
            hf.add_span(x, z, ismin as u16, ismax as u16, area, flag_merge_threshold)?;
        }
    }
    Ok(())
}

/// Rasterizes an indexed triangle list with one area id per triangle
pub fn rasterize_triangles(
    hf: &mut Heightfield,
    verts: &[Vec3],
    tris: &[i32],
    areas: &[u8],
    flag_merge_threshold: i32,
) -> Result<()> {
    for (t, &area) in tris.chunks_exact(3).zip(areas) {
        rasterize_triangle(
            hf,
            verts[t[0] as usize],
            verts[t[1] as usize],
            verts[t[2] as usize],
            area,
            flag_merge_threshold,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_walkable_by_slope() {
        let verts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        // Flat in both windings, then a vertical wall.
        let tris = vec![0, 1, 2, 0, 2, 1, 0, 1, 3];
        let areas = mark_walkable_triangles(45.0, &verts, &tris);
        assert_eq!(areas, vec![WALKABLE_AREA, WALKABLE_AREA, NULL_AREA]);
    }

    #[test]
    fn test_divide_poly_square() {
        let square = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        let (below, above) = divide_poly(&square, 1.0, 0);
        assert_eq!(below.len(), 4);
        assert_eq!(above.len(), 4);
        assert!(below.iter().all(|v| v.x <= 1.0));
        assert!(above.iter().all(|v| v.x >= 1.0));
    }

    #[test]
    fn test_rasterize_flat_triangle_fills_cells() {
        let mut hf = Heightfield::new(
            4,
            4,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(4.0, 1.0, 4.0),
            1.0,
            0.5,
        )
        .unwrap();
        let v0 = Vec3::new(0.0, 0.0, 0.0);
        let v1 = Vec3::new(0.0, 0.0, 4.0);
        let v2 = Vec3::new(4.0, 0.0, 4.0);
        let v3 = Vec3::new(4.0, 0.0, 0.0);
        rasterize_triangle(&mut hf, v0, v1, v2, WALKABLE_AREA, 1).unwrap();
        rasterize_triangle(&mut hf, v0, v2, v3, WALKABLE_AREA, 1).unwrap();

        for z in 0..4 {
            for x in 0..4 {
                let spans: Vec<_> = hf.column(x, z).collect();
                assert_eq!(spans.len(), 1, "cell ({}, {})", x, z);
                assert_eq!(spans[0].1.smin, 2);
                assert_eq!(spans[0].1.smax, 3);
            }
        }
    }

    #[test]
    fn test_triangle_outside_field_is_ignored() {
        let mut hf =
            Heightfield::new(2, 2, Vec3::ZERO, Vec3::new(2.0, 1.0, 2.0), 1.0, 0.5).unwrap();
        rasterize_triangle(
            &mut hf,
            Vec3::new(5.0, 0.5, 5.0),
            Vec3::new(6.0, 0.5, 5.0),
            Vec3::new(5.0, 0.5, 6.0),
            WALKABLE_AREA,
            1,
        )
        .unwrap();
        assert_eq!(hf.span_count(), 0);
    }
}
