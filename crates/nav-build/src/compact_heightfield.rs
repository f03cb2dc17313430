//! Compact heightfield of open spans
//!
//! Only the walkable open space above solid spans is kept, stored column by column in a
//! flat array. Each span records which span it connects to in the four neighbouring
//! columns, which is all the later stages need to walk the surface.

use glam::Vec3;
use nav_common::{Error, Result};

use crate::heightfield::{grid_vec, Heightfield};
use crate::{dir_offset_x, dir_offset_z, NOT_CONNECTED, NULL_AREA, SPAN_MAX_HEIGHT};

/// Column of the compact heightfield, a range into the span array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactCell {
    pub index: u32,
    pub count: u32,
}

/// Open span above a walkable surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactSpan {
    /// Floor height in cells
    pub y: u16,
    /// Region id, 0 when unassigned
    pub reg: u16,
    /// Packed 6-bit neighbour layer per direction
    pub con: u32,
    /// Clearance above the floor in cells
    pub h: u8,
}

impl CompactSpan {
    /// Neighbour layer in `dir`, [`NOT_CONNECTED`] if none
    #[inline]
    pub fn con(&self, dir: usize) -> u32 {
        (self.con >> (dir * 6)) & 0x3f
    }

    #[inline]
    pub fn set_con(&mut self, dir: usize, layer: u32) {
        let shift = dir * 6;
        self.con = (self.con & !(0x3f << shift)) | ((layer & 0x3f) << shift);
    }
}

/// Heightfield of walkable open spans with neighbour connectivity
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    pub width: i32,
    pub height: i32,
    pub span_count: usize,
    pub walkable_height: i32,
    pub walkable_climb: i32,
    pub border_size: i32,
    pub max_distance: u16,
    pub max_regions: u16,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    pub cells: Vec<CompactCell>,
    pub spans: Vec<CompactSpan>,
    /// Distance to the nearest border per span, filled by the distance field stage
    pub dist: Vec<u16>,
    pub areas: Vec<u8>,
}

impl CompactHeightfield {
    /// Builds the compact representation of the walkable spans of `hf`
    pub fn build(hf: &Heightfield, walkable_height: i32, walkable_climb: i32) -> Result<Self> {
        let w = hf.width;
        let h = hf.height;
        let span_count = hf.walkable_span_count();

        let mut chf = Self {
            width: w,
            height: h,
            span_count,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_distance: 0,
            max_regions: 0,
            bmin: hf.bmin,
            bmax: hf.bmax + Vec3::new(0.0, walkable_height as f32 * hf.ch, 0.0),
            cs: hf.cs,
            ch: hf.ch,
            cells: grid_vec(CompactCell::default(), w, h)?,
            spans: Vec::with_capacity(span_count),
            dist: Vec::new(),
            areas: Vec::with_capacity(span_count),
        };

        for z in 0..h {
            for x in 0..w {
                let cell = &mut chf.cells[(x + z * w) as usize];
                cell.index = chf.spans.len() as u32;
                for (_, span) in hf.column(x, z) {
                    if span.area == NULL_AREA {
                        continue;
                    }
                    let bot = span.smax as i32;
                    let top = span
                        .next
                        .map_or(SPAN_MAX_HEIGHT, |n| hf.span(n).smin as i32);
                    chf.spans.push(CompactSpan {
                        y: bot.clamp(0, 0xffff) as u16,
                        reg: 0,
                        con: 0,
                        h: (top - bot).clamp(0, 0xff) as u8,
                    });
                    chf.areas.push(span.area);
                    cell.count += 1;
                }
            }
        }

        let too_high = chf.connect_neighbours();
        if too_high > NOT_CONNECTED as usize - 1 {
            return Err(Error::NavMeshGeneration(format!(
                "heightfield has too many layers ({}), max {}",
                too_high,
                NOT_CONNECTED - 1
            )));
        }
        Ok(chf)
    }

    /// Links every span to the walkable span it can step onto in each direction
    ///
    /// Returns the highest layer index that did not fit the connection bits, or 0.
    fn connect_neighbours(&mut self) -> usize {
        let max_layers = NOT_CONNECTED as usize - 1;
        let mut too_high = 0;
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = self.cells[(x + z * self.width) as usize];
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    let span = self.spans[i];
                    let mut con = CompactSpan::default();
                    for dir in 0..4 {
                        con.set_con(dir, NOT_CONNECTED);
                        let nx = x + dir_offset_x(dir);
                        let nz = z + dir_offset_z(dir);
                        if nx < 0 || nz < 0 || nx >= self.width || nz >= self.height {
                            continue;
                        }
                        let ncell = self.cells[(nx + nz * self.width) as usize];
                        for k in ncell.index as usize..(ncell.index + ncell.count) as usize {
                            let ns = self.spans[k];
                            let bot = span.y.max(ns.y) as i32;
                            let top = (span.y as i32 + span.h as i32)
                                .min(ns.y as i32 + ns.h as i32);
                            if top - bot >= self.walkable_height
                                && (ns.y as i32 - span.y as i32).abs() <= self.walkable_climb
                            {
                                let layer = k - ncell.index as usize;
                                if layer > max_layers {
                                    too_high = too_high.max(layer);
                                    continue;
                                }
                                con.set_con(dir, layer as u32);
                                break;
                            }
                        }
                    }
                    self.spans[i].con = con.con;
                }
            }
        }
        too_high
    }

    /// Index of the span connected to span `i` at `(x, z)` in `dir`
    #[inline]
    pub fn neighbour(&self, x: i32, z: i32, i: usize, dir: usize) -> Option<(i32, i32, usize)> {
        let con = self.spans[i].con(dir);
        if con == NOT_CONNECTED {
            return None;
        }
        let nx = x + dir_offset_x(dir);
        let nz = z + dir_offset_z(dir);
        let cell = self.cells[(nx + nz * self.width) as usize];
        Some((nx, nz, cell.index as usize + con as usize))
    }

    /// Span index range of the column at `(x, z)`
    #[inline]
    pub fn cell_spans(&self, x: i32, z: i32) -> std::ops::Range<usize> {
        let cell = self.cells[(x + z * self.width) as usize];
        cell.index as usize..(cell.index + cell.count) as usize
    }

    /// Shrinks the walkable area by `radius` cells away from obstacles and ledges
    pub fn erode_walkable_area(&mut self, radius: i32) {
        let mut dist = vec![0xffu8; self.span_count];

        // Spans at the boundary start at distance zero.
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_spans(x, z) {
                    if self.areas[i] == NULL_AREA {
                        dist[i] = 0;
                        continue;
                    }
                    let connected = (0..4)
                        .filter_map(|dir| self.neighbour(x, z, i, dir))
                        .filter(|&(_, _, ai)| self.areas[ai] != NULL_AREA)
                        .count();
                    if connected != 4 {
                        dist[i] = 0;
                    }
                }
            }
        }

        let relax = |dist: &mut [u8], i: usize, ai: usize, cost: u8| {
            let nd = dist[ai].saturating_add(cost);
            if nd < dist[i] {
                dist[i] = nd;
            }
        };

        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_spans(x, z) {
                    if let Some((ax, az, ai)) = self.neighbour(x, z, i, 0) {
                        relax(&mut dist, i, ai, 2);
                        if let Some((_, _, aai)) = self.neighbour(ax, az, ai, 3) {
                            relax(&mut dist, i, aai, 3);
                        }
                    }
                    if let Some((ax, az, ai)) = self.neighbour(x, z, i, 3) {
                        relax(&mut dist, i, ai, 2);
                        if let Some((_, _, aai)) = self.neighbour(ax, az, ai, 2) {
                            relax(&mut dist, i, aai, 3);
                        }
                    }
                }
            }
        }

        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                for i in self.cell_spans(x, z) {
                    if let Some((ax, az, ai)) = self.neighbour(x, z, i, 2) {
                        relax(&mut dist, i, ai, 2);
                        if let Some((_, _, aai)) = self.neighbour(ax, az, ai, 1) {
                            relax(&mut dist, i, aai, 3);
                        }
                    }
                    if let Some((ax, az, ai)) = self.neighbour(x, z, i, 1) {
                        relax(&mut dist, i, ai, 2);
                        if let Some((_, _, aai)) = self.neighbour(ax, az, ai, 0) {
                            relax(&mut dist, i, aai, 3);
                        }
                    }
                }
            }
        }

        let threshold = (radius * 2).clamp(0, 0xff) as u8;
        for (area, d) in self.areas.iter_mut().zip(dist) {
            if d < threshold {
                *area = NULL_AREA;
            }
        }
    }

    /// Number of spans that are still walkable
    pub fn walkable_span_count(&self) -> usize {
        self.areas.iter().filter(|&&a| a != NULL_AREA).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WALKABLE_AREA;

    pub(crate) fn flat_field(size: i32) -> Heightfield {
        let mut hf = Heightfield::new(
            size,
            size,
            Vec3::ZERO,
            Vec3::new(size as f32, 10.0, size as f32),
            1.0,
            0.5,
        )
        .unwrap();
        for z in 0..size {
            for x in 0..size {
                hf.add_span(x, z, 0, 2, WALKABLE_AREA, 1).unwrap();
            }
        }
        hf
    }

    #[test]
    fn test_build_connects_flat_floor() {
        let hf = flat_field(3);
        let chf = CompactHeightfield::build(&hf, 2, 1).unwrap();
        assert_eq!(chf.span_count, 9);
        let centre = chf.cell_spans(1, 1).start;
        for dir in 0..4 {
            assert!(chf.neighbour(1, 1, centre, dir).is_some());
        }
        let corner = chf.cell_spans(0, 0).start;
        assert!(chf.neighbour(0, 0, corner, 0).is_none());
        assert!(chf.neighbour(0, 0, corner, 3).is_none());
        assert!((chf.bmax.y - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_step_too_high_is_not_connected() {
        let mut hf = flat_field(2);
        hf.add_span(1, 0, 0, 8, WALKABLE_AREA, 1).unwrap();
        let chf = CompactHeightfield::build(&hf, 2, 1).unwrap();
        let i = chf.cell_spans(0, 0).start;
        assert!(chf.neighbour(0, 0, i, 2).is_none());
        assert!(chf.neighbour(0, 0, i, 1).is_some());
    }

    #[test]
    fn test_con_packing() {
        let mut span = CompactSpan::default();
        span.set_con(0, 5);
        span.set_con(3, NOT_CONNECTED);
        assert_eq!(span.con(0), 5);
        assert_eq!(span.con(1), 0);
        assert_eq!(span.con(3), NOT_CONNECTED);
        span.set_con(0, 1);
        assert_eq!(span.con(0), 1);
    }

    #[test]
    fn test_erode_shrinks_area() {
        let hf = flat_field(7);
        let mut chf = CompactHeightfield::build(&hf, 2, 1).unwrap();
        chf.erode_walkable_area(1);
        // The outer ring is removed.
        assert_eq!(chf.walkable_span_count(), 25);
        chf.erode_walkable_area(2);
        assert_eq!(chf.walkable_span_count(), 1);
    }
}
