//! Distance field and watershed region partitioning
//!
//! The distance field stores, per span, the chamfer distance to the nearest boundary.
//! Regions are then grown from its local maxima downward, level by level, and finally
//! small regions are removed or merged into their neighbours.

use nav_common::{Error, Result};

use crate::compact_heightfield::CompactHeightfield;
use crate::{BORDER_REG, NULL_AREA};

const EXPAND_ITERS: usize = 8;
const MAX_CONTOUR_WALK: usize = 40_000;

#[derive(Debug, Clone, Copy)]
struct LevelStackEntry {
    x: i32,
    z: i32,
    index: Option<usize>,
}

#[derive(Debug, Clone)]
struct Region {
    span_count: i32,
    id: u16,
    area_type: u8,
    remap: bool,
    visited: bool,
    overlap: bool,
    connections: Vec<u16>,
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            span_count: 0,
            id,
            area_type: 0,
            remap: false,
            visited: false,
            overlap: false,
            connections: Vec::new(),
            floors: Vec::new(),
        }
    }

    fn add_unique_floor(&mut self, id: u16) {
        if !self.floors.contains(&id) {
            self.floors.push(id);
        }
    }

    fn remove_adjacent_neighbours(&mut self) {
        let mut i = 0;
        while self.connections.len() > 1 && i < self.connections.len() {
            let ni = (i + 1) % self.connections.len();
            if self.connections[i] == self.connections[ni] {
                self.connections.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn replace_neighbour(&mut self, old_id: u16, new_id: u16) {
        let mut changed = false;
        for c in self.connections.iter_mut().filter(|c| **c == old_id) {
            *c = new_id;
            changed = true;
        }
        for f in self.floors.iter_mut().filter(|f| **f == old_id) {
            *f = new_id;
        }
        if changed {
            self.remove_adjacent_neighbours();
        }
    }

    fn can_merge_with(&self, other: &Region) -> bool {
        if self.area_type != other.area_type {
            return false;
        }
        let shared_edges = self.connections.iter().filter(|&&c| c == other.id).count();
        shared_edges <= 1 && !self.floors.contains(&other.id)
    }

    fn is_connected_to_border(&self) -> bool {
        self.connections.contains(&0)
    }
}

/// Merges region `b` into region `a` by splicing their outlines at the shared edge
fn merge_regions(a: &mut Region, b: &mut Region) -> bool {
    let Some(ins_a) = a.connections.iter().position(|&c| c == b.id) else {
        return false;
    };
    let Some(ins_b) = b.connections.iter().position(|&c| c == a.id) else {
        return false;
    };

    let acon = std::mem::take(&mut a.connections);
    let na = acon.len();
    let nb = b.connections.len();
    a.connections.extend((0..na - 1).map(|i| acon[(ins_a + 1 + i) % na]));
    a.connections
        .extend((0..nb - 1).map(|i| b.connections[(ins_b + 1 + i) % nb]));
    a.remove_adjacent_neighbours();

    for &f in &b.floors {
        a.add_unique_floor(f);
    }
    a.span_count += b.span_count;
    b.span_count = 0;
    b.connections.clear();
    true
}

fn pair_mut(regions: &mut [Region], a: usize, b: usize) -> Option<(&mut Region, &mut Region)> {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => {
            let (lo, hi) = regions.split_at_mut(b);
            Some((&mut lo[a], &mut hi[0]))
        }
        std::cmp::Ordering::Greater => {
            let (lo, hi) = regions.split_at_mut(a);
            Some((&mut hi[0], &mut lo[b]))
        }
        std::cmp::Ordering::Equal => None,
    }
}

impl CompactHeightfield {
    /// Computes the smoothed distance-to-border field used by the watershed partitioning
    pub fn build_distance_field(&mut self) {
        let src = self.calculate_distance_field();
        self.max_distance = src.iter().copied().max().unwrap_or(0);
        self.dist = self.box_blur(1, &src);
    }

    fn calculate_distance_field(&self) -> Vec<u16> {
        let mut dist = vec![u16::MAX; self.span_count];

        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_spans(x, z) {
                    let area = self.areas[i];
                    let same_area = (0..4)
                        .filter_map(|dir| self.neighbour(x, z, i, dir))
                        .filter(|&(_, _, ai)| self.areas[ai] == area)
                        .count();
                    if same_area != 4 {
                        dist[i] = 0;
                    }
                }
            }
        }

        let relax = |dist: &mut [u16], i: usize, ai: usize, cost: u16| {
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

        dist
    }

    fn box_blur(&self, threshold: u16, src: &[u16]) -> Vec<u16> {
        let threshold = threshold * 2;
        let mut dst = vec![0u16; self.span_count];
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_spans(x, z) {
                    let cd = src[i];
                    if cd <= threshold {
                        dst[i] = cd;
                        continue;
                    }
                    let mut d = cd as u32;
                    for dir in 0..4 {
                        match self.neighbour(x, z, i, dir) {
                            Some((ax, az, ai)) => {
                                d += src[ai] as u32;
                                let dir2 = (dir + 1) & 3;
                                match self.neighbour(ax, az, ai, dir2) {
                                    Some((_, _, ai2)) => d += src[ai2] as u32,
                                    None => d += cd as u32,
                                }
                            }
                            None => d += cd as u32 * 2,
                        }
                    }
                    dst[i] = ((d + 5) / 9).min(u16::MAX as u32) as u16;
                }
            }
        }
        dst
    }

    /// Partitions the walkable spans into regions with the watershed algorithm
    ///
    /// `border_size` cells along each side are painted as border regions first so that
    /// no regular region reaches the tile border. Requires the distance field.
    pub fn build_regions(
        &mut self,
        border_size: i32,
        min_region_area: i32,
        merge_region_area: i32,
    ) -> Result<()> {
        if self.dist.len() != self.span_count {
            return Err(Error::NavMeshGeneration(
                "distance field must be built before regions".to_string(),
            ));
        }

        let w = self.width;
        let h = self.height;
        let mut src_reg = vec![0u16; self.span_count];
        let mut src_dist = vec![0u16; self.span_count];

        let mut region_id: u16 = 1;
        let mut level = ((self.max_distance as u32 + 1) & !1).min(u16::MAX as u32 - 1) as u16;

        if border_size > 0 {
            let bw = w.min(border_size);
            let bh = h.min(border_size);
            self.paint_rect_region(0, bw, 0, h, region_id | BORDER_REG, &mut src_reg);
            region_id += 1;
            self.paint_rect_region(w - bw, w, 0, h, region_id | BORDER_REG, &mut src_reg);
            region_id += 1;
            self.paint_rect_region(0, w, 0, bh, region_id | BORDER_REG, &mut src_reg);
            region_id += 1;
            self.paint_rect_region(0, w, h - bh, h, region_id | BORDER_REG, &mut src_reg);
            region_id += 1;
        }
        self.border_size = border_size;

        let mut level_stack = Vec::new();
        let mut flood_stack = Vec::new();
        while level > 0 {
            level = level.saturating_sub(2);

            self.expand_regions(EXPAND_ITERS, level, &mut src_reg, &mut src_dist, &mut level_stack);

            for z in 0..h {
                for x in 0..w {
                    for i in self.cell_spans(x, z) {
                        if self.dist[i] < level || src_reg[i] != 0 || self.areas[i] == NULL_AREA {
                            continue;
                        }
                        if self.flood_region(
                            x,
                            z,
                            i,
                            level,
                            region_id,
                            &mut src_reg,
                            &mut src_dist,
                            &mut flood_stack,
                        ) {
                            if region_id >= BORDER_REG - 1 {
                                return Err(Error::NavMeshGeneration(
                                    "region id overflow".to_string(),
                                ));
                            }
                            region_id += 1;
                        }
                    }
                }
            }
        }

        // Grow into whatever is left.
        self.expand_regions(
            EXPAND_ITERS * 8,
            0,
            &mut src_reg,
            &mut src_dist,
            &mut level_stack,
        );

        let mut max_region_id = region_id;
        self.merge_and_filter_regions(
            min_region_area,
            merge_region_area,
            &mut max_region_id,
            &mut src_reg,
        );
        self.max_regions = max_region_id;

        for (span, reg) in self.spans.iter_mut().zip(src_reg) {
            span.reg = reg;
        }
        Ok(())
    }

    fn paint_rect_region(
        &self,
        min_x: i32,
        max_x: i32,
        min_z: i32,
        max_z: i32,
        reg_id: u16,
        src_reg: &mut [u16],
    ) {
        for z in min_z..max_z {
            for x in min_x..max_x {
                for i in self.cell_spans(x, z) {
                    if self.areas[i] != NULL_AREA {
                        src_reg[i] = reg_id;
                    }
                }
            }
        }
    }

    fn expand_regions(
        &self,
        max_iter: usize,
        level: u16,
        src_reg: &mut [u16],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
    ) {
        stack.clear();
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_spans(x, z) {
                    if self.dist[i] >= level && src_reg[i] == 0 && self.areas[i] != NULL_AREA {
                        stack.push(LevelStackEntry { x, z, index: Some(i) });
                    }
                }
            }
        }

        let mut dirty = Vec::new();
        let mut iter = 0;
        while !stack.is_empty() {
            let mut failed = 0;
            dirty.clear();

            for entry in stack.iter_mut() {
                let Some(i) = entry.index else {
                    failed += 1;
                    continue;
                };

                let mut r = src_reg[i];
                let mut d2 = u16::MAX;
                let area = self.areas[i];
                for dir in 0..4 {
                    let Some((_, _, ai)) = self.neighbour(entry.x, entry.z, i, dir) else {
                        continue;
                    };
                    if self.areas[ai] != area {
                        continue;
                    }
                    if src_reg[ai] > 0 && (src_reg[ai] & BORDER_REG) == 0 {
                        let nd = src_dist[ai].saturating_add(2);
                        if nd < d2 {
                            r = src_reg[ai];
                            d2 = nd;
                        }
                    }
                }

                if r != 0 {
                    entry.index = None;
                    dirty.push((i, r, d2));
                } else {
                    failed += 1;
                }
            }

            for &(i, r, d) in &dirty {
                src_reg[i] = r;
                src_dist[i] = d;
            }

            if failed == stack.len() {
                break;
            }
            if level > 0 {
                iter += 1;
                if iter >= max_iter {
                    break;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn flood_region(
        &self,
        x: i32,
        z: i32,
        i: usize,
        level: u16,
        r: u16,
        src_reg: &mut [u16],
        src_dist: &mut [u16],
        stack: &mut Vec<(i32, i32, usize)>,
    ) -> bool {
        let area = self.areas[i];

        stack.clear();
        stack.push((x, z, i));
        src_reg[i] = r;
        src_dist[i] = 0;

        let lev = level.saturating_sub(2);
        let mut count = 0;

        while let Some((cx, cz, ci)) = stack.pop() {
            // Stop at spans already touching another region, including diagonally.
            let mut adjacent = 0;
            for dir in 0..4 {
                let Some((ax, az, ai)) = self.neighbour(cx, cz, ci, dir) else {
                    continue;
                };
                if self.areas[ai] != area {
                    continue;
                }
                let nr = src_reg[ai];
                if nr & BORDER_REG != 0 {
                    continue;
                }
                if nr != 0 && nr != r {
                    adjacent = nr;
                    break;
                }
                if let Some((_, _, ai2)) = self.neighbour(ax, az, ai, (dir + 1) & 3) {
                    if self.areas[ai2] != area {
                        continue;
                    }
                    let nr2 = src_reg[ai2];
                    if nr2 != 0 && nr2 != r {
                        adjacent = nr2;
                        break;
                    }
                }
            }
            if adjacent != 0 {
                src_reg[ci] = 0;
                continue;
            }

            count += 1;

            for dir in 0..4 {
                let Some((ax, az, ai)) = self.neighbour(cx, cz, ci, dir) else {
                    continue;
                };
                if self.areas[ai] != area {
                    continue;
                }
                if self.dist[ai] >= lev && src_reg[ai] == 0 {
                    src_reg[ai] = r;
                    src_dist[ai] = 0;
                    stack.push((ax, az, ai));
                }
            }
        }

        count > 0
    }

    fn is_solid_edge(&self, src_reg: &[u16], x: i32, z: i32, i: usize, dir: usize) -> bool {
        let r = self
            .neighbour(x, z, i, dir)
            .map_or(0, |(_, _, ai)| src_reg[ai]);
        r != src_reg[i]
    }

    /// Walks the outline of the region containing span `i` and returns the sequence of
    /// neighbouring region ids along it
    fn walk_region_contour(
        &self,
        mut x: i32,
        mut z: i32,
        mut i: usize,
        mut dir: usize,
        src_reg: &[u16],
    ) -> Vec<u16> {
        let start_dir = dir;
        let start_i = i;

        let mut cur_reg = self
            .neighbour(x, z, i, dir)
            .map_or(0, |(_, _, ai)| src_reg[ai]);
        let mut cont = vec![cur_reg];

        for _ in 0..MAX_CONTOUR_WALK {
            if self.is_solid_edge(src_reg, x, z, i, dir) {
                let r = self
                    .neighbour(x, z, i, dir)
                    .map_or(0, |(_, _, ai)| src_reg[ai]);
                if r != cur_reg {
                    cur_reg = r;
                    cont.push(cur_reg);
                }
                dir = (dir + 1) & 3;
            } else {
                let Some((nx, nz, ni)) = self.neighbour(x, z, i, dir) else {
                    break;
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

        let mut j = 0;
        while cont.len() > 1 && j < cont.len() {
            let nj = (j + 1) % cont.len();
            if cont[j] == cont[nj] {
                cont.remove(j);
            } else {
                j += 1;
            }
        }
        cont
    }

    fn merge_and_filter_regions(
        &self,
        min_region_area: i32,
        merge_region_size: i32,
        max_region_id: &mut u16,
        src_reg: &mut [u16],
    ) {
        let nreg = *max_region_id as usize + 1;
        let mut regions: Vec<Region> = (0..nreg).map(|i| Region::new(i as u16)).collect();

        // Span counts, overlapping floors and the neighbour ring of every region.
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = self.cell_spans(x, z);
                for i in cell.clone() {
                    let r = src_reg[i];
                    if r == 0 || r as usize >= nreg {
                        continue;
                    }
                    let reg = &mut regions[r as usize];
                    reg.span_count += 1;

                    for j in cell.clone() {
                        if i == j {
                            continue;
                        }
                        let floor_id = src_reg[j];
                        if floor_id == 0 || floor_id as usize >= nreg {
                            continue;
                        }
                        if floor_id == r {
                            reg.overlap = true;
                        }
                        reg.add_unique_floor(floor_id);
                    }

                    if !reg.connections.is_empty() {
                        continue;
                    }
                    reg.area_type = self.areas[i];

                    if let Some(dir) = (0..4).find(|&d| self.is_solid_edge(src_reg, x, z, i, d)) {
                        reg.connections = self.walk_region_contour(x, z, i, dir, src_reg);
                    }
                }
            }
        }

        // Remove islands smaller than the minimum area.
        let mut stack = Vec::new();
        let mut trace = Vec::new();
        for i in 0..nreg {
            let reg = &regions[i];
            if reg.id == 0 || reg.id & BORDER_REG != 0 || reg.span_count == 0 || reg.visited {
                continue;
            }

            let mut connects_to_border = false;
            let mut span_count = 0;
            stack.clear();
            trace.clear();
            regions[i].visited = true;
            stack.push(i);

            while let Some(ri) = stack.pop() {
                span_count += regions[ri].span_count;
                trace.push(ri);
                for j in 0..regions[ri].connections.len() {
                    let c = regions[ri].connections[j];
                    if c & BORDER_REG != 0 {
                        connects_to_border = true;
                        continue;
                    }
                    let neighbour = &mut regions[c as usize];
                    if neighbour.visited || neighbour.id == 0 || neighbour.id & BORDER_REG != 0 {
                        continue;
                    }
                    neighbour.visited = true;
                    stack.push(neighbour.id as usize);
                }
            }

            // Regions touching the tile border cannot be sized reliably and are kept.
            if span_count < min_region_area && !connects_to_border {
                for &t in &trace {
                    regions[t].span_count = 0;
                    regions[t].id = 0;
                }
            }
        }

        // Merge small regions into their smallest compatible neighbour.
        loop {
            let mut merge_count = 0;
            for i in 0..nreg {
                let reg = &regions[i];
                if reg.id == 0 || reg.id & BORDER_REG != 0 || reg.overlap || reg.span_count == 0 {
                    continue;
                }
                if reg.span_count > merge_region_size && reg.is_connected_to_border() {
                    continue;
                }

                let mut smallest = i32::MAX;
                let mut merge_id = reg.id;
                for &c in &reg.connections {
                    if c & BORDER_REG != 0 {
                        continue;
                    }
                    let candidate = &regions[c as usize];
                    if candidate.id == 0 || candidate.id & BORDER_REG != 0 || candidate.overlap {
                        continue;
                    }
                    if candidate.span_count < smallest
                        && reg.can_merge_with(candidate)
                        && candidate.can_merge_with(reg)
                    {
                        smallest = candidate.span_count;
                        merge_id = candidate.id;
                    }
                }

                let old_id = reg.id;
                if merge_id == old_id {
                    continue;
                }
                let Some((target, source)) = pair_mut(&mut regions, merge_id as usize, i) else {
                    continue;
                };
                if merge_regions(target, source) {
                    for r in regions.iter_mut() {
                        if r.id == 0 || r.id & BORDER_REG != 0 {
                            continue;
                        }
                        if r.id == old_id {
                            r.id = merge_id;
                        }
                        r.replace_neighbour(old_id, merge_id);
                    }
                    merge_count += 1;
                }
            }
            if merge_count == 0 {
                break;
            }
        }

        // Compress the ids of regions that still own spans into 1..=n. Merged regions
        // follow the id of their target, unused ids are cleared.
        for r in regions.iter_mut() {
            r.remap = r.id != 0 && r.id & BORDER_REG == 0;
        }
        let mut next_id: u16 = 0;
        for i in 0..nreg {
            if !regions[i].remap || regions[i].span_count == 0 {
                continue;
            }
            let old_id = regions[i].id;
            next_id += 1;
            for r in regions.iter_mut().filter(|r| r.remap && r.id == old_id) {
                r.id = next_id;
                r.remap = false;
            }
        }
        for r in regions.iter_mut().filter(|r| r.remap) {
            r.id = 0;
        }
        *max_region_id = next_id;

        for r in src_reg.iter_mut() {
            if *r & BORDER_REG == 0 {
                *r = regions[*r as usize].id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::Heightfield;
    use crate::WALKABLE_AREA;
    use glam::Vec3;

    fn build_field(width: i32, height: i32, solid: impl Fn(i32, i32) -> bool) -> CompactHeightfield {
        let mut hf = Heightfield::new(
            width,
            height,
            Vec3::ZERO,
            Vec3::new(width as f32, 10.0, height as f32),
            1.0,
            0.5,
        )
        .unwrap();
        for z in 0..height {
            for x in 0..width {
                if solid(x, z) {
                    hf.add_span(x, z, 0, 2, WALKABLE_AREA, 1).unwrap();
                }
            }
        }
        CompactHeightfield::build(&hf, 2, 1).unwrap()
    }

    #[test]
    fn test_distance_field_peaks_in_centre() {
        let mut chf = build_field(9, 9, |_, _| true);
        chf.build_distance_field();
        let corner = chf.cell_spans(0, 0).start;
        let centre = chf.cell_spans(4, 4).start;
        assert_eq!(chf.dist[corner], 0);
        assert!(chf.dist[centre] > chf.dist[chf.cell_spans(2, 2).start]);
        assert!(chf.max_distance >= 8);
    }

    #[test]
    fn test_regions_require_distance_field() {
        let mut chf = build_field(4, 4, |_, _| true);
        assert!(chf.build_regions(0, 0, 0).is_err());
    }

    #[test]
    fn test_single_floor_is_one_region() {
        let mut chf = build_field(10, 10, |_, _| true);
        chf.build_distance_field();
        chf.build_regions(0, 2, 20).unwrap();
        assert_eq!(chf.max_regions, 1);
        assert!(chf.spans.iter().all(|s| s.reg == 1));
    }

    #[test]
    fn test_separate_platforms_get_separate_regions() {
        let mut chf = build_field(10, 4, |x, _| x < 4 || x >= 6);
        chf.build_distance_field();
        chf.build_regions(0, 8, 20).unwrap();
        assert_eq!(chf.max_regions, 2);
        let left = chf.spans[chf.cell_spans(0, 0).start].reg;
        let right = chf.spans[chf.cell_spans(9, 0).start].reg;
        assert_ne!(left, 0);
        assert_ne!(right, 0);
        assert_ne!(left, right);
    }

    #[test]
    fn test_small_islands_are_removed() {
        let mut chf = build_field(10, 4, |x, _| x < 4 || x >= 6);
        chf.build_distance_field();
        chf.build_regions(0, 20, 20).unwrap();
        assert_eq!(chf.max_regions, 0);
        assert!(chf.spans.iter().all(|s| s.reg == 0));
    }

    #[test]
    fn test_border_regions_are_flagged() {
        let mut chf = build_field(12, 12, |_, _| true);
        chf.build_distance_field();
        chf.build_regions(2, 2, 20).unwrap();
        assert_eq!(chf.border_size, 2);
        let edge = chf.spans[chf.cell_spans(0, 5).start].reg;
        assert_ne!(edge & BORDER_REG, 0);
        let inner = chf.spans[chf.cell_spans(6, 6).start].reg;
        assert_eq!(inner & BORDER_REG, 0);
        assert_ne!(inner, 0);
        // Border ids are not counted as regions.
        assert!(chf.max_regions >= 1);
        assert!(chf
            .spans
            .iter()
            .filter(|s| s.reg & BORDER_REG == 0)
            .all(|s| s.reg <= chf.max_regions));
        assert!(chf.spans.iter().any(|s| s.reg == chf.max_regions));
    }

    #[test]
    fn test_merge_regions_splices_outlines() {
        let mut a = Region::new(1);
        a.connections = vec![0, 2];
        let mut b = Region::new(2);
        b.connections = vec![0, 1, 3];
        b.span_count = 4;
        assert!(merge_regions(&mut a, &mut b));
        // The wrap-around duplicate of the null neighbour is collapsed.
        assert_eq!(a.connections, vec![0, 3]);
        assert_eq!(a.span_count, 4);
        assert_eq!(b.span_count, 0);
    }
}
