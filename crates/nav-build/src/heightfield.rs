//! Solid heightfield
//!
//! A grid of columns, each holding a bottom-up list of solid spans. Spans live in a pooled
//! arena and are chained by index so that the field can be moved across threads.

use glam::Vec3;
use nav_common::{Error, Result};

use crate::{dir_offset_x, dir_offset_z, NULL_AREA, SPAN_MAX_HEIGHT};

/// A solid vertical span in a heightfield column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Lower limit of the span, in cells from `bmin.y`
    pub smin: u16,
    /// Upper limit of the span, in cells from `bmin.y`
    pub smax: u16,
    /// Area id, [`NULL_AREA`] when not walkable
    pub area: u8,
    /// Index of the next span up the column
    pub next: Option<u32>,
}

/// Dynamic heightfield of solid spans
#[derive(Debug, Clone)]
pub struct Heightfield {
    pub width: i32,
    pub height: i32,
    pub bmin: Vec3,
    pub bmax: Vec3,
    pub cs: f32,
    pub ch: f32,
    columns: Vec<Option<u32>>,
    pool: Vec<Span>,
    free: Vec<u32>,
}

/// One `value` per cell of a `width` x `height` grid
///
/// Fails instead of aborting when the grid cannot be allocated.
pub(crate) fn grid_vec<T: Clone>(value: T, width: i32, height: i32) -> Result<Vec<T>> {
    let cells = usize::try_from(width)
        .ok()
        .zip(usize::try_from(height).ok())
        .and_then(|(w, h)| w.checked_mul(h))
        .ok_or_else(|| {
            Error::NavMeshGeneration(format!("grid size {}x{} overflows", width, height))
        })?;
    let mut grid = Vec::new();
    grid.try_reserve_exact(cells).map_err(|e| {
        Error::NavMeshGeneration(format!(
            "out of memory for a {}x{} grid: {}",
            width, height, e
        ))
    })?;
    grid.resize(cells, value);
    Ok(grid)
}

impl Heightfield {
    pub fn new(width: i32, height: i32, bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(Error::NavMeshGeneration(format!(
                "heightfield size {}x{} is empty",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns: grid_vec(None, width, height)?,
            pool: Vec::new(),
            free: Vec::new(),
        })
    }

    #[inline]
    fn column_index(&self, x: i32, z: i32) -> usize {
        (x + z * self.width) as usize
    }

    /// First span of the column at `(x, z)`
    pub fn first_span(&self, x: i32, z: i32) -> Option<u32> {
        if x < 0 || z < 0 || x >= self.width || z >= self.height {
            return None;
        }
        self.columns[self.column_index(x, z)]
    }

    pub fn span(&self, index: u32) -> &Span {
        &self.pool[index as usize]
    }

    pub fn span_mut(&mut self, index: u32) -> &mut Span {
        &mut self.pool[index as usize]
    }

    /// Iterates the spans of a column bottom-up as `(index, span)`
    pub fn column(&self, x: i32, z: i32) -> ColumnIter<'_> {
        ColumnIter {
            field: self,
            current: self.first_span(x, z),
        }
    }

    /// Number of spans currently stored
    pub fn span_count(&self) -> usize {
        self.pool.len() - self.free.len()
    }

    /// Number of spans with a walkable area
    pub fn walkable_span_count(&self) -> usize {
        let mut count = 0;
        for z in 0..self.height {
            for x in 0..self.width {
                count += self.column(x, z).filter(|(_, s)| s.area != NULL_AREA).count();
            }
        }
        count
    }

    fn alloc_span(&mut self, span: Span) -> u32 {
        match self.free.pop() {
            Some(index) => {
                self.pool[index as usize] = span;
                index
            }
            None => {
                self.pool.push(span);
                (self.pool.len() - 1) as u32
            }
        }
    }

    /// Inserts a span into a column, merging it with every span it overlaps
    ///
    /// When the tops of merged spans are within `flag_merge_threshold` the larger area id
    /// wins, otherwise the area of the topmost surface is kept.
    pub fn add_span(
        &mut self,
        x: i32,
        z: i32,
        smin: u16,
        smax: u16,
        area: u8,
        flag_merge_threshold: i32,
    ) -> Result<()> {
        if x < 0 || x >= self.width || z < 0 || z >= self.height {
            return Err(Error::NavMeshGeneration(format!(
                "span position out of bounds: ({}, {})",
                x, z
            )));
        }
        if smin > smax {
            return Err(Error::NavMeshGeneration(format!(
                "invalid span height: min {} > max {}",
                smin, smax
            )));
        }

        let column = self.column_index(x, z);
        let mut new = Span {
            smin,
            smax,
            area,
            next: None,
        };

        let mut prev: Option<u32> = None;
        let mut current = self.columns[column];
        while let Some(cur) = current {
            let span = self.pool[cur as usize];
            if span.smin > new.smax {
                break;
            }
            if span.smax < new.smin {
                prev = Some(cur);
                current = span.next;
                continue;
            }

            new.smin = new.smin.min(span.smin);
            new.smax = new.smax.max(span.smax);
            if (new.smax as i32 - span.smax as i32).abs() <= flag_merge_threshold {
                new.area = new.area.max(span.area);
            }

            // Unlink the merged span.
            match prev {
                Some(p) => self.pool[p as usize].next = span.next,
                None => self.columns[column] = span.next,
            }
            self.free.push(cur);
            current = span.next;
        }

        new.next = current;
        let index = self.alloc_span(new);
        match prev {
            Some(p) => self.pool[p as usize].next = Some(index),
            None => self.columns[column] = Some(index),
        }
        Ok(())
    }

    /// Marks non-walkable spans as walkable when their top is within `walkable_climb` of a
    /// walkable span directly below, letting agents step over curbs and stairs
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut previous: Option<(bool, u8, u16)> = None;
                let mut current = self.first_span(x, z);
                while let Some(index) = current {
                    let span = self.pool[index as usize];
                    let walkable = span.area != NULL_AREA;
                    let mut area = span.area;
                    if let Some((prev_walkable, prev_area, prev_smax)) = previous {
                        if !walkable
                            && prev_walkable
                            && (span.smax as i32 - prev_smax as i32).abs() <= walkable_climb
                        {
                            area = prev_area;
                            self.pool[index as usize].area = area;
                        }
                    }
                    // The walkable flag is copied before the area update so that a step
                    // cannot propagate over several stacked obstacles.
                    previous = Some((walkable, area, span.smax));
                    current = span.next;
                }
            }
        }
    }

    /// Removes walkable spans at ledges, where a neighbour drops by more than
    /// `walkable_climb` or the reachable neighbours differ by more than it
    pub fn filter_ledge_spans(&mut self, walkable_height: i32, walkable_climb: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut current = self.first_span(x, z);
                while let Some(index) = current {
                    let span = self.pool[index as usize];
                    current = span.next;
                    if span.area == NULL_AREA {
                        continue;
                    }

                    let bot = span.smax as i32;
                    let top = span
                        .next
                        .map_or(SPAN_MAX_HEIGHT, |n| self.pool[n as usize].smin as i32);

                    let mut min_height = SPAN_MAX_HEIGHT;
                    let mut accessible_min = span.smax as i32;
                    let mut accessible_max = span.smax as i32;

                    for dir in 0..4 {
                        let dx = x + dir_offset_x(dir);
                        let dz = z + dir_offset_z(dir);
                        if dx < 0 || dz < 0 || dx >= self.width || dz >= self.height {
                            min_height = min_height.min(-walkable_climb - bot);
                            continue;
                        }

                        // The space below the first neighbour span counts as a drop.
                        let first = self.first_span(dx, dz);
                        let mut nbot = -walkable_climb;
                        let mut ntop =
                            first.map_or(SPAN_MAX_HEIGHT, |n| self.pool[n as usize].smin as i32);
                        if top.min(ntop) - bot.max(nbot) > walkable_height {
                            min_height = min_height.min(nbot - bot);
                        }

                        for (_, neighbour) in self.column(dx, dz) {
                            nbot = neighbour.smax as i32;
                            ntop = neighbour
                                .next
                                .map_or(SPAN_MAX_HEIGHT, |n| self.pool[n as usize].smin as i32);
                            if top.min(ntop) - bot.max(nbot) > walkable_height {
                                min_height = min_height.min(nbot - bot);
                                if (nbot - bot).abs() <= walkable_climb {
                                    accessible_min = accessible_min.min(nbot);
                                    accessible_max = accessible_max.max(nbot);
                                }
                            }
                        }
                    }

                    if min_height < -walkable_climb
                        || accessible_max - accessible_min > walkable_climb
                    {
                        self.pool[index as usize].area = NULL_AREA;
                    }
                }
            }
        }
    }

    /// Removes walkable spans without `walkable_height` of clearance above them
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: i32) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut current = self.first_span(x, z);
                while let Some(index) = current {
                    let span = self.pool[index as usize];
                    let bot = span.smax as i32;
                    let top = span
                        .next
                        .map_or(SPAN_MAX_HEIGHT, |n| self.pool[n as usize].smin as i32);
                    if top - bot < walkable_height {
                        self.pool[index as usize].area = NULL_AREA;
                    }
                    current = span.next;
                }
            }
        }
    }
}

/// Iterator over the spans of one heightfield column
pub struct ColumnIter<'a> {
    field: &'a Heightfield,
    current: Option<u32>,
}

impl<'a> Iterator for ColumnIter<'a> {
    type Item = (u32, &'a Span);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.current?;
        let span = self.field.span(index);
        self.current = span.next;
        Some((index, span))
    }
}
