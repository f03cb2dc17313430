//! Queries over a [`NavMesh`]
//!
//! A [`NavMeshQuery`] borrows the mesh and owns the search state, so it is cheap to
//! create one per request. Positions are world space, polygons are addressed by
//! [`PolyRef`].

use glam::Vec3;
use nav_common::{
    dist_point_segment_sqr_2d, distance_pt_poly_edges_sqr, intersect_segment_poly_2d, sqr,
    tri_area_2d, vequal, vfinite, Error, Result,
};
use serde::{Deserialize, Serialize};

use crate::nav_mesh::{Link, MeshTile};
use crate::node_pool::{NodeFlags, NodePool, NodeQueue, NULL_IDX};
use crate::tile_data::{Poly, PolyType};
use crate::{NavMesh, PolyFlags, PolyRef, Status, LINK_SIDE_INTERNAL, MAX_AREAS};

/// Search nodes available to a single path search
pub const DEFAULT_MAX_NODES: usize = 2048;

/// Scale applied to the distance heuristic so the search prefers explored nodes
const H_SCALE: f32 = 0.999;

/// Polygon filter and traversal costs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Cost multiplier per area id
    pub area_cost: Vec<f32>,
    /// A polygon must share at least one flag with this set
    pub include_flags: PolyFlags,
    /// A polygon must share no flag with this set
    pub exclude_flags: PolyFlags,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            area_cost: vec![1.0; MAX_AREAS],
            include_flags: PolyFlags::all(),
            exclude_flags: PolyFlags::empty(),
        }
    }
}

impl QueryFilter {
    pub fn pass_filter(&self, poly: &Poly) -> bool {
        poly.flags.intersects(self.include_flags) && !poly.flags.intersects(self.exclude_flags)
    }

    /// Cost of moving from `pa` to `pb` across `poly`
    pub fn cost(&self, pa: Vec3, pb: Vec3, poly: &Poly) -> f32 {
        let area_cost = self.area_cost.get(poly.area() as usize).copied().unwrap_or(1.0);
        pa.distance(pb) * area_cost
    }

    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        if let Some(c) = self.area_cost.get_mut(area as usize) {
            *c = cost;
        }
    }
}

/// Polygon corridor found by [`NavMeshQuery::find_path`]
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub path: Vec<PolyRef>,
    /// Success, with [`Status::PARTIAL_RESULT`] if the corridor stops short of the
    /// end polygon and [`Status::BUFFER_TOO_SMALL`] if it was truncated
    pub status: Status,
}

bitflags::bitflags! {
    /// Role of a straight path vertex
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StraightPathFlags: u8 {
        const START = 0x01;
        const END = 0x02;
        const OFFMESH_CONNECTION = 0x04;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StraightPathPoint {
    pub pos: Vec3,
    pub flags: StraightPathFlags,
    /// Polygon entered at this vertex, null for the end vertex
    pub poly_ref: PolyRef,
}

/// Corners of a corridor from [`NavMeshQuery::find_straight_path`]
#[derive(Debug, Clone, PartialEq)]
pub struct StraightPath {
    pub points: Vec<StraightPathPoint>,
    pub status: Status,
}

impl StraightPath {
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.points.iter().map(|p| p.pos)
    }
}

/// Outcome of [`NavMeshQuery::raycast`]
#[derive(Debug, Clone, PartialEq)]
pub struct RaycastHit {
    /// Hit parameter along the ray, `f32::MAX` when the end point was reached
    pub t: f32,
    /// Normal of the wall that was hit, zero when nothing was hit
    pub hit_normal: Vec3,
    /// Edge of the last visited polygon that stopped the ray
    pub hit_edge_index: Option<usize>,
    /// Polygons visited by the ray
    pub path: Vec<PolyRef>,
    pub status: Status,
}

impl RaycastHit {
    pub fn is_hit(&self) -> bool {
        self.t < f32::MAX
    }
}

/// Query interface over a navigation mesh
pub struct NavMeshQuery<'a> {
    nav_mesh: &'a NavMesh,
    node_pool: NodePool,
    open_list: NodeQueue,
}

fn invalid_param(message: impl std::fmt::Display) -> Error {
    Error::Query(format!("{}: {}", Status::FAILURE | Status::INVALID_PARAM, message))
}

impl<'a> NavMeshQuery<'a> {
    pub fn new(nav_mesh: &'a NavMesh) -> Self {
        Self::with_max_nodes(nav_mesh, DEFAULT_MAX_NODES)
    }

    pub fn with_max_nodes(nav_mesh: &'a NavMesh, max_nodes: usize) -> Self {
        let hash_size = nav_common::next_pow2((max_nodes / 4).max(1) as u32) as usize;
        Self {
            nav_mesh,
            node_pool: NodePool::new(max_nodes, hash_size),
            open_list: NodeQueue::new(max_nodes),
        }
    }

    pub fn nav_mesh(&self) -> &NavMesh {
        self.nav_mesh
    }

    /// Polygons overlapping the box `center ± half_extents`
    pub fn query_polygons(
        &self,
        center: Vec3,
        half_extents: Vec3,
        filter: &QueryFilter,
    ) -> Result<Vec<PolyRef>> {
        if !vfinite(center) || !vfinite(half_extents) || half_extents.min_element() < 0.0 {
            return Err(invalid_param("query box"));
        }
        let bmin = center - half_extents;
        let bmax = center + half_extents;
        let (minx, miny) = self.nav_mesh.calc_tile_loc(bmin);
        let (maxx, maxy) = self.nav_mesh.calc_tile_loc(bmax);

        let mut polys = Vec::new();
        for y in miny..=maxy {
            for x in minx..=maxx {
                for tile in self.nav_mesh.tiles_at(x, y) {
                    polys.extend(self.nav_mesh.query_polygons_in_tile(tile, bmin, bmax, filter));
                }
            }
        }
        Ok(polys)
    }

    /// Polygon nearest to `center` within the box `center ± half_extents`
    ///
    /// A point standing over a polygon within climb height counts as being on it. Returns
    /// `None` when no polygon is in range.
    pub fn find_nearest_poly(
        &self,
        center: Vec3,
        half_extents: Vec3,
        filter: &QueryFilter,
    ) -> Result<Option<(PolyRef, Vec3)>> {
        let mut nearest = None;
        let mut nearest_dist = f32::MAX;
        for r in self.query_polygons(center, half_extents, filter)? {
            let (closest, over) = self.nav_mesh.closest_point_on_poly(r, center)?;
            let diff = center - closest;
            let d = if over {
                let (tile, _) = self.nav_mesh.tile_and_poly_by_ref(r)?;
                let dy = diff.y.abs() - tile.header().walkable_climb;
                if dy > 0.0 {
                    dy * dy
                } else {
                    0.0
                }
            } else {
                diff.length_squared()
            };
            if d < nearest_dist {
                nearest_dist = d;
                nearest = Some((r, closest));
            }
        }
        Ok(nearest)
    }

    /// Closest point on a polygon, using the detail surface for the height
    pub fn closest_point_on_poly(&self, r: PolyRef, pos: Vec3) -> Result<(Vec3, bool)> {
        self.nav_mesh.closest_point_on_poly(r, pos)
    }

    /// `pos` if it lies inside the polygon on the xz-plane, otherwise the closest point
    /// on its boundary
    pub fn closest_point_on_poly_boundary(&self, r: PolyRef, pos: Vec3) -> Result<Vec3> {
        let (tile, poly) = self.nav_mesh.tile_and_poly_by_ref(r)?;
        let verts = tile.data().poly_vertices(poly);
        let (inside, edges) = distance_pt_poly_edges_sqr(pos, &verts);
        if inside {
            return Ok(pos);
        }
        let mut imin = 0;
        for (i, e) in edges.iter().enumerate() {
            if e.0 < edges[imin].0 {
                imin = i;
            }
        }
        let va = verts[imin];
        let vb = verts[(imin + 1) % verts.len()];
        Ok(va.lerp(vb, edges[imin].1))
    }

    /// Finds a polygon corridor from `start_ref` to `end_ref` with A*
    ///
    /// When the end cannot be reached the corridor leads to the polygon closest to it
    /// and carries [`Status::PARTIAL_RESULT`]. At most `max_path` polygons are kept,
    /// counted from the start.
    pub fn find_path(
        &mut self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: Vec3,
        end_pos: Vec3,
        filter: &QueryFilter,
        max_path: usize,
    ) -> Result<PathResult> {
        let mesh = self.nav_mesh;
        if !mesh.is_valid_poly_ref(start_ref)
            || !mesh.is_valid_poly_ref(end_ref)
            || !vfinite(start_pos)
            || !vfinite(end_pos)
            || max_path == 0
        {
            return Err(invalid_param("path endpoints"));
        }

        if start_ref == end_ref {
            return Ok(PathResult {
                path: vec![start_ref],
                status: Status::SUCCESS,
            });
        }

        self.node_pool.clear();
        self.open_list.clear();

        let start = self
            .node_pool
            .get_node(start_ref)
            .ok_or_else(|| invalid_param("node pool is empty"))?;
        {
            let node = self.node_pool.node_mut(start);
            node.pos = start_pos;
            node.parent = NULL_IDX;
            node.cost = 0.0;
            node.total = start_pos.distance(end_pos) * H_SCALE;
            node.flags = NodeFlags::OPEN;
        }
        self.open_list.push(&self.node_pool, start);

        let mut last_best = start;
        let mut last_best_cost = self.node_pool.node(start).total;
        let mut out_of_nodes = false;

        while let Some(best) = self.open_list.pop(&self.node_pool) {
            let (best_ref, best_pos, best_cost, best_parent) = {
                let node = self.node_pool.node_mut(best);
                node.flags.remove(NodeFlags::OPEN);
                node.flags.insert(NodeFlags::CLOSED);
                (node.id, node.pos, node.cost, node.parent)
            };
            if best_ref == end_ref {
                last_best = best;
                break;
            }

            let (best_tile, best_poly) = mesh.tile_and_poly_by_ref(best_ref)?;
            let best_index = mesh.encoding().decode_poly(best_ref) as usize;
            let parent_ref = if best_parent != NULL_IDX {
                self.node_pool.node(best_parent).id
            } else {
                PolyRef::NULL
            };

            for link in best_tile.poly_links(best_index) {
                let nei_ref = link.poly_ref;
                if nei_ref.is_null() || nei_ref == parent_ref {
                    continue;
                }
                let Ok((_, nei_poly)) = mesh.tile_and_poly_by_ref(nei_ref) else {
                    continue;
                };
                if !filter.pass_filter(nei_poly) {
                    continue;
                }

                let Some(nei) = self.node_pool.get_node(nei_ref) else {
                    out_of_nodes = true;
                    continue;
                };

                if self.node_pool.node(nei).flags == NodeFlags::default() {
                    let (left, right) = portal_from_link(best_tile, best_poly, link);
                    self.node_pool.node_mut(nei).pos = (left + right) * 0.5;
                }
                let nei_pos = self.node_pool.node(nei).pos;

                let (cost, heuristic) = if nei_ref == end_ref {
                    let cur_cost = filter.cost(best_pos, nei_pos, best_poly);
                    let end_cost = filter.cost(nei_pos, end_pos, nei_poly);
                    (best_cost + cur_cost + end_cost, 0.0)
                } else {
                    let cur_cost = filter.cost(best_pos, nei_pos, best_poly);
                    (best_cost + cur_cost, nei_pos.distance(end_pos) * H_SCALE)
                };
                let total = cost + heuristic;

                let node = self.node_pool.node_mut(nei);
                if node.flags.contains(NodeFlags::OPEN) && total >= node.total {
                    continue;
                }
                if node.flags.contains(NodeFlags::CLOSED) && total >= node.total {
                    continue;
                }

                node.parent = best;
                node.flags.remove(NodeFlags::CLOSED);
                node.cost = cost;
                node.total = total;

                if node.flags.contains(NodeFlags::OPEN) {
                    self.open_list.modify(&self.node_pool, nei);
                } else {
                    node.flags.insert(NodeFlags::OPEN);
                    self.open_list.push(&self.node_pool, nei);
                }

                if heuristic < last_best_cost {
                    last_best_cost = heuristic;
                    last_best = nei;
                }
            }
        }

        let mut status = Status::SUCCESS;
        if self.node_pool.node(last_best).id != end_ref {
            status |= Status::PARTIAL_RESULT;
        }
        if out_of_nodes {
            status |= Status::OUT_OF_NODES;
        }

        let mut path = Vec::new();
        let mut idx = last_best;
        while idx != NULL_IDX {
            let node = self.node_pool.node(idx);
            path.push(node.id);
            idx = node.parent;
        }
        path.reverse();
        if path.len() > max_path {
            path.truncate(max_path);
            status |= Status::BUFFER_TOO_SMALL;
        }

        if status.has_detail(Status::PARTIAL_RESULT) {
            log::debug!(
                "path search from {:#x} stopped at {:#x} short of {:#x}",
                start_ref.id(),
                self.node_pool.node(last_best).id.id(),
                end_ref.id()
            );
        }
        Ok(PathResult { path, status })
    }

    /// Left and right end points of the portal from one polygon into the next
    pub fn get_portal_points(&self, from: PolyRef, to: PolyRef) -> Result<(Vec3, Vec3)> {
        let (tile, poly) = self.nav_mesh.tile_and_poly_by_ref(from)?;
        self.nav_mesh.tile_and_poly_by_ref(to)?;
        let index = self.nav_mesh.encoding().decode_poly(from) as usize;
        tile.poly_links(index)
            .find(|l| l.poly_ref == to)
            .map(|link| portal_from_link(tile, poly, link))
            .ok_or_else(|| invalid_param(format!("{:#x} does not border {:#x}", from.id(), to.id())))
    }

    /// String pulls a corridor into its corner points
    ///
    /// The first point is `start_pos` clamped to the first polygon and the last point is
    /// `end_pos` clamped to the last polygon. At most `max_points` points are returned.
    pub fn find_straight_path(
        &self,
        start_pos: Vec3,
        end_pos: Vec3,
        path: &[PolyRef],
        max_points: usize,
    ) -> Result<StraightPath> {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return Err(invalid_param("empty corridor"));
        };
        if max_points == 0 || !vfinite(start_pos) || !vfinite(end_pos) {
            return Err(invalid_param("straight path request"));
        }

        let mut out = StraightPathBuilder {
            points: Vec::new(),
            max_points,
        };
        let closest_start = self.closest_point_on_poly_boundary(first, start_pos)?;
        let mut closest_end = self.closest_point_on_poly_boundary(last, end_pos)?;

        if let Some(status) = out.append(closest_start, StraightPathFlags::START, first) {
            return Ok(out.finish(status));
        }

        if path.len() > 1 {
            let mut apex = closest_start;
            let mut left = apex;
            let mut right = apex;
            let mut left_index = 0;
            let mut right_index = 0;
            let mut left_ref = first;
            let mut right_ref = first;

            let mut i = 0;
            while i < path.len() {
                let (portal_left, portal_right) = if i + 1 < path.len() {
                    match self.get_portal_points(path[i], path[i + 1]) {
                        Ok(portal) => portal,
                        Err(_) => {
                            // The corridor is broken, stop at the last valid polygon.
                            closest_end = self.closest_point_on_poly_boundary(path[i], end_pos)?;
                            let status = out
                                .append(closest_end, StraightPathFlags::empty(), path[i])
                                .unwrap_or(Status::SUCCESS);
                            return Ok(out.finish(status | Status::PARTIAL_RESULT));
                        }
                    }
                } else {
                    (closest_end, closest_end)
                };

                // Starting right on the first portal.
                if i == 0 {
                    let (d, _) = dist_point_segment_sqr_2d(apex, portal_left, portal_right);
                    if d < sqr(0.001) {
                        i += 1;
                        continue;
                    }
                }

                let next_ref = path.get(i + 1).copied().unwrap_or(PolyRef::NULL);

                if tri_area_2d(apex, right, portal_right) <= 0.0 {
                    if vequal(apex, right) || tri_area_2d(apex, left, portal_right) > 0.0 {
                        right = portal_right;
                        right_ref = next_ref;
                        right_index = i;
                    } else {
                        apex = left;
                        let apex_index = left_index;
                        let flags = if left_ref.is_null() {
                            StraightPathFlags::END
                        } else {
                            StraightPathFlags::empty()
                        };
                        if let Some(status) = out.append(apex, flags, left_ref) {
                            return Ok(out.finish(status));
                        }
                        left = apex;
                        right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                if tri_area_2d(apex, left, portal_left) >= 0.0 {
                    if vequal(apex, left) || tri_area_2d(apex, right, portal_left) < 0.0 {
                        left = portal_left;
                        left_ref = next_ref;
                        left_index = i;
                    } else {
                        apex = right;
                        let apex_index = right_index;
                        let flags = if right_ref.is_null() {
                            StraightPathFlags::END
                        } else {
                            StraightPathFlags::empty()
                        };
                        if let Some(status) = out.append(apex, flags, right_ref) {
                            return Ok(out.finish(status));
                        }
                        left = apex;
                        right = apex;
                        left_index = apex_index;
                        right_index = apex_index;
                        i = apex_index + 1;
                        continue;
                    }
                }

                i += 1;
            }
        }

        let status = out
            .append(closest_end, StraightPathFlags::END, PolyRef::NULL)
            .unwrap_or(Status::SUCCESS);
        Ok(out.finish(status))
    }

    /// Casts a ray from `start_pos` towards `end_pos` along the surface
    ///
    /// The walk follows polygon neighbours and stops at the first edge without a
    /// passable neighbour. At most `max_path` visited polygons are recorded.
    pub fn raycast(
        &self,
        start_ref: PolyRef,
        start_pos: Vec3,
        end_pos: Vec3,
        filter: &QueryFilter,
        max_path: usize,
    ) -> Result<RaycastHit> {
        let mesh = self.nav_mesh;
        if !mesh.is_valid_poly_ref(start_ref) || !vfinite(start_pos) || !vfinite(end_pos) {
            return Err(invalid_param("raycast start"));
        }

        let mut hit = RaycastHit {
            t: 0.0,
            hit_normal: Vec3::ZERO,
            hit_edge_index: None,
            path: Vec::new(),
            status: Status::SUCCESS,
        };

        let mut cur_ref = start_ref;
        while !cur_ref.is_null() {
            let (tile, poly) = mesh.tile_and_poly_by_ref(cur_ref)?;
            let verts = tile.data().poly_vertices(poly);
            let nv = verts.len();

            let Some(seg) = intersect_segment_poly_2d(start_pos, end_pos, &verts) else {
                // The ray no longer touches the polygon it entered.
                return Ok(hit);
            };
            hit.hit_edge_index = seg.seg_max;
            if seg.tmax > hit.t {
                hit.t = seg.tmax;
            }

            if hit.path.len() < max_path {
                hit.path.push(cur_ref);
            } else {
                hit.status |= Status::BUFFER_TOO_SMALL;
            }

            let Some(edge) = seg.seg_max else {
                // The end point lies inside this polygon.
                hit.t = f32::MAX;
                return Ok(hit);
            };

            let index = mesh.encoding().decode_poly(cur_ref) as usize;
            let mut next_ref = PolyRef::NULL;
            for link in tile.poly_links(index) {
                if link.edge as usize != edge {
                    continue;
                }
                let Ok((_, next_poly)) = mesh.tile_and_poly_by_ref(link.poly_ref) else {
                    continue;
                };
                if next_poly.poly_type() == PolyType::OffMeshConnection
                    || !filter.pass_filter(next_poly)
                {
                    continue;
                }
                if link.side == LINK_SIDE_INTERNAL || (link.bmin == 0 && link.bmax == 255) {
                    next_ref = link.poly_ref;
                    break;
                }

                // Only part of the edge leads into the neighbour.
                let v0 = verts[link.edge as usize];
                let v1 = verts[(link.edge as usize + 1) % nv];
                let s = 1.0 / 255.0;
                let (a, b, p) = if link.side == 0 || link.side == 4 {
                    (v0.z, v1.z, start_pos.z + (end_pos.z - start_pos.z) * seg.tmax)
                } else {
                    (v0.x, v1.x, start_pos.x + (end_pos.x - start_pos.x) * seg.tmax)
                };
                let mut lmin = a + (b - a) * (link.bmin as f32 * s);
                let mut lmax = a + (b - a) * (link.bmax as f32 * s);
                if lmin > lmax {
                    std::mem::swap(&mut lmin, &mut lmax);
                }
                if p >= lmin && p <= lmax {
                    next_ref = link.poly_ref;
                    break;
                }
            }

            if next_ref.is_null() {
                let va = verts[edge];
                let vb = verts[(edge + 1) % nv];
                let dx = vb.x - va.x;
                let dz = vb.z - va.z;
                hit.hit_normal = Vec3::new(dz, 0.0, -dx).normalize_or_zero();
                return Ok(hit);
            }
            cur_ref = next_ref;
        }

        Ok(hit)
    }
}

/// Portal end points of a link, narrowed to the shared part of a tile border edge
fn portal_from_link(tile: &MeshTile, poly: &Poly, link: &Link) -> (Vec3, Vec3) {
    let data = tile.data();
    let nv = poly.vert_count as usize;
    let v0 = data.verts[poly.verts[link.edge as usize] as usize];
    let v1 = data.verts[poly.verts[(link.edge as usize + 1) % nv] as usize];
    if link.side != LINK_SIDE_INTERNAL && (link.bmin != 0 || link.bmax != 255) {
        let s = 1.0 / 255.0;
        return (
            v0.lerp(v1, link.bmin as f32 * s),
            v0.lerp(v1, link.bmax as f32 * s),
        );
    }
    (v0, v1)
}

struct StraightPathBuilder {
    points: Vec<StraightPathPoint>,
    max_points: usize,
}

impl StraightPathBuilder {
    /// Adds a corner, merging it into the previous one at the same position
    ///
    /// Returns the final status once the path is complete or full.
    fn append(&mut self, pos: Vec3, flags: StraightPathFlags, poly_ref: PolyRef) -> Option<Status> {
        if let Some(last) = self.points.last_mut() {
            if vequal(last.pos, pos) {
                last.flags = flags;
                last.poly_ref = poly_ref;
                return None;
            }
        }
        self.points.push(StraightPathPoint {
            pos,
            flags,
            poly_ref,
        });
        if self.points.len() >= self.max_points {
            return Some(if flags == StraightPathFlags::END {
                Status::SUCCESS
            } else {
                Status::SUCCESS | Status::BUFFER_TOO_SMALL
            });
        }
        if flags == StraightPathFlags::END {
            return Some(Status::SUCCESS);
        }
        None
    }

    fn finish(self, status: Status) -> StraightPath {
        StraightPath {
            points: self.points,
            status,
        }
    }
}
