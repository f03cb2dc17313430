//! Runtime navigation mesh assembled from built tiles
//!
//! [`NavigationMesh`] starts uninitialized. [`NavigationMesh::init`] creates the tile
//! index, after which tiles can be loaded and removed and path and raycast queries run
//! over every loaded tile. Queries borrow the mesh immutably and tile changes borrow it
//! mutably, so a `RwLock<NavigationMesh>` gives readers and a single writer.

use std::collections::BTreeSet;

use glam::{IVec2, Vec3};
use nav_runtime::{
    NavMesh, NavMeshParams, NavMeshQuery, PolyRef, QueryFilter, Status, TileRef,
};

use crate::error::NavigationError;
use crate::query::{PathfindQuery, PathfindResult, RaycastQuery, RaycastResult};

/// Size of the tile index
///
/// A polygon reference spends `log2(max_tiles) + log2(max_polys_per_tile)` bits on
/// addressing and keeps the rest of its 32 bits for the salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavMeshCapacity {
    pub max_tiles: u32,
    pub max_polys_per_tile: u32,
}

impl Default for NavMeshCapacity {
    fn default() -> Self {
        Self {
            max_tiles: 1 << 14,
            max_polys_per_tile: 1 << 8,
        }
    }
}

#[derive(Debug)]
struct Ready {
    mesh: NavMesh,
    tile_refs: BTreeSet<TileRef>,
}

type Result<T> = std::result::Result<T, NavigationError>;

/// Tiled navigation mesh answering path and raycast queries
#[derive(Debug, Default)]
pub struct NavigationMesh {
    capacity: NavMeshCapacity,
    state: Option<Ready>,
}

impl NavigationMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: NavMeshCapacity) -> Self {
        Self {
            capacity,
            state: None,
        }
    }

    pub fn capacity(&self) -> NavMeshCapacity {
        self.capacity
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Creates the tile index for tiles `cell_tile_size` world units wide
    pub fn init(&mut self, cell_tile_size: f32) -> bool {
        self.try_init(cell_tile_size)
            .map_err(|err| log::error!("navigation mesh init failed: {err}"))
            .is_ok()
    }

    pub fn try_init(&mut self, cell_tile_size: f32) -> Result<()> {
        if self.state.is_some() {
            return Err(NavigationError::AlreadyInitialized);
        }
        let mesh = NavMesh::new(NavMeshParams {
            origin: Vec3::ZERO,
            tile_width: cell_tile_size,
            tile_height: cell_tile_size,
            max_tiles: self.capacity.max_tiles,
            max_polys: self.capacity.max_polys_per_tile,
        })
        .map_err(NavigationError::Init)?;
        log::debug!(
            "navigation mesh ready: tile size {}, {} tiles",
            cell_tile_size,
            self.capacity.max_tiles
        );
        self.state = Some(Ready {
            mesh,
            tile_refs: BTreeSet::new(),
        });
        Ok(())
    }

    /// Adds a serialized tile, leaving the mesh unchanged when the data is rejected
    pub fn load_tile(&mut self, data: &[u8]) -> bool {
        self.try_load_tile(data)
            .map_err(|err| log::error!("{err}"))
            .is_ok()
    }

    pub fn try_load_tile(&mut self, data: &[u8]) -> Result<TileRef> {
        let ready = self.ready_mut()?;
        if data.is_empty() {
            return Err(NavigationError::TileLoad(nav_common::Error::TileData(
                "tile data is empty".to_string(),
            )));
        }
        let tile_ref = ready.mesh.add_tile(data).map_err(NavigationError::TileLoad)?;
        ready.tile_refs.insert(tile_ref);
        Ok(tile_ref)
    }

    /// Removes the layer 0 tile at `coord`
    pub fn remove_tile(&mut self, coord: IVec2) -> bool {
        self.try_remove_tile(coord)
            .map_err(|err| log::error!("{err}"))
            .is_ok()
    }

    /// Removes the layer 0 tile at `coord`, returning the data it was loaded from
    pub fn try_remove_tile(&mut self, coord: IVec2) -> Result<Vec<u8>> {
        let ready = self.ready_mut()?;
        let tile_ref = ready
            .mesh
            .tile_ref_at(coord.x, coord.y, 0)
            .ok_or(NavigationError::TileNotFound(coord))?;
        let data = ready
            .mesh
            .remove_tile(tile_ref)
            .map_err(NavigationError::Query)?;
        ready.tile_refs.remove(&tile_ref);
        Ok(data)
    }

    pub fn tile_count(&self) -> usize {
        self.state.as_ref().map_or(0, |r| r.tile_refs.len())
    }

    /// References of every loaded tile in ascending order
    pub fn tile_refs(&self) -> Vec<TileRef> {
        self.state
            .as_ref()
            .map(|r| r.tile_refs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_tile(&self, coord: IVec2) -> bool {
        self.state
            .as_ref()
            .is_some_and(|r| r.mesh.tile_at(coord.x, coord.y, 0).is_some())
    }

    /// Data the layer 0 tile at `coord` was loaded from
    pub fn tile_data(&self, coord: IVec2) -> Option<&[u8]> {
        self.state
            .as_ref()?
            .mesh
            .tile_at(coord.x, coord.y, 0)
            .map(|t| t.raw_data())
    }

    /// Underlying runtime mesh, `None` before [`NavigationMesh::init`]
    pub fn nav_mesh(&self) -> Option<&NavMesh> {
        self.state.as_ref().map(|r| &r.mesh)
    }

    /// Finds a walkable path from `query.source` to `query.target`
    ///
    /// Fails when an end point has no polygon within the search extent, or when the
    /// corridor does not reach the target within `max_path_points` polygons.
    pub fn find_path(&self, query: &PathfindQuery) -> PathfindResult {
        match self.try_find_path(query) {
            Ok(path_points) => PathfindResult {
                path_found: true,
                path_points,
            },
            Err(err) => {
                log::debug!("no path from {} to {}: {err}", query.source, query.target);
                PathfindResult::default()
            }
        }
    }

    pub fn try_find_path(&self, query: &PathfindQuery) -> Result<Vec<Vec3>> {
        let mesh = &self.ready()?.mesh;
        let filter = QueryFilter::default();
        let mut nav_query = NavMeshQuery::new(mesh);

        let extent = query.find_nearest_poly_extent;
        let (start_ref, start) = nearest_poly(&nav_query, query.source, extent, &filter)?;
        let (end_ref, end) = nearest_poly(&nav_query, query.target, extent, &filter)?;

        let corridor = nav_query
            .find_path(
                start_ref,
                end_ref,
                start,
                end,
                &filter,
                query.max_path_points,
            )
            .map_err(NavigationError::Query)?;
        if corridor
            .status
            .has_detail(Status::PARTIAL_RESULT | Status::BUFFER_TOO_SMALL)
        {
            return Err(NavigationError::PartialPath {
                max_polys: query.max_path_points,
            });
        }

        let straight = nav_query
            .find_straight_path(start, end, &corridor.path, query.max_path_points)
            .map_err(NavigationError::Query)?;
        Ok(straight.positions().collect())
    }

    /// Casts a ray along the walkable surface from `query.start` towards `query.end`
    ///
    /// `hit` is false only when the ray could not be cast. `position` lies on the
    /// segment from `start` to `end` where the ray stopped.
    pub fn raycast(&self, query: &RaycastQuery) -> RaycastResult {
        self.try_raycast(query).unwrap_or_else(|err| {
            log::debug!("raycast from {} failed: {err}", query.start);
            RaycastResult::default()
        })
    }

    pub fn try_raycast(&self, query: &RaycastQuery) -> Result<RaycastResult> {
        let mesh = &self.ready()?.mesh;
        let filter = QueryFilter::default();
        let nav_query = NavMeshQuery::new(mesh);

        let (start_ref, _) = nearest_poly(
            &nav_query,
            query.start,
            query.find_nearest_poly_extent,
            &filter,
        )?;
        // `t` is measured along the query segment, so the sweep starts at `query.start`
        // even when it lies off the polygon.
        let hit = nav_query
            .raycast(
                start_ref,
                query.start,
                query.end,
                &filter,
                query.max_path_points,
            )
            .map_err(NavigationError::Query)?;

        // The ray reached the end point.
        let t = if hit.is_hit() { hit.t } else { 1.0 };
        Ok(RaycastResult {
            hit: true,
            position: query.start.lerp(query.end, t),
            normal: hit.hit_normal,
        })
    }

    fn ready(&self) -> Result<&Ready> {
        self.state.as_ref().ok_or_else(not_initialized)
    }

    fn ready_mut(&mut self) -> Result<&mut Ready> {
        self.state.as_mut().ok_or_else(not_initialized)
    }
}

fn not_initialized() -> NavigationError {
    log::error!("navigation mesh used before init");
    NavigationError::NotInitialized
}

fn nearest_poly(
    query: &NavMeshQuery<'_>,
    point: Vec3,
    extent: Vec3,
    filter: &QueryFilter,
) -> Result<(PolyRef, Vec3)> {
    query
        .find_nearest_poly(point, extent, filter)
        .map_err(NavigationError::Query)?
        .ok_or(NavigationError::NoPolygonNearby { point, extent })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_send_sync() {
        assert_send_sync::<NavigationMesh>();
    }

    #[test]
    fn test_uninitialized_mesh_rejects_everything() {
        let mut mesh = NavigationMesh::new();
        assert!(!mesh.is_initialized());
        assert!(matches!(
            mesh.try_load_tile(&[1, 2, 3]),
            Err(NavigationError::NotInitialized)
        ));
        assert!(!mesh.remove_tile(IVec2::ZERO));
        assert!(!mesh.find_path(&PathfindQuery::new(Vec3::ZERO, Vec3::ONE)).path_found);
        assert!(!mesh.raycast(&RaycastQuery::new(Vec3::ZERO, Vec3::ONE)).hit);
        assert_eq!(mesh.tile_count(), 0);
        assert!(mesh.tile_refs().is_empty());
        assert!(mesh.nav_mesh().is_none());
    }

    #[test]
    fn test_init() {
        let mut mesh = NavigationMesh::new();
        assert!(!mesh.init(0.0));
        assert!(!mesh.is_initialized());

        assert!(mesh.init(9.6));
        assert!(mesh.is_initialized());
        assert_eq!(mesh.nav_mesh().unwrap().params().tile_width, 9.6);
        assert!(matches!(
            mesh.try_init(9.6),
            Err(NavigationError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_capacity_must_fit_a_reference() {
        let mut mesh = NavigationMesh::with_capacity(NavMeshCapacity {
            max_tiles: 1 << 16,
            max_polys_per_tile: 1 << 16,
        });
        assert!(matches!(mesh.try_init(1.0), Err(NavigationError::Init(_))));
        assert!(!mesh.is_initialized());
    }

    #[test]
    fn test_bad_tile_data_changes_nothing() {
        let mut mesh = NavigationMesh::new();
        assert!(mesh.init(4.0));
        assert!(!mesh.load_tile(&[]));
        assert!(!mesh.load_tile(&[0u8; 64]));
        assert_eq!(mesh.tile_count(), 0);
        assert!(matches!(
            mesh.try_remove_tile(IVec2::new(3, 3)),
            Err(NavigationError::TileNotFound(_))
        ));
    }
}
