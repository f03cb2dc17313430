//! Path and raycast requests against a [`NavigationMesh`](crate::NavigationMesh)

use glam::Vec3;

/// Default box half extents used to find the polygons under the query points
pub const DEFAULT_FIND_NEAREST_POLY_EXTENT: Vec3 = Vec3::new(2.0, 4.0, 2.0);

/// Default bound on the corridor length and the number of returned points
pub const DEFAULT_MAX_PATH_POINTS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathfindQuery {
    pub source: Vec3,
    pub target: Vec3,
    /// Half extents of the box searched for the polygons under `source` and `target`
    pub find_nearest_poly_extent: Vec3,
    /// Bounds both the polygon corridor and the returned points
    pub max_path_points: usize,
}

impl PathfindQuery {
    pub fn new(source: Vec3, target: Vec3) -> Self {
        Self {
            source,
            target,
            find_nearest_poly_extent: DEFAULT_FIND_NEAREST_POLY_EXTENT,
            max_path_points: DEFAULT_MAX_PATH_POINTS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathfindResult {
    pub path_found: bool,
    /// Corner points from the snapped source to the snapped target, empty when no path
    /// was found
    pub path_points: Vec<Vec3>,
}

impl PathfindResult {
    pub fn path_point_count(&self) -> usize {
        self.path_points.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastQuery {
    pub start: Vec3,
    pub end: Vec3,
    /// Half extents of the box searched for the polygon under `start`
    pub find_nearest_poly_extent: Vec3,
    /// Bounds the number of polygons the ray may cross
    pub max_path_points: usize,
}

impl RaycastQuery {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self {
            start,
            end,
            find_nearest_poly_extent: DEFAULT_FIND_NEAREST_POLY_EXTENT,
            max_path_points: DEFAULT_MAX_PATH_POINTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RaycastResult {
    /// Whether the ray could be cast at all
    pub hit: bool,
    /// Point where the ray stopped, `end` when nothing blocked it
    pub position: Vec3,
    /// Normal of the wall that stopped the ray, zero when nothing did
    pub normal: Vec3,
}
