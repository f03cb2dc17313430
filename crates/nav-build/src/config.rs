//! Voxel space parameters for one generation run

use glam::Vec3;
use nav_common::{Error, Result};

/// Parameters of a single navigation mesh generation run, expressed in voxel units
/// where the generator works in voxels
#[derive(Debug, Clone, PartialEq)]
pub struct NavBuildConfig {
    /// Grid width along the x-axis, border included
    pub width: i32,
    /// Grid depth along the z-axis, border included
    pub height: i32,
    /// Horizontal cell size
    pub cs: f32,
    /// Vertical cell size
    pub ch: f32,
    /// Minimum corner of the field, border included
    pub bmin: Vec3,
    /// Maximum corner of the field, border included
    pub bmax: Vec3,

    /// Maximum walkable slope in degrees
    pub walkable_slope_angle: f32,
    /// Minimum clearance above a walkable span, in cells
    pub walkable_height: i32,
    /// Maximum step height, in cells
    pub walkable_climb: i32,
    /// Agent radius used for erosion, in cells
    pub walkable_radius: i32,

    /// Maximum contour edge length, in cells (0 disables splitting)
    pub max_edge_len: i32,
    /// Maximum deviation of a simplified contour from the raw outline, in cells
    pub max_simplification_error: f32,
    /// Minimum span count of an isolated region
    pub min_region_area: i32,
    /// Regions smaller than this are merged into neighbours when possible
    pub merge_region_area: i32,
    /// Maximum vertices per polygon
    pub max_verts_per_poly: usize,

    /// Detail sampling distance in world units (0 disables interior sampling)
    pub detail_sample_dist: f32,
    /// Maximum detail surface deviation in world units
    pub detail_sample_max_error: f32,

    /// Non-navigable border around the tile, in cells
    pub border_size: i32,
}

impl Default for NavBuildConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            cs: 0.3,
            ch: 0.2,
            bmin: Vec3::ZERO,
            bmax: Vec3::ZERO,
            walkable_slope_angle: 45.0,
            walkable_height: 10,
            walkable_climb: 1,
            walkable_radius: 2,
            max_edge_len: 40,
            max_simplification_error: 1.3,
            min_region_area: 2,
            merge_region_area: 20,
            max_verts_per_poly: 6,
            detail_sample_dist: 1.8,
            detail_sample_max_error: 0.2,
            border_size: 0,
        }
    }
}

impl NavBuildConfig {
    /// Computes the grid size covering `bmin..bmax` and stores the bounds
    pub fn calculate_grid_size(&mut self, bmin: Vec3, bmax: Vec3) {
        self.bmin = bmin;
        self.bmax = bmax;
        self.width = ((bmax.x - bmin.x) / self.cs + 0.5) as i32;
        self.height = ((bmax.z - bmin.z) / self.cs + 0.5) as i32;
    }

    /// Checks that the configuration can drive a generation run
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::InvalidSettings(format!(
                "grid size {}x{} is empty",
                self.width, self.height
            )));
        }
        if !(self.cs > 0.0 && self.ch > 0.0) {
            return Err(Error::InvalidSettings(
                "cell size and cell height must be positive".to_string(),
            ));
        }
        if self.bmin.x >= self.bmax.x || self.bmin.y > self.bmax.y || self.bmin.z >= self.bmax.z {
            return Err(Error::InvalidSettings(
                "bounding box minimum must be below its maximum".to_string(),
            ));
        }
        if self.walkable_height < 1 {
            return Err(Error::InvalidSettings(
                "walkable height must be at least one cell".to_string(),
            ));
        }
        if self.walkable_climb < 0 {
            return Err(Error::InvalidSettings(format!(
                "walkable climb {} is negative",
                self.walkable_climb
            )));
        }
        if self.walkable_radius < 0 || self.border_size < 0 {
            return Err(Error::InvalidSettings(
                "walkable radius and border size must not be negative".to_string(),
            ));
        }
        if !(3..=nav_common::MAX_VERTS_PER_POLY).contains(&self.max_verts_per_poly) {
            return Err(Error::InvalidSettings(format!(
                "vertices per polygon {} outside 3..={}",
                self.max_verts_per_poly,
                nav_common::MAX_VERTS_PER_POLY
            )));
        }
        Ok(())
    }
}
