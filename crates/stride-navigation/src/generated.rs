//! Output of a tile build

use glam::{IVec2, Vec3};

/// Result of [`NavigationBuilder::build_navmesh`](crate::NavigationBuilder::build_navmesh)
///
/// The value owns the serialized tile, dropping it releases the data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedData {
    pub success: bool,
    /// Triangle list of the detail surface, three vertices per triangle
    pub navmesh_vertices: Vec<Vec3>,
    /// Serialized tile, empty when the build failed or found nothing walkable
    pub navmesh_data: Vec<u8>,
}

impl GeneratedData {
    pub(crate) fn failed() -> Self {
        Self::default()
    }

    /// Byte length of the serialized tile
    pub fn navmesh_data_length(&self) -> usize {
        self.navmesh_data.len()
    }

    /// True for a successful build whose tile holds no polygons
    pub fn is_empty_tile(&self) -> bool {
        self.success && self.navmesh_data.is_empty()
    }
}

/// Sizes of the intermediate products of the last build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub tile_position: IVec2,
    /// Grid width and depth in cells, border included
    pub grid_size: (i32, i32),
    pub border_size: i32,
    pub span_count: usize,
    pub compact_span_count: usize,
    pub region_count: usize,
    pub contour_count: usize,
    pub poly_count: usize,
    pub detail_triangle_count: usize,
    pub data_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tile() {
        let failed = GeneratedData::failed();
        assert!(!failed.success);
        assert!(!failed.is_empty_tile());

        let empty = GeneratedData {
            success: true,
            ..Default::default()
        };
        assert!(empty.is_empty_tile());
        assert_eq!(empty.navmesh_data_length(), 0);
    }
}
