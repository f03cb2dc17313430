//! Geometry and settings shared by the integration tests

#![allow(dead_code)]

use stride_navigation::{
    tiles, BoundingBox, BuildSettings, GeneratedData, IVec2, NavigationBuilder, NavigationMesh,
    Vec3,
};

/// Settings of a 32 cell tile with 0.3 cells and a 2 unit high agent
pub fn tile_settings(x: i32, y: i32) -> BuildSettings {
    let base = BuildSettings {
        agent_height: 2.0,
        agent_radius: 0.5,
        agent_max_slope: 45.0,
        cell_size: 0.3,
        cell_height: 0.2,
        tile_size: 32,
        bounding_box: BoundingBox::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        ..Default::default()
    };
    let coord = IVec2::new(x, y);
    BuildSettings {
        bounding_box: tiles::calculate_tile_bounding_box(&base, coord),
        tile_position: coord,
        ..base
    }
}

/// Horizontal quad at height zero spanning `min..max` along x and z
pub fn quad(min_x: f32, min_z: f32, max_x: f32, max_z: f32) -> (Vec<Vec3>, Vec<i32>) {
    let vertices = vec![
        Vec3::new(min_x, 0.0, min_z),
        Vec3::new(min_x, 0.0, max_z),
        Vec3::new(max_x, 0.0, max_z),
        Vec3::new(max_x, 0.0, min_z),
    ];
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

/// Concatenates triangle lists
pub fn merge(parts: &[(Vec<Vec3>, Vec<i32>)]) -> (Vec<Vec3>, Vec<i32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for (verts, idx) in parts {
        let base = vertices.len() as i32;
        vertices.extend_from_slice(verts);
        indices.extend(idx.iter().map(|i| i + base));
    }
    (vertices, indices)
}

pub fn build(settings: &BuildSettings, geometry: &(Vec<Vec3>, Vec<i32>)) -> GeneratedData {
    let mut builder = NavigationBuilder::with_settings(settings.clone());
    builder.build_navmesh(&geometry.0, &geometry.1)
}

/// Initialized mesh with every given tile loaded
pub fn mesh_with(tiles: &[&GeneratedData]) -> NavigationMesh {
    let mut mesh = NavigationMesh::new();
    assert!(mesh.init(tiles::tile_size_world(&tile_settings(0, 0))));
    for tile in tiles {
        assert!(tile.success);
        assert!(mesh.load_tile(&tile.navmesh_data));
    }
    mesh
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
