//! Tiles built from geometry, loaded into a navigation mesh and queried

mod common;

use std::sync::{Arc, RwLock};

use common::{build, init_logging, merge, mesh_with, quad, tile_settings};
use nav_runtime::TileData;
use stride_navigation::{
    IVec2, NavigationError, NavigationMesh, PathfindQuery, RaycastQuery, Vec3,
};

fn path_query(source: Vec3, target: Vec3, max_path_points: usize) -> PathfindQuery {
    PathfindQuery {
        find_nearest_poly_extent: Vec3::ONE,
        max_path_points,
        ..PathfindQuery::new(source, target)
    }
}

fn near(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < 0.35
}

#[test]
fn test_flat_quad_path() {
    init_logging();
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    assert!(tile.success);
    assert!(tile.navmesh_data_length() > 0);
    assert!(!tile.navmesh_vertices.is_empty());

    let mesh = mesh_with(&[&tile]);
    let source = Vec3::new(1.0, 0.0, 1.0);
    let target = Vec3::new(8.0, 0.0, 8.0);
    let result = mesh.find_path(&path_query(source, target, 64));

    assert!(result.path_found);
    assert!(result.path_point_count() >= 2);
    assert!(result.path_point_count() <= 64);
    assert!(near(result.path_points[0], source));
    assert!(near(*result.path_points.last().unwrap(), target));
}

#[test]
fn test_tile_data_round_trip() {
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let parsed = TileData::from_bytes(&tile.navmesh_data).unwrap();
    assert_eq!(parsed.to_bytes().unwrap(), tile.navmesh_data);

    let mut mesh = mesh_with(&[&tile]);
    assert_eq!(mesh.tile_data(IVec2::ZERO), Some(tile.navmesh_data.as_slice()));
    let removed = mesh.try_remove_tile(IVec2::ZERO).unwrap();
    assert_eq!(removed, tile.navmesh_data);
}

#[test]
fn test_tile_lifecycle() {
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let query = path_query(Vec3::new(1.0, 0.0, 1.0), Vec3::new(8.0, 0.0, 8.0), 64);

    let mut mesh = NavigationMesh::new();
    assert!(mesh.init(9.6));
    let first = mesh.try_load_tile(&tile.navmesh_data).unwrap();
    assert_eq!(mesh.tile_count(), 1);
    assert_eq!(mesh.tile_refs(), vec![first]);
    assert!(mesh.has_tile(IVec2::ZERO));
    assert!(mesh.find_path(&query).path_found);

    // The coordinate is taken.
    assert!(!mesh.load_tile(&tile.navmesh_data));
    assert_eq!(mesh.tile_count(), 1);

    assert!(mesh.remove_tile(IVec2::ZERO));
    assert_eq!(mesh.tile_count(), 0);
    assert!(!mesh.has_tile(IVec2::ZERO));
    assert!(!mesh.find_path(&query).path_found);
    assert!(!mesh.remove_tile(IVec2::ZERO));

    let second = mesh.try_load_tile(&tile.navmesh_data).unwrap();
    assert_ne!(first, second);
    assert_eq!(mesh.tile_refs(), vec![second]);
    assert!(mesh.find_path(&query).path_found);
}

#[test]
fn test_path_across_tiles() {
    let geometry = quad(0.0, 0.0, 19.2, 9.6);
    let left = build(&tile_settings(0, 0), &geometry);
    let right = build(&tile_settings(1, 0), &geometry);
    let mut mesh = mesh_with(&[&left, &right]);
    assert_eq!(mesh.tile_count(), 2);

    let source = Vec3::new(1.0, 0.0, 4.0);
    let target = Vec3::new(18.0, 0.0, 5.0);
    let result = mesh.find_path(&path_query(source, target, 64));
    assert!(result.path_found);
    assert!(near(*result.path_points.last().unwrap(), target));

    // The corridor spans at least one polygon per tile.
    assert!(!mesh.find_path(&path_query(source, target, 1)).path_found);

    assert!(mesh.remove_tile(IVec2::new(1, 0)));
    assert!(!mesh.find_path(&path_query(source, target, 64)).path_found);
    assert!(mesh.load_tile(&right.navmesh_data));
    assert!(mesh.find_path(&path_query(source, target, 64)).path_found);
}

#[test]
fn test_disconnected_target_is_not_a_path() {
    let geometry = merge(&[quad(0.0, 0.0, 4.0, 9.6), quad(6.0, 0.0, 9.6, 9.6)]);
    let tile = build(&tile_settings(0, 0), &geometry);
    let mesh = mesh_with(&[&tile]);

    let source = Vec3::new(2.0, 0.0, 5.0);
    let same_island = mesh.find_path(&path_query(source, Vec3::new(2.0, 0.0, 8.0), 64));
    assert!(same_island.path_found);

    let query = path_query(source, Vec3::new(8.0, 0.0, 5.0), 64);
    let result = mesh.find_path(&query);
    assert!(!result.path_found);
    assert!(result.path_points.is_empty());
    assert!(matches!(
        mesh.try_find_path(&query),
        Err(NavigationError::PartialPath { .. })
    ));
}

#[test]
fn test_no_polygon_nearby() {
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let mesh = mesh_with(&[&tile]);
    let far = Vec3::new(100.0, 0.0, 100.0);

    let path = mesh.find_path(&path_query(far, Vec3::new(5.0, 0.0, 5.0), 64));
    assert!(!path.path_found);
    assert!(matches!(
        mesh.try_find_path(&path_query(far, Vec3::new(5.0, 0.0, 5.0), 64)),
        Err(NavigationError::NoPolygonNearby { .. })
    ));

    let ray = mesh.raycast(&RaycastQuery::new(far, Vec3::new(5.0, 0.0, 5.0)));
    assert!(!ray.hit);

    // Above the surface, out of reach of the search box.
    let high = mesh.find_path(&path_query(
        Vec3::new(5.0, 5.0, 5.0),
        Vec3::new(8.0, 0.0, 8.0),
        64,
    ));
    assert!(!high.path_found);
}

#[test]
fn test_raycast_to_open_end() {
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let mesh = mesh_with(&[&tile]);

    let start = Vec3::new(2.0, 0.0, 2.0);
    let end = Vec3::new(5.0, 0.0, 5.0);
    let result = mesh.raycast(&RaycastQuery::new(start, end));
    assert!(result.hit);
    assert!((result.position - end).length() < 1e-4);
    assert_eq!(result.normal, Vec3::ZERO);
}

#[test]
fn test_raycast_stops_at_tile_edge() {
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let mesh = mesh_with(&[&tile]);

    let start = Vec3::new(2.0, 0.0, 5.0);
    let end = Vec3::new(20.0, 0.0, 5.0);
    let result = mesh.raycast(&RaycastQuery::new(start, end));
    assert!(result.hit);

    // The position lies on the query segment at the tile's far edge.
    assert!((result.position.x - 9.6).abs() < 0.35, "{}", result.position);
    assert!((result.position.z - 5.0).abs() < 1e-4);
    assert!(result.position.y.abs() < 1e-4);
    assert!(result.normal.x.abs() > 0.999);
    assert!(result.normal.z.abs() < 1e-3);
}

#[test]
fn test_raycast_position_is_interpolated_along_query() {
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let mesh = mesh_with(&[&tile]);

    // The open edge of the tile sits at x = 9.3, halfway along each ray.
    let on_mesh = RaycastQuery::new(Vec3::new(2.0, 0.0, 5.0), Vec3::new(16.6, 0.0, 5.0));
    let off_mesh = RaycastQuery::new(Vec3::new(-0.8, 0.0, 5.0), Vec3::new(19.4, 0.0, 5.0));

    let mut walls = Vec::new();
    for query in [on_mesh, off_mesh] {
        let result = mesh.raycast(&query);
        assert!(result.hit);
        let expected = query.start.lerp(query.end, 0.5);
        assert!(
            (result.position - expected).length() < 1e-3,
            "{} != {}",
            result.position,
            expected
        );
        assert!(result.normal.x.abs() > 0.999);
        walls.push(result.position);
    }
    // Both rays report the same wall.
    assert!((walls[0] - walls[1]).length() < 1e-3);
}

#[test]
fn test_raycast_from_off_mesh_start_to_open_end() {
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let mesh = mesh_with(&[&tile]);

    let query = RaycastQuery::new(Vec3::new(-0.8, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0));
    let result = mesh.try_raycast(&query).unwrap();
    assert!(result.hit);
    assert!((result.position - query.end).length() < 1e-4);
    assert_eq!(result.normal, Vec3::ZERO);
}

#[test]
fn test_concurrent_readers() {
    let tile = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let mesh = Arc::new(RwLock::new(mesh_with(&[&tile])));

    let readers: Vec<_> = (0..4)
        .map(|i| {
            let mesh = Arc::clone(&mesh);
            std::thread::spawn(move || {
                let target = Vec3::new(8.0, 0.0, 2.0 + i as f32);
                let guard = mesh.read().unwrap();
                guard
                    .find_path(&path_query(Vec3::new(1.0, 0.0, 1.0), target, 64))
                    .path_found
            })
        })
        .collect();

    {
        let mut writer = mesh.write().unwrap();
        writer.remove_tile(IVec2::ZERO);
        writer.load_tile(&tile.navmesh_data);
    }

    for reader in readers {
        assert!(reader.join().unwrap());
    }
}
