//! Scenarios over meshes made of several tiles
//!
//! Tiles are loaded and removed in different orders and queries are expected to see
//! exactly the tiles that are currently loaded.

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::test_tiles::grid_tile_bytes;
    use crate::{
        NavMesh, NavMeshParams, NavMeshQuery, PolyRef, QueryFilter, Status, LINK_SIDE_INTERNAL,
    };

    const TILE: f32 = 2.0;

    fn empty_mesh() -> NavMesh {
        NavMesh::new(NavMeshParams {
            origin: Vec3::ZERO,
            tile_width: TILE,
            tile_height: TILE,
            max_tiles: 16,
            max_polys: 16,
        })
        .unwrap()
    }

    /// Tiles (0, 0) to (1, 1), each made of 2x2 unit cells
    fn mesh_2x2() -> NavMesh {
        let mut mesh = empty_mesh();
        for ty in 0..2 {
            for tx in 0..2 {
                mesh.add_tile(&grid_tile_bytes(tx, ty, 2, 2, 1.0)).unwrap();
            }
        }
        mesh
    }

    fn nearest(mesh: &NavMesh, pos: Vec3) -> PolyRef {
        NavMeshQuery::new(mesh)
            .find_nearest_poly(pos, Vec3::new(0.5, 1.0, 0.5), &QueryFilter::default())
            .unwrap()
            .unwrap()
            .0
    }

    fn tile_of(mesh: &NavMesh, r: PolyRef) -> (i32, i32) {
        let (tile, _) = mesh.tile_and_poly_by_ref(r).unwrap();
        (tile.header().x, tile.header().y)
    }

    fn path_between(mesh: &NavMesh, start: Vec3, end: Vec3) -> crate::PathResult {
        let (sr, er) = (nearest(mesh, start), nearest(mesh, end));
        NavMeshQuery::new(mesh)
            .find_path(sr, er, start, end, &QueryFilter::default(), 64)
            .unwrap()
    }

    #[test]
    fn test_path_crosses_tiles() {
        let mesh = mesh_2x2();
        assert_eq!(mesh.tile_count(), 4);

        let start = Vec3::new(0.5, 0.0, 0.5);
        let end = Vec3::new(3.5, 0.0, 2.5);
        let result = path_between(&mesh, start, end);
        assert_eq!(result.status, Status::SUCCESS);
        assert_eq!(tile_of(&mesh, result.path[0]), (0, 0));
        assert_eq!(tile_of(&mesh, *result.path.last().unwrap()), (1, 1));

        let straight = NavMeshQuery::new(&mesh)
            .find_straight_path(start, end, &result.path, 16)
            .unwrap();
        let points: Vec<Vec3> = straight.positions().collect();
        assert_eq!(points, vec![start, end]);
    }

    #[test]
    fn test_load_order_does_not_matter() {
        let mut mesh = empty_mesh();
        mesh.add_tile(&grid_tile_bytes(1, 0, 2, 2, 1.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(0, 0, 2, 2, 1.0)).unwrap();

        let result = path_between(&mesh, Vec3::new(0.5, 0.0, 0.5), Vec3::new(3.5, 0.0, 0.5));
        assert_eq!(result.status, Status::SUCCESS);
        assert_eq!(result.path.len(), 4);
    }

    #[test]
    fn test_removed_tile_is_routed_around() {
        let mut mesh = mesh_2x2();
        let start = Vec3::new(0.5, 0.0, 0.5);
        let end = Vec3::new(3.5, 0.0, 0.5);

        let removed = mesh.tile_ref_at(1, 0, 0).unwrap();
        let stale = nearest(&mesh, end);
        mesh.remove_tile(removed).unwrap();
        assert!(!mesh.is_valid_poly_ref(stale));
        assert!(mesh.tile_at(1, 0, 0).is_none());

        // The end is now only reachable through tile (0, 1) and (1, 1).
        let end = Vec3::new(3.5, 0.0, 2.5);
        let result = path_between(&mesh, start, end);
        assert_eq!(result.status, Status::SUCCESS);
        assert!(result.path.iter().any(|&r| tile_of(&mesh, r) == (0, 1)));

        let sr = nearest(&mesh, start);
        let err = NavMeshQuery::new(&mesh).find_path(
            sr,
            stale,
            start,
            end,
            &QueryFilter::default(),
            64,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_isolated_tile_gives_partial_path() {
        let mut mesh = mesh_2x2();
        mesh.remove_tile(mesh.tile_ref_at(1, 0, 0).unwrap()).unwrap();
        mesh.remove_tile(mesh.tile_ref_at(0, 1, 0).unwrap()).unwrap();
        assert_eq!(mesh.tile_count(), 2);

        // Tiles (0, 0) and (1, 1) only touch at a corner.
        let result = path_between(&mesh, Vec3::new(0.5, 0.0, 0.5), Vec3::new(3.5, 0.0, 3.5));
        assert!(result.status.is_success());
        assert!(result.status.has_detail(Status::PARTIAL_RESULT));
        assert!(result.path.iter().all(|&r| tile_of(&mesh, r) == (0, 0)));
    }

    #[test]
    fn test_reloaded_tile_relinks() {
        let mut mesh = mesh_2x2();
        let old = mesh.tile_ref_at(1, 0, 0).unwrap();
        let data = mesh.remove_tile(old).unwrap();
        let new = mesh.add_tile(&data).unwrap();
        assert_ne!(old, new);
        assert_eq!(mesh.tile_ref_at(1, 0, 0), Some(new));

        let result = path_between(&mesh, Vec3::new(0.5, 0.0, 0.5), Vec3::new(3.5, 0.0, 0.5));
        assert_eq!(result.status, Status::SUCCESS);
        assert_eq!(result.path.len(), 4);
    }

    #[test]
    fn test_raycast_stops_at_missing_tile() {
        let mut mesh = mesh_2x2();
        let start = Vec3::new(0.5, 0.0, 0.5);
        let end = Vec3::new(3.5, 0.0, 0.5);

        let sr = nearest(&mesh, start);
        let through = NavMeshQuery::new(&mesh)
            .raycast(sr, start, end, &QueryFilter::default(), 16)
            .unwrap();
        assert!(!through.is_hit());
        assert_eq!(through.path.len(), 4);

        mesh.remove_tile(mesh.tile_ref_at(1, 0, 0).unwrap()).unwrap();
        let sr = nearest(&mesh, start);
        let blocked = NavMeshQuery::new(&mesh)
            .raycast(sr, start, end, &QueryFilter::default(), 16)
            .unwrap();
        assert!(blocked.is_hit());
        assert!((blocked.t - 0.5).abs() < 1e-5);
        assert!((blocked.hit_normal - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_partial_portal_between_different_cell_sizes() {
        let mut mesh = empty_mesh();
        mesh.add_tile(&grid_tile_bytes(0, 0, 2, 2, 1.0)).unwrap();
        mesh.add_tile(&grid_tile_bytes(1, 0, 1, 1, 2.0)).unwrap();

        let big = mesh.tile_at(1, 0, 0).unwrap();
        let mut ranges: Vec<(u8, u8)> = big
            .poly_links(0)
            .filter(|l| l.side != LINK_SIDE_INTERNAL)
            .map(|l| (l.bmin, l.bmax))
            .collect();
        ranges.sort();
        assert_eq!(ranges, vec![(0, 128), (128, 255)]);

        // A ray through the lower half of the big edge enters the lower small cell.
        let start = Vec3::new(3.0, 0.0, 0.5);
        let sr = nearest(&mesh, start);
        let hit = NavMeshQuery::new(&mesh)
            .raycast(sr, start, Vec3::new(0.5, 0.0, 0.5), &QueryFilter::default(), 16)
            .unwrap();
        assert!(!hit.is_hit());
        assert_eq!(hit.path.len(), 3);
        assert!(hit.path[1..].iter().all(|&r| tile_of(&mesh, r) == (0, 0)));

        let result = path_between(&mesh, Vec3::new(3.0, 0.0, 1.5), Vec3::new(0.5, 0.0, 1.5));
        assert_eq!(result.status, Status::SUCCESS);
        assert_eq!(result.path.len(), 3);
    }
}
