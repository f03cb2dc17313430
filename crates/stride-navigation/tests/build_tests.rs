//! Tile builds from raw geometry

mod common;

use common::{build, init_logging, quad, tile_settings};
use nav_build::TimerCategory;
use nav_runtime::{PolyFlags, TileData};
use stride_navigation::{
    BoundingBox, BuildError, BuildSettings, BuildStage, NavigationBuilder, Vec3, GROUND_AREA,
};

#[test]
fn test_build_is_deterministic() {
    init_logging();
    let settings = tile_settings(0, 0);
    let geometry = quad(0.0, 0.0, 10.0, 10.0);

    let first = build(&settings, &geometry);
    let second = build(&settings, &geometry);
    assert!(first.success);
    assert_eq!(first.navmesh_data, second.navmesh_data);
    assert_eq!(first.navmesh_vertices, second.navmesh_vertices);

    // A builder reused after a different build gives the same result.
    let mut builder = NavigationBuilder::with_settings(tile_settings(1, 0));
    builder.build_navmesh(&geometry.0, &geometry.1);
    builder.set_settings(settings);
    let third = builder.build_navmesh(&geometry.0, &geometry.1);
    assert_eq!(first, third);
}

#[test]
fn test_header_describes_the_tile() {
    let data = build(&tile_settings(0, 0), &quad(0.0, 0.0, 10.0, 10.0));
    let tile = TileData::from_bytes(&data.navmesh_data).unwrap();
    let header = &tile.header;

    assert_eq!((header.x, header.y, header.layer), (0, 0, 0));
    assert_eq!(header.walkable_height, 2.0);
    assert_eq!(header.walkable_radius, 0.5);
    assert_eq!(header.walkable_climb, 0.25);
    assert!(header.poly_count > 0);
    assert_eq!(header.off_mesh_con_count, 0);
    assert!(!tile.bv_tree.is_empty());
    assert!((header.bmin.x - 0.0).abs() < 1e-4);
    assert!((header.bmax.x - 9.6).abs() < 1e-4);
    assert!(tile
        .polys
        .iter()
        .all(|p| p.flags == PolyFlags::WALK && p.area() == GROUND_AREA));
}

#[test]
fn test_invalid_settings_are_rejected() {
    let geometry = quad(0.0, 0.0, 10.0, 10.0);
    let cases = [
        BuildSettings {
            detail_sample_distance: 0.5,
            ..tile_settings(0, 0)
        },
        BuildSettings {
            detail_sample_max_error: 0.0,
            ..tile_settings(0, 0)
        },
        BuildSettings {
            edge_max_error: 0.01,
            ..tile_settings(0, 0)
        },
        BuildSettings {
            region_min_area: -1,
            ..tile_settings(0, 0)
        },
        BuildSettings {
            tile_size: 0,
            ..tile_settings(0, 0)
        },
    ];
    for settings in cases {
        let mut builder = NavigationBuilder::with_settings(settings);
        let data = builder.build_navmesh(&geometry.0, &geometry.1);
        assert!(!data.success);
        assert!(data.navmesh_data.is_empty());
        assert!(matches!(
            builder.try_build_navmesh(&geometry.0, &geometry.1),
            Err(BuildError::InvalidSettings(_))
        ));
    }
}

#[test]
fn test_empty_input_is_rejected() {
    let mut builder = NavigationBuilder::with_settings(tile_settings(0, 0));
    assert!(!builder.build_navmesh(&[], &[]).success);
    assert!(!builder.build_navmesh(&[Vec3::ZERO, Vec3::X, Vec3::Z], &[]).success);
    assert!(matches!(
        builder.try_build_navmesh(&[Vec3::ZERO, Vec3::X, Vec3::Z], &[0, 1, 5]),
        Err(BuildError::InvalidInput(_))
    ));
}

#[test]
fn test_degenerate_bounding_box_is_rejected() {
    let geometry = quad(0.0, 0.0, 10.0, 10.0);
    let flat = BoundingBox::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(9.6, 0.0, 9.6));
    let inverted = BoundingBox::new(Vec3::new(9.6, -1.0, 9.6), Vec3::new(0.0, 1.0, 0.0));
    for bounding_box in [flat, inverted, BoundingBox::default()] {
        let data = build(
            &BuildSettings {
                bounding_box,
                ..tile_settings(0, 0)
            },
            &geometry,
        );
        assert!(!data.success);
    }
}

#[test]
fn test_cell_size_is_clamped() {
    // Without erosion the tile stays walkable at this resolution.
    let base = BuildSettings {
        agent_radius: 0.0,
        ..tile_settings(0, 0)
    };
    let settings = |cell_size: f32| BuildSettings {
        cell_size,
        bounding_box: BoundingBox::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.32, 1.0, 0.32)),
        ..base.clone()
    };
    let geometry = quad(0.0, 0.0, 1.0, 1.0);

    let tiny = build(&settings(0.001), &geometry);
    let clamped = build(&settings(0.01), &geometry);
    assert!(tiny.success);
    assert_eq!(tiny.navmesh_data, clamped.navmesh_data);

    let header = TileData::from_bytes(&tiny.navmesh_data).unwrap().header;
    assert!((header.bv_quant_factor - 100.0).abs() < 1e-3);
}

#[test]
fn test_unwalkable_geometry_gives_empty_tile() {
    // Slope of 60 degrees, above the 45 degree limit.
    let rise = 9.0 * 60f32.to_radians().tan();
    let vertices = vec![
        Vec3::new(0.0, -1.0, 0.0),
        Vec3::new(0.0, -1.0, 9.0),
        Vec3::new(9.0, -1.0 + rise, 9.0),
        Vec3::new(9.0, -1.0 + rise, 0.0),
    ];
    let settings = BuildSettings {
        bounding_box: BoundingBox::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(9.6, rise, 9.6)),
        ..tile_settings(0, 0)
    };
    let mut builder = NavigationBuilder::with_settings(settings);
    let data = builder.build_navmesh(&vertices, &[0, 1, 2, 0, 2, 3]);
    assert!(data.success);
    assert!(data.is_empty_tile());
    assert!(data.navmesh_vertices.is_empty());
}

#[test]
fn test_context_records_stage_timers() {
    let geometry = quad(0.0, 0.0, 10.0, 10.0);
    let mut builder = NavigationBuilder::with_settings(tile_settings(0, 0));
    assert!(builder.build_navmesh(&geometry.0, &geometry.1).success);

    for category in [
        TimerCategory::Rasterization,
        TimerCategory::Regions,
        TimerCategory::Contours,
        TimerCategory::PolyMesh,
        TimerCategory::DetailMesh,
        TimerCategory::Serialization,
    ] {
        assert_eq!(builder.context().timer_count(category), 1, "{category:?}");
    }
}

#[test]
fn test_stage_of_build_error() {
    let err = BuildError::Stage {
        stage: BuildStage::Regions,
        source: nav_common::Error::NavMeshGeneration("too many regions".into()),
    };
    assert_eq!(err.stage(), Some(BuildStage::Regions));
    assert!(err.to_string().starts_with("region partitioning failed"));
}

#[test]
fn test_parallel_builders() {
    let geometry = quad(0.0, 0.0, 10.0, 10.0);
    let expected = build(&tile_settings(0, 0), &geometry);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| build(&tile_settings(0, 0), &geometry)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for result in results {
        assert_eq!(result, expected);
    }
}

#[test]
fn test_settings_profile_file() {
    use std::io::Write;

    let settings = tile_settings(2, 1);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(settings.to_json_string().unwrap().as_bytes())
        .unwrap();

    let text = std::fs::read_to_string(file.path()).unwrap();
    assert_eq!(BuildSettings::from_json_str(&text).unwrap(), settings);
}
