//! Layout of the tile grid over the world
//!
//! Tile `(x, y)` covers `[x, x + 1) * tile_size_world` along the world x axis and the
//! same range of `y` along the world z axis. These helpers pick the tiles a piece of
//! geometry touches and the bounds each tile is built with.

use glam::{IVec2, Vec3};

use crate::settings::{BoundingBox, BuildSettings, MIN_CELL_SIZE};

/// World width of one tile, with the cell size clamped as the builder clamps it
pub fn tile_size_world(settings: &BuildSettings) -> f32 {
    settings.tile_size as f32 * settings.cell_size.max(MIN_CELL_SIZE)
}

/// Tile containing `position`
pub fn tile_coordinate_of(settings: &BuildSettings, position: Vec3) -> IVec2 {
    let size = tile_size_world(settings);
    IVec2::new(
        (position.x / size).floor() as i32,
        (position.z / size).floor() as i32,
    )
}

/// Horizontal bounds of tile `coord`, the height range is taken from the settings
pub fn calculate_tile_bounding_box(settings: &BuildSettings, coord: IVec2) -> BoundingBox {
    let size = tile_size_world(settings);
    let bounds = &settings.bounding_box;
    BoundingBox::new(
        Vec3::new(
            coord.x as f32 * size,
            bounds.minimum.y,
            coord.y as f32 * size,
        ),
        Vec3::new(
            (coord.x + 1) as f32 * size,
            bounds.maximum.y,
            (coord.y + 1) as f32 * size,
        ),
    )
}

/// Every tile touched by `bounds`, ordered by row then column
///
/// A box lying exactly on a tile edge still yields at least one tile per axis.
pub fn overlapping_tiles(settings: &BuildSettings, bounds: &BoundingBox) -> Vec<IVec2> {
    let size = tile_size_world(settings);
    let start_x = (bounds.minimum.x / size).floor() as i32;
    let start_z = (bounds.minimum.z / size).floor() as i32;
    let end_x = ((bounds.maximum.x / size).ceil() as i32).max(start_x + 1);
    let end_z = ((bounds.maximum.z / size).ceil() as i32).max(start_z + 1);

    (start_z..end_z)
        .flat_map(|y| (start_x..end_x).map(move |x| IVec2::new(x, y)))
        .collect()
}

/// Rounds the height range of `bounds` outwards to whole cell heights
pub fn snap_bounding_box_to_cell_height(settings: &BuildSettings, bounds: &mut BoundingBox) {
    let ch = settings.cell_height.max(MIN_CELL_SIZE);
    bounds.minimum.y = (bounds.minimum.y / ch).floor() * ch;
    bounds.maximum.y = (bounds.maximum.y / ch).ceil() * ch;
}

/// Grows `bounds` by `amount` on every side
pub fn extend_bounding_box(bounds: &mut BoundingBox, amount: Vec3) {
    bounds.minimum -= amount;
    bounds.maximum += amount;
}

/// Build bounds of tile `coord` for the given geometry bounds
///
/// The height range spans every geometry box that overlaps the tile, snapped to the
/// cell height. Returns `None` when no box touches the tile, so it can be skipped.
pub fn tile_build_bounds(
    settings: &BuildSettings,
    coord: IVec2,
    geometry: &[BoundingBox],
) -> Option<BoundingBox> {
    let mut tile = calculate_tile_bounding_box(settings, coord);
    tile.minimum.y = f32::MIN;
    tile.maximum.y = f32::MAX;

    let (min_y, max_y) = geometry
        .iter()
        .filter(|b| b.intersects(&tile))
        .fold(None, |range: Option<(f32, f32)>, b| {
            Some(match range {
                Some((lo, hi)) => (lo.min(b.minimum.y), hi.max(b.maximum.y)),
                None => (b.minimum.y, b.maximum.y),
            })
        })?;

    tile.minimum.y = min_y;
    tile.maximum.y = max_y;
    snap_bounding_box_to_cell_height(settings, &mut tile);
    // Flat geometry still needs one cell of height.
    if tile.maximum.y <= tile.minimum.y {
        tile.maximum.y = tile.minimum.y + settings.cell_height.max(MIN_CELL_SIZE);
    }
    Some(tile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BuildSettings {
        BuildSettings {
            cell_size: 0.5,
            cell_height: 0.25,
            tile_size: 8,
            bounding_box: BoundingBox::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 2.0, 1.0)),
            ..Default::default()
        }
    }

    #[test]
    fn test_tile_coordinates() {
        let s = settings();
        assert_eq!(tile_size_world(&s), 4.0);
        assert_eq!(tile_coordinate_of(&s, Vec3::new(0.0, 5.0, 0.0)), IVec2::ZERO);
        assert_eq!(tile_coordinate_of(&s, Vec3::new(3.99, 0.0, 4.0)), IVec2::new(0, 1));
        assert_eq!(tile_coordinate_of(&s, Vec3::new(-0.1, 0.0, -4.1)), IVec2::new(-1, -2));
    }

    #[test]
    fn test_layout_uses_clamped_cell_size() {
        let tiny = BuildSettings {
            cell_size: 0.001,
            tile_size: 32,
            ..settings()
        };
        assert!((tile_size_world(&tiny) - 0.32).abs() < 1e-6);
        assert_eq!(tile_size_world(&tiny), tile_size_world(&tiny.clamped()));
        assert_eq!(
            calculate_tile_bounding_box(&tiny, IVec2::new(1, 0)),
            calculate_tile_bounding_box(&tiny.clamped(), IVec2::new(1, 0))
        );
    }

    #[test]
    fn test_tile_bounding_box() {
        let s = settings();
        let b = calculate_tile_bounding_box(&s, IVec2::new(1, -1));
        assert_eq!(b.minimum, Vec3::new(4.0, -1.0, -4.0));
        assert_eq!(b.maximum, Vec3::new(8.0, 2.0, 0.0));
    }

    #[test]
    fn test_overlapping_tiles() {
        let s = settings();
        let bounds = BoundingBox::new(Vec3::new(-1.0, 0.0, 1.0), Vec3::new(5.0, 1.0, 3.0));
        assert_eq!(
            overlapping_tiles(&s, &bounds),
            vec![IVec2::new(-1, 0), IVec2::new(0, 0), IVec2::new(1, 0)]
        );

        let on_edge = BoundingBox::new(Vec3::new(4.0, 0.0, 4.0), Vec3::new(4.0, 0.0, 4.0));
        assert_eq!(overlapping_tiles(&s, &on_edge), vec![IVec2::new(1, 1)]);
    }

    #[test]
    fn test_snap_to_cell_height() {
        let s = settings();
        let mut b = BoundingBox::new(Vec3::new(0.0, -0.1, 0.0), Vec3::new(1.0, 0.3, 1.0));
        snap_bounding_box_to_cell_height(&s, &mut b);
        assert_eq!(b.minimum.y, -0.25);
        assert_eq!(b.maximum.y, 0.5);
    }

    #[test]
    fn test_tile_build_bounds() {
        let s = settings();
        let geometry = [
            BoundingBox::new(Vec3::new(0.0, -0.1, 0.0), Vec3::new(2.0, 0.1, 2.0)),
            BoundingBox::new(Vec3::new(3.0, 0.0, 3.0), Vec3::new(6.0, 1.1, 6.0)),
        ];
        let b = tile_build_bounds(&s, IVec2::ZERO, &geometry).unwrap();
        assert_eq!(b.minimum, Vec3::new(0.0, -0.25, 0.0));
        assert_eq!(b.maximum, Vec3::new(4.0, 1.25, 4.0));

        let b = tile_build_bounds(&s, IVec2::new(1, 1), &geometry).unwrap();
        assert_eq!((b.minimum.y, b.maximum.y), (0.0, 1.25));

        assert!(tile_build_bounds(&s, IVec2::new(5, 5), &geometry).is_none());

        let flat = [BoundingBox::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 2.0))];
        let b = tile_build_bounds(&s, IVec2::ZERO, &flat).unwrap();
        assert_eq!((b.minimum.y, b.maximum.y), (0.0, 0.25));
        assert!(b.is_valid());
    }
}
