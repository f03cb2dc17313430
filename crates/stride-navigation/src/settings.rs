//! Build settings of a navigation mesh tile

use glam::{IVec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Smallest accepted cell size and cell height, smaller values are raised to it
pub const MIN_CELL_SIZE: f32 = 0.01;

/// Axis aligned box in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub minimum: Vec3,
    pub maximum: Vec3,
}

impl BoundingBox {
    pub fn new(minimum: Vec3, maximum: Vec3) -> Self {
        Self { minimum, maximum }
    }

    /// Smallest box containing every point, `None` for an empty slice
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (minimum, maximum) = rest
            .iter()
            .fold((*first, *first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(Self { minimum, maximum })
    }

    /// True when the box has a positive extent along every axis
    pub fn is_valid(&self) -> bool {
        self.minimum.cmplt(self.maximum).all()
            && self.minimum.is_finite()
            && self.maximum.is_finite()
    }

    pub fn size(&self) -> Vec3 {
        self.maximum - self.minimum
    }

    pub fn center(&self) -> Vec3 {
        (self.minimum + self.maximum) * 0.5
    }

    /// Touching boxes count as intersecting
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.minimum.cmple(other.maximum).all() && other.minimum.cmple(self.maximum).all()
    }

    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            minimum: self.minimum.min(other.minimum),
            maximum: self.maximum.max(other.maximum),
        }
    }
}

/// Parameters of one tile build
///
/// Distances are in world units, `agent_max_slope` in degrees. Missing fields take
/// their default when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Region of the input geometry covered by the tile
    pub bounding_box: BoundingBox,
    /// Vertical voxel size
    pub cell_height: f32,
    /// Horizontal voxel size
    pub cell_size: f32,
    /// Tile width and depth in cells
    pub tile_size: i32,
    /// Tile coordinate written into the tile header
    pub tile_position: IVec2,
    /// Regions with fewer spans are removed
    pub region_min_area: i32,
    /// Regions with fewer spans are merged into a neighbour
    pub region_merge_area: i32,
    /// Longest contour edge along a wall, 0 leaves edges unsplit
    pub edge_max_len: f32,
    /// Largest distance a simplified contour may stray from the raw outline, in cells
    pub edge_max_error: f32,
    /// Spacing of the height samples of the detail mesh, in cells
    pub detail_sample_distance: f32,
    /// Largest height error of the detail mesh, in cell heights
    pub detail_sample_max_error: f32,
    pub agent_height: f32,
    pub agent_radius: f32,
    pub agent_max_climb: f32,
    pub agent_max_slope: f32,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            bounding_box: BoundingBox::default(),
            cell_height: 0.2,
            cell_size: 0.3,
            tile_size: 32,
            tile_position: IVec2::ZERO,
            region_min_area: 2,
            region_merge_area: 20,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            detail_sample_distance: 6.0,
            detail_sample_max_error: 1.0,
            agent_height: 1.0,
            agent_radius: 0.5,
            agent_max_climb: 0.25,
            agent_max_slope: 45.0,
        }
    }
}

impl BuildSettings {
    /// Copy with the cell size and cell height raised to [`MIN_CELL_SIZE`]
    pub fn clamped(&self) -> BuildSettings {
        BuildSettings {
            cell_size: self.cell_size.max(MIN_CELL_SIZE),
            cell_height: self.cell_height.max(MIN_CELL_SIZE),
            ..self.clone()
        }
    }

    /// Checks every value a build depends on
    ///
    /// Cell sizes are checked as given, call [`BuildSettings::clamped`] first to apply
    /// the lower bound.
    pub fn validate(&self) -> Result<(), BuildError> {
        let scalars = [
            ("cell_height", self.cell_height),
            ("cell_size", self.cell_size),
            ("edge_max_len", self.edge_max_len),
            ("edge_max_error", self.edge_max_error),
            ("detail_sample_distance", self.detail_sample_distance),
            ("detail_sample_max_error", self.detail_sample_max_error),
            ("agent_height", self.agent_height),
            ("agent_radius", self.agent_radius),
            ("agent_max_climb", self.agent_max_climb),
            ("agent_max_slope", self.agent_max_slope),
        ];
        if let Some((name, value)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(invalid(format!("{name} is not finite ({value})")));
        }

        if self.cell_size < MIN_CELL_SIZE || self.cell_height < MIN_CELL_SIZE {
            return Err(invalid(format!(
                "cell size {} and cell height {} must be at least {MIN_CELL_SIZE}",
                self.cell_size, self.cell_height
            )));
        }
        if self.tile_size <= 0 {
            return Err(invalid(format!("tile size {} must be positive", self.tile_size)));
        }
        if self.detail_sample_distance < 1.0 {
            return Err(invalid(format!(
                "detail sample distance {} is below 1",
                self.detail_sample_distance
            )));
        }
        if self.detail_sample_max_error <= 0.0 {
            return Err(invalid(format!(
                "detail sample max error {} must be positive",
                self.detail_sample_max_error
            )));
        }
        if self.edge_max_error < 0.1 {
            return Err(invalid(format!(
                "edge max error {} is below 0.1",
                self.edge_max_error
            )));
        }
        if self.edge_max_len < 0.0 || self.region_min_area < 0 || self.region_merge_area < 0 {
            return Err(invalid(
                "edge max length and region areas must not be negative".to_string(),
            ));
        }
        if self.agent_height <= 0.0 {
            return Err(invalid(format!(
                "agent height {} must be positive",
                self.agent_height
            )));
        }
        if self.agent_radius < 0.0 {
            return Err(invalid(format!(
                "agent radius {} is negative",
                self.agent_radius
            )));
        }
        if !(0.0..=90.0).contains(&self.agent_max_slope) {
            return Err(invalid(format!(
                "agent max slope {} outside 0..=90 degrees",
                self.agent_max_slope
            )));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn invalid(message: String) -> BuildError {
    BuildError::InvalidSettings(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = BuildSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tile_size, 32);
        assert_eq!(settings.cell_size, 0.3);
    }

    #[test]
    fn test_clamping() {
        let settings = BuildSettings {
            cell_size: 0.001,
            cell_height: -1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let clamped = settings.clamped();
        assert_eq!(clamped.cell_size, MIN_CELL_SIZE);
        assert_eq!(clamped.cell_height, MIN_CELL_SIZE);
        assert!(clamped.validate().is_ok());
    }

    #[test]
    fn test_rejected_values() {
        let cases: Vec<fn(&mut BuildSettings)> = vec![
            |s| s.detail_sample_distance = 0.5,
            |s| s.detail_sample_max_error = 0.0,
            |s| s.edge_max_error = 0.05,
            |s| s.edge_max_len = -1.0,
            |s| s.region_min_area = -1,
            |s| s.region_merge_area = -3,
            |s| s.tile_size = 0,
            |s| s.agent_height = 0.0,
            |s| s.agent_radius = -0.1,
            |s| s.agent_max_slope = 91.0,
            |s| s.agent_max_climb = f32::NAN,
        ];
        for (i, apply) in cases.into_iter().enumerate() {
            let mut settings = BuildSettings::default();
            apply(&mut settings);
            let err = settings.validate().unwrap_err();
            assert!(
                matches!(err, BuildError::InvalidSettings(_)),
                "case {i}: {err}"
            );
        }
    }

    #[test]
    fn test_bounding_box() {
        let a = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let b = BoundingBox::new(Vec3::splat(1.0), Vec3::splat(2.0));
        let c = BoundingBox::new(Vec3::splat(3.0), Vec3::splat(4.0));
        assert!(a.is_valid());
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.merge(&c), BoundingBox::new(Vec3::ZERO, Vec3::splat(4.0)));

        let flat = BoundingBox::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0));
        assert!(!flat.is_valid());
        assert!(!BoundingBox::new(Vec3::ONE, Vec3::ZERO).is_valid());

        let points = [Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 2.0, 0.0)];
        let bounds = BoundingBox::from_points(&points).unwrap();
        assert_eq!(bounds.minimum, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.maximum, Vec3::new(1.0, 2.0, 3.0));
        assert!(BoundingBox::from_points(&[]).is_none());
    }

    #[test]
    fn test_json_fills_missing_fields() {
        let settings =
            BuildSettings::from_json_str(r#"{ "cell_size": 0.5, "tile_position": [2, -1] }"#)
                .unwrap();
        assert_eq!(settings.cell_size, 0.5);
        assert_eq!(settings.tile_position, IVec2::new(2, -1));
        assert_eq!(settings.agent_radius, 0.5);

        let json = settings.to_json_string().unwrap();
        assert_eq!(BuildSettings::from_json_str(&json).unwrap(), settings);
    }
}
