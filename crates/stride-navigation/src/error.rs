//! Error types of the tile builder and the runtime navigation mesh
//!
//! Both public entry points report plain booleans. These types carry the reason for a
//! failure to the `try_*` variants and to the log.

use std::fmt;

use glam::{IVec2, Vec3};

/// Step of the tile build pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStage {
    Heightfield,
    Rasterization,
    Filtering,
    CompactHeightfield,
    Erosion,
    DistanceField,
    Regions,
    Contours,
    PolyMesh,
    DetailMesh,
    Serialization,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Heightfield => "heightfield allocation",
            BuildStage::Rasterization => "rasterization",
            BuildStage::Filtering => "span filtering",
            BuildStage::CompactHeightfield => "compact heightfield",
            BuildStage::Erosion => "erosion",
            BuildStage::DistanceField => "distance field",
            BuildStage::Regions => "region partitioning",
            BuildStage::Contours => "contour tracing",
            BuildStage::PolyMesh => "polygon mesh",
            BuildStage::DetailMesh => "detail mesh",
            BuildStage::Serialization => "tile serialization",
        };
        f.write_str(name)
    }
}

/// Why a tile build failed
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("invalid build settings: {0}")]
    InvalidSettings(String),

    #[error("invalid input geometry: {0}")]
    InvalidInput(String),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: BuildStage,
        #[source]
        source: nav_common::Error,
    },
}

impl BuildError {
    /// The pipeline stage that failed, if the build got past validation
    pub fn stage(&self) -> Option<BuildStage> {
        match self {
            BuildError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Tags a pipeline error with the stage it came from
pub(crate) fn at_stage(stage: BuildStage) -> impl FnOnce(nav_common::Error) -> BuildError {
    move |source| BuildError::Stage { stage, source }
}

/// Why a navigation mesh operation failed
#[derive(thiserror::Error, Debug)]
pub enum NavigationError {
    #[error("navigation mesh is not initialized")]
    NotInitialized,

    #[error("navigation mesh is already initialized")]
    AlreadyInitialized,

    #[error("failed to create the tile index: {0}")]
    Init(#[source] nav_common::Error),

    #[error("failed to load tile: {0}")]
    TileLoad(#[source] nav_common::Error),

    #[error("no tile at {0}")]
    TileNotFound(IVec2),

    #[error("no polygon within {extent} of {point}")]
    NoPolygonNearby { point: Vec3, extent: Vec3 },

    #[error("the polygon corridor does not reach the target within {max_polys} polygons")]
    PartialPath { max_polys: usize },

    #[error("navigation query failed: {0}")]
    Query(#[source] nav_common::Error),
}
