//! Common utilities and data structures shared by navigation mesh generation and queries

mod geometry;
mod math;
mod mesh;

pub use geometry::*;
pub use math::*;
pub use mesh::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Error types for the navigation crates
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("invalid build settings: {0}")]
    InvalidSettings(String),

    #[error("navigation mesh generation failed: {0}")]
    NavMeshGeneration(String),

    #[error("invalid tile data: {0}")]
    TileData(String),

    #[error("navigation query failed: {0}")]
    Query(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for navigation operations
pub type Result<T> = std::result::Result<T, Error>;
