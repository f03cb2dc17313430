//! Navigation meshes for the Stride engine
//!
//! A [`NavigationBuilder`] turns the level geometry overlapping one tile into serialized
//! tile data. The tiles are loaded into a [`NavigationMesh`], which links them together
//! and answers path and raycast queries over all loaded tiles.
//!
//! ```no_run
//! use stride_navigation::{
//!     tiles, BoundingBox, BuildSettings, NavigationBuilder, NavigationMesh, PathfindQuery,
//!     Vec3,
//! };
//!
//! # let (vertices, indices): (Vec<Vec3>, Vec<i32>) = (Vec::new(), Vec::new());
//! let settings = BuildSettings {
//!     bounding_box: BoundingBox::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(9.6, 1.0, 9.6)),
//!     ..Default::default()
//! };
//! let mut builder = NavigationBuilder::with_settings(settings.clone());
//! let tile = builder.build_navmesh(&vertices, &indices);
//!
//! let mut mesh = NavigationMesh::new();
//! mesh.init(tiles::tile_size_world(&settings));
//! if tile.success && !tile.is_empty_tile() {
//!     mesh.load_tile(&tile.navmesh_data);
//! }
//! let path = mesh.find_path(&PathfindQuery::new(Vec3::new(1.0, 0.0, 1.0), Vec3::new(8.0, 0.0, 8.0)));
//! ```

mod builder;
mod error;
mod generated;
mod navigation_mesh;
mod query;
mod settings;
pub mod tiles;

pub use builder::{NavigationBuilder, GROUND_AREA};
pub use error::{BuildError, BuildStage, NavigationError};
pub use generated::{BuildStats, GeneratedData};
pub use navigation_mesh::{NavMeshCapacity, NavigationMesh};
pub use query::{
    PathfindQuery, PathfindResult, RaycastQuery, RaycastResult, DEFAULT_FIND_NEAREST_POLY_EXTENT,
    DEFAULT_MAX_PATH_POINTS,
};
pub use settings::{BoundingBox, BuildSettings, MIN_CELL_SIZE};

pub use glam::{IVec2, Vec3};
pub use nav_runtime::TileRef;
