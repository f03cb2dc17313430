//! Tile builder driving the generation pipeline
//!
//! One [`NavigationBuilder`] turns the geometry overlapping one tile into serialized tile
//! data. The pipeline is fixed: rasterize, filter, compact, erode, partition, trace
//! contours, polygonize, sample detail and serialize. Every step aborts the build on
//! failure and the working buffers are released after every build, successful or not.

use glam::Vec3;
use nav_build::{
    mark_walkable_triangles, rasterize_triangles, BuildContext, CompactHeightfield, ContourSet,
    Heightfield, NavBuildConfig, PolyMesh, PolyMeshDetail, TimerCategory, WALKABLE_AREA,
};
use nav_common::MAX_VERTS_PER_POLY;
use nav_runtime::{create_tile_data, PolyFlags, TileCreateParams};

use crate::error::{at_stage, BuildError, BuildStage};
use crate::generated::{BuildStats, GeneratedData};
use crate::settings::BuildSettings;

/// Area id written for walkable ground polygons
pub const GROUND_AREA: u8 = 0;

/// Cells added around the erosion radius so that border polygons match their neighbours
const BORDER_PADDING: i32 = 3;

/// Intermediate products of the build in progress
#[derive(Debug, Default)]
struct BuildBuffers {
    triangle_areas: Vec<u8>,
    heightfield: Option<Heightfield>,
    compact: Option<CompactHeightfield>,
    contours: Option<ContourSet>,
    poly_mesh: Option<PolyMesh>,
    detail_mesh: Option<PolyMeshDetail>,
}

/// Builds navigation mesh tiles from triangle geometry
#[derive(Debug, Default)]
pub struct NavigationBuilder {
    settings: BuildSettings,
    context: BuildContext,
    buffers: BuildBuffers,
    last_stats: Option<BuildStats>,
}

impl NavigationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: BuildSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Stores the settings for the following builds
    ///
    /// Nothing is checked here, invalid settings make the next build fail.
    pub fn set_settings(&mut self, settings: BuildSettings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Log and stage timers of the last build
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Sizes of the intermediate products of the last successful build
    pub fn last_build_stats(&self) -> Option<&BuildStats> {
        self.last_stats.as_ref()
    }

    /// Builds one tile from an indexed triangle list
    ///
    /// Failures are logged and reported through `success`. A build that finds no
    /// walkable surface succeeds with empty tile data.
    pub fn build_navmesh(&mut self, vertices: &[Vec3], indices: &[i32]) -> GeneratedData {
        match self.try_build_navmesh(vertices, indices) {
            Ok(data) => data,
            Err(err) => {
                self.context
                    .log_error(format!("navigation mesh build failed: {err}"));
                GeneratedData::failed()
            }
        }
    }

    /// Same as [`NavigationBuilder::build_navmesh`] but reports why a build failed
    pub fn try_build_navmesh(
        &mut self,
        vertices: &[Vec3],
        indices: &[i32],
    ) -> Result<GeneratedData, BuildError> {
        self.context.reset();
        self.last_stats = None;

        self.context.start_timer(TimerCategory::Total);
        let result = self.run_pipeline(vertices, indices);
        self.context.stop_timer(TimerCategory::Total);
        self.cleanup();

        if result.is_ok() {
            self.context.log_timer_summary();
        }
        result
    }

    /// Releases the working buffers, calling it again has no effect
    pub fn cleanup(&mut self) {
        self.buffers = BuildBuffers::default();
    }

    fn run_pipeline(
        &mut self,
        vertices: &[Vec3],
        indices: &[i32],
    ) -> Result<GeneratedData, BuildError> {
        let settings = self.settings.clamped();
        settings.validate()?;
        if !settings.bounding_box.is_valid() {
            return Err(BuildError::InvalidSettings(format!(
                "bounding box {} .. {} is empty",
                settings.bounding_box.minimum, settings.bounding_box.maximum
            )));
        }
        validate_geometry(vertices, indices)?;

        let config = voxel_config(&settings)?;
        config
            .validate()
            .map_err(|e| BuildError::InvalidSettings(e.to_string()))?;

        let mut stats = BuildStats {
            tile_position: settings.tile_position,
            grid_size: (config.width, config.height),
            border_size: config.border_size,
            ..Default::default()
        };
        self.context.log_info(format!(
            "building tile ({}, {}): {} vertices, {} triangles, {}x{} cells",
            settings.tile_position.x,
            settings.tile_position.y,
            vertices.len(),
            indices.len() / 3,
            config.width,
            config.height
        ));

        let ctx = &mut self.context;
        let buffers = &mut self.buffers;

        ctx.start_timer(TimerCategory::Rasterization);
        buffers.triangle_areas =
            mark_walkable_triangles(config.walkable_slope_angle, vertices, indices);
        let hf = buffers.heightfield.insert(
            Heightfield::new(
                config.width,
                config.height,
                config.bmin,
                config.bmax,
                config.cs,
                config.ch,
            )
            .map_err(at_stage(BuildStage::Heightfield))?,
        );
        let rasterized = rasterize_triangles(
            hf,
            vertices,
            indices,
            &buffers.triangle_areas,
            config.walkable_climb,
        );
        ctx.stop_timer(TimerCategory::Rasterization);
        rasterized.map_err(at_stage(BuildStage::Rasterization))?;

        ctx.start_timer(TimerCategory::Filtering);
        hf.filter_low_hanging_walkable_obstacles(config.walkable_climb);
        hf.filter_ledge_spans(config.walkable_height, config.walkable_climb);
        hf.filter_walkable_low_height_spans(config.walkable_height);
        ctx.stop_timer(TimerCategory::Filtering);
        stats.span_count = hf.span_count();

        ctx.start_timer(TimerCategory::CompactHeightfield);
        let compacted = CompactHeightfield::build(hf, config.walkable_height, config.walkable_climb);
        ctx.stop_timer(TimerCategory::CompactHeightfield);
        let compact = compacted.map_err(at_stage(BuildStage::CompactHeightfield))?;
        buffers.heightfield = None;
        let chf = buffers.compact.insert(compact);
        stats.compact_span_count = chf.span_count;

        ctx.start_timer(TimerCategory::Erosion);
        chf.erode_walkable_area(config.walkable_radius);
        ctx.stop_timer(TimerCategory::Erosion);

        ctx.start_timer(TimerCategory::DistanceField);
        chf.build_distance_field();
        ctx.stop_timer(TimerCategory::DistanceField);

        ctx.start_timer(TimerCategory::Regions);
        let regions = chf.build_regions(
            config.border_size,
            config.min_region_area,
            config.merge_region_area,
        );
        ctx.stop_timer(TimerCategory::Regions);
        regions.map_err(at_stage(BuildStage::Regions))?;
        stats.region_count = chf.max_regions as usize;

        ctx.start_timer(TimerCategory::Contours);
        let traced = ContourSet::build(chf, config.max_simplification_error, config.max_edge_len);
        ctx.stop_timer(TimerCategory::Contours);
        let cset = buffers
            .contours
            .insert(traced.map_err(at_stage(BuildStage::Contours))?);
        stats.contour_count = cset.contours.len();
        if cset.contours.is_empty() {
            ctx.log_info("no walkable surface in tile, produced an empty tile");
            self.last_stats = Some(stats);
            return Ok(empty_tile());
        }

        ctx.start_timer(TimerCategory::PolyMesh);
        let polygonized = PolyMesh::build(cset, config.max_verts_per_poly);
        ctx.stop_timer(TimerCategory::PolyMesh);
        let pmesh = buffers
            .poly_mesh
            .insert(polygonized.map_err(at_stage(BuildStage::PolyMesh))?);
        stats.poly_count = pmesh.npolys;
        if pmesh.npolys == 0 {
            ctx.log_info("contours produced no polygons, produced an empty tile");
            self.last_stats = Some(stats);
            return Ok(empty_tile());
        }

        ctx.start_timer(TimerCategory::DetailMesh);
        let sampled = PolyMeshDetail::build(
            pmesh,
            chf,
            config.detail_sample_dist,
            config.detail_sample_max_error,
        );
        ctx.stop_timer(TimerCategory::DetailMesh);
        let dmesh = buffers
            .detail_mesh
            .insert(sampled.map_err(at_stage(BuildStage::DetailMesh))?);
        stats.detail_triangle_count = dmesh.tris.len();

        mark_ground_polygons(pmesh);

        ctx.start_timer(TimerCategory::Serialization);
        let serialized = create_tile_data(&TileCreateParams {
            mesh: pmesh,
            detail: Some(dmesh),
            walkable_height: settings.agent_height,
            walkable_radius: settings.agent_radius,
            walkable_climb: settings.agent_max_climb,
            tile_x: settings.tile_position.x,
            tile_y: settings.tile_position.y,
            tile_layer: 0,
            user_id: 0,
            build_bv_tree: true,
        });
        ctx.stop_timer(TimerCategory::Serialization);
        let navmesh_data = serialized.map_err(at_stage(BuildStage::Serialization))?;
        stats.data_size = navmesh_data.len();

        let navmesh_vertices = detail_triangle_list(dmesh, pmesh.npolys);
        ctx.log_info(format!(
            "built tile ({}, {}): {} polygons, {} bytes",
            settings.tile_position.x,
            settings.tile_position.y,
            pmesh.npolys,
            navmesh_data.len()
        ));
        self.last_stats = Some(stats);

        Ok(GeneratedData {
            success: true,
            navmesh_vertices,
            navmesh_data,
        })
    }
}

fn empty_tile() -> GeneratedData {
    GeneratedData {
        success: true,
        ..Default::default()
    }
}

/// Voxel space parameters for `settings`, whose cell sizes must already be clamped
///
/// Fails when the grid does not fit the voxel coordinate range.
fn voxel_config(settings: &BuildSettings) -> Result<NavBuildConfig, BuildError> {
    let cs = settings.cell_size;
    let ch = settings.cell_height;
    let walkable_radius = to_voxels((settings.agent_radius / cs).ceil(), "agent radius")?;
    let too_large = || {
        BuildError::InvalidSettings(format!(
            "tile size {} with a border of {} cells exceeds the voxel grid range",
            settings.tile_size, walkable_radius
        ))
    };
    let border_size = walkable_radius
        .checked_add(BORDER_PADDING)
        .ok_or_else(too_large)?;
    let grid_size = border_size
        .checked_mul(2)
        .and_then(|b| b.checked_add(settings.tile_size))
        .ok_or_else(too_large)?;
    let padding = Vec3::new(border_size as f32 * cs, 0.0, border_size as f32 * cs);

    Ok(NavBuildConfig {
        width: grid_size,
        height: grid_size,
        cs,
        ch,
        bmin: settings.bounding_box.minimum - padding,
        bmax: settings.bounding_box.maximum + padding,
        walkable_slope_angle: settings.agent_max_slope,
        walkable_height: (settings.agent_height / ch).ceil() as i32,
        walkable_climb: (settings.agent_max_climb / ch).floor() as i32,
        walkable_radius,
        max_edge_len: (settings.edge_max_len / cs) as i32,
        max_simplification_error: settings.edge_max_error,
        min_region_area: settings.region_min_area,
        merge_region_area: settings.region_merge_area,
        max_verts_per_poly: MAX_VERTS_PER_POLY,
        detail_sample_dist: cs * settings.detail_sample_distance,
        detail_sample_max_error: ch * settings.detail_sample_max_error,
        border_size,
    })
}

fn to_voxels(cells: f32, what: &str) -> Result<i32, BuildError> {
    if cells.is_finite() && cells >= 0.0 && cells <= i32::MAX as f32 {
        Ok(cells as i32)
    } else {
        Err(BuildError::InvalidSettings(format!(
            "{what} of {cells} cells is out of range"
        )))
    }
}

fn validate_geometry(vertices: &[Vec3], indices: &[i32]) -> Result<(), BuildError> {
    if vertices.is_empty() || indices.is_empty() {
        return Err(BuildError::InvalidInput(format!(
            "{} vertices and {} indices",
            vertices.len(),
            indices.len()
        )));
    }
    if indices.len() % 3 != 0 {
        return Err(BuildError::InvalidInput(format!(
            "index count {} is not a multiple of 3",
            indices.len()
        )));
    }
    if let Some(bad) = indices
        .iter()
        .find(|&&i| i < 0 || i as usize >= vertices.len())
    {
        return Err(BuildError::InvalidInput(format!(
            "index {bad} out of range for {} vertices",
            vertices.len()
        )));
    }
    if let Some(bad) = vertices.iter().find(|v| !v.is_finite()) {
        return Err(BuildError::InvalidInput(format!("vertex {bad} is not finite")));
    }
    Ok(())
}

/// Walkable polygons become ground that agents may walk on
fn mark_ground_polygons(pmesh: &mut PolyMesh) {
    for (area, flags) in pmesh.areas.iter_mut().zip(pmesh.flags.iter_mut()) {
        if *area == WALKABLE_AREA {
            *area = GROUND_AREA;
            *flags = PolyFlags::WALK.bits();
        }
    }
}

/// Flattens the detail submeshes into a triangle list for debug drawing
fn detail_triangle_list(dmesh: &PolyMeshDetail, npolys: usize) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(dmesh.tris.len() * 3);
    for i in 0..npolys {
        let verts = dmesh.submesh_verts(i);
        for tri in dmesh.submesh_tris(i) {
            out.extend(tri[..3].iter().map(|&v| verts[v as usize]));
        }
    }
    out
}
