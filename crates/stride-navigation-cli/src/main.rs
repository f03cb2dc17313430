//! Command line tool for building navigation mesh tiles and querying them

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use glam::{IVec2, Vec3};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use nav_common::TriMesh;
use stride_navigation::{
    tiles, BoundingBox, BuildSettings, NavigationBuilder, NavigationMesh, PathfindQuery,
    RaycastQuery,
};

/// Builds Stride navigation mesh tiles from OBJ geometry and runs queries on them
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build every tile overlapped by an input mesh
    Build {
        /// Input mesh file (OBJ format)
        #[clap(long, value_parser)]
        input: PathBuf,

        /// Directory receiving one `tile_<x>_<y>.bin` file per non-empty tile
        #[clap(long, value_parser)]
        output: PathBuf,

        /// Only build this tile (x,y)
        #[clap(long, value_parser = parse_coord)]
        tile: Option<IVec2>,

        #[clap(flatten)]
        settings: SettingsArgs,
    },

    /// Find a path over saved tiles
    FindPath {
        /// Tile files to load
        #[clap(long, value_parser, num_args = 1.., required = true)]
        tiles: Vec<PathBuf>,

        /// Start position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        start: Vec3,

        /// End position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        end: Vec3,

        /// Half extents of the box searched for the polygons under the end points (x,y,z)
        #[clap(long, value_parser = parse_vector, default_value = "2,4,2")]
        extent: Vec3,

        /// Maximum number of path points
        #[clap(long, default_value = "1024")]
        max_points: usize,

        /// Output path file
        #[clap(long, value_parser)]
        output: Option<PathBuf>,

        #[clap(flatten)]
        settings: SettingsArgs,
    },

    /// Cast a ray along the surface of saved tiles
    Raycast {
        /// Tile files to load
        #[clap(long, value_parser, num_args = 1.., required = true)]
        tiles: Vec<PathBuf>,

        /// Start position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        start: Vec3,

        /// End position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        end: Vec3,

        #[clap(flatten)]
        settings: SettingsArgs,
    },
}

/// Build settings, loaded from a profile and overridden by individual flags
#[derive(Args, Debug)]
struct SettingsArgs {
    /// Build settings profile (JSON)
    #[clap(long, value_parser)]
    settings: Option<PathBuf>,

    /// Cell size (horizontal resolution)
    #[clap(long)]
    cell_size: Option<f32>,

    /// Cell height (vertical resolution)
    #[clap(long)]
    cell_height: Option<f32>,

    /// Tile width in cells
    #[clap(long)]
    tile_size: Option<i32>,

    /// Height of the agent
    #[clap(long)]
    agent_height: Option<f32>,

    /// Radius of the agent, walkable areas are shrunk by it
    #[clap(long)]
    agent_radius: Option<f32>,

    /// Highest step the agent can climb
    #[clap(long)]
    agent_max_climb: Option<f32>,

    /// Steepest walkable slope in degrees
    #[clap(long)]
    agent_max_slope: Option<f32>,
}

impl SettingsArgs {
    fn resolve(&self) -> Result<BuildSettings> {
        let mut settings = match &self.settings {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings: {}", path.display()))?;
                BuildSettings::from_json_str(&text)
                    .with_context(|| format!("Invalid settings: {}", path.display()))?
            }
            None => BuildSettings::default(),
        };

        let overrides = [
            (&mut settings.cell_size, self.cell_size),
            (&mut settings.cell_height, self.cell_height),
            (&mut settings.agent_height, self.agent_height),
            (&mut settings.agent_radius, self.agent_radius),
            (&mut settings.agent_max_climb, self.agent_max_climb),
            (&mut settings.agent_max_slope, self.agent_max_slope),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(tile_size) = self.tile_size {
            settings.tile_size = tile_size;
        }
        Ok(settings.clamped())
    }
}

/// Parse a comma-separated vector
fn parse_vector(s: &str) -> Result<Vec3, String> {
    let parts = parse_components::<f32>(s, 3)?;
    Ok(Vec3::new(parts[0], parts[1], parts[2]))
}

/// Parse a comma-separated tile coordinate
fn parse_coord(s: &str) -> Result<IVec2, String> {
    let parts = parse_components::<i32>(s, 2)?;
    Ok(IVec2::new(parts[0], parts[1]))
}

fn parse_components<T: std::str::FromStr>(s: &str, count: usize) -> Result<Vec<T>, String>
where
    T::Err: std::fmt::Display,
{
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != count {
        return Err(format!(
            "Expected {} components, got {}",
            count,
            parts.len()
        ));
    }
    parts
        .iter()
        .map(|p| p.trim().parse::<T>().map_err(|e| e.to_string()))
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            tile,
            settings,
        } => build_tiles(&input, &output, tile, &settings.resolve()?),
        Commands::FindPath {
            tiles,
            start,
            end,
            extent,
            max_points,
            output,
            settings,
        } => {
            let mesh = load_mesh(&tiles, &settings.resolve()?)?;
            let query = PathfindQuery {
                find_nearest_poly_extent: extent,
                max_path_points: max_points,
                ..PathfindQuery::new(start, end)
            };
            find_path(&mesh, &query, output.as_deref())
        }
        Commands::Raycast {
            tiles,
            start,
            end,
            settings,
        } => {
            let mesh = load_mesh(&tiles, &settings.resolve()?)?;
            raycast(&mesh, &RaycastQuery::new(start, end))
        }
    }
}

/// Build the tiles overlapped by the input mesh and write them to `output`
fn build_tiles(
    input: &Path,
    output: &Path,
    only: Option<IVec2>,
    settings: &BuildSettings,
) -> Result<()> {
    let mesh = TriMesh::from_obj(input).map_err(|e| anyhow!("Failed to load mesh: {}", e))?;
    log::info!(
        "Mesh loaded: {} vertices, {} triangles",
        mesh.vert_count(),
        mesh.tri_count()
    );

    let (bmin, bmax) = mesh.calculate_bounds();
    let mut geometry_bounds = BoundingBox::new(bmin, bmax);
    tiles::extend_bounding_box(&mut geometry_bounds, Vec3::splat(settings.agent_radius));

    let coords = match only {
        Some(coord) => vec![coord],
        None => tiles::overlapping_tiles(settings, &geometry_bounds),
    };
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;

    let mut builder = NavigationBuilder::new();
    let mut written = 0;
    for coord in coords {
        let Some(bounding_box) =
            tiles::tile_build_bounds(settings, coord, &[BoundingBox::new(bmin, bmax)])
        else {
            log::info!("Tile ({}, {}) has no geometry, skipped", coord.x, coord.y);
            continue;
        };
        builder.set_settings(BuildSettings {
            bounding_box,
            tile_position: coord,
            ..settings.clone()
        });

        let data = builder.build_navmesh(&mesh.vertices, &mesh.indices);
        if !data.success {
            bail!("Failed to build tile ({}, {})", coord.x, coord.y);
        }
        if data.is_empty_tile() {
            log::info!("Tile ({}, {}) has no walkable surface", coord.x, coord.y);
            continue;
        }

        let path = output.join(format!("tile_{}_{}.bin", coord.x, coord.y));
        fs::write(&path, &data.navmesh_data)
            .with_context(|| format!("Failed to write tile: {}", path.display()))?;
        if let Some(stats) = builder.last_build_stats() {
            log::info!(
                "Tile ({}, {}): {} polygons, {} bytes -> {}",
                coord.x,
                coord.y,
                stats.poly_count,
                stats.data_size,
                path.display()
            );
        }
        written += 1;
    }

    println!("Wrote {} tiles to {}", written, output.display());
    Ok(())
}

fn load_mesh(paths: &[PathBuf], settings: &BuildSettings) -> Result<NavigationMesh> {
    let mut mesh = NavigationMesh::new();
    mesh.try_init(tiles::tile_size_world(settings))?;
    for path in paths {
        let data =
            fs::read(path).with_context(|| format!("Failed to read tile: {}", path.display()))?;
        mesh.try_load_tile(&data)
            .with_context(|| format!("Failed to load tile: {}", path.display()))?;
    }
    log::info!("Loaded {} tiles", mesh.tile_count());
    Ok(mesh)
}

fn find_path(mesh: &NavigationMesh, query: &PathfindQuery, output: Option<&Path>) -> Result<()> {
    let points = mesh
        .try_find_path(query)
        .context("Failed to find path")?;

    if let Some(output_path) = output {
        let mut file = File::create(output_path)
            .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
        writeln!(file, "# Path from {} to {}", query.source, query.target)?;
        writeln!(file, "# {} waypoints", points.len())?;
        for p in &points {
            writeln!(file, "{},{},{}", p.x, p.y, p.z)?;
        }
        println!("Saved {} waypoints to {}", points.len(), output_path.display());
    } else {
        println!("Path:");
        for (i, p) in points.iter().enumerate() {
            println!("{}: {},{},{}", i, p.x, p.y, p.z);
        }
    }
    Ok(())
}

fn raycast(mesh: &NavigationMesh, query: &RaycastQuery) -> Result<()> {
    let result = mesh.try_raycast(query).context("Failed to cast ray")?;
    if result.normal == Vec3::ZERO {
        println!("Reached {}", result.position);
    } else {
        println!("Blocked at {} (normal {})", result.position, result.normal);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR_OBJ: &str = "\
v 0 0 0
v 0 0 10
v 10 0 10
v 10 0 0
f 1 2 3
f 1 3 4
";

    fn no_overrides() -> SettingsArgs {
        SettingsArgs {
            settings: None,
            cell_size: None,
            cell_height: None,
            tile_size: None,
            agent_height: None,
            agent_radius: None,
            agent_max_climb: None,
            agent_max_slope: None,
        }
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_vector("1, 2.5,-3").unwrap(), Vec3::new(1.0, 2.5, -3.0));
        assert!(parse_vector("1,2").is_err());
        assert!(parse_vector("1,a,3").is_err());
        assert_eq!(parse_coord("-2,7").unwrap(), IVec2::new(-2, 7));
        assert!(parse_coord("1.5,2").is_err());
    }

    #[test]
    fn test_settings_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let profile = dir.path().join("profile.json");
        let base = BuildSettings {
            agent_radius: 0.8,
            ..Default::default()
        };
        fs::write(&profile, base.to_json_string().unwrap()).unwrap();

        let args = SettingsArgs {
            settings: Some(profile),
            cell_size: Some(0.001),
            tile_size: Some(16),
            ..no_overrides()
        };
        let settings = args.resolve().unwrap();
        assert_eq!(settings.agent_radius, 0.8);
        assert_eq!(settings.cell_size, stride_navigation::MIN_CELL_SIZE);
        assert_eq!(settings.tile_size, 16);
    }

    #[test]
    fn test_build_then_find_path() {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("floor.obj");
        fs::write(&obj, FLOOR_OBJ).unwrap();
        let out = dir.path().join("tiles");

        let settings = BuildSettings {
            agent_height: 2.0,
            ..Default::default()
        };
        build_tiles(&obj, &out, None, &settings).unwrap();

        let mut tiles: Vec<PathBuf> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        tiles.sort();
        assert!(tiles.iter().any(|p| p.ends_with("tile_0_0.bin")));

        let mesh = load_mesh(&tiles, &settings).unwrap();
        let query = PathfindQuery::new(Vec3::new(1.0, 0.0, 1.0), Vec3::new(8.0, 0.0, 8.0));
        let path_file = dir.path().join("path.txt");
        find_path(&mesh, &query, Some(&path_file)).unwrap();
        let text = fs::read_to_string(&path_file).unwrap();
        assert!(text.lines().filter(|l| !l.starts_with('#')).count() >= 2);

        raycast(&mesh, &RaycastQuery::new(Vec3::new(1.0, 0.0, 1.0), Vec3::new(5.0, 0.0, 5.0)))
            .unwrap();
    }
}
