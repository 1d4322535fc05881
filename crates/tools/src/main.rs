use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use elevation::{ElevationLoader, ElevationModel, ElevationModelConfig, RawTileLoader};
use foundation::math::{Geodetic, Vec3, geodetic_to_ecef};
use foundation::sector::Sector;
use gpu::recorder::RecordingContext;
use runtime::budget::FrameBudget;
use scene::view::ViewState;
use serde::Serialize;
use terrain::{TerrainConfig, Tessellator, TopologyCache};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let mut args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(usage());
    }

    let cmd = args[1].clone();
    args.drain(0..2);

    match cmd.as_str() {
        "synth" => cmd_synth(args),
        "elevation" => cmd_elevation(args),
        "grid" => cmd_grid(args),
        "tessellate" => cmd_tessellate(args),
        _ => Err(usage()),
    }
}

fn load_config(path: &str) -> Result<ElevationModelConfig, String> {
    ElevationModelConfig::from_path(path).map_err(|e| e.to_string())
}

/// Model over raw tiles at `root`, loading only when asked.
fn open_model(config: &ElevationModelConfig, root: &str) -> Result<ElevationModel, String> {
    let mut config = config.clone();
    config.settings.load_threads = 0;
    config
        .build(Arc::new(RawTileLoader::new(root)))
        .map_err(|e| e.to_string())
}

/// Alternates `query` with loading until nothing is left pending, so the
/// final answer reflects everything on disk.
fn settle<T>(model: &ElevationModel, mut query: impl FnMut() -> Result<T, String>) -> Result<T, String> {
    let mut rounds = model.level_set().num_levels() + 1;
    loop {
        let value = query()?;
        rounds -= 1;
        if model.process_pending_loads(&mut FrameBudget::unlimited()) == 0 || rounds == 0 {
            return Ok(value);
        }
    }
}

fn parse_f64(s: &str, what: &str) -> Result<f64, String> {
    s.parse().map_err(|_| format!("{what}: not a number: {s}"))
}

fn parse_usize(s: &str, what: &str) -> Result<usize, String> {
    s.parse().map_err(|_| format!("{what}: not a count: {s}"))
}

/// Rolling hills with a ridge along the equator, in metres.
fn synthetic_surface(lat: f64, lon: f64) -> f64 {
    let hills = 600.0 * (7.0 * lat).sin() * (5.0 * lon).cos();
    let ridge = 2500.0 * (-(lat * 12.0).powi(2)).exp();
    1200.0 + hills + ridge
}

fn cmd_synth(args: Vec<String>) -> Result<(), String> {
    // terrain synth <model.json> <tile_root> [--levels N]
    if args.len() < 2 {
        return Err(usage());
    }
    let config = load_config(&args[0])?;
    let root = PathBuf::from(&args[1]);

    let mut max_levels = 3usize;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--levels" => {
                i += 1;
                let v = args.get(i).ok_or("--levels requires a value")?;
                max_levels = parse_usize(v, "--levels")?;
            }
            s => return Err(format!("unknown arg: {s}\n\n{}", usage())),
        }
        i += 1;
    }

    let levels = config.levels.build().map_err(|e| e.to_string())?;
    let source = elevation::FnLoader::new(synthetic_surface);
    let sink = RawTileLoader::new(&root);
    let coverage = *levels.sector();

    let mut written = 0usize;
    for level in levels.levels().iter().take(max_levels).filter(|l| !l.is_empty()) {
        let Some((rows, cols)) = levels.span(level, &coverage) else {
            continue;
        };
        for row in rows {
            for column in cols.clone() {
                let key = tiling::tile_key::TileKey::new(level.index(), row, column);
                let Some(sector) = levels.tile_sector(&key) else {
                    continue;
                };
                let samples = source
                    .load_samples(&key, &sector, level)
                    .map_err(|e| e.to_string())?;
                sink.write_tile(&key, &samples).map_err(|e| e.to_string())?;
                written += 1;
            }
        }
    }

    info!(tiles = written, root = %root.display(), "wrote synthetic elevation tiles");
    eprintln!("wrote {written} tiles under {}", root.display());
    Ok(())
}

#[derive(Serialize)]
struct PointReport {
    lat_deg: f64,
    lon_deg: f64,
    elevation_m: f64,
    resident_tiles: usize,
}

fn cmd_elevation(args: Vec<String>) -> Result<(), String> {
    // terrain elevation <model.json> <tile_root> <lat_deg> <lon_deg>
    if args.len() != 4 {
        return Err(usage());
    }
    let config = load_config(&args[0])?;
    let model = open_model(&config, &args[1])?;
    let lat_deg = parse_f64(&args[2], "lat")?;
    let lon_deg = parse_f64(&args[3], "lon")?;

    let elevation_m = settle(&model, || {
        Ok(model.elevation_at(lat_deg.to_radians(), lon_deg.to_radians()))
    })?;
    let report = PointReport {
        lat_deg,
        lon_deg,
        elevation_m,
        resident_tiles: model.cache_stats().len,
    };
    print_json(&report)
}

#[derive(Serialize)]
struct GridReport {
    num_lat: usize,
    num_lon: usize,
    /// Radians; absent when nothing was resident.
    achieved_resolution: Option<f64>,
    values: Vec<f64>,
}

fn cmd_grid(args: Vec<String>) -> Result<(), String> {
    // terrain grid <model.json> <tile_root> <min_lat> <max_lat> <min_lon> <max_lon> <num_lat> <num_lon> <resolution_deg>
    if args.len() != 9 {
        return Err(usage());
    }
    let config = load_config(&args[0])?;
    let model = open_model(&config, &args[1])?;
    let sector = Sector::from_degrees(
        parse_f64(&args[2], "min_lat")?,
        parse_f64(&args[3], "max_lat")?,
        parse_f64(&args[4], "min_lon")?,
        parse_f64(&args[5], "max_lon")?,
    );
    let num_lat = parse_usize(&args[6], "num_lat")?;
    let num_lon = parse_usize(&args[7], "num_lon")?;
    let resolution = parse_f64(&args[8], "resolution")?.to_radians();

    let mut values = vec![model.min_elevation(); num_lat.saturating_mul(num_lon)];
    let achieved = settle(&model, || {
        model
            .elevations_for_grid(&sector, num_lat, num_lon, resolution, &mut values)
            .map_err(|e| e.to_string())
    })?;

    print_json(&GridReport {
        num_lat,
        num_lon,
        achieved_resolution: (achieved != elevation::MAX_RESOLUTION).then_some(achieved),
        values,
    })
}

#[derive(Serialize)]
struct FrameReport {
    frame: usize,
    tiles: usize,
    finest_level: Option<u32>,
    /// Visible tiles per level.
    levels: Vec<u64>,
    visited: u64,
    culled: u64,
    rebuilt: u64,
    uploads: usize,
    draws: usize,
    loads: usize,
}

fn cmd_tessellate(args: Vec<String>) -> Result<(), String> {
    // terrain tessellate <model.json> <tile_root> <eye_lat> <eye_lon> <eye_alt_m> [--terrain FILE] [--frames N]
    if args.len() < 5 {
        return Err(usage());
    }
    let config = load_config(&args[0])?;
    let eye_lat = parse_f64(&args[2], "eye_lat")?.to_radians();
    let eye_lon = parse_f64(&args[3], "eye_lon")?.to_radians();
    let eye_alt = parse_f64(&args[4], "eye_alt")?;

    let mut terrain_config = TerrainConfig::default();
    let mut frames = 4usize;
    let mut i = 5;
    while i < args.len() {
        match args[i].as_str() {
            "--terrain" => {
                i += 1;
                let path = args.get(i).ok_or("--terrain requires a value")?;
                terrain_config = TerrainConfig::from_path(path).map_err(|e| e.to_string())?;
            }
            "--frames" => {
                i += 1;
                let v = args.get(i).ok_or("--frames requires a value")?;
                frames = parse_usize(v, "--frames")?;
            }
            s => return Err(format!("unknown arg: {s}\n\n{}", usage())),
        }
        i += 1;
    }
    let terrain_config = terrain_config
        .with_env_overrides()
        .map_err(|e| e.to_string())?;

    let mut model_config = config.clone();
    model_config.settings = terrain_config.apply_to(model_config.settings);
    let model = Arc::new(open_model(&model_config, &args[1])?);
    let mesh_levels = config.levels.build().map_err(|e| e.to_string())?;
    let mut tessellator = Tessellator::new(
        model.clone(),
        mesh_levels,
        terrain_config,
        Arc::new(TopologyCache::new()),
    );

    let view = view_from(eye_lat, eye_lon, eye_alt);
    let mut ctx = RecordingContext::new();
    let mut reports = Vec::with_capacity(frames);
    for frame in 0..frames {
        let surface = tessellator.tessellate(&view).map_err(|e| e.to_string())?;
        tessellator.render(&surface, &mut ctx);
        let log = ctx.take_frame();
        let metrics = tessellator.metrics();
        reports.push(FrameReport {
            frame,
            tiles: surface.len(),
            finest_level: surface.tiles.iter().map(|t| t.tile.key.level).max(),
            levels: metrics.level_counts().to_vec(),
            visited: metrics.counter("tiles.visited"),
            culled: metrics.counter("tiles.culled"),
            rebuilt: metrics.counter("geometry.rebuilt"),
            uploads: log.uploads().count(),
            draws: log.draws().count(),
            loads: model.process_pending_loads(&mut FrameBudget::unlimited()),
        });
    }

    print_json(&reports)
}

/// Looks straight down from the eye with north up.
fn view_from(lat: f64, lon: f64, alt: f64) -> ViewState {
    let eye = geodetic_to_ecef(Geodetic::new(lat, lon, alt)).to_vec3();
    let target = geodetic_to_ecef(Geodetic::new(lat, lon, 0.0)).to_vec3();
    let north = Vec3::new(-lat.sin() * lon.cos(), -lat.sin() * lon.sin(), lat.cos());
    let far = 2.0 * foundation::math::WGS84_A + alt.abs();
    ViewState::look_at(eye, target, north, 60f64.to_radians(), 16.0 / 9.0, 1.0, far)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let payload = serde_json::to_string_pretty(value).map_err(|e| format!("json: {e}"))?;
    println!("{payload}");
    Ok(())
}

fn usage() -> String {
    let exe = env::args().next().unwrap_or_else(|| "terrain".to_string());
    format!(
        "Usage:\n  {exe} synth <model.json> <tile_root> [--levels N]\n  {exe} elevation <model.json> <tile_root> <lat_deg> <lon_deg>\n  {exe} grid <model.json> <tile_root> <min_lat> <max_lat> <min_lon> <max_lon> <num_lat> <num_lon> <resolution_deg>\n  {exe} tessellate <model.json> <tile_root> <eye_lat> <eye_lon> <eye_alt_m> [--terrain FILE] [--frames N]\n\nNotes:\n- Tiles are raw little-endian f32 files at <tile_root>/<level>/<row>/<row>_<column>.bin.\n- `tessellate` honours TERRAIN_* environment overrides; RUST_LOG controls logging.\n"
    )
}
