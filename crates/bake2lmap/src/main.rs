use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use glam::Vec3;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

use lightbake::{
    bake, cross_validate, AccumulationMode, BakeConfig, Contribution, Strategy, VertexStore,
    VoxelBox,
};
use lmap::VertexLayout;

/// Which pass fills the atlas.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    /// One task per texel.
    Texel,
    /// One task per triangle.
    Triangle,
}

impl From<StrategyArg> for Strategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Texel => Strategy::TexelDriven,
            StrategyArg::Triangle => Strategy::TriangleDriven,
        }
    }
}

impl std::fmt::Display for StrategyArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyArg::Texel => "texel",
            StrategyArg::Triangle => "triangle",
        };

        f.write_str(s)
    }
}

/// Conflict handling for the triangle-driven pass.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum AccumulationArg {
    Atomic,
    ScatterResolve,
}

impl From<AccumulationArg> for AccumulationMode {
    fn from(a: AccumulationArg) -> Self {
        match a {
            AccumulationArg::Atomic => AccumulationMode::Atomic,
            AccumulationArg::ScatterResolve => AccumulationMode::ScatterResolve,
        }
    }
}

/// What each covering triangle adds.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ContributionArg {
    /// `--color` for every triangle.
    Constant,
    /// Mean vertex luminance (needs luminance records).
    Luminance,
}

impl std::fmt::Display for ContributionArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContributionArg::Constant => "constant",
            ContributionArg::Luminance => "luminance",
        };

        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SceneArg {
    /// Walled voxel room with pillars and a roof hole.
    VoxelBox,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "bake2lmap", version)]
struct Args {
    /// Directory searched (recursively) for `.lvs` vertex record files.
    #[arg(long, default_value = "meshes")]
    input_dir: String,

    #[arg(long, default_value = "lightmaps")]
    output_dir: String,

    /// Bake a generated scene instead of reading `--input-dir`.
    #[arg(long, value_enum)]
    scene: Option<SceneArg>,

    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Input records carry a trailing luminance float (44-byte stride).
    #[arg(long, default_value_t = false)]
    with_luminance: bool,

    /// Declared vertex count; defaults to what the file size implies.
    #[arg(long)]
    vertex_count: Option<usize>,

    /// JSON file with `bake` (and optionally `scene`) settings. Flags win.
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Minimum texels/triangles per parallel work unit.
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long, value_enum, default_value_t = StrategyArg::Triangle)]
    strategy: StrategyArg,

    #[arg(long, value_enum)]
    accumulation: Option<AccumulationArg>,

    #[arg(long, value_enum, default_value_t = ContributionArg::Constant)]
    contribution: ContributionArg,

    /// Constant contribution as `r,g,b`.
    #[arg(long, default_value = "1,1,1", value_parser = parse_floats::<3>)]
    color: [f32; 3],

    /// Point light `x,y,z,strength` for generated scenes; repeatable.
    #[arg(long = "light", value_parser = parse_floats::<4>)]
    lights: Vec<[f32; 4]>,

    /// Also write the generated scene's vertex records next to its atlas.
    #[arg(long, default_value_t = false)]
    write_vertices: bool,

    /// Bake with both passes first and fail if their coverage differs.
    #[arg(long, default_value_t = false)]
    cross_validate: bool,
}

/// Optional `--config` file contents.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    bake: BakeConfig,
    scene: VoxelBox,
}

fn parse_floats<const N: usize>(s: &str) -> Result<[f32; N], String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| format!("'{}': {}", v, e)))
        .collect::<Result<Vec<_>, _>>()?;

    <[f32; N]>::try_from(values).map_err(|v| format!("expected {} values, got {}", N, v.len()))
}

// -------------------------------------------------------------------------
// Settings
// -------------------------------------------------------------------------

fn load_config_file(path: &str) -> Result<ConfigFile> {
    let file = File::open(path).with_context(|| format!("opening config {}", path))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing config {}", path))
}

fn bake_config(args: &Args, base: BakeConfig) -> BakeConfig {
    let mut config = base;
    if let Some(w) = args.width {
        config.atlas_width = w;
    }
    if let Some(h) = args.height {
        config.atlas_height = h;
    }
    if let Some(b) = args.batch_size {
        config.batch_size = b;
    }
    if let Some(a) = args.accumulation {
        config.accumulation = a.into();
    }
    config
}

fn contribution(args: &Args) -> Contribution {
    match args.contribution {
        ContributionArg::Constant => Contribution::Constant(args.color),
        ContributionArg::Luminance => Contribution::Luminance,
    }
}

// -------------------------------------------------------------------------
// Input discovery
// -------------------------------------------------------------------------

fn find_vertex_files(input_dir: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .map(|s| s.eq_ignore_ascii_case("lvs"))
                .unwrap_or(false)
        })
        .collect();

    paths.sort();
    paths
}

fn output_path(args: &Args, stem: &str, ext: &str) -> PathBuf {
    Path::new(&args.output_dir).join(format!("{}.{}", stem, ext))
}

// -------------------------------------------------------------------------
// Baking
// -------------------------------------------------------------------------

fn bake_store(
    store: VertexStore,
    config: &BakeConfig,
    args: &Args,
    label: &str,
    out_path: &Path,
) -> Result<()> {
    let source = contribution(args);

    if args.cross_validate {
        let result = cross_validate(config, &store, &source)
            .with_context(|| format!("cross-validating {}", label))?;
        if !result.agrees() {
            bail!(
                "{}: texel-driven and triangle-driven coverage differ in {} texels",
                label,
                result.mask_mismatches
            );
        }
        info!(
            "{}: passes agree on {} covered texels (max channel diff {:e})",
            label, result.texel_driven.covered_texels, result.max_abs_diff
        );
    }

    let (atlas, report) = bake(config, store, args.strategy.into(), &source)
        .with_context(|| format!("baking {}", label))?;

    if atlas.has_non_finite() {
        warn!("{}: atlas holds non-finite texels", label);
    }

    debug!("Writing LMAP atlas to {}", out_path.display());
    lmap::write_file(out_path, &atlas.into_lmap())
        .with_context(|| format!("writing {}", out_path.display()))?;

    info!(
        "OK {} -> {} ({} triangles, {} texels covered, {:.2?})",
        label,
        out_path.display(),
        report.triangles,
        report.covered_texels,
        report.elapsed
    );

    Ok(())
}

fn process_one_file(path: &Path, config: &BakeConfig, args: &Args) -> Result<()> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file stem", path.display()))?;
    let out_path = output_path(args, &stem, "lmap");

    if out_path.exists() && !args.overwrite {
        debug!("Skipping existing file: {}", out_path.display());
        return Ok(());
    }

    info!("Processing {} -> {}", path.display(), out_path.display());

    let layout = if args.with_luminance {
        VertexLayout::WithLuminance
    } else {
        VertexLayout::Standard
    };
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let declared = args
        .vertex_count
        .unwrap_or(bytes.len() / layout.stride());

    debug!(
        "{}: {} bytes, {:?} layout, {} vertices declared",
        path.display(),
        bytes.len(),
        layout,
        declared
    );

    let store = VertexStore::from_bytes(&bytes, layout.stride(), declared)
        .with_context(|| format!("binding {}", path.display()))?;

    bake_store(store, config, args, &path.display().to_string(), &out_path)
}

fn process_scene(scene: SceneArg, room: &VoxelBox, config: &BakeConfig, args: &Args) -> Result<()> {
    let stem = match scene {
        SceneArg::VoxelBox => "voxel-box",
    };
    let out_path = output_path(args, stem, "lmap");

    if out_path.exists() && !args.overwrite {
        debug!("Skipping existing file: {}", out_path.display());
        return Ok(());
    }

    let mut mesh = room.build().context("generating voxel box")?;

    let lights = if args.lights.is_empty() {
        // A weak light in the middle of the room and a strong one far above
        // the roof hole.
        let (lo, hi) = mesh.bounds().context("voxel box has no faces")?;
        let center = (lo + hi) * 0.5;
        vec![
            center.extend(10.0).to_array(),
            (center + Vec3::new(0.0, 1000.0, 0.0)).extend(150.0).to_array(),
        ]
    } else {
        args.lights.clone()
    };

    for [x, y, z, strength] in lights {
        debug!("Lighting with point light at ({}, {}, {}) x{}", x, y, z, strength);
        mesh.add_point_light(Vec3::new(x, y, z), strength);
    }

    debug!("Voxel box lit: {} triangles", mesh.triangle_count());
    let store = mesh.into_store().context("binding voxel box")?;

    if args.write_vertices {
        let lvs_path = output_path(args, stem, "lvs");
        let bytes = lmap::encode_records(&store.to_records())?;
        fs::write(&lvs_path, bytes).with_context(|| format!("writing {}", lvs_path.display()))?;
        info!("Wrote {} vertices to {}", store.vertex_count(), lvs_path.display());
    }

    bake_store(store, config, args, stem, &out_path)
}

fn main() -> Result<()> {
    env_logger::init();

    // Parse arguments and prepare output directory.
    let args = Args::parse();
    fs::create_dir_all(&args.output_dir)?;

    let file = match &args.config {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };
    let config = bake_config(&args, file.bake);
    config.validate().context("invalid bake configuration")?;

    info!(
        "Baking {}x{} atlas, {} pass, {} contribution, {:?} accumulation",
        config.atlas_width, config.atlas_height, args.strategy, args.contribution, config.accumulation
    );

    if let Some(scene) = args.scene {
        return process_scene(scene, &file.scene, &config, &args);
    }

    let paths = find_vertex_files(&args.input_dir);
    if paths.is_empty() {
        warn!("No .lvs files found under {}", args.input_dir);
        return Ok(());
    }
    if args.vertex_count.is_some() && paths.len() > 1 {
        bail!(
            "--vertex-count applies to a single input, found {} files",
            paths.len()
        );
    }

    info!("Processing {} files...", paths.len());

    // Bake files in parallel, reporting any errors.
    paths.par_iter().for_each(|path| {
        if let Err(err) = process_one_file(path, &config, &args) {
            warn!("Error processing {}: {:#}", path.display(), err);
        }
    });

    Ok(())
}
