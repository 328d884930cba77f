//! Helio command line: build a tower field, trace the sun through it, export photons.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use helio_core::export::{ExporterRegistry, PhotonExporter, PhotonsSettings};
use helio_core::{save_tree, Geometry, Scene};
use helio_math::{Quat, Transform, Vec3};
use helio_tracer::{trace_photons, Absorber, FlatRectangle, RunConfig, SpecularMirror, Sun};

/// Height of the receiver above the field.
const TOWER_HEIGHT: f32 = 20.0;
/// Distance between heliostat centers.
const HELIOSTAT_SPACING: f32 = 6.0;

#[derive(Parser)]
#[command(name = "helio_trace")]
#[command(about = "Trace sun photons through a heliostat field and export them")]
#[command(version)]
struct Cli {
    /// Heliostats per row and column
    #[arg(short, long, default_value_t = 5)]
    grid: u32,

    /// Photons launched from the sun
    #[arg(short = 'n', long, default_value_t = 100_000)]
    photons: u64,

    /// Photons per parallel batch
    #[arg(long, default_value_t = 10_000)]
    batch_size: u64,

    /// Surface interactions followed per photon
    #[arg(long, default_value_t = 10)]
    max_bounces: u32,

    /// Random seed
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Sun azimuth in degrees, clockwise from north
    #[arg(long, default_value_t = 180.0)]
    azimuth: f32,

    /// Sun elevation in degrees
    #[arg(long, default_value_t = 60.0)]
    elevation: f32,

    /// Direct normal irradiance in W/m^2
    #[arg(long, default_value_t = 1000.0)]
    irradiance: f64,

    /// Exporter name (see --list-exporters)
    #[arg(short, long, default_value = "No export")]
    exporter: String,

    /// Exporter parameter, repeatable (e.g. --param FileSize=100000)
    #[arg(long = "param", value_parser = parse_key_val)]
    params: Vec<(String, String)>,

    /// Photon settings JSON file (defaults to recording every field)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the propagated instance tree as JSON
    #[arg(long)]
    tree_out: Option<PathBuf>,

    /// Print the available exporters and exit
    #[arg(long)]
    list_exporters: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}

/// One line per exporter: its name and the parameters it accepts.
fn exporter_listing(registry: &ExporterRegistry) -> Result<Vec<String>> {
    registry
        .names()
        .into_iter()
        .map(|name| -> Result<String> {
            let sink = registry.create(name)?;
            let parameters = sink.parameter_names();
            Ok(if parameters.is_empty() {
                name.to_string()
            } else {
                format!("{name} ({})", parameters.join(", "))
            })
        })
        .collect()
}

/// A square field of flat heliostats north of a tower, each aimed at the receiver.
///
/// All heliostats share one facet geometry; only their aiming groups differ.
fn build_tower_field(grid: u32, sun: &Sun) -> Result<Scene> {
    let mut scene = Scene::new("tower_field", Geometry::group("Field"));
    let root = scene.root();
    let receiver_center = Vec3::new(0.0, 0.0, TOWER_HEIGHT);

    let tower = scene.add_geometry(Geometry::group("Tower").with_transform(Transform::from_translation_rotation(
        receiver_center,
        Quat::from_rotation_arc(Vec3::Z, Vec3::Y),
    )));
    let receiver = scene.add_geometry(Geometry::surface("Receiver", FlatRectangle::new(8.0, 8.0)).with_material(Absorber));
    let tower_node = scene.instantiate(root, tower)?;
    scene.instantiate(tower_node, receiver)?;

    let facet = scene.add_geometry(Geometry::surface("Facet", FlatRectangle::new(4.0, 4.0)).with_material(SpecularMirror::new(0.9)));
    let to_sun = -sun.direction();
    let half = (grid as f32 - 1.0) * 0.5;
    for row in 0..grid {
        for col in 0..grid {
            let position = Vec3::new(
                (col as f32 - half) * HELIOSTAT_SPACING,
                (row as f32 + 2.0) * HELIOSTAT_SPACING,
                2.0,
            );
            let to_receiver = (receiver_center - position).normalize();
            let aim = (to_sun + to_receiver).normalize_or_zero();
            let rotation = if aim == Vec3::ZERO {
                Quat::IDENTITY
            } else {
                Quat::from_rotation_arc(Vec3::Z, aim)
            };
            let heliostat = scene.add_geometry(
                Geometry::group(format!("Heliostat_{row}_{col}"))
                    .with_transform(Transform::from_translation_rotation(position, rotation)),
            );
            let node = scene.instantiate(root, heliostat)?;
            scene.instantiate(node, facet)?;
        }
    }

    scene.update()?;
    log::info!(
        "Built {} with {} heliostats ({} instances, {} geometries)",
        scene.name,
        grid * grid,
        scene.instance_count(),
        scene.geometry_count()
    );
    Ok(scene)
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let registry = ExporterRegistry::with_defaults();

    if cli.list_exporters {
        for line in exporter_listing(&registry)? {
            println!("{line}");
        }
        return Ok(());
    }

    let sun = Sun::from_angles(cli.azimuth, cli.elevation, cli.irradiance);
    let scene = build_tower_field(cli.grid, &sun).context("Failed to build the field")?;

    if let Some(path) = &cli.tree_out {
        save_tree(&scene.tree, &scene.library, path)
            .with_context(|| format!("Failed to write instance tree to {}", path.display()))?;
        log::info!("Wrote instance tree to {}", path.display());
    }

    let mut settings = match &cli.settings {
        Some(path) => PhotonsSettings::from_json_file(path)
            .with_context(|| format!("Failed to read photon settings {}", path.display()))?,
        None => PhotonsSettings::everything(),
    };
    settings.parameters.extend(cli.params.iter().cloned());

    let sink = registry.create(&cli.exporter)?;
    let mut exporter = PhotonExporter::new(sink);
    exporter.set_photon_settings(&settings, &scene)?;
    let exporter = Mutex::new(exporter);

    let config = RunConfig {
        photons: cli.photons,
        batch_size: cli.batch_size,
        max_bounces: cli.max_bounces,
        seed: cli.seed,
    };
    let summary = trace_photons(&scene, &sun, &config, &exporter, &AtomicBool::new(false))?;
    let exporter = exporter
        .into_inner()
        .map_err(|_| anyhow!("Exporter lock poisoned"))?;

    println!("Exporter:        {}", exporter.sink().name());
    println!("Photons traced:  {}", summary.photons_traced);
    println!("Events exported: {}", summary.photons_recorded);
    println!("Batches:         {}", summary.batches);
    println!("Photon power:    {:.6e} W", summary.photon_power);
    Ok(())
}
