//! Parallel photon run.
//!
//! Photons are split into batches traced in parallel with rayon. Each batch
//! owns an `StdRng` seeded from the run seed and the batch index, so the set
//! of recorded photons does not depend on thread scheduling. Batches are saved
//! through one exporter behind a mutex.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use helio_core::export::{ExportResult, PhotonExporter, PhotonSink};
use helio_core::{Photon, Scene, Side};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;

use crate::sun::{Sun, SunAperture};

/// Run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Photons launched from the sun aperture
    pub photons: u64,
    /// Photons per batch
    pub batch_size: u64,
    /// Surface interactions followed per photon
    pub max_bounces: u32,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            photons: 100_000,
            batch_size: 10_000,
            max_bounces: 10,
            seed: 0,
        }
    }
}

impl RunConfig {
    pub fn batch_count(&self) -> u64 {
        if self.photons == 0 {
            0
        } else {
            self.photons.div_ceil(self.batch_size.max(1))
        }
    }
}

/// Outcome of [`trace_photons`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunSummary {
    pub photons_traced: u64,
    /// Photon events accepted by the exporter
    pub photons_recorded: u64,
    /// Batches actually traced
    pub batches: u64,
    pub cancelled: bool,
    /// Power carried by each photon
    pub photon_power: f64,
}

/// Seed of batch `index`, decorrelated from its neighbours.
fn batch_seed(seed: u64, index: u64) -> u64 {
    seed ^ (index.wrapping_add(1)).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn lock<S: PhotonSink>(exporter: &Mutex<PhotonExporter<S>>) -> MutexGuard<'_, PhotonExporter<S>> {
    exporter.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Follow one photon from the aperture, appending one event per interaction.
fn trace_path(
    scene: &Scene,
    aperture: &SunAperture,
    id: u64,
    max_bounces: u32,
    rng: &mut dyn RngCore,
    out: &mut Vec<Photon>,
) {
    let mut ray = aperture.sample_ray(rng);
    out.push(Photon::emitted(id, ray.origin, ray.direction));

    for _ in 0..max_bounces {
        let Some(hit) = scene.intersect(&ray, rng) else { break };
        out.push(Photon {
            id,
            position: hit.point,
            local_position: hit.local_point,
            direction: ray.direction,
            surface: Some(hit.instance),
            side: Side::from_front(hit.is_front),
        });
        match hit.ray_out {
            Some(next) => ray = next,
            None => break,
        }
    }
}

/// Trace `config.photons` photons from `sun` through `scene` and export them.
///
/// `scene` must already be updated. The exporter is started and ended here;
/// if starting fails the run aborts with that error. Setting `cancel` stops
/// the run before the next batch.
pub fn trace_photons<S: PhotonSink>(
    scene: &Scene,
    sun: &Sun,
    config: &RunConfig,
    exporter: &Mutex<PhotonExporter<S>>,
    cancel: &AtomicBool,
) -> ExportResult<RunSummary> {
    let start = Instant::now();
    let aperture = sun.aperture(&scene.world_bounds());
    let photon_power = match (&aperture, config.photons) {
        (Some(aperture), n) if n > 0 => sun.irradiance * aperture.area() / n as f64,
        _ => 0.0,
    };

    {
        let mut exporter = lock(exporter);
        exporter.start_export()?;
        exporter.set_photon_power(photon_power)?;
    }

    let Some(aperture) = aperture else {
        log::warn!("Scene '{}' has no geometry to illuminate", scene.name);
        lock(exporter).end_export()?;
        return Ok(RunSummary::default());
    };

    log::info!(
        "Tracing {} photons in {} batches, {:.4e} W per photon",
        config.photons,
        config.batch_count(),
        photon_power
    );

    let traced = AtomicU64::new(0);
    let batch_size = config.batch_size.max(1);
    let results: ExportResult<Vec<Option<u64>>> = (0..config.batch_count())
        .into_par_iter()
        .map(|index| {
            if cancel.load(Ordering::Relaxed) {
                return Ok(None);
            }
            let first = index * batch_size;
            let count = batch_size.min(config.photons - first);
            let mut rng = StdRng::seed_from_u64(batch_seed(config.seed, index));
            let mut photons = Vec::with_capacity(2 * count as usize);
            for id in first..first + count {
                trace_path(scene, &aperture, id, config.max_bounces, &mut rng, &mut photons);
            }
            traced.fetch_add(count, Ordering::Relaxed);

            let accepted = lock(exporter).save_photons(&photons)?;
            log::debug!("Batch {index}: {count} photons, {accepted} events saved");
            Ok(Some(accepted as u64))
        })
        .collect();

    // Close the sink even when a batch failed
    let ended = lock(exporter).end_export();
    let results = results?;
    ended?;

    let summary = RunSummary {
        photons_traced: traced.into_inner(),
        photons_recorded: results.iter().flatten().sum(),
        batches: results.iter().flatten().count() as u64,
        cancelled: results.iter().any(Option::is_none),
        photon_power,
    };
    log::info!(
        "Traced {} photons ({} events) in {:.2?}{}",
        summary.photons_traced,
        summary.photons_recorded,
        start.elapsed(),
        if summary.cancelled { ", cancelled" } else { "" }
    );
    Ok(summary)
}
