//! Helio Tracer - photon transport over a Helio scene.
//!
//! Provides the reference shapes and materials of a collector field, the
//! sun source, and [`trace_photons`], which launches photons in parallel and
//! streams their surface interactions through a
//! [`PhotonExporter`](helio_core::PhotonExporter).
//!
//! # Example
//!
//! ```ignore
//! let exporter = Mutex::new(PhotonExporter::new(MemoryExport::new()));
//! let summary = trace_photons(&scene, &sun, &RunConfig::default(), &exporter, &AtomicBool::new(false))?;
//! ```

pub mod material;
pub mod rectangle;
pub mod run;
pub mod sphere;
pub mod sun;

pub use material::{Absorber, SpecularMirror};
pub use rectangle::FlatRectangle;
pub use run::{trace_photons, RunConfig, RunSummary};
pub use sphere::Sphere;
pub use sun::{Sun, SunAperture};
