//! Photon export protocol.
//!
//! A [`PhotonExporter`] drives one export run through the states
//! `Idle -> Exporting -> Closed` and forwards photon batches to a pluggable
//! [`PhotonSink`]. Sinks are looked up by name in an [`ExporterRegistry`].
//!
//! # Example
//!
//! ```ignore
//! let mut exporter = PhotonExporter::new(MemoryExport::new());
//! exporter.set_photon_settings(&PhotonsSettings::everything(), &scene)?;
//! exporter.start_export()?;
//! exporter.set_photon_power(0.25)?;
//! exporter.save_photons(&batch)?;
//! exporter.end_export()?;
//! ```

use thiserror::Error;

mod exporter;
mod file;
mod registry;
mod settings;
mod sink;

pub use exporter::{ExportState, PhotonExporter};
pub use file::FileExport;
pub use registry::{ExporterRegistry, SinkConstructor};
pub use settings::{PhotonFields, PhotonsSettings};
pub use sink::{ExportLayout, ExportedPhoton, MemoryExport, NoExport, PhotonSink, SurfaceEntry};

/// Errors that can occur during a photon export run.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("{operation} is not allowed while the exporter is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ExportState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value {value:?} for parameter {name}")]
    InvalidParameter { name: String, value: String },

    #[error("Invalid photon settings: {0}")]
    InvalidSettings(String),

    #[error("Unknown exporter: {0}")]
    UnknownExporter(String),
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;
