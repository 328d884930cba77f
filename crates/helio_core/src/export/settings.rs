//! Photon export settings.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ExportError, ExportResult};

/// What an export run records.
///
/// Loadable from JSON; missing fields take their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PhotonsSettings {
    /// Instance URLs of tracked surfaces; empty tracks every photon
    pub surfaces: Vec<String>,
    pub save_coordinates: bool,
    /// World coordinates when true, surface-local coordinates otherwise
    pub save_coordinates_global: bool,
    pub save_surface_id: bool,
    pub save_surface_side: bool,
    pub save_photon_id: bool,
    /// Exporter-specific parameters, forwarded to the sink by name
    pub parameters: BTreeMap<String, String>,
}

impl Default for PhotonsSettings {
    fn default() -> Self {
        Self {
            surfaces: Vec::new(),
            save_coordinates: false,
            save_coordinates_global: true,
            save_surface_id: false,
            save_surface_side: false,
            save_photon_id: false,
            parameters: BTreeMap::new(),
        }
    }
}

impl PhotonsSettings {
    /// Settings recording every field of every photon.
    pub fn everything() -> Self {
        Self {
            save_coordinates: true,
            save_surface_id: true,
            save_surface_side: true,
            save_photon_id: true,
            ..Self::default()
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ExportResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(|e| ExportError::InvalidSettings(e.to_string()))
    }

    pub fn fields(&self) -> PhotonFields {
        PhotonFields {
            coordinates: self.save_coordinates,
            global: self.save_coordinates_global,
            surface_id: self.save_surface_id,
            surface_side: self.save_surface_side,
            photon_id: self.save_photon_id,
        }
    }
}

/// The optional per-photon columns selected by [`PhotonsSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhotonFields {
    pub coordinates: bool,
    pub global: bool,
    pub surface_id: bool,
    pub surface_side: bool,
    pub photon_id: bool,
}

impl PhotonFields {
    /// Column names in row order.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        if self.photon_id {
            columns.push("id");
        }
        if self.coordinates {
            columns.extend(["x", "y", "z"]);
        }
        if self.surface_side {
            columns.push("side");
        }
        if self.surface_id {
            columns.push("surface");
        }
        columns
    }

    /// Append the selected values of `photon` to `row`.
    pub fn write_row(&self, photon: &crate::photon::Photon, row: &mut Vec<f64>) {
        if self.photon_id {
            row.push(photon.id as f64);
        }
        if self.coordinates {
            let p = if self.global {
                photon.position
            } else {
                photon.local_position
            };
            row.extend([p.x as f64, p.y as f64, p.z as f64]);
        }
        if self.surface_side {
            row.push(photon.side.code());
        }
        if self.surface_id {
            // 0 marks the sun aperture, instances are numbered from 1
            row.push(photon.surface.map_or(0.0, |s| (s.index() + 1) as f64));
        }
    }
}
