//! The sink capability and the in-process sinks.

use crate::photon::Photon;

use super::settings::PhotonFields;
use super::ExportResult;

/// Numbering of a surface in exported rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceEntry {
    /// Value written in the `surface` column
    pub id: usize,
    pub url: String,
}

/// Everything a sink needs to know before the first batch arrives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportLayout {
    pub fields: PhotonFields,
    pub surfaces: Vec<SurfaceEntry>,
}

/// An export destination.
///
/// Sinks are only driven through a [`super::PhotonExporter`], which enforces
/// call order; a sink never sees `save` before `start` or after `finish`.
pub trait PhotonSink: Send {
    /// Registry name of the sink.
    fn name(&self) -> &str;

    /// Names of the parameters this sink understands.
    fn parameter_names(&self) -> &'static [&'static str] {
        &[]
    }

    /// Extension point for sink-specific settings. Unknown names are ignored.
    fn set_parameter(&mut self, name: &str, value: &str) -> ExportResult<()> {
        log::warn!("{} ignores parameter {}={}", self.name(), name, value);
        Ok(())
    }

    /// Open the destination. An error aborts the run.
    fn start(&mut self, layout: &ExportLayout) -> ExportResult<()>;

    /// Store a batch; `power` is the power carried by each of these photons.
    fn save(&mut self, photons: &[Photon], power: f64) -> ExportResult<()>;

    /// Flush and close the destination.
    fn finish(&mut self, power: f64) -> ExportResult<()>;
}

impl PhotonSink for Box<dyn PhotonSink> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        (**self).parameter_names()
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> ExportResult<()> {
        (**self).set_parameter(name, value)
    }

    fn start(&mut self, layout: &ExportLayout) -> ExportResult<()> {
        (**self).start(layout)
    }

    fn save(&mut self, photons: &[Photon], power: f64) -> ExportResult<()> {
        (**self).save(photons, power)
    }

    fn finish(&mut self, power: f64) -> ExportResult<()> {
        (**self).finish(power)
    }
}

/// Discards every photon.
#[derive(Debug, Default)]
pub struct NoExport;

impl NoExport {
    pub const NAME: &'static str = "No export";
}

impl PhotonSink for NoExport {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn start(&mut self, _layout: &ExportLayout) -> ExportResult<()> {
        Ok(())
    }

    fn save(&mut self, _photons: &[Photon], _power: f64) -> ExportResult<()> {
        Ok(())
    }

    fn finish(&mut self, _power: f64) -> ExportResult<()> {
        Ok(())
    }
}

/// A photon retained by [`MemoryExport`], with the power it was saved under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportedPhoton {
    pub photon: Photon,
    pub power: f64,
}

/// Keeps every saved photon in submission order.
#[derive(Debug, Default)]
pub struct MemoryExport {
    layout: ExportLayout,
    records: Vec<ExportedPhoton>,
    final_power: Option<f64>,
}

impl MemoryExport {
    pub const NAME: &'static str = "Memory";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ExportedPhoton] {
        &self.records
    }

    pub fn layout(&self) -> &ExportLayout {
        &self.layout
    }

    /// Power reported when the run was finished, if it was.
    pub fn final_power(&self) -> Option<f64> {
        self.final_power
    }

    /// Total power of all retained photons.
    pub fn total_power(&self) -> f64 {
        self.records.iter().map(|r| r.power).sum()
    }
}

impl PhotonSink for MemoryExport {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn start(&mut self, layout: &ExportLayout) -> ExportResult<()> {
        self.layout = layout.clone();
        self.records.clear();
        self.final_power = None;
        Ok(())
    }

    fn save(&mut self, photons: &[Photon], power: f64) -> ExportResult<()> {
        self.records
            .extend(photons.iter().map(|&photon| ExportedPhoton { photon, power }));
        Ok(())
    }

    fn finish(&mut self, power: f64) -> ExportResult<()> {
        self.final_power = Some(power);
        Ok(())
    }
}
