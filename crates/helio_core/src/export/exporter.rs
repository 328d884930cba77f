//! The export state machine.

use std::collections::HashSet;

use crate::instance::NodeId;
use crate::photon::Photon;
use crate::scene::Scene;

use super::settings::PhotonsSettings;
use super::sink::{ExportLayout, PhotonSink, SurfaceEntry};
use super::{ExportError, ExportResult};

/// Lifecycle of a [`PhotonExporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Exporting,
    Closed,
}

/// Drives one export run over a sink: `Idle -> Exporting -> Closed`.
pub struct PhotonExporter<S: PhotonSink> {
    sink: S,
    state: ExportState,
    layout: ExportLayout,
    /// `None` tracks every photon
    tracked: Option<HashSet<NodeId>>,
    power: f64,
    saved: u64,
}

impl<S: PhotonSink> PhotonExporter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: ExportState::Idle,
            layout: ExportLayout::default(),
            tracked: None,
            power: 0.0,
            saved: 0,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Photons accepted by the sink so far.
    pub fn photons_saved(&self) -> u64 {
        self.saved
    }

    pub fn photon_power(&self) -> f64 {
        self.power
    }

    fn require(&self, operation: &'static str, state: ExportState) -> ExportResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(ExportError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Choose what the run records. Only valid before the export starts.
    ///
    /// Surface URLs that match nothing in `scene` are logged and ignored.
    pub fn set_photon_settings(&mut self, settings: &PhotonsSettings, scene: &Scene) -> ExportResult<()> {
        self.require("set_photon_settings", ExportState::Idle)?;

        let surfaces = scene.surfaces();
        let tracked = if settings.surfaces.is_empty() {
            None
        } else {
            let mut tracked = HashSet::new();
            for url in &settings.surfaces {
                let found: Vec<NodeId> = scene
                    .find_by_url(url)
                    .into_iter()
                    .filter(|id| surfaces.contains(id))
                    .collect();
                if found.is_empty() {
                    log::warn!("No surface matches {url}, it will not be exported");
                }
                tracked.extend(found);
            }
            Some(tracked)
        };

        let listed = surfaces
            .into_iter()
            .filter(|id| tracked.as_ref().map_or(true, |t| t.contains(id)));
        self.layout = ExportLayout {
            fields: settings.fields(),
            surfaces: listed
                .filter_map(|id| {
                    scene.url(id).map(|url| SurfaceEntry {
                        id: id.index() + 1,
                        url,
                    })
                })
                .collect(),
        };
        self.tracked = tracked;

        for (name, value) in &settings.parameters {
            self.sink.set_parameter(name, value)?;
        }
        Ok(())
    }

    /// Open the sink. On failure the exporter is closed and the run must abort.
    pub fn start_export(&mut self) -> ExportResult<()> {
        self.require("start_export", ExportState::Idle)?;
        match self.sink.start(&self.layout) {
            Ok(()) => {
                log::info!("Started photon export to {}", self.sink.name());
                self.state = ExportState::Exporting;
                Ok(())
            }
            Err(e) => {
                log::error!("{} failed to start: {}", self.sink.name(), e);
                self.state = ExportState::Closed;
                Err(e)
            }
        }
    }

    /// Power carried by each photon saved from now on.
    pub fn set_photon_power(&mut self, power: f64) -> ExportResult<()> {
        self.require("set_photon_power", ExportState::Exporting)?;
        if !power.is_finite() || power < 0.0 {
            return Err(ExportError::InvalidParameter {
                name: "photon power".to_string(),
                value: power.to_string(),
            });
        }
        self.power = power;
        Ok(())
    }

    /// Forward the tracked photons of `photons` to the sink, in order.
    ///
    /// Returns how many were accepted.
    pub fn save_photons(&mut self, photons: &[Photon]) -> ExportResult<usize> {
        self.require("save_photons", ExportState::Exporting)?;

        let accepted = match &self.tracked {
            None => {
                self.sink.save(photons, self.power)?;
                photons.len()
            }
            Some(tracked) => {
                let selected: Vec<Photon> = photons
                    .iter()
                    .filter(|p| p.surface.is_some_and(|s| tracked.contains(&s)))
                    .copied()
                    .collect();
                self.sink.save(&selected, self.power)?;
                selected.len()
            }
        };
        self.saved += accepted as u64;
        Ok(accepted)
    }

    /// Flush and close the sink. A no-op unless exporting.
    pub fn end_export(&mut self) -> ExportResult<()> {
        if self.state != ExportState::Exporting {
            return Ok(());
        }
        self.state = ExportState::Closed;
        self.sink.finish(self.power)?;
        log::info!("Finished photon export to {}: {} photons", self.sink.name(), self.saved);
        Ok(())
    }
}
