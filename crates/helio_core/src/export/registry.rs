//! Name-based lookup of export sinks.

use super::file::FileExport;
use super::sink::{MemoryExport, NoExport, PhotonSink};
use super::{ExportError, ExportResult};

/// Builds a fresh sink.
pub type SinkConstructor = fn() -> Box<dyn PhotonSink>;

/// Maps exporter names to constructors, in registration order.
pub struct ExporterRegistry {
    entries: Vec<(String, SinkConstructor)>,
}

impl Default for ExporterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ExporterRegistry {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Registry holding the built-in sinks.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(NoExport::NAME, || Box::new(NoExport));
        registry.register(MemoryExport::NAME, || Box::new(MemoryExport::new()));
        registry.register(FileExport::NAME, || Box::new(FileExport::default()));
        registry
    }

    /// Register a sink, replacing any previous entry of the same name.
    pub fn register(&mut self, name: impl Into<String>, constructor: SinkConstructor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = constructor,
            None => self.entries.push((name, constructor)),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn create(&self, name: &str) -> ExportResult<Box<dyn PhotonSink>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, constructor)| constructor())
            .ok_or_else(|| ExportError::UnknownExporter(name.to_string()))
    }
}
