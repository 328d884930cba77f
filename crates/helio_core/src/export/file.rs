//! Binary file sink.
//!
//! Each selected photon becomes one row of native-endian `f64` values. Rows
//! go to `<ExportFile>_<n>.dat` files in `ExportDirectory`, starting a new
//! file whenever `FileSize` photons have been written (0 means one file).
//! `end_export` writes `<ExportFile>_parameters.txt` describing the columns,
//! the surface numbering and the power per photon.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::photon::Photon;

use super::sink::{ExportLayout, PhotonSink};
use super::{ExportError, ExportResult};

pub struct FileExport {
    directory: PathBuf,
    file_name: String,
    photons_per_file: u64,
    layout: ExportLayout,
    writer: Option<BufWriter<File>>,
    files_written: u32,
    in_current_file: u64,
    row: Vec<f64>,
}

impl Default for FileExport {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_name: "photons".to_string(),
            photons_per_file: 0,
            layout: ExportLayout::default(),
            writer: None,
            files_written: 0,
            in_current_file: 0,
            row: Vec::new(),
        }
    }
}

impl FileExport {
    pub const NAME: &'static str = "Binary file";
    pub const PARAMETERS: &'static [&'static str] = &["ExportDirectory", "ExportFile", "FileSize"];

    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    pub fn with_photons_per_file(mut self, photons: u64) -> Self {
        self.photons_per_file = photons;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of data files opened so far.
    pub fn files_written(&self) -> u32 {
        self.files_written
    }

    /// Path of the `index`-th data file (1-based).
    pub fn data_path(&self, index: u32) -> PathBuf {
        self.directory.join(format!("{}_{}.dat", self.file_name, index))
    }

    pub fn parameters_path(&self) -> PathBuf {
        self.directory.join(format!("{}_parameters.txt", self.file_name))
    }

    fn open_next(&mut self) -> ExportResult<()> {
        self.close_current()?;
        self.files_written += 1;
        let path = self.data_path(self.files_written);
        log::debug!("Opening photon file {}", path.display());
        self.writer = Some(BufWriter::new(File::create(path)?));
        self.in_current_file = 0;
        Ok(())
    }

    fn close_current(&mut self) -> ExportResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn write_parameters(&self, power: f64) -> ExportResult<()> {
        let mut out = BufWriter::new(File::create(self.parameters_path())?);
        writeln!(out, "START PARAMETERS")?;
        for column in self.layout.fields.columns() {
            writeln!(out, "{column}")?;
        }
        writeln!(out, "END PARAMETERS")?;
        writeln!(out, "START SURFACES")?;
        for surface in &self.layout.surfaces {
            writeln!(out, "{} {}", surface.id, surface.url)?;
        }
        writeln!(out, "END SURFACES")?;
        writeln!(out, "FILES {}", self.files_written)?;
        writeln!(out, "{power:e}")?;
        out.flush()?;
        Ok(())
    }
}

impl PhotonSink for FileExport {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAMETERS
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> ExportResult<()> {
        match name {
            "ExportDirectory" => self.directory = PathBuf::from(value),
            "ExportFile" => {
                if value.is_empty() {
                    return Err(ExportError::InvalidParameter {
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
                self.file_name = value.to_string();
            }
            "FileSize" => {
                self.photons_per_file = value.trim().parse().map_err(|_| ExportError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                })?;
            }
            _ => log::warn!("{} ignores parameter {}={}", Self::NAME, name, value),
        }
        Ok(())
    }

    fn start(&mut self, layout: &ExportLayout) -> ExportResult<()> {
        self.layout = layout.clone();
        self.files_written = 0;
        fs::create_dir_all(&self.directory)?;
        self.open_next()
    }

    fn save(&mut self, photons: &[Photon], _power: f64) -> ExportResult<()> {
        for photon in photons {
            if self.photons_per_file > 0 && self.in_current_file >= self.photons_per_file {
                self.open_next()?;
            }
            self.row.clear();
            self.layout.fields.write_row(photon, &mut self.row);
            if let Some(writer) = self.writer.as_mut() {
                writer.write_all(bytemuck::cast_slice(&self.row))?;
            }
            self.in_current_file += 1;
        }
        Ok(())
    }

    fn finish(&mut self, power: f64) -> ExportResult<()> {
        self.close_current()?;
        self.write_parameters(power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::PhotonsSettings;
    use crate::export::SurfaceEntry;
    use helio_math::Vec3;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("helio_file_export_{}_{}", std::process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn photons(n: u64) -> Vec<Photon> {
        (0..n)
            .map(|i| Photon::emitted(i, Vec3::new(i as f32, 0.5, -1.0), Vec3::NEG_Z))
            .collect()
    }

    fn read_f64s(path: &Path) -> Vec<f64> {
        let bytes = fs::read(path).unwrap();
        bytes
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_rows_and_parameters_file() {
        let dir = scratch_dir("rows");
        let mut sink = FileExport::new(&dir, "run");
        let layout = ExportLayout {
            fields: PhotonsSettings::everything().fields(),
            surfaces: vec![SurfaceEntry {
                id: 3,
                url: "/Root/Mirror".to_string(),
            }],
        };

        sink.start(&layout).unwrap();
        sink.save(&photons(2), 0.5).unwrap();
        sink.finish(0.5).unwrap();

        let values = read_f64s(&sink.data_path(1));
        assert_eq!(values, vec![0.0, 0.0, 0.5, -1.0, 1.0, 0.0, 1.0, 1.0, 0.5, -1.0, 1.0, 0.0]);

        let text = fs::read_to_string(sink.parameters_path()).unwrap();
        assert!(text.starts_with("START PARAMETERS\nid\nx\ny\nz\nside\nsurface\nEND PARAMETERS\n"));
        assert!(text.contains("3 /Root/Mirror"));
        assert!(text.contains("FILES 1"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_size_rolls_over() {
        let dir = scratch_dir("rollover");
        let mut sink = FileExport::default();
        sink.set_parameter("ExportDirectory", dir.to_str().unwrap()).unwrap();
        sink.set_parameter("ExportFile", "split").unwrap();
        sink.set_parameter("FileSize", "2").unwrap();

        let layout = ExportLayout {
            fields: PhotonsSettings {
                save_photon_id: true,
                ..PhotonsSettings::default()
            }
            .fields(),
            surfaces: Vec::new(),
        };
        sink.start(&layout).unwrap();
        sink.save(&photons(5), 1.0).unwrap();
        sink.finish(1.0).unwrap();

        assert_eq!(sink.files_written(), 3);
        assert_eq!(read_f64s(&dir.join("split_1.dat")), vec![0.0, 1.0]);
        assert_eq!(read_f64s(&dir.join("split_2.dat")), vec![2.0, 3.0]);
        assert_eq!(read_f64s(&dir.join("split_3.dat")), vec![4.0]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_bad_file_size_is_rejected() {
        let mut sink = FileExport::default();
        let err = sink.set_parameter("FileSize", "lots").unwrap_err();
        assert!(matches!(err, ExportError::InvalidParameter { .. }));
        assert!(sink.set_parameter("Compression", "on").is_ok());
    }
}
