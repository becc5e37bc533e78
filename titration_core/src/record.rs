//! Patient record files.
//!
//! The CLI reads a patient record from JSON, and writes it back after an
//! explicit `ReportReaction`.

use crate::{Error, Patient, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

impl Patient {
    /// Load a patient record from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let patient: Patient = serde_json::from_str(&contents)?;
        tracing::debug!(
            "Loaded patient record from {:?} ({} attributes, {} medications)",
            path,
            patient.attributes.len(),
            patient.medications.len()
        );
        Ok(patient)
    }

    /// Save the patient record as JSON
    ///
    /// Atomically writes the record by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved patient record to {:?}", path);
        Ok(())
    }
}
