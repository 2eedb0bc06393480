//! Tabular report writers.
//!
//! Reports are pure projections of typed row slices at the boundary:
//! the internal representation stays strongly typed and the writers
//! only serialize. Non-finite sentinels in the rows (the insider
//! confidence ratio's `+inf`) are preserved by the rows' own serializers
//! rather than coerced here.

use fundflow_core::{FlowError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes delimited-text and structured-text projections of typed rows
/// into one output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    out_dir: PathBuf,
}

impl ReportWriter {
    /// Opens (and creates if needed) the output directory.
    pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir })
    }

    /// The directory reports are written into.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Writes `rows` as `<name>.csv` and returns the path.
    pub fn write_csv<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<PathBuf> {
        let path = self.out_dir.join(format!("{name}.csv"));
        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| FlowError::Storage(format!("{}: {e}", path.display())))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| FlowError::Storage(format!("{}: {e}", path.display())))?;
        }
        writer
            .flush()
            .map_err(|e| FlowError::Storage(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), rows = rows.len(), "wrote csv report");
        Ok(path)
    }

    /// Writes any serializable value as pretty `<name>.json` and
    /// returns the path.
    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.out_dir.join(format!("{name}.json"));
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| FlowError::Storage(e.to_string()))?;
        fs::write(&path, body)?;
        debug!(path = %path.display(), "wrote json report");
        Ok(path)
    }
}
