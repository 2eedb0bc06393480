//! Directory bootstrap and scoped intermediate-file tracking.

use fundflow_core::Result;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// The fixed directory layout under one data root.
#[derive(Debug, Clone)]
pub struct DataPaths {
    /// Data root.
    pub base: PathBuf,
    /// Taiwan market artifacts.
    pub tw_market: PathBuf,
    /// US market artifacts and reports.
    pub us_market: PathBuf,
    /// Raw and repaired filing downloads.
    pub downloads: PathBuf,
}

impl DataPaths {
    /// Lays out the standard paths under `base` without touching disk.
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            tw_market: base.join("tw_market"),
            us_market: base.join("us_market"),
            downloads: base.join("us_market").join("downloads"),
            base,
        }
    }

    /// Ensures every directory exists. Idempotent.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.base, &self.tw_market, &self.us_market, &self.downloads] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Scoped tracker for the intermediate files one run wrote.
///
/// Dropping the handle deletes every tracked file unless [`keep`]
/// was called, so intermediate artifacts never outlive the run that
/// owns them and no process-wide list is involved.
///
/// [`keep`]: IntermediateFiles::keep
#[derive(Debug, Default)]
pub struct IntermediateFiles {
    paths: Vec<PathBuf>,
    keep: bool,
}

impl IntermediateFiles {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks one file for disposal with this handle.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// The files currently tracked.
    #[must_use]
    pub fn tracked(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Marks the tracked files as kept; disposal becomes a no-op.
    pub fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for IntermediateFiles {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed intermediate file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_is_idempotent() {
        let tmp = std::env::temp_dir().join("fundflow-paths-test");
        let paths = DataPaths::new(&tmp);
        paths.ensure().unwrap();
        paths.ensure().unwrap();
        assert!(paths.downloads.is_dir());
        assert!(paths.tw_market.is_dir());
        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn test_drop_removes_tracked_files() {
        let tmp = std::env::temp_dir().join("fundflow-intermediate-test");
        fs::create_dir_all(&tmp).unwrap();
        let file = tmp.join("report.csv");
        fs::write(&file, "a,b\n").unwrap();

        let mut tracker = IntermediateFiles::new();
        tracker.track(&file);
        drop(tracker);
        assert!(!file.exists());
        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn test_keep_preserves_tracked_files() {
        let tmp = std::env::temp_dir().join("fundflow-keep-test");
        fs::create_dir_all(&tmp).unwrap();
        let file = tmp.join("report.csv");
        fs::write(&file, "a,b\n").unwrap();

        let mut tracker = IntermediateFiles::new();
        tracker.track(&file);
        tracker.keep();
        drop(tracker);
        assert!(file.exists());
        fs::remove_dir_all(&tmp).ok();
    }
}
