//! Download directory management.
//!
//! Two files are written per successfully fetched filing:
//!
//! - `form4_<TICKER>_<YYYYmmdd_HHMMSS>_raw.txt` - the unmodified
//!   submission bytes, kept as an audit trail
//! - `form4_<TICKER>_<YYYYmmdd_HHMMSS>.xml` - the isolated, repaired
//!   structured document
//!
//! The filename convention is load-bearing: the directory-scan mode
//! recovers the ticker as the second underscore-delimited token, so the
//! layout must be preserved exactly. Fetches additionally return a typed
//! [`DownloadRecord`] manifest so in-process consumers never re-derive
//! identity from string position.

use chrono::{Local, Utc};
use fundflow_core::{DownloadRecord, FlowError, Result, Ticker};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Filename prefix shared by both persisted forms.
pub const FILE_PREFIX: &str = "form4";

/// Download directory for one filing type.
#[derive(Debug, Clone)]
pub struct DownloadStore {
    dir: PathBuf,
}

/// A staged pair of file paths for one in-flight download, sharing a
/// single timestamp so the raw and repaired forms sort together.
#[derive(Debug)]
pub struct StagedDownload {
    ticker: Ticker,
    raw_path: PathBuf,
    document_path: PathBuf,
}

/// One structured document located by a directory scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedDocument {
    /// Ticker recovered from the filename.
    pub ticker: Ticker,
    /// Path of the structured document.
    pub path: PathBuf,
}

impl DownloadStore {
    /// Opens (and creates if needed) the download directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory this store writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stages the file pair for a new download of `ticker`.
    #[must_use]
    pub fn stage(&self, ticker: &Ticker) -> StagedDownload {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        StagedDownload {
            ticker: ticker.clone(),
            raw_path: self
                .dir
                .join(format!("{FILE_PREFIX}_{ticker}_{stamp}_raw.txt")),
            document_path: self.dir.join(format!("{FILE_PREFIX}_{ticker}_{stamp}.xml")),
        }
    }

    /// Scans the directory for structured documents by the filename
    /// convention. Files whose names do not carry a ticker token are
    /// skipped with a warning.
    pub fn scan_documents(&self) -> Result<Vec<ScannedDocument>> {
        let mut documents = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("xml") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match ticker_from_file_name(name) {
                Some(ticker) => documents.push(ScannedDocument { ticker, path }),
                None => warn!(file = name, "skipping file outside the naming convention"),
            }
        }
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(documents)
    }

    /// Whether any structured document for `ticker` is already on disk.
    /// This is what makes an interrupted run resumable.
    pub fn has_documents_for(&self, ticker: &Ticker) -> Result<bool> {
        Ok(self
            .scan_documents()?
            .iter()
            .any(|doc| &doc.ticker == ticker))
    }
}

impl StagedDownload {
    /// Path the unmodified submission bytes will be written to.
    #[must_use]
    pub fn raw_path(&self) -> &Path {
        &self.raw_path
    }

    /// Path the repaired structured document will be written to.
    #[must_use]
    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    /// Persists the unmodified submission bytes (audit trail).
    pub fn write_raw(&self, bytes: &[u8]) -> Result<()> {
        fs::write(&self.raw_path, bytes)
            .map_err(|e| FlowError::Storage(format!("{}: {e}", self.raw_path.display())))
    }

    /// Persists (or overwrites, after repair) the structured document.
    pub fn write_document(&self, xml: &str) -> Result<()> {
        fs::write(&self.document_path, xml)
            .map_err(|e| FlowError::Storage(format!("{}: {e}", self.document_path.display())))
    }

    /// Finalizes the download into its typed manifest record.
    #[must_use]
    pub fn into_record(self, accession_number: impl Into<String>) -> DownloadRecord {
        DownloadRecord {
            ticker: self.ticker,
            accession_number: accession_number.into(),
            raw_path: self.raw_path,
            document_path: self.document_path,
            fetched_at: Utc::now(),
        }
    }
}

/// Recovers the ticker from a conventional filename: the second
/// underscore-delimited token.
#[must_use]
pub fn ticker_from_file_name(name: &str) -> Option<Ticker> {
    let mut parts = name.split('_');
    let prefix = parts.next()?;
    if prefix != FILE_PREFIX {
        return None;
    }
    let ticker = parts.next()?;
    // The timestamp tokens must follow, otherwise this is not one of ours.
    parts.next()?;
    if ticker.is_empty() {
        return None;
    }
    Some(Ticker::new(ticker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_from_file_name() {
        assert_eq!(
            ticker_from_file_name("form4_AAPL_20240105_093000.xml"),
            Some(Ticker::new("AAPL"))
        );
        assert_eq!(
            ticker_from_file_name("form4_BRK-B_20240105_093000.xml"),
            Some(Ticker::new("BRK-B"))
        );
        assert_eq!(ticker_from_file_name("notes.xml"), None);
        assert_eq!(ticker_from_file_name("form4_AAPL.xml"), None);
    }

    #[test]
    fn test_stage_names_follow_convention() {
        let tmp = std::env::temp_dir().join("fundflow-store-stage-test");
        let store = DownloadStore::new(&tmp).unwrap();
        let staged = store.stage(&Ticker::new("msft"));
        let raw = staged.raw_path().file_name().unwrap().to_str().unwrap();
        let doc = staged.document_path().file_name().unwrap().to_str().unwrap();
        assert!(raw.starts_with("form4_MSFT_"));
        assert!(raw.ends_with("_raw.txt"));
        assert!(doc.starts_with("form4_MSFT_"));
        assert!(doc.ends_with(".xml"));
        assert_eq!(ticker_from_file_name(doc), Some(Ticker::new("MSFT")));
        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn test_scan_recovers_tickers() {
        let tmp = std::env::temp_dir().join("fundflow-store-scan-test");
        let store = DownloadStore::new(&tmp).unwrap();
        fs::write(tmp.join("form4_AAPL_20240105_093000.xml"), "<x/>").unwrap();
        fs::write(tmp.join("form4_AAPL_20240105_093000_raw.txt"), "raw").unwrap();
        fs::write(tmp.join("form4_MSFT_20240106_101500.xml"), "<x/>").unwrap();
        fs::write(tmp.join("unrelated.xml"), "<x/>").unwrap();

        let documents = store.scan_documents().unwrap();
        assert_eq!(documents.len(), 2);
        assert!(store.has_documents_for(&Ticker::new("AAPL")).unwrap());
        assert!(store.has_documents_for(&Ticker::new("MSFT")).unwrap());
        assert!(!store.has_documents_for(&Ticker::new("GOOGL")).unwrap());
        fs::remove_dir_all(&tmp).ok();
    }
}
