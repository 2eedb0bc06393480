#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/fundflow-rs/fundflow/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR Form 4 acquisition pipeline.
//!
//! This crate implements the insider-transaction pipeline end to end:
//!
//! - Ticker → CIK resolution against the bulk company ticker index
//! - Filing enumeration over the browse feed, newest first
//! - Submission download with document isolation and two-tier repair
//! - Transaction extraction from the repaired ownership document
//!
//! # Example
//!
//! ```no_run
//! use fundflow_edgar::EdgarProvider;
//! use fundflow_core::{InsiderDataProvider, Ticker};
//!
//! #[tokio::main]
//! async fn main() -> fundflow_core::Result<()> {
//!     let provider = EdgarProvider::new(
//!         "fundflow/0.1 (contact@example.com)",
//!         "data/us_market/downloads",
//!     )?;
//!     let transactions = provider
//!         .fetch_insider_transactions(&Ticker::new("AAPL"), 10)
//!         .await?;
//!     println!("{} transactions", transactions.len());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use fundflow_core::{
    Cik, DataProvider, DownloadRecord, FilingReference, FlowError, InsiderDataProvider, Result,
    Ticker, Transaction,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Filing detail-page scanning.
pub mod detail;
/// Transaction extraction from repaired ownership documents.
pub mod form4;
/// Document isolation and the strict/tolerant parse state machine.
pub mod repair;
/// Download directory management.
pub mod store;

pub use form4::{extract_for_ticker, extract_from_directory, extract_transactions};
pub use repair::{RepairState, isolate_ownership_document, parse_or_repair};
pub use store::{DownloadStore, ScannedDocument};

/// SEC company tickers bulk index URL.
const COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// SEC browse feed endpoint for filing enumeration.
const BROWSE_URL: &str = "https://www.sec.gov/cgi-bin/browse-edgar";

/// Base for site-relative artifact links on detail pages.
const ARCHIVE_BASE_URL: &str = "https://www.sec.gov";

/// Filing type this pipeline targets.
pub const FORM_TYPE: &str = "4";

/// Cooldown before every identifier-index request, per the source's
/// published access policy. A hard timing contract: violating it risks
/// upstream throttling.
const INDEX_COOLDOWN: Duration = Duration::from_secs(10);

/// Minimum delay before every other request (10 requests/second).
const REQUEST_DELAY: Duration = Duration::from_millis(100);

/// Rate limiter enforcing a minimum interval between requests.
#[derive(Debug)]
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// SEC EDGAR Form 4 provider.
///
/// Holds the HTTP client with the identifying user agent the SEC
/// requires, two rate limiters (the identifier-index cooldown and the
/// general per-request delay), the download store, and a process-local
/// cache of the parsed ticker index. The cache lives only for the
/// provider's lifetime; nothing is persisted across runs.
#[derive(Debug)]
pub struct EdgarProvider {
    client: reqwest::Client,
    index_limiter: Arc<Mutex<RateLimiter>>,
    request_limiter: Arc<Mutex<RateLimiter>>,
    ticker_index: Mutex<Option<HashMap<String, Cik>>>,
    downloads: DownloadStore,
}

impl EdgarProvider {
    /// Creates a provider writing downloads under `download_dir`.
    ///
    /// The SEC requires identifying user agent headers; format as
    /// "AppName/Version (contact@email.com)".
    pub fn new(user_agent: &str, download_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Ok(Self {
            client,
            index_limiter: Arc::new(Mutex::new(RateLimiter::new(INDEX_COOLDOWN))),
            request_limiter: Arc::new(Mutex::new(RateLimiter::new(REQUEST_DELAY))),
            ticker_index: Mutex::new(None),
            downloads: DownloadStore::new(download_dir)?,
        })
    }

    /// The download store this provider persists filings into.
    #[must_use]
    pub fn downloads(&self) -> &DownloadStore {
        &self.downloads
    }

    /// Resolves a ticker to its zero-padded CIK.
    ///
    /// The bulk index is fetched at most once per provider instance and
    /// matched case-insensitively.
    pub async fn resolve(&self, ticker: &Ticker) -> Result<Cik> {
        if ticker.as_str().is_empty() {
            return Err(FlowError::InvalidParameter("Empty ticker".to_string()));
        }

        let mut index = self.ticker_index.lock().await;
        if index.is_none() {
            *index = Some(self.fetch_ticker_index().await?);
        }

        index
            .as_ref()
            .and_then(|table| table.get(ticker.as_str()))
            .cloned()
            .ok_or_else(|| FlowError::TickerNotFound(ticker.to_string()))
    }

    /// Fetches and parses the bulk identifier index.
    async fn fetch_ticker_index(&self) -> Result<HashMap<String, Cik>> {
        self.index_limiter.lock().await.wait().await;

        debug!("Fetching company ticker index");
        let response = self
            .client
            .get(COMPANY_TICKERS_URL)
            .send()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "Identifier index returned HTTP {}",
                response.status()
            )));
        }

        // A table that cannot be parsed counts as an unavailable index.
        let entries: HashMap<String, CompanyTickerEntry> = response
            .json()
            .await
            .map_err(|e| FlowError::Upstream(format!("Unparseable identifier index: {e}")))?;

        debug!("Identifier index carries {} entries", entries.len());
        Ok(entries
            .into_values()
            .map(|entry| (entry.ticker.to_uppercase(), Cik::from(entry.cik_str)))
            .collect())
    }

    /// Lists up to `max_count` filings of `filing_type`, newest first.
    pub async fn list_filings(
        &self,
        ticker: &Ticker,
        cik: &Cik,
        filing_type: &str,
        max_count: usize,
    ) -> Result<Vec<FilingReference>> {
        self.request_limiter.lock().await.wait().await;

        debug!(ticker = %ticker, cik = %cik, filing_type, "Enumerating filings");
        let count = max_count.to_string();
        let response = self
            .client
            .get(BROWSE_URL)
            .query(&[
                ("action", "getcompany"),
                ("CIK", cik.as_str()),
                ("type", filing_type),
                ("dateb", ""),
                ("owner", "include"),
                ("count", count.as_str()),
                ("output", "atom"),
            ])
            .send()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "Filing index returned HTTP {} for {ticker}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?;

        let mut filings = parse_filing_feed(&body, ticker)?;
        filings.truncate(max_count);
        Ok(filings)
    }

    /// Fetches one filing: detail page, artifact download, isolation,
    /// repair, and persistence of both forms. Returns the typed
    /// manifest record for the two files written.
    pub async fn fetch_document(&self, reference: &FilingReference) -> Result<DownloadRecord> {
        let extraction_failed = |reason: String| FlowError::Extraction {
            ticker: reference.ticker.to_string(),
            accession: reference.accession_number.clone(),
            reason,
        };

        // Step 1: locate the artifact link on the detail page.
        let page = self.get_text(&reference.detail_url).await?;
        let href = detail::find_document_link(&page)
            .ok_or_else(|| extraction_failed("no artifact link on detail page".to_string()))?;
        let artifact_url = if href.starts_with("http") {
            href
        } else {
            format!("{ARCHIVE_BASE_URL}{href}")
        };

        // Step 2: download and persist the unmodified bytes.
        let bytes = self.get_bytes(&artifact_url).await?;
        let staged = self.downloads.stage(&reference.ticker);
        staged.write_raw(&bytes)?;

        // Step 3/4: isolate the document span and persist it.
        let submission = String::from_utf8_lossy(&bytes);
        let isolated = repair::isolate_ownership_document(&submission)
            .ok_or_else(|| extraction_failed("ownership document tags not found".to_string()))?;
        staged.write_document(&isolated)?;

        // Step 5: strict parse with the tolerant fallback; a repaired
        // document overwrites the persisted fragment.
        match repair::parse_or_repair(&isolated) {
            RepairState::Parsed(None) => {}
            RepairState::Parsed(Some(rebuilt)) => {
                debug!(
                    ticker = %reference.ticker,
                    accession = %reference.accession_number,
                    "document repaired by tolerant pass"
                );
                staged.write_document(&rebuilt)?;
            }
            RepairState::Failed(reason) => return Err(extraction_failed(reason)),
            state @ (RepairState::Unparsed | RepairState::StrictFailed | RepairState::Repaired(_)) => {
                return Err(extraction_failed(format!(
                    "repair stopped in non-terminal state {state:?}"
                )));
            }
        }

        Ok(staged.into_record(reference.accession_number.clone()))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.request_limiter.lock().await.wait().await;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "HTTP {} for {url}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.request_limiter.lock().await.wait().await;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FlowError::Upstream(format!(
                "HTTP {} for {url}",
                response.status()
            )));
        }
        Ok(response
            .bytes()
            .await
            .map_err(|e| FlowError::Upstream(e.to_string()))?
            .to_vec())
    }
}

impl DataProvider for EdgarProvider {
    fn name(&self) -> &str {
        "SEC EDGAR"
    }

    fn description(&self) -> &str {
        "SEC EDGAR provider for Form 4 insider-transaction filings"
    }
}

#[async_trait]
impl InsiderDataProvider for EdgarProvider {
    async fn resolve(&self, ticker: &Ticker) -> Result<Cik> {
        Self::resolve(self, ticker).await
    }

    async fn list_filings(
        &self,
        ticker: &Ticker,
        cik: &Cik,
        filing_type: &str,
        max_count: usize,
    ) -> Result<Vec<FilingReference>> {
        Self::list_filings(self, ticker, cik, filing_type, max_count).await
    }

    async fn fetch_insider_transactions(
        &self,
        ticker: &Ticker,
        max_filings: usize,
    ) -> Result<Vec<Transaction>> {
        let cik = self.resolve(ticker).await?;
        let filings = self.list_filings(ticker, &cik, FORM_TYPE, max_filings).await?;
        if filings.is_empty() {
            debug!(ticker = %ticker, "no filings of the requested type");
            return Ok(Vec::new());
        }

        let mut transactions = Vec::new();
        for reference in &filings {
            // A failed filing skips only itself; siblings continue.
            let record = match self.fetch_document(reference).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        ticker = %ticker,
                        accession = %reference.accession_number,
                        error = %e,
                        "skipping filing"
                    );
                    continue;
                }
            };
            let content = fs::read_to_string(&record.document_path)?;
            match form4::extract_transactions(&content, ticker) {
                Ok(mut extracted) => transactions.append(&mut extracted),
                Err(e) => warn!(
                    ticker = %ticker,
                    accession = %record.accession_number,
                    error = %e,
                    "skipping unparseable document"
                ),
            }
        }
        Ok(transactions)
    }
}

/// Parses the browse feed into filing references, newest first (the
/// feed's native order). Entries and their fields are located by local
/// tag name, ignoring the feed namespace; the accession element is
/// accepted under both its correct and its historically misspelled name.
fn parse_filing_feed(feed: &str, ticker: &Ticker) -> Result<Vec<FilingReference>> {
    let doc = roxmltree::Document::parse(feed)
        .map_err(|e| FlowError::Upstream(format!("Unparseable filing feed: {e}")))?;

    let mut filings = Vec::new();
    for entry in doc
        .descendants()
        .filter(|n| n.tag_name().name() == "entry")
    {
        let accession_number = entry
            .descendants()
            .find(|n| matches!(n.tag_name().name(), "accession-number" | "accession-nunber"))
            .and_then(|n| n.text())
            .map(str::trim);
        let filing_date = entry
            .descendants()
            .find(|n| n.tag_name().name() == "filing-date")
            .and_then(|n| n.text())
            .and_then(|t| NaiveDate::parse_from_str(t.trim(), "%Y-%m-%d").ok());
        let detail_url = entry
            .descendants()
            .find(|n| n.tag_name().name() == "link")
            .and_then(|n| n.attribute("href"))
            .map(str::trim);

        let (Some(accession_number), Some(filing_date), Some(detail_url)) =
            (accession_number, filing_date, detail_url)
        else {
            warn!(ticker = %ticker, "skipping incomplete feed entry");
            continue;
        };

        let report_date = entry
            .descendants()
            .find(|n| n.tag_name().name() == "report-date")
            .and_then(|n| n.text())
            .and_then(|t| NaiveDate::parse_from_str(t.trim(), "%Y-%m-%d").ok());

        filings.push(FilingReference {
            ticker: ticker.clone(),
            accession_number: accession_number.to_string(),
            filing_date,
            report_date,
            detail_url: detail_url.to_string(),
        });
    }
    Ok(filings)
}

/// One entry of the bulk company ticker index.
#[derive(Debug, Deserialize)]
struct CompanyTickerEntry {
    /// CIK as a number (the index stores it unpadded).
    cik_str: u64,
    /// Ticker symbol.
    ticker: String,
    /// Company name.
    #[allow(dead_code)]
    title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>AAPL - Form 4 filings</title>
  <entry>
    <title>4 - Statement of changes in beneficial ownership</title>
    <link rel="alternate" type="text/html"
          href="https://www.sec.gov/Archives/edgar/data/320193/000032019324000001/0000320193-24-000001-index.htm"/>
    <content type="text/xml">
      <accession-nunber>0000320193-24-000001</accession-nunber>
      <filing-date>2024-02-10</filing-date>
      <filing-type>4</filing-type>
    </content>
  </entry>
  <entry>
    <title>4 - Statement of changes in beneficial ownership</title>
    <link rel="alternate" type="text/html"
          href="https://www.sec.gov/Archives/edgar/data/320193/000032019324000002/0000320193-24-000002-index.htm"/>
    <content type="text/xml">
      <accession-number>0000320193-24-000002</accession-number>
      <filing-date>2024-01-05</filing-date>
      <filing-type>4</filing-type>
    </content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_filing_feed() {
        let ticker = Ticker::new("AAPL");
        let filings = parse_filing_feed(FEED, &ticker).unwrap();
        assert_eq!(filings.len(), 2);
        assert_eq!(filings[0].accession_number, "0000320193-24-000001");
        assert_eq!(
            filings[0].filing_date,
            NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()
        );
        assert!(filings[0].detail_url.ends_with("-index.htm"));
        // Both the misspelled and the correct accession element parse.
        assert_eq!(filings[1].accession_number, "0000320193-24-000002");
        assert!(filings[0].filing_date > filings[1].filing_date);
    }

    #[test]
    fn test_empty_feed_is_not_an_error() {
        let feed = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>no matches</title></feed>"#;
        let filings = parse_filing_feed(feed, &Ticker::new("AAPL")).unwrap();
        assert!(filings.is_empty());
    }

    #[test]
    fn test_garbage_feed_is_upstream_error() {
        assert!(matches!(
            parse_filing_feed("not xml at all", &Ticker::new("AAPL")),
            Err(FlowError::Upstream(_))
        ));
    }

    #[test]
    fn test_provider_metadata() {
        let tmp = std::env::temp_dir().join("fundflow-edgar-meta-test");
        let provider = EdgarProvider::new("Test/1.0 (test@example.com)", &tmp).unwrap();
        assert_eq!(provider.name(), "SEC EDGAR");
        assert!(!provider.description().is_empty());
        std::fs::remove_dir_all(&tmp).ok();
    }
}
