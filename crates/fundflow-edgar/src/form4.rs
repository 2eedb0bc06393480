//! Transaction extraction from repaired ownership documents.
//!
//! The extractor validates the declared document type, reads the
//! reporting owner, and walks the non-derivative transaction entries
//! (derivative transactions are out of scope). Field handling is
//! lenient: the security title falls back to "Unknown" and share/price
//! amounts to 0.0, but an entry missing its transaction date or code is
//! skipped with a warning while its siblings continue.

use chrono::NaiveDate;
use fundflow_core::{FlowError, Result, Ticker, Transaction};
use roxmltree::Node;
use std::fs;
use tracing::{debug, warn};

use crate::store::DownloadStore;

/// Declared document type a Form 4 filing must carry.
pub const EXPECTED_DOCUMENT_TYPE: &str = "4";

/// Sentinel for absent text fields.
const UNKNOWN: &str = "Unknown";

/// Extracts all non-derivative transactions from a repaired document.
///
/// A document of the wrong type yields an empty Vec, not an error. An
/// entry whose required fields cannot be parsed is skipped with a
/// warning; remaining entries in the same document are still extracted.
pub fn extract_transactions(document: &str, ticker: &Ticker) -> Result<Vec<Transaction>> {
    let doc = roxmltree::Document::parse(document)
        .map_err(|e| FlowError::Parse(format!("ownership document: {e}")))?;
    let root = doc.root_element();

    let document_type = child_text(root, "documentType");
    if document_type.as_deref() != Some(EXPECTED_DOCUMENT_TYPE) {
        debug!(
            ticker = %ticker,
            document_type = document_type.as_deref().unwrap_or("missing"),
            "not an insider transaction document, skipping"
        );
        return Ok(Vec::new());
    }

    let owner = root
        .descendants()
        .find(|n| n.tag_name().name() == "reportingOwnerId");
    let reporter_name = owner
        .and_then(|n| child_text(n, "rptOwnerName"))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let reporter_cik = owner
        .and_then(|n| child_text(n, "rptOwnerCik"))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let mut transactions = Vec::new();
    for entry in root
        .descendants()
        .filter(|n| n.tag_name().name() == "nonDerivativeTransaction")
    {
        match parse_entry(entry, ticker, &reporter_name, &reporter_cik) {
            Ok(transaction) => transactions.push(transaction),
            Err(e) => warn!(ticker = %ticker, error = %e, "skipping transaction entry"),
        }
    }

    if transactions.is_empty() {
        debug!(ticker = %ticker, "document contained no non-derivative transactions");
    }
    Ok(transactions)
}

/// Parses one `nonDerivativeTransaction` entry.
fn parse_entry(
    entry: Node<'_, '_>,
    ticker: &Ticker,
    reporter_name: &str,
    reporter_cik: &str,
) -> Result<Transaction> {
    let security_title =
        wrapped_value(entry, "securityTitle").unwrap_or_else(|| UNKNOWN.to_string());

    let date_text = wrapped_value(entry, "transactionDate")
        .ok_or_else(|| FlowError::MalformedRecord("transactionDate missing".to_string()))?;
    let transaction_date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
        .map_err(|e| FlowError::MalformedRecord(format!("transactionDate {date_text:?}: {e}")))?;

    let transaction_code = descendant_text(entry, "transactionCode")
        .ok_or_else(|| FlowError::MalformedRecord("transactionCode missing".to_string()))?;

    let shares = wrapped_value(entry, "transactionShares")
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let price_per_share = wrapped_value(entry, "transactionPricePerShare")
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(Transaction::new(
        ticker.clone(),
        reporter_name,
        reporter_cik,
        security_title,
        transaction_date,
        transaction_code,
        shares,
        price_per_share,
    ))
}

/// Extracts transactions from every conventional document under a
/// download directory (directory-scan mode). Per-file failures are
/// logged and skipped.
pub fn extract_from_directory(store: &DownloadStore) -> Result<Vec<Transaction>> {
    extract_scanned(store, None)
}

/// Directory-scan mode restricted to one ticker, used to resume a run
/// from previously completed downloads.
pub fn extract_for_ticker(store: &DownloadStore, ticker: &Ticker) -> Result<Vec<Transaction>> {
    extract_scanned(store, Some(ticker))
}

fn extract_scanned(store: &DownloadStore, only: Option<&Ticker>) -> Result<Vec<Transaction>> {
    let mut transactions = Vec::new();
    for document in store.scan_documents()? {
        if only.is_some_and(|t| t != &document.ticker) {
            continue;
        }
        let content = match fs::read_to_string(&document.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %document.path.display(), error = %e, "unreadable document");
                continue;
            }
        };
        match extract_transactions(&content, &document.ticker) {
            Ok(mut extracted) => transactions.append(&mut extracted),
            Err(e) => {
                warn!(path = %document.path.display(), error = %e, "unparseable document")
            }
        }
    }
    Ok(transactions)
}

/// Text of a `<name><value>..</value></name>` wrapped field anywhere
/// under `node`.
fn wrapped_value(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.tag_name().name() == name)
        .and_then(|n| child_text(n, "value"))
}

/// Trimmed text of the first descendant element called `name`.
fn descendant_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.tag_name().name() == name)
        .and_then(node_text)
}

/// Trimmed text of the first child element called `name`.
fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.tag_name().name() == name)
        .and_then(node_text)
}

fn node_text(node: Node<'_, '_>) -> Option<String> {
    let text = node.text()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
